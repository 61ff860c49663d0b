use std::path::PathBuf;

use clap::Parser;
use rollnet_devnet::{Endpoint, StackConfig};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "rollnet")]
#[command(
    author,
    version,
    about = "Bring up a local rollup devnet: L1 simulator, contracts, L2 node and OP stack"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "ROLLNET_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to an existing Rollnet.toml, or a directory containing one.
    ///
    /// When provided, the configuration is read from this file and the
    /// other flags override it.
    #[arg(long, alias = "conf", env = "ROLLNET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root of the contracts tree (`scripts/`, `deploy-config/`, `deployments/`).
    #[arg(long, env = "ROLLNET_CONTRACTS")]
    pub contracts: Option<PathBuf>,

    /// Directory for logs and derived configs.
    #[arg(long, alias = "outdata", env = "ROLLNET_ARTIFACTS")]
    pub artifacts: Option<PathBuf>,

    /// L1 block time in milliseconds.
    #[arg(long, env = "ROLLNET_L1_BLOCK_TIME_MS")]
    pub l1_block_time_ms: Option<u64>,

    /// How long each service may take to accept connections, in seconds.
    #[arg(long, env = "ROLLNET_READINESS_HORIZON")]
    pub readiness_horizon: Option<u64>,

    /// Anvil RPC endpoint (`host:port`).
    #[arg(long, env = "ROLLNET_ANVIL")]
    pub anvil: Option<Endpoint>,

    /// L2 engine API endpoint (`host:port`).
    #[arg(long, env = "ROLLNET_ENGINE")]
    pub engine: Option<Endpoint>,

    /// L2 consensus RPC endpoint (`host:port`).
    #[arg(long, env = "ROLLNET_CONSENSUS")]
    pub consensus: Option<Endpoint>,

    /// op-node RPC endpoint (`host:port`).
    #[arg(long, env = "ROLLNET_OP_NODE")]
    pub op_node: Option<Endpoint>,

    /// Binary overrides for the spawned services.
    #[clap(flatten)]
    pub binaries: BinaryOverrides,
}

/// Binary overrides for the spawned services.
#[derive(Debug, Clone, Parser)]
pub struct BinaryOverrides {
    #[arg(long, env = "ROLLNET_ANVIL_BIN")]
    pub anvil_bin: Option<PathBuf>,

    #[arg(long, env = "ROLLNET_FORGE_BIN")]
    pub forge_bin: Option<PathBuf>,

    /// The L2 node binary, started with the reserved engine and consensus addresses.
    #[arg(long, env = "ROLLNET_L2_NODE_BIN")]
    pub l2_node_bin: Option<PathBuf>,
}

impl Cli {
    /// Apply the flags on top of `config`.
    pub fn apply(self, mut config: StackConfig) -> StackConfig {
        if let Some(contracts) = self.contracts {
            config.contracts_root = contracts;
        }
        if let Some(artifacts) = self.artifacts {
            config.artifacts_dir = artifacts;
        }
        if let Some(block_time) = self.l1_block_time_ms {
            config.l1_block_time_ms = block_time;
        }
        if let Some(horizon) = self.readiness_horizon {
            config.readiness_horizon_secs = horizon;
        }
        if let Some(anvil) = self.anvil {
            config.anvil.endpoint = anvil;
        }
        if let Some(engine) = self.engine {
            config.engine = engine;
        }
        if let Some(consensus) = self.consensus {
            config.consensus = consensus;
        }
        if let Some(op_node) = self.op_node {
            config.op_stack.op_node_endpoint = op_node;
        }
        if let Some(bin) = self.binaries.anvil_bin {
            config.anvil.binary = bin;
        }
        if let Some(bin) = self.binaries.forge_bin {
            config.forge.binary = bin;
        }
        if let Some(bin) = self.binaries.l2_node_bin {
            config.l2_node.binary = bin;
        }
        config
    }
}
