//! The bring-up pipeline.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    endpoint::{Endpoint, EndpointAllocator},
    events::{EventListener, spawn_event_loop},
    genesis::{self, DeployConfig, DeployOverrides, DerivationInputs, L1Deployments, RollupConfig},
    key::TestKey,
    lifecycle::Lifecycle,
    process::Supervisor,
    rpc::BlockSnapshot,
    services::{
        anvil::AnvilConfig,
        forge::ForgeConfig,
        l2_node::{self, ExternalL2Node, L2_CHAIN_ID, L2Listeners, L2Node},
        op_stack::{DependentStack, LaunchContext, OpStack, StackInputs},
    },
    stage::{Cancelled, Stage},
};

/// Default name for the configuration file.
pub const CONFIG_FILENAME: &str = "Rollnet.toml";

/// L2 genesis anchor block number bound into the rollup config.
pub const L2_GENESIS_NUMBER: u64 = 1;

/// Orchestrator configuration. Immutable once the stack is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Deploy config template and deployment file name.
    pub network: String,
    /// Root of the contracts tree (`scripts/`, `deploy-config/`, `deployments/`).
    pub contracts_root: PathBuf,
    /// Logs and derived configs are written here.
    pub artifacts_dir: PathBuf,
    /// Interval between L1 blocks, in milliseconds.
    pub l1_block_time_ms: u64,
    pub l2_chain_id: u64,
    /// How long a started service may take to accept connections, in seconds.
    pub readiness_horizon_secs: u64,
    /// Engine API endpoint of the L2 node (websocket).
    pub engine: Endpoint,
    /// Consensus RPC endpoint of the L2 node.
    pub consensus: Endpoint,
    pub anvil: AnvilConfig,
    pub forge: ForgeConfig,
    pub l2_node: ExternalL2Node,
    pub op_stack: OpStack,
    #[serde(default, skip_serializing_if = "DeployOverrides::is_empty")]
    pub overrides: DeployOverrides,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            network: genesis::NETWORK_NAME.to_string(),
            contracts_root: PathBuf::from("contracts-bedrock"),
            artifacts_dir: PathBuf::from("rollnet-data"),
            l1_block_time_ms: 2_000,
            l2_chain_id: L2_CHAIN_ID,
            readiness_horizon_secs: 60,
            engine: Endpoint::localhost(9000),
            consensus: Endpoint::localhost(26657),
            anvil: AnvilConfig::default(),
            forge: ForgeConfig::default(),
            l2_node: ExternalL2Node::default(),
            op_stack: OpStack::default(),
            overrides: DeployOverrides::default(),
        }
    }
}

impl StackConfig {
    pub fn l1_block_time(&self) -> Duration {
        Duration::from_millis(self.l1_block_time_ms)
    }

    pub fn readiness_horizon(&self) -> Duration {
        Duration::from_secs(self.readiness_horizon_secs)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize stack config to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file, or from [`CONFIG_FILENAME`] in a directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!(
                "Configuration file or directory not found: {}",
                path.display()
            );
        }

        let config_path = if path.is_dir() {
            path.join(CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }
}

/// Facts discovered while bringing the devnet up.
#[derive(Debug, Clone)]
pub struct Devnet {
    pub funding_address: Address,
    pub l1_rpc: String,
    pub deployments: L1Deployments,
    pub l1_block: BlockSnapshot,
    pub l2_engine: Endpoint,
    pub l2_genesis_hash: B256,
    pub deploy_config: DeployConfig,
    pub rollup_config: RollupConfig,
}

/// How a successful run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every stage completed.
    Ready(Box<Devnet>),
    /// A service never became reachable. Later stages did not run.
    Skipped { stage: Stage },
}

impl RunOutcome {
    pub fn devnet(&self) -> Option<&Devnet> {
        match self {
            Self::Ready(devnet) => Some(devnet),
            Self::Skipped { .. } => None,
        }
    }
}

/// The devnet orchestrator.
pub struct Stack<N = ExternalL2Node, D = OpStack> {
    config: StackConfig,
    node: N,
    dependent: D,
    listener: Arc<dyn EventListener>,
}

impl Stack {
    /// Build a stack with the node and dependent stack described by `config`.
    pub fn from_config(config: StackConfig, listener: Arc<dyn EventListener>) -> Self {
        let node = config.l2_node.clone();
        let dependent = config.op_stack.clone();
        Self::new(config, node, dependent, listener)
    }
}

impl<N: L2Node, D: DependentStack> Stack<N, D> {
    pub fn new(config: StackConfig, node: N, dependent: D, listener: Arc<dyn EventListener>) -> Self {
        Self {
            config,
            node,
            dependent,
            listener,
        }
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    pub fn dependent(&self) -> &D {
        &self.dependent
    }

    /// Bring the devnet up.
    ///
    /// Resources stay registered with `lifecycle` on success; the caller
    /// releases them once done with the devnet. On error they are released
    /// before this returns. Errors carry the failing [`Stage`] as context.
    pub async fn run(&self, cancel: &CancellationToken, lifecycle: &Lifecycle) -> Result<RunOutcome> {
        match self.bring_up(cancel, lifecycle).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "Devnet bring-up failed, releasing resources");
                let report = lifecycle.release().await;
                if !report.is_clean() {
                    tracing::warn!(failures = report.failures.len(), "Some cleanups failed");
                }
                Err(err)
            }
        }
    }

    async fn bring_up(&self, cancel: &CancellationToken, lifecycle: &Lifecycle) -> Result<RunOutcome> {
        let config = &self.config;
        let supervisor = Supervisor::new(&config.artifacts_dir);
        let events = spawn_event_loop(self.listener.clone(), lifecycle);

        // Reserve the L2 node's ports before any process starts.
        std::fs::create_dir_all(&config.artifacts_dir)
            .with_context(|| {
                format!("Failed to create artifacts dir {}", config.artifacts_dir.display())
            })
            .context(Stage::AllocateListeners)?;
        let listeners = L2Listeners::bind(
            &EndpointAllocator::new(lifecycle),
            &config.engine,
            &config.consensus,
        )
        .context(Stage::AllocateListeners)?;

        let anvil = config
            .anvil
            .start(config.l1_block_time(), &supervisor, lifecycle, &events)
            .context(Stage::StartL1)?;
        if !self.await_ready(&anvil.endpoint, cancel).await {
            return Self::not_ready(Stage::StartL1, cancel);
        }

        let key = TestKey::generate();
        anvil.fund(&key, cancel).await.context(Stage::FundAccount)?;

        config
            .forge
            .deploy(
                &config.contracts_root,
                &anvil.rpc_url(),
                &key,
                &supervisor,
                lifecycle,
                cancel,
            )
            .await
            .context(Stage::DeployContracts)?;

        let l1_block = anvil
            .latest_block(cancel)
            .await
            .context(Stage::FetchL1Block)?;

        let engine = listeners.engine_ws.endpoint().clone();
        l2_node::bootstrap(
            &self.node,
            config.l2_chain_id,
            l1_block.timestamp,
            listeners,
            &supervisor,
            &events,
            lifecycle,
            cancel,
        )
        .await
        .context(Stage::StartL2Node)?;
        if !self.await_ready(&engine, cancel).await {
            return Self::not_ready(Stage::StartL2Node, cancel);
        }

        let l2_genesis_hash = l2_node::genesis_hash(&engine, cancel)
            .await
            .context(Stage::FetchL2Genesis)?;

        let (deployments, derived) = self
            .derive(&l1_block, l2_genesis_hash)
            .context(Stage::DeriveConfig)?;

        let output_oracle = deployments
            .l2_output_oracle()
            .context(Stage::StartDependentStack)?;
        let inputs = StackInputs {
            l1_rpc: anvil.rpc_url(),
            l2_engine: engine.clone(),
            output_oracle,
            key: key.clone(),
            rollup_config: derived.rollup_config.clone(),
            rollup_config_path: config.artifacts_dir.join("rollup.json"),
        };
        let ctx = LaunchContext {
            supervisor: &supervisor,
            events: &events,
            lifecycle,
            cancel,
        };
        self.dependent
            .launch(inputs, ctx)
            .await
            .context("Failed to run the dependent stack")
            .context(Stage::StartDependentStack)?;

        tracing::info!(
            l1 = %anvil.endpoint,
            engine = %engine,
            %output_oracle,
            "Devnet ready"
        );

        Ok(RunOutcome::Ready(Box::new(Devnet {
            funding_address: key.address(),
            l1_rpc: anvil.rpc_url(),
            deployments,
            l1_block,
            l2_engine: engine,
            l2_genesis_hash,
            deploy_config: derived.deploy_config,
            rollup_config: derived.rollup_config,
        })))
    }

    /// Load the contract outputs, derive the configs and write them to the artifacts dir.
    fn derive(
        &self,
        l1_block: &BlockSnapshot,
        l2_genesis_hash: B256,
    ) -> Result<(L1Deployments, genesis::Derived)> {
        let config = &self.config;
        let (template, deployments) = genesis::load(&config.contracts_root, &config.network)?;

        let derived = genesis::derive(
            template,
            &deployments,
            DerivationInputs {
                l1_block,
                l2_genesis_hash,
                l2_chain_id: config.l2_chain_id,
                l2_genesis_number: L2_GENESIS_NUMBER,
                overrides: &config.overrides,
            },
        )?;

        derived
            .deploy_config
            .write_to(&config.artifacts_dir.join("deploy-config.json"))?;
        derived
            .rollup_config
            .write_to(&config.artifacts_dir.join("rollup.json"))?;

        Ok((deployments, derived))
    }

    /// Poll `endpoint` for at most the readiness horizon.
    async fn await_ready(&self, endpoint: &Endpoint, cancel: &CancellationToken) -> bool {
        let horizon = cancel.child_token();
        let deadline = self.config.readiness_horizon();
        let timer = tokio::spawn({
            let horizon = horizon.clone();
            async move {
                tokio::time::sleep(deadline).await;
                horizon.cancel();
            }
        });

        let ready = endpoint.is_reachable(&horizon).await;
        timer.abort();
        ready
    }

    /// Outcome for a service that never accepted connections.
    ///
    /// Caller cancellation is reported as such; only the horizon expiring is a skip.
    fn not_ready(stage: Stage, cancel: &CancellationToken) -> Result<RunOutcome> {
        if cancel.is_cancelled() {
            return Err(anyhow::Error::new(Cancelled).context(stage));
        }
        tracing::warn!(%stage, "Service never became reachable, skipping the remaining stages");
        Ok(RunOutcome::Skipped { stage })
    }
}
