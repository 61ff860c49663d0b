//! Anvil service for the local L1 chain.

mod cmd;

use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub use cmd::AnvilCmdBuilder;

use crate::{
    endpoint::Endpoint,
    events::{EventSender, EventSource},
    key::{TestKey, funding_amount},
    lifecycle::Lifecycle,
    process::{ProcessSpec, Supervisor},
    rpc::{BlockSnapshot, RpcClient},
    stage::cancellable,
};

/// Chain ID Anvil uses when none is given.
pub const ANVIL_CHAIN_ID: u64 = 31337;

/// Default port for Anvil.
pub const DEFAULT_PORT: u16 = 8545;

/// Configuration for Anvil.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnvilConfig {
    /// Path or name of the `anvil` binary.
    pub binary: PathBuf,
    /// Endpoint Anvil listens on.
    pub endpoint: Endpoint,
    /// Extra arguments to pass to Anvil.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

impl Default for AnvilConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("anvil"),
            endpoint: Endpoint::localhost(DEFAULT_PORT),
            extra_args: Vec::new(),
        }
    }
}

/// Handler for a running Anvil instance.
#[derive(Debug, Clone)]
pub struct AnvilHandler {
    pub endpoint: Endpoint,
    pub pid: Option<u32>,
    rpc: RpcClient,
}

impl AnvilConfig {
    /// Spawn Anvil and hand its exit to a background monitor.
    ///
    /// Returns as soon as the process is running. Use [`Endpoint::is_reachable`]
    /// to wait for the RPC server.
    pub fn start(
        &self,
        block_time: Duration,
        supervisor: &Supervisor,
        lifecycle: &Lifecycle,
        events: &EventSender,
    ) -> Result<AnvilHandler, anyhow::Error> {
        let args = AnvilCmdBuilder::new(self.endpoint.port)
            .block_time(block_time)
            .extra_args(self.extra_args.clone())
            .build();
        let spec = ProcessSpec::new("anvil", &self.binary, args);

        let child = supervisor
            .spawn(&spec, lifecycle)
            .with_context(|| format!("Failed to start {spec}"))?;
        let pid = child.pid();
        child.monitor(EventSource::L1Simulator, events, lifecycle);

        tracing::info!(endpoint = %self.endpoint, ?block_time, "Anvil started");

        Ok(AnvilHandler {
            endpoint: self.endpoint.clone(),
            pid,
            rpc: RpcClient::new(self.endpoint.http_url()?)?,
        })
    }
}

impl AnvilHandler {
    /// RPC URL passed to tools that talk to Anvil.
    pub fn rpc_url(&self) -> String {
        self.endpoint.http_address()
    }

    /// Give `key` the funding balance.
    pub async fn fund(&self, key: &TestKey, cancel: &CancellationToken) -> anyhow::Result<()> {
        let amount = funding_amount();
        cancellable(cancel, self.rpc.set_balance(key.address(), amount))
            .await
            .context("Failed to set balance")?;
        tracing::info!(address = %key.address(), wei = %amount, "Funded test key");
        Ok(())
    }

    pub async fn latest_block(&self, cancel: &CancellationToken) -> anyhow::Result<BlockSnapshot> {
        cancellable(cancel, self.rpc.latest_block())
            .await
            .context("Failed to get the latest L1 block")
    }
}
