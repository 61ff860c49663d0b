//! L2 node bootstrap.
//!
//! The node itself is an external collaborator behind the [`L2Node`] trait.
//! This module builds what every node needs: pre-bound listeners, a genesis
//! descriptor, in-memory stores and the transaction adapters.

mod external;
mod store;

use std::{future::Future, path::Path};

use alloy_core::primitives::{B256, Bytes};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub use external::{ExternalL2Node, L2NodeCmdBuilder};
pub use store::{L2Stores, MemStore};

use crate::{
    endpoint::{BoundListener, Endpoint, EndpointAllocator},
    events::EventSender,
    lifecycle::Lifecycle,
    process::Supervisor,
    rpc::RpcClient,
    stage::cancellable,
};

/// Chain ID of the devnet L2.
pub const L2_CHAIN_ID: u64 = 901;

/// Listeners reserved for the node before anything starts.
#[derive(Debug, Clone)]
pub struct L2Listeners {
    /// Engine API over HTTP, on an ephemeral loopback port.
    pub engine_http: BoundListener,
    /// Engine API over websocket, on the configured engine endpoint.
    pub engine_ws: BoundListener,
    /// Consensus RPC, on the configured consensus endpoint.
    pub consensus: BoundListener,
}

impl L2Listeners {
    pub fn bind(
        allocator: &EndpointAllocator<'_>,
        engine: &Endpoint,
        consensus: &Endpoint,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            engine_http: allocator
                .bind_ephemeral("engine http")
                .context("Failed to set up engine http listener")?,
            engine_ws: allocator
                .bind("engine ws", engine)
                .context("Failed to set up engine ws listener")?,
            consensus: allocator
                .bind("consensus", consensus)
                .context("Failed to set up consensus listener")?,
        })
    }

    pub fn all(&self) -> [&BoundListener; 3] {
        [&self.engine_http, &self.engine_ws, &self.consensus]
    }
}

/// Genesis descriptor for the L2 application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L2Genesis {
    pub chain_id: u64,
    /// Genesis timestamp, taken from the L1 anchor block.
    pub time: u64,
    pub app_state: Value,
}

impl L2Genesis {
    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize L2 genesis")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write L2 genesis to {}", path.display()))
    }
}

/// Converts a batch of transactions between the application and engine encodings.
pub type TxAdapter = fn(Vec<Bytes>) -> anyhow::Result<Vec<Bytes>>;

/// Transaction adaptation in both directions.
#[derive(Debug, Clone, Copy)]
pub struct TxAdapters {
    /// Application transactions to engine payload transactions.
    pub to_engine: TxAdapter,
    /// Engine payload transactions to application transactions.
    pub from_engine: TxAdapter,
}

impl Default for TxAdapters {
    fn default() -> Self {
        Self {
            to_engine: Ok,
            from_engine: Ok,
        }
    }
}

/// Everything a node is started with.
#[derive(Debug)]
pub struct L2NodeDeps {
    pub genesis: L2Genesis,
    pub listeners: L2Listeners,
    pub stores: L2Stores,
    pub adapters: TxAdapters,
    pub supervisor: Supervisor,
    pub events: EventSender,
}

/// An L2 node implementation.
pub trait L2Node: Send + Sync {
    /// Initial application state for a new chain.
    fn app_state(&self, chain_id: u64) -> Value {
        serde_json::json!({ "chain_id": chain_id.to_string() })
    }

    fn tx_adapters(&self) -> TxAdapters {
        TxAdapters::default()
    }

    /// Start serving on the given listeners.
    ///
    /// Must return once the node is launched. Long-running work goes through
    /// `lifecycle` and failures after startup go through `deps.events`.
    fn start<'a>(
        &'a self,
        deps: L2NodeDeps,
        lifecycle: &'a Lifecycle,
        cancel: &'a CancellationToken,
    ) -> impl Future<Output = anyhow::Result<()>> + Send + 'a;
}

/// Build the node's dependencies and start it.
#[allow(clippy::too_many_arguments)]
pub async fn bootstrap<N: L2Node>(
    node: &N,
    chain_id: u64,
    genesis_time: u64,
    listeners: L2Listeners,
    supervisor: &Supervisor,
    events: &EventSender,
    lifecycle: &Lifecycle,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let deps = L2NodeDeps {
        genesis: L2Genesis {
            chain_id,
            time: genesis_time,
            app_state: node.app_state(chain_id),
        },
        listeners,
        stores: L2Stores::open(lifecycle),
        adapters: node.tx_adapters(),
        supervisor: supervisor.clone(),
        events: events.clone(),
    };

    tracing::info!(chain_id, genesis_time, "Starting L2 node");
    node.start(deps, lifecycle, cancel)
        .await
        .context("Failed to run L2 node")
}

/// Hash of the L2 genesis block, read over the engine endpoint.
///
/// The query is plain HTTP JSON-RPC, so the node must answer HTTP on the engine
/// port as well as websocket upgrades.
pub async fn genesis_hash(engine: &Endpoint, cancel: &CancellationToken) -> anyhow::Result<B256> {
    let client = RpcClient::new(engine.http_url()?)?;
    let genesis = cancellable(cancel, client.genesis_block())
        .await
        .context("Failed to get L2 genesis block hash")?;
    tracing::info!(hash = %genesis.hash, "L2 genesis block");
    Ok(genesis.hash)
}
