//! The dependent protocol stack launched once the L2 node is up.

mod cmd;

use std::{
    future::Future,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub use cmd::{OpBatcherCmdBuilder, OpNodeCmdBuilder, OpProposerCmdBuilder};

use crate::{
    endpoint::Endpoint,
    events::{EventSender, EventSource},
    genesis::RollupConfig,
    key::TestKey,
    lifecycle::Lifecycle,
    process::{ProcessSpec, Supervisor},
};

/// Default op-node RPC port.
pub const DEFAULT_OP_NODE_PORT: u16 = 9545;

/// What the dependent stack is started with.
#[derive(Debug, Clone)]
pub struct StackInputs {
    /// L1 RPC URL.
    pub l1_rpc: String,
    /// L2 engine endpoint.
    pub l2_engine: Endpoint,
    /// Deployed L2 output oracle proxy.
    pub output_oracle: Address,
    /// Funded key the stack signs with.
    pub key: TestKey,
    pub rollup_config: RollupConfig,
    /// Where `rollup_config` was written.
    pub rollup_config_path: PathBuf,
}

/// Shared services a launcher uses to run its processes.
#[derive(Clone, Copy)]
pub struct LaunchContext<'a> {
    pub supervisor: &'a Supervisor,
    pub events: &'a EventSender,
    pub lifecycle: &'a Lifecycle,
    pub cancel: &'a CancellationToken,
}

/// Launches the stack that sits on top of the L1 contracts and the L2 node.
pub trait DependentStack: Send + Sync {
    fn launch<'a>(
        &'a self,
        inputs: StackInputs,
        ctx: LaunchContext<'a>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send + 'a;
}

/// Binary and extra arguments of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBinary {
    pub binary: PathBuf,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

impl ServiceBinary {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            extra_args: Vec::new(),
        }
    }
}

/// op-node, op-batcher and op-proposer as local processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpStack {
    /// RPC endpoint of op-node, used by the batcher and the proposer.
    pub op_node_endpoint: Endpoint,
    pub op_node: ServiceBinary,
    pub op_batcher: ServiceBinary,
    pub op_proposer: ServiceBinary,
}

impl Default for OpStack {
    fn default() -> Self {
        Self {
            op_node_endpoint: Endpoint::localhost(DEFAULT_OP_NODE_PORT),
            op_node: ServiceBinary::new("op-node"),
            op_batcher: ServiceBinary::new("op-batcher"),
            op_proposer: ServiceBinary::new("op-proposer"),
        }
    }
}

impl OpStack {
    /// Write a fresh engine API secret.
    fn write_jwt_secret(dir: &Path) -> anyhow::Result<PathBuf> {
        let path = dir.join("jwt.hex");
        let secret: [u8; 32] = rand::random();
        std::fs::write(&path, hex::encode(secret))
            .with_context(|| format!("Failed to write JWT secret to {}", path.display()))?;
        Ok(path)
    }

    fn start(
        &self,
        name: &str,
        service: &ServiceBinary,
        args: Vec<String>,
        ctx: &LaunchContext<'_>,
    ) -> anyhow::Result<()> {
        let mut args = args;
        args.extend(service.extra_args.iter().cloned());
        let spec = ProcessSpec::new(name, &service.binary, args);

        let child = ctx
            .supervisor
            .spawn_forwarding(&spec, ctx.lifecycle, ctx.events)
            .with_context(|| format!("Failed to start {name}"))?;
        tracing::info!(%name, pid = ?child.pid(), "Service started");
        child.monitor(EventSource::DependentStack, ctx.events, ctx.lifecycle);
        Ok(())
    }
}

impl DependentStack for OpStack {
    fn launch<'a>(
        &'a self,
        inputs: StackInputs,
        ctx: LaunchContext<'a>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send + 'a {
        async move {
            let jwt = Self::write_jwt_secret(ctx.supervisor.log_dir())?;
            let key = inputs.key.private_key_hex();
            let op_node_rpc = self.op_node_endpoint.http_address();

            self.start(
                "op-node",
                &self.op_node,
                OpNodeCmdBuilder::new(
                    &inputs.l1_rpc,
                    inputs.l2_engine.ws_address(),
                    &jwt,
                    &inputs.rollup_config_path,
                )
                .rpc(self.op_node_endpoint.host.clone(), self.op_node_endpoint.port)
                .build(),
                &ctx,
            )?;

            self.start(
                "op-batcher",
                &self.op_batcher,
                OpBatcherCmdBuilder::new(
                    &inputs.l1_rpc,
                    inputs.l2_engine.http_address(),
                    &op_node_rpc,
                    &key,
                )
                .build(),
                &ctx,
            )?;

            self.start(
                "op-proposer",
                &self.op_proposer,
                OpProposerCmdBuilder::new(
                    &inputs.l1_rpc,
                    &op_node_rpc,
                    inputs.output_oracle.to_string(),
                    &key,
                )
                .build(),
                &ctx,
            )?;

            tracing::info!(
                output_oracle = %inputs.output_oracle,
                l2_chain_id = inputs.rollup_config.l2_chain_id,
                op_node = %self.op_node_endpoint,
                "OP stack launched"
            );
            Ok(())
        }
    }
}
