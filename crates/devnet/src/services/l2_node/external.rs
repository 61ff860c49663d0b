//! L2 node run as an external binary.

use std::{future::Future, path::PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{L2Node, L2NodeDeps};
use crate::{
    events::EventSource,
    lifecycle::Lifecycle,
    process::ProcessSpec,
};

/// Builder for the external node's arguments.
#[derive(Debug, Clone)]
pub struct L2NodeCmdBuilder {
    genesis: String,
    engine_http: String,
    engine_ws: String,
    consensus: String,
    extra_args: Vec<String>,
}

impl L2NodeCmdBuilder {
    /// Create a new builder. Addresses are `host:port`.
    pub fn new(
        genesis: impl Into<String>,
        engine_http: impl Into<String>,
        engine_ws: impl Into<String>,
        consensus: impl Into<String>,
    ) -> Self {
        Self {
            genesis: genesis.into(),
            engine_http: engine_http.into(),
            engine_ws: engine_ws.into(),
            consensus: consensus.into(),
            extra_args: Vec::new(),
        }
    }

    /// Add extra arguments.
    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Build the arguments as a vector of strings.
    pub fn build(self) -> Vec<String> {
        let mut cmd = vec![
            "--genesis".to_string(),
            self.genesis,
            "--engine-http".to_string(),
            self.engine_http,
            "--engine-ws".to_string(),
            self.engine_ws,
            "--consensus".to_string(),
            self.consensus,
        ];
        cmd.extend(self.extra_args);
        cmd
    }
}

/// Runs the node binary, passing it the reserved addresses.
///
/// The reserved sockets are released right before the spawn so the child can
/// bind the same ports. The process keeps its own state, so `deps.stores` and
/// `deps.adapters` go unused; they are there for in-process [`L2Node`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalL2Node {
    /// Path or name of the node binary.
    pub binary: PathBuf,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

impl Default for ExternalL2Node {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("rollnet-l2"),
            extra_args: Vec::new(),
        }
    }
}

impl L2Node for ExternalL2Node {
    fn start<'a>(
        &'a self,
        deps: L2NodeDeps,
        lifecycle: &'a Lifecycle,
        _cancel: &'a CancellationToken,
    ) -> impl Future<Output = anyhow::Result<()>> + Send + 'a {
        async move {
            let genesis_path = deps.supervisor.log_dir().join("l2-genesis.json");
            deps.genesis.write_to(&genesis_path)?;

            let listeners = &deps.listeners;
            for listener in listeners.all() {
                drop(listener.hand_off());
            }

            let args = L2NodeCmdBuilder::new(
                genesis_path.display().to_string(),
                listeners.engine_http.endpoint().to_string(),
                listeners.engine_ws.endpoint().to_string(),
                listeners.consensus.endpoint().to_string(),
            )
            .extra_args(self.extra_args.clone())
            .build();
            let spec = ProcessSpec::new("l2-node", &self.binary, args);

            let child = deps
                .supervisor
                .spawn(&spec, lifecycle)
                .with_context(|| format!("Failed to start {spec}"))?;
            tracing::info!(
                pid = ?child.pid(),
                engine = %listeners.engine_ws.endpoint(),
                consensus = %listeners.consensus.endpoint(),
                "L2 node started"
            );
            child.monitor(EventSource::L2Node, &deps.events, lifecycle);

            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_node_cmd_builder() {
        let cmd = L2NodeCmdBuilder::new(
            "/tmp/devnet/l2-genesis.json",
            "127.0.0.1:40001",
            "127.0.0.1:9000",
            "127.0.0.1:26657",
        )
        .extra_args(["--log-level", "debug"])
        .build();

        assert_eq!(
            cmd,
            vec![
                "--genesis",
                "/tmp/devnet/l2-genesis.json",
                "--engine-http",
                "127.0.0.1:40001",
                "--engine-ws",
                "127.0.0.1:9000",
                "--consensus",
                "127.0.0.1:26657",
                "--log-level",
                "debug",
            ]
        );
    }
}
