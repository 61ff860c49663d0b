//! Contract deployment through `forge script`.

mod cmd;

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub use cmd::ForgeScriptCmdBuilder;

use crate::{
    key::TestKey,
    lifecycle::Lifecycle,
    process::{ProcessSpec, Supervisor},
};

/// Configuration for the deployment script runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// Path or name of the `forge` binary.
    pub binary: PathBuf,
    /// Extra arguments appended to `forge script`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("forge"),
            extra_args: Vec::new(),
        }
    }
}

impl ForgeConfig {
    /// Run the deployment script and block until it exits.
    ///
    /// A nonzero exit is an error. Cancelling `cancel` kills the script.
    pub async fn deploy(
        &self,
        contracts_root: &Path,
        rpc_url: &str,
        deployer: &TestKey,
        supervisor: &Supervisor,
        lifecycle: &Lifecycle,
        cancel: &CancellationToken,
    ) -> Result<(), anyhow::Error> {
        let args = ForgeScriptCmdBuilder::new(contracts_root, rpc_url, deployer.private_key_hex())
            .extra_args(self.extra_args.clone())
            .build();
        let spec = ProcessSpec::new("forge", &self.binary, args);

        tracing::info!(
            root = %contracts_root.display(),
            %rpc_url,
            deployer = %deployer.address(),
            "Deploying L1 contracts"
        );

        supervisor
            .spawn(&spec, lifecycle)
            .context("Failed to start forge")?
            .wait(cancel)
            .await
            .context("Failed to run forge")?;

        tracing::info!("L1 contracts deployed");
        Ok(())
    }
}
