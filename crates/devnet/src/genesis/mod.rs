//! Config derivation: ties the L1 deployment to the L2 genesis.

mod deploy_config;
mod deployments;
mod rollup;

use std::path::Path;

use alloy_core::primitives::B256;

pub use deploy_config::{DeployConfig, DeployOverrides};
pub use deployments::{L1Deployments, roles};
pub use rollup::{BlockId, RollupConfig, RollupGenesis, SystemConfig};

use crate::{rpc::BlockSnapshot, services::anvil::ANVIL_CHAIN_ID};

/// The contracts only ship a template for Hardhat; Anvil is compatible with it.
pub const NETWORK_NAME: &str = "hardhat";

/// Facts discovered by earlier stages that the derivation binds together.
#[derive(Debug, Clone, Copy)]
pub struct DerivationInputs<'a> {
    pub l1_block: &'a BlockSnapshot,
    pub l2_genesis_hash: B256,
    pub l2_chain_id: u64,
    /// Block number the L2 genesis is anchored at.
    pub l2_genesis_number: u64,
    pub overrides: &'a DeployOverrides,
}

/// Output of [`derive`].
#[derive(Debug, Clone)]
pub struct Derived {
    pub deploy_config: DeployConfig,
    pub rollup_config: RollupConfig,
}

/// Load the deployment file and the network deploy config from the contracts tree.
pub fn load(contracts_root: &Path, network: &str) -> anyhow::Result<(DeployConfig, L1Deployments)> {
    let deployments = L1Deployments::load(&L1Deployments::path(contracts_root, network))?;
    let deploy_config = DeployConfig::load(contracts_root, network)?;
    Ok((deploy_config, deployments))
}

/// Override the template and derive the rollup config.
///
/// The L1 chain ID is always forced to Anvil's, since the upstream Hardhat
/// template carries a different one.
pub fn derive(
    mut deploy_config: DeployConfig,
    deployments: &L1Deployments,
    inputs: DerivationInputs<'_>,
) -> anyhow::Result<Derived> {
    if deploy_config.l1_chain_id != ANVIL_CHAIN_ID {
        tracing::debug!(
            template = deploy_config.l1_chain_id,
            forced = ANVIL_CHAIN_ID,
            "Overriding L1 chain ID"
        );
    }
    deploy_config.l1_chain_id = ANVIL_CHAIN_ID;
    deploy_config.l2_chain_id = inputs.l2_chain_id;
    deploy_config.apply(inputs.overrides);
    deploy_config.set_deployments(deployments);
    deploy_config.check()?;

    let rollup_config = deploy_config.rollup_config(
        inputs.l1_block,
        inputs.l2_genesis_hash,
        inputs.l2_genesis_number,
    )?;

    tracing::info!(
        l1_chain_id = rollup_config.l1_chain_id,
        l2_chain_id = rollup_config.l2_chain_id,
        l1_anchor = rollup_config.genesis.l1.number,
        l2_genesis = %rollup_config.genesis.l2.hash,
        "Derived rollup config"
    );

    Ok(Derived {
        deploy_config,
        rollup_config,
    })
}
