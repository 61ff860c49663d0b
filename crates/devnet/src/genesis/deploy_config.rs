//! Network deploy configuration (`deploy-config/<network>.json`).

use std::path::{Path, PathBuf};

use alloy_core::primitives::{Address, U64};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::deployments::{L1Deployments, roles};

/// Optional adjustments applied on top of the network template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployOverrides {
    /// L1 block time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_block_time: Option<u64>,
    /// L2 block time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l2_block_time: Option<u64>,
    /// Sequencer window size in L1 blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequencer_window_size: Option<u64>,
}

impl DeployOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// The L1/L2 parameter set used to derive the rollup config.
///
/// Fields this crate does not interpret are kept in `extra` so the file can be
/// written back unchanged apart from the overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    #[serde(rename = "l1ChainID")]
    pub l1_chain_id: u64,
    #[serde(rename = "l2ChainID")]
    pub l2_chain_id: u64,
    pub l1_block_time: u64,
    pub l2_block_time: u64,
    pub max_sequencer_drift: u64,
    pub sequencer_window_size: u64,
    pub channel_timeout: u64,
    pub batch_inbox_address: Address,
    pub batch_sender_address: Address,
    #[serde(default)]
    pub gas_price_oracle_overhead: u64,
    #[serde(default)]
    pub gas_price_oracle_scalar: u64,
    pub l2_genesis_block_gas_limit: U64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l2_genesis_regolith_time_offset: Option<U64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l2_genesis_canyon_time_offset: Option<U64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l2_genesis_delta_time_offset: Option<U64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l2_genesis_ecotone_time_offset: Option<U64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l2_genesis_fjord_time_offset: Option<U64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_standard_bridge_proxy: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_cross_domain_messenger_proxy: Option<Address>,
    #[serde(
        rename = "l1ERC721BridgeProxy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub l1_erc721_bridge_proxy: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_config_proxy: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimism_portal_proxy: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_versions_proxy: Option<Address>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeployConfig {
    /// `<contracts_root>/deploy-config/<network>.json`.
    pub fn path(contracts_root: &Path, network: &str) -> PathBuf {
        contracts_root
            .join("deploy-config")
            .join(format!("{network}.json"))
    }

    pub fn load(contracts_root: &Path, network: &str) -> anyhow::Result<Self> {
        let path = Self::path(contracts_root, network);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read deploy config from {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse deploy config in {}", path.display()))?;
        tracing::debug!(path = %path.display(), %network, "Loaded deploy config");
        Ok(config)
    }

    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize deploy config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write deploy config to {}", path.display()))
    }

    /// Copy the proxy addresses the rollup config needs from `deployments`.
    pub fn set_deployments(&mut self, deployments: &L1Deployments) {
        self.l1_standard_bridge_proxy = deployments.address(roles::L1_STANDARD_BRIDGE_PROXY);
        self.l1_cross_domain_messenger_proxy =
            deployments.address(roles::L1_CROSS_DOMAIN_MESSENGER_PROXY);
        self.l1_erc721_bridge_proxy = deployments.address(roles::L1_ERC721_BRIDGE_PROXY);
        self.system_config_proxy = deployments.address(roles::SYSTEM_CONFIG_PROXY);
        self.optimism_portal_proxy = deployments.address(roles::OPTIMISM_PORTAL_PROXY);
        self.protocol_versions_proxy = deployments.address(roles::PROTOCOL_VERSIONS_PROXY);
    }

    pub fn apply(&mut self, overrides: &DeployOverrides) {
        if let Some(secs) = overrides.l1_block_time {
            self.l1_block_time = secs;
        }
        if let Some(secs) = overrides.l2_block_time {
            self.l2_block_time = secs;
        }
        if let Some(size) = overrides.sequencer_window_size {
            self.sequencer_window_size = size;
        }
    }

    /// Reject configurations that cannot produce a usable rollup config.
    pub fn check(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.l1_chain_id != 0, "l1ChainID cannot be 0");
        anyhow::ensure!(self.l2_chain_id != 0, "l2ChainID cannot be 0");
        anyhow::ensure!(
            self.l1_chain_id != self.l2_chain_id,
            "l1ChainID and l2ChainID must differ, both are {}",
            self.l1_chain_id
        );
        anyhow::ensure!(self.l1_block_time != 0, "l1BlockTime cannot be 0");
        anyhow::ensure!(self.l2_block_time != 0, "l2BlockTime cannot be 0");
        anyhow::ensure!(
            self.l2_block_time <= self.l1_block_time,
            "l2BlockTime ({}) cannot be larger than l1BlockTime ({})",
            self.l2_block_time,
            self.l1_block_time
        );
        anyhow::ensure!(self.sequencer_window_size != 0, "sequencerWindowSize cannot be 0");
        anyhow::ensure!(self.channel_timeout != 0, "channelTimeout cannot be 0");
        anyhow::ensure!(
            !self.batch_inbox_address.is_zero(),
            "batchInboxAddress cannot be address(0)"
        );
        anyhow::ensure!(
            self.optimism_portal_proxy.is_some(),
            "optimismPortalProxy cannot be address(0)"
        );
        anyhow::ensure!(
            self.system_config_proxy.is_some(),
            "systemConfigProxy cannot be address(0)"
        );
        Ok(())
    }

    /// Activation time of a fork scheduled `offset` seconds after `genesis_time`.
    pub(crate) fn fork_time(
        genesis_time: u64,
        offset: Option<U64>,
        field: &str,
    ) -> anyhow::Result<Option<u64>> {
        offset
            .map(|offset| {
                genesis_time
                    .checked_add(offset.to::<u64>())
                    .with_context(|| format!("{field} ({offset}) overflows the L2 genesis time"))
            })
            .transpose()
    }
}
