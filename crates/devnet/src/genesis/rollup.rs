//! Rollup configuration consumed by the rollup node (`rollup.json`).

use std::path::Path;

use alloy_core::primitives::{Address, B256, U256};
use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::deploy_config::DeployConfig;
use crate::rpc::BlockSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockId {
    pub hash: B256,
    pub number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfig {
    pub batcher_addr: Address,
    pub overhead: B256,
    pub scalar: B256,
    pub gas_limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupGenesis {
    pub l1: BlockId,
    pub l2: BlockId,
    pub l2_time: u64,
    pub system_config: SystemConfig,
}

/// Derived rollup parameters. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupConfig {
    pub genesis: RollupGenesis,
    pub block_time: u64,
    pub max_sequencer_drift: u64,
    pub seq_window_size: u64,
    pub channel_timeout: u64,
    pub l1_chain_id: u64,
    pub l2_chain_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regolith_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canyon_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ecotone_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fjord_time: Option<u64>,
    pub batch_inbox_address: Address,
    pub deposit_contract_address: Address,
    pub l1_system_config_address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_versions_address: Option<Address>,
}

impl RollupConfig {
    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize rollup config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write rollup config to {}", path.display()))
    }
}

impl DeployConfig {
    /// Bind this config to an L1 start block and an L2 genesis block.
    ///
    /// The L2 genesis time is the L1 block's timestamp, so L2 never starts before L1.
    pub fn rollup_config(
        &self,
        l1_start: &BlockSnapshot,
        l2_genesis_hash: B256,
        l2_genesis_number: u64,
    ) -> anyhow::Result<RollupConfig> {
        let deposit_contract_address = self
            .optimism_portal_proxy
            .context("OptimismPortalProxy cannot be address(0)")?;
        let l1_system_config_address = self
            .system_config_proxy
            .context("SystemConfigProxy cannot be address(0)")?;

        let genesis_time = l1_start.timestamp;

        Ok(RollupConfig {
            genesis: RollupGenesis {
                l1: BlockId {
                    hash: l1_start.hash,
                    number: l1_start.number,
                },
                l2: BlockId {
                    hash: l2_genesis_hash,
                    number: l2_genesis_number,
                },
                l2_time: genesis_time,
                system_config: SystemConfig {
                    batcher_addr: self.batch_sender_address,
                    overhead: B256::from(U256::from(self.gas_price_oracle_overhead)),
                    scalar: B256::from(U256::from(self.gas_price_oracle_scalar)),
                    gas_limit: self.l2_genesis_block_gas_limit.to(),
                },
            },
            block_time: self.l2_block_time,
            max_sequencer_drift: self.max_sequencer_drift,
            seq_window_size: self.sequencer_window_size,
            channel_timeout: self.channel_timeout,
            l1_chain_id: self.l1_chain_id,
            l2_chain_id: self.l2_chain_id,
            regolith_time: Self::fork_time(
                genesis_time,
                self.l2_genesis_regolith_time_offset,
                "l2GenesisRegolithTimeOffset",
            )?,
            canyon_time: Self::fork_time(
                genesis_time,
                self.l2_genesis_canyon_time_offset,
                "l2GenesisCanyonTimeOffset",
            )?,
            delta_time: Self::fork_time(
                genesis_time,
                self.l2_genesis_delta_time_offset,
                "l2GenesisDeltaTimeOffset",
            )?,
            ecotone_time: Self::fork_time(
                genesis_time,
                self.l2_genesis_ecotone_time_offset,
                "l2GenesisEcotoneTimeOffset",
            )?,
            fjord_time: Self::fork_time(
                genesis_time,
                self.l2_genesis_fjord_time_offset,
                "l2GenesisFjordTimeOffset",
            )?,
            batch_inbox_address: self.batch_inbox_address,
            deposit_contract_address,
            l1_system_config_address,
            protocol_versions_address: self.protocol_versions_proxy,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::{U64, address};
    use serde_json::json;

    use super::*;
    use crate::genesis::deploy_config::tests::hardhat_template;

    fn l1_block() -> BlockSnapshot {
        BlockSnapshot {
            number: 42,
            hash: B256::repeat_byte(0xaa),
            parent_hash: B256::repeat_byte(0xa9),
            timestamp: 1_700_000_000,
        }
    }

    fn config() -> DeployConfig {
        let mut config: DeployConfig = serde_json::from_value(hardhat_template()).unwrap();
        config.optimism_portal_proxy = Some(address!("CF7Ed3AccA5a467e9e704C703E8D87F634fB0Fc9"));
        config.system_config_proxy = Some(address!("5FC8d32690cc91D4c39d9d3abcBD16989F875707"));
        config
    }

    #[test]
    fn test_rollup_config_binds_blocks() {
        let rollup = config()
            .rollup_config(&l1_block(), B256::repeat_byte(0xbb), 1)
            .unwrap();

        assert_eq!(rollup.genesis.l1.hash, B256::repeat_byte(0xaa));
        assert_eq!(rollup.genesis.l1.number, 42);
        assert_eq!(rollup.genesis.l2.hash, B256::repeat_byte(0xbb));
        assert_eq!(rollup.genesis.l2.number, 1);
        assert_eq!(rollup.genesis.l2_time, 1_700_000_000);
        assert_eq!(rollup.genesis.system_config.gas_limit, 30_000_000);
        assert_eq!(rollup.regolith_time, Some(1_700_000_000));
        assert_eq!(rollup.canyon_time, Some(1_700_000_064));
        assert_eq!(rollup.ecotone_time, None);
        assert_eq!(
            rollup.deposit_contract_address,
            address!("CF7Ed3AccA5a467e9e704C703E8D87F634fB0Fc9")
        );
    }

    #[test]
    fn test_rollup_config_requires_portal() {
        let mut config = config();
        config.optimism_portal_proxy = None;

        let err = config
            .rollup_config(&l1_block(), B256::ZERO, 1)
            .unwrap_err();
        assert!(err.to_string().contains("OptimismPortalProxy"));
    }

    #[test]
    fn test_rollup_config_rejects_overflowing_fork_offset() {
        let mut config = config();
        config.l2_genesis_fjord_time_offset = Some(U64::MAX);

        let err = config
            .rollup_config(&l1_block(), B256::repeat_byte(0xbb), 1)
            .unwrap_err();
        assert!(err.to_string().contains("l2GenesisFjordTimeOffset"));
    }

    #[test]
    fn test_rollup_json_field_names() {
        let rollup = config()
            .rollup_config(&l1_block(), B256::repeat_byte(0xbb), 1)
            .unwrap();
        let value = serde_json::to_value(&rollup).unwrap();

        assert_eq!(value["genesis"]["l2_time"], json!(1_700_000_000u64));
        assert_eq!(value["genesis"]["system_config"]["gasLimit"], json!(30_000_000u64));
        assert_eq!(value["seq_window_size"], json!(200));
        assert!(value.get("delta_time").is_none());
        assert_eq!(
            value["genesis"]["system_config"]["overhead"],
            json!("0x0000000000000000000000000000000000000000000000000000000000000834")
        );
    }
}
