//! Addresses written by the deployment script.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use anyhow::Context;
use derive_more::{Deref, From};
use serde::{Deserialize, Serialize};

/// Contract role names as they appear in the deployment file.
pub mod roles {
    pub const ADDRESS_MANAGER: &str = "AddressManager";
    pub const DISPUTE_GAME_FACTORY_PROXY: &str = "DisputeGameFactoryProxy";
    pub const L1_CROSS_DOMAIN_MESSENGER_PROXY: &str = "L1CrossDomainMessengerProxy";
    pub const L1_ERC721_BRIDGE_PROXY: &str = "L1ERC721BridgeProxy";
    pub const L1_STANDARD_BRIDGE_PROXY: &str = "L1StandardBridgeProxy";
    pub const L2_OUTPUT_ORACLE_PROXY: &str = "L2OutputOracleProxy";
    pub const OPTIMISM_MINTABLE_ERC20_FACTORY_PROXY: &str = "OptimismMintableERC20FactoryProxy";
    pub const OPTIMISM_PORTAL_PROXY: &str = "OptimismPortalProxy";
    pub const PROTOCOL_VERSIONS_PROXY: &str = "ProtocolVersionsProxy";
    pub const PROXY_ADMIN: &str = "ProxyAdmin";
    pub const SYSTEM_CONFIG_PROXY: &str = "SystemConfigProxy";
}

/// Contract role name to deployed address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Deref, From)]
#[serde(transparent)]
pub struct L1Deployments(BTreeMap<String, Address>);

impl L1Deployments {
    /// `<contracts_root>/deployments/<network>/.deploy`.
    pub fn path(contracts_root: &Path, network: &str) -> PathBuf {
        contracts_root
            .join("deployments")
            .join(network)
            .join(".deploy")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read L1 deployments from {}", path.display()))?;
        let deployments: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse L1 deployments in {}", path.display()))?;
        tracing::debug!(path = %path.display(), contracts = deployments.len(), "Loaded L1 deployments");
        Ok(deployments)
    }

    /// Address of `role`, if deployed at a non-zero address.
    pub fn address(&self, role: &str) -> Option<Address> {
        self.0.get(role).copied().filter(|addr| !addr.is_zero())
    }

    /// Address of `role`. Missing or zero addresses are errors.
    pub fn require(&self, role: &str) -> anyhow::Result<Address> {
        self.address(role)
            .with_context(|| format!("{role} is missing from the L1 deployments"))
    }

    pub fn l2_output_oracle(&self) -> anyhow::Result<Address> {
        self.require(roles::L2_OUTPUT_ORACLE_PROXY)
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::address;
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn test_load_deploy_file() {
        let dir = TempDir::new("rollnet-deployments").unwrap();
        let path = L1Deployments::path(dir.path(), "hardhat");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{
                "L2OutputOracleProxy": "0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0",
                "OptimismPortalProxy": "0xCf7Ed3AccA5a467e9e704C703E8D87F634fB0Fc9",
                "ProxyAdmin": "0x0000000000000000000000000000000000000000"
            }"#,
        )
        .unwrap();

        let deployments = L1Deployments::load(&path).unwrap();

        assert_eq!(
            deployments.l2_output_oracle().unwrap(),
            address!("9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0")
        );
        assert!(deployments.require(roles::PROXY_ADMIN).is_err());
        assert!(deployments.require(roles::SYSTEM_CONFIG_PROXY).is_err());
    }

    #[test]
    fn test_malformed_deploy_file() {
        let dir = TempDir::new("rollnet-deployments").unwrap();
        let path = dir.path().join(".deploy");
        std::fs::write(&path, "{ not json").unwrap();

        let err = L1Deployments::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse L1 deployments"));
    }
}
