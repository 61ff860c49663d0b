//! Ephemeral funding key.

use std::fmt;

use alloy_core::primitives::U256;
use alloy_signer_local::PrivateKeySigner;
use derive_more::Deref;

/// One ether in wei.
pub const ONE_ETH_WEI: u128 = 1_000_000_000_000_000_000;

/// Balance given to the funding key, in ether.
pub const FUNDING_ETH: u128 = 10;

/// Balance given to the funding key, in wei.
pub fn funding_amount() -> U256 {
    U256::from(FUNDING_ETH * ONE_ETH_WEI)
}

/// A secp256k1 key generated for one devnet run. Never written to disk by the orchestrator.
#[derive(Clone, Deref)]
pub struct TestKey {
    #[deref]
    signer: PrivateKeySigner,
}

impl TestKey {
    pub fn generate() -> Self {
        let key = Self {
            signer: PrivateKeySigner::random(),
        };
        tracing::debug!(address = %key.address(), "Generated test key");
        key
    }

    /// Private key as bare hex, without a `0x` prefix.
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signer.to_bytes())
    }
}

impl fmt::Debug for TestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestKey")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
