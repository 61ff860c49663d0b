//! JSON-RPC access to the L1 simulator and the L2 node.

use std::time::Duration;

use alloy_core::primitives::{Address, B256, U64, U256};
use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use url::Url;

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {method} request to {url}"))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {method} response"))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error from {method}: {}",
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .with_context(|| format!("No result in {method} response"))?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {method} result"))
}

/// The block fields the pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSnapshot {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    number: U64,
    hash: B256,
    parent_hash: B256,
    timestamp: U64,
}

impl From<RawBlock> for BlockSnapshot {
    fn from(raw: RawBlock) -> Self {
        Self {
            number: raw.number.to(),
            hash: raw.hash,
            parent_hash: raw.parent_hash,
            timestamp: raw.timestamp.to(),
        }
    }
}

/// Thin JSON-RPC client bound to one endpoint.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: reqwest::Client,
    url: Url,
}

impl RpcClient {
    pub fn new(url: Url) -> anyhow::Result<Self> {
        Ok(Self {
            client: create_client()?,
            url,
        })
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> anyhow::Result<T> {
        json_rpc_call(&self.client, self.url.as_str(), method, params).await
    }

    /// `anvil_setBalance`.
    pub async fn set_balance(&self, address: Address, wei: U256) -> anyhow::Result<()> {
        let _: Value = self
            .call(
                "anvil_setBalance",
                vec![json!(address.to_string()), json!(format!("0x{wei:x}"))],
            )
            .await?;
        Ok(())
    }

    pub async fn latest_block(&self) -> anyhow::Result<BlockSnapshot> {
        self.block_by_tag("latest").await
    }

    pub async fn genesis_block(&self) -> anyhow::Result<BlockSnapshot> {
        self.block_by_tag("0x0").await
    }

    async fn block_by_tag(&self, tag: &str) -> anyhow::Result<BlockSnapshot> {
        let block: Option<RawBlock> = self
            .call("eth_getBlockByNumber", vec![json!(tag), json!(false)])
            .await?;
        block
            .map(BlockSnapshot::from)
            .with_context(|| format!("Block {tag} not found at {}", self.url))
    }
}
