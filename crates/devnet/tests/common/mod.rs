//! Shared fixtures for the pipeline tests.
//!
//! The L1 simulator and the L2 engine are replaced by a minimal HTTP JSON-RPC
//! server, and `anvil`/`forge` by shell scripts, so the whole pipeline runs
//! without the real binaries.

#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    future::Future,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy_core::primitives::{Address, B256, address};
use anyhow::{Context, Result};
use rollnet_devnet::{
    Endpoint, EventListener, Lifecycle, LoggingListener, Stack, StackConfig,
    events::{L1EventListener, LogRecord, NodeEventListener, NodeSubsystem, StackEventListener},
    genesis::roles,
    services::{
        DependentStack, L2Genesis, L2Listeners, L2Node, L2NodeDeps, LaunchContext, StackInputs,
    },
};
use serde_json::{Value, json};
use tempdir::TempDir;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tokio_util::sync::CancellationToken;

pub const L1_BLOCK_NUMBER: u64 = 7;
pub const L1_BLOCK_TIMESTAMP: u64 = 1_700_000_000;
pub const L1_BLOCK_HASH: B256 = B256::repeat_byte(0xaa);
pub const L2_GENESIS_HASH: B256 = B256::repeat_byte(0xbb);
pub const OUTPUT_ORACLE: Address = address!("9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0");
pub const OPTIMISM_PORTAL: Address = address!("CF7Ed3AccA5a467e9e704C703E8D87F634fB0Fc9");
pub const SYSTEM_CONFIG: Address = address!("5FC8d32690cc91D4c39d9d3abcBD16989F875707");

/// Answers one JSON-RPC request: `Ok(result)` or `Err(message)`.
pub type Responder = Arc<dyn Fn(&str, &[Value]) -> Result<Value, String> + Send + Sync>;

/// A recorded JSON-RPC request.
#[derive(Debug, Clone)]
pub struct RpcCall {
    pub method: String,
    pub params: Vec<Value>,
}

pub type CallLog = Arc<Mutex<Vec<RpcCall>>>;

fn block(number: u64, hash: B256, timestamp: u64) -> Value {
    json!({
        "number": format!("0x{number:x}"),
        "hash": hash,
        "parentHash": B256::ZERO,
        "timestamp": format!("0x{timestamp:x}"),
        "transactions": [],
    })
}

/// Anvil's view: balances can be set and the chain has a latest block.
pub fn l1_responder() -> Responder {
    Arc::new(|method, _params| match method {
        "anvil_setBalance" => Ok(Value::Null),
        "eth_chainId" => Ok(json!("0x7a69")),
        "eth_getBlockByNumber" => Ok(block(L1_BLOCK_NUMBER, L1_BLOCK_HASH, L1_BLOCK_TIMESTAMP)),
        other => Err(format!("method {other} not found")),
    })
}

/// The L2 engine's view: only the genesis block.
pub fn l2_responder() -> Responder {
    Arc::new(|method, params| match (method, params.first().and_then(Value::as_str)) {
        ("eth_getBlockByNumber", Some("0x0")) => Ok(block(0, L2_GENESIS_HASH, L1_BLOCK_TIMESTAMP)),
        ("eth_getBlockByNumber", _) => Ok(Value::Null),
        (other, _) => Err(format!("method {other} not found")),
    })
}

/// Serve JSON-RPC over HTTP/1.1 on `listener` until `shutdown` fires.
pub async fn serve_rpc(
    listener: TcpListener,
    responder: Responder,
    calls: CallLog,
    shutdown: CancellationToken,
) -> Result<()> {
    loop {
        let (stream, _) = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted.context("Failed to accept connection")?,
        };
        let responder = responder.clone();
        let calls = calls.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = handle_connection(stream, responder, calls) => {}
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, responder: Responder, calls: CallLog) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let mut content_length = 0usize;
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).await? == 0 {
            return Ok(());
        }
        loop {
            let mut header = String::new();
            if reader.read_line(&mut header).await? == 0 {
                return Ok(());
            }
            let header = header.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse()?;
                }
            }
        }

        let mut body = vec![0; content_length];
        reader.read_exact(&mut body).await?;
        let request: Value = serde_json::from_slice(&body)?;

        let method = request["method"].as_str().unwrap_or_default().to_string();
        let params = request["params"].as_array().cloned().unwrap_or_default();
        let response = match responder(&method, &params) {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": request["id"], "result": result }),
            Err(message) => json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "error": { "code": -32601, "message": message },
            }),
        };
        calls.lock().unwrap().push(RpcCall { method, params });

        let payload = response.to_string();
        let head = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n",
            payload.len()
        );
        writer.write_all(head.as_bytes()).await?;
        writer.write_all(payload.as_bytes()).await?;
        writer.flush().await?;
    }
}

/// A JSON-RPC server standing in for Anvil's RPC port.
pub struct MockL1 {
    pub endpoint: Endpoint,
    pub calls: CallLog,
    shutdown: CancellationToken,
}

impl MockL1 {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::localhost(listener.local_addr().unwrap().port());
        let calls = CallLog::default();
        let shutdown = CancellationToken::new();
        tokio::spawn(serve_rpc(listener, l1_responder(), calls.clone(), shutdown.clone()));
        Self {
            endpoint,
            calls,
            shutdown,
        }
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|call| call.method.clone())
            .collect()
    }

    pub fn calls_to(&self, method: &str) -> Vec<RpcCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.method == method)
            .cloned()
            .collect()
    }
}

impl Drop for MockL1 {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// L2 node that serves the engine API in-process on the reserved listener.
#[derive(Default)]
pub struct MockL2Node {
    pub genesis: Mutex<Option<L2Genesis>>,
    /// Handles on the listeners it was given, to inspect their state later.
    pub listeners: Mutex<Option<L2Listeners>>,
    pub calls: CallLog,
}

impl L2Node for MockL2Node {
    fn start<'a>(
        &'a self,
        deps: L2NodeDeps,
        lifecycle: &'a Lifecycle,
        _cancel: &'a CancellationToken,
    ) -> impl Future<Output = Result<()>> + Send + 'a {
        async move {
            *self.genesis.lock().unwrap() = Some(deps.genesis.clone());
            *self.listeners.lock().unwrap() = Some(deps.listeners.clone());

            let engine = deps
                .listeners
                .engine_ws
                .hand_off()
                .context("Engine listener was already handed off")?;
            let engine = TcpListener::from_std(engine)?;
            deps.listeners.engine_http.close();
            deps.listeners.consensus.close();

            lifecycle.go(
                "mock-engine",
                serve_rpc(
                    engine,
                    l2_responder(),
                    self.calls.clone(),
                    lifecycle.shutdown_token(),
                ),
            );
            Ok(())
        }
    }
}

/// Dependent stack that only records what it was launched with.
#[derive(Default)]
pub struct RecordingStack {
    pub inputs: Mutex<Option<StackInputs>>,
}

impl DependentStack for RecordingStack {
    fn launch<'a>(
        &'a self,
        inputs: StackInputs,
        _ctx: LaunchContext<'a>,
    ) -> impl Future<Output = Result<()>> + Send + 'a {
        async move {
            *self.inputs.lock().unwrap() = Some(inputs);
            Ok(())
        }
    }
}

/// Dependent stack whose launch always fails.
pub struct FailingStack;

impl DependentStack for FailingStack {
    fn launch<'a>(
        &'a self,
        _inputs: StackInputs,
        _ctx: LaunchContext<'a>,
    ) -> impl Future<Output = Result<()>> + Send + 'a {
        async move { anyhow::bail!("op-node refused to start") }
    }
}

/// Listener that records every callback.
#[derive(Default)]
pub struct RecordingListener {
    pub seen: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    /// Wait until at least one callback fired.
    pub async fn wait_for_any(&self) -> Result<()> {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.seen.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .context("Listener was never called")
    }
}

impl L1EventListener for RecordingListener {
    fn on_l1_simulator_err(&self, err: &anyhow::Error) {
        self.seen.lock().unwrap().push(format!("l1: {err:#}"));
    }
}

impl NodeEventListener for RecordingListener {
    fn on_node_err(&self, subsystem: NodeSubsystem, err: &anyhow::Error) {
        self.seen.lock().unwrap().push(format!("{subsystem}: {err:#}"));
    }
}

impl StackEventListener for RecordingListener {
    fn on_stack_log(&self, _record: &LogRecord) {}

    fn on_stack_err(&self, service: &str, err: &anyhow::Error) {
        self.seen.lock().unwrap().push(format!("{service}: {err:#}"));
    }
}

/// Write an executable shell script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A trimmed `hardhat.json` with the L1 chain ID the contracts ship with.
pub fn hardhat_template() -> Value {
    json!({
        "l1ChainID": 900,
        "l2ChainID": 901,
        "l2BlockTime": 2,
        "l1BlockTime": 15,
        "maxSequencerDrift": 300,
        "sequencerWindowSize": 200,
        "channelTimeout": 120,
        "p2pSequencerAddress": "0x9965507D1a55bcC2695C58ba16FB37d819B0A4dc",
        "batchInboxAddress": "0xff00000000000000000000000000000000000901",
        "batchSenderAddress": "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC",
        "gasPriceOracleOverhead": 2100,
        "gasPriceOracleScalar": 1000000,
        "l2GenesisBlockGasLimit": "0x1c9c380",
        "l2GenesisRegolithTimeOffset": "0x0",
        "fundDevAccounts": true
    })
}

/// Scratch directories and a config pointing at them.
pub struct TestContext {
    pub dir: TempDir,
    pub config: StackConfig,
}

impl TestContext {
    pub fn new(prefix: &str) -> Self {
        init_test_tracing();
        let dir = TempDir::new(prefix).unwrap();
        let contracts = dir.path().join("contracts");
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();

        let mut config = StackConfig {
            contracts_root: contracts,
            artifacts_dir: dir.path().join("artifacts"),
            readiness_horizon_secs: 5,
            engine: Endpoint::localhost(0),
            consensus: Endpoint::localhost(0),
            ..Default::default()
        };
        config.anvil.binary = write_script(&bin, "anvil", "exec sleep 600");
        config.forge.binary = write_script(&bin, "forge", "exit 0");

        Self { dir, config }
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.dir.path().join("bin")
    }

    /// Replace the forge stand-in.
    pub fn forge_script(&mut self, body: &str) {
        self.config.forge.binary = write_script(&self.bin_dir(), "forge", body);
    }

    /// Lay out the files the deployment script would leave behind.
    pub fn write_contracts(&self) {
        let root = &self.config.contracts_root;
        std::fs::create_dir_all(root.join("deploy-config")).unwrap();
        std::fs::write(
            root.join("deploy-config").join("hardhat.json"),
            hardhat_template().to_string(),
        )
        .unwrap();

        let deployments = root.join("deployments").join("hardhat");
        std::fs::create_dir_all(&deployments).unwrap();
        let deploy: BTreeMap<&str, Address> = [
            (roles::OPTIMISM_PORTAL_PROXY, OPTIMISM_PORTAL),
            (roles::SYSTEM_CONFIG_PROXY, SYSTEM_CONFIG),
            (roles::L2_OUTPUT_ORACLE_PROXY, OUTPUT_ORACLE),
            (roles::L1_STANDARD_BRIDGE_PROXY, Address::ZERO),
        ]
        .into_iter()
        .collect();
        std::fs::write(
            deployments.join(".deploy"),
            serde_json::to_string_pretty(&deploy).unwrap(),
        )
        .unwrap();
    }

    pub fn stack<N: L2Node, D: DependentStack>(&self, node: N, dependent: D) -> Stack<N, D> {
        self.stack_with_listener(node, dependent, Arc::new(LoggingListener))
    }

    pub fn stack_with_listener<N: L2Node, D: DependentStack>(
        &self,
        node: N,
        dependent: D,
        listener: Arc<dyn EventListener>,
    ) -> Stack<N, D> {
        Stack::new(self.config.clone(), node, dependent, listener)
    }
}

/// Initialize tracing for tests (idempotent).
fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init()
        .ok();
}

/// Poll until `path` exists.
pub async fn wait_for_file(path: &Path) -> Result<()> {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !path.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .with_context(|| format!("{} never appeared", path.display()))
}

/// A loopback port with nothing listening on it.
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
