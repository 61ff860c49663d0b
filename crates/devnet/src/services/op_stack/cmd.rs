//! Command builders for op-node, op-batcher and op-proposer.

use std::path::Path;

/// Builder for op-node commands.
#[derive(Debug, Clone)]
pub struct OpNodeCmdBuilder {
    l1_rpc: String,
    l2_engine: String,
    jwt_secret: String,
    rollup_config: String,
    rpc_addr: String,
    rpc_port: u16,
    sequencer: bool,
    extra_args: Vec<String>,
}

impl OpNodeCmdBuilder {
    /// Create a new op-node command builder.
    pub fn new(
        l1_rpc: impl Into<String>,
        l2_engine: impl Into<String>,
        jwt_secret: impl AsRef<Path>,
        rollup_config: impl AsRef<Path>,
    ) -> Self {
        Self {
            l1_rpc: l1_rpc.into(),
            l2_engine: l2_engine.into(),
            jwt_secret: jwt_secret.as_ref().display().to_string(),
            rollup_config: rollup_config.as_ref().display().to_string(),
            rpc_addr: "127.0.0.1".to_string(),
            rpc_port: 9545,
            sequencer: true,
            extra_args: Vec::new(),
        }
    }

    /// Set the RPC server address and port.
    pub fn rpc(mut self, addr: impl Into<String>, port: u16) -> Self {
        self.rpc_addr = addr.into();
        self.rpc_port = port;
        self
    }

    /// Enable or disable sequencing.
    pub fn sequencer(mut self, enabled: bool) -> Self {
        self.sequencer = enabled;
        self
    }

    /// Add extra arguments.
    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Build the arguments as a vector of strings.
    pub fn build(self) -> Vec<String> {
        let mut cmd = vec![
            "--l1".to_string(),
            self.l1_rpc,
            "--l1.rpckind".to_string(),
            "basic".to_string(),
            "--l1.trustrpc".to_string(),
            "--l2".to_string(),
            self.l2_engine,
            "--l2.jwt-secret".to_string(),
            self.jwt_secret,
            "--rollup.config".to_string(),
            self.rollup_config,
            "--rpc.addr".to_string(),
            self.rpc_addr,
            "--rpc.port".to_string(),
            self.rpc_port.to_string(),
            "--p2p.disable".to_string(),
        ];

        if self.sequencer {
            cmd.push("--sequencer.enabled".to_string());
            cmd.push("--sequencer.l1-confs".to_string());
            cmd.push("0".to_string());
            cmd.push("--verifier.l1-confs".to_string());
            cmd.push("0".to_string());
        }

        cmd.extend(self.extra_args);

        cmd
    }
}

/// Builder for op-batcher commands.
#[derive(Debug, Clone)]
pub struct OpBatcherCmdBuilder {
    l1_eth_rpc: String,
    l2_eth_rpc: String,
    rollup_rpc: String,
    private_key: String,
    poll_interval: String,
    max_channel_duration: u64,
    extra_args: Vec<String>,
}

impl OpBatcherCmdBuilder {
    /// Create a new op-batcher command builder.
    pub fn new(
        l1_eth_rpc: impl Into<String>,
        l2_eth_rpc: impl Into<String>,
        rollup_rpc: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        Self {
            l1_eth_rpc: l1_eth_rpc.into(),
            l2_eth_rpc: l2_eth_rpc.into(),
            rollup_rpc: rollup_rpc.into(),
            private_key: private_key.into(),
            poll_interval: "1s".to_string(),
            max_channel_duration: 1,
            extra_args: Vec::new(),
        }
    }

    /// Set the poll interval.
    pub fn poll_interval(mut self, interval: impl Into<String>) -> Self {
        self.poll_interval = interval.into();
        self
    }

    /// Add extra arguments.
    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Build the arguments as a vector of strings.
    pub fn build(self) -> Vec<String> {
        let mut cmd = vec![
            "--l1-eth-rpc".to_string(),
            self.l1_eth_rpc,
            "--l2-eth-rpc".to_string(),
            self.l2_eth_rpc,
            "--rollup-rpc".to_string(),
            self.rollup_rpc,
            "--private-key".to_string(),
            self.private_key,
            "--poll-interval".to_string(),
            self.poll_interval,
            "--max-channel-duration".to_string(),
            self.max_channel_duration.to_string(),
            "--data-availability-type".to_string(),
            "calldata".to_string(),
        ];

        cmd.extend(self.extra_args);

        cmd
    }
}

/// Builder for op-proposer commands.
#[derive(Debug, Clone)]
pub struct OpProposerCmdBuilder {
    l1_eth_rpc: String,
    rollup_rpc: String,
    l2oo_address: String,
    private_key: String,
    poll_interval: String,
    allow_non_finalized: bool,
    extra_args: Vec<String>,
}

impl OpProposerCmdBuilder {
    /// Create a new op-proposer command builder.
    pub fn new(
        l1_eth_rpc: impl Into<String>,
        rollup_rpc: impl Into<String>,
        l2oo_address: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        Self {
            l1_eth_rpc: l1_eth_rpc.into(),
            rollup_rpc: rollup_rpc.into(),
            l2oo_address: l2oo_address.into(),
            private_key: private_key.into(),
            poll_interval: "1s".to_string(),
            allow_non_finalized: true,
            extra_args: Vec::new(),
        }
    }

    /// Set the poll interval.
    pub fn poll_interval(mut self, interval: impl Into<String>) -> Self {
        self.poll_interval = interval.into();
        self
    }

    /// Add extra arguments.
    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Build the arguments as a vector of strings.
    pub fn build(self) -> Vec<String> {
        let mut cmd = vec![
            "--l1-eth-rpc".to_string(),
            self.l1_eth_rpc,
            "--rollup-rpc".to_string(),
            self.rollup_rpc,
            "--l2oo-address".to_string(),
            self.l2oo_address,
            "--private-key".to_string(),
            self.private_key,
            "--poll-interval".to_string(),
            self.poll_interval,
        ];

        if self.allow_non_finalized {
            cmd.push("--allow-non-finalized".to_string());
        }

        cmd.extend(self.extra_args);

        cmd
    }
}
