//! Command builder for `forge script`.

use std::path::{Path, PathBuf};

/// Builder for the contract deployment script invocation.
#[derive(Debug, Clone)]
pub struct ForgeScriptCmdBuilder {
    root: PathBuf,
    script: String,
    rpc_url: String,
    private_key: String,
    verbosity: u8,
    broadcast: bool,
    extra_args: Vec<String>,
}

impl ForgeScriptCmdBuilder {
    /// Create a builder that runs `scripts/Deploy.s.sol:Deploy` under `root`.
    pub fn new(
        root: impl AsRef<Path>,
        rpc_url: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            script: "Deploy".to_string(),
            rpc_url: rpc_url.into(),
            private_key: private_key.into(),
            verbosity: 3,
            broadcast: true,
            extra_args: Vec::new(),
        }
    }

    /// Set the number of `v`s in the verbosity flag.
    pub fn verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Add extra arguments.
    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    fn script_target(&self) -> String {
        let file = self
            .root
            .join("scripts")
            .join(format!("{}.s.sol", self.script));
        format!("{}:{}", file.display(), self.script)
    }

    /// Build the arguments as a vector of strings.
    pub fn build(self) -> Vec<String> {
        let mut cmd = vec![
            "script".to_string(),
            "--root".to_string(),
            self.root.display().to_string(),
        ];

        if self.verbosity > 0 {
            cmd.push(format!("-{}", "v".repeat(self.verbosity as usize)));
        }

        cmd.push(self.script_target());
        cmd.push("--rpc-url".to_string());
        cmd.push(self.rpc_url);

        if self.broadcast {
            cmd.push("--broadcast".to_string());
        }

        cmd.push("--private-key".to_string());
        cmd.push(self.private_key);

        cmd.extend(self.extra_args);

        cmd
    }
}
