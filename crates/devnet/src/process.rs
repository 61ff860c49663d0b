//! External process supervision.
//!
//! A process is spawned with its output redirected to `<log_dir>/<name>.log`
//! and is then observed in one of two ways:
//! - [`Supervised::wait`] blocks the caller until exit, turning a nonzero exit
//!   into an error;
//! - [`Supervised::monitor`] hands the wait to a background task which reports
//!   the exit through the event loop.

use std::{
    fmt,
    fs::File,
    io,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};

use anyhow::Context;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, Command},
};
use tokio_util::sync::CancellationToken;

use crate::{
    events::{DevnetEvent, EventSender, EventSource, LogRecord},
    lifecycle::Lifecycle,
    stage::Cancelled,
};

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Short name, also used for the log file.
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
        }
    }
}

impl fmt::Display for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Spawns processes with their output captured under a log directory.
#[derive(Debug, Clone)]
pub struct Supervisor {
    log_dir: PathBuf,
}

impl Supervisor {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn log_path(&self, name: &str) -> PathBuf {
        self.log_dir.join(format!("{name}.log"))
    }

    /// Spawn with stdout and stderr both going to the log file.
    pub fn spawn(&self, spec: &ProcessSpec, lifecycle: &Lifecycle) -> anyhow::Result<Supervised> {
        let log = self.open_log(&spec.name, lifecycle)?;
        let stdout = log.try_clone().context("Failed to clone log handle")?;

        let child = self.command(spec, stdout.into(), log.into())?;
        Ok(Supervised::new(spec, child, self.log_path(&spec.name)))
    }

    /// Spawn with stdout forwarded line by line to the event loop and appended to the log.
    pub fn spawn_forwarding(
        &self,
        spec: &ProcessSpec,
        lifecycle: &Lifecycle,
        events: &EventSender,
    ) -> anyhow::Result<Supervised> {
        let log = self.open_log(&spec.name, lifecycle)?;
        let sink = log.try_clone().context("Failed to clone log handle")?;

        let mut child = self.command(spec, Stdio::piped(), log.into())?;
        let stdout = child
            .stdout
            .take()
            .context("Child stdout was not captured")?;

        let service = spec.name.clone();
        let events = events.clone();
        let shutdown = lifecycle.shutdown_token();
        lifecycle.go(&format!("forward-{service}"), async move {
            let mut sink = tokio::fs::File::from_std(sink);
            let mut lines = BufReader::new(stdout).lines();
            loop {
                let line = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    line = lines.next_line() => line,
                };
                let Some(line) = line.context("Failed to read process output")? else {
                    break;
                };
                sink.write_all(format!("{line}\n").as_bytes())
                    .await
                    .context("Failed to append to log")?;
                events
                    .send(DevnetEvent::StackLog(LogRecord {
                        service: service.clone(),
                        line,
                    }))
                    .await;
            }
            sink.flush().await.context("Failed to flush log")?;
            Ok(())
        });

        Ok(Supervised::new(spec, child, self.log_path(&spec.name)))
    }

    fn open_log(&self, name: &str, lifecycle: &Lifecycle) -> anyhow::Result<File> {
        std::fs::create_dir_all(&self.log_dir).with_context(|| {
            format!("Failed to create log directory {}", self.log_dir.display())
        })?;

        let path = self.log_path(name);
        let log = File::create(&path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;

        let held = log.try_clone().context("Failed to clone log handle")?;
        lifecycle.defer_err(format!("close {name} log"), move || {
            held.sync_all()
                .with_context(|| format!("Failed to sync {}", path.display()))
        });

        Ok(log)
    }

    fn command(&self, spec: &ProcessSpec, stdout: Stdio, stderr: Stdio) -> anyhow::Result<Child> {
        tracing::debug!(name = %spec.name, cmd = %spec, "Spawning process");

        let child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => anyhow::anyhow!(
                    "{} binary not found at {}",
                    spec.name,
                    spec.program.display()
                ),
                _ => anyhow::Error::new(err).context(format!("Failed to spawn {}", spec.name)),
            })?;

        tracing::info!(name = %spec.name, pid = ?child.id(), log = %self.log_path(&spec.name).display(), "Process started");
        Ok(child)
    }
}

/// A running child process.
#[derive(Debug)]
pub struct Supervised {
    name: String,
    child: Child,
    log_path: PathBuf,
}

impl Supervised {
    fn new(spec: &ProcessSpec, child: Child, log_path: PathBuf) -> Self {
        Self {
            name: spec.name.clone(),
            child,
            log_path,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS process id, `None` once the process has been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Block until the process exits. Kills it and returns [`Cancelled`] if `cancel` fires first.
    pub async fn wait(mut self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            status = self.child.wait() => Some(status),
        };

        match status {
            Some(status) => {
                let status =
                    status.with_context(|| format!("Failed to wait for {}", self.name))?;
                exit_result(&self.name, status)
            }
            None => {
                terminate(&mut self.child, &self.name).await;
                Err(anyhow::Error::new(Cancelled).context(format!("{} interrupted", self.name)))
            }
        }
    }

    /// Watch the process in the background until it exits or the lifecycle shuts down.
    ///
    /// An exit before shutdown is posted as [`DevnetEvent::ProcessExited`]. At
    /// shutdown the process is killed and nothing is reported.
    pub fn monitor(self, source: EventSource, events: &EventSender, lifecycle: &Lifecycle) {
        let Self { name, mut child, .. } = self;
        let events = events.clone();
        let shutdown = lifecycle.shutdown_token();

        lifecycle.go(&format!("monitor-{name}"), async move {
            let status = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                status = child.wait() => Some(status),
            };

            match status {
                Some(status) => {
                    let result = status
                        .with_context(|| format!("Failed to wait for {name}"))
                        .and_then(|status| exit_result(&name, status));
                    if let Err(err) = &result {
                        tracing::warn!(%name, %source, error = %format!("{err:#}"), "Monitored process failed");
                    }
                    events
                        .send(DevnetEvent::ProcessExited {
                            name,
                            source,
                            result,
                        })
                        .await;
                }
                None => terminate(&mut child, &name).await,
            }
            Ok(())
        });
    }
}

fn exit_result(name: &str, status: ExitStatus) -> anyhow::Result<()> {
    if status.success() {
        tracing::debug!(%name, "Process exited successfully");
        Ok(())
    } else {
        anyhow::bail!("{name} exited with {status}")
    }
}

async fn terminate(child: &mut Child, name: &str) {
    let pid = child.id();
    match child.kill().await {
        Ok(()) => tracing::info!(%name, ?pid, "Process terminated"),
        Err(err) => tracing::warn!(%name, ?pid, error = %err, "Failed to terminate process"),
    }
}
