//! Asynchronous failure reporting.
//!
//! Long-running components never call the listener directly. They post a
//! [`DevnetEvent`] to a bounded channel that a single event loop drains, so
//! listener callbacks are invoked from one task, one at a time.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::lifecycle::Lifecycle;

/// Capacity of the event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// L2 node subsystem that reported an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum NodeSubsystem {
    EngineHttp,
    EngineWebsocket,
    Consensus,
    Metrics,
    Process,
}

/// A log line emitted by the dependent stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub service: String,
    pub line: String,
}

/// Failures of the L1 simulator after it started.
pub trait L1EventListener: Send + Sync {
    fn on_l1_simulator_err(&self, err: &anyhow::Error) {
        tracing::error!(error = %format!("{err:#}"), "L1 simulator failed");
    }
}

/// Failures of L2 node subsystems after they started.
pub trait NodeEventListener: Send + Sync {
    fn on_node_err(&self, subsystem: NodeSubsystem, err: &anyhow::Error) {
        tracing::error!(%subsystem, error = %format!("{err:#}"), "L2 node subsystem failed");
    }
}

/// Logs and failures of the dependent stack.
pub trait StackEventListener: Send + Sync {
    fn on_stack_log(&self, record: &LogRecord) {
        tracing::debug!(service = %record.service, "{}", record.line);
    }

    fn on_stack_err(&self, service: &str, err: &anyhow::Error) {
        tracing::error!(%service, error = %format!("{err:#}"), "Dependent stack service failed");
    }
}

/// Everything a devnet component may report. Callbacks must not block.
pub trait EventListener: L1EventListener + NodeEventListener + StackEventListener {}

impl<T> EventListener for T where T: L1EventListener + NodeEventListener + StackEventListener {}

/// Listener that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

impl L1EventListener for LoggingListener {}
impl NodeEventListener for LoggingListener {}
impl StackEventListener for LoggingListener {}

type ErrCallback = Box<dyn Fn(&anyhow::Error) + Send + Sync>;

/// Listener built from optional closures. Unset callbacks fall back to logging.
#[derive(Default)]
pub struct SelectiveListener {
    pub on_l1_simulator_err: Option<ErrCallback>,
    pub on_node_err: Option<Box<dyn Fn(NodeSubsystem, &anyhow::Error) + Send + Sync>>,
    pub on_stack_log: Option<Box<dyn Fn(&LogRecord) + Send + Sync>>,
    pub on_stack_err: Option<Box<dyn Fn(&str, &anyhow::Error) + Send + Sync>>,
}

impl L1EventListener for SelectiveListener {
    fn on_l1_simulator_err(&self, err: &anyhow::Error) {
        match &self.on_l1_simulator_err {
            Some(f) => f(err),
            None => LoggingListener.on_l1_simulator_err(err),
        }
    }
}

impl NodeEventListener for SelectiveListener {
    fn on_node_err(&self, subsystem: NodeSubsystem, err: &anyhow::Error) {
        match &self.on_node_err {
            Some(f) => f(subsystem, err),
            None => LoggingListener.on_node_err(subsystem, err),
        }
    }
}

impl StackEventListener for SelectiveListener {
    fn on_stack_log(&self, record: &LogRecord) {
        match &self.on_stack_log {
            Some(f) => f(record),
            None => LoggingListener.on_stack_log(record),
        }
    }

    fn on_stack_err(&self, service: &str, err: &anyhow::Error) {
        match &self.on_stack_err {
            Some(f) => f(service, err),
            None => LoggingListener.on_stack_err(service, err),
        }
    }
}

/// Component a supervised process belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum EventSource {
    L1Simulator,
    L2Node,
    DependentStack,
}

/// A message posted to the event loop.
#[derive(Debug)]
pub enum DevnetEvent {
    /// A monitored process exited on its own.
    ProcessExited {
        name: String,
        source: EventSource,
        result: anyhow::Result<()>,
    },
    NodeFault {
        subsystem: NodeSubsystem,
        error: anyhow::Error,
    },
    StackLog(LogRecord),
}

impl DevnetEvent {
    fn dispatch(self, listener: &dyn EventListener) {
        match self {
            Self::ProcessExited { name, source, result } => match result {
                Ok(()) => tracing::debug!(%name, %source, "Process exited cleanly"),
                Err(err) => match source {
                    EventSource::L1Simulator => listener.on_l1_simulator_err(&err),
                    EventSource::L2Node => listener.on_node_err(NodeSubsystem::Process, &err),
                    EventSource::DependentStack => listener.on_stack_err(&name, &err),
                },
            },
            Self::NodeFault { subsystem, error } => listener.on_node_err(subsystem, &error),
            Self::StackLog(record) => listener.on_stack_log(&record),
        }
    }
}

/// Cloneable handle for posting events.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<DevnetEvent>,
}

impl EventSender {
    /// Post an event, waiting for capacity. Dropped silently once the loop has stopped.
    pub async fn send(&self, event: DevnetEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::trace!("Event loop stopped, dropping event");
        }
    }

    /// Post without waiting. Returns false if the event was dropped.
    pub fn try_send(&self, event: DevnetEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(?event, "Event channel full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Report an L2 node subsystem error from synchronous code.
    pub fn node_fault(&self, subsystem: NodeSubsystem, error: anyhow::Error) -> bool {
        self.try_send(DevnetEvent::NodeFault { subsystem, error })
    }
}

/// Start the single-consumer loop that feeds `listener`.
///
/// The loop stops accepting events at lifecycle shutdown and delivers what is
/// already queued before exiting.
pub fn spawn_event_loop(listener: Arc<dyn EventListener>, lifecycle: &Lifecycle) -> EventSender {
    let (tx, mut rx) = mpsc::channel::<DevnetEvent>(EVENT_CHANNEL_CAPACITY);
    let shutdown = lifecycle.shutdown_token();

    lifecycle.go("event-loop", async move {
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => event.dispatch(listener.as_ref()),
                    None => break,
                },
                _ = shutdown.cancelled() => {
                    rx.close();
                    while let Some(event) = rx.recv().await {
                        event.dispatch(listener.as_ref());
                    }
                    break;
                }
            }
        }
        tracing::debug!("Event loop stopped");
        Ok(())
    });

    EventSender { tx }
}
