//! Network endpoints and the listeners reserved for them.

use std::{
    fmt,
    net::TcpListener,
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{lifecycle::Lifecycle, probe};

/// A logical `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn localhost(port: u16) -> Self {
        Self::new("127.0.0.1", port)
    }

    /// Host without IPv6 brackets, suitable for socket resolution.
    pub fn socket_host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }

    /// `http://host:port`, without a trailing slash.
    pub fn http_address(&self) -> String {
        format!("http://{self}")
    }

    /// `ws://host:port`, without a trailing slash.
    pub fn ws_address(&self) -> String {
        format!("ws://{self}")
    }

    pub fn http_url(&self) -> anyhow::Result<Url> {
        Url::parse(&self.http_address()).context("Failed to parse HTTP URL")
    }

    /// Poll until the endpoint accepts TCP connections or `cancel` fires.
    pub async fn is_reachable(&self, cancel: &CancellationToken) -> bool {
        probe::reachable(self, cancel).await
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .with_context(|| format!("Endpoint '{s}' must be host:port"))?;
        anyhow::ensure!(!host.is_empty(), "Endpoint '{s}' has an empty host");
        let port = port
            .parse()
            .with_context(|| format!("Invalid port in endpoint '{s}'"))?;
        Ok(Self::new(host, port))
    }
}

/// Lifecycle state of a [`BoundListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ListenerState {
    /// The socket is bound and owned by the orchestrator.
    Listening,
    /// The socket was passed to (or released for) the service that serves it.
    HandedOff,
    /// The socket was closed by the orchestrator.
    Closed,
}

#[derive(Debug)]
enum Slot {
    Listening(TcpListener),
    HandedOff,
    Closed,
}

/// A listener bound ahead of time for a downstream service.
///
/// Binding early keeps the port reserved between stages. The socket leaves the
/// orchestrator exactly once, either through [`Self::hand_off`] or [`Self::close`].
#[derive(Debug, Clone)]
pub struct BoundListener {
    label: String,
    endpoint: Endpoint,
    slot: Arc<Mutex<Slot>>,
}

impl BoundListener {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The endpoint with the port actually bound.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ListenerState {
        match *self.slot.lock().unwrap_or_else(PoisonError::into_inner) {
            Slot::Listening(_) => ListenerState::Listening,
            Slot::HandedOff => ListenerState::HandedOff,
            Slot::Closed => ListenerState::Closed,
        }
    }

    /// Take the socket out of the reservation. Returns `None` if it already left.
    pub fn hand_off(&self) -> Option<TcpListener> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *slot, Slot::HandedOff) {
            Slot::Listening(listener) => {
                tracing::debug!(label = %self.label, endpoint = %self.endpoint, "Listener handed off");
                Some(listener)
            }
            previous => {
                *slot = previous;
                None
            }
        }
    }

    /// Close the socket if it is still held. Returns true if this call closed it.
    pub fn close(&self) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*slot, Slot::Listening(_)) {
            *slot = Slot::Closed;
            tracing::debug!(label = %self.label, endpoint = %self.endpoint, "Listener closed");
            true
        } else {
            false
        }
    }
}

/// Binds listeners and registers their release with a [`Lifecycle`].
pub struct EndpointAllocator<'a> {
    lifecycle: &'a Lifecycle,
}

impl<'a> EndpointAllocator<'a> {
    pub fn new(lifecycle: &'a Lifecycle) -> Self {
        Self { lifecycle }
    }

    /// Bind `endpoint`. A port of 0 asks the OS for an ephemeral one.
    pub fn bind(&self, label: &str, endpoint: &Endpoint) -> anyhow::Result<BoundListener> {
        let listener = TcpListener::bind((endpoint.socket_host(), endpoint.port))
            .with_context(|| format!("Failed to bind {label} listener on {endpoint}"))?;
        listener
            .set_nonblocking(true)
            .with_context(|| format!("Failed to configure {label} listener"))?;
        let local = listener
            .local_addr()
            .with_context(|| format!("Failed to read {label} listener address"))?;

        let bound = BoundListener {
            label: label.to_string(),
            endpoint: Endpoint::new(endpoint.host.clone(), local.port()),
            slot: Arc::new(Mutex::new(Slot::Listening(listener))),
        };

        let handle = bound.clone();
        self.lifecycle
            .defer_err(format!("close {label} listener"), move || {
                handle.close();
                Ok(())
            });

        tracing::debug!(%label, endpoint = %bound.endpoint, "Listener bound");
        Ok(bound)
    }

    /// Bind an ephemeral port on the loopback interface.
    pub fn bind_ephemeral(&self, label: &str) -> anyhow::Result<BoundListener> {
        self.bind(label, &Endpoint::localhost(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parse_and_display() {
        let endpoint: Endpoint = "127.0.0.1:8545".parse().unwrap();
        assert_eq!(endpoint, Endpoint::localhost(8545));
        assert_eq!(endpoint.to_string(), "127.0.0.1:8545");
        assert_eq!(endpoint.http_address(), "http://127.0.0.1:8545");
        assert_eq!(endpoint.ws_address(), "ws://127.0.0.1:8545");
        assert_eq!(endpoint.http_url().unwrap().as_str(), "http://127.0.0.1:8545/");
    }

    #[test]
    fn test_endpoint_parse_rejects_garbage() {
        assert!("8545".parse::<Endpoint>().is_err());
        assert!(":8545".parse::<Endpoint>().is_err());
        assert!("localhost:http".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_ipv6_host_is_unbracketed_for_sockets() {
        let endpoint: Endpoint = "[::1]:9000".parse().unwrap();
        assert_eq!(endpoint.host, "[::1]");
        assert_eq!(endpoint.socket_host(), "::1");
    }

    #[tokio::test]
    async fn test_listener_leaves_exactly_once() {
        let lifecycle = Lifecycle::new(&CancellationToken::new());
        let allocator = EndpointAllocator::new(&lifecycle);

        let listener = allocator.bind_ephemeral("engine-http").unwrap();
        assert_ne!(listener.endpoint().port, 0);
        assert_eq!(listener.state(), ListenerState::Listening);

        assert!(listener.hand_off().is_some());
        assert!(listener.hand_off().is_none());
        assert!(!listener.close());
        assert_eq!(listener.state(), ListenerState::HandedOff);

        lifecycle.release().await;
        assert_eq!(listener.state(), ListenerState::HandedOff);
    }

    #[tokio::test]
    async fn test_release_closes_held_listeners() {
        let lifecycle = Lifecycle::new(&CancellationToken::new());
        let allocator = EndpointAllocator::new(&lifecycle);

        let a = allocator.bind_ephemeral("a").unwrap();
        let b = allocator.bind_ephemeral("b").unwrap();

        let report = lifecycle.release().await;

        assert_eq!(report.ran, vec!["close b listener", "close a listener"]);
        assert_eq!(a.state(), ListenerState::Closed);
        assert_eq!(b.state(), ListenerState::Closed);
    }

    #[tokio::test]
    async fn test_bind_fails_on_taken_port() {
        let lifecycle = Lifecycle::new(&CancellationToken::new());
        let allocator = EndpointAllocator::new(&lifecycle);

        let first = allocator.bind_ephemeral("first").unwrap();
        let err = allocator.bind("second", first.endpoint()).unwrap_err();

        assert!(err.to_string().contains("second listener"));
        lifecycle.release().await;
    }
}
