//! TCP readiness polling.

use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::endpoint::Endpoint;

/// Delay between connection attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll `endpoint` until a TCP connection succeeds.
///
/// There is no timeout here: returns `false` only once `cancel` fires.
pub async fn reachable(endpoint: &Endpoint, cancel: &CancellationToken) -> bool {
    let host = endpoint.socket_host().to_string();
    let port = endpoint.port;

    let poll = (|| {
        let host = host.clone();
        async move { TcpStream::connect((host.as_str(), port)).await }
    })
    .retry(
        ConstantBuilder::default()
            .with_delay(POLL_INTERVAL)
            .without_max_times(),
    )
    .notify(|err, delay| {
        tracing::trace!(%endpoint, error = %err, ?delay, "Endpoint not reachable yet");
    });

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!(%endpoint, "Gave up waiting for endpoint");
            false
        }
        res = poll => {
            let reachable = res.is_ok();
            if reachable {
                tracing::debug!(%endpoint, "Endpoint reachable");
            }
            reachable
        }
    }
}
