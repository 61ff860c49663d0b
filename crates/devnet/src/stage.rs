//! Pipeline stages and cancellation.

use std::{fmt, future::Future};

use tokio_util::sync::CancellationToken;

/// A stage of the bring-up pipeline.
///
/// Every error returned by [`crate::Stack::run`] carries the failing stage as
/// context, so callers can recover it with `err.downcast_ref::<Stage>()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    AllocateListeners,
    #[strum(serialize = "start-l1")]
    StartL1,
    FundAccount,
    DeployContracts,
    #[strum(serialize = "fetch-l1-block")]
    FetchL1Block,
    #[strum(serialize = "start-l2-node")]
    StartL2Node,
    #[strum(serialize = "fetch-l2-genesis")]
    FetchL2Genesis,
    DeriveConfig,
    StartDependentStack,
}

/// Error returned when a blocking operation is interrupted by its cancellation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Returns true if `err` was caused by cancellation anywhere in its chain.
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<Cancelled>())
}

/// Drive `fut` to completion unless `cancel` fires first.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled.into()),
        res = fut => res,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Context;

    use super::*;

    #[test]
    fn test_stage_display_is_kebab_case() {
        assert_eq!(Stage::DeployContracts.to_string(), "deploy-contracts");
        assert_eq!(Stage::StartL1.to_string(), "start-l1");
        assert_eq!(Stage::FetchL2Genesis.to_string(), "fetch-l2-genesis");
    }

    #[test]
    fn test_stage_survives_as_context() {
        let err = anyhow::Error::new(Cancelled)
            .context("Failed to run forge")
            .context(Stage::DeployContracts);

        assert_eq!(err.downcast_ref::<Stage>(), Some(&Stage::DeployContracts));
        assert!(is_cancelled(&err));
        assert!(format!("{err:#}").starts_with("deploy-contracts: Failed to run forge"));
    }

    #[test]
    fn test_plain_error_is_not_cancelled() {
        let err = Err::<(), _>(anyhow::anyhow!("boom"))
            .context(Stage::StartL1)
            .unwrap_err();
        assert!(!is_cancelled(&err));
    }

    #[tokio::test]
    async fn test_cancellable_returns_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let res = cancellable(&cancel, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        assert!(is_cancelled(&res.unwrap_err()));
    }

    #[tokio::test]
    async fn test_cancellable_passes_result_through() {
        let cancel = CancellationToken::new();
        let value = cancellable(&cancel, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
