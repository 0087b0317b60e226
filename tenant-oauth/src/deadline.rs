use crate::error::AuthError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Run `fut` until it completes, the optional timeout elapses, or `cancel` fires.
///
/// Cancellation wins over a result that becomes ready at the same time.
pub(crate) async fn bounded<T, F>(
    fut: F,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, AuthError>>,
{
    let timed = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| AuthError::Timeout)?,
            None => fut.await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AuthError::Cancelled),
        result = timed => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_returns_result() {
        let cancel = CancellationToken::new();
        let result = bounded(async { Ok::<_, AuthError>(7) }, None, &cancel).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let cancel = CancellationToken::new();
        let result = bounded(
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, AuthError>(())
            },
            Some(Duration::from_secs(1)),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(AuthError::Timeout)));
    }

    #[tokio::test]
    async fn test_bounded_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = bounded(async { Ok::<_, AuthError>(1) }, None, &cancel).await;
        assert!(matches!(result, Err(AuthError::Cancelled)));
    }
}
