use std::future::Future;

use reqwest::StatusCode;
use tokio_retry::{RetryIf, strategy::ExponentialBackoff};

use crate::error::Error;

/// Maximum number of retries for a transient failure.
const DEFAULT_MAX_RETRIES: usize = 4;

/// Initial backoff in milliseconds; doubles on every retry.
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 2;

/// Determine if a client error is transient.
pub(crate) fn is_retryable(err: &Error) -> bool {
    match err {
        Error::Http(e) => e.is_timeout() || e.is_connect(),
        Error::ExternalApi { status, .. } => {
            status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
        }
        _ => false,
    }
}

/// Retry an idempotent operation with exponential backoff while its error is transient.
pub async fn retry_op<F, Fut, T>(op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let strategy =
        ExponentialBackoff::from_millis(DEFAULT_INITIAL_BACKOFF_MS).take(DEFAULT_MAX_RETRIES);
    RetryIf::spawn(strategy, op, is_retryable).await
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::Service;

    fn api_error(status: StatusCode) -> Error {
        Error::ExternalApi { service: Service::Sentry, status, message: "boom".to_owned() }
    }

    #[tokio::test]
    async fn retries_server_errors_until_exhausted() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), Error> = retry_op(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(api_error(StatusCode::BAD_GATEWAY))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), DEFAULT_MAX_RETRIES + 1);
    }

    #[tokio::test]
    async fn stops_retrying_once_the_operation_succeeds() {
        let calls = AtomicUsize::new(0);
        let result = retry_op(|| async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(api_error(StatusCode::TOO_MANY_REQUESTS))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), Error> = retry_op(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(api_error(StatusCode::FORBIDDEN))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_errors_are_retryable() {
        let err = reqwest::Client::new().get("http://127.0.0.1:9").send().await.unwrap_err();
        assert!(err.is_connect());
        assert!(is_retryable(&Error::Http(err)));
    }
}
