//! Retry with exponential back-off and jitter for supplier calls.
//!
//! [`retry_with_backoff`] wraps any fallible async operation and retries on
//! transient errors. Auth, business, and deserialization errors are returned
//! immediately — retrying cannot fix bad credentials or a "product not
//! found" answer, and hammering the API on them would burn the rate budget.

use std::future::Future;
use std::time::Duration;

use crate::error::SupplierError;

/// Returns `true` for errors worth retrying after a back-off delay.
///
/// **Retriable:** rate limiting (429), HTTP 5xx, and network-level failures
/// (timeout, connection reset).
///
/// **Not retriable:** auth failures, business errors, deserialization
/// errors, and invalid configuration.
pub(crate) fn is_retriable(err: &SupplierError) -> bool {
    match err {
        SupplierError::RateLimited { .. } | SupplierError::ServerError { .. } => true,
        SupplierError::Http(e) => e.is_timeout() || e.is_connect(),
        SupplierError::Auth(_)
        | SupplierError::Business { .. }
        | SupplierError::Deserialize { .. }
        | SupplierError::InvalidBaseUrl(_) => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on
/// transient errors.
///
/// Delay before retry `n` is `backoff_base_ms * 2^(n-1)` with ±25 % jitter,
/// capped at 10 s — the whole budget stays within a few seconds for the
/// default configuration. A 429 carrying a `Retry-After` hint uses that hint
/// instead of the computed delay.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, SupplierError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SupplierError>>,
{
    const MAX_DELAY_MS: u64 = 10_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;

                let hinted = match &err {
                    SupplierError::RateLimited {
                        retry_after_secs: Some(secs),
                    } => Some(secs.saturating_mul(1000)),
                    _ => None,
                };
                let computed =
                    hinted.unwrap_or_else(|| {
                        backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10))
                    });
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient supplier error — retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn business_err() -> SupplierError {
        SupplierError::Business {
            code: 1602,
            message: "product not found".to_owned(),
        }
    }

    #[test]
    fn auth_error_is_not_retriable() {
        assert!(!is_retriable(&SupplierError::Auth("bad creds".to_owned())));
    }

    #[test]
    fn business_error_is_not_retriable() {
        assert!(!is_retriable(&business_err()));
    }

    #[test]
    fn rate_limited_is_retriable() {
        assert!(is_retriable(&SupplierError::RateLimited {
            retry_after_secs: None
        }));
    }

    #[test]
    fn server_error_is_retriable() {
        assert!(is_retriable(&SupplierError::ServerError { status: 503 }));
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, SupplierError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_rate_limited_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(SupplierError::RateLimited {
                        retry_after_secs: Some(0),
                    })
                } else {
                    Ok::<u32, SupplierError>(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_business_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(business_err())
            }
        })
        .await;
        assert_eq!(
            calls.load(Ordering::SeqCst),
            1,
            "business errors must not be retried"
        );
        assert!(matches!(result, Err(SupplierError::Business { .. })));
    }

    #[tokio::test]
    async fn exhausts_budget_and_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(2, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(SupplierError::ServerError { status: 502 })
            }
        })
        .await;
        // max_retries=2 → 3 total attempts
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(SupplierError::ServerError { status: 502 })
        ));
    }
}
