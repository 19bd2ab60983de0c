//! Access-token lifecycle with single-flighted refresh.
//!
//! Concurrent callers that find the token missing or expired serialize on a
//! refresh lock: exactly one performs the upstream authentication call and
//! the rest pick up the freshly stored token when the lock is released.

use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use crate::error::SupplierError;

/// Refresh this far before the supplier-reported expiry to absorb clock skew
/// and in-flight latency.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Token {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub(crate) struct TokenCell {
    token: RwLock<Option<Token>>,
    refresh: Mutex<()>,
}

impl TokenCell {
    /// Returns the stored token if it is still comfortably within its TTL.
    pub(crate) async fn current(&self) -> Option<String> {
        let token = self.token.read().await;
        token
            .as_ref()
            .filter(|t| t.expires_at > Instant::now() + EXPIRY_MARGIN)
            .map(|t| t.value.clone())
    }

    /// Drops the stored token so the next caller forces a refresh. Used when
    /// the supplier rejects a token before its reported expiry.
    pub(crate) async fn invalidate(&self) {
        let mut token = self.token.write().await;
        *token = None;
    }

    /// Single-flighted refresh: acquires the refresh lock, re-checks whether
    /// another caller already refreshed while we waited, and only then runs
    /// `fetch`. All waiters end up with the same token.
    ///
    /// # Errors
    ///
    /// Propagates the error from `fetch` (typically [`SupplierError::Auth`]).
    pub(crate) async fn refresh_with<F, Fut>(&self, fetch: F) -> Result<String, SupplierError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(String, Duration), SupplierError>>,
    {
        let _guard = self.refresh.lock().await;

        if let Some(token) = self.current().await {
            return Ok(token);
        }

        let (value, ttl) = fetch().await?;
        let token = Token {
            value: value.clone(),
            expires_at: Instant::now() + ttl,
        };
        *self.token.write().await = Some(token);
        tracing::debug!(ttl_secs = ttl.as_secs(), "supplier access token refreshed");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn current_is_none_before_first_refresh() {
        let cell = TokenCell::default();
        assert!(cell.current().await.is_none());
    }

    #[tokio::test]
    async fn refresh_stores_token_for_subsequent_reads() {
        let cell = TokenCell::default();
        let token = cell
            .refresh_with(|| async { Ok(("tok-1".to_owned(), Duration::from_secs(3600))) })
            .await
            .expect("refresh");
        assert_eq!(token, "tok-1");
        assert_eq!(cell.current().await.as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn near_expiry_token_is_treated_as_absent() {
        let cell = TokenCell::default();
        cell.refresh_with(|| async { Ok(("tok-short".to_owned(), Duration::from_secs(10))) })
            .await
            .expect("refresh");
        // 10 s TTL is inside the 60 s margin.
        assert!(cell.current().await.is_none());
    }

    #[tokio::test]
    async fn invalidate_forces_next_refresh() {
        let cell = TokenCell::default();
        cell.refresh_with(|| async { Ok(("tok-1".to_owned(), Duration::from_secs(3600))) })
            .await
            .expect("refresh");
        cell.invalidate().await;
        assert!(cell.current().await.is_none());
    }

    #[tokio::test]
    async fn concurrent_refreshes_collapse_into_one_fetch() {
        let cell = Arc::new(TokenCell::default());
        let fetches = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cell = Arc::clone(&cell);
            let fetches = Arc::clone(&fetches);
            handles.push(tokio::spawn(async move {
                cell.refresh_with(|| {
                    let fetches = Arc::clone(&fetches);
                    async move {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(("tok-shared".to_owned(), Duration::from_secs(3600)))
                    }
                })
                .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.expect("task").expect("token"), "tok-shared");
        }
        assert_eq!(
            fetches.load(Ordering::SeqCst),
            1,
            "concurrent refreshes must perform exactly one authentication call"
        );
    }
}
