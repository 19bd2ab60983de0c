use thiserror::Error;

/// Errors returned by the supplier API client.
///
/// The variants map directly onto the retry policy: [`SupplierError::RateLimited`],
/// [`SupplierError::ServerError`], and network-level [`SupplierError::Http`]
/// failures are retried with bounded backoff; everything else is surfaced
/// immediately to the caller.
#[derive(Debug, Error)]
pub enum SupplierError {
    /// Credentials rejected, or the token was still refused after a refresh.
    /// Fatal — requires operator reconfiguration, never retried.
    #[error("supplier auth error: {0}")]
    Auth(String),

    /// HTTP 429 from the supplier; retried with backoff.
    #[error("supplier rate limited (retry-after: {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Network or TLS failure from the underlying HTTP client. Timeouts and
    /// connection resets are treated as transient.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP 5xx from the supplier; transient infrastructure failure.
    #[error("supplier server error: HTTP {status}")]
    ServerError { status: u16 },

    /// The supplier answered with a non-OK envelope code (e.g. "product not
    /// found"). Not retried; surfaced as a typed, user-readable failure.
    #[error("supplier business error {code}: {message}")]
    Business { code: i64, message: String },

    /// The response body could not be deserialized into the expected shape.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The configured base URL is not a valid URL.
    #[error("invalid supplier base URL '{0}'")]
    InvalidBaseUrl(String),
}
