//! HTTP client for the supplier REST API.
//!
//! Wraps `reqwest` with supplier-specific error handling, access-token
//! management, bounded retries, and typed response deserialization.
//! Cacheable endpoints (catalog search, product detail, variant stock) route
//! through the shared [`ApiCache`] so concurrent callers collapse into one
//! upstream request.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;

use dropsync_cache::{ApiCache, Namespace};

use crate::auth::TokenCell;
use crate::error::SupplierError;
use crate::retry::retry_with_backoff;
use crate::types::{
    AccessTokenData, CreateSupplierOrder, CreatedOrder, Envelope, ProductPage, RegionStock,
    SupplierOrderDetail, SupplierProduct,
};

const DEFAULT_BASE_URL: &str = "https://developers.cjdropshipping.com/api2.0/v1/";
const TOKEN_HEADER: &str = "CJ-Access-Token";

/// Minimum token TTL; guards against a supplier clock reporting an expiry
/// in the past.
const MIN_TOKEN_TTL: Duration = Duration::from_secs(120);

/// Supplier account credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub api_key: String,
}

/// Client for the supplier REST API.
///
/// Use [`SupplierClient::new`] for production or
/// [`SupplierClient::with_base_url`] to point at a mock server in tests.
pub struct SupplierClient {
    http: Client,
    base_url: Url,
    credentials: Credentials,
    tokens: TokenCell,
    cache: Arc<ApiCache>,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl SupplierClient {
    /// Creates a client pointed at the production supplier API.
    ///
    /// # Errors
    ///
    /// Returns [`SupplierError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        credentials: Credentials,
        timeout_secs: u64,
        cache: Arc<ApiCache>,
    ) -> Result<Self, SupplierError> {
        Self::with_base_url(credentials, timeout_secs, DEFAULT_BASE_URL, cache)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`SupplierError::Http`] if the HTTP client cannot be built, or
    /// [`SupplierError::InvalidBaseUrl`] for an unparseable base URL.
    pub fn with_base_url(
        credentials: Credentials,
        timeout_secs: u64,
        base_url: &str,
        cache: Arc<ApiCache>,
    ) -> Result<Self, SupplierError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("dropsync/0.1 (supplier-sync)")
            .build()?;

        // Normalise: exactly one trailing slash so Url::join appends instead
        // of replacing the last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised)
            .map_err(|_| SupplierError::InvalidBaseUrl(base_url.to_owned()))?;

        Ok(Self {
            http,
            base_url,
            credentials,
            tokens: TokenCell::default(),
            cache,
            max_retries: 2,
            backoff_base_ms: 500,
        })
    }

    /// Overrides the retry budget; tests use a zero backoff base.
    #[must_use]
    pub fn with_retry_policy(mut self, max_retries: u32, backoff_base_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    /// Forces a fresh authentication round-trip, discarding any stored token.
    ///
    /// # Errors
    ///
    /// Returns [`SupplierError::Auth`] on rejected credentials.
    pub async fn authenticate(&self) -> Result<(), SupplierError> {
        self.tokens.invalidate().await;
        self.ensure_token().await.map(|_| ())
    }

    /// Fetches one catalog page, optionally filtered by a category keyword.
    /// Served from the search cache when fresh.
    ///
    /// # Errors
    ///
    /// Any [`SupplierError`] from the underlying call or deserialization.
    pub async fn list_products(
        &self,
        page: u32,
        page_size: u32,
        category_keyword: Option<&str>,
    ) -> Result<ProductPage, SupplierError> {
        let cache_key = format!("list:{page}:{page_size}:{}", category_keyword.unwrap_or(""));
        let value = self
            .cache
            .get_or_fetch(Namespace::Search, &cache_key, || async {
                let mut query = vec![
                    ("pageNum", page.to_string()),
                    ("pageSize", page_size.to_string()),
                ];
                if let Some(keyword) = category_keyword {
                    query.push(("categoryKeyword", keyword.to_owned()));
                }
                self.call(Method::GET, "product/list", &query, None).await
            })
            .await?;
        Self::decode("product/list", value)
    }

    /// Fetches the full product snapshot for one supplier product id.
    /// Served from the detail cache when fresh.
    ///
    /// # Errors
    ///
    /// [`SupplierError::Business`] when the supplier reports the product as
    /// gone; other variants per the taxonomy.
    pub async fn get_product(&self, pid: &str) -> Result<SupplierProduct, SupplierError> {
        let value = self
            .cache
            .get_or_fetch(Namespace::ProductDetail, pid, || async {
                let query = vec![("pid", pid.to_owned())];
                self.call(Method::GET, "product/query", &query, None).await
            })
            .await?;
        Self::decode("product/query", value)
    }

    /// Queries per-region stock for one supplier variant id. Served from the
    /// stock cache when fresh; stock webhooks invalidate the entry.
    ///
    /// # Errors
    ///
    /// Any [`SupplierError`] from the underlying call or deserialization.
    pub async fn query_stock(&self, vid: &str) -> Result<Vec<RegionStock>, SupplierError> {
        let value = self
            .cache
            .get_or_fetch(Namespace::Stock, vid, || async {
                let query = vec![("vid", vid.to_owned())];
                self.call(Method::GET, "product/stock/queryByVid", &query, None)
                    .await
            })
            .await?;
        Self::decode("product/stock/queryByVid", value)
    }

    /// Creates a supplier-side order. Never cached.
    ///
    /// # Errors
    ///
    /// [`SupplierError::Business`] for rejected orders (e.g. variant no
    /// longer purchasable); transient variants per the taxonomy.
    pub async fn create_order(
        &self,
        order: &CreateSupplierOrder,
    ) -> Result<CreatedOrder, SupplierError> {
        let body = serde_json::to_value(order).map_err(|e| SupplierError::Deserialize {
            context: "createOrder request".to_owned(),
            source: e,
        })?;
        let value = self
            .call(Method::POST, "shopping/order/createOrder", &[], Some(&body))
            .await?;
        Self::decode("shopping/order/createOrder", value)
    }

    /// Fetches the supplier-side status of an order. Never cached — status
    /// polling must observe fresh state.
    ///
    /// # Errors
    ///
    /// Any [`SupplierError`] from the underlying call or deserialization.
    pub async fn get_order_status(
        &self,
        external_order_id: &str,
    ) -> Result<SupplierOrderDetail, SupplierError> {
        let query = vec![("orderId", external_order_id.to_owned())];
        let value = self
            .call(Method::GET, "shopping/order/getOrderDetail", &query, None)
            .await?;
        Self::decode("shopping/order/getOrderDetail", value)
    }

    fn decode<T: DeserializeOwned>(
        context: &str,
        value: serde_json::Value,
    ) -> Result<T, SupplierError> {
        serde_json::from_value(value).map_err(|e| SupplierError::Deserialize {
            context: context.to_owned(),
            source: e,
        })
    }

    async fn ensure_token(&self) -> Result<String, SupplierError> {
        if let Some(token) = self.tokens.current().await {
            return Ok(token);
        }
        self.tokens.refresh_with(|| self.fetch_token()).await
    }

    /// Performs the authentication round-trip and returns (token, ttl).
    async fn fetch_token(&self) -> Result<(String, Duration), SupplierError> {
        let url = self.endpoint("authentication/getAccessToken")?;
        let body = serde_json::json!({
            "email": self.credentials.email,
            "password": self.credentials.api_key,
        });

        let response = self.http.post(url).json(&body).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SupplierError::Auth(
                "supplier rejected credentials".to_owned(),
            ));
        }
        if status.is_server_error() {
            return Err(SupplierError::ServerError {
                status: status.as_u16(),
            });
        }

        let envelope = Self::parse_envelope("authentication/getAccessToken", response).await?;
        if envelope.code != 200 || !envelope.result {
            return Err(SupplierError::Auth(
                envelope
                    .message
                    .unwrap_or_else(|| "authentication failed".to_owned()),
            ));
        }

        let data: AccessTokenData = Self::decode(
            "authentication/getAccessToken",
            envelope.data.unwrap_or(serde_json::Value::Null),
        )?;
        let ttl = (data.access_token_expiry_date - chrono::Utc::now())
            .to_std()
            .unwrap_or(MIN_TOKEN_TTL)
            .max(MIN_TOKEN_TTL);
        Ok((data.access_token, ttl))
    }

    /// Executes one authenticated call inside the retry budget.
    async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, SupplierError> {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            let method = method.clone();
            async move { self.call_once(method, path, query, body).await }
        })
        .await
    }

    /// One authenticated request. An auth rejection triggers exactly one
    /// token refresh followed by a single replay; a second rejection is
    /// surfaced as fatal.
    async fn call_once(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, SupplierError> {
        let url = self.endpoint(path)?;
        let mut refreshed = false;

        loop {
            let token = self.ensure_token().await?;
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .header(TOKEN_HEADER, &token);
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                if refreshed {
                    return Err(SupplierError::Auth(
                        "access token rejected after refresh".to_owned(),
                    ));
                }
                refreshed = true;
                tracing::debug!(path, "supplier rejected token; refreshing once");
                self.tokens.invalidate().await;
                continue;
            }
            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                return Err(SupplierError::RateLimited { retry_after_secs });
            }
            if status.is_server_error() {
                return Err(SupplierError::ServerError {
                    status: status.as_u16(),
                });
            }

            let envelope = Self::parse_envelope(path, response).await?;
            if envelope.code == 200 && envelope.result {
                return Ok(envelope.data.unwrap_or(serde_json::Value::Null));
            }
            return Err(SupplierError::Business {
                code: envelope.code,
                message: envelope.message.unwrap_or_else(|| "unknown error".to_owned()),
            });
        }
    }

    async fn parse_envelope(
        context: &str,
        response: reqwest::Response,
    ) -> Result<Envelope, SupplierError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| SupplierError::Deserialize {
            context: context.to_owned(),
            source: e,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, SupplierError> {
        self.base_url
            .join(path)
            .map_err(|_| SupplierError::InvalidBaseUrl(format!("{}{path}", self.base_url)))
    }
}
