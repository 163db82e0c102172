use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, StatusCode};
use reqwest_cookie_store::CookieStoreMutex;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde_json::Value;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("reqwest middleware error: {0}")]
    ReqwestMiddlewareError(#[from] reqwest_middleware::Error),
    #[error("unexpected HTTP status {0}")]
    Status(StatusCode),
    #[error("response is not JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TransportError {
    /// True when the API rejected the session credentials.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            TransportError::Status(status)
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
        )
    }
}

/// Where a poll request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: String,
    pub host: String,
    pub path: String,
}

impl Endpoint {
    pub fn url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.path)
    }
}

/// POSTs a JSON payload and returns the decoded JSON body.
#[async_trait]
pub trait PollTransport: Send + Sync {
    async fn post_json(&self, endpoint: &Endpoint, payload: &Value) -> Result<Value, TransportError>;
}

pub struct HttpClient {
    pub client: ClientWithMiddleware,
    pub cookies: Arc<CookieStoreMutex>,
}

impl HttpClient {
    pub fn new() -> reqwest::Result<HttpClient> {
        let cookies = Arc::new(CookieStoreMutex::default());
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);

        let client = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .build()?;

        let client = reqwest_middleware::ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(HttpClient { client, cookies })
    }
}

#[async_trait]
impl PollTransport for HttpClient {
    async fn post_json(&self, endpoint: &Endpoint, payload: &Value) -> Result<Value, TransportError> {
        let url = endpoint.url();
        trace!("POST {}", url);

        let resp = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(payload)?)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status));
        }

        // Decode from bytes so a non-JSON body maps to `Decode`.
        let body = resp.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| e.into())
    }
}
