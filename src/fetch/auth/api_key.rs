use crate::error::{Result, SignalError};
use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that injects an API key as an HTTP header.
pub struct ApiKey<C> {
    pub inner: C,
    pub header_name: String,
    pub key: String,
}

impl<C> ApiKey<C> {
    /// `Authorization: Bearer <key>`, as expected by OpenRouter.
    pub fn bearer(inner: C, key: String) -> Self {
        Self {
            inner,
            header_name: "Authorization".to_string(),
            key: format!("Bearer {key}"),
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> Result<reqwest::Response> {
        let header_name = HeaderName::from_bytes(self.header_name.as_bytes())
            .map_err(|e| SignalError::invalid_data("api key header", e.to_string()))?;
        let value = HeaderValue::from_str(&self.key)
            .map_err(|e| SignalError::invalid_data("api key", e.to_string()))?;
        req.headers_mut().insert(header_name, value);
        self.inner.execute(req).await
    }
}
