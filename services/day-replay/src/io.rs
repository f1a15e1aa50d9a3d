//! HTTP client abstraction for testability

use async_trait::async_trait;
use std::time::Duration;

/// HTTP response from a request
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Abstraction over HTTP client for dependency injection
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient: Send + Sync {
    /// Send an authenticated GET request to the given URL
    async fn get(&self, url: &str) -> crate::Result<HttpResponse>;
}

/// Production HTTP client using reqwest with bearer authentication
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    access_token: String,
}

impl ReqwestHttpClient {
    pub fn new(access_token: &str, timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::ReplayError::Http(format!("Building HTTP client: {}", e)))?;
        Ok(Self {
            client,
            access_token: access_token.to_string(),
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> crate::Result<HttpResponse> {
        tracing::debug!("GET {}", url);
        let mut request = self.client.get(url);
        if !self.access_token.is_empty() {
            request = request.bearer_auth(&self.access_token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| crate::ReplayError::Http(format!("GET {} failed: {}", url, e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| crate::ReplayError::Http(format!("Reading response body: {}", e)))?;

        tracing::debug!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok(HttpResponse { status, body })
    }
}
