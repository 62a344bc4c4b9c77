//! Outbound calls to the Python backend

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use toggle_core::ChatError;

/// Raw backend answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamReply {
    /// HTTP status code
    pub status: u16,
    /// Body bytes
    pub body: Vec<u8>,
}

impl UpstreamReply {
    /// Create reply
    #[inline]
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// JSON reply with status 200
    #[must_use]
    pub fn ok_json(body: &Value) -> Self {
        Self::new(200, body.to_string())
    }

    /// 2xx status
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Backend the proxy forwards to
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Upstream: Send + Sync {
    /// `POST` a JSON body
    ///
    /// # Errors
    /// `ChatError::Transport` when the backend cannot be reached
    async fn post_json(&self, path: &str, body: &Value) -> Result<UpstreamReply, ChatError>;

    /// `GET` with query parameters
    ///
    /// # Errors
    /// `ChatError::Transport` when the backend cannot be reached
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<UpstreamReply, ChatError>;
}

/// reqwest-backed upstream
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: Client,
    base_url: String,
}

impl HttpUpstream {
    /// Create upstream for a base URL
    ///
    /// # Errors
    /// `ChatError::Config` if the HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ChatError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL without trailing slash
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn finish(response: reqwest::Response) -> Result<UpstreamReply, ChatError> {
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        Ok(UpstreamReply::new(status, body.to_vec()))
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn post_json(&self, path: &str, body: &Value) -> Result<UpstreamReply, ChatError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        Self::finish(response).await
    }

    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<UpstreamReply, ChatError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        Self::finish(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range() {
        assert!(UpstreamReply::new(200, "{}").is_success());
        assert!(UpstreamReply::new(204, "").is_success());
        assert!(!UpstreamReply::new(302, "").is_success());
        assert!(!UpstreamReply::new(500, "").is_success());
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let upstream =
            HttpUpstream::new(&format!("http://127.0.0.1:{port}/"), Duration::from_secs(5)).unwrap();
        assert_eq!(upstream.base_url(), format!("http://127.0.0.1:{port}"));

        let err = upstream
            .post_json("/api/chat", &serde_json::json!({"userInput": "hi"}))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
