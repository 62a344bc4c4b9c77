//! reqwest-backed [`ChatBackend`]

use crate::backend::{ChatBackend, Endpoints};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use toggle_core::{
    ChatError, ChatReply, ChatRequest, ErrorBody, EvaluationPoll, MetricsPoll, RequestId,
};

/// Default backend base URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// HTTP chat backend
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    endpoints: Endpoints,
}

impl HttpBackend {
    /// Create backend for a base URL with the multi-agent endpoints
    ///
    /// # Errors
    /// - `ChatError::Config` if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>) -> Result<Self, ChatError> {
        Self::with_endpoints(base_url, Endpoints::default())
    }

    /// Create backend with explicit endpoints
    ///
    /// # Errors
    /// - `ChatError::Config` if the HTTP client cannot be built
    pub fn with_endpoints(
        base_url: impl Into<String>,
        endpoints: Endpoints,
    ) -> Result<Self, ChatError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ChatError::Config(e.to_string()))?;
        Ok(Self::with_client(client, base_url, endpoints))
    }

    /// Create backend around an existing client
    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>, endpoints: Endpoints) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            endpoints,
        }
    }

    /// Base URL without trailing slash
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Decode a JSON answer, mapping non-success statuses to `ChatError::Upstream`
pub(crate) async fn decode_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ChatError> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| ChatError::Transport(e.to_string()))?;

    if !status.is_success() {
        let message = ErrorBody::extract(&body)
            .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
        return Err(ChatError::upstream(status.as_u16(), message));
    }

    serde_json::from_slice(&body).map_err(|e| ChatError::Decode(e.to_string()))
}

pub(crate) fn transport_error(err: &reqwest::Error) -> ChatError {
    ChatError::Transport(err.to_string())
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, ChatError> {
        let response = self
            .client
            .post(self.url(&self.endpoints.chat))
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        decode_response(response).await
    }

    async fn poll_metrics(&self, request_id: &RequestId) -> Result<MetricsPoll, ChatError> {
        let response = self
            .client
            .get(self.url(&self.endpoints.metrics))
            .query(&[("request_id", request_id.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        decode_response(response).await
    }

    async fn poll_evaluation(&self, request_id: &RequestId) -> Result<EvaluationPoll, ChatError> {
        if !request_id.is_path_safe() {
            return Err(ChatError::validation("request_id"));
        }
        let url = format!("{}/{}", self.url(&self.endpoints.evaluation), request_id);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        decode_response(response).await
    }
}
