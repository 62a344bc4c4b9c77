//! Backend seam for the chat session
//!
//! The session only talks to the backend through [`ChatBackend`], so the
//! HTTP client, the test doubles and any future transport are swappable.

use async_trait::async_trait;
use toggle_core::{ChatError, ChatReply, ChatRequest, EvaluationPoll, MetricsPoll, RequestId};

/// Chat endpoints the session calls
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Submit a query
    ///
    /// # Errors
    /// - `ChatError::Upstream` on non-success answers
    /// - `ChatError::Transport` when the endpoint is unreachable
    /// - `ChatError::Decode` when the body is not a chat reply
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, ChatError>;

    /// Fetch the metrics status for a request
    ///
    /// # Errors
    /// Same taxonomy as [`send_chat`](Self::send_chat)
    async fn poll_metrics(&self, request_id: &RequestId) -> Result<MetricsPoll, ChatError>;

    /// Fetch judge evaluation for a request
    ///
    /// # Errors
    /// Same taxonomy as [`send_chat`](Self::send_chat)
    async fn poll_evaluation(&self, request_id: &RequestId) -> Result<EvaluationPoll, ChatError>;
}

/// Paths of the chat, metrics and evaluation endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// `POST` chat path
    pub chat: String,
    /// `GET` metrics path (takes `?request_id=`)
    pub metrics: String,
    /// `GET` evaluation path prefix (takes `/<id>`)
    pub evaluation: String,
}

impl Endpoints {
    /// Multi-agent widget endpoints
    #[must_use]
    pub fn multiagent() -> Self {
        Self {
            chat: "/api/chat-multiagent".to_string(),
            metrics: "/api/chat-metrics".to_string(),
            evaluation: "/api/evaluation".to_string(),
        }
    }

    /// ToggleHealth widget endpoints
    #[must_use]
    pub fn togglehealth() -> Self {
        Self {
            chat: "/api/chat-togglehealth".to_string(),
            metrics: "/api/chat-metrics-togglehealth".to_string(),
            evaluation: "/api/evaluation".to_string(),
        }
    }

    /// Simplified front-end endpoints (no config key)
    #[must_use]
    pub fn simplified() -> Self {
        Self {
            chat: "/api/chat".to_string(),
            metrics: "/api/chat-metrics".to_string(),
            evaluation: "/api/evaluation".to_string(),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::multiagent()
    }
}
