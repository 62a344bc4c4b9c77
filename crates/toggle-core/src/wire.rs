//! Wire types for the chat, metrics, flag, socket and log endpoints
//!
//! Every backend body is decoded here into a tagged type so downstream code
//! never guards against arbitrary missing fields.

use crate::agent::AgentStep;
use crate::error::ChatError;
use crate::metrics::{Evaluation, MetricsSnapshot};
use crate::types::RequestId;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Assistant text used when a reply carries no answer
pub const APOLOGY: &str = "I'm sorry. Please try again.";

/// Answer text of the transport-failure fallback payload
pub const FALLBACK_RESPONSE: &str = "I'm sorry, an error occurred while processing your request.";

/// Error text of the transport-failure fallback payload
pub const INTERNAL_ERROR: &str = "Internal Server Error";

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of `POST /api/chat*`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// AI config key; omitted by the simplified variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_config_key: Option<String>,
    /// User question
    pub user_input: String,
}

impl ChatRequest {
    /// Request without a config key
    #[inline]
    #[must_use]
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            ai_config_key: None,
            user_input: user_input.into(),
        }
    }

    /// With config key
    #[inline]
    #[must_use]
    pub fn with_config_key(mut self, key: impl Into<String>) -> Self {
        self.ai_config_key = Some(key.into());
        self
    }

    /// Validate an untyped inbound body
    ///
    /// Fields must be non-empty strings. `aiConfigKey` is checked first when
    /// required.
    ///
    /// # Errors
    /// - `ChatError::Validation` naming the first bad field
    pub fn from_json(body: &Value, require_config_key: bool) -> Result<Self, ChatError> {
        let ai_config_key = if require_config_key {
            Some(required_str(body, "aiConfigKey")?)
        } else {
            None
        };
        let user_input = required_str(body, "userInput")?;
        Ok(Self {
            ai_config_key,
            user_input,
        })
    }
}

fn required_str(body: &Value, field: &str) -> Result<String, ChatError> {
    match body.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        _ => Err(ChatError::validation(field)),
    }
}

/// Success body of `POST /api/chat*`
///
/// Decoding is lenient: unknown fields are dropped, which makes this type the
/// proxy's field allow-list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    /// Assistant answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Model that produced the answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    /// Whether the AI config was enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Correlation id for async metrics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Agents that handled the query, in order
    #[serde(default, deserialize_with = "null_as_default")]
    pub agent_flow: Vec<AgentStep>,
    /// Inline metrics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Value>,
    /// Metrics will arrive later via the metrics endpoint
    #[serde(default, deserialize_with = "null_as_default")]
    pub pending_metrics: bool,
    /// Backend-reported error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatReply {
    /// Reply carrying an answer
    #[inline]
    #[must_use]
    pub fn answer(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            ..Self::default()
        }
    }

    /// Success-shaped payload returned when the backend is unreachable
    #[must_use]
    pub fn transport_fallback() -> Self {
        Self {
            response: Some(FALLBACK_RESPONSE.to_string()),
            model_name: Some(String::new()),
            enabled: Some(false),
            request_id: Some(String::new()),
            agent_flow: Vec::new(),
            metrics: None,
            pending_metrics: false,
            error: Some(INTERNAL_ERROR.to_string()),
        }
    }

    /// With request id
    #[inline]
    #[must_use]
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// With agent flow
    #[inline]
    #[must_use]
    pub fn with_agent_flow(mut self, flow: Vec<AgentStep>) -> Self {
        self.agent_flow = flow;
        self
    }

    /// With inline metrics
    #[inline]
    #[must_use]
    pub fn with_metrics(mut self, metrics: Value) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Mark metrics as pending
    #[inline]
    #[must_use]
    pub fn with_pending_metrics(mut self) -> Self {
        self.pending_metrics = true;
        self
    }

    /// Answer text, falling back to the apology when blank
    #[must_use]
    pub fn answer_text(&self) -> &str {
        match self.response.as_deref() {
            Some(text) if !text.trim().is_empty() => text,
            _ => APOLOGY,
        }
    }

    /// Parsed request id
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        self.request_id.as_deref().and_then(RequestId::parse)
    }

    /// Request id to poll with, when metrics are pending
    #[inline]
    #[must_use]
    pub fn pending_request(&self) -> Option<RequestId> {
        if self.pending_metrics {
            self.request_id()
        } else {
            None
        }
    }

    /// Inline metrics as a snapshot
    #[inline]
    #[must_use]
    pub fn metrics_snapshot(&self) -> Option<MetricsSnapshot> {
        self.metrics.clone().and_then(MetricsSnapshot::from_value)
    }
}

/// Body of `GET /api/chat-metrics*`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MetricsPoll {
    /// Metrics computed
    Ready {
        /// Metrics payload
        #[serde(default)]
        metrics: Option<Value>,
    },
    /// Still computing
    Pending,
    /// Proxy could not reach the backend
    Error {
        /// Error text
        #[serde(default)]
        error: Option<String>,
    },
    /// Request id not recognised (also any unrecognised status)
    #[serde(other)]
    Unknown,
}

/// Body of `GET /api/evaluation/<id>`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EvaluationPoll {
    /// Evaluation finished
    #[serde(default)]
    pub ready: bool,
    /// Judge results
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
}

/// Frames pushed over `/ws/flag-monitor`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    /// Flag value at connect time
    InitialFlagValue {
        /// Current value
        #[serde(default)]
        current_value: Option<String>,
    },
    /// Flag changed upstream
    FlagChange {
        /// Changed flag
        flag_key: String,
        /// Previous value
        #[serde(default)]
        old_value: Option<String>,
        /// New value
        #[serde(default)]
        new_value: Option<String>,
    },
    /// Keep-alive answer
    Pong,
    /// Support notice raised by the backend judge
    CustomerSupportMessage {
        /// Text to show
        message: String,
        /// Request the notice refers to
        #[serde(default)]
        request_id: Option<String>,
        /// Toxicity score that triggered it
        #[serde(default)]
        toxicity_score: Option<f64>,
    },
    /// Anything else
    #[serde(other)]
    Other,
}

/// Body of `POST /get-flag-value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagRequest {
    /// Flag to evaluate
    pub flag_key: String,
}

/// Answer of `POST /get-flag-value`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlagValue {
    /// Evaluated value
    #[serde(default)]
    pub flag_value: Option<String>,
}

/// One entry of the `/api/logs/stream` event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Backend timestamp, passed through verbatim
    #[serde(default)]
    pub timestamp: String,
    /// Level name (`INFO`, `ERROR`, `HEARTBEAT`, ...)
    pub level: String,
    /// Log line
    #[serde(default)]
    pub message: String,
    /// Logger name
    #[serde(default)]
    pub name: String,
}

impl LogEntry {
    /// Keep-alive entries are not displayed
    #[inline]
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.level.eq_ignore_ascii_case("HEARTBEAT")
    }
}

/// Error body of any non-success answer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    /// `error` field used by the proxy and the chat backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `detail` field used by FastAPI exceptions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ErrorBody {
    /// Body with an error message
    #[inline]
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            detail: None,
        }
    }

    /// Best-effort message
    #[must_use]
    pub fn message(&self) -> Option<String> {
        if let Some(error) = self.error.as_ref().filter(|e| !e.is_empty()) {
            return Some(error.clone());
        }
        match &self.detail {
            Some(Value::String(detail)) if !detail.is_empty() => Some(detail.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        }
    }

    /// Extract a message from a raw body
    #[must_use]
    pub fn extract(body: &[u8]) -> Option<String> {
        serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn request_validation_order() {
        let err = ChatRequest::from_json(&json!({"userInput": 3}), true).unwrap_err();
        assert_eq!(err, ChatError::validation("aiConfigKey"));

        let err = ChatRequest::from_json(&json!({"aiConfigKey": "k", "userInput": 3}), true)
            .unwrap_err();
        assert_eq!(err, ChatError::validation("userInput"));

        let err = ChatRequest::from_json(&json!({"userInput": ""}), false).unwrap_err();
        assert_eq!(err, ChatError::validation("userInput"));
    }

    #[test]
    fn request_serializes_without_missing_key() {
        let json = serde_json::to_value(ChatRequest::new("hi")).unwrap();
        assert_eq!(json, json!({"userInput": "hi"}));

        let json = serde_json::to_value(ChatRequest::new("hi").with_config_key("k")).unwrap();
        assert_eq!(json, json!({"aiConfigKey": "k", "userInput": "hi"}));
    }

    #[test]
    fn reply_allow_list_drops_unknown_fields() {
        let reply: ChatReply = serde_json::from_value(json!({
            "response": "Your plan covers...",
            "requestId": "abc123",
            "agentFlow": null,
            "pendingMetrics": null,
            "internalTrace": {"secret": true}
        }))
        .unwrap();

        assert!(reply.agent_flow.is_empty());
        assert!(!reply.pending_metrics);
        let out = serde_json::to_value(&reply).unwrap();
        assert!(out.get("internalTrace").is_none());
        assert_eq!(out["agentFlow"], json!([]));
        assert_eq!(out["pendingMetrics"], json!(false));
    }

    #[test]
    fn reply_answer_fallback() {
        assert_eq!(ChatReply::default().answer_text(), APOLOGY);
        assert_eq!(ChatReply::answer("  ").answer_text(), APOLOGY);
        assert_eq!(ChatReply::answer("ok").answer_text(), "ok");
    }

    #[test]
    fn pending_request_needs_id() {
        let reply = ChatReply::answer("ok").with_pending_metrics();
        assert!(reply.pending_request().is_none());

        let reply = reply.with_request_id("abc123");
        assert_eq!(reply.pending_request().unwrap().as_str(), "abc123");
    }

    #[test]
    fn transport_fallback_matches_success_shape() {
        let out = serde_json::to_value(ChatReply::transport_fallback()).unwrap();
        assert_eq!(out["error"], json!("Internal Server Error"));
        assert_eq!(out["modelName"], json!(""));
        assert_eq!(out["enabled"], json!(false));
        assert_eq!(out["requestId"], json!(""));
    }

    #[test]
    fn metrics_poll_statuses() {
        let ready: MetricsPoll =
            serde_json::from_value(json!({"status": "ready", "metrics": {"a": 1}})).unwrap();
        assert_eq!(ready, MetricsPoll::Ready { metrics: Some(json!({"a": 1})) });

        let pending: MetricsPoll = serde_json::from_value(json!({"status": "pending"})).unwrap();
        assert_eq!(pending, MetricsPoll::Pending);

        let unknown: MetricsPoll = serde_json::from_value(json!({"status": "unknown"})).unwrap();
        assert_eq!(unknown, MetricsPoll::Unknown);

        let odd: MetricsPoll = serde_json::from_value(json!({"status": "expired"})).unwrap();
        assert_eq!(odd, MetricsPoll::Unknown);
    }

    #[test]
    fn push_event_tags() {
        let event: PushEvent = serde_json::from_str(
            r#"{"type":"customer_support_message","message":"call us","request_id":"r1","toxicity_score":0.8}"#,
        )
        .unwrap();
        assert!(matches!(event, PushEvent::CustomerSupportMessage { ref message, .. } if message == "call us"));

        let event: PushEvent = serde_json::from_str(r#"{"type":"something_new"}"#).unwrap();
        assert_eq!(event, PushEvent::Other);
    }

    #[test]
    fn error_body_extraction() {
        assert_eq!(
            ErrorBody::extract(br#"{"error":"upstream timeout"}"#),
            Some("upstream timeout".to_string())
        );
        assert_eq!(
            ErrorBody::extract(br#"{"detail":"flag_key is required"}"#),
            Some("flag_key is required".to_string())
        );
        assert_eq!(ErrorBody::extract(b"<html>"), None);
    }

    #[test]
    fn heartbeat_filter() {
        let entry: LogEntry = serde_json::from_str(
            r#"{"timestamp":"t","level":"HEARTBEAT","message":"","name":"sse"}"#,
        )
        .unwrap();
        assert!(entry.is_heartbeat());
    }
}
