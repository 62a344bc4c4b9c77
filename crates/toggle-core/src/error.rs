//! Error types for Toggle chat
//!
//! One taxonomy shared by the proxy and the session:
//! - Validation of inbound request fields
//! - Upstream (backend) non-success responses
//! - Transport failures reaching the backend
//! - Decode failures on response bodies

/// Main chat error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Required request field missing, empty or not a string
    #[error("Missing or invalid '{field}'.")]
    Validation {
        /// Offending field name as it appears on the wire
        field: String,
    },

    /// Backend answered with a non-success status
    #[error("{message}")]
    Upstream {
        /// HTTP status code returned by the backend
        status: u16,
        /// Best-effort message extracted from the backend body
        message: String,
    },

    /// Backend could not be reached
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body did not match the expected shape
    #[error("decode error: {0}")]
    Decode(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation cancelled by a newer submission or teardown
    #[error("operation cancelled")]
    Cancelled,
}

impl ChatError {
    /// Validation error for a named field
    #[inline]
    pub fn validation(field: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
        }
    }

    /// Upstream error with status and message
    #[inline]
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Check if the failure is worth another attempt
    ///
    /// Only transport hiccups and 5xx answers qualify; validation and decode
    /// failures will not change on retry.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status the proxy answers with for this error
    #[inline]
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            _ => 500,
        }
    }

    /// Text shown to the user in a synthetic assistant message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Upstream { message, .. } => message.clone(),
            Self::Cancelled => "Request cancelled.".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display_names_field() {
        let err = ChatError::validation("userInput");
        assert_eq!(err.to_string(), "Missing or invalid 'userInput'.");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn upstream_user_message_is_raw_text() {
        let err = ChatError::upstream(500, "upstream timeout");
        assert_eq!(err.user_message(), "upstream timeout");
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn chat_error_is_retryable() {
        assert!(ChatError::Transport("refused".into()).is_retryable());
        assert!(ChatError::upstream(503, "busy").is_retryable());
        assert!(!ChatError::upstream(404, "gone").is_retryable());
        assert!(!ChatError::validation("aiConfigKey").is_retryable());
        assert!(!ChatError::Decode("eof".into()).is_retryable());
    }
}
