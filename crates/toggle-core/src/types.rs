//! Core types for Toggle chat
//!
//! Defines the fundamental chat types:
//! - Message identifiers and roles
//! - Chat messages
//! - Request correlation ids
//! - Industry skins selected by the demo flag

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use ulid::Ulid;

/// Content of the transient loading placeholder
pub const LOADING_CONTENT: &str = "loading";

/// Style tag for support messages pushed over the socket
pub const CUSTOMER_SUPPORT_STYLE: &str = "customer-support";

/// Unique message identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Ulid);

impl MessageId {
    /// Generate new message ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who authored a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Typed by the user
    User,
    /// Answer from the assistant (or a synthetic error answer)
    Assistant,
    /// Out-of-band notice, e.g. pushed support messages
    System,
    /// Transient status line; only the loading placeholder uses it
    Status,
}

/// A single chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message ID
    pub id: MessageId,
    /// Author role
    pub role: Role,
    /// Text content
    pub content: String,
    /// Optional style tag for the renderer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_style: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Create message with role and content
    #[inline]
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            custom_style: None,
            created_at: Utc::now(),
        }
    }

    /// User message
    #[inline]
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Assistant message
    #[inline]
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// System message
    #[inline]
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Transient loading placeholder
    #[inline]
    #[must_use]
    pub fn loading() -> Self {
        Self::new(Role::Status, LOADING_CONTENT)
    }

    /// With style tag
    #[inline]
    #[must_use]
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.custom_style = Some(style.into());
        self
    }

    /// Whether this is a transient placeholder
    #[inline]
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.role == Role::Status
    }
}

/// Opaque correlation id for async metrics
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Wrap a backend-issued id; empty ids are treated as absent
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Borrow the raw id
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id can be used verbatim as one URL path segment
    ///
    /// Only ASCII alphanumerics, `-`, `_` and `.` are allowed, and dot-only
    /// ids are rejected so a segment can never walk up the path.
    #[must_use]
    pub fn is_path_safe(&self) -> bool {
        let allowed = self
            .0
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
        allowed && !self.0.bytes().all(|b| b == b'.')
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Product skin selected by the demo flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Industry {
    /// ToggleBank
    #[default]
    Banking,
    /// ToggleHealth
    Health,
    /// ToggleInvest
    Investment,
    /// Toggle mental health
    MentalHealth,
}

impl Industry {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Industry::Banking => "banking",
            Industry::Health => "health",
            Industry::Investment => "investment",
            Industry::MentalHealth => "mental-health",
        }
    }

    /// Map a raw flag value, falling back to banking for anything unrecognised
    #[must_use]
    pub fn from_flag(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl FromStr for Industry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "banking" | "bank" => Ok(Industry::Banking),
            "health" | "healthcare" => Ok(Industry::Health),
            "investment" | "investing" => Ok(Industry::Investment),
            "mental-health" | "mental_health" | "mentalhealth" => Ok(Industry::MentalHealth),
            other => Err(format!("unknown industry: {other}")),
        }
    }
}

impl std::fmt::Display for Industry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
