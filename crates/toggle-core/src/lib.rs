//! Toggle Core - chat data model and wire contract
//!
//! Shared by the session library and the proxy:
//! - Chat messages and the ordered message store
//! - Agent flow steps and their status classification
//! - Metrics snapshots and judge evaluations
//! - Tagged request/response types for every endpoint
//! - The chat error taxonomy
//!
//! # Example
//!
//! ```rust
//! use toggle_core::{ChatMessage, MessageStore};
//!
//! let mut store = MessageStore::new();
//! store.push(ChatMessage::user("What does my plan cover?"));
//! store.push(ChatMessage::loading());
//! store.settle(ChatMessage::assistant("Your plan covers..."));
//!
//! assert_eq!(store.len(), 2);
//! assert!(!store.has_placeholder());
//! ```

#![warn(unreachable_pub)]

pub mod agent;
pub mod error;
pub mod metrics;
pub mod store;
pub mod types;
pub mod wire;

pub use agent::{
    classify_agent, AgentPhase, AgentStatusInfo, AgentStep, SpecialistKind, TokenCounts,
};
pub use error::ChatError;
pub use metrics::{Evaluation, JudgeScore, MetricsSnapshot};
pub use store::MessageStore;
pub use types::{ChatMessage, Industry, MessageId, RequestId, Role};
pub use wire::{
    ChatReply, ChatRequest, ErrorBody, EvaluationPoll, FlagRequest, FlagValue, LogEntry,
    MetricsPoll, PushEvent,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Toggle Core
    pub use crate::{
        AgentStatusInfo, AgentStep, ChatError, ChatMessage, ChatReply, ChatRequest,
        MessageStore, MetricsPoll, MetricsSnapshot, RequestId, Role,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
