//! Toggle Session - headless chat widget orchestration
//!
//! Drives one chat conversation against the assistant backend:
//! - [`ChatSession`]: submission lifecycle, placeholder handling, metrics panel
//! - [`StatusSequence`]: paced agent status line derived from the agent flow
//! - [`poll_metrics`] / [`poll_evaluation`]: bounded metrics side-channel
//! - [`PushChannel`]: flag monitor socket with reconnect and fan-out
//! - [`FlagClient`] / [`FlagWatcher`]: industry flag lookup and change reloads
//! - [`LogTail`]: backend log stream
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use toggle_session::{ChatSession, HttpBackend, SessionConfig};
//!
//! # async fn demo() -> Result<(), toggle_core::ChatError> {
//! let backend = HttpBackend::new("http://localhost:8000")?;
//! let session = ChatSession::new(Arc::new(backend), SessionConfig::default());
//!
//! session.submit("What does my plan cover?").await;
//! session.settled().await;
//! println!("{:?}", session.view().metrics);
//! # Ok(())
//! # }
//! ```

pub mod animator;
pub mod backend;
pub mod flag;
pub mod http;
pub mod logs;
pub mod poller;
pub mod push;
pub mod session;

pub use animator::{AnimatorConfig, StatusFrame, StatusSequence};
pub use backend::{ChatBackend, Endpoints};
pub use flag::{FlagClient, FlagReload, FlagWatcher, DEMO_FLAG_KEY};
pub use http::{HttpBackend, DEFAULT_BASE_URL};
pub use logs::{parse_entry, LogTail, SseDecoder};
pub use poller::{poll_evaluation, poll_metrics, PollConfig, PollOutcome};
pub use push::{
    should_reconnect, PushChannel, PushConfig, ReconnectPolicy, Subscription, SubscriptionId,
};
pub use session::{
    ChatSession, SessionConfig, SessionEvent, SessionView, SubmitOutcome, DEFAULT_AI_CONFIG_KEY,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving a session
    pub use crate::{
        AnimatorConfig, ChatBackend, ChatSession, HttpBackend, PollConfig, SessionConfig,
        SessionEvent, SubmitOutcome,
    };
    pub use toggle_core::prelude::*;
}
