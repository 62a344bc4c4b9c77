//! Chat session: the request lifecycle of the chat widget
//!
//! A session owns the message store, the loading/input flags, the live agent
//! status and the metrics snapshot. It drives one submission at a time:
//! - Append the user turn and a loading placeholder
//! - Call the backend
//! - Play the agent flow as status frames
//! - Settle the placeholder into the assistant answer (or error text)
//! - Arm the metrics side-channel when the backend says metrics are pending
//!
//! Observers subscribe to [`SessionEvent`]s; the session never renders.

use crate::animator::{AnimatorConfig, StatusSequence};
use crate::backend::ChatBackend;
use crate::poller::{poll_evaluation, poll_metrics, PollConfig, PollOutcome};
use crate::push::Subscription;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use toggle_core::types::CUSTOMER_SUPPORT_STYLE;
use toggle_core::{
    AgentStatusInfo, ChatError, ChatMessage, ChatReply, ChatRequest, MessageStore,
    MetricsSnapshot, PushEvent, RequestId,
};

/// Default AI config key sent by the multi-agent widget
pub const DEFAULT_AI_CONFIG_KEY: &str = "policy_multiagent";

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Config key sent with each query; `None` for the simplified variant
    pub ai_config_key: Option<String>,
    /// Status pacing
    pub animator: AnimatorConfig,
    /// Metrics endpoint pacing
    pub metrics_poll: PollConfig,
    /// Evaluation endpoint pacing
    pub evaluation_poll: PollConfig,
    /// Poll the evaluation endpoint after answers that carry a request id
    pub follow_evaluation: bool,
    /// Event channel capacity
    pub event_capacity: usize,
}

impl SessionConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With config key
    #[inline]
    #[must_use]
    pub fn with_ai_config_key(mut self, key: Option<String>) -> Self {
        self.ai_config_key = key;
        self
    }

    /// With animator pacing
    #[inline]
    #[must_use]
    pub fn with_animator(mut self, animator: AnimatorConfig) -> Self {
        self.animator = animator;
        self
    }

    /// With metrics pacing
    #[inline]
    #[must_use]
    pub fn with_metrics_poll(mut self, poll: PollConfig) -> Self {
        self.metrics_poll = poll;
        self
    }

    /// With evaluation follow-up
    #[inline]
    #[must_use]
    pub fn with_evaluation(mut self, poll: PollConfig) -> Self {
        self.follow_evaluation = true;
        self.evaluation_poll = poll;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ai_config_key: Some(DEFAULT_AI_CONFIG_KEY.to_string()),
            animator: AnimatorConfig::default(),
            metrics_poll: PollConfig::metrics(),
            evaluation_poll: PollConfig::evaluation(),
            follow_evaluation: false,
            event_capacity: 256,
        }
    }
}

/// State changes observable by a renderer
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A message was appended
    MessageAppended(ChatMessage),
    /// The loading placeholder was removed
    PlaceholderRemoved,
    /// Status line changed; `None` clears it
    StatusChanged(Option<AgentStatusInfo>),
    /// Loading flag changed
    Loading(bool),
    /// Input enabled flag changed
    InputEnabled(bool),
    /// Metrics poll answered `pending`
    MetricsPending {
        /// Attempt number
        attempt: u32,
    },
    /// Snapshot set or augmented
    MetricsUpdated(MetricsSnapshot),
}

/// How a submission ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input; nothing happened
    Ignored,
    /// Assistant answer appended
    Answered,
    /// Error text appended as the assistant answer
    Failed,
    /// A newer submission started before the reply arrived; it was dropped
    Superseded,
}

/// Point-in-time copy of the session state
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    /// Messages in display order
    pub messages: Vec<ChatMessage>,
    /// Input buffer
    pub input: String,
    /// Waiting for the chat reply
    pub loading: bool,
    /// Input accepts submissions
    pub input_enabled: bool,
    /// Live status line
    pub agent_status: Option<AgentStatusInfo>,
    /// Latest metrics
    pub metrics: Option<MetricsSnapshot>,
    /// Metrics panel expanded
    pub show_metrics: bool,
}

#[derive(Debug)]
struct SessionState {
    store: MessageStore,
    input: String,
    loading: bool,
    input_enabled: bool,
    agent_status: Option<AgentStatusInfo>,
    metrics: Option<MetricsSnapshot>,
    show_metrics: bool,
    generation: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            store: MessageStore::new(),
            input: String::new(),
            loading: false,
            input_enabled: true,
            agent_status: None,
            metrics: None,
            show_metrics: false,
            generation: 0,
        }
    }
}

#[derive(Debug, Default)]
struct BackgroundTasks {
    metrics: Option<JoinHandle<()>>,
    evaluation: Option<JoinHandle<()>>,
    push: Option<JoinHandle<()>>,
}

/// Shared state plus event fan-out, cloned into background tasks
#[derive(Debug, Clone)]
struct Shared {
    state: Arc<Mutex<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }

    /// Show a status frame unless a newer submission took over
    fn set_status(&self, generation: u64, status: Option<AgentStatusInfo>) {
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.agent_status.clone_from(&status);
        }
        self.emit(SessionEvent::StatusChanged(status));
    }

    /// Clear status, swap the placeholder for `message`, release loading
    ///
    /// Base metrics from the reply fill keys an evaluation has not set.
    /// Fails with `ChatError::Cancelled` once a newer submission started;
    /// nothing is changed then.
    fn settle(
        &self,
        generation: u64,
        message: ChatMessage,
        release_input: bool,
        base: Option<MetricsSnapshot>,
    ) -> Result<(), ChatError> {
        let (had_status, metrics) = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return Err(ChatError::Cancelled);
            }
            let had_status = state.agent_status.take().is_some();
            state.store.settle(message.clone());
            state.loading = false;
            if release_input {
                state.input_enabled = true;
            }
            let metrics = base.map(|base| {
                let merged = match state.metrics.take() {
                    Some(mut existing) => {
                        existing.fill_from(&base);
                        existing
                    }
                    None => base,
                };
                state.metrics = Some(merged.clone());
                merged
            });
            (had_status, metrics)
        };

        if had_status {
            self.emit(SessionEvent::StatusChanged(None));
        }
        self.emit(SessionEvent::PlaceholderRemoved);
        self.emit(SessionEvent::MessageAppended(message));
        self.emit(SessionEvent::Loading(false));
        if release_input {
            self.emit(SessionEvent::InputEnabled(true));
        }
        if let Some(metrics) = metrics {
            self.emit(SessionEvent::MetricsUpdated(metrics));
        }
        Ok(())
    }

    /// Apply a poll result unless a newer submission took over
    fn finish_poll(
        &self,
        generation: u64,
        request_id: &RequestId,
        outcome: PollOutcome,
        release_input: bool,
    ) {
        let updated = {
            let mut state = self.state.lock();
            if state.generation != generation {
                tracing::debug!(%request_id, "discarding stale poll result");
                return;
            }

            let updated = match outcome {
                PollOutcome::Ready(newer) => {
                    let merged = match state.metrics.take() {
                        Some(mut existing) => {
                            existing.merge(&newer);
                            existing
                        }
                        None => newer,
                    };
                    state.metrics = Some(merged.clone());
                    tracing::info!(%request_id, "metrics ready");
                    Some(merged)
                }
                PollOutcome::Unknown => {
                    tracing::warn!(%request_id, "request id not recognised by backend");
                    None
                }
                PollOutcome::Exhausted { attempts } => {
                    tracing::warn!(%request_id, attempts, "metrics polling timed out");
                    None
                }
                PollOutcome::Failed(err) => {
                    tracing::error!(%request_id, error = %err, "metrics polling failed");
                    None
                }
            };

            if release_input {
                state.input_enabled = true;
            }
            updated
        };

        if let Some(snapshot) = updated {
            self.emit(SessionEvent::MetricsUpdated(snapshot));
        }
        if release_input {
            self.emit(SessionEvent::InputEnabled(true));
        }
    }

    /// Append pushed support notices; returns whether a message was added
    fn apply_push(&self, event: &PushEvent) -> bool {
        let PushEvent::CustomerSupportMessage { message, request_id, .. } = event else {
            return false;
        };
        tracing::info!(request_id = request_id.as_deref().unwrap_or(""), "support message pushed");

        let message = ChatMessage::system(message.clone()).with_style(CUSTOMER_SUPPORT_STYLE);
        self.state.lock().store.push(message.clone());
        self.emit(SessionEvent::MessageAppended(message));
        true
    }
}

/// Headless chat widget session
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    config: SessionConfig,
    shared: Shared,
    tasks: Mutex<BackgroundTasks>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("config", &self.config)
            .field("state", &self.shared.state)
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Create session over a backend
    #[must_use]
    pub fn new(backend: Arc<dyn ChatBackend>, config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            backend,
            config,
            shared: Shared {
                state: Arc::new(Mutex::new(SessionState::default())),
                events,
            },
            tasks: Mutex::new(BackgroundTasks::default()),
        }
    }

    /// Subscribe to state changes
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Session configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Copy of the current state
    #[must_use]
    pub fn view(&self) -> SessionView {
        let state = self.shared.state.lock();
        SessionView {
            messages: state.store.messages().to_vec(),
            input: state.input.clone(),
            loading: state.loading,
            input_enabled: state.input_enabled,
            agent_status: state.agent_status.clone(),
            metrics: state.metrics.clone(),
            show_metrics: state.show_metrics,
        }
    }

    /// Messages in display order
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.shared.state.lock().store.messages().to_vec()
    }

    /// Replace the input buffer
    pub fn set_input(&self, text: impl Into<String>) {
        self.shared.state.lock().input = text.into();
    }

    /// Submit whatever is in the input buffer
    pub async fn submit_input(&self) -> SubmitOutcome {
        let input = self.shared.state.lock().input.clone();
        self.submit(&input).await
    }

    /// Flip metrics panel visibility, returning the new state
    pub fn toggle_metrics(&self) -> bool {
        let mut state = self.shared.state.lock();
        state.show_metrics = !state.show_metrics;
        state.show_metrics
    }

    /// Metrics to render, only when the panel is expanded and metrics exist
    #[must_use]
    pub fn metrics_panel(&self) -> Option<MetricsSnapshot> {
        let state = self.shared.state.lock();
        if state.show_metrics {
            state.metrics.clone()
        } else {
            None
        }
    }

    /// Submit a query and drive it to its settled state
    ///
    /// Blank input is ignored without touching the store or the network.
    /// When metrics are pending the call returns once the answer is shown;
    /// polling continues in the background and input stays disabled until it
    /// ends (see [`settled`](Self::settled)). A reply that lands after a newer
    /// submission started is dropped and reported as
    /// [`SubmitOutcome::Superseded`].
    pub async fn submit(&self, input: &str) -> SubmitOutcome {
        let text = input.trim();
        if text.is_empty() {
            return SubmitOutcome::Ignored;
        }

        self.cancel_polls();

        let user = ChatMessage::user(text);
        let placeholder = ChatMessage::loading();
        let generation = {
            let mut state = self.shared.state.lock();
            state.generation += 1;
            state.store.push(user.clone());
            state.store.push(placeholder.clone());
            state.input.clear();
            state.loading = true;
            state.input_enabled = false;
            state.show_metrics = false;
            state.agent_status = None;
            state.metrics = None;
            state.generation
        };
        self.shared.emit(SessionEvent::MessageAppended(user));
        self.shared.emit(SessionEvent::MessageAppended(placeholder));
        self.shared.emit(SessionEvent::Loading(true));
        self.shared.emit(SessionEvent::InputEnabled(false));

        tracing::info!(generation, chars = text.len(), "submitting chat query");

        let request = ChatRequest {
            ai_config_key: self.config.ai_config_key.clone(),
            user_input: text.to_string(),
        };

        let settled = match self.backend.send_chat(&request).await {
            Ok(reply) => self
                .settle_reply(reply, generation)
                .await
                .map(|()| SubmitOutcome::Answered),
            Err(err) => self
                .settle_error(&err, generation)
                .map(|()| SubmitOutcome::Failed),
        };

        settled.unwrap_or_else(|err| {
            tracing::debug!(generation, error = %err, "discarding reply of a superseded query");
            SubmitOutcome::Superseded
        })
    }

    async fn settle_reply(&self, reply: ChatReply, generation: u64) -> Result<(), ChatError> {
        if !self.shared.is_current(generation) {
            return Err(ChatError::Cancelled);
        }
        if let Some(error) = &reply.error {
            tracing::warn!(%error, "backend reported an error alongside its reply");
        }

        let sequence = StatusSequence::from_flow(&reply.agent_flow, &self.config.animator);
        sequence
            .play(|status| self.shared.set_status(generation, Some(status.clone())))
            .await;

        let pending = reply.pending_request();
        let answer = ChatMessage::assistant(reply.answer_text());
        self.shared
            .settle(generation, answer, pending.is_none(), reply.metrics_snapshot())?;

        if let Some(request_id) = pending {
            self.spawn_metrics_poll(request_id, generation);
        } else if self.config.follow_evaluation {
            if let Some(request_id) = reply.request_id() {
                self.spawn_evaluation_poll(request_id, generation);
            }
        }
        Ok(())
    }

    fn settle_error(&self, err: &ChatError, generation: u64) -> Result<(), ChatError> {
        self.shared
            .settle(generation, ChatMessage::assistant(err.user_message()), true, None)?;
        tracing::error!(error = %err, "chat query failed");
        Ok(())
    }

    fn spawn_metrics_poll(&self, request_id: RequestId, generation: u64) {
        let backend = Arc::clone(&self.backend);
        let shared = self.shared.clone();
        let config = self.config.metrics_poll;

        let handle = tokio::spawn(async move {
            let events = shared.events.clone();
            let outcome = poll_metrics(backend.as_ref(), &request_id, &config, |attempt| {
                let _ = events.send(SessionEvent::MetricsPending { attempt });
            })
            .await;
            shared.finish_poll(generation, &request_id, outcome, true);
        });
        self.track(generation, handle, |tasks| &mut tasks.metrics);
    }

    fn spawn_evaluation_poll(&self, request_id: RequestId, generation: u64) {
        let backend = Arc::clone(&self.backend);
        let shared = self.shared.clone();
        let config = self.config.evaluation_poll;

        let handle = tokio::spawn(async move {
            let outcome = poll_evaluation(backend.as_ref(), &request_id, &config, |_| {}).await;
            shared.finish_poll(generation, &request_id, outcome, false);
        });
        self.track(generation, handle, |tasks| &mut tasks.evaluation);
    }

    /// Keep a poll handle so it can be awaited or aborted
    ///
    /// A handle spawned for a superseded submission is aborted instead.
    fn track(
        &self,
        generation: u64,
        handle: JoinHandle<()>,
        slot: impl FnOnce(&mut BackgroundTasks) -> &mut Option<JoinHandle<()>>,
    ) {
        let mut tasks = self.tasks.lock();
        if !self.shared.is_current(generation) {
            handle.abort();
            return;
        }
        if let Some(previous) = slot(&mut tasks).replace(handle) {
            previous.abort();
        }
    }

    /// Abort any poll loop left over from an earlier submission
    fn cancel_polls(&self) {
        let mut tasks = self.tasks.lock();
        for handle in [tasks.metrics.take(), tasks.evaluation.take()].into_iter().flatten() {
            handle.abort();
        }
    }

    /// Wait for background polling of the current submission to finish
    pub async fn settled(&self) {
        let handles = {
            let mut tasks = self.tasks.lock();
            [tasks.metrics.take(), tasks.evaluation.take()]
        };
        for handle in handles.into_iter().flatten() {
            let _ = handle.await;
        }
    }

    /// Apply a pushed event; support notices become styled system messages
    pub fn apply_push(&self, event: &PushEvent) -> bool {
        self.shared.apply_push(event)
    }

    /// Feed a push subscription into this session until it closes
    pub fn follow_push(&self, mut subscription: Subscription) {
        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                shared.apply_push(&event);
            }
        });
        if let Some(previous) = self.tasks.lock().push.replace(handle) {
            previous.abort();
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut();
        for handle in [tasks.metrics.take(), tasks.evaluation.take(), tasks.push.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockChatBackend;
    use toggle_core::Role;

    fn session(backend: MockChatBackend) -> ChatSession {
        ChatSession::new(
            Arc::new(backend),
            SessionConfig::new().with_animator(AnimatorConfig::instant()),
        )
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let mut backend = MockChatBackend::new();
        backend.expect_send_chat().never();
        let session = session(backend);

        assert_eq!(session.submit("   \n\t").await, SubmitOutcome::Ignored);
        assert!(session.messages().is_empty());
        assert!(session.view().input_enabled);
    }

    #[tokio::test]
    async fn request_carries_config_key() {
        let mut backend = MockChatBackend::new();
        backend
            .expect_send_chat()
            .withf(|req| {
                req.ai_config_key.as_deref() == Some(DEFAULT_AI_CONFIG_KEY) && req.user_input == "hi"
            })
            .times(1)
            .returning(|_| Ok(ChatReply::answer("hello")));
        let session = session(backend);

        assert_eq!(session.submit("  hi  ").await, SubmitOutcome::Answered);
    }

    #[tokio::test]
    async fn error_settles_into_assistant_message() {
        let mut backend = MockChatBackend::new();
        backend
            .expect_send_chat()
            .returning(|_| Err(ChatError::upstream(500, "upstream timeout")));
        let session = session(backend);

        assert_eq!(session.submit("q").await, SubmitOutcome::Failed);

        let view = session.view();
        assert_eq!(view.messages.len(), 2);
        assert_eq!(view.messages[1].role, Role::Assistant);
        assert_eq!(view.messages[1].content, "upstream timeout");
        assert!(!view.loading);
        assert!(view.input_enabled);
    }

    #[tokio::test]
    async fn input_buffer_is_cleared_on_submit() {
        let mut backend = MockChatBackend::new();
        backend
            .expect_send_chat()
            .returning(|_| Ok(ChatReply::answer("a")));
        let session = session(backend);

        session.set_input("question");
        session.submit_input().await;

        assert_eq!(session.view().input, "");
    }

    #[tokio::test]
    async fn push_support_message_is_styled() {
        let session = session(MockChatBackend::new());
        let applied = session.apply_push(&PushEvent::CustomerSupportMessage {
            message: "please call support".into(),
            request_id: Some("r1".into()),
            toxicity_score: Some(0.8),
        });
        assert!(applied);
        assert!(!session.apply_push(&PushEvent::Pong));

        let messages = session.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].custom_style.as_deref(), Some(CUSTOMER_SUPPORT_STYLE));
    }
}
