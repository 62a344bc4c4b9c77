//! Testing utilities for the Toggle Assist workspace
//!
//! Shared fixtures and a scripted backend double.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::time::Duration;
use toggle_core::{
    AgentStep, ChatError, ChatReply, ChatRequest, EvaluationPoll, MetricsPoll, RequestId,
};
use toggle_session::{AnimatorConfig, ChatBackend, PollConfig, SessionConfig};

/// Backend answering from pre-loaded queues
///
/// An empty chat queue answers with a transport error; an empty metrics
/// queue answers `unknown`; an empty evaluation queue answers not-ready.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    chat: Mutex<VecDeque<(Option<Duration>, Result<ChatReply, ChatError>)>>,
    metrics: Mutex<VecDeque<Result<MetricsPoll, ChatError>>>,
    evaluations: Mutex<VecDeque<Result<EvaluationPoll, ChatError>>>,
    chat_delay: Mutex<Duration>,
    requests: Mutex<Vec<ChatRequest>>,
    metric_polls: Mutex<Vec<RequestId>>,
    evaluation_polls: Mutex<Vec<RequestId>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chat(self, reply: Result<ChatReply, ChatError>) -> Self {
        self.chat.lock().push_back((None, reply));
        self
    }

    /// Queue a reply that takes `delay` instead of the default latency
    pub fn with_delayed_chat(self, delay: Duration, reply: Result<ChatReply, ChatError>) -> Self {
        self.chat.lock().push_back((Some(delay), reply));
        self
    }

    pub fn with_metrics(self, poll: Result<MetricsPoll, ChatError>) -> Self {
        self.metrics.lock().push_back(poll);
        self
    }

    pub fn with_pending(self, count: usize) -> Self {
        self.metrics
            .lock()
            .extend(std::iter::repeat_with(|| Ok(MetricsPoll::Pending)).take(count));
        self
    }

    pub fn with_evaluation(self, poll: Result<EvaluationPoll, ChatError>) -> Self {
        self.evaluations.lock().push_back(poll);
        self
    }

    /// Simulated latency of chat calls without their own delay
    pub fn with_chat_delay(self, delay: Duration) -> Self {
        *self.chat_delay.lock() = delay;
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    pub fn metric_polls(&self) -> Vec<RequestId> {
        self.metric_polls.lock().clone()
    }

    pub fn evaluation_polls(&self) -> Vec<RequestId> {
        self.evaluation_polls.lock().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, ChatError> {
        self.requests.lock().push(request.clone());
        // Replies are claimed in call order even when calls overlap.
        let (delay, reply) = self
            .chat
            .lock()
            .pop_front()
            .unwrap_or_else(|| (None, Err(ChatError::Transport("no scripted reply".into()))));
        let delay = delay.unwrap_or_else(|| *self.chat_delay.lock());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        reply
    }

    async fn poll_metrics(&self, request_id: &RequestId) -> Result<MetricsPoll, ChatError> {
        self.metric_polls.lock().push(request_id.clone());
        self.metrics
            .lock()
            .pop_front()
            .unwrap_or(Ok(MetricsPoll::Unknown))
    }

    async fn poll_evaluation(&self, request_id: &RequestId) -> Result<EvaluationPoll, ChatError> {
        self.evaluation_polls.lock().push(request_id.clone());
        self.evaluations
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(EvaluationPoll::default()))
    }
}

/// Default pacing, 5 s poll budget
pub fn paced_config() -> SessionConfig {
    SessionConfig::new().with_metrics_poll(PollConfig::metrics().with_max_attempts(Some(5)))
}

/// No status holds, 1 ms polls
pub fn fast_config() -> SessionConfig {
    SessionConfig::new()
        .with_animator(AnimatorConfig::instant())
        .with_metrics_poll(
            PollConfig::metrics()
                .with_interval(Duration::from_millis(1))
                .with_max_attempts(Some(5)),
        )
}

pub fn multiagent_flow() -> Vec<AgentStep> {
    vec![
        AgentStep::new("triage_router").with_status("complete"),
        AgentStep::new("policy_specialist")
            .with_status("complete")
            .with_rag_docs(4),
        AgentStep::new("brand_voice").with_status("complete"),
    ]
}

/// Answer with a three-agent flow and pending metrics
pub fn pending_metrics_reply() -> ChatReply {
    ChatReply::answer("Your plan covers preventive care.")
        .with_request_id("abc123")
        .with_agent_flow(multiagent_flow())
        .with_pending_metrics()
}

pub fn ready_metrics() -> MetricsPoll {
    MetricsPoll::Ready {
        metrics: Some(json!({
            "accuracy_score": 0.92,
            "coherence_score": 0.88,
            "judge_model_name": "judge-v1",
        })),
    }
}

pub fn evaluation_ready() -> EvaluationPoll {
    EvaluationPoll {
        ready: true,
        evaluation: serde_json::from_value(json!({
            "accuracy": {"score": 0.8, "reason": "grounded", "issues": []},
            "coherence": {"score": 0.9, "reason": "clear", "issues": ["terse"]},
            "judge_model_name": "judge-v1",
            "judge_input_tokens": 900,
            "judge_output_tokens": 120,
        }))
        .ok(),
    }
}
