//! Session lifecycle tests against a scripted backend

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use toggle_core::{AgentPhase, ChatError, ChatReply, MetricsPoll, Role, SpecialistKind};
use toggle_session::{ChatSession, PollConfig, SessionEvent, SubmitOutcome};
use toggle_test_utils::{
    evaluation_ready, fast_config, multiagent_flow, paced_config, ready_metrics,
    pending_metrics_reply, ScriptedBackend,
};

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn position(events: &[SessionEvent], wanted: &SessionEvent) -> usize {
    events
        .iter()
        .position(|e| e == wanted)
        .unwrap_or_else(|| panic!("missing {wanted:?} in {events:?}"))
}

#[tokio::test(start_paused = true)]
async fn status_sequence_then_answer() {
    let reply = ChatReply::answer("Your plan covers...")
        .with_agent_flow(multiagent_flow())
        .with_metrics(json!({"query_type": "coverage"}));
    let backend = Arc::new(ScriptedBackend::new().with_chat(Ok(reply)));
    let session = ChatSession::new(backend.clone(), paced_config());
    let mut rx = session.subscribe();

    let start = tokio::time::Instant::now();
    let outcome = session.submit("What does my plan cover?").await;
    assert_eq!(outcome, SubmitOutcome::Answered);
    assert_eq!(start.elapsed(), Duration::from_millis(1100));

    let events = drain(&mut rx);
    let phases: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StatusChanged(status) => Some(status.as_ref().map(|s| s.phase)),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            Some(AgentPhase::Routing),
            Some(AgentPhase::Specialist(SpecialistKind::Policy)),
            Some(AgentPhase::BrandVoice),
            None,
        ]
    );

    let view = session.view();
    assert_eq!(view.messages.len(), 2);
    assert_eq!(view.messages[0].role, Role::User);
    assert_eq!(view.messages[1].content, "Your plan covers...");
    assert!(view.agent_status.is_none());
    assert!(view.input_enabled);
    assert!(!view.loading);

    assert!(session.metrics_panel().is_none());
    assert!(session.toggle_metrics());
    let panel = session.metrics_panel().unwrap();
    assert_eq!(panel.get_str("query_type"), Some("coverage"));

    assert_eq!(
        backend.requests()[0].ai_config_key.as_deref(),
        Some("policy_multiagent")
    );
}

#[tokio::test]
async fn upstream_error_becomes_assistant_text() {
    let backend = Arc::new(
        ScriptedBackend::new().with_chat(Err(ChatError::upstream(500, "upstream timeout"))),
    );
    let session = ChatSession::new(backend, fast_config());

    assert_eq!(session.submit("hello").await, SubmitOutcome::Failed);

    let view = session.view();
    let assistant: Vec<_> = view
        .messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .collect();
    assert_eq!(assistant.len(), 1);
    assert_eq!(assistant[0].content, "upstream timeout");
    assert!(!view.loading);
    assert!(view.input_enabled);
    assert!(view.messages.iter().all(|m| !m.is_placeholder()));
}

#[tokio::test(start_paused = true)]
async fn input_released_when_metrics_ready() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_chat(Ok(pending_metrics_reply()))
            .with_pending(2)
            .with_metrics(Ok(ready_metrics())),
    );
    let session = ChatSession::new(backend.clone(), paced_config());
    let mut rx = session.subscribe();

    session.submit("What does my plan cover?").await;
    let view = session.view();
    assert!(!view.input_enabled);
    assert!(!view.loading);
    assert_eq!(view.messages.len(), 2);

    session.settled().await;

    let events = drain(&mut rx);
    let second_pending = position(&events, &SessionEvent::MetricsPending { attempt: 2 });
    let enabled = position(&events, &SessionEvent::InputEnabled(true));
    assert!(enabled > second_pending);
    assert!(events[second_pending..enabled]
        .iter()
        .any(|e| matches!(e, SessionEvent::MetricsUpdated(_))));

    assert_eq!(backend.metric_polls().len(), 3);
    assert_eq!(backend.metric_polls()[0].as_str(), "abc123");

    let view = session.view();
    assert!(view.input_enabled);
    assert_eq!(view.messages.len(), 2);
    assert!(session.toggle_metrics());
    assert_eq!(
        session.metrics_panel().unwrap().get_f64("accuracy_score"),
        Some(0.92)
    );
}

#[tokio::test(start_paused = true)]
async fn unknown_request_stops_polling() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_chat(Ok(pending_metrics_reply()))
            .with_metrics(Ok(MetricsPoll::Unknown))
            .with_pending(3),
    );
    let session = ChatSession::new(backend.clone(), fast_config());

    session.submit("q").await;
    session.settled().await;

    assert_eq!(backend.metric_polls().len(), 1);
    let view = session.view();
    assert!(view.input_enabled);
    assert!(view.metrics.is_none());
    session.toggle_metrics();
    assert!(session.metrics_panel().is_none());
}

#[tokio::test(start_paused = true)]
async fn exhausted_polling_releases_input() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_chat(Ok(pending_metrics_reply()))
            .with_pending(10),
    );
    let session = ChatSession::new(backend.clone(), fast_config());

    session.submit("q").await;
    session.settled().await;

    assert_eq!(backend.metric_polls().len(), 5);
    assert!(session.view().input_enabled);
}

#[tokio::test]
async fn whitespace_input_changes_nothing() {
    let backend = Arc::new(ScriptedBackend::new());
    let session = ChatSession::new(backend.clone(), fast_config());
    let mut rx = session.subscribe();

    session.set_input("  \t ");
    assert_eq!(session.submit_input().await, SubmitOutcome::Ignored);

    assert!(session.messages().is_empty());
    assert!(backend.requests().is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn missing_flow_and_blank_answer() {
    let reply = ChatReply {
        response: Some("   ".into()),
        ..ChatReply::default()
    };
    let backend = Arc::new(ScriptedBackend::new().with_chat(Ok(reply)));
    let session = ChatSession::new(backend, fast_config());
    let mut rx = session.subscribe();

    session.submit("q").await;

    let events = drain(&mut rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::StatusChanged(_))));
    assert_eq!(
        session.messages()[1].content,
        "I'm sorry. Please try again."
    );
}

#[tokio::test(start_paused = true)]
async fn new_submission_cancels_previous_poll() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_chat(Ok(pending_metrics_reply()))
            .with_chat(Ok(ChatReply::answer("second")))
            .with_pending(50),
    );
    let session = ChatSession::new(backend.clone(), paced_config());

    session.submit("first").await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let polls_before = backend.metric_polls().len();
    assert!(polls_before >= 1);

    session.submit("second").await;
    session.settled().await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(backend.metric_polls().len(), polls_before);
    let view = session.view();
    assert_eq!(view.messages.len(), 4);
    assert!(view.input_enabled);
    assert!(view.messages.iter().all(|m| !m.is_placeholder()));
}

#[tokio::test(start_paused = true)]
async fn late_reply_of_earlier_query_is_dropped() {
    let stale = ChatReply::answer("stale").with_metrics(json!({"stale": true}));
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_chat_delay(Duration::from_secs(1))
            .with_delayed_chat(Duration::from_secs(5), Ok(stale))
            .with_chat(Ok(pending_metrics_reply()))
            .with_pending(100),
    );
    let config = paced_config().with_metrics_poll(PollConfig::metrics());
    let session = Arc::new(ChatSession::new(backend.clone(), config));

    let first = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.submit("first").await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(session.submit("second").await, SubmitOutcome::Answered);
    let view = session.view();
    assert!(!view.input_enabled);
    assert!(view.metrics.is_none());

    assert_eq!(first.await.unwrap(), SubmitOutcome::Superseded);
    let view = session.view();
    assert!(!view.input_enabled);
    assert!(view.metrics.is_none());
    assert!(view.agent_status.is_none());
    let contents: Vec<_> = view.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        vec!["first", "second", "Your plan covers preventive care."]
    );

    session.settled().await;
    assert_eq!(backend.metric_polls().len(), 20);
    assert!(session.view().input_enabled);
}

#[tokio::test(start_paused = true)]
async fn evaluation_follow_up_merges_into_metrics() {
    let reply = ChatReply::answer("ok")
        .with_request_id("req-9")
        .with_metrics(json!({"query_type": "coverage", "accuracy_score": 0.1}));
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_chat(Ok(reply))
            .with_evaluation(Ok(Default::default()))
            .with_evaluation(Ok(evaluation_ready())),
    );
    let config = fast_config().with_evaluation(PollConfig::evaluation());
    let session = ChatSession::new(backend.clone(), config);

    session.submit("q").await;
    assert!(session.view().input_enabled);
    session.settled().await;

    assert_eq!(backend.evaluation_polls().len(), 2);
    let metrics = session.view().metrics.unwrap();
    assert_eq!(metrics.get_str("query_type"), Some("coverage"));
    assert_eq!(metrics.get_f64("accuracy_score"), Some(0.8));
    assert_eq!(metrics.get_str("coherence_reasoning"), Some("clear"));
    assert_eq!(metrics.get_str("judge_model_name"), Some("judge-v1"));
}
