//! Metrics and evaluation polling
//!
//! Both loops retry on "not yet" only. Every other answer, transport errors
//! included, ends the loop so the caller can release the input.

use crate::backend::ChatBackend;
use std::time::Duration;
use toggle_core::{ChatError, MetricsPoll, MetricsSnapshot, RequestId};

/// Poll pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Wait before the first poll
    pub initial_delay: Duration,
    /// Wait between polls
    pub interval: Duration,
    /// Attempt ceiling; `None` polls until a terminal answer
    pub max_attempts: Option<u32>,
}

impl PollConfig {
    /// Metrics endpoint pacing: every second, 20 attempts
    #[inline]
    #[must_use]
    pub fn metrics() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            interval: Duration::from_millis(1000),
            max_attempts: Some(20),
        }
    }

    /// Evaluation endpoint pacing: 1s head start, then every 500ms, 20 attempts
    #[inline]
    #[must_use]
    pub fn evaluation() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            interval: Duration::from_millis(500),
            max_attempts: Some(20),
        }
    }

    /// With attempt ceiling
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max: Option<u32>) -> Self {
        self.max_attempts = max;
        self
    }

    /// With interval (also used as the initial delay)
    #[inline]
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self.initial_delay = interval;
        self
    }

    fn wait_before(&self, attempt: u32) -> Duration {
        if attempt == 1 {
            self.initial_delay
        } else {
            self.interval
        }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::metrics()
    }
}

/// Terminal result of a poll loop
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Data arrived
    Ready(MetricsSnapshot),
    /// Backend does not know the request id
    Unknown,
    /// Attempt ceiling reached while still pending
    Exhausted {
        /// Attempts made
        attempts: u32,
    },
    /// Poll request failed
    Failed(ChatError),
}

impl PollOutcome {
    /// Whether metrics arrived
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Poll the metrics endpoint until a terminal answer
///
/// `on_pending` is called with the attempt number after each `pending` answer.
/// A `ready` answer without a metrics object counts as pending.
pub async fn poll_metrics<F>(
    backend: &dyn ChatBackend,
    request_id: &RequestId,
    config: &PollConfig,
    mut on_pending: F,
) -> PollOutcome
where
    F: FnMut(u32),
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        tokio::time::sleep(config.wait_before(attempts)).await;
        tracing::debug!(%request_id, attempts, "polling metrics");

        match backend.poll_metrics(request_id).await {
            Ok(MetricsPoll::Ready { metrics }) => {
                match metrics.and_then(MetricsSnapshot::from_value) {
                    Some(snapshot) => return PollOutcome::Ready(snapshot),
                    None => {
                        tracing::debug!(%request_id, attempts, "ready answer without metrics");
                        on_pending(attempts);
                    }
                }
            }
            Ok(MetricsPoll::Pending) => on_pending(attempts),
            Ok(MetricsPoll::Unknown) => return PollOutcome::Unknown,
            Ok(MetricsPoll::Error { error }) => {
                let message = error.unwrap_or_else(|| "metrics unavailable".to_string());
                return PollOutcome::Failed(ChatError::upstream(500, message));
            }
            Err(err) => return PollOutcome::Failed(err),
        }

        if config.exhausted(attempts) {
            return PollOutcome::Exhausted { attempts };
        }
    }
}

/// Poll the evaluation endpoint until judge results arrive
///
/// The evaluation endpoint has no "unknown" answer; a request it never saw
/// stays not-ready until the attempt ceiling.
pub async fn poll_evaluation<F>(
    backend: &dyn ChatBackend,
    request_id: &RequestId,
    config: &PollConfig,
    mut on_pending: F,
) -> PollOutcome
where
    F: FnMut(u32),
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        tokio::time::sleep(config.wait_before(attempts)).await;
        tracing::debug!(%request_id, attempts, "polling evaluation");

        match backend.poll_evaluation(request_id).await {
            Ok(poll) => match poll.evaluation {
                Some(evaluation) if poll.ready => {
                    return PollOutcome::Ready(evaluation.to_snapshot());
                }
                _ => on_pending(attempts),
            },
            Err(err) => return PollOutcome::Failed(err),
        }

        if config.exhausted(attempts) {
            return PollOutcome::Exhausted { attempts };
        }
    }
}
