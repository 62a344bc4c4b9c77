//! Agent status sequencing
//!
//! The backend has already run every agent by the time the flow arrives, so
//! the sequence only paces the status line. Frames are derived from the flow
//! up front and then played back with configured holds.

use std::time::Duration;
use toggle_core::{AgentPhase, AgentStatusInfo, AgentStep};

/// Hold durations per phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimatorConfig {
    /// Hold after the routing frame
    pub routing_delay: Duration,
    /// Hold after each specialist frame
    pub specialist_delay: Duration,
    /// Hold after the polishing frame
    pub brand_voice_delay: Duration,
}

impl AnimatorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All holds zero; frames are still emitted
    #[inline]
    #[must_use]
    pub fn instant() -> Self {
        Self {
            routing_delay: Duration::ZERO,
            specialist_delay: Duration::ZERO,
            brand_voice_delay: Duration::ZERO,
        }
    }

    /// With specialist hold
    #[inline]
    #[must_use]
    pub fn with_specialist_delay(mut self, delay: Duration) -> Self {
        self.specialist_delay = delay;
        self
    }

    /// Hold for a phase
    #[inline]
    #[must_use]
    pub fn hold_for(&self, phase: AgentPhase) -> Duration {
        match phase {
            AgentPhase::Routing => self.routing_delay,
            AgentPhase::Specialist(_) => self.specialist_delay,
            AgentPhase::BrandVoice => self.brand_voice_delay,
            AgentPhase::Complete => Duration::ZERO,
        }
    }
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self {
            routing_delay: Duration::from_millis(300),
            specialist_delay: Duration::from_millis(500),
            brand_voice_delay: Duration::from_millis(300),
        }
    }
}

/// One status frame and how long it stays up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFrame {
    /// Status to show
    pub status: AgentStatusInfo,
    /// Hold before the next frame
    pub hold: Duration,
}

/// Declarative status sequence for one reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSequence {
    frames: Vec<StatusFrame>,
}

impl StatusSequence {
    /// Build the sequence for an agent flow; unclassified steps are skipped
    #[must_use]
    pub fn from_flow(flow: &[AgentStep], config: &AnimatorConfig) -> Self {
        let frames = flow
            .iter()
            .filter_map(AgentStatusInfo::for_step)
            .map(|status| StatusFrame {
                hold: config.hold_for(status.phase),
                status,
            })
            .collect();
        Self { frames }
    }

    /// Frames in play order
    #[inline]
    #[must_use]
    pub fn frames(&self) -> &[StatusFrame] {
        &self.frames
    }

    /// Whether there is nothing to play
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Sum of all holds
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.frames.iter().map(|f| f.hold).sum()
    }

    /// Play frames, calling `on_frame` as each becomes live
    pub async fn play<F>(&self, mut on_frame: F)
    where
        F: FnMut(&AgentStatusInfo),
    {
        for frame in &self.frames {
            tracing::debug!(phase = frame.status.phase.as_str(), "status frame");
            on_frame(&frame.status);
            if !frame.hold.is_zero() {
                tokio::time::sleep(frame.hold).await;
            }
        }
    }
}
