//! Agent flow steps and their display classification
//!
//! The backend reports the agents that handled a query as an ordered list.
//! The client never reasons about them beyond picking a status line per step.

use serde::{Deserialize, Serialize};

/// Identifier of the routing agent
pub const TRIAGE_ROUTER: &str = "triage_router";

/// Identifier of the final formatting agent
pub const BRAND_VOICE: &str = "brand_voice";

/// Token counts reported for one agent step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenCounts {
    /// Prompt tokens
    #[serde(default)]
    pub input: u64,
    /// Completion tokens
    #[serde(default)]
    pub output: u64,
}

/// One backend-reported processing stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStep {
    /// Agent identifier, e.g. `policy_specialist`
    pub agent: String,
    /// Human-readable agent name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Backend status string (usually `complete`)
    #[serde(default)]
    pub status: String,
    /// Routing confidence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Retrieved document count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_docs: Option<u64>,
    /// Duration reported by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Token usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenCounts>,
    /// Icon suggested by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl AgentStep {
    /// Create step with identifier and `complete` status
    #[inline]
    #[must_use]
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            name: None,
            status: "complete".to_string(),
            confidence: None,
            rag_docs: None,
            duration: None,
            tokens: None,
            icon: None,
        }
    }

    /// With status string
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// With retrieved document count
    #[inline]
    #[must_use]
    pub fn with_rag_docs(mut self, docs: u64) -> Self {
        self.rag_docs = Some(docs);
        self
    }

    /// Display phase for this step, if any
    #[inline]
    #[must_use]
    pub fn phase(&self) -> Option<AgentPhase> {
        classify_agent(&self.agent)
    }
}

/// Which specialist handled the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialistKind {
    /// Policy and coverage questions
    Policy,
    /// Provider lookup
    Provider,
    /// Appointment scheduling
    Scheduler,
    /// Any other specialist
    Generic,
}

impl SpecialistKind {
    /// Sub-classify a specialist identifier
    #[must_use]
    pub fn from_agent(agent: &str) -> Self {
        if agent.contains("policy") {
            SpecialistKind::Policy
        } else if agent.contains("provider") {
            SpecialistKind::Provider
        } else if agent.contains("scheduler") {
            SpecialistKind::Scheduler
        } else {
            SpecialistKind::Generic
        }
    }
}

/// Display phase of the status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentPhase {
    /// Triage routing
    Routing,
    /// Specialist lookup
    Specialist(SpecialistKind),
    /// Final polishing
    BrandVoice,
    /// Flow finished
    Complete,
}

impl AgentPhase {
    /// Wire-style status name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentPhase::Routing => "routing",
            AgentPhase::Specialist(_) => "specialist",
            AgentPhase::BrandVoice => "brand_voice",
            AgentPhase::Complete => "complete",
        }
    }

    /// Status line shown while this phase is live
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            AgentPhase::Routing => "🔍 Analyzing your question...",
            AgentPhase::Specialist(SpecialistKind::Policy) => {
                "📋 Reaching out to Policy Specialist..."
            }
            AgentPhase::Specialist(SpecialistKind::Provider) => {
                "🏥 Reaching out to Provider Specialist..."
            }
            AgentPhase::Specialist(SpecialistKind::Scheduler) => {
                "📅 Reaching out to Scheduler Specialist..."
            }
            AgentPhase::Specialist(SpecialistKind::Generic) => "👔 Reaching out to specialist...",
            AgentPhase::BrandVoice => "✨ Putting an answer together...",
            AgentPhase::Complete => "Processing...",
        }
    }
}

/// Classify an agent identifier into a display phase
///
/// Unrecognised identifiers yield `None` and are skipped by the animator.
#[must_use]
pub fn classify_agent(agent: &str) -> Option<AgentPhase> {
    if agent == TRIAGE_ROUTER {
        Some(AgentPhase::Routing)
    } else if agent.contains("specialist") {
        Some(AgentPhase::Specialist(SpecialistKind::from_agent(agent)))
    } else if agent == BRAND_VOICE {
        Some(AgentPhase::BrandVoice)
    } else {
        None
    }
}

/// Live status line state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStatusInfo {
    /// Current phase
    pub phase: AgentPhase,
    /// Agent that produced the phase, if known
    pub agent: Option<String>,
    /// Text to render
    pub message: String,
}

impl AgentStatusInfo {
    /// Status for a phase without an agent
    #[inline]
    #[must_use]
    pub fn new(phase: AgentPhase) -> Self {
        Self {
            phase,
            agent: None,
            message: phase.message().to_string(),
        }
    }

    /// Status derived from a classified step
    #[must_use]
    pub fn for_step(step: &AgentStep) -> Option<Self> {
        step.phase().map(|phase| Self {
            phase,
            agent: Some(step.agent.clone()),
            message: phase.message().to_string(),
        })
    }
}
