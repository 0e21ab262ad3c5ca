//! Monitor output types
//!
//! Critical states, detections, protocol actions and the per-step
//! [`Decision`] returned to the agent loop. Metadata is a closed, per-state
//! tagged enum so consumers know at compile time which fields exist for
//! which state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Classified execution pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriticalState {
    /// Normal operation
    None,
    /// High confusion / uncertainty
    Panic,
    /// Stuck in an action loop
    Deadlock,
    /// Over-confident after shallow research
    Hubris,
    /// Running out of steps or tokens
    Scarcity,
    /// Contradictory information surfaced
    Novelty,
}

impl CriticalState {
    /// Lowercase identifier, matching the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            CriticalState::None => "none",
            CriticalState::Panic => "panic",
            CriticalState::Deadlock => "deadlock",
            CriticalState::Hubris => "hubris",
            CriticalState::Scarcity => "scarcity",
            CriticalState::Novelty => "novelty",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, CriticalState::None)
    }
}

impl fmt::Display for CriticalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

/// Which loop rule produced a DEADLOCK detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoopPattern {
    /// A, A, A
    ExactRepeat,
    /// A, B, A, B (period 2) or A, B, C, A, B, C (period 3)
    Cycle { period: usize },
}

impl fmt::Display for LoopPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopPattern::ExactRepeat => write!(f, "exact repeat"),
            LoopPattern::Cycle { period } => write!(f, "{}-cycle", period),
        }
    }
}

/// Per-state diagnostic data attached to a detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum DetectionMetadata {
    None,
    Deadlock {
        pattern: LoopPattern,
        /// Length of the trailing run that matched the pattern
        repeat_count: usize,
        /// Rendered signatures of the matched run, oldest first
        sequence: Vec<String>,
    },
    Panic {
        confidence_hint: f64,
        text_confidence: f64,
        hedging_markers: Vec<String>,
        hedging_density: f64,
    },
    Hubris {
        confidence_hint: f64,
        steps_taken: u64,
        min_steps: u64,
    },
    Scarcity {
        token_fraction: f64,
        step_fraction: f64,
        tokens_used: u64,
        steps_taken: u64,
    },
    Novelty {
        fact: String,
        observations: Vec<String>,
    },
}

impl DetectionMetadata {
    /// The critical state this metadata belongs to
    pub fn state(&self) -> CriticalState {
        match self {
            DetectionMetadata::None => CriticalState::None,
            DetectionMetadata::Deadlock { .. } => CriticalState::Deadlock,
            DetectionMetadata::Panic { .. } => CriticalState::Panic,
            DetectionMetadata::Hubris { .. } => CriticalState::Hubris,
            DetectionMetadata::Scarcity { .. } => CriticalState::Scarcity,
            DetectionMetadata::Novelty { .. } => CriticalState::Novelty,
        }
    }
}

/// Output of a single detector for a single step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDetection {
    pub state: CriticalState,
    /// How sure the detector is, in [0, 1]
    pub confidence: f64,
    /// Human-readable explanation
    pub reasoning: String,
    pub metadata: DetectionMetadata,
}

impl StateDetection {
    /// A detection whose state is derived from its metadata
    pub fn detected(metadata: DetectionMetadata, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            state: metadata.state(),
            confidence,
            reasoning: reasoning.into(),
            metadata,
        }
    }

    /// "Nothing detected", confidence 0
    pub fn none(reasoning: impl Into<String>) -> Self {
        Self {
            state: CriticalState::None,
            confidence: 0.0,
            reasoning: reasoning.into(),
            metadata: DetectionMetadata::None,
        }
    }

    pub fn is_detected(&self) -> bool {
        !self.state.is_none()
    }
}

impl fmt::Display for StateDetection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (confidence: {:.0}%)",
            self.state,
            self.reasoning,
            self.confidence * 100.0
        )
    }
}

/// Deterministic override issued to the agent loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Directive {
    ForceDifferentAction,
    ForceSynthesis,
    ForceSkepticism,
    UseWhitelistedSources,
    AcknowledgeContradiction,
}

impl Directive {
    /// Relative aggressiveness; a higher value overrides more of the agent's own plan
    pub fn severity(&self) -> u8 {
        match self {
            Directive::AcknowledgeContradiction => 0,
            Directive::ForceSkepticism | Directive::UseWhitelistedSources => 1,
            Directive::ForceDifferentAction => 2,
            Directive::ForceSynthesis => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Directive::ForceDifferentAction => "FORCE_DIFFERENT_ACTION",
            Directive::ForceSynthesis => "FORCE_SYNTHESIS",
            Directive::ForceSkepticism => "FORCE_SKEPTICISM",
            Directive::UseWhitelistedSources => "USE_WHITELISTED_SOURCES",
            Directive::AcknowledgeContradiction => "ACKNOWLEDGE_CONTRADICTION",
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-state instructions carried by a protocol action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ActionMetadata {
    Deadlock {
        /// 1-based activation count of DEADLOCK within the session
        activation: u32,
        pattern: LoopPattern,
        sequence: Vec<String>,
    },
    Panic {
        allowed_sources: Vec<String>,
        require_consensus: bool,
        confusion_level: f64,
    },
    Hubris {
        additional_sources: u32,
        seek_contrary_opinions: bool,
        steps_taken: u64,
    },
    Scarcity {
        token_fraction: f64,
        step_fraction: f64,
        caveat: String,
    },
    Novelty {
        fact: String,
        rerank_sources: bool,
        flag_contradiction: bool,
    },
}

/// Directive plus the context the agent loop needs to carry it out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolAction {
    pub state: CriticalState,
    pub directive: Directive,
    pub reasoning: String,
    pub metadata: ActionMetadata,
}

impl fmt::Display for ProtocolAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: {}", self.state, self.directive, self.reasoning)
    }
}

/// Why the circuit breaker opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TripReason {
    /// Too many consecutive interventions
    Thrashing { consecutive: u32 },
    /// Two distinct states alternating across the whole tracked window
    Oscillation {
        first: CriticalState,
        second: CriticalState,
    },
    /// Too many interventions over the whole session
    TotalLimit { total: u32 },
}

impl fmt::Display for TripReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripReason::Thrashing { consecutive } => {
                write!(f, "thrashing: {} consecutive interventions", consecutive)
            }
            TripReason::Oscillation { first, second } => {
                write!(f, "oscillation between {} and {}", first, second)
            }
            TripReason::TotalLimit { total } => {
                write!(f, "total interventions exceeded: {}", total)
            }
        }
    }
}

/// Bundle attached to every HALT, meant for the logging collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaltDiagnostics {
    pub reason: TripReason,
    /// Last resolved non-NONE states, oldest first
    pub recent_states: Vec<CriticalState>,
    /// Last issued directives, oldest first
    pub recent_directives: Vec<Directive>,
    /// Last agent actions from history, oldest first
    pub recent_actions: Vec<String>,
    /// How often each state was activated during the session
    pub state_frequency: BTreeMap<CriticalState, u32>,
    /// Short description of the dominant pattern
    pub pattern: Option<String>,
    pub recommendations: Vec<String>,
}

/// What the agent loop should do after a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Use the agent's own next-step suggestion unmodified
    NoIntervention,
    /// Override the agent's next step
    Intervene(ProtocolAction),
    /// Stop the session; only a restart clears this
    Halt(HaltDiagnostics),
}

impl Decision {
    pub fn is_halt(&self) -> bool {
        matches!(self, Decision::Halt(_))
    }

    pub fn action(&self) -> Option<&ProtocolAction> {
        match self {
            Decision::Intervene(action) => Some(action),
            _ => None,
        }
    }

    pub fn directive(&self) -> Option<Directive> {
        self.action().map(|a| a.directive)
    }

    pub fn state(&self) -> CriticalState {
        self.action().map(|a| a.state).unwrap_or(CriticalState::None)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::NoIntervention => write!(f, "no intervention"),
            Decision::Intervene(action) => write!(f, "{}", action),
            Decision::Halt(diag) => write!(f, "HALT ({})", diag.reason),
        }
    }
}
