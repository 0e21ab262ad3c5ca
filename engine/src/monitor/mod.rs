//! Monitor
//!
//! Resolves the detections of one step into at most one active critical
//! state and maps it to its protocol action. Resolution walks an explicit
//! priority list, not a confidence comparison:
//!
//! ```text
//! DEADLOCK > PANIC > SCARCITY > HUBRIS > NOVELTY > NONE
//! ```
//!
//! The first state whose detection confidence exceeds its activation
//! threshold wins. Every state maps to exactly one directive, except DEADLOCK,
//! which escalates from FORCE_DIFFERENT_ACTION to FORCE_SYNTHESIS once it has
//! been activated `synthesis_after` times in the session.

use crate::config::Config;
use crate::evaluator::{CriticalStateEvaluator, Detections, Detector, EvaluationContext};
use sdk::{
    ActionMetadata, CriticalState, DetectionMetadata, Directive, MonitorError, ProtocolAction,
    StateDetection,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolution order, highest priority first
pub const PRIORITY: [CriticalState; 5] = [
    CriticalState::Deadlock,
    CriticalState::Panic,
    CriticalState::Scarcity,
    CriticalState::Hubris,
    CriticalState::Novelty,
];

const SCARCITY_CAVEAT: &str =
    "Answer synthesized under resource pressure from the information gathered so far; it may be incomplete";

/// One entry of the priority list
#[derive(Clone)]
pub struct PriorityRule {
    pub state: CriticalState,
    pub detector: Arc<dyn Detector>,
    /// Confidence a detection must exceed to activate
    pub activation_threshold: f64,
}

impl std::fmt::Debug for PriorityRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityRule")
            .field("state", &self.state)
            .field("activation_threshold", &self.activation_threshold)
            .finish()
    }
}

/// Outcome of one monitored step
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Active state after resolution (NONE if nothing qualified)
    pub state: CriticalState,
    /// The detection that won, if any
    pub detection: Option<StateDetection>,
    /// Protocol action for the active state
    pub action: Option<ProtocolAction>,
    /// All detections of the step
    pub detections: Detections,
}

/// Fixed settings of the protocol lookup table
#[derive(Debug, Clone)]
struct ProtocolTable {
    synthesis_after: u32,
    allowed_sources: Vec<String>,
    additional_sources: u32,
}

/// Per-session monitor
///
/// Holds the DEADLOCK escalation counter, so each session needs its own
/// instance.
pub struct Monitor {
    rules: Vec<PriorityRule>,
    protocols: ProtocolTable,
    deadlock_activations: u32,
    activations: BTreeMap<CriticalState, u32>,
}

impl Monitor {
    /// Monitor with the five standard detectors
    pub fn new(config: &Config) -> Result<Self, MonitorError> {
        let evaluator = CriticalStateEvaluator::standard(&config.detectors)?;
        Self::with_evaluator(evaluator, config)
    }

    /// Monitor over a custom detector set
    ///
    /// The evaluator only supplies detectors; one is picked per prioritized
    /// state and the rest are ignored.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Config` if a prioritized state has no detector.
    pub fn with_evaluator(
        evaluator: CriticalStateEvaluator,
        config: &Config,
    ) -> Result<Self, MonitorError> {
        let rules = PRIORITY
            .iter()
            .map(|&state| {
                let detector = evaluator.detector(state).ok_or_else(|| {
                    MonitorError::Config(format!("No detector registered for {}", state))
                })?;
                Ok(PriorityRule {
                    state,
                    detector,
                    activation_threshold: config.activation.threshold(state),
                })
            })
            .collect::<Result<Vec<_>, MonitorError>>()?;

        Ok(Self {
            rules,
            protocols: ProtocolTable {
                synthesis_after: config.detectors.deadlock.synthesis_after,
                allowed_sources: config.detectors.panic.allowed_sources.clone(),
                additional_sources: config.detectors.hubris.additional_sources,
            },
            deadlock_activations: 0,
            activations: BTreeMap::new(),
        })
    }

    /// Priority list, highest first
    pub fn rules(&self) -> &[PriorityRule] {
        &self.rules
    }

    /// Number of times DEADLOCK became the active state
    pub fn deadlock_activations(&self) -> u32 {
        self.deadlock_activations
    }

    /// Activation counts per state for this session
    pub fn activations(&self) -> &BTreeMap<CriticalState, u32> {
        &self.activations
    }

    /// Run the detector of every rule on one step, in priority order
    ///
    /// Each detection is checked against the detector contract; the first
    /// failure aborts the evaluation.
    pub fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<Detections, MonitorError> {
        self.rules
            .iter()
            .map(|rule| {
                CriticalStateEvaluator::run(rule.detector.as_ref(), ctx)
                    .map(|detection| (rule.state, detection))
            })
            .collect()
    }

    /// First qualifying detection in priority order
    ///
    /// Pure: calling it does not touch the escalation counter.
    pub fn resolve<'d>(&self, detections: &'d Detections) -> Option<&'d StateDetection> {
        self.rules.iter().find_map(|rule| {
            detections
                .get(rule.state)
                .filter(|d| d.state == rule.state && d.confidence > rule.activation_threshold)
        })
    }

    /// Evaluate, resolve and map one step to its protocol action
    pub fn step(&mut self, ctx: &EvaluationContext<'_>) -> Result<Resolution, MonitorError> {
        let detections = self.evaluate(ctx)?;

        let Some(detection) = self.resolve(&detections).cloned() else {
            debug!("Step {}: no critical state", ctx.step.step_index());
            return Ok(Resolution {
                state: CriticalState::None,
                detection: None,
                action: None,
                detections,
            });
        };

        let action = self.activate(&detection)?;
        info!(
            "Step {}: {} active, issuing {}",
            ctx.step.step_index(),
            detection.state,
            action.directive
        );

        Ok(Resolution {
            state: detection.state,
            detection: Some(detection),
            action: Some(action),
            detections,
        })
    }

    /// Record an activation and build its protocol action
    fn activate(&mut self, detection: &StateDetection) -> Result<ProtocolAction, MonitorError> {
        *self.activations.entry(detection.state).or_insert(0) += 1;

        let (directive, metadata) = match &detection.metadata {
            DetectionMetadata::Deadlock {
                pattern, sequence, ..
            } => {
                self.deadlock_activations += 1;
                let directive = if self.deadlock_activations >= self.protocols.synthesis_after {
                    Directive::ForceSynthesis
                } else {
                    Directive::ForceDifferentAction
                };
                (
                    directive,
                    ActionMetadata::Deadlock {
                        activation: self.deadlock_activations,
                        pattern: *pattern,
                        sequence: sequence.clone(),
                    },
                )
            }
            DetectionMetadata::Panic { .. } => (
                Directive::UseWhitelistedSources,
                ActionMetadata::Panic {
                    allowed_sources: self.protocols.allowed_sources.clone(),
                    require_consensus: true,
                    confusion_level: detection.confidence,
                },
            ),
            DetectionMetadata::Hubris { steps_taken, .. } => (
                Directive::ForceSkepticism,
                ActionMetadata::Hubris {
                    additional_sources: self.protocols.additional_sources,
                    seek_contrary_opinions: true,
                    steps_taken: *steps_taken,
                },
            ),
            DetectionMetadata::Scarcity {
                token_fraction,
                step_fraction,
                ..
            } => (
                Directive::ForceSynthesis,
                ActionMetadata::Scarcity {
                    token_fraction: *token_fraction,
                    step_fraction: *step_fraction,
                    caveat: SCARCITY_CAVEAT.to_string(),
                },
            ),
            DetectionMetadata::Novelty { fact, .. } => (
                Directive::AcknowledgeContradiction,
                ActionMetadata::Novelty {
                    fact: fact.clone(),
                    rerank_sources: true,
                    flag_contradiction: true,
                },
            ),
            DetectionMetadata::None => {
                return Err(MonitorError::InvalidDetection {
                    detector: detection.state,
                    state: CriticalState::None,
                    confidence: detection.confidence,
                })
            }
        };

        Ok(ProtocolAction {
            state: detection.state,
            directive,
            reasoning: protocol_reasoning(directive, detection),
            metadata,
        })
    }
}

fn protocol_reasoning(directive: Directive, detection: &StateDetection) -> String {
    let instruction = match directive {
        Directive::ForceDifferentAction => "choose an action not taken in the loop",
        Directive::ForceSynthesis => "stop gathering and synthesize an answer now",
        Directive::ForceSkepticism => "verify against additional and contrary sources",
        Directive::UseWhitelistedSources => "restrict research to trusted sources",
        Directive::AcknowledgeContradiction => "acknowledge the contradiction and re-rank sources",
    };
    format!("{}: {}", detection.reasoning, instruction)
}
