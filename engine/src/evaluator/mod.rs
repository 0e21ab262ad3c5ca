//! Critical state evaluation
//!
//! Five independent detectors, one per critical state. Each detector is a
//! pure function of the current step, the session's [`ActionHistory`] and its
//! [`Budgets`]; no detector ever sees another detector's output. The
//! evaluator runs all of them on every step and checks each detection
//! against the detector contract before handing it on:
//!
//! - the detection's state is the detector's own state or NONE
//! - its metadata variant matches its state
//! - its confidence is finite and within [0, 1]
//!
//! A detector that errors or breaks the contract fails the whole evaluation.
//! Nothing is clamped or downgraded to "no detection".

pub mod detectors;
pub mod lexicon;

use crate::config::DetectorsConfig;
use crate::history::{ActionHistory, ResourceUsage};
use sdk::{Budgets, CriticalState, MonitorError, StateDetection, StepRecord};
use std::sync::Arc;
use tracing::debug;

pub use detectors::{
    DeadlockDetector, HubrisDetector, NoveltyDetector, PanicDetector, ScarcityDetector,
};
pub use lexicon::{HedgingLexicon, TextAnalysis};

/// Inputs shared by every detector for one step
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// The step being evaluated (already recorded in `history`)
    pub step: &'a StepRecord,
    pub history: &'a ActionHistory,
    pub budgets: &'a Budgets,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(step: &'a StepRecord, history: &'a ActionHistory, budgets: &'a Budgets) -> Self {
        Self {
            step,
            history,
            budgets,
        }
    }

    pub fn usage(&self) -> ResourceUsage {
        self.history.resource_usage()
    }
}

/// A single critical state detector
pub trait Detector: Send + Sync {
    /// The state this detector reports
    fn state(&self) -> CriticalState;

    /// Inspect one step
    ///
    /// Returns `StateDetection::none` when the state is absent.
    fn detect(&self, ctx: &EvaluationContext<'_>) -> Result<StateDetection, MonitorError>;
}

/// Detections of one step, keyed by the detector that produced them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detections {
    entries: Vec<(CriticalState, StateDetection)>,
}

impl Detections {
    /// Detection produced by the detector for `state`
    pub fn get(&self, state: CriticalState) -> Option<&StateDetection> {
        self.entries
            .iter()
            .find(|(s, _)| *s == state)
            .map(|(_, d)| d)
    }

    /// Every detection that is not NONE, in evaluation order
    pub fn detected(&self) -> impl Iterator<Item = &StateDetection> {
        self.entries
            .iter()
            .map(|(_, d)| d)
            .filter(|d| d.is_detected())
    }

    pub fn iter(&self) -> impl Iterator<Item = (CriticalState, &StateDetection)> {
        self.entries.iter().map(|(s, d)| (*s, d))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, state: CriticalState, detection: StateDetection) {
        self.entries.push((state, detection));
    }
}

impl FromIterator<(CriticalState, StateDetection)> for Detections {
    fn from_iter<I: IntoIterator<Item = (CriticalState, StateDetection)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Runs a fixed set of detectors and validates their output
#[derive(Clone)]
pub struct CriticalStateEvaluator {
    detectors: Vec<Arc<dyn Detector>>,
}

impl CriticalStateEvaluator {
    pub fn new(detectors: Vec<Arc<dyn Detector>>) -> Self {
        Self { detectors }
    }

    /// The five standard detectors configured from `config`
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Config` if the PANIC lexicon does not compile.
    pub fn standard(config: &DetectorsConfig) -> Result<Self, MonitorError> {
        Ok(Self::new(vec![
            Arc::new(DeadlockDetector::new(&config.deadlock)),
            Arc::new(PanicDetector::new(&config.panic)?),
            Arc::new(HubrisDetector::new(&config.hubris)),
            Arc::new(ScarcityDetector::new(&config.scarcity)),
            Arc::new(NoveltyDetector::new(&config.novelty)),
        ]))
    }

    pub fn detectors(&self) -> &[Arc<dyn Detector>] {
        &self.detectors
    }

    /// Detector registered for `state`, if any
    pub fn detector(&self, state: CriticalState) -> Option<Arc<dyn Detector>> {
        self.detectors
            .iter()
            .find(|d| d.state() == state)
            .map(Arc::clone)
    }

    /// Run every detector on one step
    ///
    /// # Errors
    ///
    /// Propagates the first detector failure or contract violation.
    pub fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<Detections, MonitorError> {
        let mut detections = Detections::default();

        for detector in &self.detectors {
            let detection = Self::run(detector.as_ref(), ctx)?;
            detections.push(detector.state(), detection);
        }

        Ok(detections)
    }

    /// Run one detector and check its output against the detector contract
    pub fn run(
        detector: &dyn Detector,
        ctx: &EvaluationContext<'_>,
    ) -> Result<StateDetection, MonitorError> {
        let owner = detector.state();
        let detection = detector.detect(ctx)?;

        let state_ok = detection.state == owner || detection.state.is_none();
        let metadata_ok = detection.metadata.state() == detection.state;
        let confidence_ok =
            detection.confidence.is_finite() && (0.0..=1.0).contains(&detection.confidence);

        if !(state_ok && metadata_ok && confidence_ok) {
            return Err(MonitorError::InvalidDetection {
                detector: owner,
                state: detection.state,
                confidence: detection.confidence,
            });
        }

        debug!(
            "{} detector on step {}: {}",
            owner,
            ctx.step.step_index(),
            detection
        );

        Ok(detection)
    }
}
