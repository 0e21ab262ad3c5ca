//! The five critical state detectors

use super::lexicon::HedgingLexicon;
use super::{Detector, EvaluationContext};
use crate::config::{DeadlockConfig, HubrisConfig, NoveltyConfig, PanicConfig, ScarcityConfig};
use sdk::{CriticalState, DetectionMetadata, LoopPattern, MonitorError, StateDetection};

/// DEADLOCK: the agent is stuck in an action loop
///
/// Rules are tried in order: exact repeat, 2-cycle, 3-cycle. Confidence is
/// the base confidence scaled by how far the loop overruns its window,
/// capped at 1.
#[derive(Debug, Clone)]
pub struct DeadlockDetector {
    repeat_window: usize,
    cycle_window: usize,
    triple_cycle_window: usize,
    base_confidence: f64,
}

impl DeadlockDetector {
    pub fn new(config: &DeadlockConfig) -> Self {
        Self {
            repeat_window: config.repeat_window,
            cycle_window: config.cycle_window,
            triple_cycle_window: config.triple_cycle_window,
            base_confidence: config.base_confidence,
        }
    }

    fn matched_loop(&self, ctx: &EvaluationContext<'_>) -> Option<(LoopPattern, usize, usize)> {
        let history = ctx.history;

        if history.detect_exact_repeat(self.repeat_window) {
            return Some((
                LoopPattern::ExactRepeat,
                history.trailing_repeat_len(),
                self.repeat_window,
            ));
        }

        for (period, window) in [(2, self.cycle_window), (3, self.triple_cycle_window)] {
            if history.detect_cycle(period, window) {
                return Some((
                    LoopPattern::Cycle { period },
                    history.trailing_cycle_len(period),
                    window,
                ));
            }
        }

        None
    }
}

impl Detector for DeadlockDetector {
    fn state(&self) -> CriticalState {
        CriticalState::Deadlock
    }

    fn detect(&self, ctx: &EvaluationContext<'_>) -> Result<StateDetection, MonitorError> {
        let Some((pattern, repeat_count, window)) = self.matched_loop(ctx) else {
            return Ok(StateDetection::none("no action loop"));
        };

        let confidence =
            (self.base_confidence * repeat_count as f64 / window as f64).clamp(0.0, 1.0);
        // The whole trailing loop, not just the detection window
        let sequence = ctx.history.recent_actions(repeat_count);
        let reasoning = format!(
            "{} over the last {} steps ({})",
            pattern,
            repeat_count,
            sequence.join(" -> ")
        );

        Ok(StateDetection::detected(
            DetectionMetadata::Deadlock {
                pattern,
                repeat_count,
                sequence,
            },
            confidence,
            reasoning,
        ))
    }
}

/// PANIC: the agent is confused
///
/// Fires when the rationale's hedging density exceeds its threshold or the
/// confidence hint falls below the panic threshold. The reported confidence
/// uses the lower of the hint and the text estimate, so hedging language is
/// not masked by an optimistic hint.
#[derive(Debug, Clone)]
pub struct PanicDetector {
    lexicon: HedgingLexicon,
    confidence_threshold: f64,
    hedging_density: f64,
}

impl PanicDetector {
    pub fn new(config: &PanicConfig) -> Result<Self, MonitorError> {
        Ok(Self {
            lexicon: HedgingLexicon::new(&config.hedging_markers, &config.confidence_markers)?,
            confidence_threshold: config.confidence_threshold,
            hedging_density: config.hedging_density,
        })
    }
}

impl Detector for PanicDetector {
    fn state(&self) -> CriticalState {
        CriticalState::Panic
    }

    fn detect(&self, ctx: &EvaluationContext<'_>) -> Result<StateDetection, MonitorError> {
        let hint = ctx.step.confidence_hint();
        let analysis = self.lexicon.analyze(ctx.step.rationale());

        let hedging = analysis.hedging_density > self.hedging_density;
        let low_hint = hint < self.confidence_threshold;
        if !hedging && !low_hint {
            return Ok(StateDetection::none("confidence within normal range"));
        }

        let reasoning = match (hedging, low_hint) {
            (true, true) => format!(
                "hedging rationale ({:.0}% markers) and low confidence hint ({:.2})",
                analysis.hedging_density * 100.0,
                hint
            ),
            (true, false) => format!(
                "hedging rationale ({:.0}% markers: {})",
                analysis.hedging_density * 100.0,
                analysis.hedging_markers.join(", ")
            ),
            _ => format!("low confidence hint ({:.2})", hint),
        };

        let confidence = (1.0 - hint.min(analysis.text_confidence)).clamp(0.0, 1.0);

        Ok(StateDetection::detected(
            DetectionMetadata::Panic {
                confidence_hint: hint,
                text_confidence: analysis.text_confidence,
                hedging_markers: analysis.hedging_markers,
                hedging_density: analysis.hedging_density,
            },
            confidence,
            reasoning,
        ))
    }
}

/// HUBRIS: high confidence after too little research
///
/// Step count is the only signal separating overconfidence from a genuinely
/// easy task, so quick correct answers are reported too.
#[derive(Debug, Clone)]
pub struct HubrisDetector {
    confidence_threshold: f64,
    min_steps: u64,
}

impl HubrisDetector {
    pub fn new(config: &HubrisConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            min_steps: config.min_steps,
        }
    }
}

impl Detector for HubrisDetector {
    fn state(&self) -> CriticalState {
        CriticalState::Hubris
    }

    fn detect(&self, ctx: &EvaluationContext<'_>) -> Result<StateDetection, MonitorError> {
        let hint = ctx.step.confidence_hint();
        let steps_taken = ctx.usage().steps_taken;

        if hint <= self.confidence_threshold || steps_taken >= self.min_steps {
            return Ok(StateDetection::none("confidence matches research depth"));
        }

        Ok(StateDetection::detected(
            DetectionMetadata::Hubris {
                confidence_hint: hint,
                steps_taken,
                min_steps: self.min_steps,
            },
            hint,
            format!(
                "confidence {:.2} after only {} of {} steps",
                hint, steps_taken, self.min_steps
            ),
        ))
    }
}

/// SCARCITY: the session is running out of tokens or steps
#[derive(Debug, Clone)]
pub struct ScarcityDetector {
    fraction: f64,
}

impl ScarcityDetector {
    pub fn new(config: &ScarcityConfig) -> Self {
        Self {
            fraction: config.fraction,
        }
    }
}

impl Detector for ScarcityDetector {
    fn state(&self) -> CriticalState {
        CriticalState::Scarcity
    }

    fn detect(&self, ctx: &EvaluationContext<'_>) -> Result<StateDetection, MonitorError> {
        let budgets = ctx.budgets;
        if budgets.max_steps == 0 || budgets.token_budget == 0 {
            return Err(MonitorError::Detector {
                state: CriticalState::Scarcity,
                reason: format!("cannot compute fractions of empty budgets ({})", budgets),
            });
        }

        let usage = ctx.usage();
        let token_fraction = usage.tokens_used as f64 / budgets.token_budget as f64;
        let step_fraction = usage.steps_taken as f64 / budgets.max_steps as f64;

        if token_fraction < self.fraction && step_fraction < self.fraction {
            return Ok(StateDetection::none("resources available"));
        }

        Ok(StateDetection::detected(
            DetectionMetadata::Scarcity {
                token_fraction,
                step_fraction,
                tokens_used: usage.tokens_used,
                steps_taken: usage.steps_taken,
            },
            token_fraction.max(step_fraction).min(1.0),
            format!(
                "{:.0}% of tokens and {:.0}% of steps used",
                token_fraction * 100.0,
                step_fraction * 100.0
            ),
        ))
    }
}

/// NOVELTY: the step surfaced contradictory information
///
/// Contradictions are computed by the agent loop; this detector only reacts
/// to the flag carried by the step.
#[derive(Debug, Clone)]
pub struct NoveltyDetector {
    confidence: f64,
}

impl NoveltyDetector {
    pub fn new(config: &NoveltyConfig) -> Self {
        Self {
            confidence: config.confidence,
        }
    }
}

impl Detector for NoveltyDetector {
    fn state(&self) -> CriticalState {
        CriticalState::Novelty
    }

    fn detect(&self, ctx: &EvaluationContext<'_>) -> Result<StateDetection, MonitorError> {
        let Some(contradiction) = ctx.step.contradiction() else {
            return Ok(StateDetection::none("no contradiction flagged"));
        };

        Ok(StateDetection::detected(
            DetectionMetadata::Novelty {
                fact: contradiction.fact.clone(),
                observations: contradiction.observations.clone(),
            },
            self.confidence,
            format!("contradictory observations about '{}'", contradiction.fact),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorsConfig;
    use crate::history::ActionHistory;
    use sdk::{Budgets, Contradiction, StepRecord};

    /// Record `steps` and run `detector` on the last one
    fn detect_last(detector: &dyn Detector, steps: Vec<StepRecord>, budgets: Budgets) -> StateDetection {
        let mut history = ActionHistory::new("s1");
        for step in &steps {
            history.record(step.clone()).unwrap();
        }
        let last = steps.last().unwrap();
        detector
            .detect(&EvaluationContext::new(last, &history, &budgets))
            .unwrap()
    }

    fn search(index: u64, q: &str) -> StepRecord {
        StepRecord::new("s1", index, "search").with_arg("q", q)
    }

    #[test]
    fn test_deadlock_exact_repeat() {
        let detector = DeadlockDetector::new(&DetectorsConfig::default().deadlock);
        let detection = detect_last(
            &detector,
            vec![search(1, "x"), search(2, "x"), search(3, "x")],
            Budgets::default(),
        );

        assert_eq!(detection.state, CriticalState::Deadlock);
        assert!((detection.confidence - 0.9).abs() < 1e-9);
        match detection.metadata {
            DetectionMetadata::Deadlock {
                pattern,
                repeat_count,
                sequence,
            } => {
                assert_eq!(pattern, LoopPattern::ExactRepeat);
                assert_eq!(repeat_count, 3);
                assert_eq!(sequence.len(), 3);
            }
            other => panic!("unexpected metadata {:?}", other),
        }
    }

    #[test]
    fn test_deadlock_sequence_covers_whole_repeat() {
        let detector = DeadlockDetector::new(&DetectorsConfig::default().deadlock);
        let steps = vec![
            search(1, "y"),
            search(2, "x"),
            search(3, "x"),
            search(4, "x"),
            search(5, "x"),
        ];
        let detection = detect_last(&detector, steps, Budgets::default());

        assert!(detection.reasoning.contains("over the last 4 steps"));
        match detection.metadata {
            DetectionMetadata::Deadlock {
                repeat_count,
                sequence,
                ..
            } => {
                assert_eq!(repeat_count, 4);
                assert_eq!(sequence.len(), 4);
            }
            other => panic!("unexpected metadata {:?}", other),
        }
    }

    #[test]
    fn test_deadlock_confidence_grows_and_caps() {
        let detector = DeadlockDetector::new(&DetectorsConfig::default().deadlock);
        let steps: Vec<_> = (1..=6).map(|i| search(i, "x")).collect();
        let detection = detect_last(&detector, steps, Budgets::default());
        assert_eq!(detection.confidence, 1.0);
    }

    #[test]
    fn test_deadlock_two_cycle() {
        let detector = DeadlockDetector::new(&DetectorsConfig::default().deadlock);
        let detection = detect_last(
            &detector,
            vec![search(1, "a"), search(2, "b"), search(3, "a"), search(4, "b")],
            Budgets::default(),
        );

        assert!(matches!(
            detection.metadata,
            DetectionMetadata::Deadlock {
                pattern: LoopPattern::Cycle { period: 2 },
                ..
            }
        ));
    }

    #[test]
    fn test_deadlock_three_cycle() {
        let detector = DeadlockDetector::new(&DetectorsConfig::default().deadlock);
        let steps = ["a", "b", "c", "a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, q)| search(i as u64 + 1, q))
            .collect();
        let detection = detect_last(&detector, steps, Budgets::default());

        assert!(matches!(
            detection.metadata,
            DetectionMetadata::Deadlock {
                pattern: LoopPattern::Cycle { period: 3 },
                ..
            }
        ));
    }

    #[test]
    fn test_deadlock_none_for_distinct_steps() {
        let detector = DeadlockDetector::new(&DetectorsConfig::default().deadlock);
        let detection = detect_last(
            &detector,
            vec![search(1, "a"), search(2, "b"), search(3, "c")],
            Budgets::default(),
        );
        assert!(!detection.is_detected());
        assert_eq!(detection.confidence, 0.0);
    }

    #[test]
    fn test_panic_low_hint() {
        let detector = PanicDetector::new(&PanicConfig::default()).unwrap();
        let detection = detect_last(
            &detector,
            vec![search(1, "x").with_confidence(0.2)],
            Budgets::default(),
        );

        assert_eq!(detection.state, CriticalState::Panic);
        assert!((detection.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_panic_hedging_rationale_with_high_hint() {
        let detector = PanicDetector::new(&PanicConfig::default()).unwrap();
        let detection = detect_last(
            &detector,
            vec![search(1, "x")
                .with_confidence(0.8)
                .with_rationale("maybe this, possibly that, I think")],
            Budgets::default(),
        );

        assert_eq!(detection.state, CriticalState::Panic);
        // text confidence 0.7 - 3 * 0.15 = 0.25
        assert!((detection.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_panic_quiet_for_plain_rationale() {
        let detector = PanicDetector::new(&PanicConfig::default()).unwrap();
        let detection = detect_last(
            &detector,
            vec![search(1, "x")
                .with_confidence(0.6)
                .with_rationale("Reading the release notes for version 2")],
            Budgets::default(),
        );
        assert!(!detection.is_detected());
    }

    #[test]
    fn test_hubris_early_high_confidence() {
        let detector = HubrisDetector::new(&HubrisConfig::default());
        let detection = detect_last(
            &detector,
            vec![search(1, "x").with_confidence(0.95)],
            Budgets::default(),
        );

        assert_eq!(detection.state, CriticalState::Hubris);
        assert_eq!(detection.confidence, 0.95);
    }

    #[test]
    fn test_hubris_quiet_after_min_steps() {
        let detector = HubrisDetector::new(&HubrisConfig::default());
        let detection = detect_last(
            &detector,
            vec![
                search(1, "a"),
                search(2, "b"),
                search(3, "c").with_confidence(0.95),
            ],
            Budgets::default(),
        );
        assert!(!detection.is_detected());
    }

    #[test]
    fn test_scarcity_tokens() {
        let detector = ScarcityDetector::new(&ScarcityConfig::default());
        let detection = detect_last(
            &detector,
            vec![search(1, "a").with_tokens(500), search(2, "b").with_tokens(350)],
            Budgets::new(10, 1000),
        );

        assert_eq!(detection.state, CriticalState::Scarcity);
        assert!((detection.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_scarcity_steps() {
        let detector = ScarcityDetector::new(&ScarcityConfig::default());
        let steps = (1..=4).map(|i| search(i, &i.to_string())).collect();
        let detection = detect_last(&detector, steps, Budgets::new(5, 1000));

        assert_eq!(detection.state, CriticalState::Scarcity);
        assert!((detection.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_scarcity_rejects_empty_budgets() {
        let detector = ScarcityDetector::new(&ScarcityConfig::default());
        let mut history = ActionHistory::new("s1");
        let step = search(1, "a");
        history.record(step.clone()).unwrap();
        let budgets = Budgets::new(0, 0);

        let result = detector.detect(&EvaluationContext::new(&step, &history, &budgets));
        assert!(matches!(result, Err(MonitorError::Detector { .. })));
    }

    #[test]
    fn test_novelty_flag() {
        let detector = NoveltyDetector::new(&NoveltyConfig::default());
        let detection = detect_last(
            &detector,
            vec![search(1, "x").with_contradiction(
                Contradiction::new("release year")
                    .with_observation("2019")
                    .with_observation("2021"),
            )],
            Budgets::default(),
        );

        assert_eq!(detection.state, CriticalState::Novelty);
        assert_eq!(detection.confidence, 0.8);
    }

    #[test]
    fn test_novelty_quiet_without_flag() {
        let detector = NoveltyDetector::new(&NoveltyConfig::default());
        let detection = detect_last(&detector, vec![search(1, "x")], Budgets::default());
        assert!(!detection.is_detected());
    }
}
