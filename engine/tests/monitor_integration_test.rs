//! Integration tests for the Monitor
//!
//! These tests verify priority resolution, activation thresholds and the
//! DEADLOCK escalation policy across a whole step stream.

use std::sync::Arc;

use sdk::{
    Budgets, CriticalState, DetectionMetadata, Directive, LoopPattern, MonitorError,
    StateDetection, StepRecord,
};
use vigil_engine::config::Config;
use vigil_engine::evaluator::{CriticalStateEvaluator, Detector, EvaluationContext};
use vigil_engine::history::ActionHistory;
use vigil_engine::monitor::{Monitor, Resolution, PRIORITY};

/// Detector that always reports its state with a fixed confidence
struct Always(CriticalState, f64);

impl Detector for Always {
    fn state(&self) -> CriticalState {
        self.0
    }

    fn detect(&self, _ctx: &EvaluationContext<'_>) -> Result<StateDetection, MonitorError> {
        let metadata = match self.0 {
            CriticalState::Deadlock => DetectionMetadata::Deadlock {
                pattern: LoopPattern::ExactRepeat,
                repeat_count: 3,
                sequence: vec![],
            },
            CriticalState::Panic => DetectionMetadata::Panic {
                confidence_hint: 0.1,
                text_confidence: 0.7,
                hedging_markers: vec![],
                hedging_density: 0.0,
            },
            CriticalState::Hubris => DetectionMetadata::Hubris {
                confidence_hint: 0.95,
                steps_taken: 1,
                min_steps: 3,
            },
            CriticalState::Scarcity => DetectionMetadata::Scarcity {
                token_fraction: 0.9,
                step_fraction: 0.1,
                tokens_used: 900,
                steps_taken: 1,
            },
            CriticalState::Novelty => DetectionMetadata::Novelty {
                fact: "f".to_string(),
                observations: vec![],
            },
            CriticalState::None => return Ok(StateDetection::none("never")),
        };
        Ok(StateDetection::detected(metadata, self.1, "forced"))
    }
}

fn monitor_with(confidences: &[(CriticalState, f64)]) -> Monitor {
    let detectors: Vec<Arc<dyn Detector>> = PRIORITY
        .iter()
        .map(|&state| {
            let confidence = confidences
                .iter()
                .find(|(s, _)| *s == state)
                .map(|(_, c)| *c)
                .unwrap_or(0.0);
            Arc::new(Always(state, confidence)) as Arc<dyn Detector>
        })
        .collect();

    Monitor::with_evaluator(CriticalStateEvaluator::new(detectors), &Config::default()).unwrap()
}

fn step_once(monitor: &mut Monitor) -> Resolution {
    let mut history = ActionHistory::new("s");
    let step = StepRecord::new("s", 1, "search");
    history.record(step.clone()).unwrap();
    monitor
        .step(&EvaluationContext::new(&step, &history, &Budgets::default()))
        .unwrap()
}

#[test]
fn test_priority_beats_confidence() {
    // PANIC is more confident but DEADLOCK ranks higher
    let mut monitor = monitor_with(&[
        (CriticalState::Deadlock, 0.6),
        (CriticalState::Panic, 1.0),
    ]);
    assert_eq!(step_once(&mut monitor).state, CriticalState::Deadlock);
}

#[test]
fn test_full_priority_chain() {
    let all = [
        (CriticalState::Deadlock, 0.9),
        (CriticalState::Panic, 0.9),
        (CriticalState::Scarcity, 0.9),
        (CriticalState::Hubris, 0.9),
        (CriticalState::Novelty, 0.9),
    ];

    // Drop the winner each round; the next state in priority order must win
    for (i, expected) in PRIORITY.iter().enumerate() {
        let mut monitor = monitor_with(&all[i..]);
        assert_eq!(step_once(&mut monitor).state, *expected);
    }

    let mut monitor = monitor_with(&[]);
    let resolution = step_once(&mut monitor);
    assert_eq!(resolution.state, CriticalState::None);
    assert!(resolution.action.is_none());
}

#[test]
fn test_threshold_is_exclusive() {
    // Confidence equal to the activation threshold does not qualify
    let mut monitor = monitor_with(&[
        (CriticalState::Deadlock, 0.5),
        (CriticalState::Novelty, 0.51),
    ]);
    let resolution = step_once(&mut monitor);
    assert_eq!(resolution.state, CriticalState::Novelty);
    assert!(resolution
        .detections
        .get(CriticalState::Deadlock)
        .unwrap()
        .is_detected());
}

#[test]
fn test_directive_table() {
    let cases = [
        (CriticalState::Deadlock, Directive::ForceDifferentAction),
        (CriticalState::Panic, Directive::UseWhitelistedSources),
        (CriticalState::Scarcity, Directive::ForceSynthesis),
        (CriticalState::Hubris, Directive::ForceSkepticism),
        (CriticalState::Novelty, Directive::AcknowledgeContradiction),
    ];

    for (state, directive) in cases {
        let mut monitor = monitor_with(&[(state, 0.9)]);
        let action = step_once(&mut monitor).action.unwrap();
        assert_eq!(action.state, state);
        assert_eq!(action.directive, directive);
    }
}

#[test]
fn test_escalation_never_decreases() {
    let mut monitor = monitor_with(&[(CriticalState::Deadlock, 0.9)]);

    let severities: Vec<u8> = (0..8)
        .map(|_| step_once(&mut monitor).action.unwrap().directive.severity())
        .collect();

    assert!(severities.windows(2).all(|w| w[1] >= w[0]));
    assert_eq!(severities[1], Directive::ForceDifferentAction.severity());
    assert_eq!(severities[2], Directive::ForceSynthesis.severity());
    assert_eq!(monitor.deadlock_activations(), 8);
}

#[test]
fn test_custom_synthesis_after() {
    let mut config = Config::default();
    config.detectors.deadlock.synthesis_after = 1;
    let mut monitor = Monitor::new(&config).unwrap();

    let mut history = ActionHistory::new("s");
    let budgets = Budgets::new(100, 10_000);
    let mut last = None;
    for i in 1..=3 {
        let step = StepRecord::new("s", i, "search").with_arg("q", "x");
        history.record(step.clone()).unwrap();
        last = monitor
            .step(&EvaluationContext::new(&step, &history, &budgets))
            .unwrap()
            .action;
    }

    assert_eq!(last.unwrap().directive, Directive::ForceSynthesis);
}

#[test]
fn test_missing_detector_is_config_error() {
    let evaluator = CriticalStateEvaluator::new(vec![Arc::new(Always(CriticalState::Panic, 0.9))]);
    let result = Monitor::with_evaluator(evaluator, &Config::default());
    assert!(matches!(result, Err(MonitorError::Config(_))));
}

#[test]
fn test_rules_evaluate_in_priority_order() {
    let detectors: Vec<Arc<dyn Detector>> = PRIORITY
        .iter()
        .rev()
        .map(|&state| Arc::new(Always(state, 0.9)) as Arc<dyn Detector>)
        .collect();
    let mut monitor =
        Monitor::with_evaluator(CriticalStateEvaluator::new(detectors), &Config::default())
            .unwrap();

    let resolution = step_once(&mut monitor);
    let order: Vec<CriticalState> = resolution.detections.iter().map(|(s, _)| s).collect();
    assert_eq!(order, PRIORITY.to_vec());
    assert_eq!(resolution.state, CriticalState::Deadlock);
}
