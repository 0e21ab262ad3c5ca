//! Integration tests for the action history
//!
//! These tests verify step validation, resource totals and the loop-shape
//! queries used by the DEADLOCK detector.

use sdk::{MonitorError, StepRecord};
use vigil_engine::history::{ActionHistory, ActionSignature, ResourceUsage};

fn history_of(actions: &[&str]) -> ActionHistory {
    let mut history = ActionHistory::new("s");
    for (i, action) in actions.iter().enumerate() {
        history
            .record(StepRecord::new("s", i as u64 + 1, *action))
            .unwrap();
    }
    history
}

#[test]
fn test_first_step_fixes_base_index() {
    let mut history = ActionHistory::new("s");
    history.record(StepRecord::new("s", 7, "search")).unwrap();
    assert_eq!(history.next_step_index(), Some(8));

    let err = history.record(StepRecord::new("s", 7, "search")).unwrap_err();
    assert!(matches!(
        err,
        MonitorError::NonMonotonicStep {
            expected: 8,
            found: 7,
            ..
        }
    ));

    let err = history.record(StepRecord::new("s", 10, "search")).unwrap_err();
    assert!(matches!(err, MonitorError::NonMonotonicStep { found: 10, .. }));
    assert_eq!(history.len(), 1);
}

#[test]
fn test_rejected_steps_leave_history_untouched() {
    let mut history = ActionHistory::new("s");
    history
        .record(StepRecord::new("s", 1, "search").with_tokens(40))
        .unwrap();

    let bad = [
        StepRecord::new("other", 2, "search"),
        StepRecord::new("", 2, "search"),
        StepRecord::new("s", 2, "  "),
        StepRecord::new("s", 2, "search").with_confidence(-0.1),
        StepRecord::new("s", 2, "search").with_confidence(f64::NAN),
    ];
    for step in bad {
        assert!(history.record(step.with_tokens(500)).is_err());
    }

    assert_eq!(history.len(), 1);
    assert_eq!(
        history.resource_usage(),
        ResourceUsage {
            steps_taken: 1,
            tokens_used: 40,
        }
    );
}

#[test]
fn test_session_mismatch_names_both_sessions() {
    let mut history = ActionHistory::new("alpha");
    let err = history
        .record(StepRecord::new("beta", 1, "search"))
        .unwrap_err();

    match err {
        MonitorError::SessionMismatch { expected, found } => {
            assert_eq!(expected, "alpha");
            assert_eq!(found, "beta");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_resource_totals_accumulate() {
    let mut history = ActionHistory::new("s");
    for (i, tokens) in [100u64, 150, 150].iter().enumerate() {
        history
            .record(StepRecord::new("s", i as u64 + 1, "read").with_tokens(*tokens))
            .unwrap();
    }

    let usage = history.resource_usage();
    assert_eq!(usage.steps_taken, 3);
    assert_eq!(usage.tokens_used, 400);
}

#[test]
fn test_signature_ignores_argument_order() {
    let a = StepRecord::new("s", 1, "search")
        .with_arg("q", "rust")
        .with_arg("limit", 5);
    let b = StepRecord::new("s", 2, "search")
        .with_arg("limit", 5)
        .with_arg("q", "rust");
    let c = StepRecord::new("s", 3, "search").with_arg("q", "go");

    assert_eq!(ActionSignature::of(&a), ActionSignature::of(&b));
    assert_ne!(ActionSignature::of(&a), ActionSignature::of(&c));
}

#[test]
fn test_exact_repeat_detection() {
    assert!(!history_of(&["a", "a"]).detect_exact_repeat(3));
    assert!(history_of(&["a", "a", "a"]).detect_exact_repeat(3));
    assert!(history_of(&["b", "a", "a", "a"]).detect_exact_repeat(3));
    assert!(!history_of(&["a", "a", "b", "a"]).detect_exact_repeat(3));
    assert!(!history_of(&["a"]).detect_exact_repeat(1));

    assert_eq!(history_of(&["b", "a", "a", "a", "a"]).trailing_repeat_len(), 4);
    assert_eq!(ActionHistory::new("s").trailing_repeat_len(), 0);
}

#[test]
fn test_two_cycle_detection() {
    let history = history_of(&["x", "a", "b", "a", "b"]);
    assert!(history.detect_cycle(2, 4));
    assert_eq!(history.trailing_cycle_len(2), 4);

    assert!(!history_of(&["a", "b", "a"]).detect_cycle(2, 4));
    assert!(!history_of(&["a", "b", "b", "a"]).detect_cycle(2, 4));
    // A run of one action is an exact repeat, not a cycle
    assert!(!history_of(&["a", "a", "a", "a"]).detect_cycle(2, 4));
}

#[test]
fn test_three_cycle_detection() {
    let history = history_of(&["a", "b", "c", "a", "b", "c"]);
    assert!(history.detect_cycle(3, 6));
    assert!(!history.detect_cycle(2, 4));

    assert!(!history_of(&["a", "b", "c", "a", "b"]).detect_cycle(3, 6));
    assert!(!history_of(&["a", "b", "c", "a", "c", "b"]).detect_cycle(3, 6));
}

#[test]
fn test_cycle_window_must_span_two_periods() {
    let history = history_of(&["a", "b", "a", "b"]);
    assert!(!history.detect_cycle(2, 3));
    assert!(!history.detect_cycle(1, 4));
}

#[test]
fn test_recent_actions_are_oldest_first() {
    let history = history_of(&["a", "b", "c", "d"]);
    let recent = history.recent_actions(2);

    assert_eq!(recent.len(), 2);
    assert!(recent[0].starts_with("c("));
    assert!(recent[1].starts_with("d("));
    assert_eq!(history.recent_actions(10).len(), 4);
}
