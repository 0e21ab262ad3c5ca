use proptest::prelude::*;
use sdk::errors::{MonitorError, VigilErrorExt};
use sdk::{CriticalState, StepRecord};

// Every error carries a static, non-empty hint that never echoes caller input.
proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "\\PC*", index in any::<u64>()) {
        let errs = vec![
            MonitorError::Config(error_str.clone()),
            MonitorError::UnknownSession(error_str.clone()),
            MonitorError::SessionExists(error_str.clone()),
            MonitorError::InvalidBudgets(error_str.clone()),
            MonitorError::EmptyActionName(index),
            MonitorError::SessionMismatch { expected: error_str.clone(), found: "other".to_string() },
            MonitorError::Detector { state: CriticalState::Panic, reason: error_str.clone() },
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            if error_str.len() > 8 {
                prop_assert!(!hint.contains(&error_str));
            }
        }
    }
}

// Step records survive the JSON trace format unchanged.
proptest! {
    #[test]
    fn test_step_record_json_round_trip(
        session in "[a-z0-9-]{1,16}",
        index in 0..10_000u64,
        action in "[a-z_]{1,12}",
        query in "\\PC{0,24}",
        confidence_pct in 0..=100u32,
        tokens in 0..100_000u64,
    ) {
        let step = StepRecord::new(session, index, action)
            .with_arg("q", query)
            .with_confidence(f64::from(confidence_pct) / 100.0)
            .with_tokens(tokens);

        let json = serde_json::to_string(&step).expect("serialize step");
        let parsed: StepRecord = serde_json::from_str(&json).expect("deserialize step");

        prop_assert_eq!(parsed, step);
    }
}
