//! Integration tests for the CircuitBreaker
//!
//! These tests verify the thrashing and oscillation trip conditions and
//! the diagnostics attached to a HALT.

use sdk::{CriticalState, Directive, TripReason};
use vigil_engine::circuit_breaker::{CircuitBreaker, CircuitState};
use vigil_engine::config::CircuitBreakerConfig;

use CriticalState::{Deadlock, Hubris, Novelty, Panic, Scarcity};

const NONE: CriticalState = CriticalState::None;

fn observe_all(breaker: &mut CircuitBreaker, states: &[CriticalState]) -> Vec<CircuitState> {
    states.iter().map(|s| breaker.observe(*s, None)).collect()
}

#[test]
fn test_three_consecutive_interventions_trip() {
    for state in [Deadlock, Panic, Hubris, Scarcity, Novelty] {
        let mut breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
        let positions = observe_all(&mut breaker, &[state, state, state]);

        assert!(!positions[0].is_open());
        assert!(!positions[1].is_open());
        assert_eq!(
            positions[2],
            CircuitState::Open(TripReason::Thrashing { consecutive: 3 })
        );
    }
}

#[test]
fn test_mixed_consecutive_interventions_trip() {
    let mut breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
    observe_all(&mut breaker, &[Hubris, Novelty, Scarcity]);
    assert!(breaker.is_tripped());
}

#[test]
fn test_none_between_interventions_prevents_trip() {
    let mut breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
    observe_all(
        &mut breaker,
        &[Deadlock, Deadlock, NONE, Deadlock, Deadlock, NONE, Scarcity, Scarcity],
    );
    assert!(!breaker.is_tripped());
    assert_eq!(breaker.consecutive_interventions(), 2);
}

#[test]
fn test_oscillation_with_short_runs() {
    let mut breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
    let positions = observe_all(
        &mut breaker,
        &[Deadlock, NONE, Panic, NONE, Deadlock, NONE, Panic],
    );

    assert!(positions[..6].iter().all(|p| !p.is_open()));
    assert_eq!(
        positions[6],
        CircuitState::Open(TripReason::Oscillation {
            first: Deadlock,
            second: Panic,
        })
    );
}

#[test]
fn test_longer_oscillation_window() {
    let mut breaker = CircuitBreaker::new(CircuitBreakerConfig {
        oscillation_window: 6,
        ..CircuitBreakerConfig::default()
    });
    observe_all(
        &mut breaker,
        &[Deadlock, NONE, Panic, NONE, Deadlock, NONE, Panic],
    );
    assert!(!breaker.is_tripped());

    observe_all(&mut breaker, &[NONE, Deadlock, NONE, Panic]);
    assert!(breaker.is_tripped());
}

#[test]
fn test_higher_consecutive_limit() {
    let mut breaker = CircuitBreaker::new(CircuitBreakerConfig {
        consecutive_limit: 5,
        ..CircuitBreakerConfig::default()
    });
    observe_all(&mut breaker, &[Deadlock; 4]);
    assert!(!breaker.is_tripped());
    observe_all(&mut breaker, &[Deadlock]);
    assert!(breaker.is_tripped());
}

#[test]
fn test_total_limit_and_bounded_diagnostics() {
    let mut breaker = CircuitBreaker::new(CircuitBreakerConfig {
        consecutive_limit: 50,
        total_limit: Some(12),
        diagnostics_depth: 4,
        ..CircuitBreakerConfig::default()
    });

    for _ in 0..10 {
        breaker.observe(Scarcity, Some(Directive::ForceSynthesis));
        breaker.observe(NONE, None);
    }
    breaker.observe(Scarcity, Some(Directive::ForceSynthesis));
    assert!(!breaker.is_tripped());

    let position = breaker.observe(Hubris, Some(Directive::ForceSkepticism));
    assert_eq!(
        position,
        CircuitState::Open(TripReason::TotalLimit { total: 12 })
    );

    let diagnostics = breaker.diagnostics(vec!["a".to_string()]).unwrap();
    assert_eq!(
        diagnostics.recent_states,
        vec![Scarcity, Scarcity, Scarcity, Hubris]
    );
    assert_eq!(diagnostics.recent_directives.len(), 4);
    assert_eq!(diagnostics.state_frequency.get(&Scarcity), Some(&11));
    assert!(diagnostics
        .recommendations
        .iter()
        .any(|r| r.contains("SCARCITY")));
}

#[test]
fn test_state_is_terminal() {
    let mut breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
    observe_all(&mut breaker, &[Panic, Panic, Panic]);
    let tripped = breaker.state();

    observe_all(&mut breaker, &[NONE, NONE, Deadlock, NONE]);
    assert_eq!(breaker.state(), tripped);
}
