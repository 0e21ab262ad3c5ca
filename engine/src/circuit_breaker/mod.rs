//! Circuit breaker
//!
//! Watches the stream of resolved states of one session and halts the session
//! when the monitor's interventions stop working:
//!
//! - **Thrashing**: `consecutive_limit` interventions in a row. A NONE step
//!   resets the run.
//! - **Oscillation**: the last `oscillation_window` interventions alternate
//!   between two distinct states (A, B, A, B). Only interventions enter the
//!   window, so healthy steps in between do not hide the pattern.
//! - **Total limit** (optional): too many interventions over the session.
//!
//! Once open, the breaker stays open. There is no reset; a restarted session
//! gets a fresh breaker.

use crate::config::CircuitBreakerConfig;
use sdk::{CriticalState, Directive, HaltDiagnostics, TripReason};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, error};

/// Breaker position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Interventions are passed through
    Closed,
    /// Tripped; terminal for the session
    Open(TripReason),
}

impl CircuitState {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitState::Open(_))
    }
}

/// Per-session circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive: u32,
    total: u32,
    /// Last interventions, bounded by `oscillation_window`
    window: VecDeque<CriticalState>,
    /// Last interventions, bounded by `diagnostics_depth`
    recent_states: VecDeque<CriticalState>,
    recent_directives: VecDeque<Directive>,
    frequency: BTreeMap<CriticalState, u32>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            window: VecDeque::with_capacity(config.oscillation_window),
            recent_states: VecDeque::with_capacity(config.diagnostics_depth),
            recent_directives: VecDeque::with_capacity(config.diagnostics_depth),
            config,
            state: CircuitState::Closed,
            consecutive: 0,
            total: 0,
            frequency: BTreeMap::new(),
        }
    }

    /// Feed one resolved state (and the directive issued for it)
    ///
    /// Returns the breaker position after the observation. An open breaker
    /// ignores further observations.
    pub fn observe(&mut self, state: CriticalState, directive: Option<Directive>) -> CircuitState {
        if self.state.is_open() {
            return self.state;
        }

        if state.is_none() {
            if self.consecutive > 0 {
                debug!("Healthy step, consecutive interventions reset");
            }
            self.consecutive = 0;
            return self.state;
        }

        self.consecutive += 1;
        self.total += 1;
        *self.frequency.entry(state).or_insert(0) += 1;

        push_bounded(&mut self.window, state, self.config.oscillation_window);
        push_bounded(&mut self.recent_states, state, self.config.diagnostics_depth);
        if let Some(directive) = directive {
            push_bounded(
                &mut self.recent_directives,
                directive,
                self.config.diagnostics_depth,
            );
        }

        if let Some(reason) = self.trip_reason() {
            error!("Circuit breaker tripped: {}", reason);
            self.state = CircuitState::Open(reason);
        }

        self.state
    }

    fn trip_reason(&self) -> Option<TripReason> {
        if self.consecutive >= self.config.consecutive_limit {
            return Some(TripReason::Thrashing {
                consecutive: self.consecutive,
            });
        }

        if let Some((first, second)) = self.oscillation() {
            return Some(TripReason::Oscillation { first, second });
        }

        match self.config.total_limit {
            Some(limit) if self.total >= limit => Some(TripReason::TotalLimit { total: self.total }),
            _ => None,
        }
    }

    /// The two alternating states, if the full window is an A, B, A, B pattern
    fn oscillation(&self) -> Option<(CriticalState, CriticalState)> {
        if self.window.len() < self.config.oscillation_window || self.window.len() < 2 {
            return None;
        }

        let first = self.window[0];
        let second = self.window[1];
        if first == second {
            return None;
        }

        let alternating = self
            .window
            .iter()
            .enumerate()
            .all(|(i, s)| *s == if i % 2 == 0 { first } else { second });

        alternating.then_some((first, second))
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn is_tripped(&self) -> bool {
        self.state.is_open()
    }

    pub fn consecutive_interventions(&self) -> u32 {
        self.consecutive
    }

    pub fn total_interventions(&self) -> u32 {
        self.total
    }

    /// Tracked oscillation window, oldest first
    pub fn recent_window(&self) -> impl Iterator<Item = CriticalState> + '_ {
        self.window.iter().copied()
    }

    /// Diagnostics for a HALT; `None` while the breaker is closed
    ///
    /// `recent_actions` comes from the session history, which the breaker
    /// does not see.
    pub fn diagnostics(&self, recent_actions: Vec<String>) -> Option<HaltDiagnostics> {
        let CircuitState::Open(reason) = self.state else {
            return None;
        };

        Some(HaltDiagnostics {
            reason,
            recent_states: self.recent_states.iter().copied().collect(),
            recent_directives: self.recent_directives.iter().copied().collect(),
            recent_actions,
            state_frequency: self.frequency.clone(),
            pattern: self.pattern_summary(),
            recommendations: self.recommendations(&reason),
        })
    }

    pub fn diagnostics_depth(&self) -> usize {
        self.config.diagnostics_depth
    }

    /// Human-readable summary of the two most frequent states
    fn pattern_summary(&self) -> Option<String> {
        let mut counts: Vec<(CriticalState, u32)> =
            self.frequency.iter().map(|(s, c)| (*s, *c)).collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1));

        match counts.as_slice() {
            [] => None,
            [(state, count)] => Some(format!("Repeated {} ({} times)", state, count)),
            [(s1, c1), (s2, c2), ..] if c1 == c2 => {
                Some(format!("Oscillating between {} and {}", s1, s2))
            }
            [(s1, c1), (s2, c2), ..] => Some(format!(
                "Primarily {} ({}x) with some {} ({}x)",
                s1, c1, s2, c2
            )),
        }
    }

    fn recommendations(&self, reason: &TripReason) -> Vec<String> {
        let count = |state: CriticalState| self.frequency.get(&state).copied().unwrap_or(0);
        let mut recommendations = Vec::new();

        if count(CriticalState::Deadlock) >= 3 {
            recommendations
                .push("High DEADLOCK count: consider adding more diverse tools or actions".to_string());
        }
        if count(CriticalState::Panic) >= 3 {
            recommendations
                .push("High PANIC count: the query may be too vague or contradictory".to_string());
        }
        if count(CriticalState::Hubris) >= 2 {
            recommendations.push(
                "Multiple HUBRIS triggers: the agent may need a lower confidence threshold"
                    .to_string(),
            );
        }
        if count(CriticalState::Scarcity) >= 2 {
            recommendations
                .push("Multiple SCARCITY triggers: increase the token or step budget".to_string());
        }
        if matches!(reason, TripReason::Oscillation { .. }) {
            recommendations.push(
                "Oscillation detected: protocols may have conflicting priorities".to_string(),
            );
        }

        if recommendations.is_empty() {
            recommendations.push(
                "General thrashing: consider simplifying the query or adding more context"
                    .to_string(),
            );
        }

        recommendations
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, value: T, capacity: usize) {
    if capacity == 0 {
        return;
    }
    while queue.len() >= capacity {
        queue.pop_front();
    }
    queue.push_back(value);
}
