//! Action history
//!
//! Append-only log of the steps executed in one session. The history is bound
//! to a single session id at construction, so cross-session reads or writes
//! are impossible by construction. It answers the loop-shape queries the
//! DEADLOCK detector needs and keeps running resource totals.
//!
//! # Loop shapes
//!
//! - **Exact repeat**: the last `W` steps share one signature (A, A, A).
//! - **Cycle**: the last `W` steps repeat with period `p` and are not all the
//!   same signature (A, B, A, B for `p = 2`, A, B, C, A, B, C for `p = 3`).
//!
//! A signature is the action name plus its canonical arguments, so
//! `{"b": 2, "a": 1}` and `{"a": 1, "b": 2}` compare equal.

use sdk::{MonitorError, StepRecord};
use std::fmt;
use tracing::debug;

/// Identity of a step for loop detection: action name plus canonical arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionSignature {
    action_name: String,
    canonical_args: String,
}

impl ActionSignature {
    /// Build the signature of a step
    ///
    /// Arguments are stored in a sorted map and `serde_json` keeps object keys
    /// sorted, so serializing them yields a canonical string.
    pub fn of(step: &StepRecord) -> Self {
        let canonical_args = serde_json::Value::Object(
            step.arguments()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
        .to_string();

        Self {
            action_name: step.action_name().to_string(),
            canonical_args,
        }
    }

    pub fn action_name(&self) -> &str {
        &self.action_name
    }
}

impl fmt::Display for ActionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.action_name, self.canonical_args)
    }
}

/// Cumulative resource consumption of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceUsage {
    pub steps_taken: u64,
    pub tokens_used: u64,
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    record: StepRecord,
    signature: ActionSignature,
}

/// Ordered, append-only step log for one session
#[derive(Debug, Clone)]
pub struct ActionHistory {
    session_id: String,
    entries: Vec<HistoryEntry>,
    usage: ResourceUsage,
}

impl ActionHistory {
    /// Create an empty history bound to `session_id`
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            entries: Vec::new(),
            usage: ResourceUsage::default(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append a step
    ///
    /// The first step fixes the base index; every later step must carry the
    /// previous index plus one. A rejected step leaves the history untouched.
    ///
    /// # Errors
    ///
    /// - `SessionMismatch` if the step belongs to another session
    /// - `NonMonotonicStep` if the index is not exactly previous + 1
    /// - `StepIndexExhausted` once a step at `u64::MAX` was recorded
    /// - `EmptyActionName` / `InvalidConfidence` for malformed records
    pub fn record(&mut self, step: StepRecord) -> Result<(), MonitorError> {
        self.validate(&step)?;

        self.usage.steps_taken += 1;
        self.usage.tokens_used = self.usage.tokens_used.saturating_add(step.tokens_used());

        let signature = ActionSignature::of(&step);
        debug!(
            "Recorded step {} for session {}: {}",
            step.step_index(),
            self.session_id,
            signature
        );
        self.entries.push(HistoryEntry {
            record: step,
            signature,
        });

        Ok(())
    }

    fn validate(&self, step: &StepRecord) -> Result<(), MonitorError> {
        if step.session_id().is_empty() {
            return Err(MonitorError::MissingSessionId);
        }

        if step.session_id() != self.session_id {
            return Err(MonitorError::SessionMismatch {
                expected: self.session_id.clone(),
                found: step.session_id().to_string(),
            });
        }

        if let Some(last) = self.entries.last() {
            let last_index = last.record.step_index();
            let expected = last_index.checked_add(1).ok_or_else(|| {
                MonitorError::StepIndexExhausted {
                    session: self.session_id.clone(),
                    last: last_index,
                }
            })?;
            if step.step_index() != expected {
                return Err(MonitorError::NonMonotonicStep {
                    session: self.session_id.clone(),
                    expected,
                    found: step.step_index(),
                });
            }
        }

        if step.action_name().trim().is_empty() {
            return Err(MonitorError::EmptyActionName(step.step_index()));
        }

        let hint = step.confidence_hint();
        if !hint.is_finite() || !(0.0..=1.0).contains(&hint) {
            return Err(MonitorError::InvalidConfidence(hint));
        }

        Ok(())
    }

    /// Number of recorded steps
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recently recorded step
    pub fn last(&self) -> Option<&StepRecord> {
        self.entries.last().map(|e| &e.record)
    }

    /// Index the next step must carry
    ///
    /// `None` before the first step, and after a step at `u64::MAX`.
    pub fn next_step_index(&self) -> Option<u64> {
        self.last().and_then(|s| s.step_index().checked_add(1))
    }

    /// Running totals, maintained incrementally on every `record`
    pub fn resource_usage(&self) -> ResourceUsage {
        self.usage
    }

    /// Iterate over recorded steps, oldest first
    pub fn steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.entries.iter().map(|e| &e.record)
    }

    /// Signatures of the last `n` steps, oldest first
    pub fn recent_signatures(&self, n: usize) -> Vec<&ActionSignature> {
        let start = self.entries.len().saturating_sub(n);
        self.entries[start..].iter().map(|e| &e.signature).collect()
    }

    /// Rendered signatures of the last `n` steps, oldest first
    pub fn recent_actions(&self, n: usize) -> Vec<String> {
        self.recent_signatures(n)
            .into_iter()
            .map(ToString::to_string)
            .collect()
    }

    /// True iff the last `window` steps all share one signature
    ///
    /// Always false for a window below 2 or a history shorter than the window.
    pub fn detect_exact_repeat(&self, window: usize) -> bool {
        window >= 2 && self.trailing_repeat_len() >= window
    }

    /// Length of the trailing run of identical signatures
    pub fn trailing_repeat_len(&self) -> usize {
        let Some(last) = self.entries.last() else {
            return 0;
        };

        self.entries
            .iter()
            .rev()
            .take_while(|e| e.signature == last.signature)
            .count()
    }

    /// True iff the last `window` steps repeat with the given period and are
    /// not all one signature
    ///
    /// The window must span at least two full periods.
    pub fn detect_cycle(&self, period: usize, window: usize) -> bool {
        if period < 2 || window < period * 2 || self.entries.len() < window {
            return false;
        }

        self.trailing_cycle_len(period) >= window
    }

    /// Length of the trailing run that repeats with `period`
    ///
    /// Returns 0 when the trailing period is a single repeated signature,
    /// since that shape is an exact repeat rather than a cycle.
    pub fn trailing_cycle_len(&self, period: usize) -> usize {
        let n = self.entries.len();
        if period < 2 || n < period * 2 {
            return 0;
        }

        let unit = &self.entries[n - period..];
        if unit.iter().all(|e| e.signature == unit[0].signature) {
            return 0;
        }

        // Walk backwards while each entry matches the one a period later.
        let mut len = period;
        while len < n {
            let i = n - len - 1;
            if self.entries[i].signature != self.entries[i + period].signature {
                break;
            }
            len += 1;
        }

        len
    }
}
