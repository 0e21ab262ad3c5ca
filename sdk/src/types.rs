//! Step input types
//!
//! A [`StepRecord`] is what the supervised agent loop hands to the monitor
//! after every tool invocation or reasoning increment. Records are immutable
//! once built: fields are private and only readable through accessors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ordered tool arguments (key order never affects signature equality)
pub type Arguments = BTreeMap<String, serde_json::Value>;

/// Two earlier observations that disagree on the same fact
///
/// The monitor does not compute contradictions; the agent loop attaches one
/// to the step that surfaced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    /// The fact the observations disagree on
    pub fact: String,
    /// The conflicting observations, in the order they were seen
    #[serde(default)]
    pub observations: Vec<String>,
}

impl Contradiction {
    pub fn new(fact: impl Into<String>) -> Self {
        Self {
            fact: fact.into(),
            observations: Vec::new(),
        }
    }

    pub fn with_observation(mut self, observation: impl Into<String>) -> Self {
        self.observations.push(observation.into());
        self
    }
}

/// One executed step of the supervised agent loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    session_id: String,
    step_index: u64,
    action_name: String,
    #[serde(default)]
    arguments: Arguments,
    /// Free-text rationale the agent produced for this step
    #[serde(default)]
    rationale: String,
    #[serde(default = "default_confidence_hint")]
    confidence_hint: f64,
    #[serde(default)]
    tokens_used: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contradiction: Option<Contradiction>,
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
}

fn default_confidence_hint() -> f64 {
    0.5
}

impl StepRecord {
    /// Start a record with neutral confidence, no arguments and no tokens
    pub fn new(
        session_id: impl Into<String>,
        step_index: u64,
        action_name: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            step_index,
            action_name: action_name.into(),
            arguments: Arguments::new(),
            rationale: String::new(),
            confidence_hint: default_confidence_hint(),
            tokens_used: 0,
            contradiction: None,
            timestamp: Utc::now(),
        }
    }

    /// Add an argument
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Replace all arguments
    pub fn with_arguments(mut self, arguments: Arguments) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn with_confidence(mut self, confidence_hint: f64) -> Self {
        self.confidence_hint = confidence_hint;
        self
    }

    pub fn with_tokens(mut self, tokens_used: u64) -> Self {
        self.tokens_used = tokens_used;
        self
    }

    pub fn with_contradiction(mut self, contradiction: Contradiction) -> Self {
        self.contradiction = Some(contradiction);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn step_index(&self) -> u64 {
        self.step_index
    }

    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn confidence_hint(&self) -> f64 {
        self.confidence_hint
    }

    pub fn tokens_used(&self) -> u64 {
        self.tokens_used
    }

    pub fn contradiction(&self) -> Option<&Contradiction> {
        self.contradiction.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Resource budgets fixed at session start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Budgets {
    /// Maximum number of steps the session may take
    pub max_steps: u64,
    /// Maximum number of tokens the session may consume
    pub token_budget: u64,
}

impl Budgets {
    pub fn new(max_steps: u64, token_budget: u64) -> Self {
        Self {
            max_steps,
            token_budget,
        }
    }
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            max_steps: 10,
            token_budget: 1000,
        }
    }
}

impl fmt::Display for Budgets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} steps / {} tokens",
            self.max_steps, self.token_budget
        )
    }
}
