//! Trace replay
//!
//! Feeds recorded step streams through fresh sessions. A trace is JSON Lines,
//! one [`StepRecord`] per line; blank lines and lines starting with `#` are
//! skipped. Steps are grouped by session id (in order of first appearance)
//! and each session is replayed on its own blocking task, since sessions
//! share nothing but the configuration.
//!
//! ```text
//! {"session_id":"s1","step_index":1,"action_name":"search","arguments":{"q":"x"}}
//! {"session_id":"s1","step_index":2,"action_name":"search","arguments":{"q":"x"}}
//! ```

pub mod scenarios;

use crate::config::Config;
use crate::session::{Session, SessionSummary};
use anyhow::Context;
use sdk::{Budgets, Decision, MonitorError, StepRecord};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub use scenarios::Scenario;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Failed to read trace: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid step record on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Trace contains no steps")]
    Empty,
}

/// Steps of a trace grouped by session
#[derive(Debug, Clone, Default)]
pub struct Trace {
    sessions: Vec<(String, Vec<StepRecord>)>,
}

impl Trace {
    /// Parse JSON Lines text
    pub fn parse(text: &str) -> Result<Self, TraceError> {
        let mut steps = Vec::new();

        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let step = serde_json::from_str(line)
                .map_err(|source| TraceError::Parse { line: i + 1, source })?;
            steps.push(step);
        }

        if steps.is_empty() {
            return Err(TraceError::Empty);
        }

        Ok(Self::from_steps(steps))
    }

    pub fn from_path(path: &Path) -> Result<Self, TraceError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Group steps by session, keeping the per-session order
    pub fn from_steps(steps: impl IntoIterator<Item = StepRecord>) -> Self {
        let mut sessions: Vec<(String, Vec<StepRecord>)> = Vec::new();

        for step in steps {
            match sessions.iter_mut().find(|(id, _)| id == step.session_id()) {
                Some((_, group)) => group.push(step),
                None => sessions.push((step.session_id().to_string(), vec![step])),
            }
        }

        Self { sessions }
    }

    pub fn sessions(&self) -> &[(String, Vec<StepRecord>)] {
        &self.sessions
    }

    pub fn step_count(&self) -> usize {
        self.sessions.iter().map(|(_, steps)| steps.len()).sum()
    }
}

/// Decision the monitor returned for one step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub step_index: u64,
    pub action: String,
    pub decision: Decision,
}

/// Result of replaying one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub summary: SessionSummary,
    pub outcomes: Vec<StepOutcome>,
    /// Error that stopped the replay, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionReport {
    pub fn halted(&self) -> bool {
        self.outcomes.last().is_some_and(|o| o.decision.is_halt())
    }
}

/// Replay one session synchronously
///
/// Stops at the first HALT (the agent loop would stop there) or at the first
/// error, which is reported in the result rather than returned.
///
/// # Errors
///
/// Only fails if the session itself cannot be created.
pub fn replay_session(
    session_id: &str,
    steps: Vec<StepRecord>,
    budgets: Budgets,
    config: &Config,
) -> Result<SessionReport, MonitorError> {
    let mut session = Session::new(session_id, budgets, config)?;
    let mut outcomes = Vec::with_capacity(steps.len());
    let mut error = None;

    for step in steps {
        let step_index = step.step_index();
        let action = step.action_name().to_string();

        match session.process_step(step) {
            Ok(decision) => {
                debug!("{} step {}: {}", session_id, step_index, decision);
                let halt = decision.is_halt();
                outcomes.push(StepOutcome {
                    step_index,
                    action,
                    decision,
                });
                if halt {
                    break;
                }
            }
            Err(e) => {
                error = Some(e.to_string());
                break;
            }
        }
    }

    Ok(SessionReport {
        summary: session.summary(),
        outcomes,
        error,
    })
}

/// Replay every session of a trace concurrently
///
/// Reports come back in trace order.
pub async fn replay(
    trace: Trace,
    budgets: Budgets,
    config: Arc<Config>,
) -> anyhow::Result<Vec<SessionReport>> {
    info!(
        "Replaying {} steps across {} sessions",
        trace.step_count(),
        trace.sessions().len()
    );

    let mut tasks = tokio::task::JoinSet::new();
    for (position, (session_id, steps)) in trace.sessions.into_iter().enumerate() {
        let config = Arc::clone(&config);
        tasks.spawn_blocking(move || {
            let report = replay_session(&session_id, steps, budgets, &config);
            (position, session_id, report)
        });
    }

    let mut reports = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (position, session_id, report) = joined.context("Replay task failed")?;
        let report =
            report.with_context(|| format!("Failed to start session '{}'", session_id))?;
        reports.push((position, report));
    }

    reports.sort_by_key(|(position, _)| *position);
    Ok(reports.into_iter().map(|(_, report)| report).collect())
}
