//! Sessions
//!
//! A [`Session`] owns everything one supervised run needs: its
//! [`ActionHistory`], its [`Monitor`] (which carries the DEADLOCK escalation
//! counter) and its [`CircuitBreaker`]. Nothing is shared between sessions
//! except the read-only [`Config`].
//!
//! Per step:
//!
//! ```text
//! StepRecord -> history.record -> monitor.step (five detectors + priority)
//!            -> breaker.observe -> Decision
//! ```
//!
//! Errors fail closed: after a usage or detector error the session refuses
//! every further step until it is restarted. A tripped breaker is not an
//! error; it turns every later step into `Decision::Halt`.
//!
//! The [`SessionRegistry`] maps session ids to sessions and exposes the
//! start / end / restart lifecycle.

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::config::Config;
use crate::evaluator::EvaluationContext;
use crate::history::ActionHistory;
use crate::monitor::Monitor;
use chrono::{DateTime, Utc};
use sdk::{Budgets, CriticalState, Decision, MonitorError, StepRecord, TripReason};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Final accounting of a session, returned by `end_session`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub budgets: Budgets,
    pub started_at: DateTime<Utc>,
    pub steps_taken: u64,
    pub tokens_used: u64,
    /// How often each state became active
    pub activations: BTreeMap<CriticalState, u32>,
    /// Why the breaker opened, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tripped: Option<TripReason>,
    /// Error that aborted the session, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

/// One supervised run
pub struct Session {
    id: String,
    budgets: Budgets,
    started_at: DateTime<Utc>,
    history: ActionHistory,
    monitor: Monitor,
    breaker: CircuitBreaker,
    aborted: Option<String>,
}

impl Session {
    /// Fresh session with its own history, monitor and breaker
    ///
    /// # Errors
    ///
    /// - `MissingSessionId` for an empty id
    /// - `InvalidBudgets` if either budget is zero
    /// - `Config` if the detectors cannot be built
    pub fn new(id: impl Into<String>, budgets: Budgets, config: &Config) -> Result<Self, MonitorError> {
        let id = id.into();
        if id.is_empty() {
            return Err(MonitorError::MissingSessionId);
        }
        if budgets.max_steps == 0 || budgets.token_budget == 0 {
            return Err(MonitorError::InvalidBudgets(format!(
                "{} for session '{}'",
                budgets, id
            )));
        }

        Ok(Self {
            history: ActionHistory::new(id.clone()),
            monitor: Monitor::new(config)?,
            breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            budgets,
            started_at: Utc::now(),
            id,
            aborted: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn budgets(&self) -> Budgets {
        self.budgets
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn history(&self) -> &ActionHistory {
        &self.history
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// Supervise one step
    ///
    /// # Errors
    ///
    /// - `SessionAborted` if an earlier step failed
    /// - any usage error from recording the step
    /// - any detector error from evaluating it
    ///
    /// Every error except `SessionAborted` aborts the session, unless the
    /// breaker is already open: a halted session rejects the malformed step
    /// and keeps answering `Halt`.
    pub fn process_step(&mut self, step: StepRecord) -> Result<Decision, MonitorError> {
        if let Some(cause) = &self.aborted {
            return Err(MonitorError::SessionAborted {
                session: self.id.clone(),
                cause: cause.clone(),
            });
        }

        self.supervise(step).map_err(|e| {
            if self.breaker.is_tripped() {
                warn!("Session {} is halted, rejected step: {}", self.id, e);
            } else {
                error!("Session {} aborted: {}", self.id, e);
                self.aborted = Some(e.to_string());
            }
            e
        })
    }

    fn supervise(&mut self, step: StepRecord) -> Result<Decision, MonitorError> {
        self.history.record(step.clone())?;

        // Steps after a trip are recorded for the diagnostics but never evaluated
        if let Some(diagnostics) = self.halt_diagnostics() {
            warn!(
                "Session {} halted at step {}: {}",
                self.id,
                step.step_index(),
                diagnostics.reason
            );
            return Ok(Decision::Halt(diagnostics));
        }

        let ctx = EvaluationContext::new(&step, &self.history, &self.budgets);
        let resolution = self.monitor.step(&ctx)?;

        let directive = resolution.action.as_ref().map(|a| a.directive);
        if let CircuitState::Open(reason) = self.breaker.observe(resolution.state, directive) {
            warn!(
                "Session {} will halt from the next step on ({})",
                self.id, reason
            );
        }

        Ok(match resolution.action {
            Some(action) => {
                warn!("Session {} step {}: {}", self.id, step.step_index(), action);
                Decision::Intervene(action)
            }
            None => Decision::NoIntervention,
        })
    }

    fn halt_diagnostics(&self) -> Option<sdk::HaltDiagnostics> {
        let depth = self.breaker.diagnostics_depth();
        self.breaker
            .diagnostics(self.history.recent_actions(depth))
    }

    pub fn summary(&self) -> SessionSummary {
        let usage = self.history.resource_usage();
        let tripped = match self.breaker.state() {
            CircuitState::Open(reason) => Some(reason),
            CircuitState::Closed => None,
        };

        SessionSummary {
            session_id: self.id.clone(),
            budgets: self.budgets,
            started_at: self.started_at,
            steps_taken: usage.steps_taken,
            tokens_used: usage.tokens_used,
            activations: self.monitor.activations().clone(),
            tripped,
            aborted: self.aborted.clone(),
        }
    }
}

/// Session id to session map with explicit lifecycle
pub struct SessionRegistry {
    config: Arc<Config>,
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start a session with fresh history, monitor and breaker
    ///
    /// # Errors
    ///
    /// `SessionExists` if the id is already active, plus the errors of
    /// [`Session::new`].
    pub fn start_session(&mut self, session_id: &str, budgets: Budgets) -> Result<(), MonitorError> {
        if self.sessions.contains_key(session_id) {
            return Err(MonitorError::SessionExists(session_id.to_string()));
        }

        let session = Session::new(session_id, budgets, &self.config)?;
        info!("Session {} started ({})", session_id, budgets);
        self.sessions.insert(session_id.to_string(), session);

        Ok(())
    }

    /// Start a session with the configured default budgets
    pub fn start_session_with_defaults(&mut self, session_id: &str) -> Result<(), MonitorError> {
        let budgets = self.config.budgets;
        self.start_session(session_id, budgets)
    }

    /// Release a session and return its summary
    pub fn end_session(&mut self, session_id: &str) -> Result<SessionSummary, MonitorError> {
        let session = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| MonitorError::UnknownSession(session_id.to_string()))?;

        let summary = session.summary();
        info!(
            "Session {} ended after {} steps ({} tokens)",
            session_id, summary.steps_taken, summary.tokens_used
        );
        Ok(summary)
    }

    /// Replace a session with a fresh one under the same budgets
    ///
    /// This is the only way out of a halted or aborted session.
    pub fn restart_session(&mut self, session_id: &str) -> Result<(), MonitorError> {
        let budgets = self
            .sessions
            .get(session_id)
            .map(Session::budgets)
            .ok_or_else(|| MonitorError::UnknownSession(session_id.to_string()))?;

        let session = Session::new(session_id, budgets, &self.config)?;
        self.sessions.insert(session_id.to_string(), session);
        info!("Session {} restarted", session_id);

        Ok(())
    }

    /// Route a step to its session
    pub fn process_step(&mut self, step: StepRecord) -> Result<Decision, MonitorError> {
        if step.session_id().is_empty() {
            return Err(MonitorError::MissingSessionId);
        }

        let session = self
            .sessions
            .get_mut(step.session_id())
            .ok_or_else(|| MonitorError::UnknownSession(step.session_id().to_string()))?;

        session.process_step(step)
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
