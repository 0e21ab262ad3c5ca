//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - replay: Feed a JSON Lines trace through the monitor
//! - demo: Run a built-in adversarial scenario
//! - config show / validate / init

use anyhow::{Context, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::replay::{self, Scenario, SessionReport, Trace};
use sdk::{Budgets, Decision};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Replay a trace file
///
/// Budgets not given on the command line come from the configuration.
pub async fn handle_replay(
    path: &Path,
    max_steps: Option<u64>,
    token_budget: Option<u64>,
    config: Arc<Config>,
    format: OutputFormat,
) -> Result<()> {
    let trace = Trace::from_path(path)
        .with_context(|| format!("Failed to load trace {}", path.display()))?;

    let budgets = Budgets::new(
        max_steps.unwrap_or(config.budgets.max_steps),
        token_budget.unwrap_or(config.budgets.token_budget),
    );

    let reports = replay::replay(trace, budgets, config).await?;

    match format {
        OutputFormat::Text => {
            for report in &reports {
                print_report(report);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "trace": path,
                "sessions": reports,
                "halted": reports.iter().filter(|r| r.halted()).count(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Run a built-in scenario
pub async fn handle_demo(scenario: Scenario, config: Arc<Config>, format: OutputFormat) -> Result<()> {
    let session_id = scenario.session_id();
    let steps = scenario.steps();
    let budgets = scenario.budgets();

    let report = tokio::task::spawn_blocking(move || {
        replay::replay_session(&session_id, steps, budgets, &config)
    })
    .await
    .context("Demo task failed")??;

    match format {
        OutputFormat::Text => {
            println!("Scenario: {} ({})", scenario.name(), scenario.description());
            println!();
            print_report(&report);
        }
        OutputFormat::Json => {
            let output = json!({
                "scenario": scenario.name(),
                "description": scenario.description(),
                "session": report,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show the effective configuration
pub fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{}", config.to_toml_string()?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}

/// Validate a configuration file
pub fn handle_config_validate(path: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => Config::default_config_path()?,
    };

    let result = Config::load_from_path(&path);

    match format {
        OutputFormat::Text => match &result {
            Ok(_) => println!("{}: valid", path.display()),
            Err(e) => println!("{}: invalid ({})", path.display(), e),
        },
        OutputFormat::Json => {
            let output = json!({
                "path": path,
                "valid": result.is_ok(),
                "error": result.as_ref().err().map(ToString::to_string),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    result
        .map(|_| ())
        .with_context(|| format!("Invalid configuration {}", path.display()))
}

/// Write the default configuration file
pub fn handle_config_init(force: bool, format: OutputFormat) -> Result<()> {
    let path = Config::default_config_path()?;
    Config::write_default(&path, force)?;

    match format {
        OutputFormat::Text => println!("Wrote default configuration to {}", path.display()),
        OutputFormat::Json => {
            let output = json!({ "path": path, "written": true });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn print_report(report: &SessionReport) {
    let summary = &report.summary;
    println!("Session {} ({})", summary.session_id, summary.budgets);

    for outcome in &report.outcomes {
        println!(
            "  step {:>3}  {:<12} {}",
            outcome.step_index, outcome.action, outcome.decision
        );

        if let Decision::Halt(diagnostics) = &outcome.decision {
            if let Some(pattern) = &diagnostics.pattern {
                println!("             pattern: {}", pattern);
            }
            if !diagnostics.recent_actions.is_empty() {
                println!(
                    "             recent actions: {}",
                    diagnostics.recent_actions.join(", ")
                );
            }
            for recommendation in &diagnostics.recommendations {
                println!("             - {}", recommendation);
            }
        }
    }

    if let Some(error) = &report.error {
        println!("  error: {}", error);
    }

    let activations = if summary.activations.is_empty() {
        "none".to_string()
    } else {
        summary
            .activations
            .iter()
            .map(|(state, count)| format!("{}={}", state, count))
            .collect::<Vec<_>>()
            .join(", ")
    };

    println!(
        "  {} steps, {} tokens, activations: {}{}",
        summary.steps_taken,
        summary.tokens_used,
        activations,
        summary
            .tripped
            .map(|reason| format!(", halted ({})", reason))
            .unwrap_or_default()
    );
    println!();
}
