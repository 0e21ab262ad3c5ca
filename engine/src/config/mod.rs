//! Configuration management
//!
//! This module handles loading and validation of the monitor configuration.
//! Configuration is stored in TOML format, by default at ~/.vigil/config.toml.
//! A loaded [`Config`] is immutable; sessions share it read-only through an
//! `Arc`, so every session of a process evaluates with identical thresholds.
//!
//! # Configuration Sections
//!
//! - **core**: log level
//! - **budgets**: default step/token budgets for sessions started without
//!   explicit budgets
//! - **detectors**: per-detector thresholds, windows and lexicons
//! - **activation**: per-state activation thresholds used by the monitor
//! - **circuit_breaker**: thrashing and oscillation limits
//!
//! Every section is optional and falls back to its defaults.
//!
//! # Examples
//!
//! ```
//! use vigil_engine::config::Config;
//!
//! let config: Config = toml::from_str(
//!     r#"
//! [detectors.deadlock]
//! repeat_window = 4
//! "#,
//! )
//! .unwrap();
//!
//! config.validate().unwrap();
//! assert_eq!(config.detectors.deadlock.repeat_window, 4);
//! assert_eq!(config.circuit_breaker.consecutive_limit, 3);
//! ```

use sdk::{Budgets, CriticalState, MonitorError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Default session budgets
    #[serde(default)]
    pub budgets: Budgets,

    /// Detector settings
    #[serde(default)]
    pub detectors: DetectorsConfig,

    /// Activation thresholds applied by the monitor
    #[serde(default)]
    pub activation: ActivationConfig,

    /// Circuit breaker settings
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

/// Core configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Settings for the five detectors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorsConfig {
    #[serde(default)]
    pub deadlock: DeadlockConfig,

    #[serde(default)]
    pub panic: PanicConfig,

    #[serde(default)]
    pub hubris: HubrisConfig,

    #[serde(default)]
    pub scarcity: ScarcityConfig,

    #[serde(default)]
    pub novelty: NoveltyConfig,
}

/// DEADLOCK detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadlockConfig {
    /// Identical trailing steps that count as an exact repeat
    #[serde(default = "default_repeat_window")]
    pub repeat_window: usize,

    /// Trailing steps that must alternate A, B, A, B
    #[serde(default = "default_cycle_window")]
    pub cycle_window: usize,

    /// Trailing steps that must repeat A, B, C, A, B, C
    #[serde(default = "default_triple_cycle_window")]
    pub triple_cycle_window: usize,

    /// Confidence reported when the pattern spans exactly its window
    #[serde(default = "default_deadlock_confidence")]
    pub base_confidence: f64,

    /// DEADLOCK activation number from which the directive becomes FORCE_SYNTHESIS
    #[serde(default = "default_synthesis_after")]
    pub synthesis_after: u32,
}

impl Default for DeadlockConfig {
    fn default() -> Self {
        Self {
            repeat_window: default_repeat_window(),
            cycle_window: default_cycle_window(),
            triple_cycle_window: default_triple_cycle_window(),
            base_confidence: default_deadlock_confidence(),
            synthesis_after: default_synthesis_after(),
        }
    }
}

/// PANIC detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanicConfig {
    /// Confidence hints below this value trigger PANIC
    #[serde(default = "default_panic_threshold")]
    pub confidence_threshold: f64,

    /// Hedging markers per word above which the rationale triggers PANIC
    #[serde(default = "default_hedging_density")]
    pub hedging_density: f64,

    /// Phrases that signal uncertainty
    #[serde(default = "default_hedging_markers")]
    pub hedging_markers: Vec<String>,

    /// Phrases that signal certainty
    #[serde(default = "default_confidence_markers")]
    pub confidence_markers: Vec<String>,

    /// Sources the agent is restricted to while panicking
    #[serde(default = "default_allowed_sources")]
    pub allowed_sources: Vec<String>,
}

impl Default for PanicConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_panic_threshold(),
            hedging_density: default_hedging_density(),
            hedging_markers: default_hedging_markers(),
            confidence_markers: default_confidence_markers(),
            allowed_sources: default_allowed_sources(),
        }
    }
}

/// HUBRIS detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubrisConfig {
    /// Confidence hints above this value are suspicious early in a session
    #[serde(default = "default_hubris_threshold")]
    pub confidence_threshold: f64,

    /// Sessions with fewer steps than this are "early"
    #[serde(default = "default_min_steps")]
    pub min_steps: u64,

    /// Extra sources demanded by FORCE_SKEPTICISM
    #[serde(default = "default_additional_sources")]
    pub additional_sources: u32,
}

impl Default for HubrisConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_hubris_threshold(),
            min_steps: default_min_steps(),
            additional_sources: default_additional_sources(),
        }
    }
}

/// SCARCITY detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScarcityConfig {
    /// Budget fraction (tokens or steps) at which SCARCITY fires
    #[serde(default = "default_scarcity_fraction")]
    pub fraction: f64,
}

impl Default for ScarcityConfig {
    fn default() -> Self {
        Self {
            fraction: default_scarcity_fraction(),
        }
    }
}

/// NOVELTY detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoveltyConfig {
    /// Confidence reported whenever a contradiction is flagged
    #[serde(default = "default_novelty_confidence")]
    pub confidence: f64,
}

impl Default for NoveltyConfig {
    fn default() -> Self {
        Self {
            confidence: default_novelty_confidence(),
        }
    }
}

/// Confidence a detection must exceed to become the active state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationConfig {
    #[serde(default = "default_activation")]
    pub deadlock: f64,

    #[serde(default = "default_activation")]
    pub panic: f64,

    #[serde(default = "default_activation")]
    pub scarcity: f64,

    #[serde(default = "default_activation")]
    pub hubris: f64,

    #[serde(default = "default_activation")]
    pub novelty: f64,
}

impl ActivationConfig {
    /// Activation threshold for a state; NONE never activates
    pub fn threshold(&self, state: CriticalState) -> f64 {
        match state {
            CriticalState::Deadlock => self.deadlock,
            CriticalState::Panic => self.panic,
            CriticalState::Scarcity => self.scarcity,
            CriticalState::Hubris => self.hubris,
            CriticalState::Novelty => self.novelty,
            CriticalState::None => 1.0,
        }
    }
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            deadlock: default_activation(),
            panic: default_activation(),
            scarcity: default_activation(),
            hubris: default_activation(),
            novelty: default_activation(),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive interventions that trip the breaker
    #[serde(default = "default_consecutive_limit")]
    pub consecutive_limit: u32,

    /// Size of the window checked for A, B, A, B oscillation
    #[serde(default = "default_oscillation_window")]
    pub oscillation_window: usize,

    /// Interventions per session that trip the breaker (disabled when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_limit: Option<u32>,

    /// How many states, directives and actions a HALT reports
    #[serde(default = "default_diagnostics_depth")]
    pub diagnostics_depth: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            consecutive_limit: default_consecutive_limit(),
            oscillation_window: default_oscillation_window(),
            total_limit: None,
            diagnostics_depth: default_diagnostics_depth(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_repeat_window() -> usize {
    3
}

fn default_cycle_window() -> usize {
    4
}

fn default_triple_cycle_window() -> usize {
    6
}

fn default_deadlock_confidence() -> f64 {
    0.9
}

fn default_synthesis_after() -> u32 {
    3
}

fn default_panic_threshold() -> f64 {
    0.4
}

fn default_hedging_density() -> f64 {
    0.15
}

fn default_hedging_markers() -> Vec<String> {
    [
        "maybe",
        "possibly",
        "perhaps",
        "might",
        "could",
        "probably",
        "likely",
        "uncertain",
        "not sure",
        "i think",
        "i believe",
        "seems like",
        "appears to",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_confidence_markers() -> Vec<String> {
    [
        "definitely",
        "certainly",
        "absolutely",
        "clearly",
        "obviously",
        "without doubt",
        "for sure",
        "guaranteed",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_allowed_sources() -> Vec<String> {
    ["wikipedia", "arxiv", "official_docs"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_hubris_threshold() -> f64 {
    0.9
}

fn default_min_steps() -> u64 {
    3
}

fn default_additional_sources() -> u32 {
    3
}

fn default_scarcity_fraction() -> f64 {
    0.8
}

fn default_novelty_confidence() -> f64 {
    0.8
}

fn default_activation() -> f64 {
    0.5
}

fn default_consecutive_limit() -> u32 {
    3
}

fn default_oscillation_window() -> usize {
    4
}

fn default_diagnostics_depth() -> usize {
    10
}

impl Config {
    /// Load configuration from the default location if it exists
    ///
    /// Falls back to the built-in defaults when ~/.vigil/config.toml is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated.
    pub fn load_or_default() -> Result<Self, MonitorError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, MonitorError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| MonitorError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, MonitorError> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| MonitorError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Serialize to pretty TOML
    pub fn to_toml_string(&self) -> Result<String, MonitorError> {
        toml::to_string_pretty(self)
            .map_err(|e| MonitorError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Write the default configuration to `path`
    ///
    /// Refuses to overwrite an existing file unless `force` is set.
    pub fn write_default(path: &Path, force: bool) -> Result<Self, MonitorError> {
        if path.exists() && !force {
            return Err(MonitorError::Config(format!(
                "Config file already exists: {:?}",
                path
            )));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                MonitorError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default();
        fs::write(path, config.to_toml_string()?)
            .map_err(|e| MonitorError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.vigil/config.toml)
    pub fn default_config_path() -> Result<PathBuf, MonitorError> {
        let home = dirs::home_dir().ok_or_else(|| {
            MonitorError::Config("Could not determine home directory".to_string())
        })?;

        Ok(home.join(".vigil").join("config.toml"))
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The log level is unknown
    /// - A threshold, fraction or confidence lies outside [0, 1]
    /// - A window is too small to express its pattern
    /// - A limit or budget is zero
    pub fn validate(&self) -> Result<(), MonitorError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(MonitorError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.budgets.max_steps == 0 || self.budgets.token_budget == 0 {
            return Err(MonitorError::Config(
                "budgets.max_steps and budgets.token_budget must be positive".to_string(),
            ));
        }

        let d = &self.detectors;
        let unit_values = [
            ("detectors.deadlock.base_confidence", d.deadlock.base_confidence),
            ("detectors.panic.confidence_threshold", d.panic.confidence_threshold),
            ("detectors.panic.hedging_density", d.panic.hedging_density),
            ("detectors.hubris.confidence_threshold", d.hubris.confidence_threshold),
            ("detectors.scarcity.fraction", d.scarcity.fraction),
            ("detectors.novelty.confidence", d.novelty.confidence),
            ("activation.deadlock", self.activation.deadlock),
            ("activation.panic", self.activation.panic),
            ("activation.scarcity", self.activation.scarcity),
            ("activation.hubris", self.activation.hubris),
            ("activation.novelty", self.activation.novelty),
        ];
        for (name, value) in unit_values {
            if !(0.0..=1.0).contains(&value) {
                return Err(MonitorError::Config(format!(
                    "{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }

        if d.scarcity.fraction == 0.0 {
            return Err(MonitorError::Config(
                "detectors.scarcity.fraction must be greater than 0.0".to_string(),
            ));
        }

        if d.deadlock.repeat_window < 2 {
            return Err(MonitorError::Config(
                "detectors.deadlock.repeat_window must be at least 2".to_string(),
            ));
        }
        if d.deadlock.cycle_window < 4 {
            return Err(MonitorError::Config(
                "detectors.deadlock.cycle_window must be at least 4".to_string(),
            ));
        }
        if d.deadlock.triple_cycle_window < 6 {
            return Err(MonitorError::Config(
                "detectors.deadlock.triple_cycle_window must be at least 6".to_string(),
            ));
        }
        if d.deadlock.synthesis_after == 0 {
            return Err(MonitorError::Config(
                "detectors.deadlock.synthesis_after must be at least 1".to_string(),
            ));
        }

        if d.panic.hedging_markers.iter().any(|m| m.trim().is_empty())
            || d.panic.confidence_markers.iter().any(|m| m.trim().is_empty())
        {
            return Err(MonitorError::Config(
                "detectors.panic lexicons must not contain empty markers".to_string(),
            ));
        }

        let cb = &self.circuit_breaker;
        if cb.consecutive_limit == 0 {
            return Err(MonitorError::Config(
                "circuit_breaker.consecutive_limit must be at least 1".to_string(),
            ));
        }
        if cb.oscillation_window < 3 {
            return Err(MonitorError::Config(
                "circuit_breaker.oscillation_window must be at least 3".to_string(),
            ));
        }
        if cb.total_limit == Some(0) {
            return Err(MonitorError::Config(
                "circuit_breaker.total_limit must be at least 1 when set".to_string(),
            ));
        }

        Ok(())
    }
}
