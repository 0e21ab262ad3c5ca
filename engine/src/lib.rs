//! Vigil Engine Library
//!
//! This library provides the core functionality of the Vigil safety monitor.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Per-session action history and loop-shape queries
pub mod history;

/// Critical state detectors
pub mod evaluator;

/// Priority resolution and protocol actions
pub mod monitor;

/// Thrashing and oscillation circuit breaker
pub mod circuit_breaker;

/// Session lifecycle and registry
pub mod session;

/// Trace replay and built-in scenarios
pub mod replay;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
