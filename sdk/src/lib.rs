//! Vigil SDK
//!
//! Shared types for the Vigil monitor core and the agent loops it
//! supervises: step records, budgets, detections, protocol actions,
//! decisions and the error taxonomy.

/// Error types and handling
pub mod errors;

/// Monitor output types
pub mod protocol;

/// Step input types
pub mod types;

// Re-export commonly used types
pub use errors::{ErrorKind, MonitorError, VigilErrorExt};
pub use protocol::{
    ActionMetadata, CriticalState, Decision, DetectionMetadata, Directive, HaltDiagnostics,
    LoopPattern, ProtocolAction, StateDetection, TripReason,
};
pub use types::{Arguments, Budgets, Contradiction, StepRecord};
