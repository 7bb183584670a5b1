//! Custom error types for the server.
//!
//! This module defines the primary error type, `CoreError`, used across the
//! library. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different kinds of failures the core can
//! encounter: I/O and configuration problems, wire-protocol violations, and
//! faults raised by the pluggable adaptive/execution engines.
//!
//! Engine faults deserve a note: errors returned by an adaptive or execution
//! engine during the experiment loop are never allowed to crash the worker
//! thread. The worker captures them, pushes them onto the exception queue and
//! forces the run into `Pausing`. Clients observe the fault through the
//! state-polling channel (see [`crate::core`]).

use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    #[error("Adaptive engine error: {0}")]
    Adaptive(String),

    #[error("Execution engine error: {0}")]
    Execution(String),

    #[error("Unknown parameter path: {0}")]
    ParameterUnknown(String),

    #[error("Parameter value rejected: {0}")]
    ParameterInvalid(String),

    #[error("Dimensionality mismatch: expected {expected}, got {actual}")]
    Dimensionality { expected: usize, actual: usize },

    #[error("Invalid dataset: {0}")]
    InvalidData(String),

    #[error("Not connected to a core server")]
    NotConnected,

    #[error("Request timed out")]
    Timeout,

    #[error("Experiment worker panicked: {0}")]
    WorkerPanic(String),
}
