//! Error handling for Hearth Splat
//!
//! One error type for the whole sort core. Every fallible path returns
//! `EngineResult` so a failed frame never takes the renderer down.

use std::error::Error as StdError;
use std::fmt;

/// Main error type for Hearth Splat
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    // Point Store Errors
    CapacityExceeded {
        requested: usize,
        max: usize,
    },
    InvalidInput {
        reason: String,
    },

    // Memory Errors
    OutOfMemory {
        requested: usize,
        available: usize,
    },

    // Sort Errors
    SortDispatchFailed {
        sequence: u64,
        error: String,
    },

    // Threading Errors
    ChannelClosed {
        name: String,
    },
    TimeoutError(String),

    // Configuration Errors
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    // System Errors
    InitializationError(String),

    // Generic fallback for unexpected errors
    Internal {
        message: String,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::CapacityExceeded { requested, max } => write!(
                f,
                "Capacity exceeded: {} points requested, device maximum is {}",
                requested, max
            ),
            EngineError::InvalidInput { reason } => write!(f, "Invalid input: {}", reason),

            EngineError::OutOfMemory {
                requested,
                available,
            } => write!(
                f,
                "Out of memory: requested {} bytes, available {}",
                requested, available
            ),

            EngineError::SortDispatchFailed { sequence, error } => {
                write!(f, "Sort job {} failed: {}", sequence, error)
            }

            EngineError::ChannelClosed { name } => write!(f, "Channel closed: {}", name),
            EngineError::TimeoutError(msg) => write!(f, "Timeout error: {}", msg),

            EngineError::InvalidConfig {
                field,
                value,
                reason,
            } => write!(f, "Invalid config: {} = {} ({})", field, value, reason),

            EngineError::InitializationError(msg) => write!(f, "Initialization error: {}", msg),

            EngineError::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl StdError for EngineError {}

/// Type alias for Results in Hearth Splat
pub type EngineResult<T> = Result<T, EngineError>;

// Conversion traits for common error types

impl<T> From<crossbeam_channel::SendError<T>> for EngineError {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        EngineError::ChannelClosed {
            name: "sort_completions".to_string(),
        }
    }
}

impl From<crossbeam_channel::RecvTimeoutError> for EngineError {
    fn from(error: crossbeam_channel::RecvTimeoutError) -> Self {
        match error {
            crossbeam_channel::RecvTimeoutError::Timeout => {
                EngineError::TimeoutError("waiting for sort completion".to_string())
            }
            crossbeam_channel::RecvTimeoutError::Disconnected => EngineError::ChannelClosed {
                name: "sort_completions".to_string(),
            },
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for EngineError {
    fn from(error: rayon::ThreadPoolBuildError) -> Self {
        EngineError::InitializationError(format!("sort thread pool: {}", error))
    }
}

impl From<crate::config::ConfigError> for EngineError {
    fn from(error: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match error {
            ConfigError::Io { path, source } => EngineError::InvalidConfig {
                field: "<file>".to_string(),
                value: path,
                reason: source.to_string(),
            },
            other => EngineError::InvalidConfig {
                field: "<toml>".to_string(),
                value: String::new(),
                reason: other.to_string(),
            },
        }
    }
}

// Helper functions for common error patterns

/// Convert Option to Result with context
pub trait OptionExt<T> {
    fn ok_or_engine<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> EngineError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_engine<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> EngineError,
    {
        self.ok_or_else(f)
    }
}

/// Extension trait for adding context to errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> EngineResult<T>;
    fn with_context<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: fmt::Display,
{
    fn context(self, msg: &str) -> EngineResult<T> {
        self.map_err(|e| EngineError::Internal {
            message: format!("{}: {}", msg, e),
        })
    }

    fn with_context<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| EngineError::Internal {
            message: format!("{}: {}", f(), e),
        })
    }
}
