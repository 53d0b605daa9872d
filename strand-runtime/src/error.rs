//! Error types for the task runtime

use std::error::Error as StdError;
use thiserror::Error;

/// Result type returned by task bodies.
pub type TaskResult = std::result::Result<(), TaskError>;

/// Error raised inside a task.
///
/// Suspension points (`yield_now`, `sleep`, timer and event waits, `join`)
/// resolve to `Err(TaskError::Interrupted)` when an interrupt was injected
/// while the task was suspended. Task bodies propagate with `?`; whatever
/// reaches the task boundary is logged and swallowed by the scheduler.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task was interrupted via [`interrupt`](crate::interrupt).
    #[error("task interrupted")]
    Interrupted,

    /// The event driver failed while the task was suspended on it.
    #[error("event driver failure: {0}")]
    Resume(String),

    /// Application-defined failure carried out of the task body.
    #[error("{0}")]
    Custom(Box<dyn StdError + Send + Sync>),
}

impl TaskError {
    /// Wrap an application error.
    pub fn custom(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::Custom(Box::new(error))
    }

    /// Whether this error is an injected interrupt.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Error type for event driver operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    /// The event loop is already running on this thread.
    #[error("event loop already running")]
    AlreadyRunning,

    /// The loop was driven with nothing registered to wait for.
    #[error("no events registered to wait for")]
    NoEvents,

    /// Driver internal failure.
    #[error("driver failure: {0}")]
    Internal(String),
}

impl DriverError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Error lowering process privileges from the recognized CLI options.
#[derive(Debug, Error)]
pub enum PrivilegeError {
    /// The user or group name could not be resolved.
    #[error("unknown {kind} {name:?}")]
    Unknown {
        /// "user" or "group"
        kind: &'static str,
        /// The name or numeric id as given.
        name: String,
    },

    /// The underlying system call failed.
    #[error("failed to set {kind}: {source}")]
    System {
        /// "user" or "group"
        kind: &'static str,
        /// OS error.
        #[source]
        source: std::io::Error,
    },
}
