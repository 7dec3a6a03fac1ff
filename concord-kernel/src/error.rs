//! Error types for the concord kernel

use thiserror::Error;

/// Errors raised by a concept while dispatching an action or emitting an event
#[derive(Debug, Error)]
pub enum ConceptError {
    /// The concept has no action with this name
    #[error("Action '{action}' not found on {concept}")]
    UnknownAction { concept: String, action: String },

    /// The payload could not be coerced into the action's declared type
    #[error("Invalid payload for action '{action}': {source}")]
    InvalidActionPayload {
        action: String,
        source: serde_json::Error,
    },

    /// The payload does not match the schema declared for the event
    #[error("Invalid payload for event '{event}': {source}")]
    InvalidEventPayload {
        event: String,
        source: serde_json::Error,
    },

    /// A value written into the state bag could not be encoded
    #[error("State field '{key}' could not be encoded: {source}")]
    StateEncoding {
        key: String,
        source: serde_json::Error,
    },

    /// The action body reported a failure
    #[error("{0}")]
    ActionFailed(String),
}

impl ConceptError {
    /// Failure reported by an action body
    pub fn failed(message: impl Into<String>) -> Self {
        ConceptError::ActionFailed(message.into())
    }
}

/// Errors surfaced by the runner
#[derive(Debug, Error)]
pub enum RunnerError {
    /// No concept is registered under this id or name
    #[error("Concept '{0}' not found")]
    UnknownConcept(String),

    /// The externally dispatched action failed
    #[error(transparent)]
    Concept(#[from] ConceptError),

    /// An invariant did not hold at the end of a tick
    #[error(
        "Invariant Violation: {name}{}",
        .description.as_ref().map(|d| format!(" ({d})")).unwrap_or_default()
    )]
    InvariantViolated {
        name: String,
        description: Option<String>,
    },

    /// The run was halted by an earlier invariant violation
    #[error("Runner halted after invariant violation '{0}'; replay to an earlier tick to continue")]
    Halted(String),

    /// Replay target outside the recorded history
    #[error("Invalid tick index {requested}. Max {latest}")]
    InvalidTick { requested: u64, latest: u64 },

    /// A synchronization names a concept that is not registered
    #[error("Synchronization '{sync}' references unknown concept '{target}'")]
    UnresolvedReference { sync: String, target: String },
}

/// Result type using RunnerError
pub type Result<T> = std::result::Result<T, RunnerError>;
