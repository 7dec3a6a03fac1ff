//! The causal log and command bus
//!
//! A [`CausalLog`] receives every concept and synchronization registration,
//! every action and every processed event, so a run can be traced back from
//! any event to the external action that started it. It also carries the
//! command bus: published concept states going out, commands coming in.
//!
//! The runner never depends on the log succeeding. Write failures are
//! reported and the in-memory run continues.

pub mod chain;
pub mod memory;

pub use chain::{causal_chain, ChainError, ChainLink};
pub use memory::MemoryLog;

use chrono::{DateTime, Utc};
use concord_types::{ActionRecord, Command, CommandId, ConceptId, Event, Payload, State, SyncId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors from a causal log backend
#[derive(Debug, Error)]
pub enum LogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The replacement file could not be moved into place
    #[error("Failed to persist {0}")]
    Persist(String),

    #[error("Command {0} not found")]
    UnknownCommand(CommandId),
}

/// A concept as registered, with its initial state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptRecord {
    pub id: ConceptId,
    pub name: String,
    pub initial_state: State,
    pub registered_at: DateTime<Utc>,
}

impl ConceptRecord {
    pub fn new(id: ConceptId, name: &str, state: &State) -> Self {
        Self {
            id,
            name: name.to_string(),
            initial_state: state.clone(),
            registered_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub id: SyncId,
    pub name: String,
    pub registered_at: DateTime<Utc>,
}

impl SyncRecord {
    pub fn new(id: SyncId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            registered_at: Utc::now(),
        }
    }
}

/// Latest state a concept published for external readers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedState {
    pub state: State,
    pub published_at: DateTime<Utc>,
}

impl PublishedState {
    pub fn now(state: &State) -> Self {
        Self {
            state: state.clone(),
            published_at: Utc::now(),
        }
    }
}

/// Append-only record of a run plus the external command bus
pub trait CausalLog: Send + Sync {
    fn record_concept(&self, id: ConceptId, name: &str, state: &State) -> Result<(), LogError>;

    fn record_synchronization(&self, id: SyncId, name: &str) -> Result<(), LogError>;

    fn record_action(&self, action: &ActionRecord) -> Result<(), LogError>;

    fn record_event(&self, event: &Event) -> Result<(), LogError>;

    /// Overwrite the published snapshot for `name`
    fn publish_state(&self, name: &str, state: &State) -> Result<(), LogError>;

    /// Push published snapshots to storage, for backends that batch them
    fn flush_published(&self) -> Result<(), LogError> {
        Ok(())
    }

    fn published_state(&self, name: &str) -> Option<PublishedState>;

    fn published_states(&self) -> BTreeMap<String, PublishedState>;

    /// Append a pending command to the bus
    fn enqueue_command(
        &self,
        target: &str,
        action: &str,
        payload: Payload,
    ) -> Result<CommandId, LogError>;

    /// Reload the bus from storage and return pending commands, oldest first
    fn pending_commands(&self) -> Result<Vec<Command>, LogError>;

    /// Resolve a command as `done`, or `error` when a message is given
    fn mark_command_done(&self, id: CommandId, error: Option<String>) -> Result<(), LogError>;

    fn save(&self) -> Result<(), LogError>;
}

impl<L: CausalLog + ?Sized> CausalLog for Arc<L> {
    fn record_concept(&self, id: ConceptId, name: &str, state: &State) -> Result<(), LogError> {
        (**self).record_concept(id, name, state)
    }

    fn record_synchronization(&self, id: SyncId, name: &str) -> Result<(), LogError> {
        (**self).record_synchronization(id, name)
    }

    fn record_action(&self, action: &ActionRecord) -> Result<(), LogError> {
        (**self).record_action(action)
    }

    fn record_event(&self, event: &Event) -> Result<(), LogError> {
        (**self).record_event(event)
    }

    fn publish_state(&self, name: &str, state: &State) -> Result<(), LogError> {
        (**self).publish_state(name, state)
    }

    fn flush_published(&self) -> Result<(), LogError> {
        (**self).flush_published()
    }

    fn published_state(&self, name: &str) -> Option<PublishedState> {
        (**self).published_state(name)
    }

    fn published_states(&self) -> BTreeMap<String, PublishedState> {
        (**self).published_states()
    }

    fn enqueue_command(
        &self,
        target: &str,
        action: &str,
        payload: Payload,
    ) -> Result<CommandId, LogError> {
        (**self).enqueue_command(target, action, payload)
    }

    fn pending_commands(&self) -> Result<Vec<Command>, LogError> {
        (**self).pending_commands()
    }

    fn mark_command_done(&self, id: CommandId, error: Option<String>) -> Result<(), LogError> {
        (**self).mark_command_done(id, error)
    }

    fn save(&self) -> Result<(), LogError> {
        (**self).save()
    }
}
