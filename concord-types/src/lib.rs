//! Shared types for concord
//!
//! This crate provides the leaf value types used across the concord
//! workspace: identifiers, events, global state snapshots and command bus
//! records. None of them carry behavior beyond construction and lookup.

pub mod command;
pub mod event;
pub mod ids;
pub mod state;

pub use command::{Command, CommandStatus};
pub use event::{ActionRecord, Event, EventStatus, FAILURE_EVENT};
pub use ids::{ActionId, CausalRef, CommandId, ConceptId, EventId, SyncId};
pub use state::{ConceptSnapshot, GlobalState};

/// Structured payload carried by actions and events
pub type Payload = serde_json::Value;

/// A concept's open-ended key/value state bag
pub type State = serde_json::Map<String, serde_json::Value>;
