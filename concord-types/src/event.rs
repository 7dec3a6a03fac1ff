//! Events and action records
//!
//! Events are immutable once built. The only way to change one is to
//! consume it and produce a restamped copy via [`Event::caused_by`], which
//! is how the runner attaches causal parents after an action completes.

use crate::ids::{ActionId, CausalRef, ConceptId, EventId};
use crate::Payload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// Name given to every failure event
pub const FAILURE_EVENT: &str = "Failure";

/// Outcome carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStatus {
    Success,
    Error,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventStatus::Success => write!(f, "Success"),
            EventStatus::Error => write!(f, "Error"),
        }
    }
}

/// Something a concept did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    name: String,
    payload: Payload,
    source: ConceptId,
    timestamp: DateTime<Utc>,
    causal_parent: Option<CausalRef>,
    status: EventStatus,
}

impl Event {
    /// Create a successful event with no causal parent yet
    pub fn new(name: impl Into<String>, payload: Payload, source: ConceptId) -> Self {
        Self {
            id: EventId::new(),
            name: name.into(),
            payload,
            source,
            timestamp: Utc::now(),
            causal_parent: None,
            status: EventStatus::Success,
        }
    }

    /// Build the failure event for `failed`, whose handling raised `message`
    /// inside the concept `source`
    pub fn failure(failed: &Event, source: ConceptId, message: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            name: FAILURE_EVENT.to_string(),
            payload: json!({
                "error": message.into(),
                "original_event_id": failed.id.to_string(),
            }),
            source,
            timestamp: Utc::now(),
            causal_parent: Some(CausalRef::Event(failed.id)),
            status: EventStatus::Error,
        }
    }

    /// Return a copy of this event whose causal parent is `parent`
    pub fn caused_by(mut self, parent: impl Into<CausalRef>) -> Self {
        self.causal_parent = Some(parent.into());
        self
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn source(&self) -> ConceptId {
        self.source
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn causal_parent(&self) -> Option<CausalRef> {
        self.causal_parent
    }

    pub fn status(&self) -> EventStatus {
        self.status
    }

    /// Check if this is a failure event
    pub fn is_failure(&self) -> bool {
        self.status == EventStatus::Error && self.name == FAILURE_EVENT
    }

    /// Look up a top-level field of an object payload
    pub fn field(&self, key: &str) -> Option<&Payload> {
        self.payload.as_object().and_then(|map| map.get(key))
    }

    /// Error message and failed event id, if this is a failure event
    pub fn failure_info(&self) -> Option<(&str, EventId)> {
        if !self.is_failure() {
            return None;
        }
        let message = self.field("error")?.as_str()?;
        let original = self.field("original_event_id")?.as_str()?.parse().ok()?;
        Some((message, original))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Event {} from {} status={}>",
            self.name,
            self.source.short(),
            self.status
        )
    }
}

/// One action execution, as recorded in the causal log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: ActionId,
    pub action: String,
    pub concept: ConceptId,
    /// Event that triggered the action; `None` for external dispatches
    pub triggered_by: Option<EventId>,
    /// Synchronization that matched, if any
    pub sync: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ActionRecord {
    /// Record an externally dispatched action
    pub fn root(action: impl Into<String>, concept: ConceptId) -> Self {
        Self {
            id: ActionId::new(),
            action: action.into(),
            concept,
            triggered_by: None,
            sync: None,
            timestamp: Utc::now(),
        }
    }

    /// Record an action invoked by a synchronization
    pub fn triggered(
        action: impl Into<String>,
        concept: ConceptId,
        event: EventId,
        sync: impl Into<String>,
    ) -> Self {
        Self {
            id: ActionId::new(),
            action: action.into(),
            concept,
            triggered_by: Some(event),
            sync: Some(sync.into()),
            timestamp: Utc::now(),
        }
    }

    /// Whether this action was dispatched from outside the kernel
    pub fn is_root(&self) -> bool {
        self.triggered_by.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_event_links_to_failed_event() {
        let source = ConceptId::new();
        let original = Event::new("Moved", json!({"x": 1}), source);
        let failure = Event::failure(&original, source, "boom");

        assert!(failure.is_failure());
        assert_eq!(failure.status(), EventStatus::Error);
        assert_eq!(failure.causal_parent(), Some(CausalRef::Event(original.id())));

        let (message, failed_id) = failure.failure_info().unwrap();
        assert_eq!(message, "boom");
        assert_eq!(failed_id, original.id());
    }

    #[test]
    fn test_caused_by_keeps_identity() {
        let event = Event::new("Tick", json!({}), ConceptId::new());
        let id = event.id();
        let action = ActionId::new();
        let stamped = event.caused_by(action);
        assert_eq!(stamped.id(), id);
        assert_eq!(stamped.causal_parent(), Some(CausalRef::Action(action)));
    }

    #[test]
    fn test_regular_event_has_no_failure_info() {
        let event = Event::new(FAILURE_EVENT, json!({"error": "x"}), ConceptId::new());
        assert!(!event.is_failure());
        assert!(event.failure_info().is_none());
    }
}
