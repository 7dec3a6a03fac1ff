//! Concepts: independently owned state machines
//!
//! A concept owns a key/value state bag, a table of named actions and a
//! buffer of pending events. Actions are the only code that mutates the
//! state; the runner only ever reads snapshots, restores them on replay, and
//! drains the pending buffer.
//!
//! # Example
//!
//! ```
//! use concord_kernel::{Concept, ConceptError};
//! use serde::Deserialize;
//! use serde_json::json;
//!
//! #[derive(Deserialize)]
//! struct IncrementBy {
//!     by: i64,
//! }
//!
//! let mut counter = Concept::builder("Counter")
//!     .field("value", 0)
//!     .typed_action("increment", |ctx, payload: IncrementBy| {
//!         let value = ctx.get::<i64>("value").unwrap_or(0) + payload.by;
//!         ctx.set("value", value)?;
//!         ctx.emit("Incremented", json!({ "value": value }))?;
//!         Ok::<(), ConceptError>(())
//!     })
//!     .build();
//!
//! counter.dispatch("increment", json!({ "by": 5 })).unwrap();
//! assert_eq!(counter.snapshot()["value"], json!(5));
//! assert_eq!(counter.collect_events().len(), 1);
//! ```

use crate::error::ConceptError;
use concord_types::{CausalRef, ConceptId, Event, EventId, Payload, State};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

type ActionFn = Box<dyn Fn(&mut ConceptContext, Payload) -> Result<(), ConceptError> + Send + Sync>;
type SchemaFn = Box<dyn Fn(Payload) -> Result<Payload, serde_json::Error> + Send + Sync>;

/// The part of a concept that action bodies can see
///
/// Holds the state bag and the pending-event buffer. Events emitted here are
/// buffered; nothing is delivered until the runner collects them.
pub struct ConceptContext {
    id: ConceptId,
    name: String,
    state: State,
    pending: Vec<Event>,
    schemas: HashMap<String, SchemaFn>,
}

impl ConceptContext {
    pub fn id(&self) -> ConceptId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read-only view of the state bag
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Direct access to the state bag
    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    /// Decode a state field, `None` if it's missing or has another shape
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.state
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Encode and store a state field
    pub fn set(&mut self, key: &str, value: impl Serialize) -> Result<(), ConceptError> {
        let encoded = serde_json::to_value(value).map_err(|source| ConceptError::StateEncoding {
            key: key.to_string(),
            source,
        })?;
        self.state.insert(key.to_string(), encoded);
        Ok(())
    }

    /// Queue an event with no causal parent
    pub fn emit(&mut self, name: &str, payload: impl Serialize) -> Result<EventId, ConceptError> {
        self.emit_with_parent(name, payload, None)
    }

    /// Queue an event
    ///
    /// If a schema is declared for `name`, the payload is coerced through it
    /// and a mismatch fails here, before anything is buffered. Undeclared
    /// event names are emitted as-is.
    pub fn emit_with_parent(
        &mut self,
        name: &str,
        payload: impl Serialize,
        causal_parent: Option<CausalRef>,
    ) -> Result<EventId, ConceptError> {
        let invalid = |source| ConceptError::InvalidEventPayload {
            event: name.to_string(),
            source,
        };
        let mut payload = serde_json::to_value(payload).map_err(invalid)?;
        if let Some(schema) = self.schemas.get(name) {
            payload = schema(payload).map_err(invalid)?;
        }

        let mut event = Event::new(name, payload, self.id);
        if let Some(parent) = causal_parent {
            event = event.caused_by(parent);
        }
        let id = event.id();
        self.pending.push(event);
        Ok(id)
    }
}

/// An independently owned state machine exposing named actions
pub struct Concept {
    context: ConceptContext,
    actions: BTreeMap<String, ActionFn>,
}

impl Concept {
    /// Create a concept with empty state and no actions
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    /// Start building a concept
    pub fn builder(name: impl Into<String>) -> ConceptBuilder {
        ConceptBuilder::new(name)
    }

    pub fn id(&self) -> ConceptId {
        self.context.id
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    /// Check if an action with this name exists
    pub fn has_action(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    /// Names of all actions, sorted
    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Run a named action
    pub fn dispatch(&mut self, action: &str, payload: Payload) -> Result<(), ConceptError> {
        let body = self
            .actions
            .get(action)
            .ok_or_else(|| ConceptError::UnknownAction {
                concept: self.context.name.clone(),
                action: action.to_string(),
            })?;
        body(&mut self.context, payload)
    }

    /// Queue an event from outside an action body (out-of-band producers)
    pub fn emit(
        &mut self,
        name: &str,
        payload: impl Serialize,
        causal_parent: Option<CausalRef>,
    ) -> Result<EventId, ConceptError> {
        self.context.emit_with_parent(name, payload, causal_parent)
    }

    /// Take every pending event, leaving the buffer empty
    pub fn collect_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.context.pending)
    }

    /// Check if events are waiting to be collected
    pub fn has_pending_events(&self) -> bool {
        !self.context.pending.is_empty()
    }

    /// Deep copy of the current state
    pub fn snapshot(&self) -> State {
        self.context.state.clone()
    }

    /// Replace the state with a deep copy of `snapshot`
    pub fn restore(&mut self, snapshot: &State) {
        self.context.state = snapshot.clone();
    }
}

impl fmt::Debug for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Concept")
            .field("id", &self.context.id)
            .field("name", &self.context.name)
            .field("state", &self.context.state)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("pending", &self.context.pending.len())
            .finish()
    }
}

/// Builder for [`Concept`]
pub struct ConceptBuilder {
    name: String,
    state: State,
    actions: BTreeMap<String, ActionFn>,
    schemas: HashMap<String, SchemaFn>,
}

impl ConceptBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: State::new(),
            actions: BTreeMap::new(),
            schemas: HashMap::new(),
        }
    }

    /// Replace the initial state bag
    pub fn state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    /// Set one initial state field
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Payload>) -> Self {
        self.state.insert(key.into(), value.into());
        self
    }

    /// Register an action that receives the raw payload
    pub fn action<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut ConceptContext, Payload) -> Result<(), ConceptError> + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Box::new(body));
        self
    }

    /// Register an action with a structured payload type
    ///
    /// The untyped payload is coerced into `T` before the body runs; a
    /// mismatch fails with [`ConceptError::InvalidActionPayload`] and the
    /// body is never called.
    pub fn typed_action<T, F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        T: DeserializeOwned,
        F: Fn(&mut ConceptContext, T) -> Result<(), ConceptError> + Send + Sync + 'static,
    {
        let name = name.into();
        let action = name.clone();
        self.actions.insert(
            name,
            Box::new(move |ctx, payload| {
                let typed = serde_json::from_value::<T>(payload).map_err(|source| {
                    ConceptError::InvalidActionPayload {
                        action: action.clone(),
                        source,
                    }
                })?;
                body(ctx, typed)
            }),
        );
        self
    }

    /// Declare the payload shape of an event
    ///
    /// Emitted payloads are decoded into `T` and re-encoded, so extra fields
    /// are dropped and serde defaults are filled in.
    pub fn event_schema<T>(mut self, event: impl Into<String>) -> Self
    where
        T: DeserializeOwned + Serialize + 'static,
    {
        self.schemas.insert(
            event.into(),
            Box::new(|payload| {
                let typed: T = serde_json::from_value(payload)?;
                serde_json::to_value(typed)
            }),
        );
        self
    }

    pub fn build(self) -> Concept {
        Concept {
            context: ConceptContext {
                id: ConceptId::new(),
                name: self.name,
                state: self.state,
                pending: Vec::new(),
                schemas: self.schemas,
            },
            actions: self.actions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Move {
        dx: i64,
        dy: i64,
    }

    #[derive(Serialize, Deserialize)]
    struct Moved {
        x: i64,
        y: i64,
    }

    fn player() -> Concept {
        Concept::builder("Player")
            .field("x", 0)
            .field("y", 0)
            .typed_action("move", |ctx, m: Move| {
                let x = ctx.get::<i64>("x").unwrap_or(0) + m.dx;
                let y = ctx.get::<i64>("y").unwrap_or(0) + m.dy;
                ctx.set("x", x)?;
                ctx.set("y", y)?;
                ctx.emit("Moved", json!({"x": x, "y": y}))?;
                Ok(())
            })
            .action("teleport_bad", |ctx, _payload| {
                ctx.emit("Moved", json!({"x": "far"}))?;
                Ok(())
            })
            .action("shout", |ctx, payload| {
                ctx.emit("Shouted", payload)?;
                Ok(())
            })
            .event_schema::<Moved>("Moved")
            .build()
    }

    #[test]
    fn test_typed_action_coerces_payload() {
        let mut p = player();
        p.dispatch("move", json!({"dx": 2, "dy": -1})).unwrap();

        let state = p.snapshot();
        assert_eq!(state["x"], json!(2));
        assert_eq!(state["y"], json!(-1));

        let events = p.collect_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "Moved");
        assert_eq!(events[0].source(), p.id());
        assert!(!p.has_pending_events());
    }

    #[test]
    fn test_typed_action_rejects_mismatch_before_body() {
        let mut p = player();
        let err = p.dispatch("move", json!({"dx": "left"})).unwrap_err();
        assert!(matches!(err, ConceptError::InvalidActionPayload { .. }));
        assert_eq!(p.snapshot()["x"], json!(0));
        assert!(p.collect_events().is_empty());
    }

    #[test]
    fn test_unknown_action() {
        let mut p = player();
        let err = p.dispatch("fly", json!({})).unwrap_err();
        assert_eq!(err.to_string(), "Action 'fly' not found on Player");
    }

    #[test]
    fn test_event_schema_rejects_shape_mismatch() {
        let mut p = player();
        let err = p.dispatch("teleport_bad", json!({})).unwrap_err();
        assert!(matches!(err, ConceptError::InvalidEventPayload { ref event, .. } if event == "Moved"));
        assert!(p.collect_events().is_empty());
    }

    #[test]
    fn test_undeclared_event_is_emitted_as_is() {
        let mut p = player();
        p.dispatch("shout", json!({"anything": [1, 2, 3]})).unwrap();
        let events = p.collect_events();
        assert_eq!(events[0].payload(), &json!({"anything": [1, 2, 3]}));
    }

    #[test]
    fn test_emit_with_causal_parent() {
        let mut p = player();
        let parent = CausalRef::Event(EventId::new());
        p.emit("Shouted", json!({}), Some(parent)).unwrap();
        let events = p.collect_events();
        assert_eq!(events[0].causal_parent(), Some(parent));
    }

    #[test]
    fn test_restore_replaces_rather_than_merges() {
        let mut p = player();
        let before = p.snapshot();
        p.dispatch("move", json!({"dx": 1, "dy": 1})).unwrap();
        p.context.state_mut().insert("extra".into(), json!(true));

        p.restore(&before);
        assert_eq!(p.snapshot(), before);
        assert!(!p.snapshot().contains_key("extra"));
    }

    #[test]
    fn test_snapshot_is_a_deep_copy() {
        let mut p = player();
        let mut snap = p.snapshot();
        snap.insert("x".into(), json!(99));
        assert_eq!(p.snapshot()["x"], json!(0));

        p.dispatch("move", json!({"dx": 1, "dy": 0})).unwrap();
        assert_eq!(snap["x"], json!(99));
    }
}
