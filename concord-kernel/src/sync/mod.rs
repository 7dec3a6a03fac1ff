//! Synchronizations: declarative event → action rules
//!
//! This module provides:
//! - Concept references by id or by name
//! - Event patterns and deferred action invocations
//! - The [`Synchronization`] rule itself
//! - Typed `where` conditions ([`predicate`]) and rule-file loading ([`rules`])

pub mod predicate;
pub mod rules;

pub use predicate::{Condition, Expr};
pub use rules::{RuleError, RuleSet, RuleSpec};

use concord_types::{ConceptId, Event, GlobalState, Payload, SyncId};
use std::fmt;
use std::sync::Arc;

/// A reference to a concept, resolved when a rule fires
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConceptRef {
    Id(ConceptId),
    Name(String),
}

impl ConceptRef {
    /// Check whether this reference denotes the concept `id`
    ///
    /// A name matches only the concept the snapshot currently binds it to,
    /// never one shadowed by a later registration.
    pub fn matches(&self, id: ConceptId, state: &GlobalState) -> bool {
        match self {
            ConceptRef::Id(expected) => *expected == id,
            ConceptRef::Name(name) => state.id_of(name) == Some(id),
        }
    }
}

impl fmt::Display for ConceptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConceptRef::Id(id) => write!(f, "{}", id.short()),
            ConceptRef::Name(name) => f.write_str(name),
        }
    }
}

impl From<ConceptId> for ConceptRef {
    fn from(id: ConceptId) -> Self {
        ConceptRef::Id(id)
    }
}

impl From<&str> for ConceptRef {
    fn from(name: &str) -> Self {
        ConceptRef::Name(name.to_string())
    }
}

impl From<String> for ConceptRef {
    fn from(name: String) -> Self {
        ConceptRef::Name(name)
    }
}

/// The `when` half of a rule: (source concept, event name)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPattern {
    pub source: ConceptRef,
    pub event: String,
}

impl EventPattern {
    pub fn new(source: impl Into<ConceptRef>, event: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            event: event.into(),
        }
    }

    pub fn matches(&self, event: &Event, state: &GlobalState) -> bool {
        event.name() == self.event && self.source.matches(event.source(), state)
    }
}

/// Where one field of an action payload comes from
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSource {
    Literal(Payload),
    /// Dotted path into the triggering event's payload
    EventField(String),
}

impl FieldSource {
    /// Interpret a rule-file value: `"event.<path>"` copies from the event,
    /// anything else is a literal
    pub fn parse(value: Payload) -> Self {
        match value.as_str().and_then(|s| s.strip_prefix("event.")) {
            Some(path) => FieldSource::EventField(path.to_string()),
            None => FieldSource::Literal(value),
        }
    }

    fn resolve(&self, event: &Event) -> Payload {
        match self {
            FieldSource::Literal(value) => value.clone(),
            FieldSource::EventField(path) => {
                let mut current = Some(event.payload());
                for key in path.split('.') {
                    current = current.and_then(|v| v.as_object()).and_then(|m| m.get(key));
                }
                current.cloned().unwrap_or(Payload::Null)
            }
        }
    }
}

type MapperFn = Arc<dyn Fn(&Event) -> Payload + Send + Sync>;

/// Builds an action payload from the triggering event
#[derive(Clone)]
pub enum PayloadMapper {
    /// Build an object field by field; missing event fields become `null`
    Fields(Vec<(String, FieldSource)>),
    /// Caller-supplied mapping
    Custom(MapperFn),
}

impl PayloadMapper {
    /// Empty object payload
    pub fn empty() -> Self {
        PayloadMapper::Fields(Vec::new())
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Event) -> Payload + Send + Sync + 'static,
    {
        PayloadMapper::Custom(Arc::new(f))
    }

    /// Add a literal field (only meaningful for `Fields`)
    pub fn literal(self, key: impl Into<String>, value: impl Into<Payload>) -> Self {
        self.with_field(key, FieldSource::Literal(value.into()))
    }

    /// Add a field copied from the event payload (only meaningful for `Fields`)
    pub fn from_event(self, key: impl Into<String>, path: impl Into<String>) -> Self {
        self.with_field(key, FieldSource::EventField(path.into()))
    }

    fn with_field(self, key: impl Into<String>, source: FieldSource) -> Self {
        match self {
            PayloadMapper::Fields(mut fields) => {
                fields.push((key.into(), source));
                PayloadMapper::Fields(fields)
            }
            custom => custom,
        }
    }

    pub fn map(&self, event: &Event) -> Payload {
        match self {
            PayloadMapper::Fields(fields) => Payload::Object(
                fields
                    .iter()
                    .map(|(key, source)| (key.clone(), source.resolve(event)))
                    .collect(),
            ),
            PayloadMapper::Custom(f) => f(event),
        }
    }
}

impl fmt::Debug for PayloadMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadMapper::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
            PayloadMapper::Custom(_) => f.write_str("Custom(<closure>)"),
        }
    }
}

/// A deferred call: evaluated only when its rule matches
#[derive(Debug, Clone)]
pub struct ActionInvocation {
    pub target: ConceptRef,
    pub action: String,
    pub mapper: PayloadMapper,
}

impl ActionInvocation {
    pub fn new(
        target: impl Into<ConceptRef>,
        action: impl Into<String>,
        mapper: PayloadMapper,
    ) -> Self {
        Self {
            target: target.into(),
            action: action.into(),
            mapper,
        }
    }

    /// Compute the concrete payload for a triggering event
    pub fn payload_for(&self, event: &Event) -> Payload {
        self.mapper.map(event)
    }
}

/// A named rule: `when` a pattern matches and the condition holds, `then`
/// invoke each action in order
#[derive(Debug, Clone)]
pub struct Synchronization {
    id: SyncId,
    name: String,
    when: EventPattern,
    then: Vec<ActionInvocation>,
    condition: Option<Condition>,
}

impl Synchronization {
    pub fn new(name: impl Into<String>, when: EventPattern) -> Self {
        Self {
            id: SyncId::new(),
            name: name.into(),
            when,
            then: Vec::new(),
            condition: None,
        }
    }

    /// Append an invocation to the `then` list
    pub fn invoke(mut self, invocation: ActionInvocation) -> Self {
        self.then.push(invocation);
        self
    }

    /// Set the `where` condition
    pub fn with_condition(mut self, condition: impl Into<Condition>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn id(&self) -> SyncId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &EventPattern {
        &self.when
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Every concept this rule refers to, source first
    pub fn references(&self) -> impl Iterator<Item = &ConceptRef> {
        std::iter::once(&self.when.source).chain(self.then.iter().map(|inv| &inv.target))
    }

    /// True iff the pattern matches and the condition (if any) holds
    pub fn evaluate(&self, event: &Event, state: &GlobalState) -> bool {
        self.when.matches(event, state)
            && self
                .condition
                .as_ref()
                .map_or(true, |condition| condition.holds(event, state))
    }

    /// The configured invocations, unchanged
    pub fn execute(&self, _event: &Event) -> &[ActionInvocation] {
        &self.then
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn world() -> (ConceptId, ConceptId, GlobalState) {
        let counter = ConceptId::new();
        let logger = ConceptId::new();
        let mut state = GlobalState::new();
        state.insert(counter, "Counter", json!({"value": 3}).as_object().cloned().unwrap());
        state.insert(logger, "Logger", Default::default());
        (counter, logger, state)
    }

    #[test]
    fn test_pattern_matches_by_id_and_name() {
        let (counter, logger, state) = world();
        let event = Event::new("Incremented", json!({}), counter);

        assert!(EventPattern::new(counter, "Incremented").matches(&event, &state));
        assert!(EventPattern::new("Counter", "Incremented").matches(&event, &state));
        assert!(!EventPattern::new(logger, "Incremented").matches(&event, &state));
        assert!(!EventPattern::new("Counter", "Reset").matches(&event, &state));
    }

    #[test]
    fn test_condition_gates_evaluation() {
        let (counter, _, state) = world();
        let event = Event::new("Incremented", json!({}), counter);
        let pattern = EventPattern::new("Counter", "Incremented");

        let open = Synchronization::new("open", pattern.clone());
        let gated = Synchronization::new("gated", pattern)
            .with_condition(Expr::gt(Expr::state("Counter.value"), Expr::literal(5)));

        assert!(open.evaluate(&event, &state));
        assert!(!gated.evaluate(&event, &state));
    }

    #[test]
    fn test_field_mapper() {
        let (counter, _, _) = world();
        let event = Event::new("Incremented", json!({"value": 4, "meta": {"by": 1}}), counter);
        let mapper = PayloadMapper::empty()
            .literal("by", 1)
            .from_event("seen", "value")
            .from_event("nested", "meta.by")
            .from_event("missing", "nope");

        assert_eq!(
            mapper.map(&event),
            json!({"by": 1, "seen": 4, "nested": 1, "missing": null})
        );
    }

    #[test]
    fn test_field_source_parse() {
        assert_eq!(
            FieldSource::parse(json!("event.value")),
            FieldSource::EventField("value".into())
        );
        assert_eq!(
            FieldSource::parse(json!("plain")),
            FieldSource::Literal(json!("plain"))
        );
        assert_eq!(FieldSource::parse(json!(7)), FieldSource::Literal(json!(7)));
    }

    #[test]
    fn test_execute_returns_invocations_in_order() {
        let (counter, _, _) = world();
        let sync = Synchronization::new("two", EventPattern::new("Counter", "Incremented"))
            .invoke(ActionInvocation::new("Logger", "log", PayloadMapper::empty()))
            .invoke(ActionInvocation::new(
                "Counter",
                "increment",
                PayloadMapper::custom(|_| json!({"by": 1})),
            ));
        let event = Event::new("Incremented", json!({}), counter);

        let actions: Vec<_> = sync.execute(&event).iter().map(|i| i.action.as_str()).collect();
        assert_eq!(actions, vec!["log", "increment"]);
        assert_eq!(sync.references().count(), 3);
    }
}
