//! Global state snapshots
//!
//! A [`GlobalState`] is a deep copy of every registered concept's state at
//! one instant. It is what synchronization conditions and invariants read,
//! and what the runner's history stores.

use crate::ids::ConceptId;
use crate::State;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// State of one concept, tagged with its name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptSnapshot {
    pub name: String,
    pub state: State,
}

/// Deep copy of every concept's state, keyed by concept id
///
/// Names are bound separately: when two concepts share a name, the binding
/// points at the one inserted (or explicitly bound) last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalState {
    concepts: BTreeMap<ConceptId, ConceptSnapshot>,
    #[serde(default)]
    names: BTreeMap<String, ConceptId>,
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one concept's entry and bind its name to it
    pub fn insert(&mut self, id: ConceptId, name: impl Into<String>, state: State) {
        let name = name.into();
        self.names.insert(name.clone(), id);
        self.concepts.insert(id, ConceptSnapshot { name, state });
    }

    /// Point `name` at `id`, overriding the binding made by [`insert`](Self::insert)
    pub fn bind_name(&mut self, name: impl Into<String>, id: ConceptId) {
        self.names.insert(name.into(), id);
    }

    /// Id currently bound to `name`
    pub fn id_of(&self, name: &str) -> Option<ConceptId> {
        self.names.get(name).copied()
    }

    /// State of the concept with the given id
    pub fn get(&self, id: &ConceptId) -> Option<&State> {
        self.concepts.get(id).map(|snap| &snap.state)
    }

    /// Name of the concept with the given id
    pub fn name_of(&self, id: &ConceptId) -> Option<&str> {
        self.concepts.get(id).map(|snap| snap.name.as_str())
    }

    /// State of the concept currently bound to `name`
    pub fn by_name(&self, name: &str) -> Option<&State> {
        self.id_of(name).and_then(|id| self.get(&id))
    }

    /// Resolve a dotted path such as `Counter.value` or `Player.pos.x`
    /// (concept name first, then nested object keys)
    pub fn lookup(&self, path: &str) -> Option<&serde_json::Value> {
        let mut parts = path.split('.');
        let concept = parts.next()?;
        let state = self.by_name(concept)?;
        let first = parts.next()?;
        let mut current = state.get(first)?;
        for key in parts {
            current = current.as_object()?.get(key)?;
        }
        Some(current)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConceptId, &ConceptSnapshot)> {
        self.concepts.iter()
    }

    /// Iterate `(name, state)` pairs for every bound name
    ///
    /// Concepts shadowed by a later registration under the same name are
    /// skipped.
    pub fn by_names(&self) -> impl Iterator<Item = (&str, &State)> {
        self.names
            .iter()
            .filter_map(|(name, id)| self.get(id).map(|state| (name.as_str(), state)))
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(value: serde_json::Value) -> State {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_lookup_nested_path() {
        let mut global = GlobalState::new();
        global.insert(
            ConceptId::new(),
            "Player",
            state(json!({"hp": 3, "pos": {"x": 4, "y": 5}})),
        );

        assert_eq!(global.lookup("Player.hp"), Some(&json!(3)));
        assert_eq!(global.lookup("Player.pos.x"), Some(&json!(4)));
        assert_eq!(global.lookup("Player.pos.z"), None);
        assert_eq!(global.lookup("Player"), None);
        assert_eq!(global.lookup("Enemy.hp"), None);
    }

    #[test]
    fn test_get_by_id_and_name() {
        let mut global = GlobalState::new();
        let id = ConceptId::new();
        global.insert(id, "Counter", state(json!({"value": 1})));

        assert_eq!(global.get(&id), global.by_name("Counter"));
        assert_eq!(global.name_of(&id), Some("Counter"));
        assert_eq!(global.len(), 1);
    }

    #[test]
    fn test_shared_name_resolves_to_latest_binding() {
        let mut global = GlobalState::new();
        let first = ConceptId::new();
        let second = ConceptId::new();
        global.insert(first, "Counter", state(json!({"value": 1})));
        global.insert(second, "Counter", state(json!({"value": 2})));

        assert_eq!(global.id_of("Counter"), Some(second));
        assert_eq!(global.lookup("Counter.value"), Some(&json!(2)));
        assert_eq!(global.by_names().count(), 1);
        // The shadowed concept is still reachable by id
        assert_eq!(global.get(&first).and_then(|s| s.get("value")), Some(&json!(1)));

        global.bind_name("Counter", first);
        assert_eq!(global.lookup("Counter.value"), Some(&json!(1)));
    }
}
