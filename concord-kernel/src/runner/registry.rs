//! Concept arena
//!
//! Concepts live in a dense slot table. Lookups by id or by name go through
//! side indexes into that table, so the runner can hand out `&mut Concept`
//! without any shared ownership. Concepts are never removed, so slots are
//! stable for the arena's lifetime.

use crate::concept::Concept;
use crate::sync::ConceptRef;
use concord_types::{ConceptId, GlobalState};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ConceptArena {
    slots: Vec<Concept>,
    by_id: HashMap<ConceptId, usize>,
    by_name: HashMap<String, usize>,
}

impl ConceptArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a concept; a later concept with the same name shadows the
    /// earlier one for name lookups
    pub fn insert(&mut self, concept: Concept) -> ConceptId {
        let id = concept.id();
        let slot = match self.by_id.get(&id) {
            Some(&slot) => {
                self.slots[slot] = concept;
                slot
            }
            None => {
                self.slots.push(concept);
                self.slots.len() - 1
            }
        };
        self.by_id.insert(id, slot);
        self.by_name.insert(self.slots[slot].name().to_string(), slot);
        id
    }

    pub fn get(&self, id: ConceptId) -> Option<&Concept> {
        self.by_id.get(&id).map(|&slot| &self.slots[slot])
    }

    pub fn get_mut(&mut self, id: ConceptId) -> Option<&mut Concept> {
        let slot = *self.by_id.get(&id)?;
        self.slots.get_mut(slot)
    }

    pub fn id_by_name(&self, name: &str) -> Option<ConceptId> {
        self.by_name.get(name).map(|&slot| self.slots[slot].id())
    }

    /// Resolve a reference to a registered concept id
    pub fn resolve(&self, reference: &ConceptRef) -> Option<ConceptId> {
        match reference {
            ConceptRef::Id(id) => self.by_id.contains_key(id).then_some(*id),
            ConceptRef::Name(name) => self.id_by_name(name),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Concept> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Concept> {
        self.slots.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Deep copy of every concept's state, with names bound as
    /// [`id_by_name`](Self::id_by_name) resolves them
    pub fn snapshot(&self) -> GlobalState {
        let mut global = GlobalState::new();
        for concept in &self.slots {
            global.insert(concept.id(), concept.name(), concept.snapshot());
        }
        for (name, &slot) in &self.by_name {
            global.bind_name(name.clone(), self.slots[slot].id());
        }
        global
    }
}
