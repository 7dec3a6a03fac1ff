//! Walking causal chains
//!
//! Starting from an event, follow causal parents back through the actions
//! that emitted each event and the events that triggered each action, until
//! reaching an externally dispatched action (or an out-of-band event with no
//! parent).

use concord_types::{ActionId, ActionRecord, CausalRef, Event, EventId};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("Event {0} not found in the log")]
    UnknownEvent(EventId),

    #[error("Action {0} not found in the log")]
    UnknownAction(ActionId),

    #[error("Causal chain revisits {0}")]
    Cycle(Uuid),
}

/// One hop of a causal chain
#[derive(Debug, Clone, PartialEq)]
pub enum ChainLink {
    Event(Event),
    Action(ActionRecord),
}

impl ChainLink {
    pub fn id(&self) -> Uuid {
        match self {
            ChainLink::Event(event) => event.id().uuid(),
            ChainLink::Action(action) => action.id.uuid(),
        }
    }
}

/// The chain from `from` back to its root, starting with `from` itself
pub fn causal_chain(
    events: &[Event],
    actions: &[ActionRecord],
    from: EventId,
) -> Result<Vec<ChainLink>, ChainError> {
    let events: HashMap<EventId, &Event> = events.iter().map(|e| (e.id(), e)).collect();
    let actions: HashMap<ActionId, &ActionRecord> = actions.iter().map(|a| (a.id, a)).collect();

    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut next = Some(CausalRef::Event(from));

    while let Some(reference) = next.take() {
        if !seen.insert(reference.uuid()) {
            return Err(ChainError::Cycle(reference.uuid()));
        }
        match reference {
            CausalRef::Event(id) => {
                let event = events.get(&id).ok_or(ChainError::UnknownEvent(id))?;
                next = event.causal_parent();
                chain.push(ChainLink::Event((*event).clone()));
            }
            CausalRef::Action(id) => {
                let action = actions.get(&id).ok_or(ChainError::UnknownAction(id))?;
                next = action.triggered_by.map(CausalRef::Event);
                chain.push(ChainLink::Action((*action).clone()));
            }
        }
    }

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_types::ConceptId;
    use serde_json::json;

    #[test]
    fn test_chain_ends_at_root_action() {
        let concept = ConceptId::new();
        let root = ActionRecord::root("increment", concept);
        let first = Event::new("Incremented", json!({}), concept).caused_by(root.id);
        let cascade = ActionRecord::triggered("increment", concept, first.id(), "Loop");
        let second = Event::new("Incremented", json!({}), concept).caused_by(cascade.id);

        let chain = causal_chain(
            &[first.clone(), second.clone()],
            &[root.clone(), cascade.clone()],
            second.id(),
        )
        .unwrap();

        let ids: Vec<Uuid> = chain.iter().map(ChainLink::id).collect();
        assert_eq!(
            ids,
            vec![second.id().uuid(), cascade.id.uuid(), first.id().uuid(), root.id.uuid()]
        );
        assert!(matches!(chain.last(), Some(ChainLink::Action(a)) if a.is_root()));
    }

    #[test]
    fn test_missing_links_are_reported() {
        let concept = ConceptId::new();
        let orphan = Event::new("Lost", json!({}), concept).caused_by(ActionId::new());
        let err = causal_chain(&[orphan.clone()], &[], orphan.id()).unwrap_err();
        assert!(matches!(err, ChainError::UnknownAction(_)));

        let err = causal_chain(&[], &[], EventId::new()).unwrap_err();
        assert!(matches!(err, ChainError::UnknownEvent(_)));
    }

    #[test]
    fn test_out_of_band_event_is_its_own_root() {
        let event = Event::new("Spawned", json!({}), ConceptId::new());
        let chain = causal_chain(&[event.clone()], &[], event.id()).unwrap();
        assert_eq!(chain.len(), 1);
    }
}
