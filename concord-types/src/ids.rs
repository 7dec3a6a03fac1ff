//! Identity types
//!
//! Every id is a v4 UUID wrapped in a newtype so concept, event, action,
//! synchronization and command ids can't be mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new unique id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the underlying UUID
            pub fn uuid(&self) -> Uuid {
                self.0
            }

            /// Abbreviated form for log lines
            pub fn short(&self) -> String {
                format!("{}:{}", $prefix, &self.0.simple().to_string()[..8])
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Concept identifier, unique for the lifetime of the process
    ConceptId,
    "concept"
);

uuid_id!(
    /// Event identifier
    EventId,
    "evt"
);

uuid_id!(
    /// Identifier of one action execution (not of the action name)
    ActionId,
    "act"
);

uuid_id!(
    /// Synchronization identifier
    SyncId,
    "sync"
);

uuid_id!(
    /// Command bus entry identifier
    CommandId,
    "cmd"
);

/// The direct cause of an event: the action that emitted it, or the event
/// whose handling failed (for failure events)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum CausalRef {
    Action(ActionId),
    Event(EventId),
}

impl CausalRef {
    /// The referenced id as a plain UUID
    pub fn uuid(&self) -> Uuid {
        match self {
            CausalRef::Action(id) => id.uuid(),
            CausalRef::Event(id) => id.uuid(),
        }
    }
}

impl fmt::Display for CausalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CausalRef::Action(id) => write!(f, "{}", id.short()),
            CausalRef::Event(id) => write!(f, "{}", id.short()),
        }
    }
}

impl From<ActionId> for CausalRef {
    fn from(id: ActionId) -> Self {
        CausalRef::Action(id)
    }
}

impl From<EventId> for CausalRef {
    fn from(id: EventId) -> Self {
        CausalRef::Event(id)
    }
}
