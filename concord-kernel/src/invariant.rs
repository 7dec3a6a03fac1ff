//! Named predicates over the global state, checked after every tick

use concord_types::GlobalState;
use std::fmt;
use std::sync::Arc;

type CheckFn = Arc<dyn Fn(&GlobalState) -> bool + Send + Sync>;

/// A property that must hold at the end of every tick
#[derive(Clone)]
pub struct Invariant {
    name: String,
    description: Option<String>,
    check: CheckFn,
}

impl Invariant {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&GlobalState) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            check: Arc::new(check),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Evaluate against a snapshot
    pub fn check(&self, state: &GlobalState) -> bool {
        (self.check)(state)
    }
}

impl fmt::Debug for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invariant")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_types::ConceptId;
    use serde_json::json;

    #[test]
    fn test_check_reads_snapshot() {
        let inv = Invariant::new("non-negative", |s| {
            s.lookup("Counter.value")
                .and_then(|v| v.as_i64())
                .is_some_and(|v| v >= 0)
        })
        .with_description("Counter.value >= 0");

        let mut state = GlobalState::new();
        state.insert(
            ConceptId::new(),
            "Counter",
            json!({"value": 1}).as_object().cloned().unwrap(),
        );
        assert!(inv.check(&state));
        assert!(!inv.check(&GlobalState::new()));
        assert_eq!(inv.description(), Some("Counter.value >= 0"));
    }
}
