//! The journal document: everything a run recorded

use crate::atomic;
use concord_kernel::{causal_chain, ChainError, ChainLink, ConceptRecord, LogError, SyncRecord};
use concord_types::{ActionRecord, ConceptId, Event, EventId};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Journal {
    #[serde(default)]
    pub concepts: Vec<ConceptRecord>,
    #[serde(default)]
    pub synchronizations: Vec<SyncRecord>,
    #[serde(default)]
    pub actions: Vec<ActionRecord>,
    #[serde(default)]
    pub events: Vec<Event>,
}

/// Record counts for a journal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JournalSummary {
    pub concepts: usize,
    pub synchronizations: usize,
    pub actions: usize,
    pub events: usize,
    pub failures: usize,
}

impl Journal {
    /// Load a journal file; a missing file is an empty journal
    pub fn load(path: &Path) -> Result<Self, LogError> {
        Ok(atomic::read_json(path)?.unwrap_or_default())
    }

    pub fn save(&self, path: &Path) -> Result<(), LogError> {
        atomic::write_json(path, self)
    }

    pub fn summary(&self) -> JournalSummary {
        JournalSummary {
            concepts: self.concepts.len(),
            synchronizations: self.synchronizations.len(),
            actions: self.actions.len(),
            events: self.events.len(),
            failures: self.events.iter().filter(|e| e.is_failure()).count(),
        }
    }

    /// Causal chain from `event` back to the action that started it
    pub fn trace(&self, event: EventId) -> Result<Vec<ChainLink>, ChainError> {
        causal_chain(&self.events, &self.actions, event)
    }

    /// Name of a concept recorded in this journal
    pub fn concept_name(&self, id: ConceptId) -> Option<&str> {
        self.concepts
            .iter()
            .rev()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_counts_failures() {
        let source = ConceptId::new();
        let ok = Event::new("Moved", json!({}), source);
        let failed = Event::failure(&ok, source, "boom");
        let journal = Journal {
            concepts: vec![ConceptRecord::new(source, "Player", &Default::default())],
            events: vec![ok, failed],
            ..Journal::default()
        };

        let summary = journal.summary();
        assert_eq!(summary.concepts, 1);
        assert_eq!(summary.events, 2);
        assert_eq!(summary.failures, 1);
        assert_eq!(journal.concept_name(source), Some("Player"));
    }
}
