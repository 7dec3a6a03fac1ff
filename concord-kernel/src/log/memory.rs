//! In-memory causal log, for tests and embedding

use super::{CausalLog, ConceptRecord, LogError, PublishedState, SyncRecord};
use concord_types::{ActionRecord, Command, CommandId, ConceptId, Event, Payload, State, SyncId};
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct Inner {
    concepts: Vec<ConceptRecord>,
    synchronizations: Vec<SyncRecord>,
    actions: Vec<ActionRecord>,
    events: Vec<Event>,
    published: BTreeMap<String, PublishedState>,
    commands: Vec<Command>,
    saves: usize,
    fail_saves: bool,
}

/// Causal log that keeps everything in memory. Thread-safe.
///
/// Share it with the runner through an `Arc` to inspect what was recorded.
#[derive(Debug, Default)]
pub struct MemoryLog {
    inner: Mutex<Inner>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `save` fail, to exercise log-failure reporting
    pub fn fail_saves(&self, fail: bool) {
        self.inner.lock().fail_saves = fail;
    }

    pub fn concepts(&self) -> Vec<ConceptRecord> {
        self.inner.lock().concepts.clone()
    }

    pub fn synchronizations(&self) -> Vec<SyncRecord> {
        self.inner.lock().synchronizations.clone()
    }

    pub fn actions(&self) -> Vec<ActionRecord> {
        self.inner.lock().actions.clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().events.clone()
    }

    /// Every command on the bus, whatever its status
    pub fn commands(&self) -> Vec<Command> {
        self.inner.lock().commands.clone()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.inner.lock().saves
    }
}

impl CausalLog for MemoryLog {
    fn record_concept(&self, id: ConceptId, name: &str, state: &State) -> Result<(), LogError> {
        self.inner
            .lock()
            .concepts
            .push(ConceptRecord::new(id, name, state));
        Ok(())
    }

    fn record_synchronization(&self, id: SyncId, name: &str) -> Result<(), LogError> {
        self.inner
            .lock()
            .synchronizations
            .push(SyncRecord::new(id, name));
        Ok(())
    }

    fn record_action(&self, action: &ActionRecord) -> Result<(), LogError> {
        self.inner.lock().actions.push(action.clone());
        Ok(())
    }

    fn record_event(&self, event: &Event) -> Result<(), LogError> {
        self.inner.lock().events.push(event.clone());
        Ok(())
    }

    fn publish_state(&self, name: &str, state: &State) -> Result<(), LogError> {
        self.inner
            .lock()
            .published
            .insert(name.to_string(), PublishedState::now(state));
        Ok(())
    }

    fn published_state(&self, name: &str) -> Option<PublishedState> {
        self.inner.lock().published.get(name).cloned()
    }

    fn published_states(&self) -> BTreeMap<String, PublishedState> {
        self.inner.lock().published.clone()
    }

    fn enqueue_command(
        &self,
        target: &str,
        action: &str,
        payload: Payload,
    ) -> Result<CommandId, LogError> {
        let command = Command::new(target, action, payload);
        let id = command.id;
        self.inner.lock().commands.push(command);
        Ok(id)
    }

    fn pending_commands(&self) -> Result<Vec<Command>, LogError> {
        let inner = self.inner.lock();
        let mut pending: Vec<Command> = inner
            .commands
            .iter()
            .filter(|c| c.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|c| c.created_at);
        Ok(pending)
    }

    fn mark_command_done(&self, id: CommandId, error: Option<String>) -> Result<(), LogError> {
        let mut inner = self.inner.lock();
        let command = inner
            .commands
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(LogError::UnknownCommand(id))?;
        command.resolve(error);
        Ok(())
    }

    fn save(&self) -> Result<(), LogError> {
        let mut inner = self.inner.lock();
        if inner.fail_saves {
            return Err(LogError::Persist("memory log (saves disabled)".to_string()));
        }
        inner.saves += 1;
        Ok(())
    }
}
