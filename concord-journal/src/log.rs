//! File-backed [`CausalLog`]

use crate::bus::{bus_path_for, CommandBus};
use crate::journal::Journal;
use concord_kernel::{CausalLog, ConceptRecord, JournalConfig, LogError, PublishedState, SyncRecord};
use concord_types::{ActionRecord, Command, CommandId, ConceptId, Event, Payload, State, SyncId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

struct Inner {
    journal: Journal,
    bus: CommandBus,
    last_save: Option<Instant>,
    dirty: bool,
}

/// Causal log persisted as a JSON journal plus a command bus file
///
/// Records accumulate in memory; [`save`](CausalLog::save) writes the
/// journal atomically, at most once per `save_interval`. Bus changes
/// (enqueue, resolve, published states) are written immediately.
pub struct JournalLog {
    path: PathBuf,
    bus_path: PathBuf,
    save_interval: Duration,
    inner: Mutex<Inner>,
}

impl JournalLog {
    /// Start a fresh journal at `path`, picking up any commands already on
    /// the bus
    pub fn create(path: impl Into<PathBuf>, save_interval: Duration) -> Result<Self, LogError> {
        let path = path.into();
        let bus_path = bus_path_for(&path);
        let bus = CommandBus::load(&bus_path)?;
        info!(journal = %path.display(), bus = %bus_path.display(), "Opened journal");
        Ok(Self {
            path,
            bus_path,
            save_interval,
            inner: Mutex::new(Inner {
                journal: Journal::default(),
                bus,
                last_save: None,
                dirty: false,
            }),
        })
    }

    /// Open with a journal section from `concord.yml`; `path` is the
    /// already-resolved journal path
    pub fn from_config(path: &Path, config: &JournalConfig) -> Result<Self, LogError> {
        Self::create(path, config.save_interval())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bus_path(&self) -> &Path {
        &self.bus_path
    }

    /// Copy of everything recorded so far
    pub fn journal(&self) -> Journal {
        self.inner.lock().journal.clone()
    }

    /// Write the journal now, ignoring the save interval
    pub fn flush(&self) -> Result<(), LogError> {
        let mut inner = self.inner.lock();
        self.write_journal(&mut inner)
    }

    fn write_journal(&self, inner: &mut Inner) -> Result<(), LogError> {
        inner.journal.save(&self.path)?;
        inner.last_save = Some(Instant::now());
        inner.dirty = false;
        debug!(path = %self.path.display(), "Journal saved");
        Ok(())
    }
}

impl CausalLog for JournalLog {
    fn record_concept(&self, id: ConceptId, name: &str, state: &State) -> Result<(), LogError> {
        let mut inner = self.inner.lock();
        inner.journal.concepts.push(ConceptRecord::new(id, name, state));
        inner.dirty = true;
        Ok(())
    }

    fn record_synchronization(&self, id: SyncId, name: &str) -> Result<(), LogError> {
        let mut inner = self.inner.lock();
        inner.journal.synchronizations.push(SyncRecord::new(id, name));
        inner.dirty = true;
        Ok(())
    }

    fn record_action(&self, action: &ActionRecord) -> Result<(), LogError> {
        let mut inner = self.inner.lock();
        inner.journal.actions.push(action.clone());
        inner.dirty = true;
        Ok(())
    }

    fn record_event(&self, event: &Event) -> Result<(), LogError> {
        let mut inner = self.inner.lock();
        inner.journal.events.push(event.clone());
        inner.dirty = true;
        Ok(())
    }

    fn publish_state(&self, name: &str, state: &State) -> Result<(), LogError> {
        self.inner
            .lock()
            .bus
            .states
            .insert(name.to_string(), PublishedState::now(state));
        Ok(())
    }

    fn flush_published(&self) -> Result<(), LogError> {
        let mut inner = self.inner.lock();
        inner.bus.sync_to(&self.bus_path)
    }

    fn published_state(&self, name: &str) -> Option<PublishedState> {
        self.inner.lock().bus.states.get(name).cloned()
    }

    fn published_states(&self) -> BTreeMap<String, PublishedState> {
        self.inner.lock().bus.states.clone()
    }

    fn enqueue_command(
        &self,
        target: &str,
        action: &str,
        payload: Payload,
    ) -> Result<CommandId, LogError> {
        let mut inner = self.inner.lock();
        let id = inner.bus.enqueue(target, action, payload);
        inner.bus.sync_to(&self.bus_path)?;
        Ok(id)
    }

    fn pending_commands(&self) -> Result<Vec<Command>, LogError> {
        let mut inner = self.inner.lock();
        let on_disk = CommandBus::load(&self.bus_path)?;
        inner.bus.merge(on_disk);
        Ok(inner.bus.pending())
    }

    fn mark_command_done(&self, id: CommandId, error: Option<String>) -> Result<(), LogError> {
        let mut inner = self.inner.lock();
        inner.bus.resolve(id, error)?;
        inner.bus.sync_to(&self.bus_path)
    }

    fn save(&self) -> Result<(), LogError> {
        let mut inner = self.inner.lock();
        let throttled = inner
            .last_save
            .is_some_and(|last| last.elapsed() < self.save_interval);
        if throttled || !inner.dirty {
            return Ok(());
        }
        self.write_journal(&mut inner)
    }
}

impl Drop for JournalLog {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.dirty {
            if let Err(err) = inner.journal.save(&self.path) {
                tracing::error!(
                    path = %self.path.display(),
                    error = %err,
                    "Failed to save journal on close"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_save_throttles_until_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("execution.json");
        let log = JournalLog::create(&path, Duration::from_secs(3600)).unwrap();

        log.record_concept(ConceptId::new(), "Counter", &State::new()).unwrap();
        log.save().unwrap();
        assert_eq!(Journal::load(&path).unwrap().concepts.len(), 1);

        log.record_concept(ConceptId::new(), "Logger", &State::new()).unwrap();
        log.save().unwrap();
        assert_eq!(Journal::load(&path).unwrap().concepts.len(), 1);

        log.flush().unwrap();
        assert_eq!(Journal::load(&path).unwrap().concepts.len(), 2);
    }

    #[test]
    fn test_commands_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("execution.json");

        let id = {
            let log = JournalLog::create(&path, Duration::ZERO).unwrap();
            log.enqueue_command("Counter", "increment", json!({"by": 1})).unwrap()
        };

        let log = JournalLog::create(&path, Duration::ZERO).unwrap();
        let pending = log.pending_commands().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);

        log.mark_command_done(id, None).unwrap();
        assert!(log.pending_commands().unwrap().is_empty());
    }
}
