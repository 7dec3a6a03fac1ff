//! The command bus file
//!
//! A JSON document shared between the runner and external actors:
//!
//! ```json
//! {
//!   "states": { "Counter": { "state": { "value": 3 }, "published_at": "..." } },
//!   "commands": [ { "id": "...", "target": "Counter", "action": "increment", ... } ]
//! }
//! ```
//!
//! Both sides write it, so every write re-reads the file and merges by
//! command id before replacing it. There is no lock: an enqueue that lands
//! between another writer's read and its rename is lost.

use crate::atomic;
use concord_kernel::{LogError, PublishedState};
use concord_types::{Command, CommandId, CommandStatus, Payload};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Bus file that belongs to a journal: `<stem>.commands.json` next to it
pub fn bus_path_for(journal: &Path) -> PathBuf {
    let stem = journal
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "execution".to_string());
    journal.with_file_name(format!("{stem}.commands.json"))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandBus {
    #[serde(default)]
    pub states: BTreeMap<String, PublishedState>,
    #[serde(default)]
    pub commands: Vec<Command>,
}

impl CommandBus {
    /// Load the bus file; a missing file is an empty bus
    pub fn load(path: &Path) -> Result<Self, LogError> {
        Ok(atomic::read_json(path)?.unwrap_or_default())
    }

    /// Merge `path`'s current contents into `self`, then write the result
    pub fn sync_to(&mut self, path: &Path) -> Result<(), LogError> {
        let on_disk = Self::load(path)?;
        self.merge(on_disk);
        atomic::write_json(path, self)
    }

    /// Fold in another copy of the bus
    ///
    /// Commands are matched by id. A resolved command beats a pending one,
    /// since status only moves forward; otherwise our copy wins. Commands
    /// only present in `other` are appended. Published states from `other`
    /// fill in names we haven't published.
    pub fn merge(&mut self, other: CommandBus) {
        for theirs in other.commands {
            match self.commands.iter_mut().find(|c| c.id == theirs.id) {
                Some(ours) => {
                    if ours.is_pending() && !theirs.is_pending() {
                        *ours = theirs;
                    }
                }
                None => self.commands.push(theirs),
            }
        }
        self.commands.sort_by_key(|c| c.created_at);

        for (name, state) in other.states {
            self.states.entry(name).or_insert(state);
        }
    }

    pub fn enqueue(&mut self, target: &str, action: &str, payload: Payload) -> CommandId {
        let command = Command::new(target, action, payload);
        let id = command.id;
        self.commands.push(command);
        id
    }

    /// Pending commands, oldest first
    pub fn pending(&self) -> Vec<Command> {
        self.commands.iter().filter(|c| c.is_pending()).cloned().collect()
    }

    pub fn resolve(&mut self, id: CommandId, error: Option<String>) -> Result<(), LogError> {
        let command = self
            .commands
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(LogError::UnknownCommand(id))?;
        command.resolve(error);
        Ok(())
    }

    pub fn with_status(&self, status: CommandStatus) -> impl Iterator<Item = &Command> {
        self.commands.iter().filter(move |c| c.status == status)
    }
}

/// Append one command to the bus file at `path`
///
/// This is the external actor's side: it never holds the bus in memory
/// between calls.
pub fn enqueue_command(
    path: &Path,
    target: &str,
    action: &str,
    payload: Payload,
) -> Result<CommandId, LogError> {
    let mut bus = CommandBus::default();
    let id = bus.enqueue(target, action, payload);
    bus.sync_to(path)?;
    Ok(id)
}
