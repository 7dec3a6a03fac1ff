//! Command bus records
//!
//! Commands are written by an external actor and consumed by the runner's
//! control loop. A command only ever moves `pending → done | error`.

use crate::ids::CommandId;
use crate::Payload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Processing status of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Done,
    Error,
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Done => "done",
            CommandStatus::Error => "error",
        };
        f.write_str(text)
    }
}

impl FromStr for CommandStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommandStatus::Pending),
            "done" => Ok(CommandStatus::Done),
            "error" => Ok(CommandStatus::Error),
            other => Err(format!("unknown command status: {other}")),
        }
    }
}

/// A request, written from outside, to run one action on a named concept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: CommandId,
    pub target: String,
    pub action: String,
    #[serde(default)]
    pub payload: Payload,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Command {
    /// Create a new pending command
    pub fn new(target: impl Into<String>, action: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: CommandId::new(),
            target: target.into(),
            action: action.into(),
            payload,
            status: CommandStatus::Pending,
            created_at: Utc::now(),
            processed_at: None,
            error_message: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == CommandStatus::Pending
    }

    /// Transition to `done`, or to `error` when a message is given
    pub fn resolve(&mut self, error: Option<String>) {
        self.status = if error.is_some() {
            CommandStatus::Error
        } else {
            CommandStatus::Done
        };
        self.error_message = error;
        self.processed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_transitions() {
        let mut ok = Command::new("Counter", "increment", json!({"by": 1}));
        assert!(ok.is_pending());
        ok.resolve(None);
        assert_eq!(ok.status, CommandStatus::Done);
        assert!(ok.processed_at.is_some());

        let mut failed = Command::new("Counter", "explode", json!({}));
        failed.resolve(Some("no such action".into()));
        assert_eq!(failed.status, CommandStatus::Error);
        assert_eq!(failed.error_message.as_deref(), Some("no such action"));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("done".parse::<CommandStatus>(), Ok(CommandStatus::Done));
        assert!("processing".parse::<CommandStatus>().is_err());
    }

    #[test]
    fn test_missing_payload_defaults_to_null() {
        let raw = json!({
            "id": CommandId::new().to_string(),
            "target": "Counter",
            "action": "reset",
            "status": "pending",
            "created_at": "2024-01-01T00:00:00Z",
        });
        let command: Command = serde_json::from_value(raw).unwrap();
        assert!(command.payload.is_null());
        assert!(command.is_pending());
    }
}
