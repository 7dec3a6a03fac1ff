//! Non-fatal conditions observed during propagation
//!
//! Diagnostics are conditions the runner recovers from on its own: a
//! propagation cut short by the depth cap, a rule whose target doesn't
//! exist, a log write that failed. Each is logged through `tracing` when
//! raised and kept until the caller takes them.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// What happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Propagation reached `max_depth`; queued events were dropped
    DepthCapExceeded { depth: usize, dropped: usize },
    /// A matched rule names a concept that isn't registered
    UnresolvedTarget {
        sync: String,
        target: String,
        action: String,
    },
    /// The causal log rejected a write
    LogWriteFailed { operation: String, message: String },
}

/// A diagnostic, tagged with the tick it occurred in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub tick: u64,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn new(tick: u64, kind: DiagnosticKind) -> Self {
        Self { tick, kind }
    }

    pub fn severity(&self) -> Severity {
        match self.kind {
            DiagnosticKind::DepthCapExceeded { .. } | DiagnosticKind::UnresolvedTarget { .. } => {
                Severity::Warning
            }
            DiagnosticKind::LogWriteFailed { .. } => Severity::Error,
        }
    }

    pub fn is_depth_cap(&self) -> bool {
        matches!(self.kind, DiagnosticKind::DepthCapExceeded { .. })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::DepthCapExceeded { depth, dropped } => write!(
                f,
                "tick {}: max propagation depth {depth} reached, dropped {dropped} event(s)",
                self.tick
            ),
            DiagnosticKind::UnresolvedTarget {
                sync,
                target,
                action,
            } => write!(
                f,
                "tick {}: sync '{sync}' targets unknown concept '{target}' (action '{action}')",
                self.tick
            ),
            DiagnosticKind::LogWriteFailed { operation, message } => {
                write!(f, "tick {}: causal log {operation} failed: {message}", self.tick)
            }
        }
    }
}
