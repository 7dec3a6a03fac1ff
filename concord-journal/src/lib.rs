//! File-backed causal log for concord
//!
//! Two files live side by side:
//!
//! - the **journal** (`execution.json` by default): concepts, synchronizations,
//!   actions and events recorded during a run, replaced atomically on save
//! - the **command bus** (`execution.commands.json`): published concept
//!   states and the command queue, shared with external actors
//!
//! [`JournalLog`] plugs into a runner as its [`concord_kernel::CausalLog`].
//! The `concord` CLI reads both files and appends commands with
//! [`bus::enqueue_command`].

pub mod atomic;
pub mod bus;
pub mod journal;
pub mod log;

pub use bus::{bus_path_for, enqueue_command, CommandBus};
pub use journal::{Journal, JournalSummary};
pub use log::JournalLog;
