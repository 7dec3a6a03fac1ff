//! CLI command implementations.

pub mod bus;
pub mod inspect;
pub mod rules;

pub use bus::{enqueue, list_commands, show_state};
pub use inspect::{inspect, trace};
pub use rules::check_rules;

use anyhow::{Context, Result};
use concord_journal::bus_path_for;
use concord_kernel::Config;
use std::path::{Path, PathBuf};

/// Journal and bus file locations for a config file
///
/// A missing config file means defaults, anchored next to where it would be.
pub(crate) fn run_files(config_path: &Path) -> Result<(PathBuf, PathBuf)> {
    let config = Config::load_or_default(config_path)
        .with_context(|| format!("Failed to load configuration from {:?}", config_path))?;
    let journal = config.journal_path();
    let bus = bus_path_for(&journal);
    tracing::debug!(journal = %journal.display(), bus = %bus.display(), "Resolved run files");
    Ok((journal, bus))
}
