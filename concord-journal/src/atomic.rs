//! Atomic JSON file writes
//!
//! The document is written to a temporary file in the destination's
//! directory and renamed over the destination, so readers only ever see the
//! old file or the new one.

use concord_kernel::LogError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), LogError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|err| LogError::Persist(format!("{}: {}", path.display(), err.error)))?;
    Ok(())
}

/// Read a JSON document; a missing file yields `None`
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, LogError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}
