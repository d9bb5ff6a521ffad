//! Persisted marker of the last successfully installed revision.
//!
//! Loaded at startup to decide whether a rebuild is needed and written after a
//! successful install. Writes go through a temporary file and a rename so a
//! crash never leaves a truncated marker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::RecordError;
use crate::models::RevisionId;

/// On-disk form of the last successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub target: String,
    pub revision: RevisionId,
    pub installed_at: PathBuf,
    pub built_at: DateTime<Utc>,
}

/// Load the checkpoint at `path`; a missing file means nothing was built yet.
pub fn load(path: &Path) -> Result<Option<Checkpoint>, RecordError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RecordError::Io(e)),
    };
    Ok(Some(serde_json::from_str(&content)?))
}

/// Atomically replace the checkpoint at `path`.
pub fn save(path: &Path, checkpoint: &Checkpoint) -> Result<(), RecordError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(serde_json::to_string_pretty(checkpoint)?.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| RecordError::Io(e.error))?;
    Ok(())
}
