//! Persistence hand-off for finished sessions.

use std::path::{Path, PathBuf};

use crate::json::JsonGenerator;
use crate::{ReportError, Result, SessionRecord};

/// Destination for completed session records.
///
/// Records are write-only from the pipeline's point of view.
pub trait SessionStore: Send + Sync {
    /// Persists a record and returns where it was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written.
    fn save(&self, record: &SessionRecord) -> Result<PathBuf>;
}

/// Stores each session as `<dir>/<session-id>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Creates a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory records are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a record with `session_id` is stored at.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidData` if the id has no usable characters.
    pub fn path_for(&self, session_id: &str) -> Result<PathBuf> {
        let file_stem: String = session_id
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        let file_stem = file_stem.trim_matches('-');

        if file_stem.is_empty() {
            return Err(ReportError::InvalidData(format!(
                "session id '{session_id}' cannot be used as a file name"
            )));
        }

        Ok(self.dir.join(format!("{file_stem}.json")))
    }
}

impl SessionStore for JsonFileStore {
    fn save(&self, record: &SessionRecord) -> Result<PathBuf> {
        let path = self.path_for(&record.session_id)?;
        std::fs::create_dir_all(&self.dir)?;
        JsonGenerator::new(record).write_to_file(&path, true)?;
        Ok(path)
    }
}
