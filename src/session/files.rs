//! Open-file tracking
//!
//! Session-owned registry of the files currently loaded into the engine,
//! keyed by their stable identifiers. Entries are inserted when a file is
//! added and removed when it is unloaded; any message referencing a file must
//! fall between those two points.
//!
//! The registry also owns version monotonicity: the version the engine
//! observes for a file never decreases, even if the host reports a stale one.

use std::collections::HashMap;
use tracing::warn;

use crate::protocol::messages::{FileId, FileVersion, ProjectId};
use crate::session::error::SessionError;

/// State kept per open file.
#[derive(Debug, Clone)]
struct FileState {
    /// Project the file was loaded into.
    #[allow(dead_code)]
    project: ProjectId,

    /// Highest version communicated to the engine so far.
    version: FileVersion,
}

/// Registry of files currently loaded into the engine.
#[derive(Debug, Default)]
pub struct FileRegistry {
    open: HashMap<FileId, FileState>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file as loaded.
    ///
    /// Returns `false` if the file was already open; the entry is refreshed
    /// either way, keeping the version monotonic.
    pub fn open(&mut self, file: FileId, project: ProjectId, version: FileVersion) -> bool {
        match self.open.get_mut(&file) {
            Some(state) => {
                warn!("File {:?} reported as added while already loaded", file);
                state.version = state.version.max(version);
                false
            }
            None => {
                self.open.insert(file, FileState { project, version });
                true
            }
        }
    }

    /// Record a file as unloaded. Returns `false` if it was not open.
    pub fn close(&mut self, file: FileId) -> bool {
        self.open.remove(&file).is_some()
    }

    /// Whether a file is currently loaded.
    pub fn is_open(&self, file: FileId) -> bool {
        self.open.contains_key(&file)
    }

    /// Record a version observation for an open file and return the version
    /// the engine should see.
    ///
    /// Clamps monotonically: a stale lower version re-yields the highest
    /// version seen so far, so the engine never observes a regression.
    pub fn observe_version(
        &mut self,
        file: FileId,
        version: FileVersion,
    ) -> Result<FileVersion, SessionError> {
        let state = self
            .open
            .get_mut(&file)
            .ok_or(SessionError::FileNotLoaded { file })?;

        state.version = state.version.max(version);
        Ok(state.version)
    }

    /// Number of currently loaded files.
    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
