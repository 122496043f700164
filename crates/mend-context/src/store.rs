//! Tracks which files are in the model's working context, and in what mode.
//!
//! Editable files are sent with permission to modify; read-only files are
//! sent for reference only. The store tracks paths and modes, not content.
//! Content is read fresh from the file store at prompt time so edits between
//! turns are always visible.

use serde::{Deserialize, Serialize};

use mend_core::ContextError;

/// How a file participates in the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileMode {
    Editable,
    ReadOnly,
}

/// One tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFile {
    pub path: String,
    pub mode: FileMode,
    /// Approximate token size of the file's content, refreshed by the caller
    /// that reads content. Zero until first measured.
    pub token_count: usize,
    /// Monotonic insertion ordinal. Snapshot order follows it, so prompts
    /// list files in the order they entered the session.
    pub added_at: u64,
}

/// Result of an add, distinguishing the idempotent cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// Same path, same mode. No change.
    AlreadyPresent,
    /// Path was tracked in the other mode and has been switched.
    ModeChanged,
}

/// In-memory session context. Never empty once populated: removing the last
/// file is refused so the loop always has something to show the model.
#[derive(Debug, Clone, Default)]
pub struct FileContextStore {
    files: Vec<ContextFile>,
    next_ordinal: u64,
}

impl FileContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `path` in `mode`. Re-adding in the same mode is a no-op; re-adding
    /// in the other mode switches the mode in place, keeping the ordinal.
    pub fn add(&mut self, path: &str, mode: FileMode) -> AddOutcome {
        if let Some(existing) = self.files.iter_mut().find(|f| f.path == path) {
            if existing.mode == mode {
                tracing::debug!(path = %path, "file already in context");
                return AddOutcome::AlreadyPresent;
            }
            existing.mode = mode;
            return AddOutcome::ModeChanged;
        }
        self.files.push(ContextFile {
            path: path.to_string(),
            mode,
            token_count: 0,
            added_at: self.next_ordinal,
        });
        self.next_ordinal += 1;
        AddOutcome::Added
    }

    /// Record a fresh token measurement for a tracked file.
    pub fn set_token_count(&mut self, path: &str, tokens: usize) -> Result<(), ContextError> {
        match self.files.iter_mut().find(|f| f.path == path) {
            Some(f) => {
                f.token_count = tokens;
                Ok(())
            }
            None => Err(ContextError::NotInContext {
                path: path.to_string(),
            }),
        }
    }

    /// Sum of the recorded token counts across all tracked files.
    pub fn total_tokens(&self) -> usize {
        self.files.iter().map(|f| f.token_count).sum()
    }

    pub fn remove(&mut self, path: &str) -> Result<(), ContextError> {
        let index = self
            .files
            .iter()
            .position(|f| f.path == path)
            .ok_or_else(|| ContextError::NotInContext {
                path: path.to_string(),
            })?;
        if self.files.len() == 1 {
            return Err(ContextError::LastFileProtected {
                path: path.to_string(),
            });
        }
        self.files.remove(index);
        Ok(())
    }

    /// Make a read-only file editable.
    pub fn promote(&mut self, path: &str) -> Result<(), ContextError> {
        self.set_mode(path, FileMode::Editable)
    }

    /// Make an editable file read-only.
    pub fn demote(&mut self, path: &str) -> Result<(), ContextError> {
        self.set_mode(path, FileMode::ReadOnly)
    }

    fn set_mode(&mut self, path: &str, mode: FileMode) -> Result<(), ContextError> {
        match self.files.iter_mut().find(|f| f.path == path) {
            Some(f) => {
                f.mode = mode;
                Ok(())
            }
            None => Err(ContextError::NotInContext {
                path: path.to_string(),
            }),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.iter().any(|f| f.path == path)
    }

    pub fn mode(&self, path: &str) -> Option<FileMode> {
        self.files.iter().find(|f| f.path == path).map(|f| f.mode)
    }

    pub fn is_editable(&self, path: &str) -> bool {
        self.mode(path) == Some(FileMode::Editable)
    }

    /// A rename keeps the file's mode and position in the ordering.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), ContextError> {
        match self.files.iter_mut().find(|f| f.path == from) {
            Some(f) => {
                f.path = to.to_string();
                Ok(())
            }
            None => Err(ContextError::NotInContext {
                path: from.to_string(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn editable_paths(&self) -> Vec<&str> {
        self.paths_in_mode(FileMode::Editable)
    }

    pub fn readonly_paths(&self) -> Vec<&str> {
        self.paths_in_mode(FileMode::ReadOnly)
    }

    fn paths_in_mode(&self, mode: FileMode) -> Vec<&str> {
        let mut out: Vec<&ContextFile> = self.files.iter().filter(|f| f.mode == mode).collect();
        out.sort_by_key(|f| f.added_at);
        out.into_iter().map(|f| f.path.as_str()).collect()
    }

    /// All tracked files in insertion order.
    pub fn snapshot(&self) -> Vec<ContextFile> {
        let mut out = self.files.clone();
        out.sort_by_key(|f| f.added_at);
        out
    }
}
