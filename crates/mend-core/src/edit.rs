//! Edit operation types shared by the dialect parsers and the applier.

use serde::{Deserialize, Serialize};

/// Which textual convention an edit was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    /// Marker-delimited search/replace blocks (`<<<<<<< SEARCH` ... `>>>>>>> REPLACE`).
    SearchReplace,
    /// Context-hunk patches (`*** Begin Patch` ... `*** End Patch`).
    Patch,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::SearchReplace => write!(f, "SEARCH/REPLACE"),
            Dialect::Patch => write!(f, "patch"),
        }
    }
}

/// A single file-mutation intent.
///
/// Operations for the same path apply in parse order, each against the output
/// of the previous operation on that path. A later operation may legitimately
/// target text inserted by an earlier one in the same batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditOperation {
    /// Replace the first region matching `search` with `replace`.
    ///
    /// An empty `search` means "append to the file, or create it". An empty
    /// `search` and empty `replace` is a content no-op, used when a patch
    /// header carries only a rename.
    Update {
        search: String,
        replace: String,
        /// Relocate the file after the content edit.
        move_to: Option<String>,
    },
    /// Create a new file with exactly this content. Overwriting an existing
    /// file is allowed but surfaced as a warning.
    Add { content: String },
    /// Remove the file. Deleting a nonexistent file is a warning, not an error.
    Delete,
}

impl EditOperation {
    pub fn kind(&self) -> &'static str {
        match self {
            EditOperation::Update { .. } => "Update",
            EditOperation::Add { .. } => "Add",
            EditOperation::Delete => "Delete",
        }
    }
}

/// An edit operation tagged with its target and provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedEdit {
    /// Target path, relative, exactly as authored by the model.
    pub path: String,
    pub op: EditOperation,
    pub dialect: Dialect,
    /// 1-based line offset of the block in the original response text,
    /// kept for diagnostics.
    pub line: usize,
}
