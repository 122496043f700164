//! Error taxonomy for parsing, applying, and context-store misuse.
//!
//! `ParseError` and `ApplyError::NoMatch` are recoverable: the loop feeds
//! their text back to the model for another attempt. `ContextError` is
//! reported to the operator and never retried automatically.

use thiserror::Error;

/// Malformed dialect syntax. Always recoverable by reflection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A start marker was seen but no matching end marker before end of input.
    #[error("unterminated {dialect} block starting at line {line}: expected `{expected}`")]
    IncompleteBlock {
        dialect: &'static str,
        line: usize,
        expected: &'static str,
    },

    /// A divider or end marker appeared without a preceding start marker.
    #[error("unexpected `{marker}` at line {line} with no open block")]
    UnexpectedMarker { marker: String, line: usize },

    /// No filename could be associated with a block.
    #[error(
        "bad/missing filename at line {line}: the filename must be alone on the line before the \
         opening marker"
    )]
    MissingPath { line: usize },

    /// A line inside a patch body had no recognizable prefix.
    #[error("invalid line in patch at line {line}: {content}")]
    InvalidPatchLine { line: usize, content: String },

    /// A patch header conflicts with an earlier action for the same file.
    #[error("conflicting patch actions for file: {path}")]
    ConflictingActions { path: String },

    /// A `*** ... File:` header with no path after the colon.
    #[error("{action} File action at line {line} is missing its path")]
    HeaderMissingPath { action: &'static str, line: usize },

    /// The input is not recognizably in the patch dialect at all.
    #[error("response does not appear to be in patch format")]
    NotAPatch,
}

/// Failure while applying a single parsed operation to file content.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApplyError {
    /// The search region could not be located in the file.
    #[error("no match for search text in {path}")]
    NoMatch {
        path: String,
        /// The attempted search text, verbatim, so the feedback loop can
        /// reproduce the failure deterministically.
        search: String,
        /// Best-scoring window found by the similarity pass even though it
        /// was below threshold, when available.
        closest: Option<String>,
        /// The replacement text is already present in the file, suggesting
        /// the edit may be redundant.
        replace_already_present: bool,
    },

    /// Ellipsis segments in search and replace do not pair up.
    #[error("unpaired ... elision in search/replace block for {path}")]
    UnpairedEllipsis { path: String },

    /// A literal chunk between ellipsis markers matched zero or several times.
    #[error("elided edit chunk for {path} matched {count} times; it must match exactly once")]
    AmbiguousChunk { path: String, count: usize },

    /// Update targeted a file with no content available.
    #[error("cannot update {path}: file does not exist")]
    MissingFile { path: String },
}

/// Context-store misuse. Reported to the operator, not retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// Removing this file would leave the store below its minimum.
    #[error("cannot remove {path}: it is the last file in context")]
    LastFileProtected { path: String },

    #[error("{path} is not in context")]
    NotInContext { path: String },

    /// Operating on a store with zero files where at least one is required.
    #[error("file context is empty")]
    EmptyContext,
}
