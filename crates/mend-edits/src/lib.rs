//! Edit dialect parsing and fuzzy application.
//!
//! ## Architecture Principle
//!
//! **Every dialect lowers to one operation shape.** The marker dialect and
//! the context-hunk patch dialect both produce `EditOperation` values, so a
//! single matcher and a single applier serve them. Parsers are strict about
//! structure and loud about what went wrong; the applier is forgiving about
//! whitespace and near-misses, because the text comes from a language model
//! quoting code it saw one prompt ago.
//!
//! - `search_replace`: lexer and state machine for `<<<<<<< SEARCH` blocks
//! - `patch`: parser for `*** Begin Patch` hunks
//! - `matcher`: exact / whitespace-reconstruction / similarity ladder
//! - `applier`: pure content-in, content-out application

pub mod applier;
pub mod matcher;
pub mod patch;
pub mod search_replace;

pub use applier::{ApplyOutcome, EditApplier};
pub use matcher::{MatcherConfig, Span, TextMatcher, DEFAULT_SIMILARITY_THRESHOLD};
pub use patch::{HunkPatchParser, PatchParse};
pub use search_replace::{MarkerBlockParser, MarkerParse};
