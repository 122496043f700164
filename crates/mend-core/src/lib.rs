//! Core types and traits for the mend edit engine.
//!
//! This crate provides the foundation types used across all other mend crates.
//! It has ZERO internal crate dependencies and only depends on external libraries.
//!
//! ## Architecture Principle
//!
//! mend-core sits at the bottom of the dependency hierarchy:
//! - Layer 1 (Foundation): mend-core ← YOU ARE HERE
//! - Layer 2 (Infrastructure): mend-edits, mend-context
//! - Layer 3 (Orchestration): mend-navigator

pub mod edit;
pub mod error;
pub mod tool_call;
pub mod traits;

pub use edit::{Dialect, EditOperation, ParsedEdit};
pub use error::{ApplyError, ContextError, ParseError};
pub use tool_call::ToolCall;
pub use traits::{
    CommandDecision, CommandRunner, Confirmer, Discovery, FileStore, ModelClient,
};
