//! File context tracking and batch scheduling.
//!
//! ## Architecture Principle
//!
//! **Context is paths, not content.** The store remembers which files the
//! model may see and which it may edit; content is read fresh at prompt time.
//! The scheduler turns a snapshot of that store into provider-sized batches
//! without ever dropping a file.

pub mod batch;
pub mod store;

pub use batch::{estimate_tokens, BatchConfig, BatchPlanItem, BatchScheduler};
pub use store::{AddOutcome, ContextFile, FileContextStore, FileMode};
