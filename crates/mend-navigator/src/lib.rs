//! Agentic navigation: tool-call parsing, the reflection loop, and batch
//! driving over a working tree.
//!
//! ## Architecture Principle
//!
//! **The loop owns policy, collaborators own effects.** Everything that
//! touches the outside world (the model, the filesystem, search, the shell,
//! the operator) sits behind a `mend-core` trait. The loop decides what to
//! do with the results and is fully testable with in-memory doubles.
//!
//! - `tool_call`: `[tool_call(...)]` extraction from model text
//! - `navigator`: the per-turn state machine and reflection driver
//! - `workspace`: filesystem-backed `FileStore`/`Discovery`
//! - `batch_driver`: one loop run per scheduled batch

pub mod batch_driver;
pub mod navigator;
pub mod tool_call;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use batch_driver::BatchDriver;
pub use navigator::{NavigatorConfig, NavigatorLoop, TurnOutcome};
pub use tool_call::{ToolCallParse, ToolCallParser};
pub use workspace::{WorkspaceDiscovery, WorkspaceFiles};
