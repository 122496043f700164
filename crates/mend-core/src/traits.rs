//! Collaborator traits consumed by the engine.
//!
//! The language model, the persistent file store, discovery search, and the
//! shell runner are injected capabilities. The engine never reaches around
//! them to the network or the filesystem directly.

use anyhow::Result;

/// The language-model client. The only call that may block for unbounded
/// external time.
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    /// One completion request. `context_files` is (path, content) for every
    /// file the model should see this turn.
    async fn complete(&self, prompt: &str, context_files: &[(String, String)]) -> Result<String>;

    /// Approximate token count used for batch sizing and context warnings.
    fn token_count(&self, text: &str) -> usize;
}

/// The persistent working-tree store. Writes are whole-file and atomic:
/// compute full new content, then write once.
pub trait FileStore: Send + Sync {
    fn read(&self, path: &str) -> Option<String>;
    fn write(&self, path: &str, content: &str) -> Result<()>;
    fn exists(&self, path: &str) -> bool;
    fn delete(&self, path: &str) -> Result<()>;
    /// All tracked paths, relative to the working-tree root.
    fn list_tracked(&self) -> Vec<String>;
}

/// File discovery search, each returning a ranked sequence of paths
/// (most recently modified first).
pub trait Discovery: Send + Sync {
    fn glob_files(&self, pattern: &str) -> Result<Vec<String>>;
    fn grep_files(&self, pattern: &str, file_pattern: Option<&str>) -> Result<Vec<String>>;
    fn symbol_files(&self, symbol: &str) -> Result<Vec<String>>;
}

/// Operator's answer to a per-command confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandDecision {
    Yes,
    No,
    /// Yes, and remember this choice for the rest of the session.
    Always,
}

/// Interactive confirmation, answered by the human operator.
pub trait Confirmer: Send + Sync {
    fn confirm(&self, prompt: &str) -> CommandDecision;
}

/// Shell-command execution. Output is captured and truncated by the caller
/// before being fed back into the next prompt.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &str) -> Result<String>;
}
