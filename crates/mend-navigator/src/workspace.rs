//! Filesystem-backed implementations of the `FileStore` and `Discovery`
//! traits, rooted at a working-tree directory.
//!
//! Walking honors `.gitignore` via the `ignore` crate. Discovery results are
//! ordered most recently modified first, so truncation keeps the files the
//! user is most likely working on.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use glob::Pattern;
use ignore::WalkBuilder;

use mend_core::{Discovery, FileStore};

/// Working-tree file store. Writes are whole-file; parent directories are
/// created on demand.
#[derive(Debug, Clone)]
pub struct WorkspaceFiles {
    root: PathBuf,
}

impl WorkspaceFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn abs(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl FileStore for WorkspaceFiles {
    fn read(&self, path: &str) -> Option<String> {
        fs::read_to_string(self.abs(path)).ok()
    }

    fn write(&self, path: &str, content: &str) -> Result<()> {
        let abs = self.abs(path);
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating parent directories for {path}"))?;
        }
        fs::write(&abs, content).with_context(|| format!("writing {path}"))
    }

    fn exists(&self, path: &str) -> bool {
        self.abs(path).is_file()
    }

    fn delete(&self, path: &str) -> Result<()> {
        fs::remove_file(self.abs(path)).with_context(|| format!("deleting {path}"))
    }

    fn list_tracked(&self) -> Vec<String> {
        walk_files(&self.root)
            .into_iter()
            .map(|(rel, _)| rel)
            .collect()
    }
}

/// Workspace search over the same root.
#[derive(Debug, Clone)]
pub struct WorkspaceDiscovery {
    root: PathBuf,
}

impl WorkspaceDiscovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn ranked_files(&self) -> Vec<(String, SystemTime)> {
        let mut files = walk_files(&self.root);
        files.sort_by(|a, b| b.1.cmp(&a.1));
        files
    }
}

impl Discovery for WorkspaceDiscovery {
    fn glob_files(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern =
            Pattern::new(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;
        Ok(self
            .ranked_files()
            .into_iter()
            .filter(|(rel, _)| pattern.matches(rel))
            .map(|(rel, _)| rel)
            .collect())
    }

    fn grep_files(&self, pattern: &str, file_pattern: Option<&str>) -> Result<Vec<String>> {
        let file_pattern = file_pattern
            .map(Pattern::new)
            .transpose()
            .with_context(|| format!("invalid file pattern: {file_pattern:?}"))?;

        let mut out = Vec::new();
        for (rel, _) in self.ranked_files() {
            if let Some(fp) = &file_pattern {
                if !fp.matches(&rel) {
                    continue;
                }
            }
            if let Ok(content) = fs::read_to_string(self.root.join(&rel)) {
                if content.contains(pattern) {
                    out.push(rel);
                }
            }
        }
        Ok(out)
    }

    fn symbol_files(&self, symbol: &str) -> Result<Vec<String>> {
        // Definition-shaped lines only, so a mention in a comment or a call
        // site does not count.
        let mut out = Vec::new();
        for (rel, _) in self.ranked_files() {
            if let Ok(content) = fs::read_to_string(self.root.join(&rel)) {
                if content.lines().any(|line| is_definition(line, symbol)) {
                    out.push(rel);
                }
            }
        }
        Ok(out)
    }
}

fn is_definition(line: &str, symbol: &str) -> bool {
    let trimmed = line.trim_start();
    ["fn ", "def ", "class ", "struct ", "enum ", "trait ", "impl ", "function "]
        .iter()
        .any(|kw| {
            trimmed
                .strip_prefix(kw)
                .or_else(|| trimmed.strip_prefix("pub ").and_then(|r| r.strip_prefix(kw)))
                .map(|rest| rest.starts_with(symbol))
                .unwrap_or(false)
        })
}

/// All non-ignored files under `root` with their modification times, as
/// root-relative forward-slash paths.
fn walk_files(root: &Path) -> Vec<(String, SystemTime)> {
    let mut files = Vec::new();
    for entry in WalkBuilder::new(root).hidden(true).build().flatten() {
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        let mtime = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((rel, mtime));
    }
    files
}
