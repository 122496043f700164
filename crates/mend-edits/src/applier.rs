//! Applies parsed edit operations to file content.
//!
//! The applier is pure: it receives the current content and returns the new
//! content, never touching the filesystem. Renames (`move_to`) are resolved
//! by the caller that owns the file store.

use mend_core::{ApplyError, EditOperation};

use crate::matcher::{ensure_trailing_newline, TextMatcher};

/// Outcome of applying one operation. `new_content` is `None` when the file
/// should be deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub new_content: Option<String>,
    pub warnings: Vec<String>,
}

impl ApplyOutcome {
    fn content(content: String) -> Self {
        Self {
            new_content: Some(content),
            warnings: Vec::new(),
        }
    }
}

/// Single applier for every dialect; hunk edits are lowered to the same
/// search/replace shape before reaching it.
#[derive(Debug, Clone, Default)]
pub struct EditApplier {
    matcher: TextMatcher,
}

impl EditApplier {
    pub fn new(matcher: TextMatcher) -> Self {
        Self { matcher }
    }

    /// Apply `op` to the current content of `path`. `current` is `None` when
    /// the file does not exist yet.
    pub fn apply(
        &self,
        path: &str,
        current: Option<&str>,
        op: &EditOperation,
    ) -> Result<ApplyOutcome, ApplyError> {
        match op {
            EditOperation::Add { content } => {
                let mut outcome = ApplyOutcome::content(content.clone());
                if let Some(existing) = current {
                    if !existing.is_empty() && existing != content {
                        outcome
                            .warnings
                            .push(format!("{path} already exists; overwriting its content"));
                    }
                }
                Ok(outcome)
            }

            EditOperation::Delete => {
                let mut outcome = ApplyOutcome {
                    new_content: None,
                    warnings: Vec::new(),
                };
                if current.is_none() {
                    outcome
                        .warnings
                        .push(format!("{path} does not exist; delete is a no-op"));
                }
                Ok(outcome)
            }

            EditOperation::Update {
                search, replace, ..
            } => self.apply_update(path, current, search, replace),
        }
    }

    fn apply_update(
        &self,
        path: &str,
        current: Option<&str>,
        search: &str,
        replace: &str,
    ) -> Result<ApplyOutcome, ApplyError> {
        // Empty search: create the file, or append to it. A rename-only
        // update has both sections empty and leaves content untouched.
        if search.trim().is_empty() {
            let content = match current {
                Some(existing) if !existing.is_empty() => {
                    if replace.is_empty() {
                        existing.to_string()
                    } else {
                        format!("{}{replace}", ensure_trailing_newline(existing))
                    }
                }
                _ => replace.to_string(),
            };
            return Ok(ApplyOutcome::content(content));
        }

        let content = match current {
            Some(content) => content,
            None => {
                return Err(ApplyError::MissingFile {
                    path: path.to_string(),
                })
            }
        };

        if has_ellipsis(search) {
            return self
                .apply_ellipsis(path, content, search, replace)
                .map(ApplyOutcome::content);
        }

        match self.matcher.splice(content, search, replace) {
            Some(new_content) => Ok(ApplyOutcome::content(new_content)),
            None => Err(self.no_match(path, content, search, replace)),
        }
    }

    /// Elided edit: `...` lines split search and replace into chunks that
    /// must pair one-to-one. Each non-empty search chunk must occur exactly
    /// once; an empty search chunk paired with replacement text appends.
    fn apply_ellipsis(
        &self,
        path: &str,
        content: &str,
        search: &str,
        replace: &str,
    ) -> Result<String, ApplyError> {
        let search_chunks = split_on_ellipsis(search);
        let replace_chunks = split_on_ellipsis(replace);
        if search_chunks.len() != replace_chunks.len() {
            return Err(ApplyError::UnpairedEllipsis {
                path: path.to_string(),
            });
        }

        let mut whole = ensure_trailing_newline(content);
        for (part, replacement) in search_chunks.iter().zip(replace_chunks.iter()) {
            if part.is_empty() && replacement.is_empty() {
                continue;
            }
            if part.is_empty() {
                whole.push_str(replacement);
                continue;
            }
            let count = whole.matches(part.as_str()).count();
            if count != 1 {
                return Err(ApplyError::AmbiguousChunk {
                    path: path.to_string(),
                    count,
                });
            }
            whole = whole.replacen(part.as_str(), replacement, 1);
        }
        Ok(whole)
    }

    fn no_match(&self, path: &str, content: &str, search: &str, replace: &str) -> ApplyError {
        let replace_already_present =
            !replace.trim().is_empty() && content.contains(replace.trim_end_matches('\n'));
        ApplyError::NoMatch {
            path: path.to_string(),
            search: search.to_string(),
            closest: self.matcher.closest_lines(content, search),
            replace_already_present,
        }
    }
}

fn has_ellipsis(text: &str) -> bool {
    text.lines().any(|l| l.trim() == "...")
}

/// Split into the chunks between `...` lines, keeping each chunk's line
/// terminators so replacement is byte-faithful.
fn split_on_ellipsis(text: &str) -> Vec<String> {
    let text = ensure_trailing_newline(text);
    let mut chunks = vec![String::new()];
    for line in text.split_inclusive('\n') {
        if line.trim() == "..." {
            chunks.push(String::new());
        } else {
            chunks.last_mut().unwrap().push_str(line);
        }
    }
    chunks
}
