//! Parser for the context-hunk patch dialect.
//!
//! ```text
//! *** Begin Patch
//! *** Update File: path/to/file.py
//! @@ class Foo
//!  context line
//! -old line
//! +new line
//! *** End Patch
//! ```
//!
//! Every hunk lowers to the same `Update { search, replace }` shape the
//! marker dialect produces: the search region is context-before plus deleted
//! lines, the replace region is inserted lines plus context-after. One fuzzy
//! applier then serves both dialects.

use mend_core::{Dialect, EditOperation, ParseError, ParsedEdit};

use crate::matcher::ensure_trailing_newline;

pub const BEGIN_PATCH: &str = "*** Begin Patch";
pub const END_PATCH: &str = "*** End Patch";
pub const UPDATE_FILE: &str = "*** Update File: ";
pub const ADD_FILE: &str = "*** Add File: ";
pub const DELETE_FILE: &str = "*** Delete File: ";
pub const MOVE_TO: &str = "*** Move to: ";
pub const END_OF_FILE: &str = "*** End of File";

/// Result of parsing one patch: edits in parse order plus non-fatal warnings.
#[derive(Debug, Default)]
pub struct PatchParse {
    pub edits: Vec<ParsedEdit>,
    pub warnings: Vec<String>,
}

/// Parser for the `*** Begin Patch` dialect.
pub struct HunkPatchParser;

impl HunkPatchParser {
    /// Cheap pre-check: does the text carry any of the patch sentinels?
    pub fn looks_like_patch(text: &str) -> bool {
        text.lines().any(|line| {
            let line = norm(line);
            line.starts_with(BEGIN_PATCH)
                || line.starts_with(UPDATE_FILE)
                || line.starts_with(ADD_FILE)
                || line.starts_with(DELETE_FILE)
        })
    }

    pub fn parse(text: &str) -> Result<PatchParse, ParseError> {
        let text = ensure_trailing_newline(text);
        let lines: Vec<&str> = text.lines().collect();

        let mut out = PatchParse::default();
        let mut index = match lines.first().map(|l| norm(l)) {
            Some(first) if first.starts_with(BEGIN_PATCH) => 1,
            _ => {
                // Tolerate a missing begin sentinel when the body is
                // unambiguously patch-shaped.
                let patch_shaped = lines.iter().any(|l| {
                    let l = norm(l);
                    l.starts_with("@@")
                        || l.starts_with(UPDATE_FILE)
                        || l.starts_with(ADD_FILE)
                        || l.starts_with(DELETE_FILE)
                });
                if !patch_shaped {
                    return Err(ParseError::NotAPatch);
                }
                out.warnings.push(format!(
                    "patch is missing its `{BEGIN_PATCH}`/`{END_PATCH}` sentinels"
                ));
                0
            }
        };

        // Per-path action kind, to reject conflicting headers.
        let mut seen: Vec<(String, &'static str)> = Vec::new();
        let mut saw_end = false;

        while index < lines.len() {
            let line = norm(lines[index]);
            let lineno = index + 1;

            if line == END_PATCH {
                saw_end = true;
                break;
            }

            if let Some(path) = line.strip_prefix(UPDATE_FILE) {
                let path = path.trim().to_string();
                if path.is_empty() {
                    return Err(ParseError::HeaderMissingPath {
                        action: "Update",
                        line: lineno,
                    });
                }
                check_action(&mut seen, &path, "Update", &mut out.warnings)?;
                index += 1;

                let mut move_to = None;
                if index < lines.len() {
                    if let Some(target) = norm(lines[index]).strip_prefix(MOVE_TO) {
                        let target = target.trim();
                        if target.is_empty() {
                            return Err(ParseError::HeaderMissingPath {
                                action: "Move to",
                                line: index + 1,
                            });
                        }
                        move_to = Some(target.to_string());
                        index += 1;
                    }
                }

                let start = out.edits.len();
                index = parse_update_body(&lines, index, &path, &mut out)?;
                match out.edits.len() {
                    n if n > start => {
                        // The rename rides on the last hunk for this header.
                        if let EditOperation::Update { move_to: slot, .. } =
                            &mut out.edits[n - 1].op
                        {
                            *slot = move_to;
                        }
                    }
                    _ if move_to.is_some() => {
                        // Rename-only header: a content no-op keeps the move
                        // on the one apply path.
                        out.edits.push(ParsedEdit {
                            path: path.clone(),
                            op: EditOperation::Update {
                                search: String::new(),
                                replace: String::new(),
                                move_to,
                            },
                            dialect: Dialect::Patch,
                            line: lineno,
                        });
                    }
                    _ => {}
                }
                continue;
            }

            if let Some(path) = line.strip_prefix(DELETE_FILE) {
                let path = path.trim().to_string();
                if path.is_empty() {
                    return Err(ParseError::HeaderMissingPath {
                        action: "Delete",
                        line: lineno,
                    });
                }
                index += 1;
                if seen.iter().any(|(p, k)| p == &path && *k == "Delete") {
                    tracing::warn!(path = %path, "duplicate delete action ignored");
                    out.warnings
                        .push(format!("duplicate delete action for {path} ignored"));
                    continue;
                }
                check_action(&mut seen, &path, "Delete", &mut out.warnings)?;
                out.edits.push(ParsedEdit {
                    path,
                    op: EditOperation::Delete,
                    dialect: Dialect::Patch,
                    line: lineno,
                });
                continue;
            }

            if let Some(path) = line.strip_prefix(ADD_FILE) {
                let path = path.trim().to_string();
                if path.is_empty() {
                    return Err(ParseError::HeaderMissingPath {
                        action: "Add",
                        line: lineno,
                    });
                }
                check_action(&mut seen, &path, "Add", &mut out.warnings)?;
                index += 1;
                let (content, next) = parse_add_body(&lines, index)?;
                index = next;
                out.edits.push(ParsedEdit {
                    path,
                    op: EditOperation::Add { content },
                    dialect: Dialect::Patch,
                    line: lineno,
                });
                continue;
            }

            if line.trim().is_empty() {
                index += 1;
                continue;
            }

            return Err(ParseError::InvalidPatchLine {
                line: lineno,
                content: lines[index].to_string(),
            });
        }

        if !saw_end {
            out.warnings
                .push(format!("patch is missing its `{END_PATCH}` sentinel"));
        }

        Ok(out)
    }
}

/// Strip CR so comparisons work for both LF and CRLF input.
fn norm(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

fn is_header(line: &str) -> bool {
    line == END_PATCH
        || line.starts_with(UPDATE_FILE)
        || line.starts_with(ADD_FILE)
        || line.starts_with(DELETE_FILE)
}

fn check_action(
    seen: &mut Vec<(String, &'static str)>,
    path: &str,
    kind: &'static str,
    _warnings: &mut [String],
) -> Result<(), ParseError> {
    if let Some((_, prior)) = seen.iter().find(|(p, _)| p == path) {
        // Repeated Update headers for one file merge; anything else conflicts.
        if !(*prior == "Update" && kind == "Update") {
            return Err(ParseError::ConflictingActions {
                path: path.to_string(),
            });
        }
    } else {
        seen.push((path.to_string(), kind));
    }
    Ok(())
}

/// Parse the hunk sections under one Update header. Each section becomes one
/// `Update` operation; context-only sections are dropped.
fn parse_update_body(
    lines: &[&str],
    mut index: usize,
    path: &str,
    out: &mut PatchParse,
) -> Result<usize, ParseError> {
    while index < lines.len() {
        let line = norm(lines[index]);
        if is_header(line) {
            break;
        }

        // Scope-hint lines are ignored by the applier; log for diagnostics.
        while index < lines.len() && norm(lines[index]).starts_with("@@") {
            let hint = norm(lines[index])[2..].trim();
            if !hint.is_empty() {
                tracing::debug!(path = %path, hint = %hint, "patch scope hint");
            }
            index += 1;
        }

        let section_line = index + 1;
        let mut old_lines: Vec<String> = Vec::new();
        let mut new_lines: Vec<String> = Vec::new();
        let mut changed = false;

        while index < lines.len() {
            let raw = lines[index];
            let line = norm(raw);
            if line.starts_with("@@") || is_header(line) || line == END_OF_FILE {
                break;
            }
            if line.starts_with("***") {
                return Err(ParseError::InvalidPatchLine {
                    line: index + 1,
                    content: raw.to_string(),
                });
            }

            if let Some(content) = line.strip_prefix('+') {
                new_lines.push(content.to_string());
                changed = true;
            } else if let Some(content) = line.strip_prefix('-') {
                old_lines.push(content.to_string());
                changed = true;
            } else if let Some(content) = line.strip_prefix(' ') {
                old_lines.push(content.to_string());
                new_lines.push(content.to_string());
            } else if line.trim().is_empty() {
                // Blank lines inside a hunk are context.
                old_lines.push(String::new());
                new_lines.push(String::new());
            } else {
                return Err(ParseError::InvalidPatchLine {
                    line: index + 1,
                    content: raw.to_string(),
                });
            }
            index += 1;
        }

        if index < lines.len() && norm(lines[index]) == END_OF_FILE {
            index += 1;
        }

        if changed {
            out.edits.push(ParsedEdit {
                path: path.to_string(),
                op: EditOperation::Update {
                    search: join_lines(&old_lines),
                    replace: join_lines(&new_lines),
                    move_to: None,
                },
                dialect: Dialect::Patch,
                line: section_line,
            });
        } else if !old_lines.is_empty() {
            tracing::debug!(path = %path, "dropping context-only hunk");
        } else if index + 1 == section_line
            && index < lines.len()
            && !is_header(norm(lines[index]))
        {
            // No hunk line, no hint, no terminator: the section made no
            // progress and would loop forever.
            return Err(ParseError::InvalidPatchLine {
                line: index + 1,
                content: lines[index].to_string(),
            });
        }
    }

    Ok(index)
}

/// Parse the `+`-prefixed body of an Add File action.
fn parse_add_body(lines: &[&str], mut index: usize) -> Result<(String, usize), ParseError> {
    let mut added: Vec<&str> = Vec::new();
    while index < lines.len() {
        let line = norm(lines[index]);
        if is_header(line) {
            break;
        }
        if let Some(content) = line.strip_prefix('+') {
            added.push(content);
        } else if line.trim().is_empty() {
            added.push("");
        } else {
            return Err(ParseError::InvalidPatchLine {
                line: index + 1,
                content: lines[index].to_string(),
            });
        }
        index += 1;
    }
    let mut content = added.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    Ok((content, index))
}

fn join_lines(lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut joined = lines.join("\n");
    joined.push('\n');
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_hunk_lowers_to_search_replace() {
        let text = "*** Begin Patch\n*** Update File: a.py\n def f():\n-    return 1\n+    return 2\n*** End Patch\n";
        let parsed = HunkPatchParser::parse(text).unwrap();
        assert_eq!(parsed.edits.len(), 1);
        assert!(parsed.warnings.is_empty());
        match &parsed.edits[0].op {
            EditOperation::Update {
                search, replace, ..
            } => {
                assert_eq!(search, "def f():\n    return 1\n");
                assert_eq!(replace, "def f():\n    return 2\n");
            }
            other => panic!("expected Update, got {other:?}"),
        }
    }

    #[test]
    fn test_context_after_is_part_of_replace() {
        let text = "*** Begin Patch\n*** Update File: a.py\n before\n-old\n+new\n after\n*** End Patch\n";
        let parsed = HunkPatchParser::parse(text).unwrap();
        match &parsed.edits[0].op {
            EditOperation::Update {
                search, replace, ..
            } => {
                assert_eq!(search, "before\nold\nafter\n");
                assert_eq!(replace, "before\nnew\nafter\n");
            }
            other => panic!("expected Update, got {other:?}"),
        }
    }

    #[test]
    fn test_scope_hints_are_ignored() {
        let text = "*** Begin Patch\n*** Update File: a.py\n@@ class Foo\n@@ def bar\n-x = 1\n+x = 2\n*** End Patch\n";
        let parsed = HunkPatchParser::parse(text).unwrap();
        assert_eq!(parsed.edits.len(), 1);
    }

    #[test]
    fn test_multiple_hunks_multiple_ops() {
        let text = "*** Begin Patch\n*** Update File: a.py\n-one\n+uno\n@@ later\n-two\n+dos\n*** End Patch\n";
        let parsed = HunkPatchParser::parse(text).unwrap();
        assert_eq!(parsed.edits.len(), 2);
        assert_eq!(parsed.edits[0].path, "a.py");
        assert_eq!(parsed.edits[1].path, "a.py");
    }

    #[test]
    fn test_context_only_hunk_dropped() {
        let text = "*** Begin Patch\n*** Update File: a.py\n just context\n*** End Patch\n";
        let parsed = HunkPatchParser::parse(text).unwrap();
        assert!(parsed.edits.is_empty());
    }

    #[test]
    fn test_add_file() {
        let text = "*** Begin Patch\n*** Add File: new.py\n+line one\n+line two\n*** End Patch\n";
        let parsed = HunkPatchParser::parse(text).unwrap();
        match &parsed.edits[0].op {
            EditOperation::Add { content } => assert_eq!(content, "line one\nline two\n"),
            other => panic!("expected Add, got {other:?}"),
        }
    }

    #[test]
    fn test_add_file_requires_plus_prefix() {
        let text = "*** Begin Patch\n*** Add File: new.py\nbare line\n*** End Patch\n";
        assert!(matches!(
            HunkPatchParser::parse(text),
            Err(ParseError::InvalidPatchLine { line: 3, .. })
        ));
    }

    #[test]
    fn test_delete_file() {
        let text = "*** Begin Patch\n*** Delete File: old.py\n*** End Patch\n";
        let parsed = HunkPatchParser::parse(text).unwrap();
        assert_eq!(parsed.edits[0].op, EditOperation::Delete);
    }

    #[test]
    fn test_duplicate_delete_warns_and_ignores() {
        let text = "*** Begin Patch\n*** Delete File: old.py\n*** Delete File: old.py\n*** End Patch\n";
        let parsed = HunkPatchParser::parse(text).unwrap();
        assert_eq!(parsed.edits.len(), 1);
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn test_conflicting_actions_rejected() {
        let text = "*** Begin Patch\n*** Delete File: a.py\n*** Update File: a.py\n-x\n+y\n*** End Patch\n";
        assert!(matches!(
            HunkPatchParser::parse(text),
            Err(ParseError::ConflictingActions { .. })
        ));
    }

    #[test]
    fn test_move_to_rides_on_last_hunk() {
        let text = "*** Begin Patch\n*** Update File: a.py\n*** Move to: b.py\n-x\n+y\n*** End Patch\n";
        let parsed = HunkPatchParser::parse(text).unwrap();
        match &parsed.edits[0].op {
            EditOperation::Update { move_to, .. } => {
                assert_eq!(move_to.as_deref(), Some("b.py"));
            }
            other => panic!("expected Update, got {other:?}"),
        }
    }

    #[test]
    fn test_rename_only_header() {
        let text = "*** Begin Patch\n*** Update File: a.py\n*** Move to: b.py\n*** End Patch\n";
        let parsed = HunkPatchParser::parse(text).unwrap();
        assert_eq!(parsed.edits.len(), 1);
        match &parsed.edits[0].op {
            EditOperation::Update {
                search,
                replace,
                move_to,
            } => {
                assert!(search.is_empty() && replace.is_empty());
                assert_eq!(move_to.as_deref(), Some("b.py"));
            }
            other => panic!("expected Update, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_sentinels_tolerated_when_patch_shaped() {
        let text = "*** Update File: a.py\n-x\n+y\n";
        let parsed = HunkPatchParser::parse(text).unwrap();
        assert_eq!(parsed.edits.len(), 1);
        assert_eq!(parsed.warnings.len(), 2);
    }

    #[test]
    fn test_not_a_patch() {
        assert!(matches!(
            HunkPatchParser::parse("hello world\n"),
            Err(ParseError::NotAPatch)
        ));
    }

    #[test]
    fn test_crlf_input_normalized() {
        let text = "*** Begin Patch\r\n*** Update File: a.py\r\n-x\r\n+y\r\n*** End Patch\r\n";
        let parsed = HunkPatchParser::parse(text).unwrap();
        assert_eq!(parsed.edits.len(), 1);
    }

    #[test]
    fn test_end_of_file_marker_consumed() {
        let text = "*** Begin Patch\n*** Update File: a.py\n-last\n+final\n*** End of File\n*** End Patch\n";
        let parsed = HunkPatchParser::parse(text).unwrap();
        assert_eq!(parsed.edits.len(), 1);
    }
}
