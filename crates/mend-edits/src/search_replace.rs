//! Parser for the marker-delimited search/replace dialect.
//!
//! Blocks look like:
//!
//! ```text
//! path/to/file.py
//! <<<<<<< SEARCH
//! old lines
//! =======
//! new lines
//! >>>>>>> REPLACE
//! ```
//!
//! The parser is an explicit line lexer feeding a small state machine, so
//! `IncompleteBlock`/`UnexpectedMarker` detection is exhaustive rather than
//! incidental.

use mend_core::{Dialect, EditOperation, ParseError, ParsedEdit};

use crate::matcher::ensure_trailing_newline;

/// Fence languages whose blocks are shell commands, not edits.
const SHELL_FENCES: &[&str] = &[
    "bash", "sh", "shell", "cmd", "batch", "powershell", "ps1", "zsh", "fish", "ksh", "csh",
    "tcsh",
];

/// How each line of input is classified by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LineKind {
    /// `<<<<<<< SEARCH` (or ORIGINAL); 5-9 repeated `<`.
    Head,
    /// `=======`; 5-9 repeated `=`.
    Divider,
    /// `>>>>>>> REPLACE` (or UPDATED); 5-9 repeated `>`.
    Tail,
    /// A code fence line; the language tag, lowercased.
    Fence(String),
    Text,
}

fn classify(line: &str) -> LineKind {
    let trimmed = line.trim();
    if let Some(rest) = strip_marker_run(trimmed, '<') {
        if matches!(rest.trim(), "SEARCH" | "ORIGINAL") {
            return LineKind::Head;
        }
    }
    if let Some(rest) = strip_marker_run(trimmed, '=') {
        if rest.trim().is_empty() {
            return LineKind::Divider;
        }
    }
    if let Some(rest) = strip_marker_run(trimmed, '>') {
        if matches!(rest.trim(), "REPLACE" | "UPDATED") {
            return LineKind::Tail;
        }
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        return LineKind::Fence(rest.trim().to_lowercase());
    }
    LineKind::Text
}

/// Accept 5 to 9 repeated marker characters, per the wire contract.
fn strip_marker_run(line: &str, marker: char) -> Option<&str> {
    let run = line.chars().take_while(|&c| c == marker).count();
    if (5..=9).contains(&run) {
        Some(&line[run..])
    } else {
        None
    }
}

/// Result of scanning one response: edits in parse order, plus any fenced
/// shell commands found alongside them.
#[derive(Debug, Default)]
pub struct MarkerParse {
    pub edits: Vec<ParsedEdit>,
    pub shell_commands: Vec<String>,
}

/// Parser for the marker-block dialect.
pub struct MarkerBlockParser;

impl MarkerBlockParser {
    /// True when the text contains all three markers, a cheap pre-check the
    /// loop uses before committing to a parse.
    pub fn looks_like_edit(text: &str) -> bool {
        let mut seen = (false, false, false);
        for line in text.lines() {
            match classify(line) {
                LineKind::Head => seen.0 = true,
                LineKind::Divider => seen.1 = true,
                LineKind::Tail => seen.2 = true,
                _ => {}
            }
        }
        seen.0 && seen.1 && seen.2
    }

    pub fn parse(text: &str) -> Result<MarkerParse, ParseError> {
        // A final unterminated marker is still a marker; normalize the tail.
        let text = ensure_trailing_newline(text);
        let lines: Vec<&str> = text.split_inclusive('\n').collect();

        let mut out = MarkerParse::default();
        let mut current_path: Option<String> = None;
        let mut i = 0;

        while i < lines.len() {
            let lineno = i + 1;
            match classify(lines[i]) {
                LineKind::Fence(lang) if SHELL_FENCES.contains(&lang.as_str()) => {
                    // A shell fence immediately followed by a HEAD is just a
                    // decorated edit block; leave it to the Head arm.
                    let next_is_head =
                        i + 1 < lines.len() && classify(lines[i + 1]) == LineKind::Head;
                    if next_is_head {
                        i += 1;
                        continue;
                    }
                    let mut body = String::new();
                    i += 1;
                    while i < lines.len() && !matches!(classify(lines[i]), LineKind::Fence(_)) {
                        body.push_str(lines[i]);
                        i += 1;
                    }
                    if i < lines.len() {
                        i += 1; // closing fence
                    }
                    out.shell_commands.push(body.trim_end().to_string());
                }
                LineKind::Head => {
                    let head_line = lineno;
                    // A HEAD directly followed by a DIVIDER is a new-file
                    // block; any authored filename is taken at face value.
                    let path = find_filename(&lines[i.saturating_sub(3)..i])
                        .or_else(|| current_path.clone())
                        .ok_or(ParseError::MissingPath { line: head_line })?;
                    current_path = Some(path.clone());

                    let mut search = String::new();
                    i += 1;
                    while i < lines.len() && classify(lines[i]) != LineKind::Divider {
                        if classify(lines[i]) == LineKind::Head {
                            return Err(ParseError::IncompleteBlock {
                                dialect: "SEARCH/REPLACE",
                                line: head_line,
                                expected: "=======",
                            });
                        }
                        search.push_str(lines[i]);
                        i += 1;
                    }
                    if i >= lines.len() {
                        return Err(ParseError::IncompleteBlock {
                            dialect: "SEARCH/REPLACE",
                            line: head_line,
                            expected: "=======",
                        });
                    }

                    let mut replace = String::new();
                    i += 1; // past divider
                    loop {
                        if i >= lines.len() {
                            return Err(ParseError::IncompleteBlock {
                                dialect: "SEARCH/REPLACE",
                                line: head_line,
                                expected: ">>>>>>> REPLACE",
                            });
                        }
                        match classify(lines[i]) {
                            // A second divider also terminates the block;
                            // models chain blocks that way often enough.
                            LineKind::Tail | LineKind::Divider => break,
                            LineKind::Head => {
                                return Err(ParseError::IncompleteBlock {
                                    dialect: "SEARCH/REPLACE",
                                    line: head_line,
                                    expected: ">>>>>>> REPLACE",
                                })
                            }
                            _ => {
                                replace.push_str(lines[i]);
                                i += 1;
                            }
                        }
                    }

                    out.edits.push(ParsedEdit {
                        path,
                        op: EditOperation::Update {
                            search: strip_block_wrapping(&search),
                            replace: strip_block_wrapping(&replace),
                            move_to: None,
                        },
                        dialect: Dialect::SearchReplace,
                        line: head_line,
                    });
                    i += 1; // past tail (or terminating divider)
                }
                LineKind::Divider | LineKind::Tail => {
                    return Err(ParseError::UnexpectedMarker {
                        marker: lines[i].trim().to_string(),
                        line: lineno,
                    });
                }
                _ => i += 1,
            }
        }

        Ok(out)
    }
}

/// Clean a candidate filename line the way models decorate them.
fn strip_filename(line: &str) -> Option<String> {
    let mut name = line.trim();
    if name.is_empty() || name == "..." || name.starts_with("```") {
        return None;
    }
    // Marker lines from an adjacent block are never filenames.
    if name.starts_with('<') || name.starts_with('=') || name.starts_with('>') {
        return None;
    }
    name = name.trim_end_matches(':');
    name = name.trim_start_matches('#');
    let name = name
        .trim()
        .trim_matches('`')
        .trim_matches('*')
        .trim()
        .to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Search back through the (at most 3) lines preceding the HEAD marker,
/// skipping fence lines, for a usable filename. A filename with an extension
/// beats a bare word.
fn find_filename(preceding: &[&str]) -> Option<String> {
    let mut candidates = Vec::new();
    for line in preceding.iter().rev() {
        if let Some(name) = strip_filename(line) {
            candidates.push(name);
        }
        let is_fence = line.trim_start().starts_with("```");
        if !is_fence {
            break;
        }
    }
    candidates
        .iter()
        .find(|name| name.contains('.'))
        .or_else(|| candidates.first())
        .cloned()
}

/// Remove an inner fence wrapping of a search/replace section, when present.
fn strip_block_wrapping(section: &str) -> String {
    let lines: Vec<&str> = section.split_inclusive('\n').collect();
    if lines.len() >= 2
        && lines[0].trim_start().starts_with("```")
        && lines[lines.len() - 1].trim_start().starts_with("```")
    {
        return lines[1..lines.len() - 1].concat();
    }
    section.to_string()
}
