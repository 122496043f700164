//! Extracts `[tool_call(Name, key=value, ...)]` invocations from model text.
//!
//! The scanner is quote- and paren-aware so values may contain commas,
//! brackets, and nested parentheses. Matched spans are stripped from the
//! residual text so edit parsing never sees them; `\[tool_call(` is the
//! documented escape and is left untouched.

use mend_core::ToolCall;

const MARKER: &str = "[tool_call(";

/// Everything recovered from one response.
#[derive(Debug, Default)]
pub struct ToolCallParse {
    pub calls: Vec<ToolCall>,
    /// Input text with every recognized call span removed.
    pub cleaned: String,
    pub warnings: Vec<String>,
    /// A bare `Continue` call was present.
    pub continue_requested: bool,
}

pub struct ToolCallParser;

impl ToolCallParser {
    pub fn parse(text: &str) -> ToolCallParse {
        let mut out = ToolCallParse::default();
        let bytes = text.as_bytes();
        let mut cursor = 0usize;

        while let Some(rel) = text[cursor..].find(MARKER) {
            let start = cursor + rel;

            // Escaped marker: emit it literally and keep scanning after it.
            if start > 0 && bytes[start - 1] == b'\\' {
                out.cleaned.push_str(&text[cursor..start + MARKER.len()]);
                cursor = start + MARKER.len();
                continue;
            }

            let body_start = start + MARKER.len();
            let Some((body_end, call_end)) = scan_call(text, body_start) else {
                out.warnings.push(format!(
                    "unterminated tool call at offset {start}; treating as text"
                ));
                out.cleaned.push_str(&text[cursor..start + MARKER.len()]);
                cursor = start + MARKER.len();
                continue;
            };

            out.cleaned.push_str(&text[cursor..start]);
            cursor = call_end;

            match parse_body(&text[body_start..body_end], &mut out.warnings) {
                Some(call) if call.is("Continue") => out.continue_requested = true,
                Some(call) => out.calls.push(call),
                None => out
                    .warnings
                    .push(format!("malformed tool call skipped: {}", &text[start..call_end])),
            }
        }
        out.cleaned.push_str(&text[cursor..]);
        out
    }
}

/// From the character after `[tool_call(`, find the closing `)` at depth zero
/// followed by `]`. Returns (body end, index just past `]`).
fn scan_call(text: &str, body_start: usize) -> Option<(usize, usize)> {
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    let mut iter = text[body_start..].char_indices();
    while let Some((i, c)) = iter.next() {
        let pos = body_start + i;
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    // Tolerate whitespace between `)` and `]`.
                    let rest = &text[pos + 1..];
                    let trimmed = rest.trim_start();
                    if trimmed.starts_with(']') {
                        let bracket = pos + 1 + (rest.len() - trimmed.len());
                        return Some((pos, bracket + 1));
                    }
                    return None;
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse `Name, key=value, ...` into a `ToolCall`.
fn parse_body(body: &str, warnings: &mut Vec<String>) -> Option<ToolCall> {
    let segments = split_top_level(body);
    let mut segments = segments.into_iter();
    let name = segments.next()?.trim().to_string();
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }

    let mut call = ToolCall::new(&name);
    for segment in segments {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let Some((key, value)) = split_key_value(segment) else {
            warnings.push(format!("ignoring positional argument `{segment}` in {name}"));
            continue;
        };
        let value = unquote(value.trim());
        if value == "..." {
            tracing::warn!(tool = %name, key = %key, "placeholder value dropped");
            warnings.push(format!("dropped placeholder value for '{key}' in {name}"));
            continue;
        }
        call.params.push((key.trim().to_string(), value));
    }
    Some(call)
}

/// Split on commas outside quotes and parentheses.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0usize;

    for (i, c) in body.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

/// Split at the first `=` outside quotes.
fn split_key_value(segment: &str) -> Option<(&str, &str)> {
    let mut quote: Option<char> = None;
    for (i, c) in segment.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '=' => return Some((&segment[..i], &segment[i + 1..])),
            _ => {}
        }
    }
    None
}

/// Strip one layer of matching quotes and resolve backslash escapes inside.
fn unquote(value: &str) -> String {
    let stripped = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')));
    match stripped {
        Some(inner) => {
            let mut out = String::with_capacity(inner.len());
            let mut escaped = false;
            for c in inner.chars() {
                if escaped {
                    out.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else {
                    out.push(c);
                }
            }
            out
        }
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_call_with_quoted_value() {
        let parsed = ToolCallParser::parse("look here\n[tool_call(View, file_path=\"src/a.py\")]\n");
        assert_eq!(parsed.calls.len(), 1);
        assert!(parsed.calls[0].is("View"));
        assert_eq!(parsed.calls[0].param("file_path"), Some("src/a.py"));
        assert_eq!(parsed.cleaned, "look here\n\n");
    }

    #[test]
    fn test_unquoted_value() {
        let parsed = ToolCallParser::parse("[tool_call(ViewFilesAtGlob, pattern=src/*.rs)]");
        assert_eq!(parsed.calls[0].param("pattern"), Some("src/*.rs"));
    }

    #[test]
    fn test_value_with_comma_inside_quotes() {
        let parsed =
            ToolCallParser::parse("[tool_call(ViewFilesMatching, pattern=\"foo, bar\")]");
        assert_eq!(parsed.calls[0].param("pattern"), Some("foo, bar"));
    }

    #[test]
    fn test_value_with_parens() {
        let parsed =
            ToolCallParser::parse("[tool_call(ViewFilesMatching, pattern=\"fn main()\")]");
        assert_eq!(parsed.calls[0].param("pattern"), Some("fn main()"));
    }

    #[test]
    fn test_escaped_marker_is_literal() {
        let parsed = ToolCallParser::parse("to call a tool write \\[tool_call(Name, ...)]");
        assert!(parsed.calls.is_empty());
        assert!(parsed.cleaned.contains("\\[tool_call("));
    }

    #[test]
    fn test_placeholder_value_dropped_with_warning() {
        let parsed = ToolCallParser::parse("[tool_call(View, file_path=...)]");
        assert_eq!(parsed.calls.len(), 1);
        assert_eq!(parsed.calls[0].param("file_path"), None);
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn test_continue_sets_flag() {
        let parsed = ToolCallParser::parse("done exploring\n[tool_call(Continue)]");
        assert!(parsed.continue_requested);
        assert!(parsed.calls.is_empty());
    }

    #[test]
    fn test_continue_is_case_insensitive() {
        let parsed = ToolCallParser::parse("[tool_call(continue)]");
        assert!(parsed.continue_requested);
    }

    #[test]
    fn test_multiple_calls_in_order() {
        let parsed = ToolCallParser::parse(
            "[tool_call(View, file_path=a.py)] then [tool_call(MakeEditable, file_path=a.py)]",
        );
        assert_eq!(parsed.calls.len(), 2);
        assert!(parsed.calls[0].is("View"));
        assert!(parsed.calls[1].is("MakeEditable"));
        assert_eq!(parsed.cleaned, " then ");
    }

    #[test]
    fn test_unterminated_call_left_as_text() {
        let parsed = ToolCallParser::parse("[tool_call(View, file_path=a.py");
        assert!(parsed.calls.is_empty());
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn test_escaped_quote_in_value() {
        let parsed = ToolCallParser::parse(r#"[tool_call(Command, command="echo \"hi\"")]"#);
        assert_eq!(parsed.calls[0].param("command"), Some(r#"echo "hi""#));
    }

    #[test]
    fn test_surrounding_prose_is_residual() {
        let parsed = ToolCallParser::parse("before [tool_call(Continue)] after");
        assert_eq!(parsed.cleaned, "before  after");
    }
}
