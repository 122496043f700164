//! Similarity-based substring location with flexible matching.
//!
//! Matching strategies are tried in order, first success wins:
//! 1. Exact substring match (first occurrence).
//! 2. Leading-whitespace reconstruction, for the common case where the model
//!    dedented the copied code uniformly.
//! 3. Sliding-window best-match by character-level similarity ratio, accepted
//!    only above a threshold.

use similar::TextDiff;

/// Default similarity threshold for the fuzzy window pass (80%).
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.8;

/// Window lengths within ±10% of the needle's line count are tried.
pub const DEFAULT_WINDOW_SCALE: f32 = 0.1;

/// Floor for the "did you mean" hint; below this the hint is withheld.
const HINT_THRESHOLD: f32 = 0.6;

/// Context lines added around an inexact hint window.
const HINT_PADDING_LINES: usize = 5;

/// Byte span of a located region within the haystack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Tunables for the matcher. The threshold and window scale are empirical
/// constants carried over from field use, not correctness guarantees.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    pub similarity_threshold: f32,
    pub window_scale: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            window_scale: DEFAULT_WINDOW_SCALE,
        }
    }
}

/// A located region, in whole lines of the haystack.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LineMatch {
    /// Index of the first matched line.
    line_start: usize,
    /// Number of haystack lines covered.
    line_len: usize,
    /// Prefix to re-add to replacement lines when the needle was matched
    /// after whitespace reconstruction.
    reindent: Option<String>,
}

/// Similarity-based substring locator.
#[derive(Debug, Clone, Default)]
pub struct TextMatcher {
    config: MatcherConfig,
}

impl TextMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Locate `needle` inside `haystack`, returning the byte span of the
    /// first successful strategy. Exact matches win over whitespace
    /// reconstruction, which wins over the similarity window.
    pub fn locate(&self, haystack: &str, needle: &str) -> Option<Span> {
        if needle.is_empty() {
            return None;
        }
        if let Some(start) = haystack.find(needle) {
            return Some(Span {
                start,
                end: start + needle.len(),
            });
        }

        let original_len = haystack.len();
        let haystack = ensure_trailing_newline(haystack);
        let needle = ensure_trailing_newline(needle);
        let whole: Vec<&str> = split_keep_ends(&haystack);
        let part: Vec<&str> = split_keep_ends(&needle);

        let m = self
            .match_with_reindent(&whole, &part)
            .or_else(|| self.match_by_similarity(&whole, &needle))?;
        let span = lines_to_span(&whole, m.line_start, m.line_len);
        Some(Span {
            start: span.start,
            end: span.end.min(original_len),
        })
    }

    /// Replace the first region matching `search` with `replace`, trying the
    /// full strategy ladder. Returns the new content, or `None` when nothing
    /// located. Whitespace-reconstructed matches re-indent the replacement
    /// lines by the recovered prefix.
    pub fn splice(&self, whole: &str, search: &str, replace: &str) -> Option<String> {
        let whole = ensure_trailing_newline(whole);
        let search = ensure_trailing_newline(search);
        let replace = ensure_trailing_newline(replace);

        let whole_lines: Vec<&str> = split_keep_ends(&whole);
        let part_lines: Vec<&str> = split_keep_ends(&search);
        let replace_lines: Vec<&str> = split_keep_ends(&replace);

        if let Some(res) = self.splice_lines(&whole_lines, &part_lines, &replace_lines) {
            return Some(res);
        }

        // The model sometimes prepends a spurious blank line to the search
        // block. Drop it and retry.
        if part_lines.len() > 2 && part_lines[0].trim().is_empty() {
            if let Some(res) = self.splice_lines(&whole_lines, &part_lines[1..], &replace_lines) {
                return Some(res);
            }
        }

        let m = self.match_by_similarity(&whole_lines, &search)?;
        let mut out: Vec<&str> = Vec::with_capacity(whole_lines.len());
        out.extend(&whole_lines[..m.line_start]);
        out.extend(replace_lines.iter());
        out.extend(&whole_lines[m.line_start + m.line_len..]);
        Some(out.concat())
    }

    fn splice_lines(
        &self,
        whole_lines: &[&str],
        part_lines: &[&str],
        replace_lines: &[&str],
    ) -> Option<String> {
        let m = self
            .match_exact_lines(whole_lines, part_lines)
            .or_else(|| self.match_with_reindent_lines(whole_lines, part_lines, replace_lines))?;

        let mut out: Vec<String> = Vec::with_capacity(whole_lines.len());
        out.extend(whole_lines[..m.line_start].iter().map(|s| s.to_string()));
        match &m.reindent {
            Some(prefix) => {
                for line in replace_lines {
                    if line.trim().is_empty() {
                        out.push(line.to_string());
                    } else {
                        out.push(format!("{prefix}{line}"));
                    }
                }
            }
            None => out.extend(replace_lines.iter().map(|s| s.to_string())),
        }
        out.extend(
            whole_lines[m.line_start + m.line_len..]
                .iter()
                .map(|s| s.to_string()),
        );
        Some(out.concat())
    }

    fn match_exact_lines(&self, whole_lines: &[&str], part_lines: &[&str]) -> Option<LineMatch> {
        let n = part_lines.len();
        if n == 0 || whole_lines.len() < n {
            return None;
        }
        (0..=whole_lines.len() - n)
            .find(|&i| &whole_lines[i..i + n] == part_lines)
            .map(|i| LineMatch {
                line_start: i,
                line_len: n,
                reindent: None,
            })
    }

    fn match_with_reindent(&self, whole_lines: &[&str], part_lines: &[&str]) -> Option<LineMatch> {
        self.match_with_reindent_lines(whole_lines, part_lines, &[])
    }

    /// Whitespace-reconstruction match. The model usually distorts leading
    /// whitespace uniformly across both sections, so first outdent search and
    /// replace by their common fixed indent, then look for a window that
    /// matches after re-adding a single recovered prefix to every line.
    fn match_with_reindent_lines(
        &self,
        whole_lines: &[&str],
        part_lines: &[&str],
        replace_lines: &[&str],
    ) -> Option<LineMatch> {
        let leading: Vec<usize> = part_lines
            .iter()
            .chain(replace_lines.iter())
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.len() - l.trim_start().len())
            .collect();

        let outdent = leading.iter().copied().min().unwrap_or(0);
        let part: Vec<&str> = part_lines
            .iter()
            .map(|l| {
                if l.trim().is_empty() {
                    *l
                } else {
                    &l[outdent..]
                }
            })
            .collect();

        let n = part.len();
        if n == 0 || whole_lines.len() < n {
            return None;
        }

        for i in 0..=whole_lines.len() - n {
            if let Some(prefix) = uniform_added_prefix(&whole_lines[i..i + n], &part) {
                return Some(LineMatch {
                    line_start: i,
                    line_len: n,
                    reindent: Some(prefix),
                });
            }
        }
        None
    }

    /// Sliding-window best-effort similarity match. Window lengths within
    /// ±`window_scale` of the needle's line count are scored by a
    /// character-level LCS ratio; the maximum wins, earliest start on ties.
    fn match_by_similarity(&self, whole_lines: &[&str], needle: &str) -> Option<LineMatch> {
        let (best, _) = self.best_window(whole_lines, needle)?;
        Some(best)
    }

    fn best_window(&self, whole_lines: &[&str], needle: &str) -> Option<(LineMatch, f32)> {
        let part_len = split_keep_ends(needle).len();
        let scale = self.config.window_scale;
        let min_len = ((part_len as f32) * (1.0 - scale)).floor().max(1.0) as usize;
        let max_len = ((part_len as f32) * (1.0 + scale)).ceil() as usize;

        let mut best: Option<(LineMatch, f32)> = None;
        for length in min_len..=max_len {
            if length == 0 || length > whole_lines.len() {
                continue;
            }
            for i in 0..=whole_lines.len() - length {
                let window = whole_lines[i..i + length].concat();
                // Character-level comparison; line-level is too coarse.
                let ratio = TextDiff::from_chars(needle, window.as_str()).ratio();
                if best.as_ref().map(|(_, r)| ratio > *r).unwrap_or(true) {
                    best = Some((
                        LineMatch {
                            line_start: i,
                            line_len: length,
                            reindent: None,
                        },
                        ratio,
                    ));
                }
            }
        }

        let (m, ratio) = best?;
        if ratio < self.config.similarity_threshold {
            return None;
        }
        Some((m, ratio))
    }

    /// Best-scoring below-threshold window, formatted as a "did you mean"
    /// hint. Returns `None` when nothing scores above the hint floor.
    pub fn closest_lines(&self, content: &str, search: &str) -> Option<String> {
        let search_lines: Vec<&str> = search.lines().collect();
        let content_lines: Vec<&str> = content.lines().collect();
        if search_lines.is_empty() || content_lines.len() < search_lines.len() {
            return None;
        }

        let n = search_lines.len();
        let joined = search_lines.join("\n");
        let mut best_ratio = 0.0f32;
        let mut best_start = 0usize;
        for i in 0..=content_lines.len() - n {
            let chunk = content_lines[i..i + n].join("\n");
            let ratio = TextDiff::from_chars(joined.as_str(), chunk.as_str()).ratio();
            if ratio > best_ratio {
                best_ratio = ratio;
                best_start = i;
            }
        }

        if best_ratio < HINT_THRESHOLD {
            return None;
        }

        let chunk = &content_lines[best_start..best_start + n];
        if chunk.first() == search_lines.first() && chunk.last() == search_lines.last() {
            return Some(chunk.join("\n"));
        }

        // Inexact endpoints: widen the hint so the model sees surroundings.
        let end = (best_start + n + HINT_PADDING_LINES).min(content_lines.len());
        let start = best_start.saturating_sub(HINT_PADDING_LINES);
        Some(content_lines[start..end].join("\n"))
    }
}

/// Split keeping line terminators, so concat() round-trips.
pub(crate) fn split_keep_ends(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Append a normalizing newline when the text lacks one.
pub(crate) fn ensure_trailing_newline(text: &str) -> String {
    if text.is_empty() || text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{text}\n")
    }
}

/// Byte span covered by a run of whole lines.
fn lines_to_span(lines: &[&str], line_start: usize, line_len: usize) -> Span {
    let start: usize = lines[..line_start].iter().map(|l| l.len()).sum();
    let len: usize = lines[line_start..line_start + line_len]
        .iter()
        .map(|l| l.len())
        .sum();
    Span {
        start,
        end: start + len,
    }
}

/// If every window line equals the same prefix + part line (ignoring blank
/// lines), return that prefix.
fn uniform_added_prefix(window: &[&str], part: &[&str]) -> Option<String> {
    debug_assert_eq!(window.len(), part.len());
    for (w, p) in window.iter().zip(part.iter()) {
        if w.trim_end_matches('\n').trim_start() != p.trim_end_matches('\n').trim_start() {
            return None;
        }
    }

    let mut prefix: Option<&str> = None;
    for (w, p) in window.iter().zip(part.iter()) {
        if w.trim().is_empty() {
            continue;
        }
        if w.len() < p.len() || !w.ends_with(p) {
            return None;
        }
        let added = &w[..w.len() - p.len()];
        if !added.chars().all(|c| c == ' ' || c == '\t') {
            return None;
        }
        match prefix {
            None => prefix = Some(added),
            Some(existing) if existing == added => {}
            Some(_) => return None,
        }
    }
    prefix.map(|p| p.to_string())
}
