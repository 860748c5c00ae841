use serde::Serialize;
use similar::{DiffTag, TextDiff};
use std::ops::Range;

use crate::model::span::ByteSpan;

/// Line range, 0-based start plus line count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineRange {
    pub start: usize,
    pub count: usize,
}

impl From<Range<usize>> for LineRange {
    fn from(range: Range<usize>) -> Self {
        Self {
            start: range.start,
            count: range.len(),
        }
    }
}

/// A contiguous run of changed lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffHunk {
    /// Bytes of the original text this hunk replaces
    pub span: ByteSpan,
    pub original_lines: LineRange,
    pub transformed_lines: LineRange,
    pub original: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDiff {
    pub hunks: Vec<DiffHunk>,
    pub unified: String,
}

impl FileDiff {
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }
}

fn offsets(lines: &[&str]) -> Vec<usize> {
    let mut out = Vec::with_capacity(lines.len() + 1);
    let mut total = 0;
    out.push(0);
    for line in lines {
        total += line.len();
        out.push(total);
    }
    out
}

/// Line-level diff between the original and transformed text of one file.
///
/// Both texts carry the same line endings, so hunks splice back byte for
/// byte. Adjacent delete/insert runs are merged into a single hunk.
pub fn diff(path: &str, original: &str, transformed: &str) -> FileDiff {
    if original == transformed {
        return FileDiff::default();
    }

    let text_diff = TextDiff::from_lines(original, transformed);
    let old_offsets = offsets(text_diff.old_slices());
    let new_offsets = offsets(text_diff.new_slices());

    let mut runs: Vec<(Range<usize>, Range<usize>)> = Vec::new();
    for op in text_diff.ops() {
        let (tag, old, new) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            continue;
        }
        match runs.last_mut() {
            Some((prev_old, prev_new)) if prev_old.end == old.start && prev_new.end == new.start => {
                prev_old.end = old.end;
                prev_new.end = new.end;
            }
            _ => runs.push((old, new)),
        }
    }

    let hunks = runs
        .into_iter()
        .map(|(old, new)| {
            let span = ByteSpan::new(old_offsets[old.start], old_offsets[old.end]);
            let replacement = &transformed[new_offsets[new.start]..new_offsets[new.end]];
            DiffHunk {
                span,
                original_lines: old.into(),
                transformed_lines: new.into(),
                original: original[span.range()].to_string(),
                replacement: replacement.to_string(),
            }
        })
        .collect();

    let mut unified = text_diff.unified_diff();
    unified
        .context_radius(3)
        .header(&format!("a/{}", path), &format!("b/{}", path));

    FileDiff {
        hunks,
        unified: unified.to_string(),
    }
}

/// Replays hunks over the original text.
pub fn apply_hunks(original: &str, hunks: &[DiffHunk]) -> String {
    let mut out = String::with_capacity(original.len());
    let mut cursor = 0;
    for hunk in hunks {
        out.push_str(&original[cursor..hunk.span.start]);
        out.push_str(&hunk.replacement);
        cursor = hunk.span.end;
    }
    out.push_str(&original[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text_has_no_hunks() {
        let d = diff("A.java", "a\nb\n", "a\nb\n");
        assert!(d.is_empty());
        assert!(d.unified.is_empty());
        assert_eq!(apply_hunks("a\nb\n", &d.hunks), "a\nb\n");
    }

    #[test]
    fn test_round_trip_crlf() {
        let original = "class A {\r\n  foo();\r\n  x();\r\n  y();\r\n  foo();\r\n}\r\n";
        let transformed = "class A {\r\n  bar();\r\n  x();\r\n  y();\r\n  bar();\r\n}\r\n";
        let d = diff("A.java", original, transformed);
        assert_eq!(d.hunks.len(), 2);
        assert_eq!(d.hunks[0].original, "  foo();\r\n");
        assert_eq!(d.hunks[0].replacement, "  bar();\r\n");
        assert_eq!(d.hunks[0].original_lines, LineRange { start: 1, count: 1 });
        assert_eq!(apply_hunks(original, &d.hunks), transformed);
        assert!(d.unified.contains("--- a/A.java"));
        assert!(d.unified.contains("+  bar();"));
    }

    #[test]
    fn test_round_trip_with_deleted_lines_and_no_final_newline() {
        let original = "<a>\n  <m>GET</m>\n  <m>POST</m>\n</a>";
        let transformed = "<a>\n</a>";
        let d = diff("web.xml", original, transformed);
        assert_eq!(apply_hunks(original, &d.hunks), transformed);
        for pair in d.hunks.windows(2) {
            assert!(pair[0].span.end <= pair[1].span.start);
        }
    }
}
