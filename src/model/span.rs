use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A 0-based line/column pair. Columns count Unicode scalar values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// What a column counts. Positions computed here use `Chars`; SARIF columns
/// default to UTF-16 code units.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnUnit {
    #[default]
    Chars,
    Utf16,
}

impl ColumnUnit {
    pub fn is_chars(&self) -> bool {
        *self == ColumnUnit::Chars
    }

    /// Byte offset of `column` within one line of text. A column inside a
    /// surrogate pair moves to the following character; columns past the end
    /// clamp to the line length.
    pub fn byte_offset(self, line: &str, column: usize) -> usize {
        match self {
            ColumnUnit::Chars => line
                .char_indices()
                .nth(column)
                .map(|(i, _)| i)
                .unwrap_or(line.len()),
            ColumnUnit::Utf16 => {
                let mut units = 0;
                for (i, c) in line.char_indices() {
                    if units >= column {
                        return i;
                    }
                    units += c.len_utf16();
                }
                line.len()
            }
        }
    }
}

/// Half-open byte range into a decoded source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteSpan {
    pub start: usize,
    pub end: usize,
}

impl ByteSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn contains(&self, other: &ByteSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Whether the two spans share any text offset. Two insertions at the same
    /// offset also overlap, since their relative order would be ambiguous.
    pub fn overlaps(&self, other: &ByteSpan) -> bool {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => self.start == other.start,
            (true, false) => other.start < self.start && self.start < other.end,
            (false, true) => self.start < other.start && other.start < self.end,
            (false, false) => self.start < other.end && other.start < self.end,
        }
    }

    /// Relates finding regions to AST nodes. Both spans are half-open; an
    /// empty span touches the span it sits in, but not one that ends at it.
    pub fn touches(&self, other: &ByteSpan) -> bool {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => self.start == other.start,
            (true, false) => other.start <= self.start && self.start < other.end,
            (false, true) => self.start <= other.start && other.start < self.end,
            (false, false) => self.start < other.end && other.start < self.end,
        }
    }
}

impl From<Range<usize>> for ByteSpan {
    fn from(range: Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}
