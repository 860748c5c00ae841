use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tree_sitter::Tree;

use super::parser;
use super::span::{ByteSpan, ColumnUnit, Position};
use crate::core::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Java,
    Xml,
}

impl Language {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "java" => Some(Language::Java),
            "xml" => Some(Language::Xml),
            _ => None,
        }
    }
}

/// Character encoding detected for a file, including whether it carried a BOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextEncoding {
    encoding: &'static Encoding,
    pub bom: bool,
}

impl TextEncoding {
    pub fn utf8() -> Self {
        Self {
            encoding: UTF_8,
            bom: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    /// Maps a byte offset in the file as stored to an offset in the decoded
    /// text. Only UTF-8 offsets carry over.
    pub fn text_offset(&self, raw: usize) -> Option<usize> {
        if self.encoding != UTF_8 {
            return None;
        }
        if self.bom {
            raw.checked_sub(3)
        } else {
            Some(raw)
        }
    }

    /// Detects the encoding (BOM, then strict UTF-8, then statistical guess)
    /// and decodes without replacement characters.
    pub fn decode(bytes: &[u8]) -> Result<(String, TextEncoding), ParseError> {
        if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
            let text = encoding
                .decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
                .ok_or_else(|| ParseError::Encoding {
                    encoding: encoding.name().to_string(),
                })?;
            return Ok((text.into_owned(), TextEncoding { encoding, bom: true }));
        }

        if let Ok(text) = std::str::from_utf8(bytes) {
            return Ok((text.to_string(), TextEncoding::utf8()));
        }

        let mut detector = EncodingDetector::new();
        detector.feed(bytes, true);
        let encoding = detector.guess(None, true);
        let text = encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
            .ok_or_else(|| ParseError::Encoding {
                encoding: encoding.name().to_string(),
            })?;
        Ok((text.into_owned(), TextEncoding { encoding, bom: false }))
    }

    /// Re-encodes text into this encoding, restoring the BOM if there was one.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(text.len() + 3);
        if self.encoding == UTF_16LE {
            if self.bom {
                out.extend_from_slice(&[0xFF, 0xFE]);
            }
            for unit in text.encode_utf16() {
                out.extend_from_slice(&unit.to_le_bytes());
            }
        } else if self.encoding == UTF_16BE {
            if self.bom {
                out.extend_from_slice(&[0xFE, 0xFF]);
            }
            for unit in text.encode_utf16() {
                out.extend_from_slice(&unit.to_be_bytes());
            }
        } else {
            if self.bom && self.encoding == UTF_8 {
                out.extend_from_slice(&[0xEF, 0xBB, 0xBF]);
            }
            let (bytes, _, _) = self.encoding.encode(text);
            out.extend_from_slice(&bytes);
        }
        out
    }
}

impl Serialize for TextEncoding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TextEncoding", 2)?;
        state.serialize_field("name", self.name())?;
        state.serialize_field("bom", &self.bom)?;
        state.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    Lf,
    CrLf,
    Cr,
    Mixed,
    None,
}

impl LineEnding {
    pub fn detect(text: &str) -> Self {
        let bytes = text.as_bytes();
        let (mut lf, mut crlf, mut cr) = (0usize, 0usize, 0usize);
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\r' if bytes.get(i + 1) == Some(&b'\n') => {
                    crlf += 1;
                    i += 1;
                }
                b'\r' => cr += 1,
                b'\n' => lf += 1,
                _ => {}
            }
            i += 1;
        }
        match (lf > 0, crlf > 0, cr > 0) {
            (false, false, false) => LineEnding::None,
            (true, false, false) => LineEnding::Lf,
            (false, true, false) => LineEnding::CrLf,
            (false, false, true) => LineEnding::Cr,
            _ => LineEnding::Mixed,
        }
    }

    /// Terminator used for newly inserted lines.
    pub fn newline(&self) -> &'static str {
        match self {
            LineEnding::CrLf => "\r\n",
            LineEnding::Cr => "\r",
            _ => "\n",
        }
    }

    /// Rewrites every line break in `text` to this style. Mixed and unknown
    /// styles leave the text untouched.
    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if matches!(self, LineEnding::Mixed | LineEnding::None) || !text.contains(['\r', '\n']) {
            return Cow::Borrowed(text);
        }
        let target = self.newline();
        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\r' => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    out.push_str(target);
                }
                '\n' => out.push_str(target),
                other => out.push(other),
            }
        }
        Cow::Owned(out)
    }
}

/// Byte offsets of line starts. Recognizes `\n`, `\r\n` and lone `\r`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut starts = vec![0];
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\n' => starts.push(i + 1),
                b'\r' => {
                    if bytes.get(i + 1) == Some(&b'\n') {
                        i += 1;
                    }
                    starts.push(i + 1);
                }
                _ => {}
            }
            i += 1;
        }
        Self {
            starts,
            len: text.len(),
        }
    }

    /// Content of a 0-based line, without its terminator.
    pub fn line_span(&self, text: &str, line: u32) -> Option<ByteSpan> {
        let line = line as usize;
        let start = *self.starts.get(line)?;
        let mut end = self.starts.get(line + 1).copied().unwrap_or(self.len);
        let bytes = text.as_bytes();
        if end > start && bytes.get(end - 1) == Some(&b'\n') {
            end -= 1;
        }
        if end > start && bytes.get(end - 1) == Some(&b'\r') {
            end -= 1;
        }
        Some(ByteSpan::new(start, end))
    }

    /// Byte offset of a position. Columns past the end of the line clamp to
    /// the line end; the line just past the last one maps to the end of text.
    pub fn offset(&self, text: &str, position: Position, unit: ColumnUnit) -> Option<usize> {
        if position.line as usize == self.starts.len() {
            return (position.column == 0).then_some(self.len);
        }
        let span = self.line_span(text, position.line)?;
        let within = unit.byte_offset(&text[span.range()], position.column as usize);
        Some(span.start + within)
    }

    pub fn position(&self, text: &str, offset: usize) -> Position {
        let mut offset = offset.min(self.len);
        while offset > 0 && !text.is_char_boundary(offset) {
            offset -= 1;
        }
        let line = self.starts.partition_point(|s| *s <= offset).saturating_sub(1);
        let start = self.starts[line];
        let column = text[start..offset].chars().count();
        Position::new(line as u32, column as u32)
    }
}

/// Parse state of a source unit.
#[derive(Debug, Clone)]
pub enum Syntax {
    Java(Tree),
    /// Handled by text codemods only
    Text,
    Failed(ParseError),
}

/// One source file, owned by the project model and immutable once parsed.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Relative to the project root, `/`-separated
    pub path: PathBuf,
    pub language: Language,
    pub encoding: TextEncoding,
    pub line_ending: LineEnding,
    pub text: String,
    pub lines: LineIndex,
    pub syntax: Syntax,
}

impl SourceUnit {
    /// Decodes and parses a file's bytes. Failures are recorded on the unit.
    pub fn from_bytes(
        path: PathBuf,
        language: Language,
        bytes: &[u8],
        parse_timeout: Duration,
    ) -> Self {
        let (text, encoding) = match TextEncoding::decode(bytes) {
            Ok(decoded) => decoded,
            Err(err) => return Self::failed(path, language, err),
        };
        let syntax = match language {
            Language::Java => match parser::parse_java(&text, parse_timeout) {
                Ok(tree) => Syntax::Java(tree),
                Err(err) => Syntax::Failed(err),
            },
            Language::Xml => Syntax::Text,
        };
        Self {
            path,
            language,
            encoding,
            line_ending: LineEnding::detect(&text),
            lines: LineIndex::new(&text),
            text,
            syntax,
        }
    }

    pub fn failed(path: PathBuf, language: Language, error: ParseError) -> Self {
        Self {
            path,
            language,
            encoding: TextEncoding::utf8(),
            line_ending: LineEnding::None,
            text: String::new(),
            lines: LineIndex::new(""),
            syntax: Syntax::Failed(error),
        }
    }

    pub fn tree(&self) -> Option<&Tree> {
        match &self.syntax {
            Syntax::Java(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn parse_error(&self) -> Option<&ParseError> {
        match &self.syntax {
            Syntax::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_transformable(&self) -> bool {
        self.parse_error().is_none()
    }

    pub fn slice(&self, span: ByteSpan) -> Option<&str> {
        self.text.get(span.range())
    }

    pub fn position(&self, offset: usize) -> Position {
        self.lines.position(&self.text, offset)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_line_endings() {
        assert_eq!(LineEnding::detect("a\nb\n"), LineEnding::Lf);
        assert_eq!(LineEnding::detect("a\r\nb\r\n"), LineEnding::CrLf);
        assert_eq!(LineEnding::detect("a\rb"), LineEnding::Cr);
        assert_eq!(LineEnding::detect("a\r\nb\n"), LineEnding::Mixed);
        assert_eq!(LineEnding::detect("ab"), LineEnding::None);
    }

    #[test]
    fn test_apply_line_ending() {
        assert_eq!(LineEnding::CrLf.apply("a\nb\r\nc"), "a\r\nb\r\nc");
        assert_eq!(LineEnding::Lf.apply("a\r\nb"), "a\nb");
        assert_eq!(LineEnding::Mixed.apply("a\nb\r\n"), "a\nb\r\n");
    }

    #[test]
    fn test_line_index_round_trip() {
        let text = "class A {\r\n  int é = 1;\r\n}\r\n";
        let index = LineIndex::new(text);
        assert_eq!(index.starts.len(), 4);
        let offset = index.offset(text, Position::new(1, 8), ColumnUnit::Chars).unwrap();
        assert_eq!(&text[offset..offset + 1], "=");
        assert_eq!(index.position(text, offset), Position::new(1, 8));
        let span = index.line_span(text, 1).unwrap();
        assert_eq!(&text[span.range()], "  int é = 1;");
        assert_eq!(index.offset(text, Position::new(4, 0), ColumnUnit::Chars), Some(text.len()));
        assert_eq!(index.offset(text, Position::new(9, 0), ColumnUnit::Chars), None);
    }

    #[test]
    fn test_decode_utf8_with_bom_round_trips() {
        let bytes = b"\xEF\xBB\xBFclass A {}\n";
        let (text, encoding) = TextEncoding::decode(bytes).unwrap();
        assert_eq!(text, "class A {}\n");
        assert!(encoding.bom);
        assert_eq!(encoding.name(), "UTF-8");
        assert_eq!(encoding.encode(&text), bytes.to_vec());
    }

    #[test]
    fn test_decode_latin1_round_trips() {
        let bytes = b"// caf\xE9 cr\xE8me br\xFBl\xE9e, d\xE9j\xE0 vu\nclass A {}\n".to_vec();
        let (text, encoding) = TextEncoding::decode(&bytes).unwrap();
        assert!(text.contains("café"));
        assert_ne!(encoding.name(), "UTF-8");
        assert_eq!(encoding.encode(&text), bytes);
    }

    #[test]
    fn test_decode_utf16le_round_trips() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "class A {}\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let (text, encoding) = TextEncoding::decode(&bytes).unwrap();
        assert_eq!(text, "class A {}\n");
        assert_eq!(encoding.name(), "UTF-16LE");
        assert_eq!(encoding.encode(&text), bytes);
    }

    #[test]
    fn test_unit_records_syntax_failure() {
        let unit = SourceUnit::from_bytes(
            PathBuf::from("Broken.java"),
            Language::Java,
            b"class Broken { void f( }",
            Duration::from_secs(5),
        );
        assert!(matches!(unit.parse_error(), Some(ParseError::Syntax { .. })));
        assert!(!unit.is_transformable());
    }

    #[test]
    fn test_xml_units_are_text() {
        let unit = SourceUnit::from_bytes(
            PathBuf::from("WEB-INF/web.xml"),
            Language::Xml,
            b"<web-app/>\n",
            Duration::from_secs(5),
        );
        assert!(matches!(unit.syntax, Syntax::Text));
        assert_eq!(unit.file_name(), Some("web.xml"));
    }
}
