use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::model::span::{ByteSpan, ColumnUnit, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info = 0,
    Low = 25,
    Medium = 50,
    High = 75,
    Critical = 100,
}

impl Severity {
    /// SARIF `level`; an absent level means `warning`.
    pub fn from_sarif_level(level: Option<&str>) -> Self {
        match level.map(|l| l.to_ascii_lowercase()).as_deref() {
            Some("error") => Severity::High,
            Some("note") => Severity::Low,
            Some("none") => Severity::Info,
            _ => Severity::Medium,
        }
    }

    /// CodeQL-style numeric `security-severity` (CVSS-like, 0.0-10.0).
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 9.0 => Severity::Critical,
            s if s >= 7.0 => Severity::High,
            s if s >= 4.0 => Severity::Medium,
            s if s > 0.0 => Severity::Low,
            _ => Severity::Info,
        }
    }

    pub fn from_semgrep(severity: Option<&str>) -> Self {
        match severity.map(|s| s.to_ascii_uppercase()).as_deref() {
            Some("ERROR") | Some("HIGH") => Severity::High,
            Some("CRITICAL") => Severity::Critical,
            Some("INFO") | Some("LOW") => Severity::Low,
            _ => Severity::Medium,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::High => write!(f, "HIGH"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::Low => write!(f, "LOW"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

/// Normalized finding location: 0-based lines and columns, optional byte range.
///
/// `end` is exclusive. When a report gives no end column the end is the start
/// of the following line, so the region covers the whole last line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub start: Position,
    pub end: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<ByteSpan>,
    #[serde(default, skip_serializing_if = "ColumnUnit::is_chars")]
    pub columns: ColumnUnit,
}

impl Location {
    pub fn lines(start_line: u32, end_line: u32) -> Self {
        Self {
            start: Position::new(start_line, 0),
            end: Position::new(end_line.max(start_line) + 1, 0),
            bytes: None,
            columns: ColumnUnit::Chars,
        }
    }

    /// 0-based line numbers touched by this location.
    pub fn line_range(&self) -> (u32, u32) {
        let last = if self.end.column == 0 && self.end.line > self.start.line {
            self.end.line - 1
        } else {
            self.end.line
        };
        (self.start.line, last.max(self.start.line))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub tool: String,
    pub rule: String,
    pub path: PathBuf,
    pub location: Location,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Identity of a finding: two findings with the same key are duplicates.
pub type FindingKey = (String, String, PathBuf, Location);

impl Finding {
    pub fn new(tool: &str, rule: &str, path: PathBuf, location: Location, severity: Severity) -> Self {
        let id = finding_id(tool, rule, &path, &location);
        Self {
            id,
            tool: tool.to_string(),
            rule: rule.to_string(),
            path,
            location,
            severity,
            message: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn key(&self) -> FindingKey {
        (
            self.tool.clone(),
            self.rule.clone(),
            self.path.clone(),
            self.location.clone(),
        )
    }
}

/// Stable content-derived id, so the same finding gets the same id in every run.
fn finding_id(tool: &str, rule: &str, path: &Path, location: &Location) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool.as_bytes());
    hasher.update([0]);
    hasher.update(rule.as_bytes());
    hasher.update([0]);
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update([0]);
    hasher.update(
        format!(
            "{}:{}-{}:{}",
            location.start.line, location.start.column, location.end.line, location.end.column
        )
        .as_bytes(),
    );
    if let Some(bytes) = location.bytes {
        hasher.update(format!("@{}-{}", bytes.start, bytes.end).as_bytes());
    }
    if location.columns == ColumnUnit::Utf16 {
        hasher.update(b"/utf16");
    }
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Converts a report's file reference into a root-relative, `/`-separated path.
///
/// Handles `file://` URIs, `%20`-style escapes, `./` prefixes and absolute
/// paths under the project root.
pub fn normalize_report_path(raw: &str, root: &Path) -> PathBuf {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("file://") {
        text = rest;
    }
    let decoded = percent_decode(text);
    let path = PathBuf::from(&decoded);
    let relative = if path.is_absolute() {
        path.strip_prefix(root).map(Path::to_path_buf).unwrap_or(path)
    } else {
        path
    };
    relative
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2]));
            if let (Some(hi), Some(lo)) = hex {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

/// Context shared by every report format while normalizing.
pub struct NormalizeContext<'a> {
    pub root: &'a Path,
}

/// One supported report format.
pub trait FindingSource: Send + Sync {
    /// Format name for display and diagnostics
    fn name(&self) -> &'static str;

    /// Whether the document looks like this format
    fn detects(&self, document: &Value) -> bool;

    /// Parse the document into normalized findings
    fn parse(&self, document: &Value, ctx: &NormalizeContext) -> Result<ParsedReport>;
}

/// What one report document contributed.
#[derive(Debug, Clone, Default)]
pub struct ParsedReport {
    pub tools: Vec<String>,
    pub findings: Vec<Finding>,
    /// Results that could not be located or attributed to a rule
    pub dropped: usize,
}
