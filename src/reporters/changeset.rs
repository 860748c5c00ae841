use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::core::error::MalformedReportError;
use crate::findings::{Finding, ReportSummary};
use crate::model::source::{Language, LineEnding, TextEncoding};
use crate::model::symbols::SymbolStats;
use crate::transform::diff::DiffHunk;
use crate::transform::{ChangeHunk, FileError, SkippedMatch};

pub const SCHEMA: &str = "codefixer/changeset@1";

#[derive(Debug, Clone, Serialize)]
pub struct CodemodInfo {
    pub id: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub tool: String,
    pub version: String,
    pub started_at: String,
    pub finished_at: String,
    pub elapsed_ms: u64,
    pub root: PathBuf,
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
    pub reports: Vec<ReportSummary>,
    pub codemods: Vec<CodemodInfo>,
    pub symbols: SymbolStats,
    pub cancelled: bool,
}

impl RunMetadata {
    pub fn timestamp(at: DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Everything that happened to one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileTransformResult {
    pub path: PathBuf,
    pub language: Language,
    pub encoding: TextEncoding,
    pub line_ending: LineEnding,
    pub changes: Vec<ChangeHunk>,
    pub diff: Vec<DiffHunk>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unified_diff: String,
    pub skipped: Vec<SkippedMatch>,
    pub errors: Vec<FileError>,
    /// Type references in this file that could not be resolved
    pub resolution_gaps: usize,
    /// Full transformed text; present even if some codemods failed
    #[serde(skip)]
    pub transformed: Option<String>,
    /// Transformed text in the file's own encoding, when it differs
    #[serde(skip)]
    pub encoded: Option<Vec<u8>>,
}

impl FileTransformResult {
    pub fn is_changed(&self) -> bool {
        !self.diff.is_empty()
    }

    pub fn is_noteworthy(&self) -> bool {
        self.is_changed() || !self.skipped.is_empty() || !self.errors.is_empty()
    }
}

/// A finding that could not be tied to any loaded file.
#[derive(Debug, Clone, Serialize)]
pub struct UnmatchedFinding {
    pub finding: String,
    pub rule: String,
    pub path: PathBuf,
    pub reason: UnmatchedReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnmatchedReason {
    Excluded,
    MissingFile,
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Totals {
    pub files_scanned: usize,
    pub files_changed: usize,
    pub findings_ingested: usize,
    pub findings_addressed: usize,
    pub findings_skipped: usize,
    pub hunks: usize,
    pub skipped_matches: usize,
    pub errors: usize,
    pub resolution_gaps: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub schema: String,
    pub run: RunMetadata,
    pub totals: Totals,
    pub files: Vec<FileTransformResult>,
    pub report_errors: Vec<MalformedReportError>,
    pub unmatched_findings: Vec<UnmatchedFinding>,
}

impl Report {
    pub fn file(&self, path: &str) -> Option<&FileTransformResult> {
        self.files.iter().find(|f| f.path == PathBuf::from(path))
    }

    pub fn changed_files(&self) -> impl Iterator<Item = &FileTransformResult> {
        self.files.iter().filter(|f| f.is_changed())
    }

    /// Pretty JSON. Never fails: a serializer error degrades to a minimal
    /// document carrying the error.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| {
            serde_json::json!({
                "schema": SCHEMA,
                "serialization_error": e.to_string(),
                "totals": {
                    "files_scanned": self.totals.files_scanned,
                    "files_changed": self.totals.files_changed,
                    "errors": self.totals.errors,
                },
            })
            .to_string()
        })
    }
}

/// Merges per-file results into the run report and computes totals.
///
/// Only files with changes, skips or errors are listed; every loaded file
/// counts towards `files_scanned`.
pub fn aggregate(
    run: RunMetadata,
    results: Vec<FileTransformResult>,
    findings: &[Finding],
    report_errors: Vec<MalformedReportError>,
    mut unmatched: Vec<UnmatchedFinding>,
) -> Report {
    let files_scanned = results.len();
    let mut files: Vec<FileTransformResult> =
        results.into_iter().filter(|f| f.is_noteworthy()).collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));

    let addressed: BTreeSet<&str> = files
        .iter()
        .flat_map(|f| f.changes.iter())
        .flat_map(|h| h.findings.iter().map(String::as_str))
        .collect();
    let ingested: BTreeSet<&str> = findings.iter().map(|f| f.id.as_str()).collect();
    let findings_addressed = ingested.intersection(&addressed).count();

    let file_errors: usize = files.iter().map(|f| f.errors.len()).sum();
    let totals = Totals {
        files_scanned,
        files_changed: files.iter().filter(|f| f.is_changed()).count(),
        findings_ingested: ingested.len(),
        findings_addressed,
        findings_skipped: ingested.len() - findings_addressed,
        hunks: files.iter().map(|f| f.changes.len()).sum(),
        skipped_matches: files.iter().map(|f| f.skipped.len()).sum(),
        errors: file_errors + report_errors.len(),
        resolution_gaps: run.symbols.gaps,
    };

    unmatched.sort_by(|a, b| (&a.path, &a.finding).cmp(&(&b.path, &b.finding)));

    Report {
        schema: SCHEMA.to_string(),
        run,
        totals,
        files,
        report_errors,
        unmatched_findings: unmatched,
    }
}
