use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::config::Config;
use super::events::{Observer, PipelineEvent};
use super::filter::PathFilter;
use super::project::{parse_units, read_sources, LoadLimits, Project};
use crate::codemods::registry::CodemodRegistry;
use crate::codemods::traits::CodemodSelection;
use crate::findings::{default_ingestor, Finding};
use crate::model::source::SourceUnit;
use crate::model::symbols::SymbolTable;
use crate::reporters::changeset::{
    aggregate, CodemodInfo, FileTransformResult, Report, RunMetadata, UnmatchedFinding,
    UnmatchedReason,
};
use crate::transform::diff;
use crate::transform::executor::{self, FileError};
use crate::transform::matcher::{self, sort_skipped, SkipReason, SkippedMatch};
use crate::utils::fs::display_path;

/// Shared abort flag. Once set, no new file is started; files already being
/// transformed finish and are reported.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct RunOptions {
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
    pub file_timeout: Duration,
    pub max_file_bytes: u64,
    /// Worker threads for per-file work; 0 lets rayon decide
    pub threads: usize,
    /// Fixed run timestamp. When set, timings are not measured, so two runs
    /// over the same inputs serialize identically.
    pub clock: Option<DateTime<Utc>>,
    pub cancel: CancellationToken,
    pub observer: Option<Observer>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            includes: config.paths.include.clone(),
            excludes: config.paths.exclude.clone(),
            file_timeout: Duration::from_millis(config.limits.file_timeout_ms),
            max_file_bytes: config.limits.max_file_bytes,
            threads: config.threads,
            clock: None,
            cancel: CancellationToken::new(),
            observer: None,
        }
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }
}

/// Runs the whole pipeline over a project and returns its change-set.
///
/// Only environment failures are returned as errors: an unreadable root, an
/// unknown codemod in the selection or an invalid path pattern. Everything
/// else is recorded in the report.
pub async fn run(
    root: &Path,
    report_paths: &[PathBuf],
    selection: &CodemodSelection,
    registry: &Arc<CodemodRegistry>,
    options: RunOptions,
) -> Result<Report> {
    let started_at = options.clock.unwrap_or_else(Utc::now);
    let timer = Instant::now();

    let project = Project::new(root)?;
    let active = registry.select(selection)?;
    let filter = PathFilter::new(&options.includes, &options.excludes)?;

    let files = project.discover(&filter);
    tracing::info!(root = %project.path.display(), files = files.len(), "discovered source files");
    options.emit(PipelineEvent::FilesDiscovered { count: files.len() });

    let ingestor = default_ingestor(options.file_timeout);
    let limits = LoadLimits {
        timeout: options.file_timeout,
        max_bytes: options.max_file_bytes,
    };
    let (ingestion, raw) = tokio::join!(
        ingestor.ingest(report_paths, &project.path),
        read_sources(&project.path, &files, limits)
    );
    for summary in &ingestion.reports {
        options.emit(PipelineEvent::ReportIngested {
            path: summary.path.clone(),
            findings: summary.findings,
        });
    }
    for error in &ingestion.errors {
        options.emit(PipelineEvent::ReportFailed {
            path: error.report.clone(),
            reason: error.reason.clone(),
        });
    }

    let findings = Arc::new(ingestion.findings);
    let transform = {
        let registry = Arc::clone(registry);
        let findings = Arc::clone(&findings);
        let filter = filter.clone();
        let options = options.clone();
        tokio::task::spawn_blocking(move || {
            transform_all(raw, &findings, &registry, &active, &filter, &options)
        })
    };
    let outcome = transform.await.context("transformation worker failed")??;

    let unmatched = unmatched_findings(&findings, &outcome, &filter);
    let (finished_at, elapsed_ms) = match options.clock {
        Some(at) => (at, 0),
        None => (Utc::now(), timer.elapsed().as_millis() as u64),
    };
    let run = RunMetadata {
        tool: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: RunMetadata::timestamp(started_at),
        finished_at: RunMetadata::timestamp(finished_at),
        elapsed_ms,
        root: project.path.clone(),
        includes: options.includes.clone(),
        excludes: options.excludes.clone(),
        reports: ingestion.reports,
        codemods: registry
            .iter()
            .filter(|c| selection.is_enabled(c.id()))
            .map(|c| CodemodInfo {
                id: c.id().to_string(),
                version: c.version().to_string(),
            })
            .collect(),
        symbols: outcome.symbols,
        cancelled: options.cancel.is_cancelled(),
    };

    let report = aggregate(run, outcome.results, &findings, ingestion.errors, unmatched);
    tracing::info!(
        files_changed = report.totals.files_changed,
        hunks = report.totals.hunks,
        errors = report.totals.errors,
        "run finished"
    );
    Ok(report)
}

struct TransformOutcome {
    results: Vec<FileTransformResult>,
    loaded: BTreeSet<PathBuf>,
    cancelled: BTreeSet<PathBuf>,
    symbols: crate::model::symbols::SymbolStats,
}

/// CPU-bound half of the run: parse everything, build the symbol table once,
/// then transform files independently.
fn transform_all(
    raw: Vec<super::project::RawSource>,
    findings: &[Finding],
    registry: &CodemodRegistry,
    active: &[usize],
    filter: &PathFilter,
    options: &RunOptions,
) -> Result<TransformOutcome> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.threads)
        .build()
        .context("failed to start worker threads")?;

    Ok(pool.install(|| {
        let units = parse_units(raw, options.file_timeout);
        for unit in &units {
            options.emit(PipelineEvent::FileParsed {
                path: unit.path.clone(),
                ok: unit.is_transformable(),
            });
        }

        let symbols = SymbolTable::build(&units);
        let stats = symbols.stats();
        options.emit(PipelineEvent::SymbolTableBuilt {
            declarations: stats.declarations,
            gaps: stats.gaps,
        });

        let mut by_file: BTreeMap<&Path, Vec<&Finding>> = BTreeMap::new();
        for finding in findings {
            by_file.entry(finding.path.as_path()).or_default().push(finding);
        }

        let processed: Vec<Option<FileTransformResult>> = units
            .par_iter()
            .map(|unit| {
                if options.cancel.is_cancelled() {
                    return None;
                }
                let file_findings = by_file
                    .get(unit.path.as_path())
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                let result = process_unit(unit, file_findings, registry, active, &symbols, filter);
                options.emit(PipelineEvent::FileTransformed {
                    path: unit.path.clone(),
                    hunks: result.changes.len(),
                    errors: result.errors.len(),
                });
                Some(result)
            })
            .collect();

        let mut results = Vec::new();
        let mut cancelled = BTreeSet::new();
        for (unit, result) in units.iter().zip(processed) {
            match result {
                Some(result) => results.push(result),
                None => {
                    cancelled.insert(unit.path.clone());
                }
            }
        }
        if !cancelled.is_empty() {
            tracing::warn!(remaining = cancelled.len(), "run cancelled");
            options.emit(PipelineEvent::Cancelled {
                remaining: cancelled.len(),
            });
        }

        TransformOutcome {
            loaded: results.iter().map(|r| r.path.clone()).collect(),
            results,
            cancelled,
            symbols: stats,
        }
    }))
}

/// Plans, applies and diffs one file. Never fails: every problem is recorded
/// on the result.
pub fn process_unit(
    unit: &SourceUnit,
    findings: &[&Finding],
    registry: &CodemodRegistry,
    active: &[usize],
    symbols: &SymbolTable,
    filter: &PathFilter,
) -> FileTransformResult {
    let mut result = FileTransformResult {
        path: unit.path.clone(),
        language: unit.language,
        encoding: unit.encoding,
        line_ending: unit.line_ending,
        changes: Vec::new(),
        diff: Vec::new(),
        unified_diff: String::new(),
        skipped: Vec::new(),
        errors: Vec::new(),
        resolution_gaps: symbols.gaps(&unit.path).len(),
        transformed: None,
        encoded: None,
    };

    if let Some(err) = unit.parse_error() {
        tracing::warn!(file = %unit.path.display(), error = %err, "file not transformed");
        result.errors.push(FileError::parse(err.clone()));
        result.skipped = findings
            .iter()
            .map(|f| SkippedMatch::finding(f, SkipReason::ParseFailed))
            .collect();
        sort_skipped(&mut result.skipped);
        return result;
    }

    let plan = matcher::plan(unit, findings, registry, active, symbols, filter);
    let execution = executor::execute(unit, &plan.accepted, registry, symbols);
    let file_diff = diff::diff(&display_path(&unit.path), &unit.text, &execution.text);

    result.skipped = plan.skipped;
    result.skipped.extend(execution.unchanged);
    sort_skipped(&mut result.skipped);
    result.changes = execution.hunks;
    result.errors = execution.errors;

    if !file_diff.is_empty() {
        tracing::debug!(
            file = %unit.path.display(),
            hunks = result.changes.len(),
            "file transformed"
        );
        result.encoded = Some(unit.encoding.encode(&execution.text));
        result.transformed = Some(execution.text);
        result.diff = file_diff.hunks;
        result.unified_diff = file_diff.unified;
    }
    result
}

fn unmatched_findings(
    findings: &[Finding],
    outcome: &TransformOutcome,
    filter: &PathFilter,
) -> Vec<UnmatchedFinding> {
    findings
        .iter()
        .filter(|f| !outcome.loaded.contains(&f.path))
        .map(|f| {
            let reason = if outcome.cancelled.contains(&f.path) {
                UnmatchedReason::Cancelled
            } else if !filter.allows_file(&f.path) {
                UnmatchedReason::Excluded
            } else {
                UnmatchedReason::MissingFile
            };
            tracing::debug!(rule = %f.rule, file = %f.path.display(), ?reason, "finding not matched to a file");
            UnmatchedFinding {
                finding: f.id.clone(),
                rule: f.rule.clone(),
                path: f.path.clone(),
                reason,
            }
        })
        .collect()
}

/// Writes the transformed bytes of every changed file back under the report's
/// root. Each file is replaced through a temporary sibling, so a file on disk
/// is either fully old or fully new. Returns how many files were written.
pub async fn write_back(report: &Report) -> Result<usize> {
    let mut written = 0;
    for file in report.changed_files() {
        let Some(bytes) = &file.encoded else {
            continue;
        };
        let target = report.run.root.join(&file.path);
        let staging = staging_path(&target);
        tokio::fs::write(&staging, bytes)
            .await
            .with_context(|| format!("failed to write {}", staging.display()))?;
        tokio::fs::rename(&staging, &target)
            .await
            .with_context(|| format!("failed to replace {}", target.display()))?;
        tracing::debug!(file = %file.path.display(), "wrote transformed file");
        written += 1;
    }
    Ok(written)
}

fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.codefixer", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codemods::default_registry;
    use crate::codemods::traits::{Codemod, CodemodContext, Replacement, Site};
    use crate::core::error::{CodemodError, FatalError};
    use crate::model::span::ByteSpan;
    use crate::transform::diff::apply_hunks;
    use anyhow::anyhow;
    use chrono::TimeZone;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replaces every `from` inside the finding's region with `to`.
    struct Rename {
        id: &'static str,
        rules: &'static [&'static str],
        from: &'static str,
        to: &'static str,
        fails: bool,
    }

    impl Rename {
        fn new(id: &'static str, rules: &'static [&'static str], from: &'static str, to: &'static str) -> Self {
            Self {
                id,
                rules,
                from,
                to,
                fails: false,
            }
        }

        fn failing(id: &'static str, rules: &'static [&'static str], from: &'static str) -> Self {
            Self {
                fails: true,
                ..Self::new(id, rules, from, "")
            }
        }
    }

    impl Codemod for Rename {
        fn id(&self) -> &str {
            self.id
        }
        fn version(&self) -> &str {
            "1.0.0"
        }
        fn summary(&self) -> &str {
            "rename"
        }
        fn handles(&self) -> &[&str] {
            self.rules
        }
        fn applies_to(&self, unit: &SourceUnit) -> bool {
            unit.path.extension().is_some_and(|e| e == "java")
        }
        fn locate(&self, ctx: &CodemodContext, region: Option<ByteSpan>) -> Vec<Site> {
            let region = region.unwrap_or(ByteSpan::new(0, ctx.text().len()));
            ctx.text()
                .match_indices(self.from)
                .map(|(start, m)| ByteSpan::new(start, start + m.len()))
                .filter(|span| region.contains(span))
                .map(Site::new)
                .collect()
        }
        fn apply(&self, _ctx: &CodemodContext, site: &Site) -> anyhow::Result<Replacement> {
            if self.fails {
                return Err(anyhow!("{} always fails", self.id));
            }
            Ok(Replacement::new(site.span, self.to))
        }
    }

    const A_JAVA: &str = "class A {\n  void foo() {}\n  void bar() {}\n\n  void run() {\n    int a = 1;\n    int b = 2;\n    int c = 3;\n    int d = 4;\n    foo();\n    foo();\n  }\n}\n";

    fn sarif(results: &[(&str, &str, u32)]) -> String {
        let results: Vec<serde_json::Value> = results
            .iter()
            .map(|(rule, uri, line)| {
                serde_json::json!({
                    "ruleId": rule,
                    "level": "warning",
                    "locations": [{"physicalLocation": {
                        "artifactLocation": {"uri": uri},
                        "region": {"startLine": line}
                    }}]
                })
            })
            .collect();
        serde_json::json!({
            "version": "2.1.0",
            "runs": [{"tool": {"driver": {"name": "scanner"}}, "results": results}]
        })
        .to_string()
    }

    struct Fixture {
        tmp: TempDir,
        root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let root = tmp.path().join("repo");
            fs::create_dir_all(&root).unwrap();
            Self { tmp, root }
        }

        fn source(&self, path: &str, text: &str) -> &Self {
            let target = self.root.join(path);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(target, text).unwrap();
            self
        }

        fn report(&self, name: &str, body: &str) -> PathBuf {
            let path = self.tmp.path().join(name);
            fs::write(&path, body).unwrap();
            path
        }
    }

    fn options() -> RunOptions {
        RunOptions {
            clock: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            ..RunOptions::default()
        }
    }

    async fn run_with(
        fixture: &Fixture,
        reports: &[PathBuf],
        codemods: Vec<Box<dyn Codemod>>,
    ) -> Report {
        let registry = Arc::new(CodemodRegistry::new(codemods));
        run(&fixture.root, reports, &CodemodSelection::all(), &registry, options())
            .await
            .unwrap()
    }

    fn assert_round_trip_and_non_overlap(report: &Report) {
        for file in &report.files {
            let original = fs::read_to_string(report.run.root.join(&file.path)).unwrap();
            let transformed = file.transformed.clone().unwrap_or_else(|| original.clone());
            assert_eq!(apply_hunks(&original, &file.diff), transformed);
            for hunk in &file.changes {
                assert_eq!(&original[hunk.span.range()], hunk.original);
            }
            for pair in file.changes.windows(2) {
                assert!(pair[0].span.end <= pair[1].span.start);
            }
        }
    }

    #[tokio::test]
    async fn test_single_finding_replaced_at_its_location_only() {
        let fixture = Fixture::new();
        fixture.source("A.java", A_JAVA);
        let report_path = fixture.report("scan.sarif", &sarif(&[("R1", "A.java", 10)]));

        let report = run_with(
            &fixture,
            &[report_path],
            vec![Box::new(Rename::new("C1", &["R1"], "foo()", "bar()"))],
        )
        .await;

        let file = report.file("A.java").unwrap();
        assert_eq!(file.changes.len(), 1);
        let hunk = &file.changes[0];
        assert_eq!(hunk.original, "foo()");
        assert_eq!(hunk.replacement, "bar()");
        assert_eq!(hunk.codemod, "C1");
        assert_eq!(hunk.start.line, 9);
        assert_eq!(hunk.findings.len(), 1);

        let expected = A_JAVA.replacen("    foo();\n    foo();", "    bar();\n    foo();", 1);
        assert_eq!(file.transformed.as_deref(), Some(expected.as_str()));
        assert_eq!(report.totals.findings_addressed, 1);
        assert_eq!(report.totals.files_changed, 1);
        assert_round_trip_and_non_overlap(&report);
    }

    #[tokio::test]
    async fn test_equal_priority_conflict_keeps_earlier_match() {
        let fixture = Fixture::new();
        fixture.source("A.java", A_JAVA);
        let report_path = fixture.report(
            "scan.sarif",
            &sarif(&[("R1", "A.java", 10), ("R2", "A.java", 10)]),
        );

        let report = run_with(
            &fixture,
            &[report_path],
            vec![
                Box::new(Rename::new("C1", &["R1"], "foo()", "bar()")),
                Box::new(Rename::new("C2", &["R2"], "    foo", "    zap")),
            ],
        )
        .await;

        let file = report.file("A.java").unwrap();
        assert_eq!(file.changes.len(), 1);
        assert_eq!(file.changes[0].codemod, "C2");
        let conflicts: Vec<_> = file
            .skipped
            .iter()
            .filter(|s| s.reason == SkipReason::Conflict)
            .collect();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].codemod.as_deref(), Some("C1"));
        assert_round_trip_and_non_overlap(&report);
    }

    #[tokio::test]
    async fn test_unreadable_report_among_three() {
        let fixture = Fixture::new();
        fixture.source("A.java", A_JAVA);
        let first = fixture.report("one.sarif", &sarif(&[("R1", "A.java", 10)]));
        let second = fixture.report("two.sarif", &sarif(&[("R1", "A.java", 11)]));
        let missing = fixture.tmp.path().join("three.sarif");

        let report = run_with(
            &fixture,
            &[first, missing.clone(), second],
            vec![Box::new(Rename::new("C1", &["R1"], "foo()", "bar()"))],
        )
        .await;

        assert_eq!(report.run.reports.len(), 2);
        assert_eq!(report.report_errors.len(), 1);
        assert_eq!(report.report_errors[0].report, missing);
        assert_eq!(report.file("A.java").unwrap().changes.len(), 2);
        assert_eq!(report.totals.errors, 1);
    }

    #[tokio::test]
    async fn test_failing_codemod_is_isolated_and_reported_once() {
        let fixture = Fixture::new();
        fixture.source("A.java", A_JAVA);
        let report_path = fixture.report(
            "scan.sarif",
            &sarif(&[("R1", "A.java", 10), ("R2", "A.java", 11)]),
        );

        let report = run_with(
            &fixture,
            &[report_path],
            vec![
                Box::new(Rename::new("C1", &["R1"], "foo()", "bar()")),
                Box::new(Rename::failing("broken", &["R2"], "foo()")),
            ],
        )
        .await;

        let file = report.file("A.java").unwrap();
        assert_eq!(file.changes.len(), 1);
        assert_eq!(file.changes[0].start.line, 9);
        assert_eq!(file.errors.len(), 1);
        assert!(matches!(
            &file.errors[0],
            FileError::Codemod { codemod, error: CodemodError::Failed { .. }, .. } if codemod == "broken"
        ));
        assert_eq!(report.totals.errors, 1);
    }

    #[tokio::test]
    async fn test_syntax_error_is_contained_to_its_file() {
        let clean = Fixture::new();
        clean.source("A.java", A_JAVA);
        let broken = Fixture::new();
        broken
            .source("A.java", A_JAVA)
            .source("B.java", "class B { void x( }\n");

        let codemods = || -> Vec<Box<dyn Codemod>> {
            vec![Box::new(Rename::new("C1", &["R1"], "foo()", "bar()"))]
        };
        let body = sarif(&[("R1", "A.java", 10), ("R1", "B.java", 1)]);
        let clean_report = run_with(&clean, &[clean.report("s.sarif", &body)], codemods()).await;
        let broken_report = run_with(&broken, &[broken.report("s.sarif", &body)], codemods()).await;

        let b = broken_report.file("B.java").unwrap();
        assert!(b.changes.is_empty());
        assert_eq!(b.errors.len(), 1);
        assert!(matches!(b.errors[0], FileError::Parse { .. }));
        assert_eq!(b.skipped[0].reason, SkipReason::ParseFailed);

        let a_clean = serde_json::to_string(clean_report.file("A.java").unwrap()).unwrap();
        let a_broken = serde_json::to_string(broken_report.file("A.java").unwrap()).unwrap();
        assert_eq!(a_clean, a_broken);
    }

    #[tokio::test]
    async fn test_two_runs_are_byte_identical() {
        let fixture = Fixture::new();
        fixture
            .source("src/A.java", A_JAVA)
            .source("src/Rng.java", "import java.util.Random;\n\nclass Rng {\n  Random r = new Random();\n}\n");
        let report_path = fixture.report("scan.sarif", &sarif(&[("R1", "src/A.java", 10)]));

        let registry = Arc::new(default_registry());
        let first = run(&fixture.root, &[report_path.clone()], &CodemodSelection::all(), &registry, options())
            .await
            .unwrap();
        let second = run(&fixture.root, &[report_path], &CodemodSelection::all(), &registry, options())
            .await
            .unwrap();
        assert_eq!(first.to_json(), second.to_json());
    }

    #[tokio::test]
    async fn test_default_codemods_end_to_end_with_write_back() {
        let fixture = Fixture::new();
        fixture
            .source(
                "src/main/java/com/acme/Tokens.java",
                "package com.acme;\r\n\r\nimport java.util.Random;\r\nimport javax.net.ssl.SSLContext;\r\n\r\nclass Tokens {\r\n  Random rng = new Random();\r\n  Random seeded = new Random(42);\r\n\r\n  SSLContext ctx() throws Exception {\r\n    return SSLContext.getInstance(\"TLSv1\");\r\n  }\r\n}\r\n",
            )
            .source(
                "src/main/webapp/WEB-INF/web.xml",
                "<web-app>\n  <security-constraint>\n    <web-resource-collection>\n      <http-method>GET</http-method>\n    </web-resource-collection>\n  </security-constraint>\n</web-app>\n",
            );

        let registry = Arc::new(default_registry());
        let report = run(&fixture.root, &[], &CodemodSelection::all(), &registry, options())
            .await
            .unwrap();
        assert_round_trip_and_non_overlap(&report);
        assert_eq!(report.totals.files_changed, 2);

        let written = write_back(&report).await.unwrap();
        assert_eq!(written, 2);
        let java = fs::read_to_string(fixture.root.join("src/main/java/com/acme/Tokens.java")).unwrap();
        assert!(java.contains("Random rng = new java.security.SecureRandom();\r\n"));
        assert!(java.contains("new Random(42)"));
        assert!(java.contains("SSLContext.getInstance(\"TLSv1.2\")"));
        let xml = fs::read_to_string(fixture.root.join("src/main/webapp/WEB-INF/web.xml")).unwrap();
        assert!(!xml.contains("http-method"));
    }

    #[tokio::test]
    async fn test_findings_without_loaded_file_are_listed() {
        let fixture = Fixture::new();
        fixture.source("A.java", A_JAVA).source("gen/G.java", "class G {}\n");
        let report_path = fixture.report(
            "scan.sarif",
            &sarif(&[("R1", "gen/G.java", 1), ("R1", "Missing.java", 3)]),
        );

        let registry = Arc::new(CodemodRegistry::new(vec![Box::new(Rename::new(
            "C1",
            &["R1"],
            "foo()",
            "bar()",
        ))]));
        let opts = RunOptions {
            excludes: vec!["gen".to_string()],
            ..options()
        };
        let report = run(&fixture.root, &[report_path], &CodemodSelection::all(), &registry, opts)
            .await
            .unwrap();

        let reasons: Vec<(String, UnmatchedReason)> = report
            .unmatched_findings
            .iter()
            .map(|u| (display_path(&u.path), u.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("Missing.java".to_string(), UnmatchedReason::MissingFile),
                ("gen/G.java".to_string(), UnmatchedReason::Excluded),
            ]
        );
        assert_eq!(report.totals.findings_skipped, 2);
    }

    #[tokio::test]
    async fn test_cancelled_run_still_reports() {
        let fixture = Fixture::new();
        fixture.source("A.java", A_JAVA);
        let report_path = fixture.report("scan.sarif", &sarif(&[("R1", "A.java", 10)]));

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let observer: Observer = Arc::new(move |e: &PipelineEvent| {
            sink.lock().unwrap().push(e.clone());
        });
        let opts = RunOptions {
            observer: Some(observer),
            ..options()
        };
        opts.cancel.cancel();

        let registry = Arc::new(CodemodRegistry::new(vec![Box::new(Rename::new(
            "C1",
            &["R1"],
            "foo()",
            "bar()",
        ))]));
        let report = run(&fixture.root, &[report_path], &CodemodSelection::all(), &registry, opts)
            .await
            .unwrap();

        assert!(report.run.cancelled);
        assert!(report.files.is_empty());
        assert_eq!(report.unmatched_findings[0].reason, UnmatchedReason::Cancelled);
        let events = events.lock().unwrap();
        assert!(events.contains(&PipelineEvent::Cancelled { remaining: 1 }));
    }

    #[tokio::test]
    async fn test_environment_failures_are_fatal() {
        let fixture = Fixture::new();
        let registry = Arc::new(default_registry());

        let err = run(
            &fixture.root.join("absent"),
            &[],
            &CodemodSelection::all(),
            &registry,
            options(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FatalError>(),
            Some(FatalError::UnreadableRoot { .. })
        ));

        let err = run(
            &fixture.root,
            &[],
            &CodemodSelection::only(["pixee:java/unknown"]),
            &registry,
            options(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FatalError>(),
            Some(FatalError::InvalidSelection(_))
        ));
    }
}
