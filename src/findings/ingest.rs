use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::sarif::SarifSource;
use super::semgrep::SemgrepSource;
use super::traits::{Finding, FindingKey, FindingSource, NormalizeContext};
use crate::core::error::MalformedReportError;

/// What one successfully ingested report contributed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub path: PathBuf,
    pub format: String,
    pub tools: Vec<String>,
    pub findings: usize,
    pub dropped: usize,
}

#[derive(Debug, Default)]
pub struct Ingestion {
    pub findings: Vec<Finding>,
    pub reports: Vec<ReportSummary>,
    pub errors: Vec<MalformedReportError>,
}

pub struct Ingestor {
    sources: Vec<Box<dyn FindingSource>>,
    read_timeout: Duration,
}

impl Ingestor {
    pub fn new(sources: Vec<Box<dyn FindingSource>>, read_timeout: Duration) -> Self {
        Self {
            sources,
            read_timeout,
        }
    }

    /// Reads and normalizes every report. A report that fails is recorded and
    /// the others are still ingested.
    pub async fn ingest(&self, reports: &[PathBuf], root: &Path) -> Ingestion {
        let mut ingestion = Ingestion::default();
        let mut collected = Vec::new();

        for path in reports {
            match self.ingest_one(path, root).await {
                Ok((summary, findings)) => {
                    tracing::info!(
                        report = %path.display(),
                        format = %summary.format,
                        findings = summary.findings,
                        "ingested report"
                    );
                    collected.extend(findings);
                    ingestion.reports.push(summary);
                }
                Err(err) => {
                    tracing::warn!(report = %path.display(), reason = %err.reason, "malformed report");
                    ingestion.errors.push(err);
                }
            }
        }

        ingestion.findings = deduplicate(collected);
        ingestion
    }

    async fn ingest_one(
        &self,
        path: &Path,
        root: &Path,
    ) -> Result<(ReportSummary, Vec<Finding>), MalformedReportError> {
        let malformed = |reason: String| MalformedReportError {
            report: path.to_path_buf(),
            reason,
        };

        let bytes = match tokio::time::timeout(self.read_timeout, tokio::fs::read(path)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Err(malformed(format!("unreadable: {}", e))),
            Err(_) => {
                return Err(malformed(format!(
                    "read timed out after {}ms",
                    self.read_timeout.as_millis()
                )))
            }
        };

        let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes);
        let document: Value =
            serde_json::from_slice(body).map_err(|e| malformed(format!("invalid JSON: {}", e)))?;

        let source = self
            .sources
            .iter()
            .find(|s| s.detects(&document))
            .ok_or_else(|| malformed("unrecognized report format".to_string()))?;

        let ctx = NormalizeContext { root };
        let parsed = source
            .parse(&document, &ctx)
            .map_err(|e| malformed(format!("{:#}", e)))?;

        let summary = ReportSummary {
            path: path.to_path_buf(),
            format: source.name().to_string(),
            tools: parsed.tools,
            findings: parsed.findings.len(),
            dropped: parsed.dropped,
        };
        Ok((summary, parsed.findings))
    }
}

/// Collapses findings with the same identity, keeping the most severe copy.
/// The result is ordered by path, location, rule and tool.
pub fn deduplicate(findings: Vec<Finding>) -> Vec<Finding> {
    let mut unique: BTreeMap<FindingKey, Finding> = BTreeMap::new();
    for finding in findings {
        let key = finding.key();
        match unique.get(&key) {
            Some(existing) if existing.severity >= finding.severity => {}
            _ => {
                unique.insert(key, finding);
            }
        }
    }

    let mut ordered: Vec<Finding> = unique.into_values().collect();
    ordered.sort_by(|a, b| {
        (&a.path, &a.location, &a.rule, &a.tool).cmp(&(&b.path, &b.location, &b.rule, &b.tool))
    });
    ordered
}

pub fn default_ingestor(read_timeout: Duration) -> Ingestor {
    let sources: Vec<Box<dyn FindingSource>> = vec![Box::new(SarifSource), Box::new(SemgrepSource)];
    Ingestor::new(sources, read_timeout)
}
