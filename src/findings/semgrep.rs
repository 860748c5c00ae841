use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::traits::{
    normalize_report_path, Finding, FindingSource, Location, NormalizeContext, ParsedReport,
    Severity,
};
use crate::model::span::{ByteSpan, ColumnUnit, Position};

/// Semgrep's native `--json` output.
///
/// Lines and columns are 1-based, the end column is exclusive and `offset`
/// is a 0-based byte offset into the file.
pub struct SemgrepSource;

#[derive(Debug, Deserialize)]
struct SemgrepOutput {
    #[serde(default)]
    results: Vec<SemgrepResult>,
}

#[derive(Debug, Deserialize)]
struct SemgrepResult {
    check_id: String,
    path: String,
    start: SemgrepPosition,
    end: SemgrepPosition,
    #[serde(default)]
    extra: Option<Extra>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct SemgrepPosition {
    line: u32,
    col: u32,
    #[serde(default)]
    offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct Extra {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    metadata: Option<BTreeMap<String, Value>>,
}

impl SemgrepPosition {
    fn normalized(&self) -> Position {
        Position::new(self.line.saturating_sub(1), self.col.saturating_sub(1))
    }
}

impl FindingSource for SemgrepSource {
    fn name(&self) -> &'static str {
        "semgrep-json"
    }

    fn detects(&self, document: &Value) -> bool {
        document.get("runs").is_none()
            && document
                .get("results")
                .and_then(Value::as_array)
                .map(|results| results.iter().all(|r| r.get("check_id").is_some()))
                .unwrap_or(false)
    }

    fn parse(&self, document: &Value, ctx: &NormalizeContext) -> Result<ParsedReport> {
        let output = SemgrepOutput::deserialize(document)
            .context("document is not Semgrep JSON output")?;

        let mut parsed = ParsedReport {
            tools: vec!["semgrep".to_string()],
            ..ParsedReport::default()
        };
        for result in output.results {
            let start = result.start.normalized();
            let end = result.end.normalized().max(start);
            let bytes = match (result.start.offset, result.end.offset) {
                (Some(s), Some(e)) if e >= s => Some(ByteSpan::new(s, e)),
                _ => None,
            };
            let extra = result.extra.as_ref();
            let mut metadata = BTreeMap::new();
            if let Some(values) = extra.and_then(|e| e.metadata.as_ref()) {
                for (key, value) in values {
                    let text = match value {
                        Value::String(s) => s.clone(),
                        Value::Null => continue,
                        other => other.to_string(),
                    };
                    metadata.insert(key.clone(), text);
                }
            }

            let finding = Finding::new(
                "semgrep",
                &result.check_id,
                normalize_report_path(&result.path, ctx.root),
                Location {
                    start,
                    end,
                    bytes,
                    columns: ColumnUnit::Chars,
                },
                Severity::from_semgrep(extra.and_then(|e| e.severity.as_deref())),
            )
            .with_message(extra.and_then(|e| e.message.clone()))
            .with_metadata(metadata);
            parsed.findings.push(finding);
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_parses_semgrep_results() {
        let doc = serde_json::json!({
            "version": "1.50.0",
            "results": [{
                "check_id": "java.lang.security.audit.jwt-decode-without-verify",
                "path": "src/Auth.java",
                "start": {"line": 12, "col": 9, "offset": 301},
                "end": {"line": 12, "col": 40, "offset": 332},
                "extra": {
                    "message": "JWT parsed without verification",
                    "severity": "ERROR",
                    "metadata": {"cwe": ["CWE-345"], "confidence": "HIGH"}
                }
            }],
            "errors": []
        });
        assert!(SemgrepSource.detects(&doc));

        let ctx = NormalizeContext {
            root: Path::new("/repo"),
        };
        let parsed = SemgrepSource.parse(&doc, &ctx).unwrap();
        let finding = &parsed.findings[0];
        assert_eq!(finding.tool, "semgrep");
        assert_eq!(finding.path, PathBuf::from("src/Auth.java"));
        assert_eq!(finding.location.start, Position::new(11, 8));
        assert_eq!(finding.location.end, Position::new(11, 39));
        assert_eq!(finding.location.bytes, Some(ByteSpan::new(301, 332)));
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.metadata["confidence"], "HIGH");
        assert_eq!(finding.metadata["cwe"], "[\"CWE-345\"]");
    }

    #[test]
    fn test_does_not_claim_sarif() {
        let doc = serde_json::json!({"runs": [], "results": []});
        assert!(!SemgrepSource.detects(&doc));
    }
}
