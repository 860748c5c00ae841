use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::traits::{
    normalize_report_path, Finding, FindingSource, Location, NormalizeContext, ParsedReport,
    Severity,
};
use crate::model::span::{ByteSpan, ColumnUnit, Position};

/// SARIF 2.1.0 logs, as produced by CodeQL, Semgrep `--sarif`, Contrast and others.
pub struct SarifSource;

#[derive(Debug, Deserialize)]
struct SarifLog {
    #[serde(default)]
    runs: Vec<Run>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Run {
    tool: Tool,
    #[serde(default)]
    results: Option<Vec<SarifResult>>,
    #[serde(default)]
    column_kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Tool {
    driver: Driver,
}

#[derive(Debug, Deserialize)]
struct Driver {
    name: String,
    #[serde(default)]
    rules: Vec<RuleDescriptor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleDescriptor {
    id: String,
    #[serde(default)]
    default_configuration: Option<RuleConfiguration>,
    #[serde(default)]
    properties: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RuleConfiguration {
    #[serde(default)]
    level: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SarifResult {
    #[serde(default)]
    rule_id: Option<String>,
    #[serde(default)]
    rule_index: Option<usize>,
    #[serde(default)]
    rule: Option<RuleReference>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    locations: Vec<SarifLocation>,
    #[serde(default)]
    properties: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RuleReference {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SarifLocation {
    #[serde(default)]
    physical_location: Option<PhysicalLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhysicalLocation {
    #[serde(default)]
    artifact_location: Option<ArtifactLocation>,
    #[serde(default)]
    region: Option<Region>,
}

#[derive(Debug, Deserialize)]
struct ArtifactLocation {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Region {
    #[serde(default)]
    start_line: Option<u32>,
    #[serde(default)]
    start_column: Option<u32>,
    #[serde(default)]
    end_line: Option<u32>,
    #[serde(default)]
    end_column: Option<u32>,
    #[serde(default)]
    byte_offset: Option<usize>,
    #[serde(default)]
    byte_length: Option<usize>,
}

impl Region {
    /// SARIF lines and columns are 1-based and `endColumn` is exclusive. A
    /// byte range that overflows drops the region.
    fn to_location(&self, columns: ColumnUnit) -> Option<Location> {
        let bytes = match self.byte_offset {
            Some(offset) => {
                let end = offset.checked_add(self.byte_length.unwrap_or(0))?;
                Some(ByteSpan::new(offset, end))
            }
            None => None,
        };
        let start_line = match self.start_line {
            Some(line) if line >= 1 => line - 1,
            Some(_) => return None,
            None if bytes.is_some() => 0,
            None => return None,
        };
        let start = Position::new(start_line, self.start_column.unwrap_or(1).saturating_sub(1));
        let end_line = self
            .end_line
            .map(|l| l.saturating_sub(1))
            .unwrap_or(start_line)
            .max(start_line);
        let end = match self.end_column {
            Some(column) => Position::new(end_line, column.saturating_sub(1)),
            None => Position::new(end_line + 1, 0),
        };
        Some(Location {
            start,
            end: end.max(start),
            bytes,
            columns,
        })
    }
}

impl Run {
    /// `columnKind` defaults to `utf16CodeUnits`.
    fn column_unit(&self) -> ColumnUnit {
        match self.column_kind.as_deref() {
            Some("unicodeCodePoints") => ColumnUnit::Chars,
            _ => ColumnUnit::Utf16,
        }
    }
}

impl SarifSource {
    fn rule_id(result: &SarifResult, rules: &[RuleDescriptor]) -> Option<String> {
        if let Some(id) = &result.rule_id {
            return Some(id.clone());
        }
        if let Some(id) = result.rule.as_ref().and_then(|r| r.id.clone()) {
            return Some(id);
        }
        result
            .rule_index
            .or_else(|| result.rule.as_ref().and_then(|r| r.index))
            .and_then(|index| rules.get(index))
            .map(|rule| rule.id.clone())
    }

    fn severity(result: &SarifResult, rule: Option<&RuleDescriptor>) -> Severity {
        let score = rule
            .and_then(|r| r.properties.as_ref())
            .and_then(|p| p.get("security-severity"))
            .and_then(|v| match v {
                Value::String(s) => s.parse::<f64>().ok(),
                Value::Number(n) => n.as_f64(),
                _ => None,
            });
        if let Some(score) = score {
            return Severity::from_score(score);
        }
        let level = result.level.as_deref().or_else(|| {
            rule.and_then(|r| r.default_configuration.as_ref())
                .and_then(|c| c.level.as_deref())
        });
        Severity::from_sarif_level(level)
    }

    fn metadata(result: &SarifResult) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        if let Some(properties) = &result.properties {
            for (key, value) in properties {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => continue,
                    other => other.to_string(),
                };
                metadata.insert(key.clone(), text);
            }
        }
        metadata
    }
}

impl FindingSource for SarifSource {
    fn name(&self) -> &'static str {
        "sarif"
    }

    fn detects(&self, document: &Value) -> bool {
        document.get("runs").map(Value::is_array).unwrap_or(false)
    }

    fn parse(&self, document: &Value, ctx: &NormalizeContext) -> Result<ParsedReport> {
        let log: SarifLog =
            SarifLog::deserialize(document).context("document is not a SARIF log")?;
        if log.runs.is_empty() {
            bail!("SARIF log has no runs");
        }

        let mut parsed = ParsedReport::default();
        for run in &log.runs {
            let tool = run.tool.driver.name.to_ascii_lowercase();
            parsed.tools.push(tool.clone());
            let rules = &run.tool.driver.rules;
            let columns = run.column_unit();

            for result in run.results.iter().flatten() {
                let Some(rule) = Self::rule_id(result, rules) else {
                    tracing::debug!(tool = %tool, "dropping SARIF result without a rule id");
                    parsed.dropped += 1;
                    continue;
                };
                let physical = result
                    .locations
                    .first()
                    .and_then(|l| l.physical_location.as_ref());
                let uri = physical
                    .and_then(|p| p.artifact_location.as_ref())
                    .and_then(|a| a.uri.as_deref());
                let location = physical
                    .and_then(|p| p.region.as_ref())
                    .and_then(|r| r.to_location(columns));
                let (Some(uri), Some(location)) = (uri, location) else {
                    tracing::debug!(tool = %tool, rule = %rule, "dropping SARIF result without a region");
                    parsed.dropped += 1;
                    continue;
                };

                let descriptor = rules.iter().find(|r| r.id == rule);
                let finding = Finding::new(
                    &tool,
                    &rule,
                    normalize_report_path(uri, ctx.root),
                    location,
                    Self::severity(result, descriptor),
                )
                .with_message(result.message.as_ref().and_then(|m| m.text.clone()))
                .with_metadata(Self::metadata(result));
                parsed.findings.push(finding);
            }
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn parse(doc: Value) -> ParsedReport {
        let ctx = NormalizeContext {
            root: Path::new("/repo"),
        };
        SarifSource.parse(&doc, &ctx).unwrap()
    }

    #[test]
    fn test_normalizes_one_based_region() {
        let doc = serde_json::json!({
            "version": "2.1.0",
            "runs": [{
                "tool": {"driver": {"name": "CodeQL"}},
                "results": [{
                    "ruleId": "java/insecure-randomness",
                    "level": "error",
                    "message": {"text": "Weak PRNG"},
                    "locations": [{"physicalLocation": {
                        "artifactLocation": {"uri": "src/A.java"},
                        "region": {"startLine": 10, "startColumn": 5, "endColumn": 17}
                    }}]
                }]
            }]
        });
        let parsed = parse(doc);
        assert_eq!(parsed.tools, vec!["codeql".to_string()]);
        let finding = &parsed.findings[0];
        assert_eq!(finding.rule, "java/insecure-randomness");
        assert_eq!(finding.path, PathBuf::from("src/A.java"));
        assert_eq!(finding.location.start, Position::new(9, 4));
        assert_eq!(finding.location.end, Position::new(9, 16));
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.message.as_deref(), Some("Weak PRNG"));
    }

    #[test]
    fn test_rule_index_and_security_severity() {
        let doc = serde_json::json!({
            "runs": [{
                "tool": {"driver": {"name": "CodeQL", "rules": [
                    {"id": "java/weak-ssl-protocol", "properties": {"security-severity": "9.1"}}
                ]}},
                "results": [{
                    "ruleIndex": 0,
                    "locations": [{"physicalLocation": {
                        "artifactLocation": {"uri": "file:///repo/src/B.java"},
                        "region": {"startLine": 3}
                    }}]
                }]
            }]
        });
        let parsed = parse(doc);
        let finding = &parsed.findings[0];
        assert_eq!(finding.rule, "java/weak-ssl-protocol");
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.path, PathBuf::from("src/B.java"));
        assert_eq!(finding.location.line_range(), (2, 2));
        assert_eq!(finding.location.columns, ColumnUnit::Utf16);
    }

    #[test]
    fn test_drops_results_without_region() {
        let doc = serde_json::json!({
            "runs": [{
                "tool": {"driver": {"name": "x"}},
                "results": [{"ruleId": "r", "locations": []}]
            }]
        });
        let parsed = parse(doc);
        assert!(parsed.findings.is_empty());
        assert_eq!(parsed.dropped, 1);
    }

    #[test]
    fn test_rejects_log_without_runs() {
        let ctx = NormalizeContext {
            root: Path::new("/repo"),
        };
        let doc = serde_json::json!({"runs": []});
        assert!(SarifSource.parse(&doc, &ctx).is_err());
    }

    #[test]
    fn test_byte_region() {
        let doc = serde_json::json!({
            "runs": [{
                "tool": {"driver": {"name": "x"}},
                "results": [{"ruleId": "r", "locations": [{"physicalLocation": {
                    "artifactLocation": {"uri": "A.java"},
                    "region": {"byteOffset": 40, "byteLength": 5}
                }}]}]
            }]
        });
        let parsed = parse(doc);
        assert_eq!(parsed.findings[0].location.bytes, Some(ByteSpan::new(40, 45)));
    }

    #[test]
    fn test_code_point_column_kind() {
        let doc = serde_json::json!({
            "runs": [{
                "tool": {"driver": {"name": "x"}},
                "columnKind": "unicodeCodePoints",
                "results": [{"ruleId": "r", "locations": [{"physicalLocation": {
                    "artifactLocation": {"uri": "A.java"},
                    "region": {"startLine": 2, "startColumn": 3}
                }}]}]
            }]
        });
        let parsed = parse(doc);
        assert_eq!(parsed.findings[0].location.columns, ColumnUnit::Chars);
        assert_eq!(parsed.findings[0].location.start, Position::new(1, 2));
    }

    #[test]
    fn test_overflowing_byte_region_is_dropped() {
        let doc = serde_json::json!({
            "runs": [{
                "tool": {"driver": {"name": "x"}},
                "results": [
                    {"ruleId": "r", "locations": [{"physicalLocation": {
                        "artifactLocation": {"uri": "A.java"},
                        "region": {"byteOffset": u64::MAX, "byteLength": 2}
                    }}]},
                    {"ruleId": "r", "locations": [{"physicalLocation": {
                        "artifactLocation": {"uri": "A.java"},
                        "region": {"startLine": 1}
                    }}]}
                ]
            }]
        });
        let parsed = parse(doc);
        assert_eq!(parsed.findings.len(), 1);
        assert_eq!(parsed.dropped, 1);
    }
}
