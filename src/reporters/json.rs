use anyhow::Result;

use super::changeset::Report;
use super::traits::Reporter;

/// The versioned change-set document.
pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn name(&self) -> &str {
        "change-set"
    }

    fn extension(&self) -> &str {
        "json"
    }

    fn generate(&self, report: &Report) -> Result<String> {
        let mut out = report.to_json();
        out.push('\n');
        Ok(out)
    }
}
