use anyhow::Result;

use super::changeset::Report;
use super::traits::Reporter;

/// Concatenated unified diffs of every changed file, suitable for `git apply`.
pub struct PatchReporter;

impl Reporter for PatchReporter {
    fn name(&self) -> &str {
        "patch"
    }

    fn extension(&self) -> &str {
        "patch"
    }

    fn generate(&self, report: &Report) -> Result<String> {
        let mut out = String::new();
        for file in report.changed_files() {
            out.push_str(&file.unified_diff);
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }
        Ok(out)
    }
}
