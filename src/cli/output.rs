use colored::*;
use std::path::Path;

use crate::reporters::changeset::Report;
use crate::transform::executor::FileError;

pub struct OutputFormatter {
    verbose: bool,
}

impl OutputFormatter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn display(&self, report: &Report, output: &Path, written: Option<usize>) {
        // Header
        println!();
        println!("{}", format!("codefixer v{}", report.run.version).bold());
        println!("{}", "─".repeat(64));
        println!();
        println!("  Project:  {}", report.run.root.to_string_lossy().cyan());
        println!(
            "  Reports:  {} ingested, {} malformed",
            report.run.reports.len(),
            report.report_errors.len()
        );
        println!(
            "  Run completed in {:.1}s",
            report.run.elapsed_ms as f64 / 1000.0
        );
        if report.run.cancelled {
            println!("  {}", "Cancelled: partial change-set".yellow().bold());
        }
        println!();
        println!("{}", "─".repeat(64));
        println!();

        for error in &report.report_errors {
            println!("  {} {}", "REPORT".red().bold(), error);
        }

        for file in &report.files {
            let path = file.path.to_string_lossy();
            if file.is_changed() {
                println!(
                    "  {} {} ({} change{})",
                    "FIXED".green(),
                    path,
                    file.changes.len(),
                    if file.changes.len() == 1 { "" } else { "s" }
                );
                if self.verbose {
                    for hunk in &file.changes {
                        println!(
                            "           line {}: {}",
                            hunk.start.line + 1,
                            hunk.codemod.dimmed()
                        );
                    }
                }
            }
            if !file.skipped.is_empty() && (self.verbose || !file.is_changed()) {
                println!("  {} {} ({} skipped)", "SKIP".yellow(), path, file.skipped.len());
                if self.verbose {
                    for skip in &file.skipped {
                        println!(
                            "           {}{}",
                            skip.reason.as_str(),
                            skip.detail
                                .as_ref()
                                .map(|d| format!(": {}", d.dimmed()))
                                .unwrap_or_default()
                        );
                    }
                }
            }
            for error in &file.errors {
                let message = match error {
                    FileError::Parse { message, .. } => message.clone(),
                    FileError::Codemod { codemod, message, .. } => format!("[{}] {}", codemod, message),
                };
                println!("  {} {} {}", "ERROR".red(), path, message);
            }
        }

        // Summary
        let totals = &report.totals;
        println!();
        println!("{}", "─".repeat(64));
        println!();
        println!("  SUMMARY");
        println!(
            "    {} files scanned, {} changed ({} hunks)",
            totals.files_scanned, totals.files_changed, totals.hunks
        );
        println!(
            "    {} findings: {} addressed, {} skipped",
            totals.findings_ingested, totals.findings_addressed, totals.findings_skipped
        );
        if totals.errors > 0 {
            println!("    {}", format!("{} errors", totals.errors).red());
        }
        if totals.resolution_gaps > 0 {
            println!("    {} unresolved type references", totals.resolution_gaps);
        }
        println!("    Change-set written to {}", output.display().to_string().cyan());
        match written {
            Some(n) => println!("    {}", format!("{} files rewritten on disk", n).green()),
            None if totals.files_changed > 0 => {
                println!("    {}", "Dry run: pass --write to apply the changes".dimmed())
            }
            None => {}
        }
        println!();
    }
}
