use anyhow::{anyhow, Result};
use clap::Args;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::output::OutputFormatter;
use crate::cli::progress::RunProgress;
use crate::codemods::default_registry;
use crate::codemods::traits::{CodemodSelection, DefaultRule};
use crate::core::config::Config;
use crate::core::error::FatalError;
use crate::core::pipeline::{self, RunOptions};
use crate::reporters::reporter_for;

#[derive(Args, Debug)]
pub struct FixArgs {
    /// Path to the project to fix (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// SARIF or Semgrep JSON report; repeat for several, the format is detected
    #[arg(long = "report", visible_alias = "sarif", value_name = "FILE")]
    pub reports: Vec<PathBuf>,

    /// Where to write the change-set
    #[arg(long, short, default_value = "codefixer.json")]
    pub output: PathBuf,

    /// Change-set format
    #[arg(long, default_value = "json", value_parser = ["json", "patch"])]
    pub format: String,

    /// Rewrite changed files on disk
    #[arg(long)]
    pub write: bool,

    /// Whether codemods run unless listed as exceptions
    #[arg(long, value_parser = ["enabled", "disabled"])]
    pub default_rules: Option<String>,

    /// Codemod ids that invert the default (comma-separated)
    #[arg(long = "rule-exception", value_delimiter = ',')]
    pub rule_exceptions: Vec<String>,

    /// Only touch paths matching these patterns (glob or prefix, optional :line)
    #[arg(long, value_delimiter = ',')]
    pub include: Vec<String>,

    /// Never touch paths matching these patterns (glob or prefix, optional :line)
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Worker threads (0 = one per core)
    #[arg(long)]
    pub threads: Option<usize>,
}

impl FixArgs {
    /// Config file values with command-line flags layered on top.
    fn merge(&self, config: &Config) -> (CodemodSelection, RunOptions) {
        let mut selection = config.rules.clone();
        match self.default_rules.as_deref() {
            Some("disabled") => selection.default = DefaultRule::Disabled,
            Some("enabled") => selection.default = DefaultRule::Enabled,
            _ => {}
        }
        if !self.rule_exceptions.is_empty() {
            selection.exceptions = self.rule_exceptions.clone();
        }

        let mut options = RunOptions::from_config(config);
        if !self.include.is_empty() {
            options.includes = self.include.clone();
        }
        if !self.exclude.is_empty() {
            options.excludes = self.exclude.clone();
        }
        if let Some(threads) = self.threads {
            options.threads = threads;
        }
        (selection, options)
    }
}

pub async fn execute(args: &FixArgs, verbose: bool) -> Result<()> {
    let config = Config::load(&args.path)?;
    let (selection, mut options) = args.merge(&config);
    let reporter =
        reporter_for(&args.format).ok_or_else(|| anyhow!("unknown format {}", args.format))?;
    ensure_writable(&args.output)?;

    let cancel = options.cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing files in progress");
            cancel.cancel();
        }
    });

    let progress = RunProgress::new();
    options.observer = Some(progress.observer());
    let registry = Arc::new(default_registry());
    let outcome = pipeline::run(&args.path, &args.reports, &selection, &registry, options).await;
    progress.finish();
    interrupt.abort();
    let report = outcome?;

    let content = reporter.generate(&report)?;
    tokio::fs::write(&args.output, content)
        .await
        .map_err(|e| FatalError::OutputNotWritable {
            path: args.output.clone(),
            reason: e.to_string(),
        })?;

    let written = if args.write {
        Some(pipeline::write_back(&report).await?)
    } else {
        None
    };

    OutputFormatter::new(verbose).display(&report, &args.output, written);
    Ok(())
}

/// Fails before any work is done if the change-set could not be saved.
/// Leaves no file behind when the output did not exist yet.
fn ensure_writable(output: &Path) -> Result<(), FatalError> {
    let not_writable = |e: std::io::Error| FatalError::OutputNotWritable {
        path: output.to_path_buf(),
        reason: e.to_string(),
    };
    if output.exists() {
        return OpenOptions::new()
            .append(true)
            .open(output)
            .map(|_| ())
            .map_err(not_writable);
    }
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(output)
        .map_err(not_writable)?;
    std::fs::remove_file(output).map_err(not_writable)
}
