use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use crate::codemods::default_registry;
use crate::codemods::registry::CodemodRegistry;
use crate::core::config::CONFIG_FILE;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path to the project (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite an existing .codefixer.yml
    #[arg(long)]
    pub force: bool,
}

pub async fn execute(args: &InitArgs) -> Result<()> {
    let path = args.path.canonicalize()?;
    let config_path = path.join(CONFIG_FILE);

    if config_path.exists() && !args.force {
        println!(
            "  {} {} already exists. Use {} to overwrite.",
            "SKIP".yellow(),
            CONFIG_FILE,
            "--force".bold()
        );
        return Ok(());
    }

    let config = generate_config(&default_registry());
    std::fs::write(&config_path, config)?;
    println!("  {} {} created", "DONE".green(), CONFIG_FILE);
    println!(
        "  Edit {} to choose codemods and paths.",
        config_path.display()
    );

    Ok(())
}

fn generate_config(registry: &CodemodRegistry) -> String {
    let codemods: String = registry
        .iter()
        .map(|c| format!("    # - {}  # {}\n", c.id(), c.summary()))
        .collect();

    format!(
        r#"# codefixer configuration

rules:
  # Whether codemods run by default (enabled, disabled)
  default: enabled
  # Codemods that invert the default
  exceptions: []
{codemods}
paths:
  # Globs or path prefixes; append :<line> to target a single line
  include: []
  exclude:
    - "**/generated/**"

limits:
  # Per-file read and parse deadline
  file_timeout_ms: 5000
  # Larger files are reported and left alone
  max_file_bytes: 2097152

# Worker threads, 0 = one per core
threads: 0
"#
    )
}
