pub mod commands;
pub mod output;
pub mod progress;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "codefixer",
    version,
    about = "Fix static-analysis findings in Java projects with codemods"
)]
pub struct Cli {
    /// Log every skip and pipeline step
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply codemods to the findings in one or more reports
    Fix(commands::fix::FixArgs),
    /// List the available codemods
    Codemods(commands::codemods::CodemodsArgs),
    /// Create a .codefixer.yml configuration file
    Init(commands::init::InitArgs),
}
