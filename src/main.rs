mod cli;
mod codemods;
mod core;
mod findings;
mod model;
mod reporters;
mod transform;
mod utils;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn init_logging(verbose: bool) {
    let default = if verbose {
        "codefixer=debug,warn"
    } else {
        "codefixer=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Fix(args) => {
            cli::commands::fix::execute(args, cli.verbose).await?;
        }
        Commands::Codemods(args) => {
            cli::commands::codemods::execute(args).await?;
        }
        Commands::Init(args) => {
            cli::commands::init::execute(args).await?;
        }
    }

    Ok(())
}
