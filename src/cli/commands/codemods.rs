use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::codemods::default_registry;
use crate::codemods::registry::CodemodRegistry;

#[derive(Args, Debug)]
pub struct CodemodsArgs {
    /// Print the catalogue as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: &CodemodsArgs) -> Result<()> {
    let registry = default_registry();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&catalogue(&registry))?);
        return Ok(());
    }

    println!();
    for codemod in registry.iter() {
        let mode = if codemod.scans() { "pattern" } else { "findings" };
        println!(
            "  {} {} ({}, priority {})",
            codemod.id().cyan().bold(),
            codemod.version(),
            mode,
            codemod.priority()
        );
        println!("      {}", codemod.summary());
        if !codemod.handles().is_empty() {
            println!("      Rules: {}", codemod.handles().join(", ").dimmed());
        }
        println!();
    }
    Ok(())
}

fn catalogue(registry: &CodemodRegistry) -> serde_json::Value {
    let entries: Vec<serde_json::Value> = registry
        .iter()
        .map(|c| {
            serde_json::json!({
                "id": c.id(),
                "version": c.version(),
                "summary": c.summary(),
                "priority": c.priority(),
                "rules": c.handles(),
                "scans": c.scans(),
                "requires_resolution": c.requires_resolution(),
            })
        })
        .collect();
    serde_json::Value::Array(entries)
}
