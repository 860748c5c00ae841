use anyhow::Result;

use super::changeset::Report;

pub trait Reporter: Send + Sync {
    /// Reporter name for display
    fn name(&self) -> &str;

    /// File extension for the output file
    fn extension(&self) -> &str;

    /// Render the change-set
    fn generate(&self, report: &Report) -> Result<String>;
}
