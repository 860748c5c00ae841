use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::codemods::traits::CodemodSelection;
use crate::core::error::FatalError;

pub const CONFIG_FILE: &str = ".codefixer.yml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rules: CodemodSelection,
    pub paths: PathsConfig,
    pub limits: LimitsConfig,
    /// Worker threads for per-file work; 0 lets rayon decide
    pub threads: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub file_timeout_ms: u64,
    pub max_file_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            file_timeout_ms: 5_000,
            max_file_bytes: 2 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Reads `<root>/.codefixer.yml`. A missing file gives the defaults; a
    /// file that exists but cannot be read or parsed is fatal.
    pub fn load(project_path: &Path) -> Result<Self, FatalError> {
        let config_path = project_path.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Config::default());
        }
        let invalid = |reason: String| FatalError::InvalidConfig {
            path: config_path.clone(),
            reason,
        };
        let content = std::fs::read_to_string(&config_path).map_err(|e| invalid(e.to_string()))?;
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(&content).map_err(|e| invalid(e.to_string()))
    }
}
