use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::core::error::{FatalError, ParseError};
use crate::core::filter::PathFilter;
use crate::model::source::{Language, SourceUnit};
use crate::utils::fs::find_source_files;

/// Files read at the same time.
const READ_CONCURRENCY: usize = 32;

#[derive(Debug, Clone)]
pub struct Project {
    /// Canonical project root
    pub path: PathBuf,
}

impl Project {
    pub fn new(path: &Path) -> Result<Self, FatalError> {
        let unreadable = |reason: String| FatalError::UnreadableRoot {
            path: path.to_path_buf(),
            reason,
        };
        let canonical = path.canonicalize().map_err(|e| unreadable(e.to_string()))?;
        if !canonical.is_dir() {
            return Err(unreadable("not a directory".to_string()));
        }
        std::fs::read_dir(&canonical).map_err(|e| unreadable(e.to_string()))?;
        Ok(Self { path: canonical })
    }

    /// Source files the filter lets in, root-relative and sorted.
    pub fn discover(&self, filter: &PathFilter) -> Vec<PathBuf> {
        find_source_files(&self.path)
            .into_iter()
            .filter(|p| filter.allows_file(p))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoadLimits {
    pub timeout: Duration,
    pub max_bytes: u64,
}

/// Raw contents of one discovered file, or why it could not be read.
pub type RawSource = (PathBuf, Result<Vec<u8>, ParseError>);

/// Reads every file with a per-file deadline and size cap. Failures are
/// returned per file; the result keeps the order of `files`.
pub async fn read_sources(root: &Path, files: &[PathBuf], limits: LoadLimits) -> Vec<RawSource> {
    let permits = Arc::new(Semaphore::new(READ_CONCURRENCY));
    let mut tasks = JoinSet::new();

    for (index, relative) in files.iter().enumerate() {
        let absolute = root.join(relative);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            (index, read_one(&absolute, limits).await)
        });
    }

    let mut slots: Vec<Option<Result<Vec<u8>, ParseError>>> = vec![None; files.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => tracing::warn!(error = %e, "source read task failed"),
        }
    }

    files
        .iter()
        .cloned()
        .zip(slots)
        .map(|(path, slot)| {
            let result = slot.unwrap_or_else(|| {
                Err(ParseError::Io {
                    reason: "read task aborted".to_string(),
                })
            });
            (path, result)
        })
        .collect()
}

async fn read_one(path: &Path, limits: LoadLimits) -> Result<Vec<u8>, ParseError> {
    let io = |e: std::io::Error| ParseError::Io {
        reason: e.to_string(),
    };
    let timed_out = || ParseError::Timeout {
        timeout_ms: limits.timeout.as_millis() as u64,
    };

    let metadata = tokio::time::timeout(limits.timeout, tokio::fs::metadata(path))
        .await
        .map_err(|_| timed_out())?
        .map_err(io)?;
    if metadata.len() > limits.max_bytes {
        return Err(ParseError::TooLarge {
            size: metadata.len(),
            limit: limits.max_bytes,
        });
    }

    tokio::time::timeout(limits.timeout, tokio::fs::read(path))
        .await
        .map_err(|_| timed_out())?
        .map_err(io)
}

/// Decodes and parses every file in parallel. Order follows `raw`.
pub fn parse_units(raw: Vec<RawSource>, parse_timeout: Duration) -> Vec<SourceUnit> {
    raw.into_par_iter()
        .filter_map(|(path, bytes)| {
            let language = Language::from_path(&path)?;
            let unit = match bytes {
                Ok(bytes) => SourceUnit::from_bytes(path, language, &bytes, parse_timeout),
                Err(err) => SourceUnit::failed(path, language, err),
            };
            if let Some(err) = unit.parse_error() {
                tracing::debug!(file = %unit.path.display(), error = %err, "file excluded from transformation");
            }
            Some(unit)
        })
        .collect()
}
