use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort the whole run. Everything else is recorded in the report.
#[derive(Error, Debug)]
pub enum FatalError {
    #[error("cannot read project root {path}: {reason}")]
    UnreadableRoot { path: PathBuf, reason: String },

    #[error("cannot write output {path}: {reason}")]
    OutputNotWritable { path: PathBuf, reason: String },

    #[error("invalid configuration {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("unknown codemod in selection: {0}")]
    InvalidSelection(String),

    #[error("invalid path pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// A report document that could not be read or parsed as its format.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("malformed report {report}: {reason}")]
pub struct MalformedReportError {
    pub report: PathBuf,
    pub reason: String,
}

/// Why a source file was excluded from transformation.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ParseError {
    #[error("read failed: {reason}")]
    Io { reason: String },

    #[error("undecodable as {encoding}")]
    Encoding { encoding: String },

    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        line: u32,
        column: u32,
        message: String,
    },

    #[error("gave up after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("parser unavailable: {reason}")]
    Language { reason: String },
}

/// A codemod failed while producing its replacement.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CodemodError {
    #[error("{message}")]
    Failed { message: String },

    #[error("panicked: {message}")]
    Panicked { message: String },

    #[error("replacement {start}..{end} escapes its target {target_start}..{target_end}")]
    InvalidReplacement {
        start: usize,
        end: usize,
        target_start: usize,
        target_end: usize,
    },
}
