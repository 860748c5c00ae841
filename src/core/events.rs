use std::path::PathBuf;
use std::sync::Arc;

/// Progress notifications emitted while a run is underway. They carry no
/// information that is not also in the final report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    ReportIngested { path: PathBuf, findings: usize },
    ReportFailed { path: PathBuf, reason: String },
    FilesDiscovered { count: usize },
    FileParsed { path: PathBuf, ok: bool },
    SymbolTableBuilt { declarations: usize, gaps: usize },
    FileTransformed { path: PathBuf, hunks: usize, errors: usize },
    Cancelled { remaining: usize },
}

/// Receives events from any worker thread.
pub type Observer = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;
