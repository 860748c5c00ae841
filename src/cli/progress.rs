use indicatif::ProgressBar;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::events::{Observer, PipelineEvent};

pub struct RunProgress {
    bar: ProgressBar,
}

impl RunProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            indicatif::ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }

    /// Event sink that keeps the spinner message current.
    pub fn observer(&self) -> Observer {
        let bar = self.bar.clone();
        let total = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        Arc::new(move |event: &PipelineEvent| match event {
            PipelineEvent::FilesDiscovered { count } => {
                total.store(*count, Ordering::Relaxed);
                bar.set_message(format!("Reading {} files...", count));
            }
            PipelineEvent::ReportFailed { path, .. } => {
                bar.println(format!("  malformed report: {}", path.display()));
            }
            PipelineEvent::SymbolTableBuilt { declarations, .. } => {
                bar.set_message(format!("Resolved {} declarations", declarations));
            }
            PipelineEvent::FileTransformed { path, .. } => {
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                bar.set_message(format!(
                    "Transforming... [{}/{}] {}",
                    n,
                    total.load(Ordering::Relaxed),
                    path.display()
                ));
            }
            PipelineEvent::Cancelled { remaining } => {
                bar.set_message(format!("Cancelled, {} files left untouched", remaining));
            }
            PipelineEvent::ReportIngested { .. } | PipelineEvent::FileParsed { .. } => {}
        })
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
