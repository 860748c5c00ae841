pub mod ingest;
pub mod sarif;
pub mod semgrep;
pub mod traits;

pub use ingest::{default_ingestor, Ingestion, ReportSummary};
pub use traits::{Finding, Location, Severity};
