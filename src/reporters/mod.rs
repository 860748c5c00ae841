pub mod changeset;
pub mod json;
pub mod patch;
pub mod traits;

pub use changeset::{aggregate, FileTransformResult, Report, RunMetadata, UnmatchedFinding};
pub use traits::Reporter;

pub fn reporter_for(format: &str) -> Option<Box<dyn Reporter>> {
    match format {
        "json" => Some(Box::new(json::JsonReporter)),
        "patch" => Some(Box::new(patch::PatchReporter)),
        _ => None,
    }
}
