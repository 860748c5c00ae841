pub mod diff;
pub mod executor;
pub mod matcher;

pub use executor::{ChangeHunk, FileError};
pub use matcher::{SkipReason, SkippedMatch};
