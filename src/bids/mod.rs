//! Subject discovery in BIDS datasets, and the top-level pipeline that
//! iterates a graph over every subject.

use std::path::PathBuf;

/// subjects and file queries
mod layout;
pub use layout::{BidsLayout, FileQuery};

/// per-subject pipeline builder
mod pipeline;
pub use pipeline::{BidsPipeline, SUBJECT};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("BIDS root {0:?} is not a directory")]
    NotADirectory(PathBuf),
    #[error("Subject \"{0}\" not found in dataset")]
    UnknownSubject(String),
    #[error("No subjects to process in {0:?}")]
    NoSubjects(PathBuf),
}
