use std::path::PathBuf;

use tally_engine::SheetError;

/// Failure reading or writing a spreadsheet document.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("failed to read {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    #[error("failed to write {}: {message}", path.display())]
    Write { path: PathBuf, message: String },

    #[error("XML error: {0}")]
    Xml(String),

    #[error("version mismatch: expected {expected:?}, document has {found:?}")]
    VersionMismatch { expected: String, found: String },

    #[error("document has no version attribute")]
    MissingVersion,

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("cell {name:?} could not be loaded: {source}")]
    Replay { name: String, source: SheetError },
}

impl IoError {
    pub(crate) fn xml(err: impl std::fmt::Display) -> Self {
        IoError::Xml(err.to_string())
    }
}
