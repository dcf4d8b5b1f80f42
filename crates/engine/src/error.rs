use crate::formula::FormulaFormatError;
use crate::recalc::CycleReport;

/// Errors returned by spreadsheet operations.
///
/// Every error leaves the spreadsheet exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SheetError {
    #[error("invalid cell name: {0:?}")]
    InvalidName(String),

    #[error("cell contents must not be null")]
    NullContent,

    #[error(transparent)]
    FormulaFormat(#[from] FormulaFormatError),

    #[error("circular dependency: {0}")]
    CircularDependency(#[from] CycleReport),
}

impl SheetError {
    pub fn is_circular(&self) -> bool {
        matches!(self, SheetError::CircularDependency(_))
    }
}

pub type Result<T> = std::result::Result<T, SheetError>;
