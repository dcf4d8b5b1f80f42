use std::fmt;

use crate::cell_name::NamePolicy;
use crate::formula::{Formula, FormulaError, FormulaFormatError};

/// What a cell holds, as assigned.
#[derive(Debug, Clone, PartialEq)]
pub enum CellContents {
    Number(f64),
    /// Empty text is the canonical "no content" state.
    Text(String),
    Formula(Formula),
}

impl Default for CellContents {
    fn default() -> Self {
        CellContents::Text(String::new())
    }
}

impl CellContents {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Classify raw input the way it is typed into a cell.
    ///
    /// - anything that parses as a finite number (surrounding whitespace
    ///   ignored) becomes `Number`
    /// - text starting with `=` is parsed as a formula with `policy`
    /// - everything else is kept verbatim as `Text`
    pub fn from_input(input: &str, policy: &NamePolicy) -> Result<Self, FormulaFormatError> {
        if let Some(n) = parse_number(input) {
            return Ok(CellContents::Number(n));
        }

        if let Some(source) = input.strip_prefix('=') {
            return Formula::parse_with(source, policy).map(CellContents::Formula);
        }

        Ok(CellContents::Text(input.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellContents::Text(s) if s.is_empty())
    }

    pub fn as_formula(&self) -> Option<&Formula> {
        match self {
            CellContents::Formula(f) => Some(f),
            _ => None,
        }
    }

    /// Literal text that recreates these contents when typed back in.
    ///
    /// Numbers use Rust's shortest round-trip formatting, formulas their
    /// canonical text behind `=`, and text is returned verbatim.
    pub fn to_input(&self) -> String {
        match self {
            CellContents::Number(n) => format!("{}", n),
            CellContents::Text(s) => s.clone(),
            CellContents::Formula(f) => format!("={}", f),
        }
    }
}

impl fmt::Display for CellContents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_input())
    }
}

/// Parse a number the way cell input does: finite values only.
///
/// `inf`, `NaN` and friends are text, not numbers.
fn parse_number(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Derived value of a cell. Never stored.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Error(FormulaError),
}

impl CellValue {
    pub fn is_error(&self) -> bool {
        matches!(self, CellValue::Error(_))
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Error(e) => write!(f, "#ERROR: {}", e),
        }
    }
}
