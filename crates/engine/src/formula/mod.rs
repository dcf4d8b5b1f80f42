//! Formula parsing and evaluation.
//!
//! A [`Formula`] is an infix arithmetic expression over numbers and
//! variables, compiled to a postfix program when parsed. Variables are
//! normalized and validated with the same policy the spreadsheet uses for
//! cell names, so a formula's variables are directly usable as
//! dependency-graph keys.

pub mod eval;
pub mod parser;

use std::fmt;

use rustc_hash::FxHashSet;

use crate::cell_name::NamePolicy;

pub use eval::{FormulaError, VariableLookup};
use parser::{Step, Token};

/// The formula text could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid formula: {message}")]
pub struct FormulaFormatError {
    pub message: String,
}

impl FormulaFormatError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A parsed formula.
///
/// Equality is defined on the canonical text: two formulas are equal when
/// they have the same tokens after normalization, regardless of whitespace or
/// how their numbers were spelled.
#[derive(Debug, Clone)]
pub struct Formula {
    /// Postfix program
    program: Vec<Step>,
    canonical: String,
    variables: Vec<String>,
}

impl Formula {
    /// Parse `text` (without a leading `=`), normalizing every variable with
    /// `normalize` and rejecting any whose normalized form fails `is_valid`.
    pub fn parse<N, V>(text: &str, normalize: N, is_valid: V) -> Result<Self, FormulaFormatError>
    where
        N: Fn(&str) -> String,
        V: Fn(&str) -> bool,
    {
        let tokens = parser::tokenize(text, normalize, is_valid)?;
        let program = parser::compile(&tokens)?;
        let canonical = tokens.iter().map(Token::canonical).collect();
        let variables = parser::collect_variables(&tokens);
        Ok(Self {
            program,
            canonical,
            variables,
        })
    }

    /// Parse with a spreadsheet's name policy.
    pub fn parse_with(text: &str, policy: &NamePolicy) -> Result<Self, FormulaFormatError> {
        Self::parse(text, |s| policy.normalize(s), |s| policy.accepts(s))
    }

    /// Parse with identity normalization and no extra validity test.
    pub fn new(text: &str) -> Result<Self, FormulaFormatError> {
        Self::parse(text, |s| s.to_string(), |_| true)
    }

    /// Distinct variables in first-appearance order.
    pub fn variables(&self) -> impl Iterator<Item = &str> + '_ {
        self.variables.iter().map(String::as_str)
    }

    pub fn variable_set(&self) -> FxHashSet<String> {
        self.variables.iter().cloned().collect()
    }

    pub fn evaluate<L: VariableLookup + ?Sized>(&self, lookup: &L) -> Result<f64, FormulaError> {
        eval::evaluate(&self.program, lookup)
    }
}

impl PartialEq for Formula {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Formula {}

impl std::hash::Hash for Formula {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}
