// Formula evaluator - runs a postfix program against a variable lookup

use super::parser::{Op, Step};

/// Resolves a variable to its numeric value.
///
/// `None` means the variable is undefined (the cell is empty, holds text, or
/// its own formula failed), which surfaces as a `FormulaError`.
pub trait VariableLookup {
    fn lookup(&self, name: &str) -> Option<f64>;
}

impl<F> VariableLookup for F
where
    F: Fn(&str) -> Option<f64>,
{
    fn lookup(&self, name: &str) -> Option<f64> {
        self(name)
    }
}

/// Evaluation failure, reported as a value rather than a fault.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct FormulaError {
    pub reason: String,
}

impl FormulaError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn undefined_variable(name: &str) -> Self {
        Self::new(format!("undefined variable: {}", name))
    }

    pub fn division_by_zero() -> Self {
        Self::new("division by zero")
    }
}

/// Evaluate a postfix program with an explicit operand stack.
///
/// The first failure in source order wins: an undefined variable or a
/// division by zero.
pub fn evaluate<L: VariableLookup + ?Sized>(program: &[Step], lookup: &L) -> Result<f64, FormulaError> {
    let mut stack: Vec<f64> = Vec::new();

    for step in program {
        match step {
            Step::Number(n) => stack.push(*n),
            Step::Variable(name) => {
                let value = lookup
                    .lookup(name)
                    .ok_or_else(|| FormulaError::undefined_variable(name))?;
                stack.push(value);
            }
            Step::Apply(op) => {
                let r = stack.pop().ok_or_else(missing_operand)?;
                let l = stack.pop().ok_or_else(missing_operand)?;
                stack.push(apply(*op, l, r)?);
            }
        }
    }

    match stack.as_slice() {
        [result] => Ok(*result),
        _ => Err(FormulaError::new("invalid expression")),
    }
}

fn apply(op: Op, l: f64, r: f64) -> Result<f64, FormulaError> {
    match op {
        Op::Add => Ok(l + r),
        Op::Sub => Ok(l - r),
        Op::Mul => Ok(l * r),
        Op::Div => {
            if r == 0.0 {
                Err(FormulaError::division_by_zero())
            } else {
                Ok(l / r)
            }
        }
    }
}

fn missing_operand() -> FormulaError {
    FormulaError::new("missing operand")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Step {
        Step::Variable(name.to_string())
    }

    fn num(n: f64) -> Step {
        Step::Number(n)
    }

    fn no_vars(_: &str) -> Option<f64> {
        None
    }

    #[test]
    fn test_eval_arithmetic() {
        // (1 + 5) / 4
        let program = [num(1.0), num(5.0), Step::Apply(Op::Add), num(4.0), Step::Apply(Op::Div)];
        assert_eq!(evaluate(&program, &no_vars), Ok(1.5));
    }

    #[test]
    fn test_eval_variables() {
        let program = [var("x"), var("y"), Step::Apply(Op::Mul)];
        let lookup = |name: &str| match name {
            "x" => Some(3.0),
            "y" => Some(4.0),
            _ => None,
        };
        assert_eq!(evaluate(&program, &lookup), Ok(12.0));
    }

    #[test]
    fn test_eval_undefined_variable() {
        let program = [num(1.0), var("z"), Step::Apply(Op::Add)];
        let err = evaluate(&program, &no_vars).unwrap_err();
        assert_eq!(err, FormulaError::undefined_variable("z"));
        assert!(err.to_string().contains("z"));
    }

    #[test]
    fn test_eval_division_by_zero() {
        let program = [num(1.0), num(0.0), Step::Apply(Op::Div)];
        assert_eq!(evaluate(&program, &no_vars), Err(FormulaError::division_by_zero()));
    }

    #[test]
    fn test_eval_first_failure_wins() {
        // 1 / 0 + z fails on the division before reaching z
        let program = [num(1.0), num(0.0), Step::Apply(Op::Div), var("z"), Step::Apply(Op::Add)];
        assert_eq!(evaluate(&program, &no_vars), Err(FormulaError::division_by_zero()));
    }

    #[test]
    fn test_eval_malformed_program() {
        assert!(evaluate(&[Step::Apply(Op::Add)], &no_vars).is_err());
        assert!(evaluate(&[num(1.0), num(2.0)], &no_vars).is_err());
        assert!(evaluate(&[], &no_vars).is_err());
    }
}
