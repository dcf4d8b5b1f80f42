// Formula parser - converts formula text into a postfix program
// Supports: numbers (1, 2.5, .5, 1e-3), variables (A1, x, _tmp), + - * /, parentheses

use crate::cell_name::is_structurally_valid;

use super::FormulaFormatError;

/// One step of a compiled formula, in postfix order.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Number(f64),
    /// Normalized variable name
    Variable(String),
    Apply(Op),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn precedence(self) -> u8 {
        match self {
            Op::Add | Op::Sub => 1,
            Op::Mul | Op::Div => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Variable(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl Token {
    fn op(&self) -> Option<Op> {
        match self {
            Token::Plus => Some(Op::Add),
            Token::Minus => Some(Op::Sub),
            Token::Star => Some(Op::Mul),
            Token::Slash => Some(Op::Div),
            _ => None,
        }
    }

    /// True for tokens that end an operand: a number, a variable or `)`.
    fn closes_operand(&self) -> bool {
        matches!(self, Token::Number(_) | Token::Variable(_) | Token::RParen)
    }

    /// Canonical spelling used by `Formula`'s `Display`.
    pub(crate) fn canonical(&self) -> String {
        match self {
            Token::Number(n) => format!("{}", n),
            Token::Variable(name) => name.clone(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::Slash => "/".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
        }
    }
}

/// Split formula text into tokens, normalizing and validating every variable.
pub(crate) fn tokenize<N, V>(
    input: &str,
    normalize: N,
    is_valid: V,
) -> Result<Vec<Token>, FormulaFormatError>
where
    N: Fn(&str) -> String,
    V: Fn(&str) -> bool,
{
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => { chars.next(); }
            '+' => { tokens.push(Token::Plus); chars.next(); }
            '-' => { tokens.push(Token::Minus); chars.next(); }
            '*' => { tokens.push(Token::Star); chars.next(); }
            '/' => { tokens.push(Token::Slash); chars.next(); }
            '(' => { tokens.push(Token::LParen); chars.next(); }
            ')' => { tokens.push(Token::RParen); chars.next(); }
            'A'..='Z' | 'a'..='z' | '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }

                let normalized = normalize(&ident);
                if !is_structurally_valid(&normalized) || !is_valid(&normalized) {
                    return Err(FormulaFormatError::new(format!(
                        "invalid variable: {}",
                        ident
                    )));
                }
                tokens.push(Token::Variable(normalized));
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num_str.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }

                // Exponent: only consumed when digits follow (optionally signed)
                if matches!(chars.peek(), Some('e') | Some('E')) {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    let mut exponent = String::from("e");
                    if let Some(&sign) = lookahead.peek() {
                        if sign == '+' || sign == '-' {
                            exponent.push(sign);
                            lookahead.next();
                        }
                    }
                    if lookahead.peek().is_some_and(|d| d.is_ascii_digit()) {
                        while let Some(&d) = lookahead.peek() {
                            if d.is_ascii_digit() {
                                exponent.push(d);
                                lookahead.next();
                            } else {
                                break;
                            }
                        }
                        num_str.push_str(&exponent);
                        chars = lookahead;
                    }
                }

                let num: f64 = num_str
                    .parse()
                    .map_err(|_| FormulaFormatError::new(format!("invalid number: {}", num_str)))?;
                tokens.push(Token::Number(num));
            }
            _ => {
                return Err(FormulaFormatError::new(format!(
                    "unexpected character: {}",
                    c
                )))
            }
        }
    }

    Ok(tokens)
}

/// Check the token sequence and compile it to postfix.
///
/// No unary operators are admitted. After a number, variable or `)` comes an
/// operator or `)`; after `(` or an operator comes a number, variable or `(`.
/// Both the check and the compilation use explicit stacks, so nesting depth
/// is bounded only by memory.
pub(crate) fn compile(tokens: &[Token]) -> Result<Vec<Step>, FormulaFormatError> {
    check_syntax(tokens)?;

    let mut output = Vec::with_capacity(tokens.len());
    let mut ops: Vec<&Token> = Vec::new();

    for token in tokens {
        match token {
            Token::Number(n) => output.push(Step::Number(*n)),
            Token::Variable(name) => output.push(Step::Variable(name.clone())),
            Token::LParen => ops.push(token),
            Token::RParen => {
                while let Some(top) = ops.pop() {
                    match top.op() {
                        Some(op) => output.push(Step::Apply(op)),
                        None => break,
                    }
                }
            }
            operator => {
                let Some(op) = operator.op() else { continue };
                // Left associative: pop everything of equal or higher precedence
                while let Some(top) = ops.last().and_then(|t| t.op()) {
                    if top.precedence() < op.precedence() {
                        break;
                    }
                    output.push(Step::Apply(top));
                    ops.pop();
                }
                ops.push(operator);
            }
        }
    }

    while let Some(top) = ops.pop() {
        if let Some(op) = top.op() {
            output.push(Step::Apply(op));
        }
    }

    Ok(output)
}

fn check_syntax(tokens: &[Token]) -> Result<(), FormulaFormatError> {
    let Some(last) = tokens.last() else {
        return Err(FormulaFormatError::new("empty formula"));
    };

    let mut depth = 0usize;
    let mut prev: Option<&Token> = None;
    for (pos, token) in tokens.iter().enumerate() {
        let after_operand = prev.is_some_and(Token::closes_operand);
        let allowed = match token {
            Token::Number(_) | Token::Variable(_) | Token::LParen => !after_operand,
            _ => after_operand,
        };
        if !allowed {
            return Err(FormulaFormatError::new(format!(
                "unexpected '{}' at token {}",
                token.canonical(),
                pos
            )));
        }

        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    FormulaFormatError::new(format!(
                        "unmatched closing parenthesis at token {}",
                        pos
                    ))
                })?;
            }
            _ => {}
        }
        prev = Some(token);
    }

    if !last.closes_operand() {
        return Err(FormulaFormatError::new("unexpected end of formula"));
    }
    if depth > 0 {
        return Err(FormulaFormatError::new("missing closing parenthesis"));
    }
    Ok(())
}

/// Collect variables in first-appearance order, without duplicates.
pub(crate) fn collect_variables(tokens: &[Token]) -> Vec<String> {
    let mut seen = rustc_hash::FxHashSet::default();
    let mut vars = Vec::new();
    for token in tokens {
        if let Token::Variable(name) = token {
            if seen.insert(name.as_str()) {
                vars.push(name.clone());
            }
        }
    }
    vars
}
