//! Pratt parser: token stream → expression tree.
//!
//! Precedence (loosest to tightest): `||`, `&&`, comparisons,
//! `+ -`, `* / %`, unary `- !`, `^` (right-associative), calls/atoms.
//! The constants `PI` and `E` resolve to literals at parse time, so they
//! never show up as variables.

use super::lexer::{tokenize, Token, TokenKind};
use super::FormulaError;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// A parsed formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Free variables (field references) in first-appearance order.
    ///
    /// The order is deterministic and drives the fetch order during
    /// dependency resolution.
    pub fn variables(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        self.collect_variables(&mut seen, &mut out);
        out
    }

    fn collect_variables(&self, seen: &mut BTreeSet<String>, out: &mut Vec<String>) {
        match self {
            Self::Number(_) => {}
            Self::Variable(name) => {
                if seen.insert(name.clone()) {
                    out.push(name.clone());
                }
            }
            Self::Unary { operand, .. } => operand.collect_variables(seen, out),
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(seen, out);
                rhs.collect_variables(seen, out);
            }
            Self::Call { args, .. } => {
                for arg in args {
                    arg.collect_variables(seen, out);
                }
            }
        }
    }
}

/// Parse formula text into an expression tree.
pub fn parse(input: &str) -> Result<Expr, FormulaError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        cursor: 0,
        input_len: input.len(),
    };
    let expr = parser.expression(0)?;
    if let Some(token) = parser.peek() {
        return Err(FormulaError::parse("trailing input after expression", token.pos));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    input_len: usize,
}

fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
    // (operator, left binding power)
    match kind {
        TokenKind::OrOr => Some((BinaryOp::Or, 1)),
        TokenKind::AndAnd => Some((BinaryOp::And, 2)),
        TokenKind::Lt => Some((BinaryOp::Lt, 3)),
        TokenKind::Le => Some((BinaryOp::Le, 3)),
        TokenKind::Gt => Some((BinaryOp::Gt, 3)),
        TokenKind::Ge => Some((BinaryOp::Ge, 3)),
        TokenKind::EqEq => Some((BinaryOp::Eq, 3)),
        TokenKind::NotEq => Some((BinaryOp::Ne, 3)),
        TokenKind::Plus => Some((BinaryOp::Add, 4)),
        TokenKind::Minus => Some((BinaryOp::Sub, 4)),
        TokenKind::Star => Some((BinaryOp::Mul, 5)),
        TokenKind::Slash => Some((BinaryOp::Div, 5)),
        TokenKind::Percent => Some((BinaryOp::Rem, 5)),
        TokenKind::Caret => Some((BinaryOp::Pow, 7)),
        _ => None,
    }
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), FormulaError> {
        match self.advance() {
            Some(token) if token.kind == *kind => Ok(()),
            Some(token) => Err(FormulaError::parse(format!("expected {what}"), token.pos)),
            None => Err(FormulaError::parse(
                format!("expected {what}, found end of input"),
                self.input_len,
            )),
        }
    }

    fn expression(&mut self, min_bp: u8) -> Result<Expr, FormulaError> {
        let mut lhs = self.prefix()?;

        while let Some(token) = self.peek() {
            let Some((op, bp)) = binary_op(&token.kind) else {
                break;
            };
            if bp < min_bp {
                break;
            }
            self.advance();
            // `^` is right-associative, everything else left
            let next_min = if op == BinaryOp::Pow { bp } else { bp + 1 };
            let rhs = self.expression(next_min)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Expr, FormulaError> {
        let Some(token) = self.advance() else {
            return Err(FormulaError::parse("unexpected end of input", self.input_len));
        };

        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Minus => {
                let operand = self.expression(6)?;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            TokenKind::Bang => {
                let operand = self.expression(6)?;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }
            TokenKind::LParen => {
                let inner = self.expression(0)?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen)) {
                    self.advance();
                    let args = self.arguments()?;
                    Ok(Expr::Call { name, args })
                } else {
                    match name.as_str() {
                        "PI" => Ok(Expr::Number(std::f64::consts::PI)),
                        "E" => Ok(Expr::Number(std::f64::consts::E)),
                        _ => Ok(Expr::Variable(name)),
                    }
                }
            }
            _ => Err(FormulaError::parse("expected a value", token.pos)),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, FormulaError> {
        let mut args = Vec::new();
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RParen)) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.expression(0)?);
            match self.advance() {
                Some(Token {
                    kind: TokenKind::Comma,
                    ..
                }) => continue,
                Some(Token {
                    kind: TokenKind::RParen,
                    ..
                }) => break,
                Some(token) => {
                    return Err(FormulaError::parse("expected ',' or ')'", token.pos));
                }
                None => {
                    return Err(FormulaError::parse(
                        "unclosed argument list",
                        self.input_len,
                    ));
                }
            }
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_mul_over_add() {
        let expr = parse("a + b * c").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Add, rhs, .. } => {
                assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn pow_is_right_associative() {
        let expr = parse("a ^ b ^ c").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Pow, lhs, rhs } => {
                assert!(matches!(*lhs, Expr::Variable(_)));
                assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Pow, .. }));
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn parens_override_precedence() {
        let expr = parse("(a + b) * c").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Mul, lhs, .. } => {
                assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Add, .. }));
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn variables_in_first_appearance_order() {
        let expr = parse("Rank(pb / close) + close - Delay(volume, 5)").unwrap();
        assert_eq!(expr.variables(), vec!["pb", "close", "volume"]);
    }

    #[test]
    fn constants_are_not_variables() {
        let expr = parse("close * PI + E").unwrap();
        assert_eq!(expr.variables(), vec!["close"]);
    }

    #[test]
    fn call_with_no_arguments() {
        let expr = parse("F()").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                name: "F".into(),
                args: vec![]
            }
        );
    }

    #[test]
    fn unary_binds_tighter_than_mul() {
        // -a * b parses as (-a) * b
        let expr = parse("-a * b").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(parse("a + b)").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("").is_err());
        assert!(parse("Delay(a,").is_err());
    }
}
