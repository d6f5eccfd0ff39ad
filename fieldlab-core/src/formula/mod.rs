//! Formula engine — lexer, parser, built-in functions, evaluator.
//!
//! A formula is a plain arithmetic/functional expression over field names
//! (`"pb / Delay(close, 5)"`, `"Rank(net_profit / total_assets)"`). The
//! parser turns it into an expression tree whose free variables drive
//! dependency resolution; the evaluator runs the tree over dates × symbols
//! frames with per-symbol time-series functions and per-date
//! cross-sectional functions.

mod eval;
mod functions;
mod lexer;
mod parser;

pub use eval::{evaluate, EvalContext};
pub use functions::is_builtin_name;
pub use parser::{parse, BinaryOp, Expr, UnaryOp};

use crate::error::PanelError;
use crate::frame::FieldFrame;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from parsing or evaluating a formula.
#[derive(Debug, Error)]
pub enum FormulaError {
    #[error("parse error at offset {pos}: {message}")]
    Parse { message: String, pos: usize },

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("variable '{0}' is not bound in the evaluation context")]
    UnknownVariable(String),

    #[error("{name} expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("bad argument to {name}: {message}")]
    Argument { name: String, message: String },

    #[error("custom function '{name}' failed: {message}")]
    Custom { name: String, message: String },
}

impl FormulaError {
    pub(crate) fn parse(message: impl Into<String>, pos: usize) -> Self {
        Self::Parse {
            message: message.into(),
            pos,
        }
    }
}

/// A caller-supplied function over evaluated argument frames.
pub type CustomFn =
    Box<dyn Fn(&[FieldFrame]) -> std::result::Result<FieldFrame, String> + Send + Sync>;

/// Registry of caller-supplied functions for one formula call.
///
/// Registration rejects any name that collides with a built-in operator,
/// function, or constant, so a collision surfaces before parsing.
#[derive(Default)]
pub struct CustomFunctions {
    funcs: BTreeMap<String, CustomFn>,
}

impl CustomFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, f: CustomFn) -> Result<(), PanelError> {
        if is_builtin_name(name) {
            return Err(PanelError::NameCollision(name.to_string()));
        }
        self.funcs.insert(name.to_string(), f);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CustomFn> {
        self.funcs.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

impl std::fmt::Debug for CustomFunctions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomFunctions")
            .field("names", &self.funcs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Shorthand for the evaluator's variable table.
pub type VariableTable = BTreeMap<String, FieldFrame>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_registration_rejects_builtin_names() {
        let mut funcs = CustomFunctions::new();
        let err = funcs
            .register("rank", Box::new(|args| Ok(args[0].clone())))
            .unwrap_err();
        assert!(matches!(err, PanelError::NameCollision(_)));

        // case variants collide too
        assert!(funcs
            .register("Ts_Mean", Box::new(|args| Ok(args[0].clone())))
            .is_err());
        assert!(funcs
            .register("my_func", Box::new(|args| Ok(args[0].clone())))
            .is_ok());
        assert!(funcs.get("my_func").is_some());
    }
}
