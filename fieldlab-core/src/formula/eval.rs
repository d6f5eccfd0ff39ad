//! Expression-tree evaluation over dates × symbols frames.
//!
//! Scalars and frames mix freely: a scalar broadcasts against whatever
//! frame it meets, and a formula that never touches a variable collapses
//! to a constant frame at the end. All variable frames in the context
//! must already be cut onto the evaluation axis.

use super::functions::{self, RollStat};
use super::parser::{BinaryOp, Expr, UnaryOp};
use super::{CustomFunctions, FormulaError, VariableTable};
use crate::frame::FieldFrame;
use chrono::NaiveDate;

/// An intermediate evaluation result.
#[derive(Debug, Clone)]
pub enum Value {
    Scalar(f64),
    Frame(FieldFrame),
}

/// Everything the evaluator needs besides the tree itself.
#[derive(Debug)]
pub struct EvalContext<'a> {
    /// The evaluation axis (trading calendar, or report dates for
    /// quarterly-output formulas).
    pub dates: &'a [NaiveDate],
    pub symbols: &'a [String],
    /// Variable name → frame, every frame on the evaluation axis.
    pub vars: &'a VariableTable,
    /// Index-membership mask for cross-sectional functions; `None` means
    /// evaluate unmasked.
    pub index_mask: Option<&'a FieldFrame>,
    /// Caller-registered functions, if any.
    pub custom: Option<&'a CustomFunctions>,
}

impl EvalContext<'_> {
    fn materialize(&self, value: Value) -> FieldFrame {
        match value {
            Value::Frame(frame) => frame,
            Value::Scalar(s) => {
                FieldFrame::filled(self.dates.to_vec(), self.symbols.to_vec(), s)
            }
        }
    }
}

/// Evaluate a parsed formula to a frame on the context's axis.
pub fn evaluate(expr: &Expr, ctx: &EvalContext<'_>) -> Result<FieldFrame, FormulaError> {
    let value = eval_value(expr, ctx)?;
    Ok(ctx.materialize(value))
}

fn eval_value(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(Value::Scalar(*n)),
        Expr::Variable(name) => ctx
            .vars
            .get(name)
            .map(|frame| Value::Frame(frame.clone()))
            .ok_or_else(|| FormulaError::UnknownVariable(name.clone())),
        Expr::Unary { op, operand } => {
            let operand = eval_value(operand, ctx)?;
            Ok(apply_unary(*op, operand))
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = eval_value(lhs, ctx)?;
            let rhs = eval_value(rhs, ctx)?;
            Ok(apply_binary(*op, lhs, rhs))
        }
        Expr::Call { name, args } => eval_call(name, args, ctx),
    }
}

fn apply_unary(op: UnaryOp, operand: Value) -> Value {
    let f = move |x: f64| match op {
        UnaryOp::Neg => -x,
        UnaryOp::Not => {
            if x.is_nan() {
                f64::NAN
            } else if x == 0.0 {
                1.0
            } else {
                0.0
            }
        }
    };
    match operand {
        Value::Scalar(s) => Value::Scalar(f(s)),
        Value::Frame(frame) => Value::Frame(frame.map(f)),
    }
}

fn binary_fn(op: BinaryOp) -> fn(f64, f64) -> f64 {
    fn truth(x: f64) -> Option<bool> {
        if x.is_nan() {
            None
        } else {
            Some(x != 0.0)
        }
    }
    fn cmp(x: f64, y: f64, f: fn(f64, f64) -> bool) -> f64 {
        if x.is_nan() || y.is_nan() {
            f64::NAN
        } else if f(x, y) {
            1.0
        } else {
            0.0
        }
    }
    match op {
        BinaryOp::Add => |x, y| x + y,
        BinaryOp::Sub => |x, y| x - y,
        BinaryOp::Mul => |x, y| x * y,
        BinaryOp::Div => |x, y| x / y,
        BinaryOp::Rem => |x, y| x % y,
        BinaryOp::Pow => |x, y| x.powf(y),
        BinaryOp::Lt => |x, y| cmp(x, y, |a, b| a < b),
        BinaryOp::Le => |x, y| cmp(x, y, |a, b| a <= b),
        BinaryOp::Gt => |x, y| cmp(x, y, |a, b| a > b),
        BinaryOp::Ge => |x, y| cmp(x, y, |a, b| a >= b),
        BinaryOp::Eq => |x, y| cmp(x, y, |a, b| a == b),
        BinaryOp::Ne => |x, y| cmp(x, y, |a, b| a != b),
        BinaryOp::And => |x, y| match (truth(x), truth(y)) {
            (Some(a), Some(b)) => (a && b) as u8 as f64,
            _ => f64::NAN,
        },
        BinaryOp::Or => |x, y| match (truth(x), truth(y)) {
            (Some(a), Some(b)) => (a || b) as u8 as f64,
            _ => f64::NAN,
        },
    }
}

fn apply_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Value {
    let f = binary_fn(op);
    match (lhs, rhs) {
        (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(f(a, b)),
        (Value::Frame(a), Value::Scalar(b)) => Value::Frame(a.map(|x| f(x, b))),
        (Value::Scalar(a), Value::Frame(b)) => Value::Frame(b.map(|x| f(a, x))),
        (Value::Frame(a), Value::Frame(b)) => Value::Frame(a.zip_with(&b, f)),
    }
}

fn check_arity(name: &str, args: &[Expr], expected: usize) -> Result<(), FormulaError> {
    if args.len() != expected {
        return Err(FormulaError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

/// A window/shift argument: a non-negative integer scalar.
fn window_arg(name: &str, value: &Value) -> Result<usize, FormulaError> {
    let Value::Scalar(n) = value else {
        return Err(FormulaError::Argument {
            name: name.to_string(),
            message: "window must be a number, not a series".into(),
        });
    };
    if !(n.is_finite() && *n >= 0.0 && n.fract() == 0.0) {
        return Err(FormulaError::Argument {
            name: name.to_string(),
            message: format!("window must be a non-negative integer, got {n}"),
        });
    }
    Ok(*n as usize)
}

fn eval_call(name: &str, args: &[Expr], ctx: &EvalContext<'_>) -> Result<Value, FormulaError> {
    let lower = name.to_ascii_lowercase();

    let unary_math: Option<fn(f64) -> f64> = match lower.as_str() {
        "abs" => Some(f64::abs),
        "log" => Some(f64::ln),
        "sqrt" => Some(f64::sqrt),
        "sign" => Some(|x: f64| {
            if x.is_nan() {
                f64::NAN
            } else if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                0.0
            }
        }),
        _ => None,
    };
    if let Some(f) = unary_math {
        check_arity(name, args, 1)?;
        let value = eval_value(&args[0], ctx)?;
        return Ok(match value {
            Value::Scalar(s) => Value::Scalar(f(s)),
            Value::Frame(frame) => Value::Frame(frame.map(f)),
        });
    }

    match lower.as_str() {
        "min" | "max" => {
            check_arity(name, args, 2)?;
            let lhs = eval_value(&args[0], ctx)?;
            let rhs = eval_value(&args[1], ctx)?;
            let pick_min = lower == "min";
            let f = move |x: f64, y: f64| {
                if x.is_nan() || y.is_nan() {
                    f64::NAN
                } else if pick_min {
                    x.min(y)
                } else {
                    x.max(y)
                }
            };
            Ok(apply_binary_with(f, lhs, rhs))
        }
        "if" => {
            check_arity(name, args, 3)?;
            let cond = ctx.materialize(eval_value(&args[0], ctx)?);
            let then = ctx.materialize(eval_value(&args[1], ctx)?);
            let other = ctx.materialize(eval_value(&args[2], ctx)?);
            let mut out = then;
            for di in 0..cond.n_dates() {
                for si in 0..cond.n_symbols() {
                    let c = cond.get(di, si);
                    if c.is_nan() {
                        out.set(di, si, f64::NAN);
                    } else if c == 0.0 {
                        out.set(di, si, other.get(di, si));
                    }
                }
            }
            Ok(Value::Frame(out))
        }
        "delay" | "delta" | "ts_sum" | "ts_mean" | "ts_std" | "ts_min" | "ts_max" => {
            check_arity(name, args, 2)?;
            let series = ctx.materialize(eval_value(&args[0], ctx)?);
            let window = window_arg(name, &eval_value(&args[1], ctx)?)?;
            let out = match lower.as_str() {
                "delay" => functions::delay(&series, window),
                "delta" => functions::delta(&series, window),
                "ts_sum" => functions::rolling(&series, window, RollStat::Sum),
                "ts_mean" => functions::rolling(&series, window, RollStat::Mean),
                "ts_std" => functions::rolling(&series, window, RollStat::Std),
                "ts_min" => functions::rolling(&series, window, RollStat::Min),
                _ => functions::rolling(&series, window, RollStat::Max),
            };
            Ok(Value::Frame(out))
        }
        "rank" => {
            check_arity(name, args, 1)?;
            let series = ctx.materialize(eval_value(&args[0], ctx)?);
            Ok(Value::Frame(functions::cs_rank(&series, ctx.index_mask)))
        }
        "standardize" => {
            check_arity(name, args, 1)?;
            let series = ctx.materialize(eval_value(&args[0], ctx)?);
            Ok(Value::Frame(functions::cs_standardize(
                &series,
                ctx.index_mask,
            )))
        }
        _ => {
            let Some(custom) = ctx.custom.and_then(|c| c.get(name)) else {
                return Err(FormulaError::UnknownFunction(name.to_string()));
            };
            let frames: Vec<FieldFrame> = args
                .iter()
                .map(|arg| Ok(ctx.materialize(eval_value(arg, ctx)?)))
                .collect::<Result<_, FormulaError>>()?;
            custom(&frames).map(Value::Frame).map_err(|message| {
                FormulaError::Custom {
                    name: name.to_string(),
                    message,
                }
            })
        }
    }
}

fn apply_binary_with(f: impl Fn(f64, f64) -> f64 + Copy, lhs: Value, rhs: Value) -> Value {
    match (lhs, rhs) {
        (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(f(a, b)),
        (Value::Frame(a), Value::Scalar(b)) => Value::Frame(a.map(|x| f(x, b))),
        (Value::Scalar(a), Value::Frame(b)) => Value::Frame(b.map(|x| f(a, x))),
        (Value::Frame(a), Value::Frame(b)) => Value::Frame(a.zip_with(&b, f)),
    }
}
