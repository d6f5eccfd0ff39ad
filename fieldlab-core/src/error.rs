//! Structured error types for panel and formula operations.
//!
//! One enum per concern: `PanelError` for the engine surface,
//! `SourceError` for the data-source boundary (in `source`), and
//! `FormulaError` for parse/evaluate failures (in `formula`).

use crate::formula::FormulaError;
use crate::panel::Frequency;
use crate::source::SourceError;
use thiserror::Error;

/// Result type for panel operations.
pub type Result<T> = std::result::Result<T, PanelError>;

/// Errors surfaced by the panel store, the view, and formula evaluation.
///
/// Non-fatal conditions (an existing field without `overwrite`, an unknown
/// symbol in a removal batch) are NOT errors — they are reported outcomes
/// and the operation continues. Everything here aborts the current
/// operation.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("field '{name}' not found in the {freq} panel")]
    FieldNotFound { name: String, freq: Frequency },

    #[error("field '{0}' already exists, try another name")]
    FieldAlreadyExists(String),

    #[error("'{0}' is a pre-defined field and cannot be shadowed by a formula result")]
    PredefinedFieldCollision(String),

    #[error("variable '{0}' could not be resolved from the data source")]
    UnresolvedVariable(String),

    #[error("unsupported frequency: {0}")]
    UnsupportedFrequency(String),

    #[error("custom function '{0}' collides with a built-in name")]
    NameCollision(String),

    #[error("unknown symbols: {}", .0.join(", "))]
    InvalidSymbolSet(Vec<String>),

    #[error("formula error: {0}")]
    Formula(#[from] FormulaError),

    #[error("data source error: {0}")]
    Source(#[from] SourceError),

    #[error("table error: {0}")]
    Table(#[from] polars::error::PolarsError),

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("invalid config: {0}")]
    Config(String),
}
