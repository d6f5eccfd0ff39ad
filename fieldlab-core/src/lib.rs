//! FieldLab Core — two-frequency panel store with formula-derived fields.
//!
//! The heart of the library:
//! - A daily panel and a quarterly panel over one shared symbol universe
//! - A field catalog that classifies names into fetchable pools
//! - An alignment engine that expands quarterly observations onto the
//!   daily calendar by announcement date
//! - A formula engine (parser + evaluator) that derives new fields from
//!   existing ones, auto-fetching missing variables through a pluggable
//!   `DataSource`

pub mod align;
pub mod catalog;
pub mod config;
pub mod error;
pub mod formula;
pub mod frame;
pub mod ingest;
pub mod panel;
pub mod source;
pub mod view;

pub use catalog::{FieldCatalog, FieldPool};
pub use config::{AdjustMode, ViewConfig};
pub use error::{PanelError, Result};
pub use formula::{CustomFunctions, FormulaError};
pub use frame::FieldFrame;
pub use panel::{AppendOutcome, Frequency, PanelStore};
pub use source::{DataSource, SourceError};
pub use view::{FormulaOptions, PanelView};
