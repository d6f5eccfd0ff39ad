//! Data source trait and its structured error type.
//!
//! The `DataSource` trait abstracts over remote market-data services so
//! implementations can be swapped and mocked for tests. Tables cross the
//! boundary as long-format polars `DataFrame`s: a `symbol` string column,
//! an `i64` `YYYYMMDD` date key column (`trade_date` for daily tables,
//! `report_date` + `ann_date` for statements), and one `f64` column per
//! field. Retry, batching, and authentication live behind this trait, not
//! in the engine.

use crate::catalog::FieldPool;
use crate::config::AdjustMode;
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use std::collections::BTreeSet;
use thiserror::Error;

/// Structured errors from a data source. Non-success aborts the calling
/// operation; the engine never retries.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("this source has no table for pool '{0}'")]
    UnknownFieldType(String),

    #[error("unknown index: {0}")]
    UnknownIndex(String),

    #[error("malformed table: {0}")]
    MalformedTable(String),
}

/// A remote (or local stand-in) market-data service.
///
/// Implementations are `Send + Sync` so a view holding one can move
/// across threads; the engine itself is single-threaded and every call
/// here blocks until the source answers.
pub trait DataSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// The remote schema of runtime-discoverable factor fields.
    fn query_field_schema(&self) -> Result<BTreeSet<String>, SourceError>;

    /// Fetch a daily-frequency table for one pool.
    ///
    /// `adjust` is only meaningful for the market-daily pool; other pools
    /// receive `None`.
    fn fetch(
        &self,
        pool: FieldPool,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        fields: &[String],
        adjust: Option<AdjustMode>,
    ) -> Result<DataFrame, SourceError>;

    /// Fetch a quarterly statement table for one of the statement pools.
    ///
    /// The source deduplicates rows on `dedup_keys` (normally
    /// `["symbol", "report_date"]`) before returning.
    fn fetch_statement(
        &self,
        pool: FieldPool,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        fields: &[String],
        dedup_keys: &[&str],
    ) -> Result<DataFrame, SourceError>;

    /// Ordered valid trading dates in `[start, end]`.
    fn trading_dates(&self, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<NaiveDate>, SourceError>;

    /// Daily index-membership table (`index_member` column, 1.0/0.0).
    fn index_members(
        &self,
        index: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DataFrame, SourceError>;

    /// Daily index-weight table (`index_weight` column).
    fn index_weights(
        &self,
        index: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DataFrame, SourceError>;
}
