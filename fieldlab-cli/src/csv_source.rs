//! A local `DataSource` over a directory of per-pool CSV tables.
//!
//! Layout: `{dir}/{pool}.csv` (e.g. `market_daily.csv`, `income.csv`),
//! plus `index_members.csv` / `index_weights.csv`. Tables use the same
//! long format the engine expects on the wire: a `symbol` column, `i64`
//! `YYYYMMDD` date keys, one numeric column per field. The trading
//! calendar is derived from the market-daily table.

use chrono::NaiveDate;
use fieldlab_core::catalog::{REPORT_DATE_KEY, TRADE_DATE_KEY};
use fieldlab_core::frame::{date_from_key, date_key};
use fieldlab_core::source::{DataSource, SourceError};
use fieldlab_core::{AdjustMode, FieldPool};
use polars::prelude::*;
use std::collections::BTreeSet;
use std::path::PathBuf;

pub struct CsvSource {
    dir: PathBuf,
}

impl CsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read_table(&self, stem: &str) -> Result<DataFrame, SourceError> {
        let path = self.dir.join(format!("{stem}.csv"));
        if !path.exists() {
            return Err(SourceError::UnknownFieldType(stem.to_string()));
        }
        CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.clone()))
            .and_then(|reader| reader.finish())
            .map_err(|e| SourceError::MalformedTable(format!("{}: {e}", path.display())))
    }

    fn filter_dates(
        df: DataFrame,
        date_column: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DataFrame, SourceError> {
        df.lazy()
            .filter(
                col(date_column)
                    .gt_eq(lit(date_key(start)))
                    .and(col(date_column).lt_eq(lit(date_key(end)))),
            )
            .collect()
            .map_err(|e| SourceError::MalformedTable(e.to_string()))
    }

    fn select_columns(df: &DataFrame, fields: &[String]) -> Result<DataFrame, SourceError> {
        df.select(fields.iter().cloned())
            .map_err(|e| SourceError::QueryFailed(format!("missing column: {e}")))
    }
}

impl DataSource for CsvSource {
    fn name(&self) -> &str {
        "csv-directory"
    }

    fn query_field_schema(&self) -> Result<BTreeSet<String>, SourceError> {
        // factor vocabulary = every non-key column of factor.csv
        let Ok(df) = self.read_table("factor") else {
            return Ok(BTreeSet::new());
        };
        Ok(df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .filter(|name| name != "symbol" && name != TRADE_DATE_KEY)
            .collect())
    }

    fn fetch(
        &self,
        pool: FieldPool,
        _symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        fields: &[String],
        _adjust: Option<AdjustMode>,
    ) -> Result<DataFrame, SourceError> {
        let df = self.read_table(&pool.to_string())?;
        let df = Self::filter_dates(df, TRADE_DATE_KEY, start, end)?;
        Self::select_columns(&df, fields)
    }

    fn fetch_statement(
        &self,
        pool: FieldPool,
        _symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        fields: &[String],
        dedup_keys: &[&str],
    ) -> Result<DataFrame, SourceError> {
        let df = self.read_table(&pool.to_string())?;
        let df = Self::filter_dates(df, REPORT_DATE_KEY, start, end)?;
        let subset: Vec<PlSmallStr> = dedup_keys.iter().map(|k| (*k).into()).collect();
        let df = df
            .lazy()
            .unique_stable(Some(subset), UniqueKeepStrategy::Last)
            .collect()
            .map_err(|e| SourceError::MalformedTable(e.to_string()))?;
        Self::select_columns(&df, fields)
    }

    fn trading_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, SourceError> {
        let df = self.read_table("market_daily")?;
        let keys = df
            .column(TRADE_DATE_KEY)
            .and_then(|c| c.cast(&DataType::Int64))
            .map_err(|e| SourceError::MalformedTable(e.to_string()))?;
        let keys = keys
            .i64()
            .map_err(|e| SourceError::MalformedTable(e.to_string()))?;

        let mut dates: BTreeSet<NaiveDate> = BTreeSet::new();
        for key in keys.iter().flatten() {
            let date = date_from_key(key)
                .ok_or_else(|| SourceError::MalformedTable(format!("bad trade_date {key}")))?;
            if date >= start && date <= end {
                dates.insert(date);
            }
        }
        Ok(dates.into_iter().collect())
    }

    fn index_members(
        &self,
        _index: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DataFrame, SourceError> {
        let df = self.read_table("index_members")?;
        Self::filter_dates(df, TRADE_DATE_KEY, start, end)
    }

    fn index_weights(
        &self,
        _index: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DataFrame, SourceError> {
        let df = self.read_table("index_weights")?;
        Self::filter_dates(df, TRADE_DATE_KEY, start, end)
    }
}
