//! Long-table → FieldFrame ingestion.
//!
//! Fetched tables arrive in long format (one row per symbol per date);
//! the panels want one dates × symbols matrix per field. Rows for symbols
//! outside the registered universe are dropped, matching the fetch
//! contract that the incoming symbol axis is at most the universe.

use crate::catalog::{ANN_DATE_FIELD, REPORT_DATE_KEY, SYMBOL_KEY, TRADE_DATE_KEY};
use crate::error::{PanelError, Result};
use crate::frame::{date_from_key, FieldFrame};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// The pieces of one ingested statement table.
#[derive(Debug)]
pub struct StatementIngest {
    /// Sorted distinct report dates observed in the table.
    pub report_dates: Vec<NaiveDate>,
    /// One frame per requested field, on the report-date axis.
    pub fields: BTreeMap<String, FieldFrame>,
    /// Announcement dates as `YYYYMMDD` keys, same axis.
    pub announcements: FieldFrame,
}

fn date_column(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDate>>> {
    let column = df.column(name)?.cast(&DataType::Int64)?;
    let keys = column.i64()?;
    keys.iter()
        .map(|key| match key {
            None => Ok(None),
            Some(key) => date_from_key(key)
                .map(Some)
                .ok_or_else(|| PanelError::Shape(format!("invalid {name} key {key}"))),
        })
        .collect()
}

fn value_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    let values = column.f64()?;
    Ok(values.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

fn symbol_column(df: &DataFrame) -> Result<Vec<String>> {
    let column = df.column(SYMBOL_KEY)?;
    let symbols = column.str()?;
    Ok(symbols
        .iter()
        .map(|s| s.unwrap_or_default().to_string())
        .collect())
}

/// Pivot a daily long table into one frame per field on the trading
/// calendar. Rows with dates outside `calendar` or symbols outside
/// `symbols` are dropped.
pub fn daily_frames(
    df: &DataFrame,
    fields: &[String],
    calendar: &[NaiveDate],
    symbols: &[String],
) -> Result<BTreeMap<String, FieldFrame>> {
    let row_symbols = symbol_column(df)?;
    let row_dates = date_column(df, TRADE_DATE_KEY)?;

    let date_pos: BTreeMap<NaiveDate, usize> = calendar
        .iter()
        .enumerate()
        .map(|(i, d)| (*d, i))
        .collect();
    let symbol_pos: BTreeMap<&str, usize> = symbols
        .iter()
        .enumerate()
        .map(|(i, s)| (s.as_str(), i))
        .collect();

    let mut out = BTreeMap::new();
    for field in fields {
        let values = value_column(df, field)?;
        let mut frame = FieldFrame::filled(calendar.to_vec(), symbols.to_vec(), f64::NAN);
        for row in 0..df.height() {
            let Some(date) = row_dates[row] else { continue };
            let (Some(di), Some(si)) = (
                date_pos.get(&date),
                symbol_pos.get(row_symbols[row].as_str()),
            ) else {
                continue;
            };
            frame.set(*di, *si, values[row]);
        }
        out.insert(field.clone(), frame);
    }
    Ok(out)
}

/// Pivot a statement long table onto its report-date axis.
///
/// Duplicate `(symbol, report_date)` rows keep the last occurrence — the
/// source already deduplicates, this only pins the behavior when it does
/// not.
pub fn statement_frames(
    df: &DataFrame,
    fields: &[String],
    symbols: &[String],
) -> Result<StatementIngest> {
    let row_symbols = symbol_column(df)?;
    let row_reports = date_column(df, REPORT_DATE_KEY)?;
    let row_anns = date_column(df, ANN_DATE_FIELD)?;

    let symbol_pos: BTreeMap<&str, usize> = symbols
        .iter()
        .enumerate()
        .map(|(i, s)| (s.as_str(), i))
        .collect();

    let report_axis: Vec<NaiveDate> = row_reports
        .iter()
        .flatten()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let report_pos: BTreeMap<NaiveDate, usize> = report_axis
        .iter()
        .enumerate()
        .map(|(i, d)| (*d, i))
        .collect();

    let mut announcements =
        FieldFrame::filled(report_axis.clone(), symbols.to_vec(), f64::NAN);
    let mut out: BTreeMap<String, FieldFrame> = fields
        .iter()
        .map(|f| {
            (
                f.clone(),
                FieldFrame::filled(report_axis.clone(), symbols.to_vec(), f64::NAN),
            )
        })
        .collect();

    for field in fields {
        let values = value_column(df, field)?;
        let frame = out.get_mut(field).unwrap();
        for row in 0..df.height() {
            let Some(report) = row_reports[row] else { continue };
            let (Some(di), Some(si)) = (
                report_pos.get(&report),
                symbol_pos.get(row_symbols[row].as_str()),
            ) else {
                continue;
            };
            frame.set(*di, *si, values[row]);
            if let Some(ann) = row_anns[row] {
                announcements.set(*di, *si, crate::frame::date_key_f64(ann));
            }
        }
    }

    Ok(StatementIngest {
        report_dates: report_axis,
        fields: out,
        announcements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn daily_pivot_drops_foreign_rows() {
        let df = df!(
            "symbol" => &["A", "B", "Z", "A"],
            "trade_date" => &[20240102i64, 20240102, 20240102, 20240103],
            "close" => &[10.0, 20.0, 99.0, 11.0],
        )
        .unwrap();
        let calendar = vec![d("2024-01-02"), d("2024-01-03")];
        let symbols = vec!["A".to_string(), "B".to_string()];

        let frames = daily_frames(&df, &["close".to_string()], &calendar, &symbols).unwrap();
        let close = &frames["close"];
        assert_eq!(close.get(0, 0), 10.0);
        assert_eq!(close.get(0, 1), 20.0);
        assert_eq!(close.get(1, 0), 11.0);
        assert!(close.get(1, 1).is_nan(), "B has no row on the 3rd");
    }

    #[test]
    fn daily_pivot_missing_column_errors() {
        let df = df!(
            "symbol" => &["A"],
            "trade_date" => &[20240102i64],
        )
        .unwrap();
        let calendar = vec![d("2024-01-02")];
        let symbols = vec!["A".to_string()];
        assert!(daily_frames(&df, &["close".to_string()], &calendar, &symbols).is_err());
    }

    #[test]
    fn statement_pivot_builds_report_axis() {
        let df = df!(
            "symbol" => &["A", "A", "B"],
            "report_date" => &[20240331i64, 20240630, 20240331],
            "ann_date" => &[20240425i64, 20240830, 20240428],
            "net_profit" => &[1.0, 2.0, 3.0],
        )
        .unwrap();
        let symbols = vec!["A".to_string(), "B".to_string()];

        let ingest = statement_frames(&df, &["net_profit".to_string()], &symbols).unwrap();
        assert_eq!(ingest.report_dates, vec![d("2024-03-31"), d("2024-06-30")]);

        let profit = &ingest.fields["net_profit"];
        assert_eq!(profit.get(0, 0), 1.0);
        assert_eq!(profit.get(1, 0), 2.0);
        assert_eq!(profit.get(0, 1), 3.0);
        assert!(profit.get(1, 1).is_nan(), "B has no Q2 row");

        assert_eq!(ingest.announcements.get(0, 0), 20240425.0);
        assert!(ingest.announcements.get(1, 1).is_nan());
    }

    #[test]
    fn statement_pivot_keeps_last_duplicate() {
        let df = df!(
            "symbol" => &["A", "A"],
            "report_date" => &[20240331i64, 20240331],
            "ann_date" => &[20240425i64, 20240426],
            "net_profit" => &[1.0, 9.0],
        )
        .unwrap();
        let symbols = vec!["A".to_string()];

        let ingest = statement_frames(&df, &["net_profit".to_string()], &symbols).unwrap();
        assert_eq!(ingest.fields["net_profit"].get(0, 0), 9.0);
        assert_eq!(ingest.announcements.get(0, 0), 20240426.0);
    }
}
