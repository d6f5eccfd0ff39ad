//! FieldFrame — a rectangular dates × symbols matrix for one field.
//!
//! Missing observations are strict NaN. The date axis is sorted ascending
//! and shared verbatim with whichever panel the frame was cut from.

use chrono::{Datelike, NaiveDate};

/// One field's values for all symbols over a date axis.
///
/// Stored row-major: `values[date_idx * symbols.len() + symbol_idx]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFrame {
    dates: Vec<NaiveDate>,
    symbols: Vec<String>,
    values: Vec<f64>,
}

impl FieldFrame {
    /// A frame filled with a single value (usually NaN).
    pub fn filled(dates: Vec<NaiveDate>, symbols: Vec<String>, value: f64) -> Self {
        let len = dates.len() * symbols.len();
        Self {
            dates,
            symbols,
            values: vec![value; len],
        }
    }

    /// Build from a pre-computed value buffer.
    pub fn from_values(dates: Vec<NaiveDate>, symbols: Vec<String>, values: Vec<f64>) -> Self {
        assert_eq!(
            values.len(),
            dates.len() * symbols.len(),
            "value buffer does not match dates x symbols"
        );
        Self {
            dates,
            symbols,
            values,
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn n_dates(&self) -> usize {
        self.dates.len()
    }

    pub fn n_symbols(&self) -> usize {
        self.symbols.len()
    }

    /// True when either axis is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, date_idx: usize, symbol_idx: usize) -> f64 {
        self.values[date_idx * self.symbols.len() + symbol_idx]
    }

    pub fn set(&mut self, date_idx: usize, symbol_idx: usize, value: f64) {
        self.values[date_idx * self.symbols.len() + symbol_idx] = value;
    }

    /// One date's cross-section.
    pub fn row(&self, date_idx: usize) -> &[f64] {
        let n = self.symbols.len();
        &self.values[date_idx * n..(date_idx + 1) * n]
    }

    /// One symbol's time series (strided copy).
    pub fn column(&self, symbol_idx: usize) -> Vec<f64> {
        (0..self.dates.len())
            .map(|di| self.get(di, symbol_idx))
            .collect()
    }

    /// Position of `date` on the axis (binary search; axis is sorted).
    pub fn date_index(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    pub fn symbol_index(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    /// Re-cut the frame onto a new date axis; dates absent from `self`
    /// come out as NaN.
    pub fn reindex_dates(&self, dates: &[NaiveDate]) -> Self {
        let mut out = Self::filled(dates.to_vec(), self.symbols.clone(), f64::NAN);
        for (new_di, date) in dates.iter().enumerate() {
            if let Some(old_di) = self.date_index(*date) {
                let n = self.symbols.len();
                let src = self.row(old_di);
                out.values[new_di * n..(new_di + 1) * n].copy_from_slice(src);
            }
        }
        out
    }

    /// Re-cut the frame onto a new symbol axis; symbols absent from `self`
    /// come out as NaN.
    pub fn reindex_symbols(&self, symbols: &[String]) -> Self {
        let mapping: Vec<Option<usize>> = symbols
            .iter()
            .map(|s| self.symbol_index(s))
            .collect();
        let mut out = Self::filled(self.dates.clone(), symbols.to_vec(), f64::NAN);
        for di in 0..self.dates.len() {
            for (new_si, old_si) in mapping.iter().enumerate() {
                if let Some(old_si) = old_si {
                    out.set(di, new_si, self.get(di, *old_si));
                }
            }
        }
        out
    }

    /// Restrict to dates in `[start, end]` (inclusive).
    pub fn slice_dates(&self, start: NaiveDate, end: NaiveDate) -> Self {
        let from = self.dates.partition_point(|d| *d < start);
        let to = self.dates.partition_point(|d| *d <= end);
        let n = self.symbols.len();
        Self {
            dates: self.dates[from..to].to_vec(),
            symbols: self.symbols.clone(),
            values: self.values[from * n..to * n].to_vec(),
        }
    }

    /// Elementwise map.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            dates: self.dates.clone(),
            symbols: self.symbols.clone(),
            values: self.values.iter().map(|v| f(*v)).collect(),
        }
    }

    /// Decompose into `(dates, symbols, values)`.
    pub fn into_parts(self) -> (Vec<NaiveDate>, Vec<String>, Vec<f64>) {
        (self.dates, self.symbols, self.values)
    }

    /// Elementwise combination of two same-shaped frames.
    ///
    /// Panics if the shapes differ; callers align axes before combining.
    pub fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        assert_eq!(self.dates.len(), other.dates.len(), "date axes differ");
        assert_eq!(
            self.symbols.len(),
            other.symbols.len(),
            "symbol axes differ"
        );
        Self {
            dates: self.dates.clone(),
            symbols: self.symbols.clone(),
            values: self
                .values
                .iter()
                .zip(other.values.iter())
                .map(|(a, b)| f(*a, *b))
                .collect(),
        }
    }
}

/// Encode a date as its `YYYYMMDD` integer key (the wire format used by
/// `trade_date` / `ann_date` / `report_date` table columns).
pub fn date_key(date: NaiveDate) -> i64 {
    date.year() as i64 * 10_000 + date.month() as i64 * 100 + date.day() as i64
}

/// Decode a `YYYYMMDD` integer key back into a date.
pub fn date_from_key(key: i64) -> Option<NaiveDate> {
    let year = (key / 10_000) as i32;
    let month = ((key / 100) % 100) as u32;
    let day = (key % 100) as u32;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `date_key` as f64, for announcement dates stored inside a panel matrix.
pub fn date_key_f64(date: NaiveDate) -> f64 {
    date_key(date) as f64
}

/// Decode an f64 announcement key; NaN means no announcement.
pub fn date_from_key_f64(key: f64) -> Option<NaiveDate> {
    if key.is_nan() {
        return None;
    }
    date_from_key(key as i64)
}
