//! The two frequency-partitioned panels and their shared symbol universe.
//!
//! A panel is a rectangular (date, symbol, field) table stored as one
//! dates × symbols matrix per field, which makes the "every symbol carries
//! the same field set" invariant structural. The daily panel's date axis is
//! the trading calendar over the extended window; the quarterly panel's
//! axis is the sorted union of observed report dates.

use crate::error::{PanelError, Result};
use crate::frame::FieldFrame;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// Which panel a field lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Quarterly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => f.write_str("daily"),
            Self::Quarterly => f.write_str("quarterly"),
        }
    }
}

/// What `append` actually did.
///
/// `AlreadyExists` is the non-fatal "field exists" signal: nothing was
/// written and the caller decides whether that matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    Overwritten,
    AlreadyExists,
}

/// One frequency tier: a date axis plus per-field matrices.
#[derive(Debug, Clone)]
struct Panel {
    dates: Vec<NaiveDate>,
    symbols: Vec<String>,
    fields: BTreeMap<String, Vec<f64>>,
}

impl Panel {
    fn new(dates: Vec<NaiveDate>, symbols: Vec<String>) -> Self {
        Self {
            dates,
            symbols,
            fields: BTreeMap::new(),
        }
    }

    fn frame(&self, name: &str) -> Option<FieldFrame> {
        self.fields.get(name).map(|values| {
            FieldFrame::from_values(self.dates.clone(), self.symbols.clone(), values.clone())
        })
    }

    /// Insert a field, re-cutting the incoming frame onto this panel's
    /// axes. The whole column set appears in one step.
    fn insert(&mut self, name: &str, frame: &FieldFrame) {
        let aligned = frame
            .reindex_symbols(&self.symbols)
            .reindex_dates(&self.dates);
        let (_, _, values) = aligned.into_parts();
        self.fields.insert(name.to_string(), values);
    }

    /// Grow the date axis to the union with `incoming`, padding existing
    /// fields with NaN on the new rows.
    fn merge_dates(&mut self, incoming: &[NaiveDate]) {
        let mut union: BTreeSet<NaiveDate> = self.dates.iter().copied().collect();
        union.extend(incoming.iter().copied());
        let new_axis: Vec<NaiveDate> = union.into_iter().collect();
        if new_axis == self.dates {
            return;
        }
        let old_names: Vec<String> = self.fields.keys().cloned().collect();
        for name in old_names {
            let frame = self.frame(&name).unwrap();
            let (_, _, values) = frame.reindex_dates(&new_axis).into_parts();
            self.fields.insert(name, values);
        }
        self.dates = new_axis;
    }

    fn remove_field(&mut self, name: &str) -> bool {
        self.fields.remove(name).is_some()
    }

    /// Drop one symbol's column from every field matrix.
    fn remove_symbol_at(&mut self, symbol_idx: usize) {
        let n = self.symbols.len();
        for values in self.fields.values_mut() {
            let mut compact = Vec::with_capacity(values.len() - self.dates.len());
            for (i, v) in values.iter().enumerate() {
                if i % n != symbol_idx {
                    compact.push(*v);
                }
            }
            *values = compact;
        }
        self.symbols.remove(symbol_idx);
    }
}

/// The shared store: daily panel + quarterly panel + symbol universe.
#[derive(Debug, Clone)]
pub struct PanelStore {
    daily: Panel,
    quarterly: Panel,
}

impl PanelStore {
    /// A store over `symbols` with the daily axis fixed to the trading
    /// calendar; the quarterly axis starts empty and grows by union.
    pub fn new(symbols: Vec<String>, daily_dates: Vec<NaiveDate>) -> Self {
        Self {
            daily: Panel::new(daily_dates, symbols.clone()),
            quarterly: Panel::new(Vec::new(), symbols),
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.daily.symbols
    }

    pub fn panel_dates(&self, freq: Frequency) -> &[NaiveDate] {
        match freq {
            Frequency::Daily => &self.daily.dates,
            Frequency::Quarterly => &self.quarterly.dates,
        }
    }

    /// Union of field names across both tiers (the collision namespace).
    pub fn field_names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self.daily.fields.keys().cloned().collect();
        names.extend(self.quarterly.fields.keys().cloned());
        names
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.daily.fields.contains_key(name) || self.quarterly.fields.contains_key(name)
    }

    /// Whether one specific tier holds `name` (a quarterly field's daily
    /// shadow counts for the daily tier).
    pub fn has_field_in(&self, name: &str, freq: Frequency) -> bool {
        match freq {
            Frequency::Daily => self.daily.fields.contains_key(name),
            Frequency::Quarterly => self.quarterly.fields.contains_key(name),
        }
    }

    /// The tier that owns `name`. A quarterly field with a daily-expanded
    /// shadow is still quarterly.
    pub fn frequency_of(&self, name: &str) -> Option<Frequency> {
        if self.quarterly.fields.contains_key(name) {
            Some(Frequency::Quarterly)
        } else if self.daily.fields.contains_key(name) {
            Some(Frequency::Daily)
        } else {
            None
        }
    }

    fn panel_mut(&mut self, freq: Frequency) -> &mut Panel {
        match freq {
            Frequency::Daily => &mut self.daily,
            Frequency::Quarterly => &mut self.quarterly,
        }
    }

    /// Insert a new field into the tier matching `freq`.
    ///
    /// An existing name is removed first when `overwrite` is set (from
    /// whichever tier holds it, shadow included); otherwise nothing is
    /// written and `AlreadyExists` is reported. The incoming symbol axis
    /// must be a subset of the universe; symbols absent from the incoming
    /// frame are left NaN.
    pub fn append(
        &mut self,
        frame: &FieldFrame,
        name: &str,
        freq: Frequency,
        overwrite: bool,
    ) -> Result<AppendOutcome> {
        let unknown: Vec<String> = frame
            .symbols()
            .iter()
            .filter(|s| !self.daily.symbols.contains(s))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(PanelError::InvalidSymbolSet(unknown));
        }

        let outcome = if self.has_field(name) {
            if !overwrite {
                println!("append failed: field [{name}] exists, try another name");
                return Ok(AppendOutcome::AlreadyExists);
            }
            self.remove(name);
            println!("field [{name}] is overwritten");
            AppendOutcome::Overwritten
        } else {
            AppendOutcome::Inserted
        };

        if freq == Frequency::Quarterly {
            self.quarterly.merge_dates(frame.dates());
        }
        self.panel_mut(freq).insert(name, frame);
        Ok(outcome)
    }

    /// Attach the daily-expanded shadow of a quarterly field.
    ///
    /// Bypasses the namespace check on purpose: the shadow shares its name
    /// with the quarterly field it mirrors.
    pub fn insert_daily_shadow(&mut self, name: &str, frame: &FieldFrame) {
        self.daily.insert(name, frame);
    }

    /// Quiet quarterly upsert for engine-maintained fields (announcement
    /// dates): merges the axis, replaces the column, reports nothing.
    pub fn insert_quarterly(&mut self, name: &str, frame: &FieldFrame) {
        self.quarterly.merge_dates(frame.dates());
        self.quarterly.insert(name, frame);
    }

    /// Delete `name` from whichever tier(s) hold it. Returns whether
    /// anything was removed; a miss is reported, not fatal.
    pub fn remove(&mut self, name: &str) -> bool {
        let from_daily = self.daily.remove_field(name);
        let from_quarterly = self.quarterly.remove_field(name);
        if !(from_daily || from_quarterly) {
            println!("field [{name}] does not exist");
        }
        from_daily || from_quarterly
    }

    /// Drop symbols from both panels and the universe.
    ///
    /// Unknown symbols are reported and skipped; the rest of the batch
    /// still goes through. Returns what was actually removed.
    pub fn remove_symbols(&mut self, symbols: &[String]) -> Vec<String> {
        let mut removed = Vec::new();
        for symbol in symbols {
            let Some(idx) = self.daily.symbols.iter().position(|s| s == symbol) else {
                println!("symbol [{symbol}] does not exist");
                continue;
            };
            self.daily.remove_symbol_at(idx);
            self.quarterly.remove_symbol_at(idx);
            removed.push(symbol.clone());
        }
        removed
    }

    /// A field's values for all symbols over `[start, end]`.
    pub fn series(
        &self,
        name: &str,
        freq: Frequency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FieldFrame> {
        let panel = match freq {
            Frequency::Daily => &self.daily,
            Frequency::Quarterly => &self.quarterly,
        };
        let frame = panel.frame(name).ok_or_else(|| PanelError::FieldNotFound {
            name: name.to_string(),
            freq,
        })?;
        Ok(frame.slice_dates(start, end))
    }
}
