//! PanelView — the orchestrator over catalog, store, source and formulas.
//!
//! A view owns the two panels for one configured universe and window,
//! and exposes the operations a research session needs: bulk preparation,
//! fetch-by-name, formula fields, index membership, symbol removal. All
//! remote traffic goes through the `DataSource` trait and blocks the
//! caller; nothing here retries.

use crate::align::expand_quarterly;
use crate::catalog::{
    FieldCatalog, FieldPool, ANN_DATE_FIELD, INDEX_MEMBER_FIELD, INDEX_WEIGHT_FIELD, REPORT_DATE_KEY,
    SYMBOL_KEY, TRADE_DATE_KEY,
};
use crate::config::ViewConfig;
use crate::error::{PanelError, Result};
use crate::formula::{self, CustomFunctions, EvalContext, VariableTable};
use crate::frame::FieldFrame;
use crate::ingest;
use crate::panel::{AppendOutcome, Frequency, PanelStore};
use crate::source::DataSource;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Per-call switches for `add_formula`.
#[derive(Debug, Clone)]
pub struct FormulaOptions {
    /// Persist the result into the panel(s) instead of only returning it.
    pub add_data: bool,
    /// With `add_data`, replace an existing field of the same name.
    pub overwrite: bool,
    /// Mask cross-sectional functions to index members.
    pub within_index: bool,
}

impl Default for FormulaOptions {
    fn default() -> Self {
        Self {
            add_data: false,
            overwrite: true,
            within_index: true,
        }
    }
}

/// A two-frequency panel view over one symbol universe.
pub struct PanelView {
    config: ViewConfig,
    source: Box<dyn DataSource>,
    catalog: FieldCatalog,
    /// Trading calendar over the extended daily window.
    calendar: Vec<NaiveDate>,
    store: PanelStore,
}

impl std::fmt::Debug for PanelView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelView")
            .field("source", &self.source.name())
            .field("symbols", &self.store.symbols().len())
            .field("calendar_days", &self.calendar.len())
            .finish()
    }
}

impl PanelView {
    /// Validate the config and pull the trading calendar; no field data is
    /// fetched yet.
    pub fn new(config: ViewConfig, source: Box<dyn DataSource>) -> Result<Self> {
        config.validate()?;
        let calendar =
            source.trading_dates(config.extended_start_daily(), config.end_date)?;
        if calendar.is_empty() {
            return Err(PanelError::Config(
                "the source returned an empty trading calendar".into(),
            ));
        }
        let store = PanelStore::new(config.symbols.clone(), calendar.clone());
        Ok(Self {
            config,
            source,
            catalog: FieldCatalog::with_defaults(),
            calendar,
            store,
        })
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// Trading dates of the extended daily window.
    pub fn calendar(&self) -> &[NaiveDate] {
        &self.calendar
    }

    pub fn symbols(&self) -> &[String] {
        self.store.symbols()
    }

    /// Every field name currently present, across both tiers.
    pub fn field_names(&self) -> Vec<String> {
        self.store.field_names().into_iter().collect()
    }

    /// Which catalog pool a name belongs to, if any.
    pub fn pool_of(&self, name: &str) -> Option<FieldPool> {
        self.catalog.classify(name)
    }

    /// Which frequency tier owns a stored field.
    pub fn frequency_of(&self, name: &str) -> Option<Frequency> {
        self.store.frequency_of(name)
    }

    /// A stored field over the nominal (non-extended) window.
    pub fn get_series(&self, name: &str, freq: Frequency) -> Result<FieldFrame> {
        self.store
            .series(name, freq, self.config.start_date, self.config.end_date)
    }

    /// Query the remote factor schema and grow the factor pool.
    ///
    /// This is the only way the catalog grows from the source; it never
    /// happens as a side effect of other calls.
    pub fn refresh_factor_fields(&mut self) -> Result<usize> {
        let schema = self.source.query_field_schema()?;
        Ok(self.catalog.register_factor_fields(schema))
    }

    /// Bulk-prepare `fields`: classify into pools, fetch each non-empty
    /// pool group, ingest, and expand quarterly fields to daily shadows.
    pub fn prepare(&mut self, fields: &[String]) -> Result<()> {
        let symbols = self.store.symbols().to_vec();

        // the unions are recomputed here on purpose: the factor pool may
        // have grown since the view was built
        let daily_known = self.catalog.daily_union();
        let quarterly_known = self.catalog.quarterly_union();
        for field in fields {
            if !daily_known.contains(field) && !quarterly_known.contains(field) {
                println!("field [{field}] is not a known field, ignore");
            }
        }

        for pool in FieldPool::ALL.into_iter().filter(|p| p.is_daily()) {
            let resolved =
                self.catalog
                    .resolve(pool, fields, false, true, self.config.all_price);
            if resolved.is_empty() {
                continue;
            }
            if pool == FieldPool::MarketDaily {
                println!("note: price adjust method is [{} adjust]", self.config.adjust_mode);
            }
            let adjust = (pool == FieldPool::MarketDaily).then_some(self.config.adjust_mode);
            let table = self.source.fetch(
                pool,
                &symbols,
                self.config.extended_start_daily(),
                self.config.end_date,
                &resolved,
                adjust,
            )?;
            let value_fields: Vec<String> = resolved
                .iter()
                .filter(|f| *f != SYMBOL_KEY && *f != TRADE_DATE_KEY)
                .cloned()
                .collect();
            let frames = ingest::daily_frames(&table, &value_fields, &self.calendar, &symbols)?;
            for (name, frame) in frames {
                self.append_checked(&frame, &name, Frequency::Daily)?;
            }
        }

        for pool in FieldPool::ALL.into_iter().filter(|p| p.is_quarterly()) {
            let resolved = self.catalog.resolve(pool, fields, false, true, false);
            if resolved.is_empty() {
                continue;
            }
            let table = self.source.fetch_statement(
                pool,
                &symbols,
                self.config.extended_start_quarterly(),
                self.config.end_date,
                &resolved,
                &[SYMBOL_KEY, REPORT_DATE_KEY],
            )?;
            let value_fields: Vec<String> = resolved
                .iter()
                .filter(|f| *f != SYMBOL_KEY && *f != REPORT_DATE_KEY && *f != ANN_DATE_FIELD)
                .cloned()
                .collect();
            let parts = ingest::statement_frames(&table, &value_fields, &symbols)?;
            self.merge_announcements(&parts.announcements);
            for (name, frame) in parts.fields {
                self.append_checked(&frame, &name, Frequency::Quarterly)?;
                self.expand_and_shadow(&name)?;
            }
        }

        if let Some(index) = self.config.index.clone() {
            self.fetch_index(&index, INDEX_MEMBER_FIELD, INDEX_WEIGHT_FIELD)?;
        }
        Ok(())
    }

    /// Fetch one catalog-known field by name and store it.
    ///
    /// Reported no-op (`false`) when the name already exists or the
    /// catalog does not know it; quarterly fields also get their daily
    /// shadow.
    pub fn add_field(&mut self, name: &str) -> Result<bool> {
        if self.store.has_field(name) {
            println!("field name [{name}] already exists");
            return Ok(false);
        }
        let Some(pool) = self.catalog.classify(name) else {
            println!("field name [{name}] is not a known field, ignore");
            return Ok(false);
        };

        let symbols = self.store.symbols().to_vec();
        let requested = vec![name.to_string()];
        if pool.is_daily() {
            let resolved =
                self.catalog
                    .resolve(pool, &requested, false, true, self.config.all_price);
            let adjust = (pool == FieldPool::MarketDaily).then_some(self.config.adjust_mode);
            let table = self.source.fetch(
                pool,
                &symbols,
                self.config.extended_start_daily(),
                self.config.end_date,
                &resolved,
                adjust,
            )?;
            let frames = ingest::daily_frames(&table, &requested, &self.calendar, &symbols)?;
            self.append_checked(&frames[name], name, Frequency::Daily)?;
        } else {
            let resolved = self.catalog.resolve(pool, &requested, false, true, false);
            let table = self.source.fetch_statement(
                pool,
                &symbols,
                self.config.extended_start_quarterly(),
                self.config.end_date,
                &resolved,
                &[SYMBOL_KEY, REPORT_DATE_KEY],
            )?;
            let parts = ingest::statement_frames(&table, &requested, &symbols)?;
            self.merge_announcements(&parts.announcements);
            self.append_checked(&parts.fields[name], name, Frequency::Quarterly)?;
            self.expand_and_shadow(name)?;
        }
        Ok(true)
    }

    /// Push caller-supplied data into the view.
    ///
    /// Same overwrite/exists semantics as the store; appending to the
    /// quarterly tier also refreshes the daily shadow (announcement dates
    /// must already be present for that).
    pub fn append_field(
        &mut self,
        frame: &FieldFrame,
        name: &str,
        freq: Frequency,
        overwrite: bool,
    ) -> Result<AppendOutcome> {
        let outcome = self.store.append(frame, name, freq, overwrite)?;
        if freq == Frequency::Quarterly
            && name != ANN_DATE_FIELD
            && outcome != AppendOutcome::AlreadyExists
        {
            self.expand_and_shadow(name)?;
        }
        Ok(outcome)
    }

    /// Remove a field from whichever tier holds it (shadow included).
    pub fn remove_field(&mut self, name: &str) -> bool {
        self.store.remove(name)
    }

    /// Remove symbols from both panels and the universe; unknown symbols
    /// are reported and skipped.
    pub fn remove_symbols(&mut self, symbols: &[String]) -> Vec<String> {
        self.store.remove_symbols(symbols)
    }

    /// Fetch membership and weights for an additional reference index,
    /// stored as `{index}_member` / `{index}_weight`.
    pub fn add_index_membership(&mut self, index: &str) -> Result<()> {
        let member_field = format!("{index}_member");
        if self.store.has_field(&member_field) {
            println!("index [{index}] membership already present");
            return Ok(());
        }
        let weight_field = format!("{index}_weight");
        self.fetch_index(index, &member_field, &weight_field)
    }

    /// Evaluate a formula and optionally persist it as a new field.
    ///
    /// See `FormulaOptions` for the switches. The returned frame is always
    /// daily-frequency (quarterly results come back expanded), truncated
    /// to the nominal window.
    pub fn add_formula(
        &mut self,
        field_name: &str,
        formula_text: &str,
        freq: Frequency,
        opts: &FormulaOptions,
        custom: Option<&CustomFunctions>,
    ) -> Result<FieldFrame> {
        if opts.add_data {
            match self.catalog.classify(field_name) {
                Some(FieldPool::CustomDaily) | Some(FieldPool::CustomQuarterly) | None => {}
                Some(_) => {
                    return Err(PanelError::PredefinedFieldCollision(field_name.to_string()));
                }
            }
            if self.store.has_field(field_name) && !opts.overwrite {
                return Err(PanelError::FieldAlreadyExists(field_name.to_string()));
            }
        }

        let expr = formula::parse(formula_text)?;
        let variables = expr.variables();
        self.resolve_variables(&variables)?;

        let gathered = self.gather_variables(&variables, freq)?;
        let eval_dates: Vec<NaiveDate> = match freq {
            Frequency::Daily => self.calendar.clone(),
            Frequency::Quarterly => self.quarterly_window_dates(),
        };

        let mask = if opts.within_index && freq == Frequency::Daily {
            self.index_mask()
        } else {
            None
        };

        let ctx = EvalContext {
            dates: &eval_dates,
            symbols: self.store.symbols(),
            vars: &gathered,
            index_mask: mask.as_ref(),
            custom,
        };
        let result = formula::evaluate(&expr, &ctx)?;

        let (nominal_start, nominal_end) = (self.config.start_date, self.config.end_date);
        match freq {
            Frequency::Daily => {
                if opts.add_data {
                    self.persist(&result, field_name, freq, opts.overwrite)?;
                }
                Ok(result.slice_dates(nominal_start, nominal_end))
            }
            Frequency::Quarterly => {
                let announcements = self.quarterly_window_series(ANN_DATE_FIELD)?;
                let expanded = expand_quarterly(&result, &announcements, &self.calendar)?;
                if opts.add_data {
                    self.persist(&result, field_name, freq, opts.overwrite)?;
                    self.store.insert_daily_shadow(field_name, &expanded);
                }
                Ok(expanded.slice_dates(nominal_start, nominal_end))
            }
        }
    }

    // ---- internals -------------------------------------------------------

    /// Resolve every formula variable before evaluation starts.
    ///
    /// An empty namespace turns the variable list into the bulk-prepare
    /// set; otherwise missing variables go through the fetch-by-name path.
    /// Any variable still missing afterwards aborts the whole evaluation.
    fn resolve_variables(&mut self, variables: &[String]) -> Result<()> {
        if self.store.field_names().is_empty() {
            self.prepare(variables)?;
        } else {
            for var in variables {
                if self.store.has_field(var) {
                    continue;
                }
                println!(
                    "variable [{var}] is not recognized, trying to fetch from the source..."
                );
                match self.add_field(var) {
                    Ok(true) => {}
                    Ok(false) => {
                        return Err(PanelError::UnresolvedVariable(var.clone()));
                    }
                    Err(e) => {
                        println!("fetching variable [{var}] failed: {e}");
                        return Err(PanelError::UnresolvedVariable(var.clone()));
                    }
                }
            }
        }
        for var in variables {
            if !self.store.has_field(var) {
                return Err(PanelError::UnresolvedVariable(var.clone()));
            }
        }
        Ok(())
    }

    /// Cut every variable onto the evaluation axis.
    ///
    /// Daily output: daily fields (shadows included) come from the
    /// extended daily window; quarterly-only fields are expanded through
    /// the Alignment Engine. Quarterly output: every variable must live in
    /// the quarterly tier.
    fn gather_variables(
        &self,
        variables: &[String],
        freq: Frequency,
    ) -> Result<VariableTable> {
        let mut gathered: VariableTable = BTreeMap::new();
        for var in variables {
            let frame = match freq {
                Frequency::Quarterly => {
                    if !self.store.has_field_in(var, Frequency::Quarterly) {
                        return Err(PanelError::UnsupportedFrequency(format!(
                            "variable '{var}' is daily; a quarterly-output formula needs quarterly variables"
                        )));
                    }
                    self.quarterly_window_series(var)?
                }
                Frequency::Daily => {
                    if self.store.has_field_in(var, Frequency::Daily) {
                        self.store.series(
                            var,
                            Frequency::Daily,
                            self.config.extended_start_daily(),
                            self.config.end_date,
                        )?
                    } else {
                        let values = self.quarterly_window_series(var)?;
                        let announcements = self.quarterly_window_series(ANN_DATE_FIELD)?;
                        expand_quarterly(&values, &announcements, &self.calendar)?
                    }
                }
            };
            gathered.insert(var.clone(), frame);
        }
        Ok(gathered)
    }

    /// The membership mask, or `None` when the field is absent or empty —
    /// evaluation then proceeds unmasked rather than failing.
    fn index_mask(&self) -> Option<FieldFrame> {
        match self.store.series(
            INDEX_MEMBER_FIELD,
            Frequency::Daily,
            self.config.extended_start_daily(),
            self.config.end_date,
        ) {
            Ok(frame) if !frame.is_empty() => Some(frame),
            _ => None,
        }
    }

    fn persist(
        &mut self,
        frame: &FieldFrame,
        name: &str,
        freq: Frequency,
        overwrite: bool,
    ) -> Result<()> {
        match self.store.append(frame, name, freq, overwrite)? {
            AppendOutcome::AlreadyExists => {
                Err(PanelError::FieldAlreadyExists(name.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Store a fetched field, replacing whatever held the name before
    /// (fetch-based resolution always overwrites).
    fn append_checked(&mut self, frame: &FieldFrame, name: &str, freq: Frequency) -> Result<()> {
        self.store.append(frame, name, freq, true)?;
        Ok(())
    }

    fn quarterly_window_dates(&self) -> Vec<NaiveDate> {
        let axis = self.store.panel_dates(Frequency::Quarterly);
        let start = self.config.extended_start_quarterly();
        axis.iter()
            .copied()
            .filter(|d| *d >= start && *d <= self.config.end_date)
            .collect()
    }

    /// A quarterly field over the extended quarterly window.
    fn quarterly_window_series(&self, name: &str) -> Result<FieldFrame> {
        self.store.series(
            name,
            Frequency::Quarterly,
            self.config.extended_start_quarterly(),
            self.config.end_date,
        )
    }

    /// Fill-only merge of announcement dates: a fetched announcement never
    /// overwrites one already stored, so alignment stays stable across
    /// incremental fetches.
    fn merge_announcements(&mut self, incoming: &FieldFrame) {
        if incoming.is_empty() {
            return;
        }
        let merged = if self.store.has_field_in(ANN_DATE_FIELD, Frequency::Quarterly) {
            let axis: Vec<NaiveDate> = {
                let mut union: std::collections::BTreeSet<NaiveDate> = self
                    .store
                    .panel_dates(Frequency::Quarterly)
                    .iter()
                    .copied()
                    .collect();
                union.extend(incoming.dates().iter().copied());
                union.into_iter().collect()
            };
            let existing = self
                .store
                .series(
                    ANN_DATE_FIELD,
                    Frequency::Quarterly,
                    axis[0],
                    *axis.last().unwrap(),
                )
                .expect("announcement field just checked present")
                .reindex_dates(&axis);
            let incoming = incoming.reindex_dates(&axis);
            existing.zip_with(&incoming, |old, new| if old.is_nan() { new } else { old })
        } else {
            incoming.clone()
        };
        self.store.insert_quarterly(ANN_DATE_FIELD, &merged);
    }

    /// Rebuild the daily shadow of a quarterly field from the stored
    /// announcement dates.
    fn expand_and_shadow(&mut self, name: &str) -> Result<()> {
        let values = self.quarterly_window_series(name)?;
        let announcements = self.quarterly_window_series(ANN_DATE_FIELD)?;
        let expanded = expand_quarterly(&values, &announcements, &self.calendar)?;
        self.store.insert_daily_shadow(name, &expanded);
        Ok(())
    }

    fn fetch_index(
        &mut self,
        index: &str,
        member_field: &str,
        weight_field: &str,
    ) -> Result<()> {
        let symbols = self.store.symbols().to_vec();
        let start = self.config.extended_start_daily();
        let end = self.config.end_date;

        let members = self.source.index_members(index, start, end)?;
        let frames = ingest::daily_frames(
            &members,
            &[INDEX_MEMBER_FIELD.to_string()],
            &self.calendar,
            &symbols,
        )?;
        self.append_checked(&frames[INDEX_MEMBER_FIELD], member_field, Frequency::Daily)?;

        let weights = self.source.index_weights(index, start, end)?;
        let frames = ingest::daily_frames(
            &weights,
            &[INDEX_WEIGHT_FIELD.to_string()],
            &self.calendar,
            &symbols,
        )?;
        self.append_checked(&frames[INDEX_WEIGHT_FIELD], weight_field, Frequency::Daily)?;
        Ok(())
    }
}
