//! View configuration — universe, window, lookbacks, price adjustment.
//!
//! Loaded from TOML. The lookbacks define the *extended* start dates:
//! formulas with rolling windows or quarterly alignment need history
//! before the nominal window start, and how much is a deployment choice,
//! not something the engine can infer.

use crate::error::{PanelError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Price-adjustment mode for market-daily fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustMode {
    /// Raw exchange prices.
    None,
    /// Forward-adjusted.
    Pre,
    /// Backward-adjusted (the usual research default).
    #[default]
    Post,
}

impl std::fmt::Display for AdjustMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Pre => f.write_str("pre"),
            Self::Post => f.write_str("post"),
        }
    }
}

fn default_daily_lookback() -> i64 {
    90
}

fn default_quarterly_lookback() -> i64 {
    730
}

fn default_all_price() -> bool {
    true
}

/// Everything a `PanelView` needs to know before touching the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewConfig {
    /// The symbol universe, shared by both panels.
    pub symbols: Vec<String>,
    /// Nominal window start.
    pub start_date: NaiveDate,
    /// Window end.
    pub end_date: NaiveDate,
    /// Calendar days of daily history fetched before `start_date`.
    #[serde(default = "default_daily_lookback")]
    pub daily_lookback_days: i64,
    /// Calendar days of quarterly history fetched before `start_date`.
    #[serde(default = "default_quarterly_lookback")]
    pub quarterly_lookback_days: i64,
    #[serde(default)]
    pub adjust_mode: AdjustMode,
    /// Always fetch the full adjustable price set with market-daily data.
    #[serde(default = "default_all_price")]
    pub all_price: bool,
    /// Reference index whose membership masks cross-sectional formulas.
    #[serde(default)]
    pub index: Option<String>,
    /// Fields to prepare up front.
    #[serde(default)]
    pub fields: Vec<String>,
}

impl ViewConfig {
    /// Load a view config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PanelError::Config(format!("read config file: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse a view config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| PanelError::Config(format!("parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(PanelError::Config("symbol universe is empty".into()));
        }
        if self.start_date > self.end_date {
            return Err(PanelError::Config(format!(
                "start_date {} is after end_date {}",
                self.start_date, self.end_date
            )));
        }
        if self.daily_lookback_days < 0 || self.quarterly_lookback_days < 0 {
            return Err(PanelError::Config("lookbacks must be non-negative".into()));
        }
        Ok(())
    }

    /// Start of the extended daily window.
    pub fn extended_start_daily(&self) -> NaiveDate {
        self.start_date - chrono::Duration::days(self.daily_lookback_days)
    }

    /// Start of the extended quarterly window.
    pub fn extended_start_quarterly(&self) -> NaiveDate {
        self.start_date - chrono::Duration::days(self.quarterly_lookback_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
symbols = ["600030.SH", "000001.SZ"]
start_date = "2020-01-01"
end_date = "2020-12-31"
index = "000300.SH"
fields = ["close", "net_profit"]
"#;

    #[test]
    fn toml_defaults_apply() {
        let config = ViewConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.daily_lookback_days, 90);
        assert_eq!(config.quarterly_lookback_days, 730);
        assert_eq!(config.adjust_mode, AdjustMode::Post);
        assert!(config.all_price);
        assert_eq!(config.index.as_deref(), Some("000300.SH"));
    }

    #[test]
    fn extended_starts_precede_nominal_start() {
        let config = ViewConfig::from_toml(SAMPLE).unwrap();
        assert!(config.extended_start_daily() < config.start_date);
        assert!(config.extended_start_quarterly() < config.extended_start_daily());
    }

    #[test]
    fn inverted_window_is_rejected() {
        let bad = SAMPLE.replace("2020-12-31", "2019-12-31");
        assert!(matches!(
            ViewConfig::from_toml(&bad),
            Err(PanelError::Config(_))
        ));
    }

    #[test]
    fn empty_universe_is_rejected() {
        let bad = SAMPLE.replace(r#"["600030.SH", "000001.SZ"]"#, "[]");
        assert!(matches!(
            ViewConfig::from_toml(&bad),
            Err(PanelError::Config(_))
        ));
    }

    #[test]
    fn toml_roundtrip() {
        let config = ViewConfig::from_toml(SAMPLE).unwrap();
        let serialized = toml::to_string(&config).unwrap();
        let parsed = ViewConfig::from_toml(&serialized).unwrap();
        assert_eq!(parsed.symbols, config.symbols);
        assert_eq!(parsed.start_date, config.start_date);
    }

    #[test]
    fn json_roundtrip() {
        let config = ViewConfig::from_toml(SAMPLE).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ViewConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.end_date, config.end_date);
        assert_eq!(parsed.adjust_mode, config.adjust_mode);
    }
}
