//! FieldLab CLI — evaluate formula fields over local CSV tables.
//!
//! Commands:
//! - `eval` — build a panel view from a TOML config and a data directory,
//!   evaluate a formula, print a summary, optionally export CSV
//! - `fields` — prepare the configured fields and list what the view holds

mod csv_source;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use csv_source::CsvSource;
use fieldlab_core::{FieldFrame, FormulaOptions, Frequency, PanelView, ViewConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fieldlab", about = "FieldLab CLI — formula fields over panel data")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a formula over the panel and optionally export the result.
    Eval {
        /// Path to the TOML view config.
        #[arg(long)]
        config: PathBuf,

        /// Directory of per-pool CSV tables.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// The formula text, e.g. "Rank(net_profit / total_assets)".
        formula: String,

        /// Name for the derived field.
        #[arg(long, default_value = "formula_result")]
        name: String,

        /// Treat the result as quarterly frequency (expanded on return).
        #[arg(long, default_value_t = false)]
        quarterly: bool,

        /// Persist the result into the view before returning it.
        #[arg(long, default_value_t = false)]
        store: bool,

        /// Evaluate cross-sectional functions over all symbols, ignoring
        /// index membership.
        #[arg(long, default_value_t = false)]
        no_index: bool,

        /// Write the result as a long-format CSV (date,symbol,value).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Prepare the configured fields and list the view's contents.
    Fields {
        /// Path to the TOML view config.
        #[arg(long)]
        config: PathBuf,

        /// Directory of per-pool CSV tables.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Eval {
            config,
            data_dir,
            formula,
            name,
            quarterly,
            store,
            no_index,
            output,
        } => run_eval(
            config, data_dir, formula, name, quarterly, store, no_index, output,
        ),
        Commands::Fields { config, data_dir } => run_fields(config, data_dir),
    }
}

fn build_view(config_path: &PathBuf, data_dir: PathBuf) -> Result<PanelView> {
    let config = ViewConfig::from_file(config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    let view = PanelView::new(config, Box::new(CsvSource::new(data_dir)))?;
    Ok(view)
}

#[allow(clippy::too_many_arguments)]
fn run_eval(
    config_path: PathBuf,
    data_dir: PathBuf,
    formula: String,
    name: String,
    quarterly: bool,
    store: bool,
    no_index: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut view = build_view(&config_path, data_dir)?;
    let prepare_fields = view.config().fields.clone();
    if !prepare_fields.is_empty() {
        view.prepare(&prepare_fields)?;
    }

    let freq = if quarterly {
        Frequency::Quarterly
    } else {
        Frequency::Daily
    };
    let opts = FormulaOptions {
        add_data: store,
        overwrite: true,
        within_index: !no_index,
    };
    let result = view.add_formula(&name, &formula, freq, &opts, None)?;

    print_summary(&name, &formula, &result);

    if let Some(path) = output {
        write_result_csv(&result, &path)?;
        write_manifest(&name, &formula, &result, &path)?;
        println!("Result saved to: {}", path.display());
    }
    Ok(())
}

fn run_fields(config_path: PathBuf, data_dir: PathBuf) -> Result<()> {
    let mut view = build_view(&config_path, data_dir)?;
    let prepare_fields = view.config().fields.clone();
    if prepare_fields.is_empty() {
        bail!("the config lists no fields to prepare");
    }
    view.prepare(&prepare_fields)?;

    let names = view.field_names();
    println!("Symbols: {}", view.symbols().len());
    println!("Fields:  {}", names.len());
    println!();
    println!("{:<24} {:<16} {:<10}", "Field", "Pool", "Tier");
    println!("{}", "-".repeat(50));
    for name in &names {
        let pool = view
            .pool_of(name)
            .map(|p| p.to_string())
            .unwrap_or_else(|| "(derived)".into());
        let tier = view
            .frequency_of(name)
            .map(|f| f.to_string())
            .unwrap_or_default();
        println!("{name:<24} {pool:<16} {tier:<10}");
    }
    Ok(())
}

fn print_summary(name: &str, formula: &str, result: &FieldFrame) {
    let total = result.n_dates() * result.n_symbols();
    let missing = (0..result.n_dates())
        .flat_map(|di| result.row(di).to_vec())
        .filter(|v| v.is_nan())
        .count();

    println!();
    println!("=== Formula Result ===");
    println!("Field:    {name}");
    println!("Formula:  {formula}");
    if let (Some(first), Some(last)) = (result.dates().first(), result.dates().last()) {
        println!("Window:   {first} to {last}");
    }
    println!("Symbols:  {}", result.n_symbols());
    println!("Dates:    {}", result.n_dates());
    println!(
        "Coverage: {:.1}%",
        if total == 0 {
            0.0
        } else {
            (total - missing) as f64 / total as f64 * 100.0
        }
    );
    println!();
}

fn write_result_csv(result: &FieldFrame, path: &PathBuf) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["trade_date", "symbol", "value"])?;
    for (di, date) in result.dates().iter().enumerate() {
        for (si, symbol) in result.symbols().iter().enumerate() {
            let value = result.get(di, si);
            let rendered = if value.is_nan() {
                String::new()
            } else {
                value.to_string()
            };
            writer.write_record([&date.to_string(), symbol, &rendered])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Sidecar manifest describing what was evaluated.
fn write_manifest(name: &str, formula: &str, result: &FieldFrame, csv_path: &PathBuf) -> Result<()> {
    let manifest = serde_json::json!({
        "field": name,
        "formula": formula,
        "start": result.dates().first().map(|d| d.to_string()),
        "end": result.dates().last().map(|d| d.to_string()),
        "symbols": result.symbols(),
        "rows": result.n_dates() * result.n_symbols(),
    });
    let path = csv_path.with_extension("manifest.json");
    std::fs::write(&path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
