//! The `run` subcommand: collect once, persist, print.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use asx_dividends_lib::config::parse_sinks;
use asx_dividends_lib::{run_job, Settings};
use clap::Args;

use crate::output::{print_announcements_csv, print_announcements_table, print_json, OutputFormat};

#[derive(Args)]
pub struct RunArgs {
    /// Output format for the collected announcements
    #[arg(long, value_enum, default_value = "table")]
    pub output: OutputFormat,

    /// SQLite database path (overrides ASX_DB_PATH)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Comma separated sinks: sqlite, document, sheet (overrides ASX_SINKS)
    #[arg(long)]
    pub sinks: Option<String>,
}

pub async fn run(args: &RunArgs, mut settings: Settings) -> Result<()> {
    if let Some(db) = &args.db {
        settings.db_path = db.clone();
    }
    if let Some(sinks) = &args.sinks {
        settings.sinks = parse_sinks(sinks)?;
    }

    eprintln!("Collecting upcoming dividends from {}", settings.listing_url);
    let summary = run_job(settings).await?;
    let collection = &summary.collection;

    if let Some(err) = &collection.listing_error {
        return Err(anyhow!("run aborted: {}", err));
    }

    match args.output {
        OutputFormat::Table => print_announcements_table(&collection.announcements),
        OutputFormat::Json => print_json(&collection.announcements),
        OutputFormat::Csv => print_announcements_csv(&collection.announcements)?,
    }

    let report = &summary.report;
    eprintln!(
        "Collected {} announcements ({} row errors, {} without full quote)",
        collection.announcements.len(),
        collection.row_errors.len(),
        collection.detail_errors.len()
    );
    if let Some(rows) = report.batch_rows {
        eprintln!("  relational: {} rows", rows);
    }
    if report.stored > 0 {
        eprintln!("  document store: {} records", report.stored);
    }
    if let Some(rows) = report.sheet_rows {
        eprintln!("  worksheet: {} rows", rows);
    }
    for failure in &report.failures {
        eprintln!("  sink failure: {}", failure);
    }

    Ok(())
}
