//! The `export` subcommand: rewrite the worksheet from stored history.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use asx_dividends_lib::{build_table, CsvWorksheet, CurrentStateSink, Db, Settings, TableSink};
use chrono::{Local, NaiveDate};
use clap::Args;

#[derive(Args)]
pub struct ExportArgs {
    /// Collection date to export (YYYY-MM-DD, defaults to today)
    #[arg(long)]
    pub date: Option<String>,

    /// SQLite database path (defaults to ASX_DB_PATH)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

pub fn run(args: &ExportArgs, settings: &Settings) -> Result<()> {
    let date = match args.date.as_deref() {
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map_err(|e| anyhow!("invalid --date `{}`: {}", text, e))?,
        None => Local::now().date_naive(),
    };

    let path = args.db.as_ref().unwrap_or(&settings.db_path);
    let db = Db::open(path)?;
    db.init()?;

    let history = db.history_for_date(date)?;
    if history.is_empty() {
        eprintln!("No stored history for {}", date);
    }

    let table = build_table(&history);
    let sheet = CsvWorksheet::new(&settings.sheet_dir, settings.sheet_tab.clone());
    sheet.write_table(&table.header, &table.rows, &settings.sheet_start_cell)?;

    eprintln!(
        "Wrote {} rows for {} to {}",
        table.rows.len(),
        date,
        sheet.path().display()
    );
    Ok(())
}
