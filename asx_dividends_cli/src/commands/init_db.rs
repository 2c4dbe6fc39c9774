//! The `init-db` subcommand: create or migrate the SQLite schema.

use std::path::PathBuf;

use anyhow::Result;
use asx_dividends_lib::{Db, Settings};
use clap::Args;

#[derive(Args)]
pub struct InitDbArgs {
    /// SQLite database path (defaults to ASX_DB_PATH)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

pub fn run(args: &InitDbArgs, settings: &Settings) -> Result<()> {
    let path = args.db.as_ref().unwrap_or(&settings.db_path);
    let db = Db::open(path)?;
    db.init()?;
    eprintln!(
        "Database initialized at {} ({} runs, {} stored codes)",
        path.display(),
        db.run_count()?,
        db.current_count()?
    );
    Ok(())
}
