mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use asx_dividends_lib::Settings;

#[derive(Parser)]
#[command(name = "asx-dividends")]
#[command(about = "Collect upcoming ASX dividends with price and volume from Market Index")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect once and write to the configured sinks
    Run(commands::run::RunArgs),
    /// Serve the HTTP trigger endpoint
    Serve(commands::serve::ServeArgs),
    /// Create or migrate the SQLite schema
    InitDb(commands::init_db::InitDbArgs),
    /// Rebuild the worksheet from stored history
    Export(commands::export::ExportArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("asx_dividends=info".parse()?)
                .add_directive("marketindex_client=info".parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    match cli.command {
        Commands::Run(args) => commands::run::run(&args, settings).await?,
        Commands::Serve(args) => commands::serve::run(&args, settings).await?,
        Commands::InitDb(args) => commands::init_db::run(&args, &settings)?,
        Commands::Export(args) => commands::export::run(&args, &settings)?,
    }

    Ok(())
}
