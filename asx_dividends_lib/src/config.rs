//! Runtime settings read from environment variables (or a `.env` file).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::detail::RetryPolicy;
use crate::error::PipelineError;
use crate::pipeline::{Pacing, PipelineConfig};

pub const DEFAULT_LISTING_URL: &str = "https://www.marketindex.com.au/upcoming-dividends";
pub const DEFAULT_DETAIL_URL: &str = "https://www.marketindex.com.au/asx/{code}";
pub const DEFAULT_DB_PATH: &str = "asx_dividends.db";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5000";

/// Storage targets a run can write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    /// `dividends` and `scrape_runs` tables.
    Sqlite,
    /// Current record per code plus dated history.
    Document,
    /// CSV worksheet.
    Sheet,
}

impl FromStr for SinkKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "document" => Ok(Self::Document),
            "sheet" => Ok(Self::Sheet),
            other => Err(PipelineError::Config(format!(
                "unknown sink `{}` (expected sqlite, document or sheet)",
                other
            ))),
        }
    }
}

/// Parses a comma separated sink list. Blank entries are ignored, duplicates collapse.
pub fn parse_sinks(list: &str) -> Result<Vec<SinkKind>, PipelineError> {
    let mut sinks = Vec::new();
    for name in list.split(',').filter(|s| !s.trim().is_empty()) {
        let kind: SinkKind = name.parse()?;
        if !sinks.contains(&kind) {
            sinks.push(kind);
        }
    }
    Ok(sinks)
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub listing_url: String,
    /// Detail page template; `{code}` becomes the lowercased code.
    pub detail_url: String,
    pub sinks: Vec<SinkKind>,
    pub db_path: PathBuf,
    pub sheet_dir: PathBuf,
    pub sheet_tab: String,
    pub sheet_start_cell: String,
    pub page_timeout: Duration,
    pub detail_timeout: Duration,
    pub retry: RetryPolicy,
    pub pacing: Pacing,
    pub cache_ttl: Duration,
    pub listen_addr: SocketAddr,
}

impl Settings {
    /// Loads settings from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, PipelineError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup. Missing or unparsable
    /// numbers fall back to defaults; a bad sink list or listen address is an error.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, PipelineError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let millis = |key: &str, default: u64| Duration::from_millis(parse_or(&lookup, key, default));

        let sinks = parse_sinks(&text("ASX_SINKS", "sqlite"))?;
        let listen_addr = text("ASX_LISTEN_ADDR", DEFAULT_LISTEN_ADDR)
            .parse()
            .map_err(|e| PipelineError::Config(format!("ASX_LISTEN_ADDR: {}", e)))?;

        let detail_url = text("ASX_DETAIL_URL", DEFAULT_DETAIL_URL);
        if !detail_url.contains("{code}") {
            return Err(PipelineError::Config(format!(
                "ASX_DETAIL_URL `{}` has no {{code}} placeholder",
                detail_url
            )));
        }

        Ok(Self {
            listing_url: text("ASX_LISTING_URL", DEFAULT_LISTING_URL),
            detail_url,
            sinks,
            db_path: PathBuf::from(text("ASX_DB_PATH", DEFAULT_DB_PATH)),
            sheet_dir: PathBuf::from(text("ASX_SHEET_DIR", ".")),
            sheet_tab: text("ASX_SHEET_TAB", "Sheet1"),
            sheet_start_cell: text("ASX_SHEET_START_CELL", "A1"),
            page_timeout: millis("ASX_PAGE_TIMEOUT_MS", 60_000),
            detail_timeout: millis("ASX_DETAIL_TIMEOUT_MS", 30_000),
            retry: RetryPolicy {
                max_attempts: parse_or(&lookup, "ASX_DETAIL_ATTEMPTS", 2),
                backoff: millis("ASX_DETAIL_BACKOFF_MS", 5_000),
            },
            pacing: Pacing {
                min: millis("ASX_PACING_MIN_MS", 3_000),
                max: millis("ASX_PACING_MAX_MS", 5_000),
            },
            cache_ttl: Duration::from_secs(parse_or(&lookup, "ASX_CACHE_TTL_SECS", 3_600)),
            listen_addr,
        })
    }

    pub fn has_sink(&self, kind: SinkKind) -> bool {
        self.sinks.contains(&kind)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            listing_url: self.listing_url.clone(),
            detail_url_template: self.detail_url.clone(),
            page_timeout: self.page_timeout,
            detail_timeout: self.detail_timeout,
            retry: self.retry,
            pacing: self.pacing,
        }
    }
}

fn parse_or<L, T>(lookup: &L, key: &str, default: T) -> T
where
    L: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
