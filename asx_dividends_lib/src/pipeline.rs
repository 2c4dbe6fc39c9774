//! Run orchestration: collect announcements, then hand them to the sinks.

use std::time::Duration;

use chrono::{Local, NaiveDate, Utc};
use marketindex_client::{CacheMode, FetchRequest, HttpFetcher, PageFetcher};
use rand::Rng;
use tokio::time::sleep;

use crate::config::{Settings, SinkKind, DEFAULT_DETAIL_URL, DEFAULT_LISTING_URL};
use crate::db::Db;
use crate::detail::{DetailEnricher, RetryPolicy};
use crate::error::{PipelineError, SinkError};
use crate::listing::{ListingRow, ListingTable, ROW_SELECTOR};
use crate::reconcile::Reconciler;
use crate::record::{assemble, DividendAnnouncement};
use crate::sheet::{build_table, table_from_records, CsvWorksheet, Table};
use crate::sink::{BatchSink, CurrentStateSink, TableSink};

/// Scrolls the listing so lazily rendered rows are present.
const LISTING_SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// Code reported for failures that are not tied to one security.
pub const BATCH_CODE: &str = "*";

/// Jittered delay between consecutive securities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min: Duration,
    pub max: Duration,
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// A delay drawn uniformly from `[min, max]`.
    pub fn next_delay(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(3),
            max: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub listing_url: String,
    pub detail_url_template: String,
    pub page_timeout: Duration,
    pub detail_timeout: Duration,
    pub retry: RetryPolicy,
    pub pacing: Pacing,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            detail_url_template: DEFAULT_DETAIL_URL.to_string(),
            page_timeout: Duration::from_secs(60),
            detail_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            pacing: Pacing::default(),
        }
    }
}

/// Everything one run produced before any sink was touched.
#[derive(Debug)]
pub struct Collection {
    pub collected_at: NaiveDate,
    /// In listing order.
    pub announcements: Vec<DividendAnnouncement>,
    pub row_errors: Vec<PipelineError>,
    /// Securities whose detail page did not yield both fields.
    pub detail_errors: Vec<PipelineError>,
    /// Set when the listing could not be fetched; nothing else ran.
    pub listing_error: Option<PipelineError>,
}

impl Collection {
    fn empty(collected_at: NaiveDate) -> Self {
        Self {
            collected_at,
            announcements: Vec::new(),
            row_errors: Vec::new(),
            detail_errors: Vec::new(),
            listing_error: None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.listing_error.is_some()
    }
}

/// Listing extraction, detail enrichment and assembly over one fetcher.
pub struct Pipeline<F> {
    enricher: DetailEnricher<F>,
    config: PipelineConfig,
}

impl<F: PageFetcher> Pipeline<F> {
    pub fn new(fetcher: F, config: PipelineConfig) -> Self {
        let enricher = DetailEnricher::new(
            fetcher,
            config.detail_url_template.clone(),
            config.detail_timeout,
            config.retry,
        );
        Self { enricher, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Collects today's announcements (local calendar date).
    pub async fn collect(&self) -> Collection {
        self.collect_on(Local::now().date_naive()).await
    }

    /// Collects announcements tagged with `collected_at`.
    pub async fn collect_on(&self, collected_at: NaiveDate) -> Collection {
        let mut collection = Collection::empty(collected_at);

        let rows = match self.fetch_listing().await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!("{}", err);
                collection.listing_error = Some(err);
                return collection;
            }
        };

        let mut enriched_any = false;
        for row in rows {
            let row = match row {
                Ok(row) => row,
                Err(err) => {
                    tracing::warn!(code = err.code().unwrap_or_default(), "{}", err);
                    collection.row_errors.push(err);
                    continue;
                }
            };

            if enriched_any {
                let delay = self.config.pacing.next_delay();
                sleep(delay).await;
            }
            enriched_any = true;

            let enrichment = self.enricher.enrich(&row.code).await;
            if let Some(shortfall) = enrichment.shortfall(&row.code) {
                tracing::warn!(code = %row.code, attempts = enrichment.attempts, "{}", shortfall);
                collection.detail_errors.push(shortfall);
            }

            match assemble(&row, enrichment.quote, collected_at, Utc::now()) {
                Ok(record) => {
                    tracing::info!(
                        index = row.index,
                        code = %record.code,
                        price = ?record.price,
                        volume_4w = ?record.volume_4w,
                        "announcement collected"
                    );
                    collection.announcements.push(record);
                }
                Err(err) => {
                    tracing::warn!(code = %row.code, "{}", err);
                    collection.row_errors.push(err);
                }
            }
        }

        tracing::info!(
            announcements = collection.announcements.len(),
            row_errors = collection.row_errors.len(),
            partial = collection.detail_errors.len(),
            "collection finished"
        );
        collection
    }

    async fn fetch_listing(
        &self,
    ) -> Result<Vec<Result<ListingRow, PipelineError>>, PipelineError> {
        let url = &self.config.listing_url;
        tracing::info!(url = %url, "fetching listing");

        let request = FetchRequest::new(url.as_str())
            .wait_for(ROW_SELECTOR)
            .timeout(self.config.page_timeout)
            .render_script(LISTING_SCROLL_SCRIPT)
            .cache_mode(CacheMode::Bypass);
        let outcome = self.enricher.fetcher().fetch(&request).await;

        let html = outcome.page().ok_or_else(|| PipelineError::ListingFetch {
            url: url.clone(),
            message: outcome
                .error
                .clone()
                .unwrap_or_else(|| "no content".to_string()),
        })?;

        let table = ListingTable::parse(html);
        tracing::info!(rows = table.len(), "listing rows found");
        Ok(table.rows().collect())
    }
}

/// What `SinkSet::persist` managed to write.
#[derive(Debug, Default)]
pub struct PersistReport {
    /// Rows inserted by the relational sink, if it ran and succeeded.
    pub batch_rows: Option<usize>,
    /// Records written to the document store.
    pub stored: usize,
    /// Data rows written to the worksheet, if it ran and succeeded.
    pub sheet_rows: Option<usize>,
    pub failures: Vec<PipelineError>,
    /// True when the run had no listing and every sink was skipped.
    pub skipped: bool,
}

/// The sinks enabled for a run. Each is optional and runs independently.
#[derive(Default)]
pub struct SinkSet {
    relational: Option<Box<dyn BatchSink + Send>>,
    document: Option<Box<dyn CurrentStateSink + Send>>,
    sheet: Option<(Box<dyn TableSink + Send>, String)>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the sinks named in `settings`. SQLite handles get the schema applied.
    pub fn from_settings(settings: &Settings) -> Result<Self, SinkError> {
        let mut sinks = Self::new();
        if settings.has_sink(SinkKind::Sqlite) {
            let db = Db::open(&settings.db_path)?.with_source_url(settings.listing_url.clone());
            db.init()?;
            sinks = sinks.with_relational(db);
        }
        if settings.has_sink(SinkKind::Document) {
            let db = Db::open(&settings.db_path)?;
            db.init()?;
            sinks = sinks.with_document(db);
        }
        if settings.has_sink(SinkKind::Sheet) {
            sinks = sinks.with_sheet(
                CsvWorksheet::new(&settings.sheet_dir, settings.sheet_tab.clone()),
                settings.sheet_start_cell.clone(),
            );
        }
        Ok(sinks)
    }

    pub fn with_relational(mut self, sink: impl BatchSink + Send + 'static) -> Self {
        self.relational = Some(Box::new(sink));
        self
    }

    pub fn with_document(mut self, sink: impl CurrentStateSink + Send + 'static) -> Self {
        self.document = Some(Box::new(sink));
        self
    }

    pub fn with_sheet(
        mut self,
        sink: impl TableSink + Send + 'static,
        start_cell: impl Into<String>,
    ) -> Self {
        self.sheet = Some((Box::new(sink), start_cell.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.relational.is_none() && self.document.is_none() && self.sheet.is_none()
    }

    pub fn document(&self) -> Option<&(dyn CurrentStateSink + Send)> {
        self.document.as_deref()
    }

    /// Writes relational batch, then document store, then worksheet.
    ///
    /// The relational batch keeps what this run scraped; only the document
    /// store and the worksheet built from it see values patched from the
    /// prior record.
    pub fn persist(&mut self, collection: &Collection) -> PersistReport {
        let mut report = PersistReport::default();
        if collection.is_aborted() {
            tracing::warn!("listing unavailable, skipping sinks");
            report.skipped = true;
            return report;
        }

        if let Some(sink) = self.relational.as_mut() {
            match sink.insert_batch(&collection.announcements) {
                Ok(rows) => {
                    tracing::info!(rows, "relational batch stored");
                    report.batch_rows = Some(rows);
                }
                Err(source) => {
                    tracing::error!(code = BATCH_CODE, "relational batch failed: {}", source);
                    report.failures.push(PipelineError::SinkWrite {
                        code: BATCH_CODE.to_string(),
                        source,
                    });
                }
            }
        }

        if let Some(sink) = self.document.as_deref() {
            let outcome = Reconciler::new(sink).store_all(collection.announcements.clone());
            tracing::info!(
                stored = outcome.records.len(),
                failed = outcome.failures.len(),
                "document store updated"
            );
            report.stored = outcome.records.len();
            report.failures.extend(outcome.failures);
        }

        if let Some((sheet, start_cell)) = self.sheet.as_ref() {
            let written = self
                .sheet_table(collection)
                .and_then(|table| {
                    sheet.write_table(&table.header, &table.rows, start_cell)?;
                    Ok(table.rows.len())
                });
            match written {
                Ok(rows) => {
                    tracing::info!(rows, "worksheet written");
                    report.sheet_rows = Some(rows);
                }
                Err(source) => {
                    tracing::error!(code = BATCH_CODE, "worksheet write failed: {}", source);
                    report.failures.push(PipelineError::SinkWrite {
                        code: BATCH_CODE.to_string(),
                        source,
                    });
                }
            }
        }

        report
    }

    /// Stored history for the run date when a document store is enabled,
    /// otherwise the collected records.
    fn sheet_table(&self, collection: &Collection) -> Result<Table, SinkError> {
        match self.document.as_deref() {
            Some(store) => Ok(build_table(&store.history_for_date(collection.collected_at)?)),
            None => Ok(table_from_records(&collection.announcements)?),
        }
    }
}

/// Summary of one configured run.
#[derive(Debug)]
pub struct RunSummary {
    pub collection: Collection,
    pub report: PersistReport,
}

/// Opens the configured sinks, collects, and persists. Used by the CLI and
/// the trigger endpoint.
pub async fn run_job(settings: Settings) -> Result<RunSummary, PipelineError> {
    let fetcher = HttpFetcher::new(settings.cache_ttl)
        .map_err(|e| PipelineError::Config(format!("http client: {}", e)))?;
    let mut sinks = SinkSet::from_settings(&settings).map_err(|source| PipelineError::SinkWrite {
        code: BATCH_CODE.to_string(),
        source,
    })?;
    if sinks.is_empty() {
        tracing::warn!("no sinks enabled, results will not be stored");
    }

    let pipeline = Pipeline::new(fetcher, settings.pipeline_config());
    let collection = pipeline.collect().await;
    let report = sinks.persist(&collection);

    tracing::info!(
        announcements = collection.announcements.len(),
        failures = report.failures.len(),
        "run complete"
    );
    Ok(RunSummary { collection, report })
}
