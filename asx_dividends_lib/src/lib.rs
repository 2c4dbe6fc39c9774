//! Upcoming ASX dividend collection: listing extraction, detail enrichment,
//! normalization, reconciliation against stored records, and the sinks
//! results are written to.
//!
//! Page fetching lives in the `marketindex_client` crate; everything here is
//! generic over its [`PageFetcher`](marketindex_client::PageFetcher) trait.

pub mod config;
pub mod db;
pub mod detail;
pub mod error;
pub mod listing;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod record;
pub mod sheet;
pub mod sink;
pub mod store;

#[cfg(test)]
mod testing;

pub use marketindex_client;

pub use config::{Settings, SinkKind};
pub use db::{Db, DbError};
pub use detail::{DetailEnricher, DetailQuote, EnrichState, Enrichment, RetryPolicy};
pub use error::{PipelineError, SinkError};
pub use listing::{ListingRow, ListingTable};
pub use normalize::{parse_flexible_date, parse_number, parse_percent, DateField};
pub use pipeline::{
    run_job, Collection, Pacing, PersistReport, Pipeline, PipelineConfig, RunSummary, SinkSet,
};
pub use reconcile::{reconcile, PriorState, Reconciler, Reconciliation, WriteMode};
pub use record::{assemble, DividendAnnouncement, Payload};
pub use sheet::{build_table, CsvWorksheet, Table};
pub use sink::{BatchSink, CurrentStateSink, TableSink};
pub use store::MemoryStore;
