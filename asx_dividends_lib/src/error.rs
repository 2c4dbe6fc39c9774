//! Error taxonomy for a collection run.
//!
//! Every variant except `ListingFetch` and `Config` is scoped to one row,
//! security or record: the pipeline logs it with the identifying key and
//! moves on to the next item.

use crate::db::DbError;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// The listing page could not be obtained; the run has nothing to do.
    #[error("listing fetch failed for {url}: {message}")]
    ListingFetch { url: String, message: String },

    /// A single listing row was malformed.
    #[error("row {index} ({code}): {message}")]
    RowExtraction {
        index: usize,
        code: String,
        message: String,
    },

    /// A detail page could not be fetched or parsed on any attempt.
    #[error("detail for {code}: {message}")]
    DetailFetch { code: String, message: String },

    /// A sink rejected a write for one record (or one batch).
    #[error("sink write failed for {code}: {source}")]
    SinkWrite {
        code: String,
        #[source]
        source: SinkError,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Failures raised by sink adapters.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid start cell `{0}`")]
    InvalidCell(String),
    #[error("no stored record for {0}")]
    MissingRecord(String),
}

impl PipelineError {
    /// The security code the failure belongs to, when there is one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::RowExtraction { code, .. }
            | Self::DetailFetch { code, .. }
            | Self::SinkWrite { code, .. } => Some(code),
            Self::ListingFetch { .. } | Self::Config(_) => None,
        }
    }
}
