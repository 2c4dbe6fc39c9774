//! Storage seams. The pipeline talks to sinks only through these traits.

use chrono::NaiveDate;

use crate::error::SinkError;
use crate::record::{DividendAnnouncement, Payload};

/// Latest known record per security code, plus a dated history.
pub trait CurrentStateSink {
    fn get(&self, code: &str) -> Result<Option<Payload>, SinkError>;

    /// Replaces the whole record.
    fn set(&self, code: &str, record: &Payload) -> Result<(), SinkError>;

    /// Merges `fields` into the existing record; keys not named are kept.
    fn update(&self, code: &str, fields: &Payload) -> Result<(), SinkError>;

    /// Stores the snapshot for `code` on `date`, replacing any earlier one for that date.
    fn append_history(&self, code: &str, date: NaiveDate, payload: &Payload)
        -> Result<(), SinkError>;

    /// Every snapshot taken on `date`, ordered by code.
    fn history_for_date(&self, date: NaiveDate) -> Result<Vec<Payload>, SinkError>;
}

/// Append-only relational store receiving one batch per run.
pub trait BatchSink {
    /// Returns the number of rows written.
    fn insert_batch(&mut self, records: &[DividendAnnouncement]) -> Result<usize, SinkError>;
}

/// Rectangular output such as a spreadsheet tab.
pub trait TableSink {
    /// Clears the target and writes `header` then `rows`, anchored at `start_cell` (A1 notation).
    fn write_table(
        &self,
        header: &[String],
        rows: &[Vec<String>],
        start_cell: &str,
    ) -> Result<(), SinkError>;
}
