//! SQLite storage for dividend runs and the per-code document store.

use std::path::Path;

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::SinkError;
use crate::normalize::DateField;
use crate::record::{DividendAnnouncement, Payload, KEY_CODE};
use crate::sink::{BatchSink, CurrentStateSink};

#[derive(thiserror::Error, Debug)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stored payload for {0} is not a JSON object")]
    NotAnObject(String),
}

pub struct Db {
    conn: Connection,
    source_url: String,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        Self::configure(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self, DbError> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(Self {
            conn,
            source_url: String::new(),
        })
    }

    /// Listing URL recorded on every `scrape_runs` row written by this handle.
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = url.into();
        self
    }

    pub fn init(&self) -> Result<(), DbError> {
        // Migrations run before the DDL so indexes can reference columns
        // added to tables created by older builds.
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.migrate_v1()?;
            self.conn.pragma_update(None, "user_version", 1)?;
        }

        if version < 2 {
            self.migrate_v2()?;
            self.conn.pragma_update(None, "user_version", 2)?;
        }

        let schema = include_str!("../../schema/sqlite.sql");
        self.conn.execute_batch(schema)?;

        Ok(())
    }

    /// Brings a flat `dividends` table (no run tracking) up to the run schema.
    fn migrate_v1(&self) -> Result<(), DbError> {
        for sql in &[
            "ALTER TABLE dividends ADD COLUMN run_id INTEGER",
            "ALTER TABLE dividends ADD COLUMN franking REAL",
            "ALTER TABLE dividends ADD COLUMN volume_4w REAL",
            "ALTER TABLE dividends ADD COLUMN total_value REAL",
            "ALTER TABLE dividends ADD COLUMN scraped_at TEXT",
        ] {
            self.execute_tolerant(sql)?;
        }
        Ok(())
    }

    /// Carries the old `volume` column into `volume_4w` and fills totals.
    fn migrate_v2(&self) -> Result<(), DbError> {
        self.execute_tolerant(
            "UPDATE dividends SET volume_4w = volume WHERE volume_4w IS NULL",
        )?;
        self.execute_tolerant(
            "UPDATE dividends SET total_value = price * volume_4w
             WHERE total_value IS NULL AND price IS NOT NULL AND volume_4w IS NOT NULL",
        )?;
        Ok(())
    }

    fn execute_tolerant(&self, sql: &str) -> Result<(), DbError> {
        match self.conn.execute(sql, []) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(_, Some(ref msg)))
                if msg.contains("duplicate column name")
                    || msg.contains("no such table")
                    || msg.contains("no such column") =>
            {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Records a run and its announcements in one transaction. Returns the run id.
    pub fn insert_run(&mut self, records: &[DividendAnnouncement]) -> Result<i64, DbError> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO scrape_runs (scraped_at, source_url, notes) VALUES (?1, ?2, ?3)",
            params![
                Utc::now().to_rfc3339(),
                self.source_url,
                format!("{} announcements", records.len())
            ],
        )?;
        let run_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO dividends (
                    run_id, code, company, ex_date, pay_date, amount, franking,
                    yield, price, volume_4w, total_value, scraped_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for record in records {
                stmt.execute(params![
                    run_id,
                    record.code,
                    record.company,
                    date_column(&record.ex_date),
                    date_column(&record.pay_date),
                    record.amount,
                    record.franking,
                    record.yield_,
                    record.price,
                    record.volume_4w,
                    record.total_value,
                    record.last_updated.to_rfc3339(),
                ])?;
            }
        }

        tx.commit()?;
        Ok(run_id)
    }

    pub fn run_count(&self) -> Result<i64, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(1) FROM scrape_runs", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn dividend_count(&self) -> Result<i64, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(1) FROM dividends", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn current_count(&self) -> Result<i64, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(1) FROM announcements", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn get_current(&self, code: &str) -> Result<Option<Payload>, DbError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM announcements WHERE code = ?1",
                params![code],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|text| decode_payload(code, &text)).transpose()
    }

    pub fn set_current(&self, code: &str, payload: &Payload) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO announcements (code, payload, last_updated)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(code) DO UPDATE SET
                payload = excluded.payload,
                last_updated = excluded.last_updated",
            params![code, serde_json::to_string(payload)?, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Merges `fields` into the stored payload. Returns false when no record exists.
    pub fn merge_current(&self, code: &str, fields: &Payload) -> Result<bool, DbError> {
        let tx = self.conn.unchecked_transaction()?;

        let raw: Option<String> = tx
            .query_row(
                "SELECT payload FROM announcements WHERE code = ?1",
                params![code],
                |row| row.get(0),
            )
            .optional()?;
        let Some(raw) = raw else {
            return Ok(false);
        };

        let mut payload = decode_payload(code, &raw)?;
        for (key, value) in fields {
            payload.insert(key.clone(), value.clone());
        }
        tx.execute(
            "UPDATE announcements SET payload = ?2, last_updated = ?3 WHERE code = ?1",
            params![code, serde_json::to_string(&payload)?, Utc::now().to_rfc3339()],
        )?;

        tx.commit()?;
        Ok(true)
    }

    pub fn put_history(
        &self,
        code: &str,
        date: NaiveDate,
        payload: &Payload,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO announcement_history (code, collected_at, payload)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(code, collected_at) DO UPDATE SET payload = excluded.payload",
            params![code, date.to_string(), serde_json::to_string(payload)?],
        )?;
        Ok(())
    }

    /// History snapshots for one collection date, ordered by code.
    pub fn history_on(&self, date: NaiveDate) -> Result<Vec<Payload>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT code, payload FROM announcement_history
             WHERE collected_at = ?1
             ORDER BY code",
        )?;
        let rows = stmt.query_map(params![date.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (code, raw) = row?;
            let mut payload = decode_payload(&code, &raw)?;
            payload
                .entry(KEY_CODE)
                .or_insert_with(|| Value::String(code.clone()));
            out.push(payload);
        }
        Ok(out)
    }
}

/// Canonical dates as ISO text, unknown as NULL, unparsed text kept verbatim.
fn date_column(field: &DateField) -> Option<String> {
    match field {
        DateField::Unknown => None,
        other => Some(other.to_string()),
    }
}

fn decode_payload(code: &str, raw: &str) -> Result<Payload, DbError> {
    match serde_json::from_str(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(DbError::NotAnObject(code.to_string())),
    }
}

impl BatchSink for Db {
    fn insert_batch(&mut self, records: &[DividendAnnouncement]) -> Result<usize, SinkError> {
        let run_id = self.insert_run(records)?;
        tracing::debug!(run_id, rows = records.len(), "dividend batch stored");
        Ok(records.len())
    }
}

impl CurrentStateSink for Db {
    fn get(&self, code: &str) -> Result<Option<Payload>, SinkError> {
        Ok(self.get_current(code)?)
    }

    fn set(&self, code: &str, record: &Payload) -> Result<(), SinkError> {
        Ok(self.set_current(code, record)?)
    }

    fn update(&self, code: &str, fields: &Payload) -> Result<(), SinkError> {
        if self.merge_current(code, fields)? {
            Ok(())
        } else {
            Err(SinkError::MissingRecord(code.to_string()))
        }
    }

    fn append_history(
        &self,
        code: &str,
        date: NaiveDate,
        payload: &Payload,
    ) -> Result<(), SinkError> {
        Ok(self.put_history(code, date, payload)?)
    }

    fn history_for_date(&self, date: NaiveDate) -> Result<Vec<Payload>, SinkError> {
        Ok(self.history_on(date)?)
    }
}
