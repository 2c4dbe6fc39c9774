//! Worksheet output: table building and a CSV-backed worksheet.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::Value;

use crate::error::SinkError;
use crate::record::{DividendAnnouncement, Payload, KEY_CODE};
use crate::sink::TableSink;

/// Column order for the worksheet. Keys outside this list follow in sorted order.
pub const PREFERRED_COLUMNS: [&str; 11] = [
    "Code",
    "Company",
    "Ex Date",
    "Pay Date",
    "Amount",
    "Franking",
    "Yield",
    "Price",
    "4W Volume",
    "Total Value",
    "last_updated",
];

/// A header row and string cells, ready for a [`TableSink`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Lays payloads out as a table sorted by code.
pub fn build_table(payloads: &[Payload]) -> Table {
    let present: BTreeSet<&str> = payloads
        .iter()
        .flat_map(|p| p.keys().map(String::as_str))
        .collect();

    let mut header: Vec<String> = if payloads.is_empty() {
        PREFERRED_COLUMNS.iter().map(|c| c.to_string()).collect()
    } else {
        PREFERRED_COLUMNS
            .iter()
            .filter(|c| present.contains(*c))
            .map(|c| c.to_string())
            .collect()
    };
    header.extend(
        present
            .iter()
            .filter(|k| !PREFERRED_COLUMNS.contains(*k))
            .map(|k| k.to_string()),
    );

    let mut sorted: Vec<&Payload> = payloads.iter().collect();
    sorted.sort_by_key(|p| sort_code(p));

    let rows = sorted
        .into_iter()
        .map(|p| header.iter().map(|key| cell(p.get(key))).collect())
        .collect();

    Table { header, rows }
}

/// Table of every field of the given records.
pub fn table_from_records(records: &[DividendAnnouncement]) -> Result<Table, serde_json::Error> {
    let payloads = records
        .iter()
        .map(DividendAnnouncement::to_full_payload)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(build_table(&payloads))
}

fn sort_code(payload: &Payload) -> String {
    payload
        .get(KEY_CODE)
        .map(|v| cell(Some(v)))
        .unwrap_or_default()
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Zero-based (row, column) of an A1-style cell reference.
pub fn parse_start_cell(cell: &str) -> Result<(usize, usize), SinkError> {
    let cell_re = Regex::new(r"^([A-Za-z]{1,3})([1-9][0-9]*)$")
        .map_err(|e| SinkError::InvalidCell(format!("{}: {}", cell, e)))?;
    let caps = cell_re
        .captures(cell.trim())
        .ok_or_else(|| SinkError::InvalidCell(cell.to_string()))?;

    let col = caps[1]
        .chars()
        .fold(0usize, |acc, ch| acc * 26 + (ch.to_ascii_uppercase() as usize - 'A' as usize + 1));
    let row: usize = caps[2]
        .parse()
        .map_err(|_| SinkError::InvalidCell(cell.to_string()))?;

    Ok((row - 1, col - 1))
}

/// One CSV file per tab inside a workbook directory.
#[derive(Debug, Clone)]
pub struct CsvWorksheet {
    dir: PathBuf,
    tab: String,
}

impl CsvWorksheet {
    pub fn new(dir: impl Into<PathBuf>, tab: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            tab: tab.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.csv", self.tab))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl TableSink for CsvWorksheet {
    fn write_table(
        &self,
        header: &[String],
        rows: &[Vec<String>],
        start_cell: &str,
    ) -> Result<(), SinkError> {
        let (row_offset, col_offset) = parse_start_cell(start_cell)?;
        fs::create_dir_all(&self.dir)?;

        let width = col_offset + header.len();
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(self.path())?;

        for _ in 0..row_offset {
            writer.write_record(vec![""; width.max(1)])?;
        }
        for line in std::iter::once(header).chain(rows.iter().map(Vec::as_slice)) {
            let padded = std::iter::repeat("")
                .take(col_offset)
                .chain(line.iter().map(String::as_str));
            writer.write_record(padded)?;
        }
        writer.flush()?;

        tracing::debug!(path = %self.path().display(), rows = rows.len(), "worksheet written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "asx-sheet-{}-{}-{}",
            name,
            std::process::id(),
            rand::random::<u32>()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn columns_follow_preferred_order_then_extras() {
        let table = build_table(&[payload(json!({
            "Total Value": 10.0,
            "Code": "BHP",
            "Crawl Date": "2025-03-03",
            "Amount": 0.5,
            "Archive": "x"
        }))]);

        assert_eq!(
            table.header,
            vec!["Code", "Amount", "Total Value", "Archive", "Crawl Date"]
        );
        assert_eq!(table.rows[0], vec!["BHP", "0.5", "10.0", "x", "2025-03-03"]);
    }

    #[test]
    fn rows_sorted_by_code_and_nulls_blank() {
        let table = build_table(&[
            payload(json!({"Code": "WES", "Price": null})),
            payload(json!({"Code": "ANZ", "Price": 27.5})),
            payload(json!({"Code": "CBA"})),
        ]);

        let codes: Vec<&str> = table.rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(codes, vec!["ANZ", "CBA", "WES"]);
        assert_eq!(table.rows[1][1], "");
        assert_eq!(table.rows[2][1], "");
    }

    #[test]
    fn empty_input_keeps_preferred_header() {
        let table = build_table(&[]);
        assert_eq!(table.header.len(), PREFERRED_COLUMNS.len());
        assert!(table.rows.is_empty());
    }

    #[test]
    fn start_cell_parsing() {
        assert_eq!(parse_start_cell("A1").unwrap(), (0, 0));
        assert_eq!(parse_start_cell("c4").unwrap(), (3, 2));
        assert_eq!(parse_start_cell("AA10").unwrap(), (9, 26));
        assert!(matches!(parse_start_cell("A0"), Err(SinkError::InvalidCell(_))));
        assert!(matches!(parse_start_cell("1A"), Err(SinkError::InvalidCell(_))));
        assert!(matches!(parse_start_cell(""), Err(SinkError::InvalidCell(_))));
    }

    #[test]
    fn worksheet_writes_offset_table_and_clears_previous() {
        let dir = scratch_dir("offset");
        let sheet = CsvWorksheet::new(&dir, "Dividends");
        let header = vec!["Code".to_string(), "Price".to_string()];

        sheet
            .write_table(
                &header,
                &[
                    vec!["OLD".into(), "1".into()],
                    vec!["OLD2".into(), "2".into()],
                ],
                "A1",
            )
            .unwrap();
        sheet
            .write_table(&header, &[vec!["BHP".into(), "45.1".into()]], "B2")
            .unwrap();

        let text = fs::read_to_string(sheet.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![",,", ",Code,Price", ",BHP,45.1"]);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn worksheet_rejects_bad_cell_without_touching_file() {
        let dir = scratch_dir("badcell");
        let sheet = CsvWorksheet::new(&dir, "Sheet1");

        let err = sheet.write_table(&["Code".into()], &[], "??").unwrap_err();

        assert!(matches!(err, SinkError::InvalidCell(_)));
        assert!(!sheet.path().exists());
        fs::remove_dir_all(dir).ok();
    }
}
