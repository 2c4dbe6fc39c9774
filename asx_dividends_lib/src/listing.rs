//! Extraction of candidate rows from the upcoming-dividends listing page.

use scraper::{ElementRef, Html, Selector};

use crate::error::PipelineError;
use crate::normalize::parse_number;

/// Body rows of the listing table.
pub const ROW_SELECTOR: &str = "table tbody tr";

// Positional columns of the upcoming-dividends table. A column added or
// reordered upstream silently shifts these.
const COL_CODE: usize = 0;
const COL_COMPANY: usize = 1;
const COL_EX_DATE: usize = 3;
const COL_AMOUNT: usize = 4;
const COL_FRANKING: usize = 5;
const COL_PAY_DATE: usize = 7;
const COL_YIELD: usize = 8;
const MIN_CELLS: usize = COL_YIELD + 1;

/// Placeholder code for a row whose code cell could not be read.
pub const UNKNOWN_CODE: &str = "Unknown";

/// Raw text of one dividend-paying listing row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRow {
    /// Zero-based position of the row on the page.
    pub index: usize,
    pub code: String,
    pub company: String,
    pub ex_date: String,
    pub amount: String,
    pub franking: String,
    pub pay_date: String,
    pub yield_: String,
}

/// Cell text of every body row on a listing page.
///
/// The document is parsed once; [`ListingTable::rows`] walks the rows
/// lazily and can be called any number of times.
#[derive(Debug, Clone, Default)]
pub struct ListingTable {
    cells: Vec<Vec<String>>,
}

impl ListingTable {
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        let (Ok(row_sel), Ok(cell_sel)) = (Selector::parse(ROW_SELECTOR), Selector::parse("td"))
        else {
            return Self::default();
        };
        let cells = document
            .select(&row_sel)
            .map(|row| row.select(&cell_sel).map(cell_text).collect())
            .collect();
        Self { cells }
    }

    /// Number of candidate rows, before any filtering.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Dividend-paying rows in page order.
    ///
    /// Rows without cells, and rows whose amount is blank, nil or zero, are
    /// skipped. A malformed row yields an error and iteration continues.
    pub fn rows(&self) -> impl Iterator<Item = Result<ListingRow, PipelineError>> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(index, cells)| read_row(index, cells).transpose())
    }
}

/// Text of a cell with each text node trimmed, empty nodes dropped.
fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .concat()
}

fn read_row(index: usize, cells: &[String]) -> Result<Option<ListingRow>, PipelineError> {
    let Some(code) = cells.first() else {
        return Ok(None);
    };
    if code.is_empty() {
        return Err(PipelineError::RowExtraction {
            index,
            code: UNKNOWN_CODE.to_string(),
            message: "empty code cell".into(),
        });
    }

    let cell = |col: usize| {
        cells
            .get(col)
            .cloned()
            .ok_or_else(|| PipelineError::RowExtraction {
                index,
                code: code.clone(),
                message: format!(
                    "expected at least {} cells, found {}",
                    MIN_CELLS,
                    cells.len()
                ),
            })
    };

    let amount = cell(COL_AMOUNT)?;
    match parse_number(&amount) {
        Some(value) if value != 0.0 => {}
        _ => return Ok(None),
    }

    Ok(Some(ListingRow {
        index,
        code: code.clone(),
        company: cell(COL_COMPANY)?,
        ex_date: cell(COL_EX_DATE)?,
        amount,
        franking: cell(COL_FRANKING)?,
        pay_date: cell(COL_PAY_DATE)?,
        yield_: cell(COL_YIELD)?,
    }))
}
