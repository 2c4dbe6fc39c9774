//! Normalizers for the text scraped from listing and detail pages.
//!
//! Numbers arrive with grouping commas, currency and percent signs, or one
//! of several dash glyphs the site uses for "nil". Dates arrive as
//! `15 Mar`, `15 March` or `15 Mar 2025`.

use std::fmt;

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Marker the site (and our stored records) use for an absent date.
pub const NOT_AVAILABLE: &str = "N/A";

/// `%B` also accepts the three-letter abbreviation when parsing.
const DATE_FORMAT: &str = "%d %B %Y";
const ISO_FORMAT: &str = "%Y-%m-%d";

/// Text that means "no value" rather than a malformed number.
const NIL_SENTINELS: &[&str] = &[
    "-",
    "\u{2010}",
    "\u{2011}",
    "\u{2012}",
    "\u{2013}",
    "\u{2014}",
    "\u{2212}",
    NOT_AVAILABLE,
];

/// A date column after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateField {
    /// Parsed calendar date.
    Canonical(NaiveDate),
    /// Source cell was empty or `N/A`.
    Unknown,
    /// Source text that could not be read as a date, kept verbatim.
    Raw(String),
}

impl DateField {
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Canonical(date) => Some(*date),
            _ => None,
        }
    }

    /// Rebuilds a field from its stored text form (the inverse of `Display`).
    pub fn from_stored(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() || text == NOT_AVAILABLE {
            return Self::Unknown;
        }
        match NaiveDate::parse_from_str(text, ISO_FORMAT) {
            Ok(date) => Self::Canonical(date),
            Err(_) => Self::Raw(text.to_string()),
        }
    }
}

impl fmt::Display for DateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canonical(date) => write!(f, "{}", date.format(ISO_FORMAT)),
            Self::Unknown => f.write_str(NOT_AVAILABLE),
            Self::Raw(text) => f.write_str(text),
        }
    }
}

impl Serialize for DateField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DateField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::from_stored(&text))
    }
}

/// Parses a day-month-year date, defaulting a missing year to the current one.
pub fn parse_flexible_date(text: &str) -> DateField {
    parse_flexible_date_in_year(text, Local::now().year())
}

/// Same as [`parse_flexible_date`] with an explicit default year.
pub fn parse_flexible_date_in_year(text: &str, default_year: i32) -> DateField {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == NOT_AVAILABLE {
        return DateField::Unknown;
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
        return DateField::Canonical(date);
    }
    let with_year = format!("{} {}", trimmed, default_year);
    match NaiveDate::parse_from_str(&with_year, DATE_FORMAT) {
        Ok(date) => DateField::Canonical(date),
        Err(_) => DateField::Raw(text.to_string()),
    }
}

/// Parses a plain, currency or percent number. `None` for blanks, nil
/// glyphs and anything that is not a finite number.
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() || NIL_SENTINELS.contains(&trimmed) {
        return None;
    }
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '%'))
        .collect();
    let value: f64 = cleaned.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

/// Percentage text as a fraction: `"100%"` becomes `1.0`.
pub fn parse_percent(text: &str) -> Option<f64> {
    parse_number(text).map(|value| value / 100.0)
}
