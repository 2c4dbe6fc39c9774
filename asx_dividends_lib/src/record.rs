//! The canonical dividend announcement and its assembly from scraped parts.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::detail::DetailQuote;
use crate::error::PipelineError;
use crate::listing::ListingRow;
use crate::normalize::{parse_flexible_date_in_year, parse_number, parse_percent, DateField};

/// Field map written to document-style sinks.
pub type Payload = serde_json::Map<String, Value>;

/// Payload keys for the fields reconciliation may patch.
pub const KEY_PRICE: &str = "Price";
pub const KEY_VOLUME: &str = "4W Volume";
pub const KEY_TOTAL_VALUE: &str = "Total Value";
pub const KEY_CODE: &str = "Code";

/// One upcoming dividend for one security, as collected on `collected_at`.
///
/// Serialized field names are the column headers used by every sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DividendAnnouncement {
    #[serde(rename = "Crawl Date")]
    pub collected_at: NaiveDate,
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Ex Date")]
    pub ex_date: DateField,
    #[serde(rename = "Amount")]
    pub amount: f64,
    #[serde(rename = "Franking")]
    pub franking: Option<f64>,
    #[serde(rename = "Pay Date")]
    pub pay_date: DateField,
    #[serde(rename = "Yield")]
    pub yield_: Option<f64>,
    #[serde(rename = "Price")]
    pub price: Option<f64>,
    #[serde(rename = "4W Volume")]
    pub volume_4w: Option<f64>,
    #[serde(rename = "Total Value")]
    pub total_value: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

impl DividendAnnouncement {
    /// Sets `total_value` from the current price/volume pair.
    pub fn recompute_total(&mut self) {
        self.total_value = total_value(self.price, self.volume_4w);
    }

    /// Every field, with unknown values as JSON nulls.
    pub fn to_full_payload(&self) -> Result<Payload, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "announcement serialized to {} instead of an object",
                other
            ))),
        }
    }

    /// Only the fields that carry a value.
    pub fn to_payload(&self) -> Result<Payload, serde_json::Error> {
        let mut map = self.to_full_payload()?;
        map.retain(|_, v| !v.is_null());
        Ok(map)
    }
}

/// `price * volume` when both are known. Zero is a known value.
pub fn total_value(price: Option<f64>, volume_4w: Option<f64>) -> Option<f64> {
    match (price, volume_4w) {
        (Some(price), Some(volume)) => Some(price * volume),
        _ => None,
    }
}

/// Builds an announcement from a listing row and its detail quote.
///
/// Dates without a year take the year of `collected_at`.
pub fn assemble(
    row: &ListingRow,
    quote: DetailQuote,
    collected_at: NaiveDate,
    last_updated: DateTime<Utc>,
) -> Result<DividendAnnouncement, PipelineError> {
    let amount = parse_number(&row.amount)
        .filter(|a| *a != 0.0)
        .ok_or_else(|| PipelineError::RowExtraction {
            index: row.index,
            code: row.code.clone(),
            message: format!("amount `{}` is not a positive number", row.amount),
        })?;

    let year = collected_at.year();
    Ok(DividendAnnouncement {
        collected_at,
        code: row.code.clone(),
        company: row.company.clone(),
        ex_date: parse_flexible_date_in_year(&row.ex_date, year),
        amount,
        franking: parse_percent(&row.franking),
        pay_date: parse_flexible_date_in_year(&row.pay_date, year),
        yield_: parse_percent(&row.yield_),
        price: quote.price,
        volume_4w: quote.volume_4w,
        total_value: total_value(quote.price, quote.volume_4w),
        last_updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn listing_row() -> ListingRow {
        ListingRow {
            index: 0,
            code: "BHP".into(),
            company: "BHP Group".into(),
            ex_date: "6 Mar".into(),
            amount: "$0.85".into(),
            franking: "100%".into(),
            pay_date: "27 Mar 2025".into(),
            yield_: "5.20%".into(),
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-02-20T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn assemble_normalizes_every_field() {
        let quote = DetailQuote {
            price: Some(45.0),
            volume_4w: Some(1000.0),
        };
        let record = assemble(&listing_row(), quote, ymd(2025, 2, 20), now()).unwrap();

        assert_eq!(record.code, "BHP");
        assert_eq!(record.company, "BHP Group");
        assert_eq!(record.ex_date, DateField::Canonical(ymd(2025, 3, 6)));
        assert_eq!(record.pay_date, DateField::Canonical(ymd(2025, 3, 27)));
        assert_eq!(record.amount, 0.85);
        assert_eq!(record.franking, Some(1.0));
        assert!((record.yield_.unwrap() - 0.052).abs() < 1e-12);
        assert_eq!(record.total_value, Some(45_000.0));
        assert_eq!(record.collected_at, ymd(2025, 2, 20));
    }

    #[test]
    fn total_value_needs_both_fields() {
        assert_eq!(total_value(Some(2.0), None), None);
        assert_eq!(total_value(None, Some(2.0)), None);
        assert_eq!(total_value(None, None), None);
    }

    #[test]
    fn zero_volume_still_yields_total() {
        assert_eq!(total_value(Some(12.5), Some(0.0)), Some(0.0));
        assert_eq!(total_value(Some(0.0), Some(300.0)), Some(0.0));
    }

    #[test]
    fn assemble_rejects_zero_amount() {
        let mut row = listing_row();
        row.amount = "0".into();
        let err = assemble(&row, DetailQuote::default(), ymd(2025, 1, 1), now()).unwrap_err();
        assert_eq!(err.code(), Some("BHP"));
    }

    #[test]
    fn payload_omits_nulls_full_payload_keeps_them() {
        let record = assemble(&listing_row(), DetailQuote::default(), ymd(2025, 2, 20), now()).unwrap();

        let partial = record.to_payload().unwrap();
        assert!(!partial.contains_key(KEY_PRICE));
        assert!(!partial.contains_key(KEY_TOTAL_VALUE));
        assert_eq!(partial[KEY_CODE], "BHP");
        assert_eq!(partial["Ex Date"], "2025-03-06");
        assert_eq!(partial["Crawl Date"], "2025-02-20");

        let full = record.to_full_payload().unwrap();
        assert!(full[KEY_PRICE].is_null());
        assert!(full[KEY_VOLUME].is_null());
    }

    #[test]
    fn announcement_round_trips_through_payload() {
        let quote = DetailQuote {
            price: Some(1.5),
            volume_4w: Some(2.0),
        };
        let record = assemble(&listing_row(), quote, ymd(2025, 2, 20), now()).unwrap();
        let payload = record.to_full_payload().unwrap();
        let back: DividendAnnouncement = serde_json::from_value(Value::Object(payload)).unwrap();
        assert_eq!(back, record);
    }
}
