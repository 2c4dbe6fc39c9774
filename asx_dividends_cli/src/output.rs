use anyhow::Result;
use asx_dividends_lib::DividendAnnouncement;
use serde::Serialize;
use tabled::{Table, Tabled};

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Tabled, Serialize)]
struct AnnouncementRow {
    #[tabled(rename = "Code")]
    #[serde(rename = "Code")]
    code: String,
    #[tabled(rename = "Company")]
    #[serde(rename = "Company")]
    company: String,
    #[tabled(rename = "Ex Date")]
    #[serde(rename = "Ex Date")]
    ex_date: String,
    #[tabled(rename = "Pay Date")]
    #[serde(rename = "Pay Date")]
    pay_date: String,
    #[tabled(rename = "Amount")]
    #[serde(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Franking")]
    #[serde(rename = "Franking")]
    franking: String,
    #[tabled(rename = "Yield")]
    #[serde(rename = "Yield")]
    yield_: String,
    #[tabled(rename = "Price")]
    #[serde(rename = "Price")]
    price: String,
    #[tabled(rename = "4W Volume")]
    #[serde(rename = "4W Volume")]
    volume_4w: String,
    #[tabled(rename = "Total Value")]
    #[serde(rename = "Total Value")]
    total_value: String,
}

fn build_announcement_rows(announcements: &[DividendAnnouncement]) -> Vec<AnnouncementRow> {
    announcements
        .iter()
        .map(|a| AnnouncementRow {
            code: a.code.clone(),
            company: a.company.clone(),
            ex_date: a.ex_date.to_string(),
            pay_date: a.pay_date.to_string(),
            amount: format!("${:.4}", a.amount)
                .trim_end_matches('0')
                .trim_end_matches('.')
                .to_string(),
            franking: format_percent(a.franking),
            yield_: format_percent(a.yield_),
            price: a.price.map(|p| format!("${:.2}", p)).unwrap_or_default(),
            volume_4w: a.volume_4w.map(format_count).unwrap_or_default(),
            total_value: a.total_value.map(format_value).unwrap_or_default(),
        })
        .collect()
}

pub fn print_announcements_table(announcements: &[DividendAnnouncement]) {
    println!("{}", Table::new(build_announcement_rows(announcements)));
}

pub fn print_announcements_csv(announcements: &[DividendAnnouncement]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(std::io::stdout());
    for row in build_announcement_rows(announcements) {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn print_json<T: Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
    }
}

fn format_percent(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}%", v * 100.0))
        .unwrap_or_default()
}

fn format_count(value: f64) -> String {
    let whole = value.round() as i64;
    let digits = whole.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if whole < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

fn format_value(value: f64) -> String {
    if value >= 1_000_000_000.0 {
        format!("${:.1}B", value / 1_000_000_000.0)
    } else if value >= 1_000_000.0 {
        format!("${:.1}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("${:.1}K", value / 1_000.0)
    } else {
        format!("${:.0}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asx_dividends_lib::DateField;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn sample() -> Vec<DividendAnnouncement> {
        let day = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        vec![
            DividendAnnouncement {
                collected_at: day,
                code: "BHP".into(),
                company: "BHP Group Ltd".into(),
                ex_date: DateField::Canonical(NaiveDate::from_ymd_opt(2025, 3, 6).unwrap()),
                amount: 0.85,
                franking: Some(1.0),
                pay_date: DateField::Raw("TBA".into()),
                yield_: Some(0.052),
                price: Some(45.12),
                volume_4w: Some(8_123_456.0),
                total_value: Some(45.12 * 8_123_456.0),
                last_updated: Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap(),
            },
            DividendAnnouncement {
                collected_at: day,
                code: "SLO".into(),
                company: String::new(),
                ex_date: DateField::Unknown,
                amount: 0.1,
                franking: None,
                pay_date: DateField::Unknown,
                yield_: None,
                price: None,
                volume_4w: None,
                total_value: None,
                last_updated: Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap(),
            },
        ]
    }

    #[test]
    fn test_format_value_ranges() {
        assert_eq!(format_value(366_520_000.0), "$366.5M");
        assert_eq!(format_value(2_500_000_000.0), "$2.5B");
        assert_eq!(format_value(52_500.0), "$52.5K");
        assert_eq!(format_value(0.0), "$0");
    }

    #[test]
    fn test_format_count_groups_thousands() {
        assert_eq!(format_count(8_123_456.0), "8,123,456");
        assert_eq!(format_count(999.0), "999");
        assert_eq!(format_count(1000.4), "1,000");
        assert_eq!(format_count(0.0), "0");
    }

    #[test]
    fn test_build_rows_formats_fields() {
        let rows = build_announcement_rows(&sample());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].amount, "$0.85");
        assert_eq!(rows[0].franking, "100.00%");
        assert_eq!(rows[0].yield_, "5.20%");
        assert_eq!(rows[0].price, "$45.12");
        assert_eq!(rows[0].volume_4w, "8,123,456");
        assert_eq!(rows[0].ex_date, "2025-03-06");
        assert_eq!(rows[0].pay_date, "TBA");
    }

    #[test]
    fn test_missing_values_are_blank() {
        let rows = build_announcement_rows(&sample());
        assert_eq!(rows[1].ex_date, "N/A");
        assert_eq!(rows[1].price, "");
        assert_eq!(rows[1].total_value, "");
        assert_eq!(rows[1].amount, "$0.1");
    }

    #[test]
    fn test_table_has_renamed_headers() {
        let table = Table::new(build_announcement_rows(&sample())).to_string();
        assert!(table.contains("4W Volume"));
        assert!(table.contains("Total Value"));
        assert!(table.contains("BHP Group Ltd"));
    }

    #[test]
    fn test_csv_serialization_headers() {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        for row in build_announcement_rows(&sample()) {
            wtr.serialize(row).unwrap();
        }
        let text = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
        let first = text.lines().next().unwrap();
        assert_eq!(
            first,
            "Code,Company,Ex Date,Pay Date,Amount,Franking,Yield,Price,4W Volume,Total Value"
        );
    }
}
