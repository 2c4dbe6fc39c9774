//! Reconciliation of a fresh record against the last stored version.
//!
//! Price and volume come from a page that fails now and then. When today's
//! scrape missed one of them, the stored value is carried forward instead
//! of overwriting good data with a null.

use serde_json::Value;

use crate::error::{PipelineError, SinkError};
use crate::record::{DividendAnnouncement, Payload, KEY_PRICE, KEY_TOTAL_VALUE, KEY_VOLUME};
use crate::sink::CurrentStateSink;

/// The stored current version of a record, read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorState {
    fields: Payload,
}

impl PriorState {
    pub fn new(fields: Payload) -> Self {
        Self { fields }
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    pub fn price(&self) -> Option<f64> {
        self.number(KEY_PRICE)
    }

    pub fn volume_4w(&self) -> Option<f64> {
        self.number(KEY_VOLUME)
    }

    pub fn total_value(&self) -> Option<f64> {
        self.number(KEY_TOTAL_VALUE)
    }
}

impl From<Payload> for PriorState {
    fn from(fields: Payload) -> Self {
        Self::new(fields)
    }
}

/// How the current-state record gets written.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteMode {
    /// First sighting of the code: full record, unknown fields as nulls.
    Set(Payload),
    /// Known code: merge only the fields that carry a value.
    Update(Payload),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// The record after patching.
    pub record: DividendAnnouncement,
    pub write: WriteMode,
    /// History entry for the collection date.
    pub snapshot: Payload,
    /// Payload keys filled from the prior record.
    pub patched: Vec<&'static str>,
}

/// Patches missing volatile fields from `prior` and decides the write.
///
/// `total_value` is always recomputed from the patched price/volume pair;
/// a stored total is never copied on its own.
pub fn reconcile(
    mut record: DividendAnnouncement,
    prior: Option<&PriorState>,
) -> Result<Reconciliation, serde_json::Error> {
    let mut patched = Vec::new();

    if let Some(prior) = prior {
        if record.price.is_none() {
            if let Some(price) = prior.price() {
                record.price = Some(price);
                patched.push(KEY_PRICE);
            }
        }
        if record.volume_4w.is_none() {
            if let Some(volume) = prior.volume_4w() {
                record.volume_4w = Some(volume);
                patched.push(KEY_VOLUME);
            }
        }
        let had_total = record.total_value.is_some();
        record.recompute_total();
        if !had_total && record.total_value.is_some() {
            patched.push(KEY_TOTAL_VALUE);
        }
    }

    let snapshot = record.to_payload()?;
    let write = match prior {
        Some(_) => WriteMode::Update(snapshot.clone()),
        None => WriteMode::Set(record.to_full_payload()?),
    };

    Ok(Reconciliation {
        record,
        write,
        snapshot,
        patched,
    })
}

/// Outcome of reconciling a batch against a sink.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Records as written, in input order.
    pub records: Vec<DividendAnnouncement>,
    pub failures: Vec<PipelineError>,
}

/// Runs read-patch-write for each record against a current-state sink.
pub struct Reconciler<'a, S: ?Sized> {
    sink: &'a S,
}

impl<'a, S: CurrentStateSink + ?Sized> Reconciler<'a, S> {
    pub fn new(sink: &'a S) -> Self {
        Self { sink }
    }

    /// Reconciles and stores one record, returning it as written.
    pub fn store(&self, record: DividendAnnouncement) -> Result<DividendAnnouncement, PipelineError> {
        let code = record.code.clone();
        let wrap = |source: SinkError| PipelineError::SinkWrite {
            code: code.clone(),
            source,
        };

        let prior = self.sink.get(&code).map_err(wrap)?.map(PriorState::from);
        let result = reconcile(record, prior.as_ref()).map_err(|e| wrap(e.into()))?;

        match &result.write {
            WriteMode::Set(fields) => self.sink.set(&code, fields),
            WriteMode::Update(fields) => self.sink.update(&code, fields),
        }
        .map_err(wrap)?;
        self.sink
            .append_history(&code, result.record.collected_at, &result.snapshot)
            .map_err(wrap)?;

        if !result.patched.is_empty() {
            tracing::info!(code = %code, patched = ?result.patched, "filled missing fields from stored record");
        }
        Ok(result.record)
    }

    /// Stores every record; a failure for one code does not stop the rest.
    pub fn store_all(&self, records: Vec<DividendAnnouncement>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for record in records {
            match self.store(record) {
                Ok(stored) => report.records.push(stored),
                Err(err) => {
                    tracing::error!(code = err.code().unwrap_or_default(), "{}", err);
                    report.failures.push(err);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::DateField;
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn announcement(code: &str, price: Option<f64>, volume: Option<f64>) -> DividendAnnouncement {
        let mut record = DividendAnnouncement {
            collected_at: day(3),
            code: code.to_string(),
            company: format!("{} Ltd", code),
            ex_date: DateField::Canonical(day(10)),
            amount: 0.25,
            franking: Some(1.0),
            pay_date: DateField::Unknown,
            yield_: Some(0.04),
            price,
            volume_4w: volume,
            total_value: None,
            last_updated: Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap(),
        };
        record.recompute_total();
        record
    }

    fn prior(value: Value) -> PriorState {
        match value {
            Value::Object(map) => PriorState::new(map),
            _ => panic!("prior must be an object"),
        }
    }

    #[test]
    fn patches_missing_fields_and_recomputes_total() {
        let prior = prior(json!({"Price": 10.5, "4W Volume": null}));
        let new = announcement("CBA", None, Some(5000.0));

        let result = reconcile(new, Some(&prior)).unwrap();

        assert_eq!(result.record.price, Some(10.5));
        assert_eq!(result.record.volume_4w, Some(5000.0));
        assert_eq!(result.record.total_value, Some(52500.0));
        assert_eq!(result.patched, vec![KEY_PRICE, KEY_TOTAL_VALUE]);
        match result.write {
            WriteMode::Update(fields) => {
                assert_eq!(fields[KEY_PRICE], 10.5);
                assert_eq!(fields[KEY_TOTAL_VALUE], 52500.0);
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn new_code_uses_full_set_with_null_total() {
        let new = announcement("WES", None, None);

        let result = reconcile(new, None).unwrap();

        assert!(result.patched.is_empty());
        assert_eq!(result.record.total_value, None);
        match &result.write {
            WriteMode::Set(fields) => {
                assert!(fields[KEY_TOTAL_VALUE].is_null());
                assert!(fields[KEY_PRICE].is_null());
            }
            other => panic!("expected set, got {:?}", other),
        }
        assert!(!result.snapshot.contains_key(KEY_TOTAL_VALUE));
    }

    #[test]
    fn fresh_values_are_never_overwritten() {
        let prior = prior(json!({"Price": 1.0, "4W Volume": 1.0, "Total Value": 1.0}));
        let new = announcement("NAB", Some(30.0), Some(100.0));

        let result = reconcile(new, Some(&prior)).unwrap();

        assert!(result.patched.is_empty());
        assert_eq!(result.record.total_value, Some(3000.0));
    }

    #[test]
    fn stored_total_alone_is_not_copied() {
        let prior = prior(json!({"Price": null, "4W Volume": null, "Total Value": 777.0}));
        let new = announcement("ANZ", None, None);

        let result = reconcile(new, Some(&prior)).unwrap();

        assert_eq!(result.record.total_value, None);
        match result.write {
            WriteMode::Update(fields) => assert!(!fields.contains_key(KEY_TOTAL_VALUE)),
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn zero_prior_volume_is_a_value() {
        let prior = prior(json!({"Price": 2.0, "4W Volume": 0.0}));
        let new = announcement("TLS", Some(4.0), None);

        let result = reconcile(new, Some(&prior)).unwrap();

        assert_eq!(result.record.volume_4w, Some(0.0));
        assert_eq!(result.record.total_value, Some(0.0));
    }

    #[test]
    fn store_writes_current_and_history() {
        let store = MemoryStore::new();
        let reconciler = Reconciler::new(&store);

        reconciler.store(announcement("BHP", Some(45.0), Some(10.0))).unwrap();

        let mut second = announcement("BHP", None, None);
        second.collected_at = day(4);
        let stored = reconciler.store(second).unwrap();

        assert_eq!(stored.price, Some(45.0));
        assert_eq!(stored.total_value, Some(450.0));
        let current = store.get("BHP").unwrap().unwrap();
        assert_eq!(current["Crawl Date"], "2025-03-04");
        assert_eq!(store.history_for_date(day(3)).unwrap().len(), 1);
        let snapshot = &store.history_for_date(day(4)).unwrap()[0];
        assert_eq!(snapshot[KEY_PRICE], 45.0);
    }

    #[test]
    fn update_keeps_unrelated_stored_fields() {
        let store = MemoryStore::new();
        let mut existing = Payload::new();
        existing.insert("Notes".into(), json!("watchlist"));
        existing.insert(KEY_PRICE.into(), json!(9.0));
        store.set("RIO", &existing).unwrap();

        Reconciler::new(&store)
            .store(announcement("RIO", None, Some(3.0)))
            .unwrap();

        let current = store.get("RIO").unwrap().unwrap();
        assert_eq!(current["Notes"], "watchlist");
        assert_eq!(current[KEY_TOTAL_VALUE], 27.0);
    }

    /// Rejects writes for one code, delegates everything else.
    struct RejectingSink {
        inner: MemoryStore,
        reject: &'static str,
    }

    impl RejectingSink {
        fn check(&self, code: &str) -> Result<(), SinkError> {
            if code == self.reject {
                return Err(SinkError::Io(std::io::Error::other("write rejected")));
            }
            Ok(())
        }
    }

    impl CurrentStateSink for RejectingSink {
        fn get(&self, code: &str) -> Result<Option<Payload>, SinkError> {
            self.inner.get(code)
        }

        fn set(&self, code: &str, record: &Payload) -> Result<(), SinkError> {
            self.check(code)?;
            self.inner.set(code, record)
        }

        fn update(&self, code: &str, fields: &Payload) -> Result<(), SinkError> {
            self.check(code)?;
            self.inner.update(code, fields)
        }

        fn append_history(
            &self,
            code: &str,
            date: NaiveDate,
            payload: &Payload,
        ) -> Result<(), SinkError> {
            self.inner.append_history(code, date, payload)
        }

        fn history_for_date(&self, date: NaiveDate) -> Result<Vec<Payload>, SinkError> {
            self.inner.history_for_date(date)
        }
    }

    #[test]
    fn store_all_isolates_failures() {
        let store = RejectingSink {
            inner: MemoryStore::new(),
            reject: "BAD",
        };

        let report = Reconciler::new(&store).store_all(vec![
            announcement("BAD", Some(1.0), Some(1.0)),
            announcement("GOOD", Some(2.0), Some(2.0)),
        ]);

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].code, "GOOD");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].code(), Some("BAD"));
        assert!(store.get("GOOD").unwrap().is_some());
    }
}
