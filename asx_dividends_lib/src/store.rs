//! In-process document store.

use chrono::NaiveDate;
use dashmap::DashMap;

use crate::error::SinkError;
use crate::record::{Payload, KEY_CODE};
use crate::sink::CurrentStateSink;

/// Current-state and history maps held in memory. Lives only as long as
/// the value; `SinkSet::with_document` accepts it where nothing should persist.
#[derive(Debug, Default)]
pub struct MemoryStore {
    current: DashMap<String, Payload>,
    history: DashMap<(NaiveDate, String), Payload>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}

impl CurrentStateSink for MemoryStore {
    fn get(&self, code: &str) -> Result<Option<Payload>, SinkError> {
        Ok(self.current.get(code).map(|entry| entry.value().clone()))
    }

    fn set(&self, code: &str, record: &Payload) -> Result<(), SinkError> {
        self.current.insert(code.to_string(), record.clone());
        Ok(())
    }

    fn update(&self, code: &str, fields: &Payload) -> Result<(), SinkError> {
        let mut entry = self
            .current
            .get_mut(code)
            .ok_or_else(|| SinkError::MissingRecord(code.to_string()))?;
        for (key, value) in fields {
            entry.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn append_history(
        &self,
        code: &str,
        date: NaiveDate,
        payload: &Payload,
    ) -> Result<(), SinkError> {
        self.history
            .insert((date, code.to_string()), payload.clone());
        Ok(())
    }

    fn history_for_date(&self, date: NaiveDate) -> Result<Vec<Payload>, SinkError> {
        let mut rows: Vec<(String, Payload)> = self
            .history
            .iter()
            .filter(|entry| entry.key().0 == date)
            .map(|entry| (entry.key().1.clone(), entry.value().clone()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows
            .into_iter()
            .map(|(code, mut payload)| {
                payload
                    .entry(KEY_CODE)
                    .or_insert_with(|| serde_json::Value::String(code));
                payload
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    #[test]
    fn update_requires_existing_record() {
        let store = MemoryStore::new();
        let err = store.update("XYZ", &payload(json!({"Price": 1.0}))).unwrap_err();
        assert!(matches!(err, SinkError::MissingRecord(code) if code == "XYZ"));
    }

    #[test]
    fn update_merges_fields() {
        let store = MemoryStore::new();
        store
            .set("ABC", &payload(json!({"Price": 1.0, "Company": "ABC Ltd"})))
            .unwrap();
        store.update("ABC", &payload(json!({"Price": 2.0}))).unwrap();

        let current = store.get("ABC").unwrap().unwrap();
        assert_eq!(current["Price"], 2.0);
        assert_eq!(current["Company"], "ABC Ltd");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn history_is_per_day_and_sorted() {
        let store = MemoryStore::new();
        store.append_history("ZZZ", day(1), &payload(json!({"Price": 1.0}))).unwrap();
        store.append_history("AAA", day(1), &payload(json!({"Price": 2.0}))).unwrap();
        store.append_history("AAA", day(2), &payload(json!({"Price": 3.0}))).unwrap();
        store.append_history("AAA", day(1), &payload(json!({"Price": 4.0}))).unwrap();

        let rows = store.history_for_date(day(1)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Code"], "AAA");
        assert_eq!(rows[0]["Price"], 4.0);
        assert_eq!(rows[1]["Code"], "ZZZ");
    }
}
