//! Lazily registered named columns for caller-supplied extra values.
//!
//! A key seen for the first time becomes a new column. Under
//! `ExtraKeyPolicy::Backfill` the new column is padded with `Value::Missing`
//! for every row already held, and any later row that omits the key gets
//! `Value::Missing` too, so every column always tracks the main row count.

use std::collections::BTreeMap;

use crate::config::ExtraKeyPolicy;
use crate::core::{ExtraMap, Ring, Value};
use crate::error::{ReplayError, Result};

#[derive(Debug, Clone)]
pub(crate) struct ExtraColumns {
    columns: BTreeMap<String, Ring<Value>>,
    capacity: usize,
    /// Key set is fixed once the first row lands (`Reject` policy only).
    registered: bool,
}

impl ExtraColumns {
    pub fn new(capacity: usize) -> Self {
        Self {
            columns: BTreeMap::new(),
            capacity,
            registered: false,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.columns.keys()
    }

    fn key_list(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    /// Validate rows about to be appended, in order, without mutating.
    pub fn check<'a, I>(&self, owner: &str, policy: ExtraKeyPolicy, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a ExtraMap>,
    {
        if policy == ExtraKeyPolicy::Backfill {
            return Ok(());
        }

        let mut expected = self.registered.then(|| self.key_list());
        for extra in rows {
            let actual: Vec<String> = extra.keys().cloned().collect();
            match &expected {
                Some(keys) if *keys != actual => {
                    return Err(ReplayError::ExtraKeyMismatch {
                        owner: owner.to_string(),
                        expected: keys.clone(),
                        actual,
                    });
                }
                Some(_) => {}
                None => expected = Some(actual),
            }
        }
        Ok(())
    }

    /// Append one row. `len_before` is the main row count before this row.
    pub fn push(&mut self, mut extra: ExtraMap, len_before: usize) {
        for (key, column) in self.columns.iter_mut() {
            column.push(extra.remove(key).unwrap_or(Value::Missing));
        }

        for (key, value) in extra {
            log::debug!("Registering extra column '{}' after {} rows", key, len_before);
            let mut column = Ring::new(self.capacity);
            for _ in 0..len_before {
                column.push(Value::Missing);
            }
            column.push(value);
            self.columns.insert(key, column);
        }
        self.registered = true;
    }

    /// Value of `key` at logical row `idx`; `Missing` for unknown keys.
    pub fn get(&self, key: &str, idx: usize) -> Value {
        self.columns
            .get(key)
            .and_then(|column| column.get(idx))
            .cloned()
            .unwrap_or(Value::Missing)
    }

    /// Whether every column holds exactly `len` rows.
    pub fn is_aligned(&self, len: usize) -> bool {
        self.columns.values().all(|column| column.len() == len)
    }

    pub fn clear(&mut self) {
        self.columns.clear();
        self.registered = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extra(pairs: &[(&str, f32)]) -> ExtraMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::Scalar(*v)))
            .collect()
    }

    #[test]
    fn test_new_key_is_backfilled() {
        let mut cols = ExtraColumns::new(10);
        cols.push(extra(&[]), 0);
        cols.push(extra(&[]), 1);
        cols.push(extra(&[("cost", 0.5)]), 2);

        assert!(cols.is_aligned(3));
        assert_eq!(cols.get("cost", 0), Value::Missing);
        assert_eq!(cols.get("cost", 1), Value::Missing);
        assert_eq!(cols.get("cost", 2), Value::Scalar(0.5));
    }

    #[test]
    fn test_absent_key_gets_sentinel() {
        let mut cols = ExtraColumns::new(10);
        cols.push(extra(&[("cost", 1.0)]), 0);
        cols.push(extra(&[]), 1);

        assert!(cols.is_aligned(2));
        assert_eq!(cols.get("cost", 1), Value::Missing);
        assert_eq!(cols.get("unknown", 0), Value::Missing);
    }

    #[test]
    fn test_columns_evict_with_capacity() {
        let mut cols = ExtraColumns::new(2);
        for i in 0..5 {
            cols.push(extra(&[("step", i as f32)]), i.min(2));
        }
        assert!(cols.is_aligned(2));
        assert_eq!(cols.get("step", 0), Value::Scalar(3.0));
        assert_eq!(cols.get("step", 1), Value::Scalar(4.0));
    }

    #[test]
    fn test_reject_policy() {
        let mut cols = ExtraColumns::new(10);
        let first = extra(&[("cost", 1.0)]);
        let other = extra(&[("speed", 1.0)]);

        // First rows register; they must agree among themselves.
        assert!(cols
            .check("scenario 0", ExtraKeyPolicy::Reject, [&first, &other])
            .is_err());
        assert!(cols
            .check("scenario 0", ExtraKeyPolicy::Reject, [&first, &first])
            .is_ok());

        cols.push(first.clone(), 0);
        assert!(cols.check("scenario 0", ExtraKeyPolicy::Reject, [&first]).is_ok());
        assert!(matches!(
            cols.check("scenario 0", ExtraKeyPolicy::Reject, [&other]),
            Err(ReplayError::ExtraKeyMismatch { .. })
        ));
        assert!(cols.check("scenario 0", ExtraKeyPolicy::Backfill, [&other]).is_ok());
    }
}
