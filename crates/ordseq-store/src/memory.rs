//! In-memory record store for testing and embedding.
//!
//! [`InMemoryRecordStore`] keeps records, properties and options in maps
//! behind a single `RwLock`. The computed insert runs entirely under the
//! write lock, which makes it atomic with respect to every other writer.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use ordseq_types::number::numeric_value;
use ordseq_types::{NewRecord, OrderRecord, OrderStatus, RecordKey};

use crate::error::{StoreError, StoreResult};
use crate::traits::{RecordStore, StatusFilter};

/// An in-memory implementation of [`RecordStore`].
///
/// Data is lost when the store is dropped. Conflicts can be injected into
/// [`RecordStore::insert_next_sequence`] to exercise retry handling.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    inner: RwLock<StoreState>,
    injected_conflicts: AtomicU32,
    sequence_attempts: AtomicU64,
}

#[derive(Debug, Default)]
struct StoreState {
    records: BTreeMap<RecordKey, OrderRecord>,
    properties: HashMap<RecordKey, BTreeMap<String, String>>,
    options: HashMap<String, String>,
    last_key: u64,
}

impl StoreState {
    fn require(&self, key: RecordKey) -> StoreResult<()> {
        if self.records.contains_key(&key) {
            Ok(())
        } else {
            Err(StoreError::RecordNotFound(key))
        }
    }

    fn has_value(&self, key: RecordKey, name: &str) -> bool {
        self.properties
            .get(&key)
            .and_then(|props| props.get(name))
            .is_some_and(|value| !value.trim().is_empty())
    }

    fn max_numeric(&self, name: &str) -> Option<u64> {
        self.properties
            .values()
            .filter_map(|props| props.get(name))
            .map(|value| numeric_value(value))
            .max()
    }
}

impl InMemoryRecordStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `insert_next_sequence` fail with
    /// [`StoreError::Conflict`] without writing anything.
    pub fn inject_sequence_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Total number of `insert_next_sequence` calls, including failed ones.
    pub fn sequence_attempts(&self) -> u64 {
        self.sequence_attempts.load(Ordering::SeqCst)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, StoreState>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, StoreState>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn insert_record(&self, record: NewRecord) -> StoreResult<OrderRecord> {
        let mut state = self.write()?;
        let key = match record.key {
            Some(key) => {
                if state.records.contains_key(&key) {
                    return Err(StoreError::DuplicateKey(key));
                }
                key
            }
            None => state
                .last_key
                .checked_add(1)
                .map(RecordKey::new)
                .ok_or_else(|| StoreError::Backend("record keys exhausted".into()))?,
        };
        state.last_key = state.last_key.max(key.get());

        let stored = OrderRecord {
            key,
            status: record.status,
            created_at: record.created_at,
        };
        state.records.insert(key, stored.clone());
        Ok(stored)
    }

    fn record(&self, key: RecordKey) -> StoreResult<Option<OrderRecord>> {
        Ok(self.read()?.records.get(&key).cloned())
    }

    fn records(&self, filter: &StatusFilter) -> StoreResult<Vec<OrderRecord>> {
        Ok(self
            .read()?
            .records
            .values()
            .filter(|record| filter.matches(record.status))
            .cloned()
            .collect())
    }

    fn update_status(&self, key: RecordKey, status: OrderStatus) -> StoreResult<OrderRecord> {
        let mut state = self.write()?;
        let record = state
            .records
            .get_mut(&key)
            .ok_or(StoreError::RecordNotFound(key))?;
        record.status = status;
        Ok(record.clone())
    }

    fn delete_record(&self, key: RecordKey) -> StoreResult<bool> {
        let mut state = self.write()?;
        state.properties.remove(&key);
        Ok(state.records.remove(&key).is_some())
    }

    fn property(&self, key: RecordKey, name: &str) -> StoreResult<Option<String>> {
        Ok(self
            .read()?
            .properties
            .get(&key)
            .and_then(|props| props.get(name))
            .cloned())
    }

    fn properties(&self, key: RecordKey) -> StoreResult<BTreeMap<String, String>> {
        Ok(self
            .read()?
            .properties
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    fn set_property(&self, key: RecordKey, name: &str, value: &str) -> StoreResult<()> {
        let mut state = self.write()?;
        state.require(key)?;
        state
            .properties
            .entry(key)
            .or_default()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn add_property_if_absent(
        &self,
        key: RecordKey,
        name: &str,
        value: &str,
    ) -> StoreResult<bool> {
        let mut state = self.write()?;
        state.require(key)?;
        if state.has_value(key, name) {
            return Ok(false);
        }
        state
            .properties
            .entry(key)
            .or_default()
            .insert(name.to_string(), value.to_string());
        Ok(true)
    }

    fn insert_next_sequence(&self, key: RecordKey, name: &str) -> StoreResult<Option<u64>> {
        self.sequence_attempts.fetch_add(1, Ordering::SeqCst);
        if self.take_injected_conflict() {
            return Err(StoreError::Conflict("injected conflict".into()));
        }

        let mut state = self.write()?;
        state.require(key)?;
        if state.has_value(key, name) {
            return Ok(None);
        }
        let next = match state.max_numeric(name) {
            None => 1,
            Some(max) => max
                .checked_add(1)
                .ok_or_else(|| StoreError::Backend(format!("sequence {name} exhausted")))?,
        };
        state
            .properties
            .entry(key)
            .or_default()
            .insert(name.to_string(), next.to_string());
        Ok(Some(next))
    }

    fn find_by_property(
        &self,
        name: &str,
        value: &str,
        filter: &StatusFilter,
    ) -> StoreResult<Vec<RecordKey>> {
        let state = self.read()?;
        let mut keys: Vec<RecordKey> = state
            .properties
            .iter()
            .filter(|(_, props)| props.get(name).is_some_and(|v| v == value))
            .filter_map(|(key, _)| state.records.get(key))
            .filter(|record| filter.matches(record.status))
            .map(|record| record.key)
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn option(&self, name: &str) -> StoreResult<Option<String>> {
        Ok(self.read()?.options.get(name).cloned())
    }

    fn set_option(&self, name: &str, value: &str) -> StoreResult<()> {
        self.write()?
            .options
            .insert(name.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NUMBER: &str = "_order_number";

    fn store_with(statuses: &[OrderStatus]) -> (InMemoryRecordStore, Vec<RecordKey>) {
        let store = InMemoryRecordStore::new();
        let keys = statuses
            .iter()
            .map(|status| store.insert_record(NewRecord::new(*status)).unwrap().key)
            .collect();
        (store, keys)
    }

    // ---- Test 1: Keys are assigned sequentially ----
    #[test]
    fn keys_are_assigned_sequentially() {
        let (_, keys) = store_with(&[OrderStatus::Pending, OrderStatus::Pending]);
        assert_eq!(keys, vec![RecordKey::new(1), RecordKey::new(2)]);
    }

    // ---- Test 2: Explicit keys advance the key counter ----
    #[test]
    fn explicit_keys_advance_counter() {
        let store = InMemoryRecordStore::new();
        store
            .insert_record(NewRecord::new(OrderStatus::Completed).with_key(RecordKey::new(20)))
            .unwrap();
        let next = store.insert_record(NewRecord::new(OrderStatus::Pending)).unwrap();
        assert_eq!(next.key, RecordKey::new(21));
    }

    // ---- Test 3: Duplicate explicit key is rejected ----
    #[test]
    fn duplicate_key_rejected() {
        let store = InMemoryRecordStore::new();
        let new = NewRecord::new(OrderStatus::Pending).with_key(RecordKey::new(5));
        store.insert_record(new.clone()).unwrap();
        let err = store.insert_record(new).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(k) if k == RecordKey::new(5)));
    }

    // ---- Test 4: Computed insert starts at one ----
    #[test]
    fn computed_insert_starts_at_one() {
        let (store, keys) = store_with(&[OrderStatus::Pending]);
        assert_eq!(store.insert_next_sequence(keys[0], NUMBER).unwrap(), Some(1));
        assert_eq!(store.property(keys[0], NUMBER).unwrap().as_deref(), Some("1"));
    }

    // ---- Test 5: Computed insert follows the numeric maximum ----
    #[test]
    fn computed_insert_uses_numeric_max() {
        let (store, keys) = store_with(&[OrderStatus::Pending; 3]);
        store.set_property(keys[0], NUMBER, "9").unwrap();
        store.set_property(keys[1], NUMBER, "10").unwrap();
        // Text ordering would pick "9".
        assert_eq!(store.insert_next_sequence(keys[2], NUMBER).unwrap(), Some(11));
    }

    // ---- Test 6: Negative and non-numeric values count as zero ----
    #[test]
    fn computed_insert_ignores_negative_and_text_values() {
        let (store, keys) = store_with(&[OrderStatus::Pending; 4]);
        store.set_property(keys[0], NUMBER, "-5").unwrap();
        store.set_property(keys[1], NUMBER, "abc").unwrap();
        assert_eq!(store.insert_next_sequence(keys[2], NUMBER).unwrap(), Some(1));

        store.set_property(keys[0], NUMBER, "7 (legacy)").unwrap();
        assert_eq!(store.insert_next_sequence(keys[3], NUMBER).unwrap(), Some(8));
    }

    // ---- Test 7: Exhausted sequence fails without writing ----
    #[test]
    fn computed_insert_overflow_fails() {
        let (store, keys) = store_with(&[OrderStatus::Pending; 2]);
        store.set_property(keys[0], NUMBER, &u64::MAX.to_string()).unwrap();

        let err = store.insert_next_sequence(keys[1], NUMBER).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(store.property(keys[1], NUMBER).unwrap().is_none());
    }

    // ---- Test 8: Key counter exhaustion is an error ----
    #[test]
    fn key_counter_overflow_fails() {
        let store = InMemoryRecordStore::new();
        let last = NewRecord::new(OrderStatus::Completed).with_key(RecordKey::new(u64::MAX));
        store.insert_record(last).unwrap();
        let err = store.insert_record(NewRecord::new(OrderStatus::Pending)).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    // ---- Test 9: Computed insert never overwrites ----
    #[test]
    fn computed_insert_is_conditional() {
        let (store, keys) = store_with(&[OrderStatus::Pending]);
        store.set_property(keys[0], NUMBER, "7").unwrap();
        assert_eq!(store.insert_next_sequence(keys[0], NUMBER).unwrap(), None);
        assert_eq!(store.property(keys[0], NUMBER).unwrap().as_deref(), Some("7"));
    }

    // ---- Test 10: Empty values are replaced ----
    #[test]
    fn empty_value_counts_as_absent() {
        let (store, keys) = store_with(&[OrderStatus::Pending]);
        store.set_property(keys[0], NUMBER, "").unwrap();
        assert_eq!(store.insert_next_sequence(keys[0], NUMBER).unwrap(), Some(1));
    }

    // ---- Test 11: Injected conflicts fail without writing ----
    #[test]
    fn injected_conflicts() {
        let (store, keys) = store_with(&[OrderStatus::Pending]);
        store.inject_sequence_conflicts(2);
        assert!(store.insert_next_sequence(keys[0], NUMBER).unwrap_err().is_transient());
        assert!(store.insert_next_sequence(keys[0], NUMBER).unwrap_err().is_transient());
        assert!(store.property(keys[0], NUMBER).unwrap().is_none());
        assert_eq!(store.insert_next_sequence(keys[0], NUMBER).unwrap(), Some(1));
        assert_eq!(store.sequence_attempts(), 3);
    }

    // ---- Test 12: Add-if-absent keeps existing values ----
    #[test]
    fn add_if_absent() {
        let (store, keys) = store_with(&[OrderStatus::Pending]);
        assert!(store.add_property_if_absent(keys[0], NUMBER, "1").unwrap());
        assert!(!store.add_property_if_absent(keys[0], NUMBER, "2").unwrap());
        assert_eq!(store.property(keys[0], NUMBER).unwrap().as_deref(), Some("1"));
    }

    // ---- Test 13: Property writes require the record ----
    #[test]
    fn property_write_requires_record() {
        let store = InMemoryRecordStore::new();
        let err = store.set_property(RecordKey::new(3), NUMBER, "1").unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound(_)));
        let err = store.insert_next_sequence(RecordKey::new(3), NUMBER).unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound(_)));
    }

    // ---- Test 14: Find by property respects the status filter ----
    #[test]
    fn find_by_property_filters_status() {
        let (store, keys) = store_with(&[OrderStatus::Completed, OrderStatus::Trash]);
        store.set_property(keys[0], NUMBER, "5").unwrap();
        store.set_property(keys[1], NUMBER, "5").unwrap();

        let any = store.find_by_property(NUMBER, "5", &StatusFilter::Any).unwrap();
        assert_eq!(any, keys);
        let published = store
            .find_by_property(NUMBER, "5", &StatusFilter::published())
            .unwrap();
        assert_eq!(published, vec![keys[0]]);
    }

    // ---- Test 15: Delete cascades to properties ----
    #[test]
    fn delete_cascades() {
        let (store, keys) = store_with(&[OrderStatus::Pending]);
        store.set_property(keys[0], NUMBER, "1").unwrap();
        assert!(store.delete_record(keys[0]).unwrap());
        assert!(store.properties(keys[0]).unwrap().is_empty());
        assert!(!store.delete_record(keys[0]).unwrap());
    }

    // ---- Test 16: Status updates ----
    #[test]
    fn update_status() {
        let (store, keys) = store_with(&[OrderStatus::Draft]);
        let updated = store.update_status(keys[0], OrderStatus::Processing).unwrap();
        assert_eq!(updated.status, OrderStatus::Processing);
        let drafts = store
            .records(&StatusFilter::In(vec![OrderStatus::Draft]))
            .unwrap();
        assert!(drafts.is_empty());
    }

    // ---- Test 17: Options ----
    #[test]
    fn options_roundtrip() {
        let store = InMemoryRecordStore::new();
        assert!(store.option("version").unwrap().is_none());
        store.set_option("version", "1.0.0").unwrap();
        store.set_option("version", "1.1.0").unwrap();
        assert_eq!(store.option("version").unwrap().as_deref(), Some("1.1.0"));
    }
}
