//! The [`RecordStore`] trait defining the record storage interface.
//!
//! Numbering logic only ever talks to the store through this trait. Any
//! backend (in-memory, SQLite, a host platform's database) implements it.

use std::collections::BTreeMap;

use ordseq_types::{NewRecord, OrderRecord, OrderStatus, RecordKey};

use crate::error::StoreResult;

/// Status restriction for record queries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusFilter {
    /// Every record regardless of status.
    Any,
    /// Only records whose status is in the list.
    In(Vec<OrderStatus>),
}

impl StatusFilter {
    /// Records visible to customers (see [`OrderStatus::PUBLISHED`]).
    pub fn published() -> Self {
        Self::In(OrderStatus::PUBLISHED.to_vec())
    }

    pub fn matches(&self, status: OrderStatus) -> bool {
        match self {
            Self::Any => true,
            Self::In(statuses) => statuses.contains(&status),
        }
    }
}

/// Storage backend for order records, their properties, and named options.
///
/// All implementations must satisfy these invariants:
/// - A record has at most one value per property name.
/// - `insert_next_sequence` computes and writes in one atomic step.
/// - Conditional writes never replace a non-empty value.
/// - Contention is reported as [`StoreError::Conflict`](crate::StoreError::Conflict).
pub trait RecordStore: Send + Sync {
    /// Insert a new record and return it with its assigned key.
    fn insert_record(&self, record: NewRecord) -> StoreResult<OrderRecord>;

    /// Read a record by key.
    ///
    /// Returns `Ok(None)` if the record does not exist.
    fn record(&self, key: RecordKey) -> StoreResult<Option<OrderRecord>>;

    /// All records matching `filter`, ordered by key.
    fn records(&self, filter: &StatusFilter) -> StoreResult<Vec<OrderRecord>>;

    /// Move a record to a new lifecycle status.
    fn update_status(&self, key: RecordKey, status: OrderStatus) -> StoreResult<OrderRecord>;

    /// Delete a record and all of its properties. Returns `true` if the
    /// record existed.
    fn delete_record(&self, key: RecordKey) -> StoreResult<bool>;

    /// Read one property of a record.
    fn property(&self, key: RecordKey, name: &str) -> StoreResult<Option<String>>;

    /// All properties of a record, keyed by name.
    fn properties(&self, key: RecordKey) -> StoreResult<BTreeMap<String, String>>;

    /// Insert or replace a property value.
    fn set_property(&self, key: RecordKey, name: &str, value: &str) -> StoreResult<()>;

    /// Write a property only if the record has no non-empty value for it.
    ///
    /// Returns `true` if the value was written.
    fn add_property_if_absent(&self, key: RecordKey, name: &str, value: &str)
        -> StoreResult<bool>;

    /// Atomically assign `max(numeric value of name across all records) + 1`
    /// (or 1 when no record has the property) to `key`.
    ///
    /// Returns `Ok(Some(value))` with the written value, or `Ok(None)` if the
    /// record already carried a non-empty value and nothing was written.
    fn insert_next_sequence(&self, key: RecordKey, name: &str) -> StoreResult<Option<u64>>;

    /// Keys of records whose property `name` equals `value` and whose status
    /// matches `filter`, ordered by key.
    fn find_by_property(
        &self,
        name: &str,
        value: &str,
        filter: &StatusFilter,
    ) -> StoreResult<Vec<RecordKey>>;

    /// Read a named option.
    fn option(&self, name: &str) -> StoreResult<Option<String>>;

    /// Insert or replace a named option.
    fn set_option(&self, name: &str, value: &str) -> StoreResult<()>;

    /// Whether a record exists.
    fn exists(&self, key: RecordKey) -> StoreResult<bool> {
        Ok(self.record(key)?.is_some())
    }
}
