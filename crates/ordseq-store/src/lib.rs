//! Record and property storage for ordseq.
//!
//! This crate models the order-management store that sequential numbering
//! runs against: a table of order records plus a key/value property store
//! with at most one value per property per record, and a small table of
//! named options (used for the installed-version marker).
//!
//! # Storage Backends
//!
//! All backends implement the [`RecordStore`] trait:
//!
//! - [`InMemoryRecordStore`] -- `BTreeMap`-based store for tests and embedding
//! - [`SqliteRecordStore`] -- durable store backed by SQLite
//!
//! # Design Rules
//!
//! 1. [`RecordStore::insert_next_sequence`] is a single atomic computed
//!    insert. Callers never read the maximum and write separately.
//! 2. Conditional writes (`add_property_if_absent`, `insert_next_sequence`)
//!    never overwrite a non-empty value.
//! 3. Deleting a record deletes its properties.
//! 4. Contention is reported as [`StoreError::Conflict`]; callers decide
//!    whether to retry.

pub mod config;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use config::SqliteConfig;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;
pub use traits::{RecordStore, StatusFilter};
