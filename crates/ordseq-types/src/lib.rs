//! Foundation types for ordseq.
//!
//! This crate provides the identity and lifecycle types shared by the record
//! store and the numbering subsystem. Every other ordseq crate depends on
//! `ordseq-types`.
//!
//! # Key Types
//!
//! - [`RecordKey`] — Store-assigned internal key of an order record
//! - [`OrderStatus`] — Lifecycle status, including the transient draft state
//! - [`OrderRecord`] — Snapshot of an order as held by the record store
//! - [`NewRecord`] — Insertion request for a new order record
//! - [`SequentialNumber`] — Human-facing identifier attached to a record

pub mod error;
pub mod number;
pub mod record;

pub use error::TypeError;
pub use number::SequentialNumber;
pub use record::{NewRecord, OrderRecord, OrderStatus, RecordKey};
