//! Sequential order numbers for ordseq.
//!
//! This crate is the heart of ordseq. It attaches a human-facing,
//! gap-minimizing number to each order, independent of the store's internal
//! record key:
//! - [`SequenceAllocator`] assigns `max + 1` exactly once per order through
//!   the store's atomic computed insert, retrying transient conflicts
//! - [`BackfillMigrator`] numbers legacy orders with their own record key on
//!   first install and tracks the installed version
//! - [`IdentifierResolver`] maps a customer-supplied number back to an order
//! - [`DisplayFormatter`] renders the number for presentation
//! - [`OrderNumbering`] wires all of the above to one record store and is
//!   what a host's order lifecycle calls into
//!
//! Numbering is best-effort: an allocation that keeps conflicting is
//! abandoned and the order keeps displaying its record key. Order creation
//! is never blocked by numbering.

pub mod allocator;
pub mod config;
pub mod error;
pub mod formatter;
pub mod migrator;
pub mod numbering;
pub mod resolver;

pub use allocator::{Allocation, SequenceAllocator};
pub use config::NumberingConfig;
pub use error::{NumberingError, NumberingResult};
pub use formatter::DisplayFormatter;
pub use migrator::{BackfillMigrator, MigrationReport, NoOpUpgrade, UpgradeHook};
pub use numbering::OrderNumbering;
pub use resolver::{IdentifierResolver, Resolution};
