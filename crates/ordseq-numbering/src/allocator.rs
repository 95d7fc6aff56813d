//! Sequence allocation.
//!
//! An order gets its number from [`RecordStore::insert_next_sequence`], which
//! computes `max + 1` and writes it in one atomic step. The allocator only
//! decides *whether* to call it and how often to retry.

use std::sync::Arc;

use ordseq_store::{RecordStore, StoreError, StoreResult};
use ordseq_types::{OrderRecord, RecordKey, SequentialNumber};
use tracing::{debug, info, warn};

use crate::config::NumberingConfig;

/// Outcome of an allocation request.
///
/// Allocation never fails the caller: every path, including exhausted
/// retries, ends in one of these variants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Allocation {
    /// A new number was written.
    Assigned(SequentialNumber),
    /// The order already had a number; nothing was written.
    AlreadyAssigned(SequentialNumber),
    /// The order is a draft and is not numbered yet.
    SkippedDraft,
    /// No order with this key exists.
    MissingRecord,
    /// The number could not be written. The order keeps displaying its
    /// record key and is not retried later.
    Abandoned { attempts: u32, reason: String },
}

impl Allocation {
    /// The order's number after this allocation, if it has one.
    pub fn number(&self) -> Option<&SequentialNumber> {
        match self {
            Self::Assigned(n) | Self::AlreadyAssigned(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self, Self::Assigned(_))
    }
}

/// Assigns sequential numbers to orders.
pub struct SequenceAllocator<S: ?Sized> {
    store: Arc<S>,
    property: String,
    max_attempts: u32,
}

impl<S: RecordStore + ?Sized> SequenceAllocator<S> {
    pub fn new(store: Arc<S>, config: &NumberingConfig) -> Self {
        Self {
            store,
            property: config.property_name.clone(),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Number the order with `key` if it is eligible and not numbered yet.
    ///
    /// Idempotent: an order that already has a number keeps it.
    pub fn assign(&self, key: RecordKey) -> Allocation {
        match self.store.record(key) {
            Ok(Some(record)) => self.assign_record(&record),
            Ok(None) => {
                debug!(record = %key, "allocation skipped: no such order");
                Allocation::MissingRecord
            }
            Err(e) => abandon(key, 0, &e),
        }
    }

    /// Number an order from an event-supplied snapshot.
    ///
    /// The snapshot's status decides the draft guard; the existing-number
    /// check always reads the store.
    pub fn assign_record(&self, record: &OrderRecord) -> Allocation {
        let key = record.key;
        if record.is_draft() {
            debug!(record = %key, "allocation skipped: order is a draft");
            return Allocation::SkippedDraft;
        }

        match self.current(key) {
            Ok(Some(existing)) => {
                debug!(record = %key, number = %existing, "allocation skipped: already numbered");
                return Allocation::AlreadyAssigned(existing);
            }
            Ok(None) => {}
            Err(e) => return abandon(key, 0, &e),
        }

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            match self.store.insert_next_sequence(key, &self.property) {
                Ok(Some(value)) => {
                    let number = SequentialNumber::from_value(value);
                    info!(record = %key, number = %number, attempt, "assigned sequential number");
                    return Allocation::Assigned(number);
                }
                // Another writer numbered this order between the fast-path
                // check and the computed insert.
                Ok(None) => {
                    return match self.current(key) {
                        Ok(Some(existing)) => Allocation::AlreadyAssigned(existing),
                        Ok(None) => Allocation::Abandoned {
                            attempts: attempt,
                            reason: "computed insert wrote nothing".into(),
                        },
                        Err(e) => abandon(key, attempt, &e),
                    };
                }
                Err(StoreError::RecordNotFound(_)) => {
                    debug!(record = %key, "allocation skipped: order deleted");
                    return Allocation::MissingRecord;
                }
                Err(e) if e.is_transient() => {
                    debug!(record = %key, attempt, error = %e, "sequence write conflicted");
                    last_error = Some(e);
                }
                Err(e) => return abandon(key, attempt, &e),
            }
        }

        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        warn!(
            record = %key,
            attempts = self.max_attempts,
            reason = %reason,
            "giving up on sequential number; order keeps its record key"
        );
        Allocation::Abandoned {
            attempts: self.max_attempts,
            reason,
        }
    }

    /// The order's current number, if any.
    pub fn current(&self, key: RecordKey) -> StoreResult<Option<SequentialNumber>> {
        Ok(self
            .store
            .property(key, &self.property)?
            .as_deref()
            .and_then(SequentialNumber::parse))
    }
}

fn abandon(key: RecordKey, attempts: u32, err: &StoreError) -> Allocation {
    warn!(record = %key, attempts, error = %err, "sequential number allocation failed");
    Allocation::Abandoned {
        attempts,
        reason: err.to_string(),
    }
}
