//! Identifier lookup.
//!
//! A customer-supplied identifier is first matched against sequential
//! numbers of published orders. Orders placed while numbering was inactive
//! have no number, so the identifier is then tried as a record key, unless
//! that record carries a number of its own, in which case the key match is
//! a coincidence and not the order the customer meant.

use std::sync::Arc;

use ordseq_store::{RecordStore, StatusFilter};
use ordseq_types::{RecordKey, SequentialNumber};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::NumberingConfig;
use crate::error::NumberingResult;

/// Result of resolving an identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "via", content = "key", rename_all = "snake_case")]
pub enum Resolution {
    /// A published order carries this sequential number.
    BySequentialNumber(RecordKey),
    /// An un-numbered order has this record key.
    ByRecordKey(RecordKey),
    NotFound,
}

impl Resolution {
    pub fn key(self) -> Option<RecordKey> {
        match self {
            Self::BySequentialNumber(key) | Self::ByRecordKey(key) => Some(key),
            Self::NotFound => None,
        }
    }

    pub fn is_found(self) -> bool {
        !matches!(self, Self::NotFound)
    }
}

/// Maps identifiers back to orders.
pub struct IdentifierResolver<S: ?Sized> {
    store: Arc<S>,
    property: String,
    prefix: String,
}

impl<S: RecordStore + ?Sized> IdentifierResolver<S> {
    pub fn new(store: Arc<S>, config: &NumberingConfig) -> Self {
        Self {
            store,
            property: config.property_name.clone(),
            prefix: config.display_prefix.clone(),
        }
    }

    /// Find the order identified by `identifier`.
    ///
    /// Surrounding whitespace and the display prefix are ignored, so `"#42"`
    /// and `"42"` resolve alike. Store failures are returned as errors; every
    /// other miss is [`Resolution::NotFound`].
    pub fn resolve(&self, identifier: &str) -> NumberingResult<Resolution> {
        let needle = self.normalize(identifier);
        if needle.is_empty() {
            return Ok(Resolution::NotFound);
        }

        let matches =
            self.store
                .find_by_property(&self.property, needle, &StatusFilter::published())?;
        match matches.as_slice() {
            [] => {}
            [key] => {
                debug!(identifier = needle, record = %key, "resolved by sequential number");
                return Ok(Resolution::BySequentialNumber(*key));
            }
            [oldest, ..] => {
                warn!(
                    identifier = needle,
                    matches = matches.len(),
                    record = %oldest,
                    "sequential number shared by several orders; using the oldest"
                );
                return Ok(Resolution::BySequentialNumber(*oldest));
            }
        }

        let Ok(key) = needle.parse::<RecordKey>() else {
            return Ok(Resolution::NotFound);
        };
        if self.store.record(key)?.is_none() {
            return Ok(Resolution::NotFound);
        }

        let own = self
            .store
            .property(key, &self.property)?
            .as_deref()
            .and_then(SequentialNumber::parse);
        match own {
            Some(own) => {
                debug!(
                    identifier = needle,
                    record = %key,
                    number = %own,
                    "record key matched an order with its own number"
                );
                Ok(Resolution::NotFound)
            }
            None => {
                debug!(identifier = needle, record = %key, "resolved by record key");
                Ok(Resolution::ByRecordKey(key))
            }
        }
    }

    fn normalize<'a>(&self, identifier: &'a str) -> &'a str {
        let trimmed = identifier.trim();
        if self.prefix.is_empty() {
            return trimmed;
        }
        trimmed
            .strip_prefix(self.prefix.as_str())
            .unwrap_or(trimmed)
            .trim()
    }
}
