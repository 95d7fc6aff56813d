use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Internal key of an order record.
///
/// Assigned by the record store on insertion and never changed afterwards.
/// It is independent of the record's [`SequentialNumber`](crate::SequentialNumber),
/// although both are integers and may coincide for records that predate
/// sequential numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(u64);

impl RecordKey {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TypeError::InvalidRecordKey(s.to_string()));
        }
        trimmed
            .parse::<u64>()
            .map(Self)
            .map_err(|_| TypeError::InvalidRecordKey(s.to_string()))
    }
}

impl From<u64> for RecordKey {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Lifecycle status of an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    /// Order still being composed. Not a real order yet.
    Draft,
    Pending,
    Processing,
    OnHold,
    Completed,
    Cancelled,
    Refunded,
    Failed,
    /// Soft-deleted by an operator.
    Trash,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 9] = [
        Self::Draft,
        Self::Pending,
        Self::Processing,
        Self::OnHold,
        Self::Completed,
        Self::Cancelled,
        Self::Refunded,
        Self::Failed,
        Self::Trash,
    ];

    /// Statuses of orders visible to customers: everything except
    /// drafts and trashed orders.
    pub const PUBLISHED: [OrderStatus; 7] = [
        Self::Pending,
        Self::Processing,
        Self::OnHold,
        Self::Completed,
        Self::Cancelled,
        Self::Refunded,
        Self::Failed,
    ];

    pub fn is_draft(self) -> bool {
        matches!(self, Self::Draft)
    }

    pub fn is_published(self) -> bool {
        !matches!(self, Self::Draft | Self::Trash)
    }

    /// The storage slug of this status (e.g. `"on-hold"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::OnHold => "on-hold",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
            Self::Trash => "trash",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| TypeError::UnknownStatus(s.to_string()))
    }
}

/// Snapshot of an order record as held by the record store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub key: RecordKey,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl OrderRecord {
    pub fn is_draft(&self) -> bool {
        self.status.is_draft()
    }
}

/// Request to insert a new order record.
///
/// When `key` is `None` the store assigns the next free key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRecord {
    pub key: Option<RecordKey>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl NewRecord {
    /// A new record with the given status, created now.
    pub fn new(status: OrderStatus) -> Self {
        Self {
            key: None,
            status,
            created_at: Utc::now(),
        }
    }

    /// Request a specific internal key (used when importing legacy orders).
    pub fn with_key(mut self, key: RecordKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}
