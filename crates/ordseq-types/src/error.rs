use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid record key: {0}")]
    InvalidRecordKey(String),

    #[error("unknown order status: {0}")]
    UnknownStatus(String),
}
