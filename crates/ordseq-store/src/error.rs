use ordseq_types::RecordKey;

/// Errors from record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("record not found: {0}")]
    RecordNotFound(RecordKey),

    /// A record with this key already exists.
    #[error("record already exists: {0}")]
    DuplicateKey(RecordKey),

    /// The write lost a race with another writer (lock timeout, busy
    /// database, deadlock). Safe to retry.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Failure reported by the storage backend.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                Self::Conflict(err.to_string())
            }
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..) => Self::Corrupt(err.to_string()),
            _ => Self::Backend(err.to_string()),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_transient() {
        assert!(StoreError::Conflict("deadlock".into()).is_transient());
        assert!(!StoreError::Backend("disk full".into()).is_transient());
        assert!(!StoreError::RecordNotFound(RecordKey::new(1)).is_transient());
    }

    #[test]
    fn busy_sqlite_errors_are_conflicts() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".into()),
        );
        assert!(StoreError::from(err).is_transient());
    }

    #[test]
    fn other_sqlite_errors_are_permanent() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            None,
        );
        assert!(matches!(StoreError::from(err), StoreError::Backend(_)));
    }
}
