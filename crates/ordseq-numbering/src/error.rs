use ordseq_store::StoreError;

/// Errors produced by numbering operations.
///
/// Allocation never returns one of these; see
/// [`Allocation`](crate::Allocation).
#[derive(Debug, thiserror::Error)]
pub enum NumberingError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("upgrade from {from} to {to} failed: {reason}")]
    Upgrade {
        from: String,
        to: String,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for numbering operations.
pub type NumberingResult<T> = Result<T, NumberingError>;
