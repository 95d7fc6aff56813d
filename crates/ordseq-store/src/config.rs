use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection settings for [`SqliteRecordStore`](crate::SqliteRecordStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// How long a statement waits on another connection's lock before the
    /// store reports a conflict.
    pub busy_timeout_ms: u64,
    /// Use write-ahead logging for file databases.
    pub wal: bool,
}

impl SqliteConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            wal: true,
        }
    }
}
