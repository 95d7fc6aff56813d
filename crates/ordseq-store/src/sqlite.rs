//! SQLite-backed record store.
//!
//! Records live in `orders`, properties in `order_properties` (one row per
//! record and property name), options in `options`. The computed insert is
//! one `INSERT ... SELECT MAX(...) + 1` statement executed inside a
//! `BEGIN IMMEDIATE` transaction, so no two writers can observe the same
//! maximum.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use ordseq_types::{NewRecord, OrderRecord, OrderStatus, RecordKey};

use crate::config::SqliteConfig;
use crate::error::{StoreError, StoreResult};
use crate::traits::{RecordStore, StatusFilter};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS orders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS order_properties (
        record_id INTEGER NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (record_id, name)
    );

    CREATE INDEX IF NOT EXISTS order_properties_lookup
        ON order_properties (name, value);

    CREATE TABLE IF NOT EXISTS options (
        name TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// Assigns `max + 1` unless the record already holds a non-empty value.
/// Returns the written value, or no row when the existing value was kept.
/// Negative and non-numeric values count as zero.
const INSERT_NEXT_SEQUENCE: &str = "
    INSERT INTO order_properties (record_id, name, value)
    SELECT ?1, ?2, CAST(MAX(COALESCE(MAX(CAST(value AS INTEGER)), 0), 0) + 1 AS TEXT)
    FROM order_properties
    WHERE name = ?2
    ON CONFLICT (record_id, name) DO UPDATE SET value = excluded.value
    WHERE trim(order_properties.value) = ''
    RETURNING value
";

/// A [`RecordStore`] backed by a SQLite database.
///
/// One connection per store, guarded by a mutex. Several stores (or
/// processes) may open the same file; contention between them surfaces as
/// [`StoreError::Conflict`] once the busy timeout expires.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Open (or create) a database at the given path.
    pub fn open(path: impl AsRef<Path>, config: &SqliteConfig) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(config.busy_timeout())?;
        if config.wal {
            let mode: String =
                conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
            debug!(path = %path.display(), journal_mode = %mode, "opened sqlite record store");
        }
        Self::init_with_connection(conn, config)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_with_connection(conn, &SqliteConfig::default())
    }

    fn init_with_connection(conn: Connection, config: &SqliteConfig) -> StoreResult<Self> {
        conn.busy_timeout(config.busy_timeout())?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    fn load_record(conn: &Connection, key: RecordKey) -> StoreResult<Option<OrderRecord>> {
        let row = conn
            .query_row(
                "SELECT id, status, created_at FROM orders WHERE id = ?1",
                params![sql_id(key)?],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        row.map(decode_record).transpose()
    }

    fn record_exists(conn: &Connection, key: RecordKey) -> StoreResult<bool> {
        Ok(conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM orders WHERE id = ?1)",
            params![sql_id(key)?],
            |row| row.get(0),
        )?)
    }
}

fn decode_record((id, status, created_at): (i64, String, String)) -> StoreResult<OrderRecord> {
    let key = record_key(id)?;
    let status = status
        .parse::<OrderStatus>()
        .map_err(|e| StoreError::Corrupt(format!("order {id}: {e}")))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| StoreError::Corrupt(format!("order {id}: bad created_at: {e}")))?
        .with_timezone(&Utc);
    Ok(OrderRecord {
        key,
        status,
        created_at,
    })
}

fn sql_id(key: RecordKey) -> StoreResult<i64> {
    i64::try_from(key.get())
        .map_err(|_| StoreError::Backend(format!("record key {key} exceeds SQLite range")))
}

fn record_key(id: i64) -> StoreResult<RecordKey> {
    u64::try_from(id)
        .map(RecordKey::new)
        .map_err(|_| StoreError::Corrupt(format!("negative order id {id}")))
}

fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl RecordStore for SqliteRecordStore {
    fn insert_record(&self, record: NewRecord) -> StoreResult<OrderRecord> {
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO orders (id, status, created_at) VALUES (?1, ?2, ?3)",
            params![
                record.key.map(sql_id).transpose()?,
                record.status.as_str(),
                encode_timestamp(&record.created_at),
            ],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                if let Some(key) = record.key {
                    return Err(StoreError::DuplicateKey(key));
                }
                return Err(StoreError::Backend(failure.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let key = record_key(conn.last_insert_rowid())?;
        Self::load_record(&conn, key)?.ok_or(StoreError::RecordNotFound(key))
    }

    fn record(&self, key: RecordKey) -> StoreResult<Option<OrderRecord>> {
        let conn = self.lock()?;
        Self::load_record(&conn, key)
    }

    fn records(&self, filter: &StatusFilter) -> StoreResult<Vec<OrderRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, status, created_at FROM orders ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let record = decode_record(row)?;
            if filter.matches(record.status) {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn update_status(&self, key: RecordKey, status: OrderStatus) -> StoreResult<OrderRecord> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE orders SET status = ?2 WHERE id = ?1",
            params![sql_id(key)?, status.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::RecordNotFound(key));
        }
        Self::load_record(&conn, key)?.ok_or(StoreError::RecordNotFound(key))
    }

    fn delete_record(&self, key: RecordKey) -> StoreResult<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM orders WHERE id = ?1", params![sql_id(key)?])?;
        Ok(deleted > 0)
    }

    fn property(&self, key: RecordKey, name: &str) -> StoreResult<Option<String>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT value FROM order_properties WHERE record_id = ?1 AND name = ?2",
                params![sql_id(key)?, name],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn properties(&self, key: RecordKey) -> StoreResult<BTreeMap<String, String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT name, value FROM order_properties WHERE record_id = ?1")?;
        let props = stmt
            .query_map(params![sql_id(key)?], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<BTreeMap<String, String>, _>>()?;
        Ok(props)
    }

    fn set_property(&self, key: RecordKey, name: &str, value: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        if !Self::record_exists(&conn, key)? {
            return Err(StoreError::RecordNotFound(key));
        }
        conn.execute(
            "INSERT INTO order_properties (record_id, name, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (record_id, name) DO UPDATE SET value = excluded.value",
            params![sql_id(key)?, name, value],
        )?;
        Ok(())
    }

    fn add_property_if_absent(
        &self,
        key: RecordKey,
        name: &str,
        value: &str,
    ) -> StoreResult<bool> {
        let conn = self.lock()?;
        if !Self::record_exists(&conn, key)? {
            return Err(StoreError::RecordNotFound(key));
        }
        let written = conn.execute(
            "INSERT INTO order_properties (record_id, name, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (record_id, name) DO UPDATE SET value = excluded.value
             WHERE trim(order_properties.value) = ''",
            params![sql_id(key)?, name, value],
        )?;
        Ok(written > 0)
    }

    fn insert_next_sequence(&self, key: RecordKey, name: &str) -> StoreResult<Option<u64>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !Self::record_exists(&tx, key)? {
            return Err(StoreError::RecordNotFound(key));
        }

        let written: Option<String> = tx
            .query_row(INSERT_NEXT_SEQUENCE, params![sql_id(key)?, name], |row| row.get(0))
            .optional()?;
        // Dropping the transaction on a bad value rolls the write back.
        let next = written
            .map(|value| {
                value
                    .parse::<u64>()
                    .map_err(|e| StoreError::Corrupt(format!("sequence value {value:?}: {e}")))
            })
            .transpose()?;
        tx.commit()?;
        Ok(next)
    }

    fn find_by_property(
        &self,
        name: &str,
        value: &str,
        filter: &StatusFilter,
    ) -> StoreResult<Vec<RecordKey>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT o.id, o.status FROM order_properties p
             JOIN orders o ON o.id = p.record_id
             WHERE p.name = ?1 AND p.value = ?2
             ORDER BY o.id",
        )?;
        let rows = stmt
            .query_map(params![name, value], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut keys = Vec::new();
        for (id, status) in rows {
            let status = status
                .parse::<OrderStatus>()
                .map_err(|e| StoreError::Corrupt(format!("order {id}: {e}")))?;
            if filter.matches(status) {
                keys.push(record_key(id)?);
            }
        }
        Ok(keys)
    }

    fn option(&self, name: &str) -> StoreResult<Option<String>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT value FROM options WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_option(&self, name: &str, value: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO options (name, value) VALUES (?1, ?2)
             ON CONFLICT (name) DO UPDATE SET value = excluded.value",
            params![name, value],
        )?;
        Ok(())
    }
}
