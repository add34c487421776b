//! SQLite ledger
//!
//! One connection behind a mutex. Every transaction is opened with
//! `BEGIN IMMEDIATE`, which takes the database write lock up front, so a
//! read-decide-write on one identity cannot interleave with another writer,
//! whether that writer is in this process or another one.

use chrono::{NaiveDate, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{ffi, params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

use super::{Ledger, LedgerTx};
use crate::error::{StoreError, StoreResult};
use crate::keys::RecoveryKey;
use crate::records::{IdentityRecord, RecoveryRecord};

const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS identities (
    identity            TEXT PRIMARY KEY,
    request_count       INTEGER NOT NULL,
    last_request_date   TEXT NOT NULL,
    premium_expires_on  TEXT,
    updated_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS recovery_records (
    purchase_token  TEXT PRIMARY KEY,
    recovery_key    TEXT NOT NULL UNIQUE,
    bound_identity  TEXT NOT NULL,
    product_id      TEXT NOT NULL,
    expires_on      TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_recovery_bound ON recovery_records(bound_identity);
"#;

/// SQLite-backed ledger
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(format!("create {}: {e}", parent.display())))?;
            }
        }
        let conn = Connection::open(path).map_err(|e| backend("db open", e))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| backend("db journal mode", e))?;
        Self::init(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| backend("db open", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| backend("db busy timeout", e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| backend("db schema", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Ledger for SqliteLedger {
    fn begin(&self) -> StoreResult<Box<dyn LedgerTx + '_>> {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| backend("db begin", e))?;
        Ok(Box::new(SqliteTx {
            conn,
            finished: false,
        }))
    }
}

struct SqliteTx<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl LedgerTx for SqliteTx<'_> {
    fn identity(&mut self, identity: &str) -> StoreResult<Option<IdentityRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT identity, request_count, last_request_date, premium_expires_on
                 FROM identities WHERE identity = ?1",
                params![identity],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| backend("db read identity", e))?;

        let Some((identity, count, last, expires)) = row else {
            return Ok(None);
        };

        let request_count = u32::try_from(count)
            .map_err(|_| StoreError::Corrupt(format!("request_count {count} for {identity}")))?;
        Ok(Some(IdentityRecord {
            request_count,
            last_request_date: parse_date(&last)?,
            premium_expires_on: expires.as_deref().map(parse_date).transpose()?,
            identity,
        }))
    }

    fn put_identity(&mut self, record: &IdentityRecord) -> StoreResult<()> {
        self.conn
            .execute(
                "INSERT INTO identities (identity, request_count, last_request_date, premium_expires_on, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(identity) DO UPDATE SET
                    request_count=excluded.request_count,
                    last_request_date=excluded.last_request_date,
                    premium_expires_on=excluded.premium_expires_on,
                    updated_at=excluded.updated_at",
                params![
                    record.identity,
                    record.request_count,
                    format_date(record.last_request_date),
                    record.premium_expires_on.map(format_date),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| backend("db upsert identity", e))?;
        Ok(())
    }

    fn recovery_by_key(&mut self, key: &RecoveryKey) -> StoreResult<Option<RecoveryRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {RECOVERY_COLUMNS} FROM recovery_records WHERE recovery_key = ?1"),
                params![key.as_str()],
                read_recovery_row,
            )
            .optional()
            .map_err(|e| backend("db read recovery by key", e))?
            .map(into_recovery)
            .transpose()
    }

    fn recovery_by_token(&mut self, purchase_token: &str) -> StoreResult<Option<RecoveryRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {RECOVERY_COLUMNS} FROM recovery_records WHERE purchase_token = ?1"),
                params![purchase_token],
                read_recovery_row,
            )
            .optional()
            .map_err(|e| backend("db read recovery by token", e))?
            .map(into_recovery)
            .transpose()
    }

    fn recoveries_bound_to(&mut self, identity: &str) -> StoreResult<Vec<RecoveryRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {RECOVERY_COLUMNS} FROM recovery_records
                 WHERE bound_identity = ?1 ORDER BY purchase_token"
            ))
            .map_err(|e| backend("db prepare bound recoveries", e))?;
        let rows = stmt
            .query_map(params![identity], read_recovery_row)
            .map_err(|e| backend("db read bound recoveries", e))?;

        let mut bound = Vec::new();
        for row in rows {
            bound.push(into_recovery(row.map_err(|e| backend("db read bound recoveries", e))?)?);
        }
        Ok(bound)
    }

    fn put_recovery(&mut self, record: &RecoveryRecord) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let result = self.conn.execute(
            "INSERT INTO recovery_records
                (purchase_token, recovery_key, bound_identity, product_id, expires_on, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(purchase_token) DO UPDATE SET
                recovery_key=excluded.recovery_key,
                bound_identity=excluded.bound_identity,
                product_id=excluded.product_id,
                expires_on=excluded.expires_on,
                updated_at=excluded.updated_at",
            params![
                record.purchase_token,
                record.recovery_key.as_str(),
                record.bound_identity,
                record.product_id,
                format_date(record.expires_on),
                now,
            ],
        );

        result.map(|_| ()).map_err(upsert_recovery_error)
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| backend("db commit", e))?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTx<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.conn.execute_batch("ROLLBACK") {
            tracing::error!(error = %err, "ledger rollback failed");
        }
    }
}

const RECOVERY_COLUMNS: &str = "purchase_token, product_id, recovery_key, bound_identity, expires_on";

type RecoveryRow = (String, String, String, String, String);

fn read_recovery_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecoveryRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_recovery(row: RecoveryRow) -> StoreResult<RecoveryRecord> {
    let (purchase_token, product_id, recovery_key, bound_identity, expires_on) = row;
    Ok(RecoveryRecord {
        purchase_token,
        product_id,
        recovery_key: RecoveryKey::from_stored(recovery_key),
        bound_identity,
        expires_on: parse_date(&expires_on)?,
    })
}

/// Only a UNIQUE clash on the recovery key is a collision; the purchase
/// token conflict is absorbed by the upsert.
fn upsert_recovery_error(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _) if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE => {
            StoreError::KeyCollision
        }
        _ => backend("db upsert recovery", err),
    }
}

fn backend(context: &str, err: rusqlite::Error) -> StoreError {
    StoreError::Backend(format!("{context}: {err}"))
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(raw: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| StoreError::Corrupt(format!("date {raw:?}: {e}")))
}
