// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sequence store: durable high-water mark of issued sequence numbers, one
// row per identifier prefix.
//
// Schema:
//   sequence_state(
//     prefix       TEXT    PRIMARY KEY,
//     last_issued  INTEGER NOT NULL,
//     updated_at   TEXT    NOT NULL     -- RFC 3339
//   )
//
// The stored value only ever grows. Concurrent runs may finish out of order,
// so `store` keeps the larger of the old and new values.

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use stampwerk_core::error::{Result, StampwerkError};
use tracing::{debug, instrument};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS sequence_state (
    prefix      TEXT    PRIMARY KEY,
    last_issued INTEGER NOT NULL,
    updated_at  TEXT    NOT NULL
);";

fn db_err(e: rusqlite::Error) -> StampwerkError {
    StampwerkError::Persistence(e.to_string())
}

pub struct SequenceStore {
    conn: Connection,
}

impl SequenceStore {
    /// Open (or create) the store at `path`. May share a file with the ledger.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;").map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        debug!("sequence store opened");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self { conn })
    }

    /// Last sequence number issued under `prefix`, or 0 if none was recorded.
    pub fn load(&self, prefix: &str) -> Result<u64> {
        let stored: Option<i64> = self
            .conn
            .query_row(
                "SELECT last_issued FROM sequence_state WHERE prefix = ?1",
                params![prefix],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(stored.map_or(0, |v| v.max(0) as u64))
    }

    /// Record that `last_issued` has been handed out under `prefix`.
    #[instrument(skip(self))]
    pub fn store(&self, prefix: &str, last_issued: u64) -> Result<()> {
        let value = i64::try_from(last_issued)
            .map_err(|_| StampwerkError::Persistence(format!("sequence {last_issued} out of range")))?;
        self.conn
            .execute(
                "INSERT INTO sequence_state (prefix, last_issued, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(prefix) DO UPDATE SET
                     last_issued = MAX(last_issued, excluded.last_issued),
                     updated_at  = excluded.updated_at",
                params![prefix, value, Utc::now().to_rfc3339()],
            )
            .map_err(db_err)?;
        debug!("sequence high-water mark stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_prefix_loads_zero() {
        let store = SequenceStore::open_in_memory().unwrap();
        assert_eq!(store.load("CXM").unwrap(), 0);
    }

    #[test]
    fn store_never_moves_backwards() {
        let store = SequenceStore::open_in_memory().unwrap();
        store.store("CXM", 7).unwrap();
        store.store("CXM", 4).unwrap();
        assert_eq!(store.load("CXM").unwrap(), 7);
        store.store("CXM", 9).unwrap();
        assert_eq!(store.load("CXM").unwrap(), 9);
    }

    #[test]
    fn prefixes_are_independent() {
        let store = SequenceStore::open_in_memory().unwrap();
        store.store("CXM", 3).unwrap();
        store.store("ABC", 12).unwrap();
        assert_eq!(store.load("CXM").unwrap(), 3);
        assert_eq!(store.load("ABC").unwrap(), 12);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        SequenceStore::open(&path).unwrap().store("CXM", 42).unwrap();
        assert_eq!(SequenceStore::open(&path).unwrap().load("CXM").unwrap(), 42);
    }
}
