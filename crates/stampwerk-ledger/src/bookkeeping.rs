// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bookkeeping ledger: SQLite record of every completed stamping run and the
// identifiers it issued.
//
// Schema:
//   runs(
//     run_id       TEXT    PRIMARY KEY,  -- UUID
//     output_file  TEXT    NOT NULL,     -- name inside the uploads directory
//     page_count   INTEGER NOT NULL,
//     sha256       TEXT    NOT NULL,     -- hex digest of the output bytes
//     created_at   TEXT    NOT NULL      -- RFC 3339
//   )
//   run_identifiers(
//     identifier   TEXT    PRIMARY KEY,  -- PREFIX-MMDDYY-NNNNN
//     run_id       TEXT    NOT NULL REFERENCES runs(run_id),
//     position     INTEGER NOT NULL      -- zero-based page index
//   )

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use stampwerk_core::error::{Result, StampwerkError};
use stampwerk_core::traits::RecordSink;
use stampwerk_core::types::{BookkeepingRecord, ContentIdentifier, RunId};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS runs (
    run_id      TEXT    PRIMARY KEY,
    output_file TEXT    NOT NULL,
    page_count  INTEGER NOT NULL,
    sha256      TEXT    NOT NULL,
    created_at  TEXT    NOT NULL
);
CREATE TABLE IF NOT EXISTS run_identifiers (
    identifier  TEXT    PRIMARY KEY,
    run_id      TEXT    NOT NULL REFERENCES runs(run_id),
    position    INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS run_identifiers_by_run ON run_identifiers(run_id, position);";

// ---------------------------------------------------------------------------
// Local error helpers
// ---------------------------------------------------------------------------

fn db_err(e: rusqlite::Error) -> StampwerkError {
    StampwerkError::Persistence(e.to_string())
}

fn corrupt(what: &str, detail: impl std::fmt::Display) -> StampwerkError {
    StampwerkError::Persistence(format!("corrupt {what} in ledger: {detail}"))
}

/// A `runs` row before its identifiers are attached.
struct RunRow {
    run_id: String,
    output_file: String,
    page_count: i64,
    sha256: String,
    created_at: String,
}

impl RunRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            run_id: row.get(0)?,
            output_file: row.get(1)?,
            page_count: row.get(2)?,
            sha256: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

/// SQLite-backed bookkeeping store.
///
/// `rusqlite::Connection` is `Send` but not `Sync`; share a ledger between
/// tasks behind a mutex.
pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    /// Open (or create) the ledger database at `path`, in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        debug!("ledger opened");
        Ok(Self { conn })
    }

    /// In-memory ledger for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        debug!("in-memory ledger opened");
        Ok(Self { conn })
    }

    /// Insert one run and all of its identifiers atomically.
    #[instrument(skip_all, fields(run_id = %record.run_id, output_file = %record.output_file))]
    pub fn insert(&self, record: &BookkeepingRecord) -> Result<()> {
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        tx.execute(
            "INSERT INTO runs (run_id, output_file, page_count, sha256, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.run_id.to_string(),
                record.output_file,
                record.page_count as i64,
                record.sha256,
                record.created_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO run_identifiers (identifier, run_id, position)
                     VALUES (?1, ?2, ?3)",
                )
                .map_err(db_err)?;
            for (position, identifier) in record.identifiers.iter().enumerate() {
                stmt.execute(params![
                    identifier.to_string(),
                    record.run_id.to_string(),
                    position as i64,
                ])
                .map_err(db_err)?;
            }
        }

        tx.commit().map_err(db_err)?;
        info!(identifiers = record.identifiers.len(), "run recorded");
        Ok(())
    }

    /// The run whose output carries `identifier`, if any.
    pub fn find_by_identifier(&self, identifier: &str) -> Result<Option<BookkeepingRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT r.run_id, r.output_file, r.page_count, r.sha256, r.created_at
                 FROM run_identifiers i JOIN runs r ON r.run_id = i.run_id
                 WHERE i.identifier = ?1",
                params![identifier],
                RunRow::from_row,
            )
            .optional()
            .map_err(db_err)?;

        row.map(|row| self.hydrate(row)).transpose()
    }

    /// The most recent `limit` runs, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<BookkeepingRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT run_id, output_file, page_count, sha256, created_at
                 FROM runs
                 ORDER BY rowid DESC
                 LIMIT ?1",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![limit], RunRow::from_row)
            .map_err(db_err)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(self.hydrate(row.map_err(db_err)?)?);
        }
        Ok(records)
    }

    /// Number of recorded runs.
    pub fn count(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))
            .map_err(db_err)
    }

    /// Attach the run's identifiers (in page order) and parse stored text.
    fn hydrate(&self, row: RunRow) -> Result<BookkeepingRecord> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT identifier FROM run_identifiers
                 WHERE run_id = ?1
                 ORDER BY position ASC",
            )
            .map_err(db_err)?;
        let texts = stmt
            .query_map(params![row.run_id], |r| r.get::<_, String>(0))
            .map_err(db_err)?;

        let mut identifiers = Vec::new();
        for text in texts {
            let text = text.map_err(db_err)?;
            let identifier: ContentIdentifier =
                text.parse().map_err(|e| corrupt("identifier", e))?;
            identifiers.push(identifier);
        }

        let run_id = Uuid::parse_str(&row.run_id).map_err(|e| corrupt("run id", e))?;
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| corrupt("timestamp", e))?
            .with_timezone(&Utc);

        Ok(BookkeepingRecord {
            run_id: RunId(run_id),
            identifiers,
            output_file: row.output_file,
            page_count: usize::try_from(row.page_count).map_err(|e| corrupt("page count", e))?,
            sha256: row.sha256,
            created_at,
        })
    }
}

impl RecordSink for Ledger {
    fn save(&self, record: &BookkeepingRecord) -> Result<()> {
        self.insert(record)
    }
}
