// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Collaborator interfaces the pipeline depends on without knowing their
// storage technology.

use crate::error::Result;
use crate::types::BookkeepingRecord;

/// Receives one record per completed stamping run.
///
/// Failures must surface as `StampwerkError::Persistence`; callers treat them
/// as non-fatal because the output file already exists.
pub trait RecordSink: Send {
    fn save(&self, record: &BookkeepingRecord) -> Result<()>;
}
