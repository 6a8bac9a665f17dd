// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// stampwerk-ledger: Durable bookkeeping for stamping runs.
//
// The ledger maps every issued content identifier to the output file that
// carries it, the sequence store keeps the identifier counter's high-water
// mark across restarts, and the integrity helpers fingerprint output files
// so a stored document can be checked against its record.

pub mod bookkeeping;
pub mod integrity;
pub mod sequence_store;

pub use bookkeeping::Ledger;
pub use integrity::{hash_bytes, verify_hash};
pub use sequence_store::SequenceStore;
