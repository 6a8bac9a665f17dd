// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content identifier generator: hands out `PREFIX-MMDDYY-NNNNN` codes from a
// strictly increasing counter.
//
// The counter is an owned `AtomicU64`, not process-global state: whoever
// builds the generator decides where it starts (1 for a fresh process, or the
// value restored from the sequence store) and shares it via `Arc`. Concurrent
// callers are serialised by the atomic increment, so every identifier is
// unique and issuance order matches sequence order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Local, NaiveDate};
use tracing::{debug, info};

use crate::types::ContentIdentifier;

/// Source of the calendar date stamped into identifiers.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local calendar date at call time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Always returns the same date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Issues unique, monotonically increasing content identifiers.
pub struct IdentifierGenerator {
    prefix: String,
    /// The sequence number the next call will hand out.
    next: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl IdentifierGenerator {
    /// Fully injected constructor.
    pub fn with_clock(prefix: impl Into<String>, first_sequence: u64, clock: Arc<dyn Clock>) -> Self {
        let prefix = prefix.into();
        let first_sequence = first_sequence.max(1);
        info!(%prefix, first_sequence, "identifier generator ready");
        Self {
            prefix,
            next: AtomicU64::new(first_sequence),
            clock,
        }
    }

    /// Resume after `last_issued` (the high-water mark of an earlier process).
    pub fn resume_after(prefix: impl Into<String>, last_issued: u64, clock: Arc<dyn Clock>) -> Self {
        Self::with_clock(prefix, last_issued.saturating_add(1), clock)
    }

    /// Issue the next identifier.
    pub fn next(&self) -> ContentIdentifier {
        let sequence = self.next.fetch_add(1, Ordering::SeqCst);
        let id = ContentIdentifier::new(self.prefix.clone(), self.clock.today(), sequence);
        debug!(identifier = %id, "identifier issued");
        id
    }

    /// Sequence number the next call to [`next`](Self::next) will use.
    pub fn peek_next(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Most recently issued sequence number, or 0 if nothing was issued.
    pub fn last_issued(&self) -> u64 {
        self.peek_next().saturating_sub(1)
    }
}

impl std::fmt::Debug for IdentifierGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierGenerator")
            .field("prefix", &self.prefix)
            .field("next", &self.peek_next())
            .finish()
    }
}
