// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for Stampwerk.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// MIME type accepted for uploads.
pub const PDF_MIME: &str = "application/pdf";

/// Placeholder drawn in the "Completed" and "Posted" summary columns.
pub const BLANK_MARKER: &str = "_____________";

/// Minimum width of the zero-padded sequence segment.
pub const SEQUENCE_WIDTH: usize = 5;

// ---------------------------------------------------------------------------
// Content identifiers
// ---------------------------------------------------------------------------

/// Tracking code stamped on one output page: `PREFIX-MMDDYY-NNNNN`.
///
/// Ordering follows the sequence number first, which is the issuance order
/// for identifiers coming from the same generator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentIdentifier {
    pub prefix: String,
    pub issued_on: NaiveDate,
    pub sequence: u64,
}

impl ContentIdentifier {
    pub fn new(prefix: impl Into<String>, issued_on: NaiveDate, sequence: u64) -> Self {
        Self {
            prefix: prefix.into(),
            issued_on,
            sequence,
        }
    }

    /// The `MMDDYY` date segment.
    pub fn date_code(&self) -> String {
        format!(
            "{:02}{:02}{:02}",
            self.issued_on.month(),
            self.issued_on.day(),
            self.issued_on.year().rem_euclid(100)
        )
    }
}

impl fmt::Display for ContentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{:0width$}",
            self.prefix,
            self.date_code(),
            self.sequence,
            width = SEQUENCE_WIDTH
        )
    }
}

impl PartialOrd for ContentIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ContentIdentifier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sequence
            .cmp(&other.sequence)
            .then_with(|| self.issued_on.cmp(&other.issued_on))
            .then_with(|| self.prefix.cmp(&other.prefix))
    }
}

/// Returned when a string is not a well-formed content identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed content identifier: {0:?}")]
pub struct ParseIdentifierError(pub String);

impl FromStr for ContentIdentifier {
    type Err = ParseIdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParseIdentifierError(s.to_owned());

        // The prefix may itself contain dashes, so split from the right.
        let mut parts = s.rsplitn(3, '-');
        let sequence_part = parts.next().ok_or_else(bad)?;
        let date_part = parts.next().ok_or_else(bad)?;
        let prefix = parts.next().filter(|p| !p.is_empty()).ok_or_else(bad)?;

        if sequence_part.len() < SEQUENCE_WIDTH
            || !sequence_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(bad());
        }
        if date_part.len() != 6 || !date_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }

        let sequence: u64 = sequence_part.parse().map_err(|_| bad())?;
        let month: u32 = date_part[0..2].parse().map_err(|_| bad())?;
        let day: u32 = date_part[2..4].parse().map_err(|_| bad())?;
        let year: i32 = date_part[4..6].parse().map_err(|_| bad())?;
        let issued_on = NaiveDate::from_ymd_opt(2000 + year, month, day).ok_or_else(bad)?;

        Ok(Self::new(prefix, issued_on, sequence))
    }
}

// ---------------------------------------------------------------------------
// Summary rows
// ---------------------------------------------------------------------------

/// One line of the trailing summary table.
///
/// The completion and posting markers are always blank placeholders; they
/// are filled in by hand on the printed copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub identifier: ContentIdentifier,
    pub completed: String,
    pub posted: String,
}

impl SummaryRow {
    pub fn blank(identifier: ContentIdentifier) -> Self {
        Self {
            identifier,
            completed: BLANK_MARKER.to_owned(),
            posted: BLANK_MARKER.to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Bookkeeping
// ---------------------------------------------------------------------------

/// Unique identifier for one stamping run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mapping from one completed run to the output file it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookkeepingRecord {
    pub run_id: RunId,
    /// Identifiers in issuance (page) order.
    pub identifiers: Vec<ContentIdentifier>,
    /// File name inside the served uploads directory.
    pub output_file: String,
    pub page_count: usize,
    /// SHA-256 hex digest of the output bytes.
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

impl BookkeepingRecord {
    pub fn new(
        run_id: RunId,
        identifiers: Vec<ContentIdentifier>,
        output_file: impl Into<String>,
        sha256: impl Into<String>,
    ) -> Self {
        let page_count = identifiers.len();
        Self {
            run_id,
            identifiers,
            output_file: output_file.into(),
            page_count,
            sha256: sha256.into(),
            created_at: Utc::now(),
        }
    }

    pub fn last_identifier(&self) -> Option<&ContentIdentifier> {
        self.identifiers.last()
    }
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

/// A file handed to the stamping service by its caller.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    /// Declared MIME type.
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Infer a MIME type from a file extension.
pub fn mime_from_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "pdf" => PDF_MIME,
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "tif" | "tiff" => "image/tiff",
        "txt" => "text/plain",
        "ps" | "eps" => "application/postscript",
        _ => "application/octet-stream",
    }
}

// ---------------------------------------------------------------------------
// Paper
// ---------------------------------------------------------------------------

/// Standard paper sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperSize {
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Custom { width_mm: u32, height_mm: u32 },
}

impl PaperSize {
    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (u32, u32) {
        match self {
            Self::A4 => (210, 297),
            Self::A3 => (297, 420),
            Self::A5 => (148, 210),
            Self::Letter => (216, 279),
            Self::Legal => (216, 356),
            Self::Custom {
                width_mm,
                height_mm,
            } => (*width_mm, *height_mm),
        }
    }

    /// Dimensions in PostScript points (1/72 inch).
    pub fn dimensions_pt(&self) -> (f32, f32) {
        let (w, h) = self.dimensions_mm();
        (mm_to_pt(w as f32), mm_to_pt(h as f32))
    }
}

/// Convert millimetres to points.
pub fn mm_to_pt(mm: f32) -> f32 {
    mm * 72.0 / 25.4
}
