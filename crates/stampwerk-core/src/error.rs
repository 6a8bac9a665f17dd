// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Stampwerk.

use thiserror::Error;

/// Reasons an upload is rejected before any processing starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no file was uploaded")]
    MissingUpload,

    #[error("only PDF files are allowed (got {found})")]
    UnsupportedContentType { found: String },

    #[error("file size {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("document has {pages} pages, more than the {limit} page limit")]
    TooManyPages { pages: usize, limit: usize },
}

/// Top-level error type for all Stampwerk operations.
#[derive(Debug, Error)]
pub enum StampwerkError {
    // -- Input --
    #[error("invalid upload: {0}")]
    Validation(#[from] ValidationError),

    #[error("malformed PDF document: {0}")]
    MalformedDocument(String),

    // -- Pipeline --
    #[error("barcode encoding failed: {0}")]
    Encoding(String),

    #[error("PDF serialization failed: {0}")]
    Serialization(String),

    // -- Bookkeeping --
    #[error("bookkeeping failed: {0}")]
    Persistence(String),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StampwerkError {
    /// Whether the error was raised before any work was done (nothing was
    /// issued, parsed, or written).
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Short machine-readable tag, used in log fields and JSON responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::MalformedDocument(_) => "malformed_document",
            Self::Encoding(_) => "encoding",
            Self::Serialization(_) => "serialization",
            Self::Persistence(_) => "persistence",
            Self::IntegrityMismatch { .. } => "integrity_mismatch",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, StampwerkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_converts_and_is_rejection() {
        let err: StampwerkError = ValidationError::TooLarge {
            size: 10,
            limit: 5,
        }
        .into();
        assert!(err.is_rejection());
        assert_eq!(err.kind(), "validation");
        assert_eq!(
            err.to_string(),
            "invalid upload: file size 10 bytes exceeds the 5 byte limit"
        );
    }

    #[test]
    fn pipeline_errors_are_not_rejections() {
        let err = StampwerkError::Encoding("bad char".into());
        assert!(!err.is_rejection());
        assert_eq!(err.kind(), "encoding");
    }
}
