// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the people uploading documents.
//
// Every technical error is mapped to a short sentence plus a suggestion. The
// severity drives how the caller presents it (and which exit code the CLI
// returns).

use serde::Serialize;

use crate::error::{StampwerkError, ValidationError};

/// Severity of an error from the uploader's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    /// The upload itself is wrong; fix it and try again.
    Rejected,
    /// Something on this machine failed (disk, database); retrying may help.
    Transient,
    /// The document cannot be stamped as-is.
    Permanent,
}

/// A plain-English error with an actionable suggestion.
#[derive(Debug, Clone, Serialize)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `StampwerkError` into a `HumanError`.
pub fn humanize_error(err: &StampwerkError) -> HumanError {
    match err {
        StampwerkError::Validation(v) => humanize_validation(v),

        StampwerkError::MalformedDocument(detail) => HumanError {
            message: "This file could not be read as a PDF.".into(),
            suggestion: format!("Open it in a PDF viewer and save a fresh copy, then upload that. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        StampwerkError::Encoding(detail) => HumanError {
            message: "A tracking barcode could not be generated.".into(),
            suggestion: format!("Check the configured prefix uses plain letters and digits only. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        StampwerkError::Serialization(detail) => HumanError {
            message: "Error generating PDF.".into(),
            suggestion: format!("Nothing was saved. Try again in a moment. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
        },

        StampwerkError::Persistence(detail) => HumanError {
            message: "The PDF was generated but could not be recorded.".into(),
            suggestion: format!("Your download is ready; keep a note of the tracking codes. ({detail})"),
            retriable: false,
            severity: Severity::Transient,
        },

        StampwerkError::IntegrityMismatch { .. } => HumanError {
            message: "This file does not match the recorded fingerprint.".into(),
            suggestion: "Download the document again from the original link.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        StampwerkError::Config(detail) => HumanError {
            message: "Stampwerk is misconfigured.".into(),
            suggestion: format!("Fix the configuration file and restart. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        StampwerkError::Io(e) => HumanError {
            message: "A file could not be read or written.".into(),
            suggestion: format!("Check there is free disk space and the data folder is writable. ({e})"),
            retriable: true,
            severity: Severity::Transient,
        },

        StampwerkError::Json(e) => HumanError {
            message: "A settings or record file is corrupted.".into(),
            suggestion: format!("Delete or repair the file and try again. ({e})"),
            retriable: false,
            severity: Severity::Permanent,
        },
    }
}

fn humanize_validation(err: &ValidationError) -> HumanError {
    let (message, suggestion) = match err {
        ValidationError::MissingUpload => (
            "No files were uploaded.".to_owned(),
            "Choose a PDF file and upload it again.".to_owned(),
        ),
        ValidationError::UnsupportedContentType { found } => (
            "Only PDF files are allowed.".to_owned(),
            format!("Save or export the document as PDF first. (File type: {found})"),
        ),
        ValidationError::TooLarge { limit, .. } => (
            format!("File size exceeds the {} limit.", describe_limit(*limit)),
            "Split the document into smaller parts and upload them one at a time.".to_owned(),
        ),
        ValidationError::TooManyPages { limit, .. } => (
            format!("The document has more than {limit} pages."),
            "Split the document into smaller parts and upload them one at a time.".to_owned(),
        ),
    };
    HumanError {
        message,
        suggestion,
        retriable: false,
        severity: Severity::Rejected,
    }
}

/// `5MB` for whole mebibytes, otherwise the exact byte count.
fn describe_limit(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{bytes} byte")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_type_is_rejected() {
        let err = StampwerkError::from(ValidationError::UnsupportedContentType {
            found: "image/png".into(),
        });
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Rejected);
        assert_eq!(human.message, "Only PDF files are allowed.");
        assert!(!human.retriable);
    }

    #[test]
    fn size_limit_is_reported_in_megabytes() {
        let err = StampwerkError::from(ValidationError::TooLarge {
            size: 6 * 1024 * 1024,
            limit: 5 * 1024 * 1024,
        });
        assert_eq!(humanize_error(&err).message, "File size exceeds the 5MB limit.");
    }

    #[test]
    fn sub_megabyte_limit_is_reported_in_bytes() {
        let err = StampwerkError::from(ValidationError::TooLarge { size: 17, limit: 16 });
        assert_eq!(humanize_error(&err).message, "File size exceeds the 16 byte limit.");

        let err = StampwerkError::from(ValidationError::TooLarge {
            size: 2_000_000,
            limit: 1_500_000,
        });
        assert_eq!(
            humanize_error(&err).message,
            "File size exceeds the 1500000 byte limit."
        );
    }

    #[test]
    fn serialization_is_transient() {
        let human = humanize_error(&StampwerkError::Serialization("disk full".into()));
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.retriable);
        assert!(human.suggestion.contains("disk full"));
    }

    #[test]
    fn malformed_is_permanent() {
        let human = humanize_error(&StampwerkError::MalformedDocument("no trailer".into()));
        assert_eq!(human.severity, Severity::Permanent);
    }
}
