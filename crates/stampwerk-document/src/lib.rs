// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// stampwerk-document: The document annotation pipeline.
//
// Provides the Code 128 barcode encoder, the page compositor that stamps each
// page with its tracking code and date, the summary page builder, and the
// assembler that drives them over an uploaded PDF.

pub mod assembler;
pub mod barcode;
pub mod pdf;

// Re-export the primary structs so callers can use `stampwerk_document::DocumentAssembler` etc.
pub use assembler::{AssembledDocument, AssemblyOptions, DocumentAssembler};
pub use barcode::{BarcodeEncoder, BarcodeImage};
pub use pdf::compositor::PageCompositor;
pub use pdf::reader::SourceDocument;
pub use pdf::summary::{SummaryBuilder, SummaryPage};
