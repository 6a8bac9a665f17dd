// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: reading source documents, stamping pages, and building the
// summary page.

pub mod compositor;
pub mod reader;
pub mod summary;

pub use compositor::{AnnotatedPage, OverlayPlacement, PageCompositor};
pub use reader::SourceDocument;
pub use summary::{SummaryBuilder, SummaryPage};
