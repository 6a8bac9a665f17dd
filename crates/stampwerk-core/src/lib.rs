// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stampwerk: Core types, configuration, error definitions, and the content
// identifier generator shared across all crates.

pub mod config;
pub mod error;
pub mod human_errors;
pub mod sequence;
pub mod traits;
pub mod types;

pub use config::StampConfig;
pub use error::{StampwerkError, ValidationError};
pub use sequence::IdentifierGenerator;
pub use traits::RecordSink;
pub use types::*;
