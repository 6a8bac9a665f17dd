// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Barcode module: Code 128 symbology and rasterisation.

pub mod code128;
pub mod encoder;
mod glyphs;

pub use encoder::{BarcodeEncoder, BarcodeImage};
