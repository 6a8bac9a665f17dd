// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StampwerkError};
use crate::types::PaperSize;

/// File name of the persisted configuration inside the data directory.
pub const CONFIG_FILE: &str = "stampwerk.json";

/// Persistent application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StampConfig {
    /// Fixed identifier prefix (the `CXM` in `CXM-061524-00001`).
    pub prefix: String,
    /// Largest accepted upload in bytes (default 5 MiB).
    pub max_upload_bytes: u64,
    /// Largest accepted page count.
    pub max_pages: usize,
    /// Store the last issued sequence number so identifiers survive restarts.
    pub persist_sequence: bool,
    /// Flate-compress content streams in the output document.
    pub compress_output: bool,
    /// Decode every generated barcode and compare it with its identifier.
    pub verify_barcodes: bool,
    pub barcode: BarcodeSettings,
    pub overlay: OverlayLayout,
    pub summary: SummaryLayout,
}

impl Default for StampConfig {
    fn default() -> Self {
        Self {
            prefix: "CXM".to_owned(),
            max_upload_bytes: 5 * 1024 * 1024,
            max_pages: 500,
            persist_sequence: true,
            compress_output: true,
            verify_barcodes: true,
            barcode: BarcodeSettings::default(),
            overlay: OverlayLayout::default(),
            summary: SummaryLayout::default(),
        }
    }
}

impl StampConfig {
    /// Load `stampwerk.json` from `dir`, returning `None` when the file is
    /// absent or unreadable.
    pub fn load(dir: &Path) -> Option<Self> {
        let path = dir.join(CONFIG_FILE);
        let data = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&data) {
            Ok(config) => Some(config),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "ignoring unreadable config");
                None
            }
        }
    }

    /// Write the configuration as pretty JSON into `dir`.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        self.validate()?;
        let path = dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() || !self.prefix.bytes().all(|b| (0x21..=0x7e).contains(&b)) {
            return Err(StampwerkError::Config(format!(
                "prefix {:?} must be non-empty printable ASCII without spaces",
                self.prefix
            )));
        }
        if self.max_upload_bytes == 0 {
            return Err(StampwerkError::Config("max_upload_bytes must be positive".into()));
        }
        if self.barcode.scale == 0 {
            return Err(StampwerkError::Config("barcode scale must be at least 1".into()));
        }
        if self.summary.row_height <= 0.0 {
            return Err(StampwerkError::Config("summary row_height must be positive".into()));
        }
        Ok(())
    }
}

/// Raster settings for generated barcodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarcodeSettings {
    /// Pixels per barcode module.
    pub scale: u32,
    /// Bar height in millimetres, measured at 72 dpi before scaling.
    pub bar_height_mm: f32,
    /// Blank modules on each side of the symbol.
    pub quiet_zone_modules: u32,
    /// Draw the encoded text underneath the bars.
    pub include_text: bool,
}

impl Default for BarcodeSettings {
    fn default() -> Self {
        Self {
            scale: 3,
            bar_height_mm: 10.0,
            quiet_zone_modules: 10,
            include_text: true,
        }
    }
}

/// Placement of the per-page overlay, in points from the page's top-left
/// corner. Offsets are absolute, so small pages may clip the overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayLayout {
    pub left: f32,
    /// Distance from the top edge down to the bottom of the barcode box.
    pub barcode_top_offset: f32,
    pub barcode_width: f32,
    pub barcode_height: f32,
    /// Distance from the top edge down to the code text baseline.
    pub code_text_offset: f32,
    /// Distance from the top edge down to the date text baseline.
    pub date_text_offset: f32,
    pub font_size: f32,
    pub code_label: String,
    pub date_label: String,
    /// `chrono` format string for the date line.
    pub date_format: String,
}

impl Default for OverlayLayout {
    fn default() -> Self {
        Self {
            left: 20.0,
            barcode_top_offset: 80.0,
            barcode_width: 100.0,
            barcode_height: 50.0,
            code_text_offset: 90.0,
            date_text_offset: 110.0,
            font_size: 12.0,
            code_label: "Barcode: ".to_owned(),
            date_label: "Date: ".to_owned(),
            date_format: "%m/%d/%Y".to_owned(),
        }
    }
}

/// Geometry of the trailing summary page, in points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryLayout {
    pub paper: PaperSize,
    pub title: String,
    pub title_size: f32,
    pub title_offset: f32,
    pub header_offset: f32,
    pub font_size: f32,
    pub row_height: f32,
    /// x positions of the three columns.
    pub columns: [f32; 3],
    pub headers: [String; 3],
    /// Rows whose baseline falls below this height are off the printable
    /// area. They are still drawn; a warning is logged.
    pub bottom_margin: f32,
}

impl Default for SummaryLayout {
    fn default() -> Self {
        Self {
            paper: PaperSize::A4,
            title: "Summary Table".to_owned(),
            title_size: 16.0,
            title_offset: 50.0,
            header_offset: 80.0,
            font_size: 12.0,
            row_height: 20.0,
            columns: [50.0, 250.0, 400.0],
            headers: [
                "Barcode Name".to_owned(),
                "Completed".to_owned(),
                "Posted".to_owned(),
            ],
            bottom_margin: 20.0,
        }
    }
}
