// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Barcode encoder: rasterises a Code 128 symbol (plus its human-readable
// text) into a grayscale image using the `image` and `imageproc` crates.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use stampwerk_core::config::BarcodeSettings;
use stampwerk_core::error::{Result, StampwerkError};
use stampwerk_core::types::mm_to_pt;
use tracing::{debug, instrument};

use super::code128;
use super::glyphs::{self, GLYPH_ADVANCE, GLYPH_HEIGHT};

const INK: Luma<u8> = Luma([0]);
const PAPER: Luma<u8> = Luma([255]);

/// Turns identifier strings into barcode images.
///
/// Stateless apart from its settings; safe to share between threads.
#[derive(Debug, Clone)]
pub struct BarcodeEncoder {
    settings: BarcodeSettings,
}

impl Default for BarcodeEncoder {
    fn default() -> Self {
        Self::new(BarcodeSettings::default())
    }
}

impl BarcodeEncoder {
    pub fn new(settings: BarcodeSettings) -> Self {
        Self { settings }
    }

    /// Bar height in pixels after magnification.
    fn bar_height_px(&self) -> u32 {
        let points = mm_to_pt(self.settings.bar_height_mm);
        ((points * self.settings.scale as f32).round() as u32).max(1)
    }

    /// Encode `text` as a Code 128 barcode image.
    ///
    /// Fails with `StampwerkError::Encoding` when `text` contains characters
    /// outside printable ASCII.
    #[instrument(skip(self), fields(scale = self.settings.scale))]
    pub fn encode(&self, text: &str) -> Result<BarcodeImage> {
        let modules = code128::encode_modules(text)?;
        let scale = self.settings.scale.max(1);
        let quiet = self.settings.quiet_zone_modules;

        let width = (modules.len() as u32 + 2 * quiet) * scale;
        let bar_height = self.bar_height_px();

        // Shrink the text until it fits under the bars.
        let mut text_scale = scale;
        while text_scale > 1 && glyphs::text_width(text, text_scale) > width {
            text_scale -= 1;
        }
        let text_gap = 2 * text_scale;
        let height = if self.settings.include_text {
            bar_height + text_gap + GLYPH_HEIGHT * text_scale + text_gap
        } else {
            bar_height
        };

        let mut image = GrayImage::from_pixel(width, height, PAPER);

        // Draw each run of dark modules as one rectangle.
        let mut x = quiet * scale;
        let mut index = 0;
        while index < modules.len() {
            let dark = modules[index];
            let run = modules[index..].iter().take_while(|&&m| m == dark).count();
            let run_px = run as u32 * scale;
            if dark {
                draw_filled_rect_mut(
                    &mut image,
                    Rect::at(x as i32, 0).of_size(run_px, bar_height),
                    INK,
                );
            }
            x += run_px;
            index += run;
        }

        if self.settings.include_text {
            let text_x = width.saturating_sub(glyphs::text_width(text, text_scale)) / 2;
            draw_text(&mut image, text, text_x, bar_height + text_gap, text_scale);
        }

        debug!(width, height, modules = modules.len(), "barcode rasterised");

        Ok(BarcodeImage {
            text: text.to_owned(),
            image,
            bar_height,
        })
    }
}

/// Draw `text` with the built-in bitmap font, top-left at (`x`, `y`).
fn draw_text(image: &mut GrayImage, text: &str, x: u32, y: u32, scale: u32) {
    for (i, ch) in text.chars().enumerate() {
        let origin_x = x + i as u32 * GLYPH_ADVANCE * scale;
        for (row, bits) in glyphs::glyph(ch).iter().enumerate() {
            for col in 0..glyphs::GLYPH_WIDTH {
                if bits & (0x10 >> col) != 0 {
                    draw_filled_rect_mut(
                        image,
                        Rect::at(
                            (origin_x + col * scale) as i32,
                            (y + row as u32 * scale) as i32,
                        )
                        .of_size(scale, scale),
                        INK,
                    );
                }
            }
        }
    }
}

/// A rasterised barcode together with the text it encodes.
#[derive(Debug, Clone, PartialEq)]
pub struct BarcodeImage {
    text: String,
    image: GrayImage,
    bar_height: u32,
}

impl BarcodeImage {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Height of the bar area in pixels (the text line sits below it).
    pub fn bar_height(&self) -> u32 {
        self.bar_height
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.image
    }

    /// Scan a row through the middle of the bars and decode it.
    pub fn decode(&self) -> Result<String> {
        let y = self.bar_height / 2;
        let row: Vec<bool> = (0..self.image.width())
            .map(|x| self.image.get_pixel(x, y).0[0] < 128)
            .collect();
        code128::decode_row(&row)
    }

    /// Encode as PNG.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(self.image.clone())
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(|err| StampwerkError::Encoding(format!("failed to encode PNG: {err}")))?;
        Ok(buf.into_inner())
    }
}
