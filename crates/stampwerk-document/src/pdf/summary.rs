// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Summary page: the trailing index of every identifier issued in one run,
// rendered with `printpdf` 0.8.
//
// printpdf 0.8 uses a data-oriented API: a page is a `PdfPage` holding a
// `Vec<Op>`, serialised via `PdfDocument::save()`. The assembler loads the
// resulting one-page document with lopdf and appends its page.

use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, TextItem,
};
use serde::Serialize;
use stampwerk_core::config::SummaryLayout;
use stampwerk_core::types::{ContentIdentifier, SummaryRow};
use tracing::{debug, instrument, warn};

/// Builds the summary page model from the identifiers of one run.
#[derive(Debug, Clone, Default)]
pub struct SummaryBuilder {
    layout: SummaryLayout,
}

impl SummaryBuilder {
    pub fn new(layout: SummaryLayout) -> Self {
        Self { layout }
    }

    /// One row per identifier, in the order given. Pure.
    pub fn build(&self, identifiers: &[ContentIdentifier]) -> SummaryPage {
        SummaryPage {
            layout: self.layout.clone(),
            rows: identifiers.iter().cloned().map(SummaryRow::blank).collect(),
        }
    }
}

/// A positioned text element on the summary page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedText {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub text: String,
}

/// The trailing index page: title, three-column header, one row per
/// identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryPage {
    layout: SummaryLayout,
    rows: Vec<SummaryRow>,
}

impl SummaryPage {
    pub fn rows(&self) -> &[SummaryRow] {
        &self.rows
    }

    /// Page height in points.
    fn page_height(&self) -> f32 {
        let (_, h_mm) = self.layout.paper.dimensions_mm();
        Mm(h_mm as f32).into_pt().0
    }

    /// Baseline of row `index` (0-based, below the header).
    pub fn row_baseline(&self, index: usize) -> f32 {
        self.page_height() - self.layout.header_offset - (index as f32 + 1.0) * self.layout.row_height
    }

    /// Rows whose baseline falls below the bottom margin. They are drawn
    /// anyway; the page does not paginate.
    pub fn overflowing_rows(&self) -> usize {
        (0..self.rows.len())
            .filter(|&i| self.row_baseline(i) < self.layout.bottom_margin)
            .count()
    }

    /// Every text element in drawing order: title, headers, then each row's
    /// three cells.
    pub fn placed_text(&self) -> Vec<PlacedText> {
        let l = &self.layout;
        let height = self.page_height();
        let header_y = height - l.header_offset;

        let mut items = Vec::with_capacity(4 + self.rows.len() * 3);
        items.push(PlacedText {
            x: l.columns[0],
            y: height - l.title_offset,
            size: l.title_size,
            text: l.title.clone(),
        });
        for (x, header) in l.columns.iter().zip(&l.headers) {
            items.push(PlacedText {
                x: *x,
                y: header_y,
                size: l.font_size,
                text: header.clone(),
            });
        }
        for (index, row) in self.rows.iter().enumerate() {
            let y = self.row_baseline(index);
            let cells = [row.identifier.to_string(), row.completed.clone(), row.posted.clone()];
            for (x, text) in l.columns.iter().zip(cells) {
                items.push(PlacedText {
                    x: *x,
                    y,
                    size: l.font_size,
                    text,
                });
            }
        }
        items
    }

    /// Render as a standalone one-page PDF.
    #[instrument(skip(self), fields(rows = self.rows.len()))]
    pub fn render(&self) -> Vec<u8> {
        let overflow = self.overflowing_rows();
        if overflow > 0 {
            warn!(overflow, "summary rows run off the bottom of the page");
        }

        let (w_mm, h_mm) = self.layout.paper.dimensions_mm();
        let mut ops: Vec<Op> = Vec::new();
        for item in self.placed_text() {
            ops.push(Op::StartTextSection);
            ops.push(Op::SetTextCursor {
                pos: Point {
                    x: Pt(item.x),
                    y: Pt(item.y),
                },
            });
            ops.push(Op::SetFontSizeBuiltinFont {
                size: Pt(item.size),
                font: BuiltinFont::Helvetica,
            });
            ops.push(Op::WriteTextBuiltinFont {
                items: vec![TextItem::Text(item.text)],
                font: BuiltinFont::Helvetica,
            });
            ops.push(Op::EndTextSection);
        }

        let mut doc = PdfDocument::new(&self.layout.title);
        doc.with_pages(vec![PdfPage::new(Mm(w_mm as f32), Mm(h_mm as f32), ops)]);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);

        debug!(output_bytes = output.len(), warnings = warnings.len(), "summary page rendered");
        output
    }
}
