// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page compositor: stamps one page with its barcode image, identifier text,
// and date.
//
// Geometry uses the page's own coordinate system (origin bottom-left) and is
// anchored on the top-left corner of the media box with fixed offsets, so a
// very small page may clip the overlay. The original content streams are
// wrapped in `q ... Q` and left untouched; the overlay is appended as a new
// content stream with its own graphics state.

use std::fmt::Write as _;

use chrono::NaiveDate;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use serde::Serialize;
use stampwerk_core::config::OverlayLayout;
use stampwerk_core::error::{Result, StampwerkError};
use stampwerk_core::types::ContentIdentifier;
use tracing::{debug, instrument, warn};

use super::reader;
use crate::barcode::BarcodeImage;

const IMAGE_RESOURCE: &str = "StwBarcode";
const FONT_RESOURCE: &str = "StwHelv";
const FALLBACK_DATE_FORMAT: &str = "%m/%d/%Y";

/// A rectangle in page space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoxPlacement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One line of overlay text; `y` is the baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextLine {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub text: String,
}

/// Where every overlay element of one page goes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayPlacement {
    /// `[left, bottom, right, top]` of the page the placement was computed for.
    pub media_box: [f32; 4],
    pub barcode: BoxPlacement,
    pub code_line: TextLine,
    pub date_line: TextLine,
}

impl OverlayPlacement {
    /// Whether any part of the overlay falls outside the media box.
    pub fn is_clipped(&self) -> bool {
        let [left, bottom, right, top] = self.media_box;
        let lowest = self.barcode.y.min(self.date_line.y);
        self.barcode.x < left
            || self.barcode.x + self.barcode.width > right
            || self.barcode.y + self.barcode.height > top
            || lowest < bottom
    }
}

/// One stamped output page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedPage {
    /// 1-indexed position in the output document.
    pub page_number: u32,
    pub identifier: ContentIdentifier,
    pub placement: OverlayPlacement,
}

/// Handle to the overlay font object installed in an output document.
#[derive(Debug, Clone, Copy)]
pub struct OverlayFont {
    id: ObjectId,
}

/// Draws the per-page overlay.
#[derive(Debug, Clone, Default)]
pub struct PageCompositor {
    layout: OverlayLayout,
}

impl PageCompositor {
    pub fn new(layout: OverlayLayout) -> Self {
        Self { layout }
    }

    /// Compute the overlay placement for a page. Pure and deterministic.
    pub fn layout(&self, media_box: [f32; 4], identifier: &ContentIdentifier) -> OverlayPlacement {
        let [left, _, _, top] = media_box;
        let l = &self.layout;
        let x = left + l.left;

        OverlayPlacement {
            media_box,
            barcode: BoxPlacement {
                x,
                y: top - l.barcode_top_offset,
                width: l.barcode_width,
                height: l.barcode_height,
            },
            code_line: TextLine {
                x,
                y: top - l.code_text_offset,
                size: l.font_size,
                text: format!("{}{}", l.code_label, identifier),
            },
            date_line: TextLine {
                x,
                y: top - l.date_text_offset,
                size: l.font_size,
                text: format!(
                    "{}{}",
                    l.date_label,
                    format_date(identifier.issued_on, &l.date_format)
                ),
            },
        }
    }

    /// Content stream operations drawing `placement`, given the resource
    /// names the image and font were registered under.
    ///
    /// The leading `Q` closes the `q` inserted before the original content.
    pub fn overlay_operations(
        &self,
        placement: &OverlayPlacement,
        image_name: &str,
        font_name: &str,
    ) -> Vec<Operation> {
        let b = &placement.barcode;
        let mut ops = vec![
            Operation::new("Q", vec![]),
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    b.width.into(),
                    0.into(),
                    0.into(),
                    b.height.into(),
                    b.x.into(),
                    b.y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(image_name.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ];
        for line in [&placement.code_line, &placement.date_line] {
            ops.extend([
                Operation::new("BT", vec![]),
                Operation::new("g", vec![0.into()]),
                Operation::new(
                    "Tf",
                    vec![Object::Name(font_name.as_bytes().to_vec()), line.size.into()],
                ),
                Operation::new("Td", vec![line.x.into(), line.y.into()]),
                Operation::new("Tj", vec![Object::string_literal(line.text.as_str())]),
                Operation::new("ET", vec![]),
            ]);
        }
        ops
    }

    /// Add the overlay font (Helvetica, WinAnsi) to `doc` once per document.
    pub fn install_font(&self, doc: &mut Document) -> OverlayFont {
        let id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        OverlayFont { id }
    }

    /// Stamp page `page_id` of `doc` with `identifier` and its barcode.
    #[instrument(skip(self, doc, font, barcode), fields(%identifier))]
    pub fn compose(
        &self,
        doc: &mut Document,
        font: &OverlayFont,
        page_number: u32,
        page_id: ObjectId,
        identifier: &ContentIdentifier,
        barcode: &BarcodeImage,
    ) -> Result<AnnotatedPage> {
        let placement = self.layout(reader::media_box(doc, page_id), identifier);
        if placement.is_clipped() {
            warn!(page_number, "page is smaller than the overlay; stamp will be clipped");
        }

        let gray = barcode.as_gray();
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(gray.width()),
                "Height" => i64::from(gray.height()),
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            gray.as_raw().clone(),
        ));

        let mut resources = reader::owned_resources(doc, page_id);
        let image_name = insert_resource(&mut resources, "XObject", IMAGE_RESOURCE, image_id);
        let font_name = insert_resource(&mut resources, "Font", FONT_RESOURCE, font.id);

        let overlay = Content {
            operations: self.overlay_operations(&placement, &image_name, &font_name),
        };
        // Separate from whatever the last original stream ends with.
        let mut overlay_bytes = b"\n".to_vec();
        overlay_bytes.extend(overlay.encode().map_err(|err| {
            StampwerkError::Serialization(format!("failed to encode overlay: {err}"))
        })?);

        let open_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
        let overlay_id = doc.add_object(Stream::new(dictionary! {}, overlay_bytes));

        let mut contents = vec![Object::Reference(open_id)];
        contents.extend(reader::content_references(doc, page_id));
        contents.push(Object::Reference(overlay_id));

        let page = doc.get_dictionary_mut(page_id).map_err(|err| {
            StampwerkError::Serialization(format!("page {page_number} unreadable: {err}"))
        })?;
        page.set("Resources", resources);
        page.set("Contents", contents);

        debug!(page_number, barcode = ?placement.barcode, "page stamped");

        Ok(AnnotatedPage {
            page_number,
            identifier: identifier.clone(),
            placement,
        })
    }
}

/// Register `id` under `category` with a name not already in use.
fn insert_resource(resources: &mut Dictionary, category: &str, base: &str, id: ObjectId) -> String {
    let mut entries = match resources.get(category.as_bytes()) {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };

    let mut name = base.to_owned();
    let mut n = 1;
    while entries.has(name.as_bytes()) {
        n += 1;
        name = format!("{base}{n}");
    }

    entries.set(name.clone(), id);
    resources.set(category, entries);
    name
}

/// Format `date`, falling back to `MM/DD/YYYY` if the pattern is invalid.
fn format_date(date: NaiveDate, pattern: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", date.format(pattern)).is_err() {
        warn!(pattern, "invalid date format, using default");
        out.clear();
        let _ = write!(out, "{}", date.format(FALLBACK_DATE_FORMAT));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barcode::BarcodeEncoder;
    use crate::pdf::reader::tests::{sample_pdf, sample_pdf_sized};

    fn identifier(sequence: u64) -> ContentIdentifier {
        ContentIdentifier::new("CXM", NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(), sequence)
    }

    fn text_operands(doc: &Document, page_id: ObjectId) -> Vec<String> {
        let bytes = doc.get_page_content(page_id).unwrap();
        Content::decode(&bytes)
            .unwrap()
            .operations
            .into_iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| op.operands.first().and_then(|o| o.as_str().ok()).map(|s| String::from_utf8_lossy(s).into_owned()))
            .collect()
    }

    fn stamp_first_page(bytes: &[u8]) -> (Document, ObjectId, AnnotatedPage) {
        let mut doc = Document::load_mem(bytes).unwrap();
        let page_id = doc.get_pages()[&1];
        let compositor = PageCompositor::default();
        let font = compositor.install_font(&mut doc);
        let id = identifier(1);
        let barcode = BarcodeEncoder::default().encode(&id.to_string()).unwrap();
        let annotated = compositor
            .compose(&mut doc, &font, 1, page_id, &id, &barcode)
            .unwrap();
        (doc, page_id, annotated)
    }

    #[test]
    fn layout_uses_fixed_offsets_from_top_left() {
        let placement = PageCompositor::default().layout([0.0, 0.0, 612.0, 792.0], &identifier(1));
        assert_eq!(
            placement.barcode,
            BoxPlacement { x: 20.0, y: 712.0, width: 100.0, height: 50.0 }
        );
        assert_eq!(placement.code_line.y, 702.0);
        assert_eq!(placement.date_line.y, 682.0);
        assert_eq!(placement.code_line.text, "Barcode: CXM-061524-00001");
        assert_eq!(placement.date_line.text, "Date: 06/15/2024");
        assert!(!placement.is_clipped());
    }

    #[test]
    fn layout_respects_media_box_origin() {
        let placement =
            PageCompositor::default().layout([100.0, 50.0, 712.0, 842.0], &identifier(1));
        assert_eq!(placement.barcode.x, 120.0);
        assert_eq!(placement.barcode.y, 762.0);
    }

    #[test]
    fn layout_is_deterministic() {
        let compositor = PageCompositor::default();
        let a = compositor.layout([0.0, 0.0, 595.0, 842.0], &identifier(7));
        let b = compositor.layout([0.0, 0.0, 595.0, 842.0], &identifier(7));
        assert_eq!(a, b);
        let ops_a = Content { operations: compositor.overlay_operations(&a, "I", "F") }.encode().unwrap();
        let ops_b = Content { operations: compositor.overlay_operations(&b, "I", "F") }.encode().unwrap();
        assert_eq!(ops_a, ops_b);
    }

    #[test]
    fn composing_twice_places_overlay_identically() {
        let bytes = sample_pdf(1);
        let (_, _, first) = stamp_first_page(&bytes);
        let (_, _, second) = stamp_first_page(&bytes);
        assert_eq!(first, second);
    }

    #[test]
    fn small_pages_clip_without_error() {
        let (_, _, annotated) = stamp_first_page(&sample_pdf_sized(1, 60.0, 60.0));
        assert!(annotated.placement.is_clipped());
        assert!(annotated.placement.barcode.y < 0.0);
    }

    #[test]
    fn original_content_is_kept_and_wrapped() {
        let bytes = sample_pdf(1);
        let original = Document::load_mem(&bytes).unwrap();
        let references = |doc: &Document, page_id| -> Vec<ObjectId> {
            reader::content_references(doc, page_id)
                .iter()
                .map(|o| o.as_reference().unwrap())
                .collect()
        };
        let original_contents = references(&original, original.get_pages()[&1]);

        let (doc, page_id, _) = stamp_first_page(&bytes);
        let contents = references(&doc, page_id);
        assert_eq!(contents.len(), original_contents.len() + 2);
        assert_eq!(&contents[1..contents.len() - 1], &original_contents[..]);

        let texts = text_operands(&doc, page_id);
        assert_eq!(
            texts,
            vec![
                "Original page 1".to_owned(),
                "Barcode: CXM-061524-00001".to_owned(),
                "Date: 06/15/2024".to_owned(),
            ]
        );

        let operators: Vec<String> = Content::decode(&doc.get_page_content(page_id).unwrap())
            .unwrap()
            .operations
            .into_iter()
            .map(|op| op.operator)
            .collect();
        assert_eq!(operators.first().map(String::as_str), Some("q"));
        let q = operators.iter().filter(|o| *o == "q").count();
        let big_q = operators.iter().filter(|o| *o == "Q").count();
        assert_eq!(q, big_q);
    }

    #[test]
    fn resources_gain_image_and_font() {
        let (doc, page_id, _) = stamp_first_page(&sample_pdf(1));
        let page = doc.get_dictionary(page_id).unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
        assert!(xobjects.has(IMAGE_RESOURCE.as_bytes()));
        assert!(fonts.has(FONT_RESOURCE.as_bytes()));
        // The page's own font survives.
        assert!(fonts.has(b"F1"));

        let image_id = xobjects.get(IMAGE_RESOURCE.as_bytes()).unwrap().as_reference().unwrap();
        let image = doc.get_object(image_id).unwrap().as_stream().unwrap();
        assert_eq!(image.dict.get(b"Subtype").unwrap().as_name().unwrap(), b"Image");
    }

    #[test]
    fn resource_names_do_not_collide() {
        let mut resources = Dictionary::new();
        let taken = insert_resource(&mut resources, "XObject", IMAGE_RESOURCE, (1, 0));
        let fresh = insert_resource(&mut resources, "XObject", IMAGE_RESOURCE, (2, 0));
        assert_eq!(taken, "StwBarcode");
        assert_eq!(fresh, "StwBarcode2");
    }

    #[test]
    fn bad_date_format_falls_back() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert_eq!(format_date(date, "%Q"), "06/15/2024");
        assert_eq!(format_date(date, "%Y-%m-%d"), "2024-06-15");
    }
}
