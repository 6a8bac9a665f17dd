// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document assembler: drives the whole stamping pipeline for one upload:
//
//   parse -> per page (identifier -> barcode -> compose) -> summary -> serialise
//
// Everything happens in memory. The assembler never writes files, so a
// failure at any step leaves nothing behind for collaborators to see.

use std::sync::Arc;

use lopdf::Document;
use serde::Serialize;
use stampwerk_core::StampConfig;
use stampwerk_core::error::{Result, StampwerkError, ValidationError};
use stampwerk_core::sequence::IdentifierGenerator;
use stampwerk_core::types::{ContentIdentifier, RunId};
use tracing::{debug, info, instrument};

use crate::barcode::BarcodeEncoder;
use crate::pdf::compositor::{AnnotatedPage, PageCompositor};
use crate::pdf::reader::{self, SourceDocument};
use crate::pdf::summary::{SummaryBuilder, SummaryPage};

/// Limits and switches that apply to every assembly.
#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    pub max_pages: usize,
    pub compress_output: bool,
    pub verify_barcodes: bool,
}

impl From<&StampConfig> for AssemblyOptions {
    fn from(config: &StampConfig) -> Self {
        Self {
            max_pages: config.max_pages,
            compress_output: config.compress_output,
            verify_barcodes: config.verify_barcodes,
        }
    }
}

/// Result of one successful assembly.
#[derive(Debug, Clone, Serialize)]
pub struct AssembledDocument {
    /// The serialised output PDF.
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// Identifiers in issuance (page) order.
    pub identifiers: Vec<ContentIdentifier>,
    pub annotated: Vec<AnnotatedPage>,
    pub summary: SummaryPage,
}

impl AssembledDocument {
    /// Pages in the output: every stamped page plus the summary page.
    pub fn page_count(&self) -> usize {
        self.annotated.len() + 1
    }

    /// Sequence number of the last identifier issued for this document.
    pub fn last_sequence(&self) -> Option<u64> {
        self.identifiers.last().map(|id| id.sequence)
    }

    /// Output file name: `generated_{lastSequence}.pdf`, or
    /// `generated_empty_{run}.pdf` when no identifier was issued.
    pub fn output_file_name(&self, run_id: RunId) -> String {
        match self.last_sequence() {
            Some(sequence) => format!("generated_{sequence}.pdf"),
            None => format!("generated_empty_{run_id}.pdf"),
        }
    }
}

/// Stamps uploaded PDFs. Shareable across threads; the only shared mutable
/// state is the identifier generator's counter.
pub struct DocumentAssembler {
    generator: Arc<IdentifierGenerator>,
    encoder: BarcodeEncoder,
    compositor: PageCompositor,
    summary: SummaryBuilder,
    options: AssemblyOptions,
}

impl DocumentAssembler {
    pub fn new(
        generator: Arc<IdentifierGenerator>,
        encoder: BarcodeEncoder,
        compositor: PageCompositor,
        summary: SummaryBuilder,
        options: AssemblyOptions,
    ) -> Self {
        Self {
            generator,
            encoder,
            compositor,
            summary,
            options,
        }
    }

    /// Wire every stage from a configuration.
    pub fn from_config(generator: Arc<IdentifierGenerator>, config: &StampConfig) -> Self {
        Self::new(
            generator,
            BarcodeEncoder::new(config.barcode.clone()),
            PageCompositor::new(config.overlay.clone()),
            SummaryBuilder::new(config.summary.clone()),
            AssemblyOptions::from(config),
        )
    }

    pub fn generator(&self) -> &Arc<IdentifierGenerator> {
        &self.generator
    }

    /// Stamp every page of `source`, append the summary page, and serialise.
    #[instrument(skip_all, fields(bytes_len = source.len()))]
    pub fn assemble(&self, source: &[u8]) -> Result<AssembledDocument> {
        let source = SourceDocument::from_bytes(source)?;

        let page_count = source.page_count();
        if page_count > self.options.max_pages {
            return Err(ValidationError::TooManyPages {
                pages: page_count,
                limit: self.options.max_pages,
            }
            .into());
        }
        info!(pages = page_count, "assembling stamped document");

        let mut output: Document = source.document().clone();
        let font = self.compositor.install_font(&mut output);

        let mut identifiers = Vec::with_capacity(page_count);
        let mut annotated = Vec::with_capacity(page_count);
        for (page_number, page_id) in source.pages() {
            let identifier = self.generator.next();
            let text = identifier.to_string();

            let barcode = self.encoder.encode(&text)?;
            if self.options.verify_barcodes {
                let decoded = barcode.decode()?;
                if decoded != text {
                    return Err(StampwerkError::Encoding(format!(
                        "barcode for {text} decodes as {decoded}"
                    )));
                }
            }

            annotated.push(self.compositor.compose(
                &mut output,
                &font,
                page_number,
                page_id,
                &identifier,
                &barcode,
            )?);
            identifiers.push(identifier);
        }

        let summary = self.summary.build(&identifiers);
        let summary_pdf = Document::load_mem(&summary.render()).map_err(|err| {
            StampwerkError::Serialization(format!("summary page unreadable: {err}"))
        })?;
        let summary_page_id = summary_pdf
            .get_pages()
            .values()
            .next()
            .copied()
            .ok_or_else(|| StampwerkError::Serialization("summary page missing".into()))?;
        reader::append_page(&summary_pdf, &mut output, summary_page_id)?;

        if self.options.compress_output {
            output.compress();
        }

        let mut bytes = Vec::new();
        output.save_to(&mut bytes).map_err(|err| {
            StampwerkError::Serialization(format!("failed to serialise output PDF: {err}"))
        })?;

        debug!(output_bytes = bytes.len(), "output serialised");
        info!(
            pages = page_count,
            first = identifiers.first().map(ToString::to_string),
            last = identifiers.last().map(ToString::to_string),
            "document assembled"
        );

        Ok(AssembledDocument {
            bytes,
            identifiers,
            annotated,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use lopdf::content::Content;
    use stampwerk_core::sequence::FixedClock;
    use stampwerk_core::types::BLANK_MARKER;

    use super::*;
    use crate::pdf::reader::tests::sample_pdf;

    fn assembler_at(first_sequence: u64) -> DocumentAssembler {
        let clock = Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()));
        let generator = Arc::new(IdentifierGenerator::with_clock("CXM", first_sequence, clock));
        DocumentAssembler::from_config(generator, &StampConfig::default())
    }

    fn page_texts(doc: &Document, page_number: u32) -> Vec<String> {
        let page_id = doc.get_pages()[&page_number];
        Content::decode(&doc.get_page_content(page_id).unwrap())
            .unwrap()
            .operations
            .into_iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| {
                op.operands
                    .first()
                    .and_then(|o| o.as_str().ok())
                    .map(|s| String::from_utf8_lossy(s).into_owned())
            })
            .collect()
    }

    #[test]
    fn three_page_scenario() {
        let assembler = assembler_at(1);
        let result = assembler.assemble(&sample_pdf(3)).unwrap();

        let codes: Vec<String> = result.identifiers.iter().map(ToString::to_string).collect();
        assert_eq!(codes, ["CXM-061524-00001", "CXM-061524-00002", "CXM-061524-00003"]);

        let output = Document::load_mem(&result.bytes).unwrap();
        assert_eq!(output.get_pages().len(), 4);
        assert_eq!(result.page_count(), 4);

        let rows: Vec<String> = result.summary.rows().iter().map(|r| r.identifier.to_string()).collect();
        assert_eq!(rows, codes);
        assert_eq!(result.output_file_name(RunId::new()), "generated_3.pdf");
    }

    #[test]
    fn summary_rows_match_page_overlays_in_order() {
        let assembler = assembler_at(1);
        let result = assembler.assemble(&sample_pdf(4)).unwrap();
        let output = Document::load_mem(&result.bytes).unwrap();

        for (index, row) in result.summary.rows().iter().enumerate() {
            let page_number = index as u32 + 1;
            let expected = format!("Barcode: {}", row.identifier);
            let texts = page_texts(&output, page_number);
            assert_eq!(texts.iter().filter(|t| **t == expected).count(), 1, "page {page_number}");
            // Original text is still there, ahead of the overlay.
            assert_eq!(texts[0], format!("Original page {page_number}"));
            assert_eq!(result.annotated[index].identifier, row.identifier);
            assert_eq!(result.annotated[index].page_number, page_number);
        }
    }

    #[test]
    fn appended_summary_page_lists_codes_in_issuance_order() {
        let assembler = assembler_at(1);
        let result = assembler.assemble(&sample_pdf(3)).unwrap();
        let output = Document::load_mem(&result.bytes).unwrap();

        let last_page = output.get_pages().len() as u32;
        let summary_id = output.get_pages()[&last_page];
        assert!(output.get_dictionary(summary_id).unwrap().has(b"Resources"));

        let mut expected = vec!["Summary Table", "Barcode Name", "Completed", "Posted"];
        for code in ["CXM-061524-00001", "CXM-061524-00002", "CXM-061524-00003"] {
            expected.extend([code, BLANK_MARKER, BLANK_MARKER]);
        }
        assert_eq!(page_texts(&output, last_page), expected);
    }

    #[test]
    fn zero_pages_yield_only_the_summary() {
        let assembler = assembler_at(1);
        let result = assembler.assemble(&sample_pdf(0)).unwrap();

        assert!(result.identifiers.is_empty());
        assert!(result.summary.rows().is_empty());
        let output = Document::load_mem(&result.bytes).unwrap();
        assert_eq!(output.get_pages().len(), 1);
        assert_eq!(
            page_texts(&output, 1),
            ["Summary Table", "Barcode Name", "Completed", "Posted"]
        );
        assert_eq!(assembler.generator().last_issued(), 0);

        let run_id = RunId::new();
        assert_eq!(result.output_file_name(run_id), format!("generated_empty_{run_id}.pdf"));
    }

    #[test]
    fn consecutive_runs_continue_the_sequence() {
        let assembler = assembler_at(1);
        assembler.assemble(&sample_pdf(2)).unwrap();
        let second = assembler.assemble(&sample_pdf(2)).unwrap();
        let sequences: Vec<u64> = second.identifiers.iter().map(|id| id.sequence).collect();
        assert_eq!(sequences, [3, 4]);
        assert_eq!(second.output_file_name(RunId::new()), "generated_4.pdf");
    }

    #[test]
    fn malformed_input_issues_nothing() {
        let assembler = assembler_at(1);
        let err = assembler.assemble(b"%PDF-1.4 truncated").err().unwrap();
        assert!(matches!(err, StampwerkError::MalformedDocument(_)));
        assert_eq!(assembler.generator().last_issued(), 0);
    }

    #[test]
    fn too_many_pages_is_rejected_before_issuing() {
        let clock = Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()));
        let generator = Arc::new(IdentifierGenerator::with_clock("CXM", 1, clock));
        let config = StampConfig {
            max_pages: 2,
            ..StampConfig::default()
        };
        let assembler = DocumentAssembler::from_config(generator, &config);

        let err = assembler.assemble(&sample_pdf(3)).err().unwrap();
        assert!(matches!(
            err,
            StampwerkError::Validation(ValidationError::TooManyPages { pages: 3, limit: 2 })
        ));
        assert_eq!(assembler.generator().peek_next(), 1);
    }

    #[test]
    fn unencodable_prefix_aborts_the_run() {
        let clock = Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()));
        let generator = Arc::new(IdentifierGenerator::with_clock("CX\u{d6}", 1, clock));
        let assembler = DocumentAssembler::from_config(generator, &StampConfig::default());

        let err = assembler.assemble(&sample_pdf(1)).err().unwrap();
        assert!(matches!(err, StampwerkError::Encoding(_)));
    }

    #[test]
    fn uncompressed_output_also_loads() {
        let clock = Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()));
        let generator = Arc::new(IdentifierGenerator::with_clock("CXM", 1, clock));
        let config = StampConfig {
            compress_output: false,
            verify_barcodes: false,
            ..StampConfig::default()
        };
        let assembler = DocumentAssembler::from_config(generator, &config);
        let result = assembler.assemble(&sample_pdf(2)).unwrap();
        let output = Document::load_mem(&result.bytes).unwrap();
        assert_eq!(output.get_pages().len(), 3);
        assert_eq!(page_texts(&output, 2)[1], "Barcode: CXM-061524-00002");
    }

    #[test]
    fn concurrent_assemblies_never_share_identifiers() {
        let assembler = Arc::new(assembler_at(1));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let assembler = Arc::clone(&assembler);
                std::thread::spawn(move || assembler.assemble(&sample_pdf(3)).unwrap().identifiers)
            })
            .collect();

        let mut sequences: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .map(|id| id.sequence)
            .collect();
        sequences.sort_unstable();
        assert_eq!(sequences, (1..=12).collect::<Vec<_>>());
    }
}
