// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stamp service: the caller side of the pipeline.
//
// Validates uploads, runs the assembler on tokio's blocking pool, writes the
// output atomically into the uploads directory, then records the run.
//
// `Ledger` and `SequenceStore` wrap `rusqlite::Connection`, which is `Send`
// but not `Sync`, so both sit behind `Arc<Mutex<>>`. Every query is a few
// sub-millisecond statements; contention is negligible.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use stampwerk_core::error::{Result, StampwerkError, ValidationError};
use stampwerk_core::sequence::{Clock, IdentifierGenerator, SystemClock};
use stampwerk_core::traits::RecordSink;
use stampwerk_core::types::{BookkeepingRecord, ContentIdentifier, PDF_MIME, RunId, Upload};
use stampwerk_core::StampConfig;
use stampwerk_document::{BarcodeEncoder, DocumentAssembler};
use stampwerk_ledger::{Ledger, SequenceStore, hash_bytes, verify_hash};
use tracing::{error, info, instrument, warn};

use super::data_dir::{self, LEDGER_FILE, UPLOADS_DIR};

/// Confirmation message returned with every successful run.
pub const SUCCESS_MESSAGE: &str = "File uploaded and PDF generated successfully";

/// What the client gets back after a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct StampOutcome {
    pub message: String,
    /// Path the file is served under: `/uploads/{file_name}`.
    pub download_url: String,
    pub output_path: PathBuf,
    pub run_id: RunId,
    pub identifiers: Vec<ContentIdentifier>,
    /// Set when the output was written but could not be recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookkeeping_error: Option<String>,
}

/// Result of re-checking a stored output against its ledger record.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedOutput {
    pub identifier: String,
    pub record: BookkeepingRecord,
    pub output_path: PathBuf,
}

#[derive(Clone)]
pub struct StampService {
    assembler: Arc<DocumentAssembler>,
    ledger: Arc<Mutex<Ledger>>,
    /// `None` when `persist_sequence` is off.
    sequences: Option<Arc<Mutex<SequenceStore>>>,
    uploads_dir: PathBuf,
    config: Arc<StampConfig>,
}

impl StampService {
    /// Open everything under `data_dir`: config, ledger, sequence store, and
    /// the uploads directory.
    #[instrument(skip_all, fields(path = %data_dir.display()))]
    pub fn init(data_dir: &Path) -> Result<Self> {
        let config = StampConfig::load(data_dir).unwrap_or_default();
        let ledger_path = data_dir.join(LEDGER_FILE);
        let ledger = Ledger::open(&ledger_path)?;
        let sequences = if config.persist_sequence {
            Some(SequenceStore::open(&ledger_path)?)
        } else {
            None
        };
        let uploads_dir = data_dir::data_subdir(data_dir, UPLOADS_DIR)?;
        Self::from_parts(config, Arc::new(SystemClock), ledger, sequences, uploads_dir)
    }

    /// Assemble a service from already-open parts. The generator resumes
    /// after the stored high-water mark when a sequence store is given.
    pub fn from_parts(
        config: StampConfig,
        clock: Arc<dyn Clock>,
        ledger: Ledger,
        sequences: Option<SequenceStore>,
        uploads_dir: PathBuf,
    ) -> Result<Self> {
        config.validate()?;

        let last_issued = match &sequences {
            Some(store) => store.load(&config.prefix)?,
            None => 0,
        };
        let generator = Arc::new(IdentifierGenerator::resume_after(
            config.prefix.clone(),
            last_issued,
            clock,
        ));
        let assembler = DocumentAssembler::from_config(generator, &config);

        info!(
            prefix = %config.prefix,
            resume_after = last_issued,
            uploads = %uploads_dir.display(),
            "stamp service initialised"
        );

        Ok(Self {
            assembler: Arc::new(assembler),
            ledger: Arc::new(Mutex::new(ledger)),
            sequences: sequences.map(|s| Arc::new(Mutex::new(s))),
            uploads_dir,
            config: Arc::new(config),
        })
    }

    /// Reject an upload before any parsing or identifier issuance.
    pub fn validate(&self, upload: &Upload) -> Result<()> {
        if upload.bytes.is_empty() {
            return Err(ValidationError::MissingUpload.into());
        }
        let essence = upload
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence != PDF_MIME {
            return Err(ValidationError::UnsupportedContentType {
                found: upload.content_type.clone(),
            }
            .into());
        }
        if upload.size() > self.config.max_upload_bytes {
            return Err(ValidationError::TooLarge {
                size: upload.size(),
                limit: self.config.max_upload_bytes,
            }
            .into());
        }
        Ok(())
    }

    /// Stamp one upload and publish the result in the uploads directory.
    #[instrument(skip_all, fields(file = %upload.file_name, bytes_len = upload.bytes.len()))]
    pub async fn stamp(&self, upload: Upload) -> Result<StampOutcome> {
        if let Err(e) = self.validate(&upload) {
            warn!(error = %e, "upload rejected");
            return Err(e);
        }

        let run_id = RunId::new();
        let assembler = Arc::clone(&self.assembler);
        let source = upload.bytes;
        let assembled = tokio::task::spawn_blocking(move || assembler.assemble(&source))
            .await
            .map_err(|e| StampwerkError::Serialization(format!("assembly task failed: {e}")))?
            .inspect_err(|e| error!(kind = e.kind(), error = %e, "assembly failed"))?;

        // Saved before publishing, so the stored mark is never behind a file
        // already in the uploads directory.
        let mut problems = Vec::new();
        if let Err(e) = self.persist_sequence() {
            problems.push(e.to_string());
        }

        let file_name = assembled.output_file_name(run_id);
        let uploads_dir = self.uploads_dir.clone();
        let target_name = file_name.clone();
        let bytes = assembled.bytes;
        let (output_path, sha256) = tokio::task::spawn_blocking(move || {
            let path = write_output(&uploads_dir, &target_name, &bytes)?;
            Ok::<_, StampwerkError>((path, hash_bytes(&bytes)))
        })
        .await
        .map_err(|e| StampwerkError::Serialization(format!("write task failed: {e}")))??;

        let record = BookkeepingRecord::new(
            run_id,
            assembled.identifiers.clone(),
            file_name.clone(),
            sha256,
        );
        if let Err(e) = self.record(&record) {
            problems.push(e.to_string());
        }
        let bookkeeping_error = if problems.is_empty() {
            None
        } else {
            let joined = problems.join("; ");
            warn!(error = %joined, "output written but bookkeeping failed");
            Some(joined)
        };

        info!(%run_id, file = %file_name, pages = assembled.identifiers.len(), "run complete");

        Ok(StampOutcome {
            message: SUCCESS_MESSAGE.to_owned(),
            download_url: format!("/{UPLOADS_DIR}/{file_name}"),
            output_path,
            run_id,
            identifiers: assembled.identifiers,
            bookkeeping_error,
        })
    }

    /// Stamp several uploads concurrently. Results come back in input order.
    pub async fn batch(&self, uploads: Vec<Upload>) -> Vec<Result<StampOutcome>> {
        let handles: Vec<_> = uploads
            .into_iter()
            .map(|upload| {
                let service = self.clone();
                tokio::spawn(async move { service.stamp(upload).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.unwrap_or_else(|e| {
                Err(StampwerkError::Serialization(format!("stamp task failed: {e}")))
            }));
        }
        results
    }

    /// The run whose output carries `identifier`.
    pub fn lookup(&self, identifier: &str) -> Result<Option<BookkeepingRecord>> {
        self.ledger()?.find_by_identifier(identifier)
    }

    /// The most recent runs, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<BookkeepingRecord>> {
        self.ledger()?.recent(limit)
    }

    /// Re-hash the stored output carrying `identifier` and compare it with
    /// the ledger. `Ok(None)` when no run issued that identifier.
    pub fn verify(&self, identifier: &str) -> Result<Option<VerifiedOutput>> {
        let Some(record) = self.lookup(identifier)? else {
            return Ok(None);
        };
        let output_path = self.uploads_dir.join(&record.output_file);
        let bytes = std::fs::read(&output_path)?;
        verify_hash(&bytes, &record.sha256)?;
        Ok(Some(VerifiedOutput {
            identifier: identifier.to_owned(),
            record,
            output_path,
        }))
    }

    /// Render `text` as a standalone barcode PNG with the configured settings.
    pub fn render_barcode(&self, text: &str) -> Result<Vec<u8>> {
        BarcodeEncoder::new(self.config.barcode.clone())
            .encode(text)?
            .to_png_bytes()
    }

    fn ledger(&self) -> Result<MutexGuard<'_, Ledger>> {
        self.ledger
            .lock()
            .map_err(|_| StampwerkError::Persistence("ledger lock poisoned".into()))
    }

    fn record(&self, record: &BookkeepingRecord) -> Result<()> {
        let ledger = self.ledger()?;
        RecordSink::save(&*ledger, record)
    }

    fn persist_sequence(&self) -> Result<()> {
        let Some(store) = &self.sequences else {
            return Ok(());
        };
        let last = self.assembler.generator().last_issued();
        if last == 0 {
            return Ok(());
        }
        store
            .lock()
            .map_err(|_| StampwerkError::Persistence("sequence store lock poisoned".into()))?
            .store(&self.config.prefix, last)
    }
}

/// Write `bytes` to `dir/file_name` via a temporary file in the same
/// directory, refusing to replace an existing file.
fn write_output(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    let target = dir.join(file_name);
    tmp.persist_noclobber(&target).map_err(|e| {
        StampwerkError::Serialization(format!("cannot publish {}: {}", target.display(), e.error))
    })?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};
    use stampwerk_core::sequence::FixedClock;

    use super::*;

    fn pdf_with_pages(pages: u32) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let mut kids: Vec<Object> = Vec::new();
        for n in 1..=pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 18.into()]),
                    Operation::new("Td", vec![72.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(format!("Page {n}"))]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => i64::from(pages),
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()))
    }

    fn service_in(dir: &Path, config: StampConfig) -> StampService {
        StampService::from_parts(
            config,
            clock(),
            Ledger::open_in_memory().unwrap(),
            Some(SequenceStore::open_in_memory().unwrap()),
            dir.to_path_buf(),
        )
        .unwrap()
    }

    fn pdf_upload(pages: u32) -> Upload {
        Upload::new("scan.pdf", PDF_MIME, pdf_with_pages(pages))
    }

    #[tokio::test]
    async fn stamp_writes_file_and_records_run() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), StampConfig::default());

        let outcome = service.stamp(pdf_upload(3)).await.unwrap();
        assert_eq!(outcome.message, SUCCESS_MESSAGE);
        assert_eq!(outcome.download_url, "/uploads/generated_3.pdf");
        assert!(outcome.bookkeeping_error.is_none());
        assert!(outcome.output_path.is_file());

        let written = Document::load(&outcome.output_path).unwrap();
        assert_eq!(written.get_pages().len(), 4);

        let record = service.lookup("CXM-061524-00002").unwrap().unwrap();
        assert_eq!(record.run_id, outcome.run_id);
        assert_eq!(record.output_file, "generated_3.pdf");
        assert!(service.verify("CXM-061524-00003").unwrap().is_some());
    }

    #[tokio::test]
    async fn non_pdf_is_rejected_without_issuing() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), StampConfig::default());

        let upload = Upload::new("photo.png", "image/png", vec![0x89, b'P', b'N', b'G']);
        let err = service.stamp(upload).await.unwrap_err();
        assert!(matches!(
            err,
            StampwerkError::Validation(ValidationError::UnsupportedContentType { .. })
        ));
        assert_eq!(service.assembler.generator().last_issued(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let outcome = service.stamp(pdf_upload(1)).await.unwrap();
        assert_eq!(outcome.identifiers[0].to_string(), "CXM-061524-00001");
    }

    #[tokio::test]
    async fn oversized_is_rejected_before_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let config = StampConfig {
            max_upload_bytes: 16,
            ..StampConfig::default()
        };
        let service = service_in(dir.path(), config);

        // Not a PDF at all: the size check must fire before the parser sees it.
        let upload = Upload::new("big.pdf", PDF_MIME, vec![b'x'; 17]);
        let err = service.stamp(upload).await.unwrap_err();
        assert!(matches!(
            err,
            StampwerkError::Validation(ValidationError::TooLarge { size: 17, limit: 16 })
        ));
        assert_eq!(service.assembler.generator().last_issued(), 0);
    }

    #[tokio::test]
    async fn empty_upload_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), StampConfig::default());
        let err = service.stamp(Upload::new("x.pdf", PDF_MIME, Vec::new())).await.unwrap_err();
        assert!(matches!(err, StampwerkError::Validation(ValidationError::MissingUpload)));
    }

    #[test]
    fn content_type_parameters_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), StampConfig::default());
        let upload = Upload::new("a.pdf", "Application/PDF; charset=binary", vec![1]);
        assert!(service.validate(&upload).is_ok());
    }

    #[tokio::test]
    async fn malformed_pdf_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), StampConfig::default());
        let upload = Upload::new("broken.pdf", PDF_MIME, b"%PDF-1.4 not really".to_vec());
        let err = service.stamp(upload).await.unwrap_err();
        assert!(matches!(err, StampwerkError::MalformedDocument(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(service.recent(10).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn existing_output_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("generated_1.pdf"), b"keep me").unwrap();
        let service = service_in(dir.path(), StampConfig::default());

        let err = service.stamp(pdf_upload(1)).await.unwrap_err();
        assert!(matches!(err, StampwerkError::Serialization(_)));
        assert_eq!(std::fs::read(dir.path().join("generated_1.pdf")).unwrap(), b"keep me");
    }

    #[tokio::test]
    async fn sequence_mark_is_stored_even_when_publishing_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("generated_2.pdf"), b"taken").unwrap();
        let service = service_in(dir.path(), StampConfig::default());

        let err = service.stamp(pdf_upload(2)).await.unwrap_err();
        assert!(matches!(err, StampwerkError::Serialization(_)));

        let stored = service
            .sequences
            .as_ref()
            .unwrap()
            .lock()
            .unwrap()
            .load("CXM")
            .unwrap();
        assert_eq!(stored, 2);
    }

    #[tokio::test]
    async fn bookkeeping_failure_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), StampConfig::default());

        // Occupy the identifier the next run will issue.
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let squatter = BookkeepingRecord::new(
            RunId::new(),
            vec![ContentIdentifier::new("CXM", date, 1)],
            "elsewhere.pdf",
            "00",
        );
        service.record(&squatter).unwrap();

        let outcome = service.stamp(pdf_upload(1)).await.unwrap();
        assert!(outcome.bookkeeping_error.is_some());
        assert!(outcome.output_path.is_file());
    }

    #[tokio::test]
    async fn batch_issues_disjoint_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), StampConfig::default());

        let uploads = vec![pdf_upload(2), pdf_upload(3), pdf_upload(1)];
        let results = service.batch(uploads).await;

        let mut sequences: Vec<u64> = results
            .into_iter()
            .flat_map(|r| r.unwrap().identifiers)
            .map(|id| id.sequence)
            .collect();
        sequences.sort_unstable();
        assert_eq!(sequences, (1..=6).collect::<Vec<_>>());
        assert_eq!(service.recent(10).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn sequence_resumes_after_restart() {
        let data = tempfile::tempdir().unwrap();
        let first = StampService::init(data.path()).unwrap();
        let one = first.stamp(pdf_upload(2)).await.unwrap();
        assert_eq!(one.identifiers.last().unwrap().sequence, 2);
        drop(first);

        let second = StampService::init(data.path()).unwrap();
        let two = second.stamp(pdf_upload(1)).await.unwrap();
        assert_eq!(two.identifiers[0].sequence, 3);
        assert_eq!(two.download_url, "/uploads/generated_3.pdf");
    }

    #[tokio::test]
    async fn sequence_resets_when_persistence_is_off() {
        let data = tempfile::tempdir().unwrap();
        StampConfig {
            persist_sequence: false,
            ..StampConfig::default()
        }
        .persist(data.path())
        .unwrap();

        let first = StampService::init(data.path()).unwrap();
        first.stamp(pdf_upload(1)).await.unwrap();
        drop(first);

        // Fresh counter, so the same file name comes round again and the
        // no-clobber write refuses it.
        let second = StampService::init(data.path()).unwrap();
        let err = second.stamp(pdf_upload(1)).await.unwrap_err();
        assert!(matches!(err, StampwerkError::Serialization(_)));
    }

    #[tokio::test]
    async fn verify_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), StampConfig::default());
        let outcome = service.stamp(pdf_upload(1)).await.unwrap();

        std::fs::write(&outcome.output_path, b"%PDF-1.5 tampered").unwrap();
        let err = service.verify("CXM-061524-00001").unwrap_err();
        assert!(matches!(err, StampwerkError::IntegrityMismatch { .. }));
        assert!(service.verify("CXM-061524-09999").unwrap().is_none());
    }

    #[test]
    fn barcode_png_uses_configured_settings() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_in(dir.path(), StampConfig::default());
        let png = service.render_barcode("CXM-061524-00001").unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
