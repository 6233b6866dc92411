//! Page text extraction and the bounded batch pipeline that feeds the cache.

use std::{
    collections::BTreeMap,
    panic::{AssertUnwindSafe, catch_unwind},
    path::Path,
    sync::{Arc, mpsc},
};

use tracing::{debug, info, warn};

use crate::{
    cache::{CacheEntry, EntryMetadata, ExtractionCache, unix_now},
    error::{Error, Result},
    locator::{Document, modification_time},
    text_util::normalize_whitespace,
};

/// Access to a PDF library, split so that one bad page cannot sink the
/// whole document.
pub trait PdfBackend: Send + Sync + 'static {
    type Handle;

    fn open(&self, path: &Path) -> Result<Self::Handle>;

    fn page_count(&self, handle: &Self::Handle) -> usize;

    /// Raw text of the zero-based page `index`.
    fn page_text(&self, handle: &Self::Handle, index: usize) -> Result<String>;
}

/// [`PdfBackend`] over `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfBackend;

pub struct LoadedPdf {
    doc: lopdf::Document,
    /// 1-based page numbers in page order.
    page_numbers: Vec<u32>,
}

impl PdfBackend for LopdfBackend {
    type Handle = LoadedPdf;

    fn open(&self, path: &Path) -> Result<LoadedPdf> {
        let doc = lopdf::Document::load(path)?;
        let pages: BTreeMap<u32, lopdf::ObjectId> = doc.get_pages();
        Ok(LoadedPdf {
            page_numbers: pages.into_keys().collect(),
            doc,
        })
    }

    fn page_count(&self, handle: &LoadedPdf) -> usize {
        handle.page_numbers.len()
    }

    fn page_text(&self, handle: &LoadedPdf, index: usize) -> Result<String> {
        let number = handle.page_numbers.get(index).ok_or_else(|| {
            Error::Pdf(format!("page index {index} out of range"))
        })?;
        Ok(handle.doc.extract_text(&[*number])?)
    }
}

/// Extract normalized text for every page of the document at `path`.
///
/// A failing page yields an empty string in its slot. Failing to open the
/// document is an error.
pub fn extract_document<B: PdfBackend>(
    backend: &B,
    path: &Path,
) -> Result<Vec<String>> {
    let handle = catch_unwind(AssertUnwindSafe(|| backend.open(path)))
        .map_err(|_| Error::Pdf("PDF library panicked while opening".into()))??;

    let count = backend.page_count(&handle);
    let pages = (0..count)
        .map(|index| {
            match catch_unwind(AssertUnwindSafe(|| {
                backend.page_text(&handle, index)
            })) {
                Ok(Ok(text)) => normalize_whitespace(&text),
                Ok(Err(e)) => {
                    warn!(path = %path.display(), page = index + 1, error = %e, "page extraction failed");
                    String::new()
                }
                Err(_) => {
                    warn!(path = %path.display(), page = index + 1, "PDF library panicked on page");
                    String::new()
                }
            }
        })
        .collect();

    Ok(pages)
}

/// One completed task of a batch, as reported to the progress sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub filename: String,
    pub processed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFailure {
    pub filename: String,
    pub error: String,
}

/// Outcome of [`Extractor::process_batch`].
#[derive(Debug, Default)]
pub struct BatchReport {
    /// File names written to the cache, in completion order.
    pub extracted: Vec<String>,
    /// Documents left out of the cache; retried on the next pass.
    pub failed: Vec<DocumentFailure>,
}

/// Text captured by a worker together with the mtime observed before the
/// read began.
struct Captured {
    mtime: u64,
    pages: Vec<String>,
}

fn capture<B: PdfBackend>(backend: &B, document: &Document) -> Result<Captured> {
    let mtime = modification_time(&document.absolute_path)?;
    let pages = extract_document(backend, &document.absolute_path)?;
    Ok(Captured { mtime, pages })
}

/// Runs document extraction on a bounded worker pool.
pub struct Extractor<B: PdfBackend> {
    backend: Arc<B>,
    pool: rayon::ThreadPool,
}

impl<B: PdfBackend> Extractor<B> {
    pub fn new(backend: B, workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("pdfsift-extract-{i}"))
            .build()?;
        Ok(Self {
            backend: Arc::new(backend),
            pool,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Extract one document on the calling thread.
    pub fn extract(&self, document: &Document) -> Result<Vec<String>> {
        extract_document(self.backend.as_ref(), &document.absolute_path)
    }

    /// Extract `documents` concurrently and write each result into `cache`
    /// as it completes.
    ///
    /// Workers only return values; the cache is mutated on the calling
    /// thread, one whole entry at a time. Documents that fail to open are
    /// reported and left out of the cache.
    pub fn process_batch(
        &self,
        documents: &[Document],
        cache: &mut ExtractionCache,
        mut progress: impl FnMut(&Progress),
    ) -> BatchReport {
        let mut report = BatchReport::default();
        let total = documents.len();
        if total == 0 {
            return report;
        }

        info!(documents = total, workers = self.workers(), "extracting");

        let (tx, rx) = mpsc::channel();
        for document in documents {
            let tx = tx.clone();
            let backend = Arc::clone(&self.backend);
            let document = document.clone();
            self.pool.spawn(move || {
                let outcome =
                    catch_unwind(AssertUnwindSafe(|| capture(backend.as_ref(), &document)))
                        .unwrap_or_else(|_| {
                            Err(Error::Pdf("PDF library panicked".into()))
                        });
                // The receiver only goes away if the orchestrator is gone.
                let _ = tx.send((document, outcome));
            });
        }
        drop(tx);

        for (processed, (document, outcome)) in rx.into_iter().enumerate() {
            match outcome {
                Ok(captured) => {
                    debug!(
                        filename = %document.filename,
                        pages = captured.pages.len(),
                        "extracted"
                    );
                    cache.replace(
                        document.filename.clone(),
                        CacheEntry {
                            pages: captured.pages,
                            metadata: EntryMetadata {
                                mtime: captured.mtime,
                                processed_at: unix_now(),
                            },
                        },
                    );
                    report.extracted.push(document.filename.clone());
                }
                Err(e) => {
                    warn!(filename = %document.filename, error = %e, "failed to process document");
                    report.failed.push(DocumentFailure {
                        filename: document.filename.clone(),
                        error: e.to_string(),
                    });
                }
            }

            progress(&Progress {
                filename: document.filename,
                processed: processed + 1,
                total,
            });
        }

        info!(
            extracted = report.extracted.len(),
            failed = report.failed.len(),
            "extraction finished"
        );
        report
    }
}

impl<B: PdfBackend> std::fmt::Debug for Extractor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("workers", &self.workers())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::test_support::{TextBackend, write_pages, write_pdf};

    fn write_doc(dir: &Path, name: &str, pages: &[&str]) -> Document {
        let path = dir.join(name);
        write_pages(&path, pages);
        Document {
            filename: name.to_string(),
            absolute_path: path.clone(),
            mtime: modification_time(&path).unwrap(),
        }
    }

    #[test]
    fn faulty_page_becomes_empty_slot() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = write_doc(
            tmp.path(),
            "five.pdf",
            &["one", "two", "!fault", "four", "five"],
        );

        let pages = extract_document(&TextBackend, &doc.absolute_path).unwrap();
        assert_eq!(pages, vec!["one", "two", "", "four", "five"]);
    }

    #[test]
    fn panicking_page_is_isolated() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = write_doc(tmp.path(), "p.pdf", &["ok", "!panic", "fine"]);

        let pages = extract_document(&TextBackend, &doc.absolute_path).unwrap();
        assert_eq!(pages, vec!["ok", "", "fine"]);
    }

    #[test]
    fn lopdf_rejects_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();

        assert!(matches!(
            extract_document(&LopdfBackend, &path),
            Err(Error::Pdf(_))
        ));
    }

    #[test]
    fn lopdf_extracts_each_page() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("manual.pdf");
        write_pdf(
            &path,
            &["Remove the  carburettor", "Clean the jets", "Refit"],
        );

        let handle = LopdfBackend.open(&path).unwrap();
        assert_eq!(LopdfBackend.page_count(&handle), 3);

        let pages = extract_document(&LopdfBackend, &path).unwrap();
        assert_eq!(
            pages,
            vec!["Remove the carburettor", "Clean the jets", "Refit"]
        );
    }

    #[test]
    fn lopdf_page_index_out_of_range_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("one.pdf");
        write_pdf(&path, &["only page"]);

        let handle = LopdfBackend.open(&path).unwrap();
        assert!(matches!(
            LopdfBackend.page_text(&handle, 1),
            Err(Error::Pdf(_))
        ));
    }

    #[test]
    fn batch_fills_cache_and_reports_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let good = write_doc(tmp.path(), "good.pdf", &["hello  world", "bye"]);
        let bad = write_doc(tmp.path(), "bad.pdf", &["!corrupt"]);
        let gone = Document {
            filename: "gone.pdf".into(),
            absolute_path: PathBuf::from("/nonexistent/gone.pdf"),
            mtime: 1,
        };

        let extractor = Extractor::new(TextBackend, 3).unwrap();
        let mut cache = ExtractionCache::default();
        let mut seen = Vec::new();
        let report = extractor.process_batch(
            &[good.clone(), bad, gone],
            &mut cache,
            |p| seen.push(p.clone()),
        );

        assert_eq!(report.extracted, vec!["good.pdf"]);
        let mut failed: Vec<_> =
            report.failed.iter().map(|f| f.filename.as_str()).collect();
        failed.sort();
        assert_eq!(failed, vec!["bad.pdf", "gone.pdf"]);

        assert_eq!(cache.len(), 1);
        let entry = cache.get("good.pdf").unwrap();
        assert_eq!(entry.pages, vec!["hello world", "bye"]);
        assert_eq!(entry.metadata.mtime, good.mtime);
        assert!(entry.metadata.processed_at > 0);

        assert_eq!(seen.len(), 3);
        assert_eq!(seen.last().unwrap().processed, 3);
        assert_eq!(seen.last().unwrap().fraction(), 1.0);
    }

    #[test]
    fn batch_result_independent_of_worker_count() {
        let tmp = tempfile::tempdir().unwrap();
        let docs: Vec<_> = (0..8)
            .map(|i| {
                let page = format!("document {i}");
                write_doc(tmp.path(), &format!("d{i}.pdf"), &[page.as_str(), "tail"])
            })
            .collect();

        let mut serial = ExtractionCache::default();
        Extractor::new(TextBackend, 1)
            .unwrap()
            .process_batch(&docs, &mut serial, |_| {});
        let mut parallel = ExtractionCache::default();
        Extractor::new(TextBackend, 6)
            .unwrap()
            .process_batch(&docs, &mut parallel, |_| {});

        assert_eq!(serial.len(), 8);
        for (name, entry) in &serial.documents {
            assert_eq!(parallel.get(name).unwrap().pages, entry.pages);
        }
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let extractor = Extractor::new(TextBackend, 2).unwrap();
        let mut cache = ExtractionCache::default();
        let mut calls = 0;
        let report = extractor.process_batch(&[], &mut cache, |_| calls += 1);

        assert!(report.extracted.is_empty());
        assert!(report.failed.is_empty());
        assert_eq!(calls, 0);
    }

    #[test]
    fn worker_count_is_respected() {
        let extractor = Extractor::new(TextBackend, 5).unwrap();
        assert_eq!(extractor.workers(), 5);
        let clamped = Extractor::new(TextBackend, 0).unwrap();
        assert_eq!(clamped.workers(), 1);
    }
}
