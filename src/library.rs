use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    aggregate::{GroupedResults, group_by_file},
    cache::{CacheStore, ExtractionCache, unix_now},
    config_db::Tunables,
    data_dir::DataDir,
    error::Result,
    extract::{DocumentFailure, Extractor, LopdfBackend, PdfBackend, Progress},
    incremental::diff_documents,
    locator::{Document, Locator, RootStatus},
    prefilter::{FullScan, PrefilterIndex},
    search::{MatchRecord, SearchEngine},
    text_util::Marker,
};

/// Outcome of [`Library::index`].
#[derive(Debug, Default)]
pub struct IndexReport {
    /// Documents that were new or stale when the pass started.
    pub pending: usize,
    pub extracted: Vec<String>,
    pub failed: Vec<DocumentFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryStats {
    pub cached_documents: usize,
    pub total_pages: usize,
    pub located_files: usize,
    pub pending: usize,
    pub extract_workers: usize,
    pub indexed_at: Option<u64>,
    pub prefilter_available: bool,
    pub roots: Vec<RootSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RootSummary {
    pub path: PathBuf,
    /// `None` when the directory could not be listed.
    pub pdf_count: Option<usize>,
}

impl From<&RootStatus> for RootSummary {
    fn from(status: &RootStatus) -> Self {
        Self {
            path: status.path.clone(),
            pdf_count: status.pdf_count,
        }
    }
}

/// Owns the located documents, the extraction cache and its indexes.
pub struct Library<B: PdfBackend = LopdfBackend> {
    locator: Locator,
    cache: ExtractionCache,
    store: CacheStore,
    prefilter: PrefilterIndex,
    extractor: Extractor<B>,
    engine: SearchEngine,
}

impl Library<LopdfBackend> {
    pub fn open(
        data_dir: &DataDir,
        roots: &[PathBuf],
        tunables: Tunables,
    ) -> Result<Self> {
        Self::with_backend(LopdfBackend, data_dir, roots, tunables)
    }
}

impl<B: PdfBackend> Library<B> {
    pub fn with_backend(
        backend: B,
        data_dir: &DataDir,
        roots: &[PathBuf],
        tunables: Tunables,
    ) -> Result<Self> {
        let store = CacheStore::new(data_dir.cache_file());
        let cache = store.load();
        Ok(Self {
            locator: Locator::build(roots),
            cache,
            store,
            prefilter: PrefilterIndex::new(data_dir.prefilter_db()),
            extractor: Extractor::new(backend, tunables.extract_workers)?,
            engine: SearchEngine::new(
                tunables.page_workers,
                tunables.parallel_page_threshold,
            )?
            .with_context_chars(tunables.context_chars),
        })
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.engine = self.engine.with_marker(marker);
        self
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn cache(&self) -> &ExtractionCache {
        &self.cache
    }

    /// Rescan the roots, replacing the located document set.
    pub fn rescan(&mut self) {
        self.locator.rebuild();
    }

    /// New documents, then stale ones, each in file name order.
    pub fn pending(&self) -> Vec<Document> {
        diff_documents(self.locator.documents(), &self.cache).to_process()
    }

    /// Extract every pending document, persist the cache and rebuild the
    /// prefilter.
    ///
    /// Only a failure to persist the cache is returned as an error; the
    /// in-memory cache keeps the new entries either way.
    pub fn index(
        &mut self,
        progress: impl FnMut(&Progress),
    ) -> Result<IndexReport> {
        let pending = self.pending();
        if pending.is_empty() {
            return Ok(IndexReport::default());
        }

        let batch =
            self.extractor
                .process_batch(&pending, &mut self.cache, progress);
        let report = IndexReport {
            pending: pending.len(),
            extracted: batch.extracted,
            failed: batch.failed,
        };
        if report.extracted.is_empty() {
            return Ok(report);
        }

        self.cache.indexed_at = Some(unix_now());
        let saved = self.store.save(&self.cache);
        self.sync_prefilter();
        saved?;

        info!(
            extracted = report.extracted.len(),
            failed = report.failed.len(),
            "index updated"
        );
        Ok(report)
    }

    /// Build the prefilter unless it was built from exactly the current
    /// cache entries.
    pub fn ensure_prefilter(&self) -> Result<()> {
        if self.cache.is_empty() || self.prefilter.is_current(&self.cache) {
            return Ok(());
        }
        info!("building search prefilter");
        self.prefilter.rebuild(&self.cache)?;
        Ok(())
    }

    /// Bring the prefilter in step with the cache. Returns whether it can
    /// be trusted; an outdated copy that cannot be rebuilt is removed.
    fn sync_prefilter(&self) -> bool {
        match self.ensure_prefilter() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "prefilter rebuild failed, discarding it");
                if let Err(e) = self.prefilter.clear() {
                    warn!(error = %e, "could not remove outdated prefilter");
                }
                false
            }
        }
    }

    pub fn search(&self, keyword: &str) -> Vec<MatchRecord> {
        if keyword.trim().is_empty() {
            return Vec::new();
        }
        if self.sync_prefilter() {
            self.engine
                .search(keyword, &self.cache, &self.prefilter, &self.locator)
        } else {
            self.engine
                .search(keyword, &self.cache, &FullScan, &self.locator)
        }
    }

    pub fn search_grouped(&self, keyword: &str) -> GroupedResults {
        group_by_file(self.search(keyword))
    }

    pub fn stats(&self) -> LibraryStats {
        LibraryStats {
            cached_documents: self.cache.len(),
            total_pages: self.cache.total_pages(),
            located_files: self.locator.len(),
            pending: self.pending().len(),
            extract_workers: self.extractor.workers(),
            indexed_at: self.cache.indexed_at,
            prefilter_available: self.prefilter.is_current(&self.cache),
            roots: self
                .locator
                .root_status()
                .iter()
                .map(RootSummary::from)
                .collect(),
        }
    }

    /// Forget every extraction so the next pass starts from scratch.
    pub fn clear(&mut self) -> Result<()> {
        self.cache = ExtractionCache::default();
        self.store.clear()?;
        self.prefilter.clear()?;
        Ok(())
    }
}

impl<B: PdfBackend> std::fmt::Debug for Library<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("located", &self.locator.len())
            .field("cached", &self.cache.len())
            .field("extractor", &self.extractor)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
