use std::path::{Path, PathBuf};

use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};
use tracing::{debug, warn};

use crate::{cache::ExtractionCache, error::Result, text_util::fold_case};

const FULL_TEXT: TableDefinition<&str, &str> =
    TableDefinition::new("full_text");
const PAGE_COUNT: TableDefinition<&str, u64> =
    TableDefinition::new("page_count");
/// Cached mtime of the text each record was built from.
const SOURCE_MTIME: TableDefinition<&str, u64> =
    TableDefinition::new("source_mtime");

/// Narrows a keyword search to the documents worth scanning.
pub trait CandidateFilter {
    /// File names that may contain `keyword`, or `None` when no answer is
    /// available and every document must be scanned.
    fn candidates(&self, keyword: &str) -> Option<Vec<String>>;
}

/// Never narrows: every cached document is scanned.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullScan;

impl CandidateFilter for FullScan {
    fn candidates(&self, _keyword: &str) -> Option<Vec<String>> {
        None
    }
}

/// Stored view of one document in the prefilter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefilterRecord {
    pub filename: String,
    pub full_text: String,
    pub page_count: u64,
}

/// Case-folded, space-joined text of all pages.
pub fn full_text<S: AsRef<str>>(pages: &[S]) -> String {
    let joined = pages.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(" ");
    fold_case(&joined)
}

/// Substring index over whole-document text, kept in its own redb file.
///
/// Every operation opens the database and closes it before returning.
#[derive(Debug, Clone)]
pub struct PrefilterIndex {
    path: PathBuf,
}

impl PrefilterIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Replace the whole index with one record per cached document.
    pub fn rebuild(&self, cache: &ExtractionCache) -> Result<usize> {
        let db = match Database::create(&self.path) {
            Ok(db) => db,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "prefilter store unreadable, recreating");
                std::fs::remove_file(&self.path)?;
                Database::create(&self.path)?
            }
        };
        let txn = db.begin_write()?;
        txn.delete_table(FULL_TEXT)?;
        txn.delete_table(PAGE_COUNT)?;
        txn.delete_table(SOURCE_MTIME)?;
        {
            let mut texts = txn.open_table(FULL_TEXT)?;
            let mut counts = txn.open_table(PAGE_COUNT)?;
            let mut mtimes = txn.open_table(SOURCE_MTIME)?;
            for (filename, entry) in &cache.documents {
                texts.insert(filename.as_str(), full_text(&entry.pages).as_str())?;
                counts.insert(filename.as_str(), entry.page_count() as u64)?;
                mtimes.insert(filename.as_str(), entry.metadata.mtime)?;
            }
        }
        txn.commit()?;

        debug!(path = %self.path.display(), documents = cache.len(), "prefilter rebuilt");
        Ok(cache.len())
    }

    /// Whether the stored records were built from exactly the entries in
    /// `cache`: same file names, same source mtimes.
    ///
    /// A missing or unreadable store is never current.
    pub fn is_current(&self, cache: &ExtractionCache) -> bool {
        if !self.exists() {
            return false;
        }
        match self.try_is_current(cache) {
            Ok(current) => current,
            Err(e) => {
                debug!(error = %e, "prefilter freshness unknown");
                false
            }
        }
    }

    fn try_is_current(&self, cache: &ExtractionCache) -> Result<bool> {
        let db = Database::open(&self.path)?;
        let txn = db.begin_read()?;
        let mtimes = txn.open_table(SOURCE_MTIME)?;
        if mtimes.len()? as usize != cache.len() {
            return Ok(false);
        }
        for (filename, entry) in &cache.documents {
            match mtimes.get(filename.as_str())? {
                Some(stored) if stored.value() == entry.metadata.mtime => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    /// File names whose text contains `keyword`, ignoring case, in name
    /// order.
    pub fn query_candidates(&self, keyword: &str) -> Option<Vec<String>> {
        if !self.exists() {
            return None;
        }
        match self.try_query(&fold_case(keyword)) {
            Ok(found) => Some(found),
            Err(e) => {
                debug!(error = %e, "prefilter unavailable");
                None
            }
        }
    }

    fn try_query(&self, needle: &str) -> Result<Vec<String>> {
        let db = Database::open(&self.path)?;
        let txn = db.begin_read()?;
        let table = txn.open_table(FULL_TEXT)?;
        let mut found = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            if v.value().contains(needle) {
                found.push(k.value().to_string());
            }
        }
        Ok(found)
    }

    pub fn record(&self, filename: &str) -> Result<Option<PrefilterRecord>> {
        let db = Database::open(&self.path)?;
        let txn = db.begin_read()?;
        let texts = txn.open_table(FULL_TEXT)?;
        let counts = txn.open_table(PAGE_COUNT)?;

        let Some(text) = texts.get(filename)? else {
            return Ok(None);
        };
        let page_count = counts.get(filename)?.map_or(0, |v| v.value());
        Ok(Some(PrefilterRecord {
            filename: filename.to_string(),
            full_text: text.value().to_string(),
            page_count,
        }))
    }

    pub fn len(&self) -> Result<usize> {
        let db = Database::open(&self.path)?;
        let txn = db.begin_read()?;
        let table = txn.open_table(FULL_TEXT)?;
        Ok(table.len()? as usize)
    }

    /// Delete the index file. Returns whether one existed.
    pub fn clear(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl CandidateFilter for PrefilterIndex {
    fn candidates(&self, keyword: &str) -> Option<Vec<String>> {
        self.query_candidates(keyword)
    }
}
