//! Persistent store of extracted page text.
//!
//! The whole cache is one JSON snapshot. Saving writes a sibling temp file
//! and renames it over the previous snapshot, so an interrupted write never
//! damages the last good copy. Loading is forgiving: a missing or corrupt
//! snapshot yields an empty cache and every document is re-extracted.

use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
    time::SystemTime,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Freshness bookkeeping for one cached document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Source modification time (ns since epoch) when the text was captured.
    pub mtime: u64,
    /// Completion time of the extraction, seconds since epoch.
    pub processed_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Page texts in page order.
    pub pages: Vec<String>,
    pub metadata: EntryMetadata,
}

impl CacheEntry {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// In-memory view of every cached document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionCache {
    pub documents: BTreeMap<String, CacheEntry>,
    /// Time of the last completed indexing pass, seconds since epoch.
    pub indexed_at: Option<u64>,
}

impl ExtractionCache {
    pub fn get(&self, filename: &str) -> Option<&CacheEntry> {
        self.documents.get(filename)
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.documents.contains_key(filename)
    }

    /// Replace the entry for `filename` as a whole.
    pub fn replace(&mut self, filename: String, entry: CacheEntry) {
        self.documents.insert(filename, entry);
    }

    /// Cached modification time for `filename`, or 0 when absent.
    pub fn cached_mtime(&self, filename: &str) -> u64 {
        self.documents
            .get(filename)
            .map_or(0, |entry| entry.metadata.mtime)
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn total_pages(&self) -> usize {
        self.documents.values().map(CacheEntry::page_count).sum()
    }
}

/// Current wall-clock time as seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// File-backed durable copy of an [`ExtractionCache`].
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load(&self) -> ExtractionCache {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no cache snapshot yet");
                return ExtractionCache::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cache unreadable, rebuilding");
                return ExtractionCache::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(cache) => cache,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cache file corrupted, rebuilding");
                ExtractionCache::default()
            }
        }
    }

    pub fn save(&self, cache: &ExtractionCache) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.temp_path();
        let written = (|| -> Result<()> {
            let file = std::fs::File::create(&tmp)?;
            let mut writer = std::io::BufWriter::new(file);
            serde_json::to_writer(&mut writer, cache)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        })();

        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }

        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), documents = cache.len(), "cache saved");
        Ok(())
    }

    /// Delete the snapshot. Returns whether one existed.
    pub fn clear(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
