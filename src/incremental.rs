use std::collections::HashSet;

use crate::{cache::ExtractionCache, locator::Document};

/// Result of comparing located documents against the extraction cache.
#[derive(Debug, Default)]
pub struct DiffResult {
    /// Documents with no cache entry.
    pub new_files: Vec<Document>,
    /// Documents modified after their cached text was captured.
    pub changed_files: Vec<Document>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.changed_files.is_empty()
    }

    /// New and changed documents, each file name at most once.
    pub fn to_process(&self) -> Vec<Document> {
        let mut seen = HashSet::new();
        self.new_files
            .iter()
            .chain(&self.changed_files)
            .filter(|doc| seen.insert(doc.filename.clone()))
            .cloned()
            .collect()
    }
}

/// Documents whose on-disk mtime is strictly newer than the cached one.
///
/// A missing entry counts as cached at time 0.
pub fn find_stale<'a>(
    documents: impl IntoIterator<Item = &'a Document>,
    cache: &ExtractionCache,
) -> Vec<Document> {
    documents
        .into_iter()
        .filter(|doc| doc.mtime > cache.cached_mtime(&doc.filename))
        .cloned()
        .collect()
}

/// Split located documents into new and changed sets.
pub fn diff_documents<'a>(
    documents: impl IntoIterator<Item = &'a Document>,
    cache: &ExtractionCache,
) -> DiffResult {
    let mut result = DiffResult::default();

    for doc in documents {
        if !cache.contains(&doc.filename) {
            result.new_files.push(doc.clone());
        } else if doc.mtime > cache.cached_mtime(&doc.filename) {
            result.changed_files.push(doc.clone());
        }
        // Equal or older mtime: unchanged.
    }

    result
}
