use std::{
    collections::HashMap,
    fs::DirEntry,
    path::{Path, PathBuf},
    time::SystemTime,
};

use tracing::warn;

use crate::error::Result;

/// A PDF file found in one of the configured roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Bare file name; the cache and index key.
    pub filename: String,
    pub absolute_path: PathBuf,
    /// Last modification time as nanoseconds since the Unix epoch.
    pub mtime: u64,
}

/// Read a file's modification time as nanoseconds since the Unix epoch.
pub fn modification_time(path: &Path) -> Result<u64> {
    let modified = std::fs::metadata(path)?
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH);
    Ok(modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// List the PDF files directly inside `root` (no recursion).
///
/// Entries that cannot be read are skipped with a warning; failing to
/// list the directory itself is returned as an error.
pub fn scan_root(root: &Path) -> Result<Vec<Document>> {
    let mut results: Vec<Document> = std::fs::read_dir(root)?
        .filter_map(document_from_entry)
        .collect();

    results.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(results)
}

/// The [`Document`] for one directory entry, or `None` when the entry is
/// not a readable PDF file.
fn document_from_entry(entry: std::io::Result<DirEntry>) -> Option<Document> {
    let entry = match entry {
        Ok(entry) => entry,
        Err(e) => {
            warn!(error = %e, "skipping unreadable directory entry");
            return None;
        }
    };
    let path = entry.path();
    if !is_pdf(&path) {
        return None;
    }
    match entry.file_type() {
        Ok(ft) if ft.is_dir() => return None,
        Ok(_) => {}
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping unreadable entry");
            return None;
        }
    }

    let mtime = match modification_time(&path) {
        Ok(mtime) => mtime,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping file without mtime");
            return None;
        }
    };
    let absolute_path = match std::path::absolute(&path) {
        Ok(absolute) => absolute,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping unresolvable path");
            return None;
        }
    };

    Some(Document {
        filename: entry.file_name().to_string_lossy().into_owned(),
        absolute_path,
        mtime,
    })
}

/// Per-root outcome of the last scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootStatus {
    pub path: PathBuf,
    /// `None` when the root could not be listed.
    pub pdf_count: Option<usize>,
}

/// Filename to document mapping across all configured roots.
///
/// When two roots hold the same file name the root scanned later wins.
#[derive(Debug, Default)]
pub struct Locator {
    roots: Vec<PathBuf>,
    documents: HashMap<String, Document>,
    status: Vec<RootStatus>,
}

impl Locator {
    pub fn build(roots: &[PathBuf]) -> Self {
        let mut locator = Self {
            roots: roots.to_vec(),
            ..Self::default()
        };
        locator.rebuild();
        locator
    }

    /// Discard the mapping and rescan every root.
    pub fn rebuild(&mut self) {
        self.documents.clear();
        self.status.clear();

        for root in &self.roots {
            let found = match scan_root(root) {
                Ok(found) => found,
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "cannot access directory");
                    self.status.push(RootStatus {
                        path: root.clone(),
                        pdf_count: None,
                    });
                    continue;
                }
            };

            self.status.push(RootStatus {
                path: root.clone(),
                pdf_count: Some(found.len()),
            });

            for doc in found {
                if let Some(previous) = self.documents.get(&doc.filename) {
                    warn!(
                        filename = %doc.filename,
                        replaced = %previous.absolute_path.display(),
                        by = %doc.absolute_path.display(),
                        "duplicate file name across roots"
                    );
                }
                self.documents.insert(doc.filename.clone(), doc);
            }
        }
    }

    /// Look up a document path by exact name, then by the base name of a
    /// path-qualified input.
    pub fn resolve(&self, filename: &str) -> Option<&Path> {
        self.get(filename).map(|doc| doc.absolute_path.as_path())
    }

    pub fn get(&self, filename: &str) -> Option<&Document> {
        self.documents.get(filename).or_else(|| {
            let base = Path::new(filename).file_name()?.to_str()?;
            self.documents.get(base)
        })
    }

    /// All located documents, ordered by file name.
    pub fn documents(&self) -> Vec<&Document> {
        let mut docs: Vec<_> = self.documents.values().collect();
        docs.sort_by(|a, b| a.filename.cmp(&b.filename));
        docs
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn root_status(&self) -> &[RootStatus] {
        &self.status
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
