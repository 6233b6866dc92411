//! pdfsift - keyword search across the pages of a local PDF library.
//!
//! pdfsift extracts the text of every page of the PDF files found in a set
//! of root directories, keeps it in a JSON cache that is refreshed only for
//! new or modified files, and answers case-insensitive keyword queries with
//! per-page, highlighted context snippets. A substring prefilter stored in
//! [redb](https://github.com/cberner/redb) narrows each query to the
//! documents worth scanning.
//!
//! # Quick start
//!
//! ```no_run
//! use pdfsift::{ConfigDb, DataDir, Library, Tunables};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let config_db = ConfigDb::open(&data_dir.config_db()).unwrap();
//! let roots = config_db.root_paths().unwrap();
//! let tunables = Tunables::load(&config_db).unwrap();
//!
//! let mut library = Library::open(&data_dir, &roots, tunables).unwrap();
//! library.index(|p| eprintln!("{}/{} {}", p.processed, p.total, p.filename))
//!     .unwrap();
//!
//! let grouped = library.search_grouped("carburettor");
//! for group in &grouped.groups {
//!     println!("{} ({} matches)", group.file, group.len());
//!     for m in &group.matches {
//!         println!("  p.{}: {}", m.page_number, m.context);
//!     }
//! }
//! ```

pub mod aggregate;
pub mod cache;
pub mod config_db;
pub mod data_dir;
pub mod error;
pub mod extract;
pub mod incremental;
pub mod library;
pub mod locator;
pub mod prefilter;
pub mod search;
pub mod text_util;

#[cfg(test)]
mod test_support;

pub use aggregate::{FileGroup, GroupedResults, group_by_file};
pub use cache::{CacheStore, ExtractionCache};
pub use config_db::{ConfigDb, Tunables};
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use extract::{Extractor, LopdfBackend, PdfBackend, Progress};
pub use library::{IndexReport, Library, LibraryStats};
pub use locator::{Document, Locator};
pub use prefilter::{CandidateFilter, PrefilterIndex};
pub use search::{MatchRecord, SearchEngine};
pub use text_util::Marker;
