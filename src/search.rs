use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::{
    cache::ExtractionCache,
    error::Result,
    locator::Locator,
    prefilter::CandidateFilter,
    text_util::{self, DEFAULT_CONTEXT_CHARS, Marker},
};

/// One keyword occurrence on one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    pub file: String,
    /// 1-indexed.
    pub page_number: usize,
    /// Highlighted snippet around the occurrence.
    pub context: String,
    #[serde(skip_serializing)]
    pub page_text: String,
    pub resolved_path: Option<PathBuf>,
}

/// Two-stage keyword search: prefilter candidates, then an exact scan of
/// every candidate page.
pub struct SearchEngine {
    pool: rayon::ThreadPool,
    context_chars: usize,
    parallel_page_threshold: usize,
    marker: Marker,
}

impl SearchEngine {
    pub fn new(page_workers: usize, parallel_page_threshold: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(page_workers.max(1))
            .thread_name(|i| format!("pdfsift-scan-{i}"))
            .build()?;
        Ok(Self {
            pool,
            context_chars: DEFAULT_CONTEXT_CHARS,
            parallel_page_threshold,
            marker: Marker::default(),
        })
    }

    pub fn with_context_chars(mut self, context_chars: usize) -> Self {
        self.context_chars = context_chars;
        self
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.marker = marker;
        self
    }

    pub fn marker(&self) -> Marker {
        self.marker
    }

    /// Every occurrence of `keyword` across the candidate documents.
    ///
    /// Records follow candidate order, then page order, then position on
    /// the page. A blank keyword returns nothing without consulting the
    /// prefilter or the cache.
    pub fn search(
        &self,
        keyword: &str,
        cache: &ExtractionCache,
        filter: &impl CandidateFilter,
        locator: &Locator,
    ) -> Vec<MatchRecord> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Vec::new();
        }

        let candidates = filter.candidates(keyword).unwrap_or_else(|| {
            debug!("prefilter unavailable, scanning every cached document");
            cache.filenames().map(str::to_string).collect()
        });

        let mut results = Vec::new();
        for filename in &candidates {
            // Candidates can outlive their cache entry, e.g. after a rename.
            let Some(entry) = cache.get(filename) else {
                continue;
            };
            results.extend(self.scan_document(
                filename,
                &entry.pages,
                keyword,
                locator.resolve(filename),
            ));
        }

        debug!(
            keyword,
            candidates = candidates.len(),
            matches = results.len(),
            "search finished"
        );
        results
    }

    /// Scan all pages of one document, in page order.
    pub fn scan_document(
        &self,
        filename: &str,
        pages: &[String],
        keyword: &str,
        resolved: Option<&Path>,
    ) -> Vec<MatchRecord> {
        let scan = |(index, page): (usize, &String)| {
            self.scan_page(filename, index + 1, page, keyword, resolved)
        };

        if pages.len() > self.parallel_page_threshold {
            let per_page: Vec<Vec<MatchRecord>> = self
                .pool
                .install(|| pages.par_iter().enumerate().map(scan).collect());
            per_page.into_iter().flatten().collect()
        } else {
            pages.iter().enumerate().flat_map(scan).collect()
        }
    }

    /// One record per occurrence of `keyword` on the page, left to right.
    pub fn scan_page(
        &self,
        filename: &str,
        page_number: usize,
        page: &str,
        keyword: &str,
        resolved: Option<&Path>,
    ) -> Vec<MatchRecord> {
        text_util::find_occurrences(page, keyword)
            .into_iter()
            .map(|hit| MatchRecord {
                file: filename.to_string(),
                page_number,
                context: text_util::snippet(
                    page,
                    hit,
                    keyword,
                    self.context_chars,
                    self.marker,
                ),
                page_text: page.to_string(),
                resolved_path: resolved.map(Path::to_path_buf),
            })
            .collect()
    }
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("page_workers", &self.pool.current_num_threads())
            .field("context_chars", &self.context_chars)
            .field("parallel_page_threshold", &self.parallel_page_threshold)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::cache::{CacheEntry, EntryMetadata};

    /// Candidate source with a fixed answer that counts its calls.
    struct FixedFilter {
        answer: Option<Vec<String>>,
        calls: Cell<usize>,
    }

    impl FixedFilter {
        fn new(answer: Option<&[&str]>) -> Self {
            Self {
                answer: answer
                    .map(|names| names.iter().map(|n| n.to_string()).collect()),
                calls: Cell::new(0),
            }
        }
    }

    impl CandidateFilter for FixedFilter {
        fn candidates(&self, _keyword: &str) -> Option<Vec<String>> {
            self.calls.set(self.calls.get() + 1);
            self.answer.clone()
        }
    }

    fn cache_of(docs: Vec<(&str, Vec<&str>)>) -> ExtractionCache {
        let mut cache = ExtractionCache::default();
        for (name, pages) in docs {
            cache.replace(
                name.to_string(),
                CacheEntry {
                    pages: pages.iter().map(|p| p.to_string()).collect(),
                    metadata: EntryMetadata {
                        mtime: 1,
                        processed_at: 1,
                    },
                },
            );
        }
        cache
    }

    fn engine() -> SearchEngine {
        SearchEngine::new(4, 20).unwrap()
    }

    fn sample_cache() -> ExtractionCache {
        cache_of(vec![
            ("alpha.pdf", vec!["hello world", "no match here"]),
            ("beta.pdf", vec!["another world of hello"]),
        ])
    }

    #[test]
    fn blank_keyword_touches_nothing() {
        let filter = FixedFilter::new(None);
        let cache = sample_cache();
        let locator = Locator::default();

        assert!(engine().search("", &cache, &filter, &locator).is_empty());
        assert!(engine().search("   ", &cache, &filter, &locator).is_empty());
        assert_eq!(filter.calls.get(), 0);
    }

    #[test]
    fn falls_back_to_full_scan_when_prefilter_unavailable() {
        let filter = FixedFilter::new(None);
        let results =
            engine().search("hello", &sample_cache(), &filter, &Locator::default());

        let found: Vec<_> = results
            .iter()
            .map(|r| (r.file.as_str(), r.page_number))
            .collect();
        assert_eq!(found, vec![("alpha.pdf", 1), ("beta.pdf", 1)]);
        assert_eq!(filter.calls.get(), 1);
    }

    #[test]
    fn only_candidates_are_scanned() {
        let filter = FixedFilter::new(Some(&["beta.pdf"]));
        let results =
            engine().search("hello", &sample_cache(), &filter, &Locator::default());

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file, "beta.pdf");
    }

    #[test]
    fn unknown_candidates_are_skipped() {
        let filter = FixedFilter::new(Some(&["renamed.pdf", "alpha.pdf"]));
        let results =
            engine().search("hello", &sample_cache(), &filter, &Locator::default());

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file, "alpha.pdf");
    }

    #[test]
    fn keyword_is_trimmed() {
        let filter = FixedFilter::new(None);
        let results = engine().search(
            "  world ",
            &sample_cache(),
            &filter,
            &Locator::default(),
        );
        assert_eq!(results.len(), 2);
        assert!(results[0].context.contains("<mark>world</mark>"));
    }

    #[test]
    fn one_record_per_occurrence() {
        let page = "Fox one. fox two. FOX three.";
        let results = engine().scan_page("f.pdf", 3, page, "fox", None);

        assert_eq!(results.len(), 3);
        for r in &results {
            assert_eq!(r.page_number, 3);
            assert_eq!(r.page_text, page);
            assert_eq!(r.context.matches("<mark>").count(), 3);
        }
    }

    #[test]
    fn context_brackets_original_case() {
        let page = "the quick brown FOX jumps over the lazy dog";
        let results = engine().scan_page("f.pdf", 1, page, "fox", None);

        assert_eq!(
            results[0].context,
            "the quick brown <mark>FOX</mark> jumps over the lazy dog"
        );
    }

    #[test]
    fn resolved_path_comes_from_locator() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("alpha.pdf"), "x").unwrap();
        let locator = Locator::build(&[tmp.path().into()]);

        let results = engine().search(
            "hello",
            &sample_cache(),
            &FixedFilter::new(None),
            &locator,
        );
        let alpha = results.iter().find(|r| r.file == "alpha.pdf").unwrap();
        let beta = results.iter().find(|r| r.file == "beta.pdf").unwrap();
        assert_eq!(
            alpha.resolved_path.as_deref(),
            Some(std::path::absolute(tmp.path().join("alpha.pdf")).unwrap().as_path())
        );
        assert_eq!(beta.resolved_path, None);
    }

    #[test]
    fn parallel_scan_keeps_page_order() {
        let pages: Vec<String> = (0..60)
            .map(|i| {
                if i % 3 == 0 {
                    format!("page {i} mentions Widget and widget")
                } else {
                    format!("page {i} is empty of it")
                }
            })
            .collect();

        let sequential = SearchEngine::new(4, 1000).unwrap();
        let parallel = SearchEngine::new(4, 20).unwrap();
        let a = sequential.scan_document("w.pdf", &pages, "widget", None);
        let b = parallel.scan_document("w.pdf", &pages, "widget", None);

        assert_eq!(a.len(), 40);
        assert_eq!(a, b);
        let numbers: Vec<_> = b.iter().map(|r| r.page_number).collect();
        assert!(numbers.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn context_radius_is_configurable() {
        let page = "one two three four five six seven eight nine";
        let engine = engine().with_context_chars(3);
        let results = engine.scan_page("n.pdf", 1, page, "five", None);
        assert_eq!(results[0].context, "four <mark>five</mark> six");
    }

    #[test]
    fn marker_is_configurable() {
        let engine = engine().with_marker(Marker {
            open: "**",
            close: "**",
        });
        let results = engine.scan_page("m.pdf", 1, "say Hello", "hello", None);
        assert_eq!(results[0].context, "say **Hello**");
    }
}
