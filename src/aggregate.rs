use std::collections::HashMap;

use serde::Serialize;

use crate::search::MatchRecord;

/// Default number of records per page in the linear listing.
pub const DEFAULT_RESULTS_PER_PAGE: usize = 20;

/// All matches from one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileGroup {
    pub file: String,
    pub matches: Vec<MatchRecord>,
}

impl FileGroup {
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Search results grouped by file, largest group first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupedResults {
    pub groups: Vec<FileGroup>,
}

/// Group records by file and order groups by descending match count.
///
/// Groups with equal counts keep the order in which their file first
/// appears in `records`.
pub fn group_by_file(records: Vec<MatchRecord>) -> GroupedResults {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<FileGroup> = Vec::new();

    for record in records {
        let idx = *position.entry(record.file.clone()).or_insert_with(|| {
            groups.push(FileGroup {
                file: record.file.clone(),
                matches: Vec::new(),
            });
            groups.len() - 1
        });
        groups[idx].matches.push(record);
    }

    // Stable sort keeps first-appearance order among ties.
    groups.sort_by(|a, b| b.len().cmp(&a.len()));
    GroupedResults { groups }
}

impl GroupedResults {
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.file.as_str())
    }

    pub fn get(&self, file: &str) -> Option<&FileGroup> {
        self.groups.iter().find(|g| g.file == file)
    }

    pub fn file_count(&self) -> usize {
        self.groups.len()
    }

    pub fn match_count(&self) -> usize {
        self.groups.iter().map(FileGroup::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Keep only groups whose file name contains `needle`, ignoring case.
    pub fn filter_by_name(self, needle: &str) -> Self {
        let needle = needle.to_lowercase();
        if needle.is_empty() {
            return self;
        }
        Self {
            groups: self
                .groups
                .into_iter()
                .filter(|g| g.file.to_lowercase().contains(&needle))
                .collect(),
        }
    }

    /// All records in group order.
    pub fn flatten(&self) -> Vec<&MatchRecord> {
        self.groups.iter().flat_map(|g| &g.matches).collect()
    }

    /// Number of pages needed to list every record, at least 1.
    pub fn page_count(&self, per_page: usize) -> usize {
        self.match_count().div_ceil(per_page.max(1)).max(1)
    }

    /// The 1-indexed `page` of the flattened listing. Out of range pages
    /// are empty.
    pub fn page(&self, page: usize, per_page: usize) -> Vec<&MatchRecord> {
        let per_page = per_page.max(1);
        let Some(skip) = page.checked_sub(1).map(|p| p * per_page) else {
            return Vec::new();
        };
        self.flatten().into_iter().skip(skip).take(per_page).collect()
    }
}
