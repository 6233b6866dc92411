use std::path::{Path, PathBuf};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::error::{Error, Result};

const ROOTS: TableDefinition<&str, &str> = TableDefinition::new("roots");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Upper bound on document-level extraction workers.
pub const MAX_EXTRACT_WORKERS: usize = 12;

/// Setting keys understood by [`Tunables::load`].
pub mod keys {
    pub const CONTEXT_CHARS: &str = "context_chars";
    pub const EXTRACT_WORKERS: &str = "extract_workers";
    pub const PAGE_WORKERS: &str = "page_workers";
    pub const PARALLEL_PAGE_THRESHOLD: &str = "parallel_page_threshold";

    pub const ALL: &[&str] = &[
        CONTEXT_CHARS,
        EXTRACT_WORKERS,
        PAGE_WORKERS,
        PARALLEL_PAGE_THRESHOLD,
    ];
}

pub struct ConfigDb {
    db: Database,
}

impl ConfigDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(ROOTS)?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Roots --

    pub fn set_root(&self, name: &str, path: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ROOTS)?;
            table.insert(name, path)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_root(&self, name: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ROOTS)?;
        Ok(table.get(name)?.map(|v| v.value().to_string()))
    }

    pub fn remove_root(&self, name: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(ROOTS)?;
            table.remove(name)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// All registered roots as `(name, path)`, ordered by name.
    pub fn list_roots(&self) -> Result<Vec<(String, String)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ROOTS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_string()));
        }
        Ok(result)
    }

    /// Root directories in scan order. Later roots win filename collisions.
    pub fn root_paths(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .list_roots()?
            .into_iter()
            .map(|(_, path)| PathBuf::from(path))
            .collect())
    }

    // -- Settings --

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    pub fn remove_setting(&self, key: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SETTINGS)?;
            table.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Validate and store a tunable.
    pub fn set_tunable(&self, key: &str, value: &str) -> Result<()> {
        if !keys::ALL.contains(&key) {
            return Err(Error::Config(format!("unknown setting '{key}'")));
        }
        parse_positive(key, value)?;
        self.set_setting(key, value)
    }
}

impl std::fmt::Debug for ConfigDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigDb").finish_non_exhaustive()
    }
}

/// Sizing and window parameters for extraction and search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunables {
    /// Characters of context kept on each side of a match.
    pub context_chars: usize,
    pub extract_workers: usize,
    pub page_workers: usize,
    /// Documents with more pages than this are scanned on the page pool.
    pub parallel_page_threshold: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            context_chars: 150,
            extract_workers: default_extract_workers(),
            page_workers: 4,
            parallel_page_threshold: 20,
        }
    }
}

impl Tunables {
    /// Read overrides from the settings table, falling back to defaults.
    pub fn load(config_db: &ConfigDb) -> Result<Self> {
        let mut tunables = Self::default();
        let read = |key: &str| -> Result<Option<usize>> {
            config_db
                .get_setting(key)?
                .map(|v| parse_positive(key, &v))
                .transpose()
        };

        if let Some(v) = read(keys::CONTEXT_CHARS)? {
            tunables.context_chars = v;
        }
        if let Some(v) = read(keys::EXTRACT_WORKERS)? {
            tunables.extract_workers = v.min(MAX_EXTRACT_WORKERS);
        }
        if let Some(v) = read(keys::PAGE_WORKERS)? {
            tunables.page_workers = v;
        }
        if let Some(v) = read(keys::PARALLEL_PAGE_THRESHOLD)? {
            tunables.parallel_page_threshold = v;
        }
        Ok(tunables)
    }

    /// Effective value of the setting named `key`.
    pub fn value(&self, key: &str) -> Option<usize> {
        match key {
            keys::CONTEXT_CHARS => Some(self.context_chars),
            keys::EXTRACT_WORKERS => Some(self.extract_workers),
            keys::PAGE_WORKERS => Some(self.page_workers),
            keys::PARALLEL_PAGE_THRESHOLD => Some(self.parallel_page_threshold),
            _ => None,
        }
    }
}

fn default_extract_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_EXTRACT_WORKERS)
}

fn parse_positive(key: &str, value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::Config(format!(
            "setting '{key}' must be a positive integer, got '{value}'"
        ))),
    }
}
