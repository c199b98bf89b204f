use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::error::Result;

const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");
const INGEST_RUNS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("ingest_runs");

/// Known setting keys.
pub mod keys {
    pub const INDEX_NAME: &str = "index_name";
    pub const CATALOG_PATH: &str = "catalog_path";
    pub const NUM_RESULTS: &str = "num_results";
}

pub const DEFAULT_INDEX_NAME: &str = "datapath";

/// Summary of one ingestion run, kept for `tdm status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub finished_at: DateTime<Utc>,
    pub source: String,
    pub root: String,
    pub models_ok: usize,
    pub models_failed: usize,
    pub paths_created: usize,
    pub paths_reused: usize,
    pub collisions: usize,
}

/// Settings and run history for a data directory.
pub struct ConfigDb {
    db: Database,
}

impl ConfigDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(SETTINGS)?;
        txn.open_table(INGEST_RUNS)?;
        txn.commit()?;

        Ok(Self { db })
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

    /// Get a setting, returning the default if not set.
    pub fn get_setting_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get_setting(key)?
            .unwrap_or_else(|| default.to_string()))
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

    pub fn list_settings(&self) -> Result<Vec<(String, String)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_string()));
        }
        Ok(result)
    }

    pub fn index_name(&self) -> Result<String> {
        self.get_setting_or(keys::INDEX_NAME, DEFAULT_INDEX_NAME)
    }

    // -- Run history --

    /// Append a run record and return its sequence number.
    pub fn record_run(&self, run: &RunRecord) -> Result<u64> {
        let bytes = serde_json::to_vec(run)?;
        let txn = self.db.begin_write()?;
        let seq = {
            let mut table = txn.open_table(INGEST_RUNS)?;
            let next = table.last()?.map(|(k, _)| k.value() + 1).unwrap_or(0);
            table.insert(next, bytes.as_slice())?;
            next
        };
        txn.commit()?;
        Ok(seq)
    }

    /// The most recent `limit` runs, newest first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(INGEST_RUNS)?;
        let mut result = Vec::new();
        for entry in table.iter()?.rev().take(limit) {
            let (_k, v) = entry?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }
}

impl std::fmt::Debug for ConfigDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigDb").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, ConfigDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = ConfigDb::open(&tmp.path().join("config.redb")).unwrap();
        (tmp, db)
    }

    fn run(source: &str, models_ok: usize) -> RunRecord {
        RunRecord {
            finished_at: Utc::now(),
            source: source.to_string(),
            root: "/data".to_string(),
            models_ok,
            models_failed: 0,
            paths_created: 10,
            paths_reused: 2,
            collisions: 1,
        }
    }

    #[test]
    fn settings_crud() {
        let (_tmp, db) = test_db();

        assert_eq!(db.get_setting(keys::INDEX_NAME).unwrap(), None);
        assert_eq!(db.index_name().unwrap(), DEFAULT_INDEX_NAME);

        db.set_setting(keys::INDEX_NAME, "paths_v2").unwrap();
        assert_eq!(db.index_name().unwrap(), "paths_v2");
        assert_eq!(db.list_settings().unwrap().len(), 1);

        assert!(db.remove_setting(keys::INDEX_NAME).unwrap());
        assert!(!db.remove_setting(keys::INDEX_NAME).unwrap());
        assert_eq!(db.index_name().unwrap(), DEFAULT_INDEX_NAME);
    }

    #[test]
    fn runs_are_returned_newest_first() {
        let (_tmp, db) = test_db();

        assert_eq!(db.record_run(&run("yang", 1)).unwrap(), 0);
        assert_eq!(db.record_run(&run("mib", 2)).unwrap(), 1);
        assert_eq!(db.record_run(&run("yang", 3)).unwrap(), 2);

        let recent = db.recent_runs(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].models_ok, 3);
        assert_eq!(recent[1].source, "mib");
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.redb");

        {
            let db = ConfigDb::open(&path).unwrap();
            db.set_setting(keys::CATALOG_PATH, "/etc/tdm/catalog.json")
                .unwrap();
            db.record_run(&run("mib", 4)).unwrap();
        }

        {
            let db = ConfigDb::open(&path).unwrap();
            assert_eq!(
                db.get_setting(keys::CATALOG_PATH).unwrap(),
                Some("/etc/tdm/catalog.json".to_string())
            );
            assert_eq!(db.recent_runs(10).unwrap().len(), 1);
        }
    }
}
