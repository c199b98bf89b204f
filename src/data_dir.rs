//! On-disk layout of a tdm installation.
//!
//! ```text
//! <root>/
//!   graph.redb       vertex and edge collections
//!   config.redb      settings and ingest run history
//!   tantivy/         one directory per search index, plus
//!                    <index>.config.json next to it
//! ```
//!
//! Nothing in here is authoritative except `graph.redb`; the search index
//! can always be rebuilt with `tdm project --recreate`.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Overrides the XDG location when `--data-dir` is not given.
pub const DATA_DIR_ENV: &str = "TDM_DATA_DIR";

const GRAPH_FILE: &str = "graph.redb";
const CONFIG_FILE: &str = "config.redb";
const SEARCH_DIR: &str = "tantivy";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// `--data-dir` wins over `TDM_DATA_DIR`, which wins over
    /// `$XDG_DATA_HOME/tdm`. The root is created if missing.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = match (explicit, std::env::var_os(DATA_DIR_ENV)) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(env)) => PathBuf::from(env),
            (None, None) => xdg::BaseDirectories::with_prefix("tdm")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config("no XDG data home for the graph".into())
                })?,
        };
        Ok(Self {
            root: ensure_dir(root)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn graph_db(&self) -> PathBuf {
        self.root.join(GRAPH_FILE)
    }

    pub fn config_db(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Root of the search indexes, created on first use.
    pub fn tantivy_dir(&self) -> Result<PathBuf> {
        ensure_dir(self.root.join(SEARCH_DIR))
    }
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf> {
    match std::fs::create_dir_all(&path) {
        Ok(()) => Ok(path),
        Err(_) => Err(Error::DataDir(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_live_under_the_explicit_root() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();

        assert_eq!(dir.root(), tmp.path());
        assert_eq!(dir.graph_db(), tmp.path().join("graph.redb"));
        assert_eq!(dir.config_db(), tmp.path().join("config.redb"));
    }

    #[test]
    fn nested_root_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("lab").join("tdm");
        let dir = DataDir::resolve(Some(&nested)).unwrap();

        assert!(nested.is_dir());
        assert_eq!(dir.root(), nested);
        // Stores are opened lazily.
        assert!(!dir.graph_db().exists());
    }

    #[test]
    fn search_root_is_created_once() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();

        let first = dir.tantivy_dir().unwrap();
        let second = dir.tantivy_dir().unwrap();
        assert!(first.is_dir());
        assert_eq!(first, second);
        assert_eq!(first, tmp.path().join("tantivy"));
    }

    #[test]
    fn root_that_is_a_file_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("occupied");
        std::fs::write(&file, "").unwrap();

        let err = DataDir::resolve(Some(&file)).unwrap_err();
        assert!(matches!(err, Error::DataDir(path) if path == file));
    }
}
