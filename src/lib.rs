//! tdm - a searchable, deduplicated graph of network telemetry data models.
//!
//! tdm loads YANG modules and SNMP MIBs, per OS release, into a property
//! graph kept in [redb](https://github.com/cberner/redb). Every data path is
//! stored once no matter how many models and releases carry it. The graph
//! is then projected into a [Tantivy](https://github.com/quickwit-oss/tantivy)
//! index for ranked path search, grouped by human-readable id.
//!
//! # Quick start
//!
//! ```no_run
//! use std::path::Path;
//!
//! use tdm::{ConfigDb, DataDir, RedbGraph, TantivySearchStore};
//! use tdm::{catalog::Catalog, ingestion::Ingestor, seed};
//! use tdm::{index_config::IndexConfig, projector::SearchProjector};
//! use tdm::{query::SearchCriteria, search, search_store};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let config_db = ConfigDb::open(&data_dir.config_db()).unwrap();
//! let graph = RedbGraph::open(&data_dir.graph_db()).unwrap();
//! seed::seed_languages(&graph).unwrap();
//!
//! let catalog = Catalog::builtin();
//! Ingestor::new(&graph, &catalog)
//!     .unwrap()
//!     .ingest_yang(Path::new("yang/vendor/cisco"))
//!     .unwrap();
//!
//! let index = config_db.index_name().unwrap();
//! let store = TantivySearchStore::open(&data_dir.tantivy_dir().unwrap())
//!     .unwrap();
//! search_store::provision(&store, &index, &IndexConfig::datapath()).unwrap();
//! SearchProjector::new(&graph)
//!     .project_into(&store, &index, None)
//!     .unwrap();
//!
//! let criteria = SearchCriteria::new("interface in octets");
//! let response = search::execute_search(&store, &index, &criteria).unwrap();
//! for hit in &response.human_ids {
//!     println!("{} ({:.3})", hit.human_id, hit.relevance);
//! }
//! ```

pub mod builder;
pub mod catalog;
pub mod config_db;
pub mod curation;
pub mod data_dir;
pub mod dedup;
pub mod error;
pub mod explore;
pub mod graph_store;
pub mod index_config;
pub mod ingestion;
pub mod lineage;
pub mod mib_source;
pub mod parse_tree;
pub mod path_analyzer;
pub mod projector;
pub mod query;
pub mod rank;
pub mod redb_graph;
pub mod search;
pub mod search_store;
pub mod seed;
pub mod tantivy_index;
pub mod walker;
pub mod xpath;
pub mod yang_source;

pub use config_db::ConfigDb;
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use graph_store::GraphStore;
pub use redb_graph::RedbGraph;
pub use search_store::SearchStore;
pub use tantivy_index::TantivySearchStore;
