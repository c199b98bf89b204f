use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("search index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    #[error("type resolution failed for {node}: {reason}")]
    TypeResolution { node: String, reason: String },

    #[error("malformed source tree in {source_name}: {reason}")]
    MalformedSourceTree { source_name: String, reason: String },

    #[error("search index already exists: {0}")]
    IndexAlreadyExists(String),

    #[error("unique constraint violated on {collection}.{field} = {value}")]
    UniqueConstraint {
        collection: &'static str,
        field: String,
        value: String,
    },

    #[error("{collection} already has a vertex with key {key}")]
    DuplicateVertexKey { collection: &'static str, key: String },

    #[error("more than one {kind} matches {name}")]
    Ambiguous { kind: &'static str, name: String },

    #[error("mapping already exists between {from} and {to}")]
    MappingExists { from: String, to: String },

    #[error("calculation of name {0} already exists")]
    CalculationExists(String),
}
