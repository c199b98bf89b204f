//! Graph store abstraction.
//!
//! Vertices live in named collections and are addressed by a
//! [`VertexHandle`] (`Collection/key`). Edges are directed, live in their own
//! collections and may carry a document of fields. The operations mirror what
//! the ingestion pipeline needs from a document graph database: keyed vertex
//! creation, unique indexes and bounded-depth traversal.

use std::fmt;

use serde_json::Value;

use crate::error::{Error, Result};

/// Field document stored on vertices and edges.
pub type Document = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexCollection {
    DataPath,
    DataModel,
    DataModelLanguage,
    DataType,
    Os,
    Release,
    Calculation,
}

impl VertexCollection {
    pub const ALL: [VertexCollection; 7] = [
        VertexCollection::DataPath,
        VertexCollection::DataModel,
        VertexCollection::DataModelLanguage,
        VertexCollection::DataType,
        VertexCollection::Os,
        VertexCollection::Release,
        VertexCollection::Calculation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VertexCollection::DataPath => "DataPath",
            VertexCollection::DataModel => "DataModel",
            VertexCollection::DataModelLanguage => "DataModelLanguage",
            VertexCollection::DataType => "DataType",
            VertexCollection::Os => "OS",
            VertexCollection::Release => "Release",
            VertexCollection::Calculation => "Calculation",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for VertexCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeCollection {
    DataPathFromDataModel,
    OfDataType,
    DataModelParent,
    DataModelChild,
    DataPathParent,
    DataPathChild,
    ReleaseHasDataModel,
    OsHasRelease,
    ReleaseRevision,
    OfDataModelLanguage,
    DataModelLanguageHasDataType,
    DataPathMatch,
    InCalculation,
    CalculationResult,
}

impl EdgeCollection {
    pub const ALL: [EdgeCollection; 14] = [
        EdgeCollection::DataPathFromDataModel,
        EdgeCollection::OfDataType,
        EdgeCollection::DataModelParent,
        EdgeCollection::DataModelChild,
        EdgeCollection::DataPathParent,
        EdgeCollection::DataPathChild,
        EdgeCollection::ReleaseHasDataModel,
        EdgeCollection::OsHasRelease,
        EdgeCollection::ReleaseRevision,
        EdgeCollection::OfDataModelLanguage,
        EdgeCollection::DataModelLanguageHasDataType,
        EdgeCollection::DataPathMatch,
        EdgeCollection::InCalculation,
        EdgeCollection::CalculationResult,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EdgeCollection::DataPathFromDataModel => "DataPathFromDataModel",
            EdgeCollection::OfDataType => "OfDataType",
            EdgeCollection::DataModelParent => "DataModelParent",
            EdgeCollection::DataModelChild => "DataModelChild",
            EdgeCollection::DataPathParent => "DataPathParent",
            EdgeCollection::DataPathChild => "DataPathChild",
            EdgeCollection::ReleaseHasDataModel => "ReleaseHasDataModel",
            EdgeCollection::OsHasRelease => "OSHasRelease",
            EdgeCollection::ReleaseRevision => "ReleaseRevision",
            EdgeCollection::OfDataModelLanguage => "OfDataModelLanguage",
            EdgeCollection::DataModelLanguageHasDataType => {
                "DataModelLanguageHasDataType"
            }
            EdgeCollection::DataPathMatch => "DataPathMatch",
            EdgeCollection::InCalculation => "InCalculation",
            EdgeCollection::CalculationResult => "CalculationResult",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for EdgeCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of a vertex: its collection plus its key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexHandle {
    collection: VertexCollection,
    key: String,
}

impl VertexHandle {
    pub fn new(collection: VertexCollection, key: impl Into<String>) -> Self {
        Self {
            collection,
            key: key.into(),
        }
    }

    pub fn collection(&self) -> VertexCollection {
        self.collection
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The `Collection/key` form used in stored edges.
    pub fn id(&self) -> String {
        format!("{}/{}", self.collection.as_str(), self.key)
    }

    /// Parse a `Collection/key` id.
    pub fn parse(id: &str) -> Result<Self> {
        let (collection, key) = id
            .split_once('/')
            .and_then(|(c, k)| Some((VertexCollection::parse(c)?, k)))
            .ok_or_else(|| Error::Config(format!("invalid vertex id: {id}")))?;
        Ok(Self::new(collection, key))
    }
}

impl fmt::Display for VertexHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection.as_str(), self.key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub handle: VertexHandle,
    pub fields: Document,
}

impl Vertex {
    pub fn key(&self) -> &str {
        self.handle.key()
    }

    /// A string field, `None` when absent or not a string.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// A boolean field, false when absent.
    pub fn flag(&self, name: &str) -> bool {
        self.fields
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeHandle {
    pub collection: EdgeCollection,
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub handle: EdgeHandle,
    pub from: VertexHandle,
    pub to: VertexHandle,
    pub fields: Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
    Any,
}

/// One path found by [`GraphStore::traverse`]. `vertices[0]` is the start
/// vertex and `edges[i]` connects `vertices[i]` to `vertices[i + 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalPath {
    pub vertices: Vec<Vertex>,
    pub edges: Vec<Edge>,
}

pub trait GraphStore: Send + Sync {
    /// Insert a vertex. Without an explicit key an increasing numeric key is
    /// assigned.
    fn create_vertex(
        &self,
        collection: VertexCollection,
        fields: Document,
        key: Option<&str>,
    ) -> Result<VertexHandle>;

    fn lookup_vertex(
        &self,
        collection: VertexCollection,
        key: &str,
    ) -> Result<Option<Vertex>>;

    /// Merge `fields` into an existing vertex.
    fn update_vertex(&self, handle: &VertexHandle, fields: Document)
    -> Result<()>;

    fn create_edge(
        &self,
        collection: EdgeCollection,
        from: &VertexHandle,
        to: &VertexHandle,
        fields: Document,
    ) -> Result<EdgeHandle>;

    /// Delete one edge. Returns whether it existed.
    fn remove_edge(&self, handle: EdgeHandle) -> Result<bool>;

    /// Declare `field` unique within `collection`. Idempotent.
    fn ensure_unique_index(
        &self,
        collection: VertexCollection,
        field: &str,
    ) -> Result<()>;

    /// All paths of `min_hops..=max_hops` edges from `start`, following any
    /// of `edge_collections` in `direction`. An edge appears at most once per
    /// path.
    fn traverse(
        &self,
        start: &VertexHandle,
        min_hops: usize,
        max_hops: usize,
        edge_collections: &[EdgeCollection],
        direction: Direction,
    ) -> Result<Vec<TraversalPath>>;

    /// Vertices whose `field` equals `value`.
    fn find(
        &self,
        collection: VertexCollection,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Vertex>>;

    fn scan(&self, collection: VertexCollection) -> Result<Vec<Vertex>>;

    fn edges(&self, collection: EdgeCollection) -> Result<Vec<Edge>>;

    fn edges_between(
        &self,
        collection: EdgeCollection,
        from: &VertexHandle,
        to: &VertexHandle,
    ) -> Result<Vec<Edge>>;

    fn count_vertices(&self, collection: VertexCollection) -> Result<usize>;

    fn count_edges(&self, collection: EdgeCollection) -> Result<usize>;

    fn get_vertex(
        &self,
        collection: VertexCollection,
        key: &str,
    ) -> Result<Vertex> {
        self.lookup_vertex(collection, key)?
            .ok_or_else(|| Error::NotFound {
                kind: collection.as_str(),
                name: key.to_string(),
            })
    }
}

/// Build a [`Document`] from `(name, value)` pairs.
pub fn document<I, K>(pairs: I) -> Document
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Replace spaces so names can serve as vertex keys.
pub fn sanitize_key(key: &str) -> String {
    key.replace(' ', "_")
}
