use std::path::Path;

use redb::{
    Database,
    MultimapTableDefinition,
    ReadableDatabase,
    ReadableMultimapTable,
    ReadableTable,
    TableDefinition,
    WriteTransaction,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    graph_store::{
        Direction,
        Document,
        Edge,
        EdgeCollection,
        EdgeHandle,
        GraphStore,
        TraversalPath,
        Vertex,
        VertexCollection,
        VertexHandle,
    },
};

/// (collection, key) -> JSON field document.
const VERTICES: TableDefinition<(&str, &str), &[u8]> =
    TableDefinition::new("vertices");
/// (edge collection, edge id) -> JSON [`StoredEdge`].
const EDGES: TableDefinition<(&str, u64), &[u8]> =
    TableDefinition::new("edges");
/// (edge collection, from vertex id) -> edge ids.
const OUTBOUND: MultimapTableDefinition<(&str, &str), u64> =
    MultimapTableDefinition::new("outbound");
/// (edge collection, to vertex id) -> edge ids.
const INBOUND: MultimapTableDefinition<(&str, &str), u64> =
    MultimapTableDefinition::new("inbound");
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
/// (collection, field) registered as unique.
const UNIQUE_FIELDS: TableDefinition<(&str, &str), bool> =
    TableDefinition::new("unique_fields");
/// (collection, field, value) -> owning vertex key.
const UNIQUE_ENTRIES: TableDefinition<(&str, &str, &str), &str> =
    TableDefinition::new("unique_entries");

#[derive(Debug, Serialize, Deserialize)]
struct StoredEdge {
    from: String,
    to: String,
    #[serde(default)]
    fields: Document,
}

/// [`GraphStore`] backed by a single redb file.
///
/// Every mutation runs in its own write transaction; redb serializes
/// writers, so the store can be shared across ingestion threads.
pub struct RedbGraph {
    db: Database,
}

impl RedbGraph {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(VERTICES)?;
        txn.open_table(EDGES)?;
        txn.open_multimap_table(OUTBOUND)?;
        txn.open_multimap_table(INBOUND)?;
        txn.open_table(SEQUENCES)?;
        txn.open_table(UNIQUE_FIELDS)?;
        txn.open_table(UNIQUE_ENTRIES)?;
        txn.commit()?;

        Ok(Self { db })
    }
}

fn next_sequence(txn: &WriteTransaction, name: &str) -> Result<u64> {
    let mut table = txn.open_table(SEQUENCES)?;
    let current = table.get(name)?.map(|v| v.value()).unwrap_or(0);
    table.insert(name, current + 1)?;
    Ok(current + 1)
}

/// Stable string form of a field value for unique index entries.
fn index_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn unique_fields_of<T>(table: &T, collection: &str) -> Result<Vec<String>>
where
    T: ReadableTable<(&'static str, &'static str), bool>,
{
    let mut fields = Vec::new();
    for entry in table.range((collection, "")..)? {
        let (k, _v) = entry?;
        let (c, field) = k.value();
        if c != collection {
            break;
        }
        fields.push(field.to_string());
    }
    Ok(fields)
}

fn read_vertex<T>(table: &T, handle: &VertexHandle) -> Result<Option<Vertex>>
where
    T: ReadableTable<(&'static str, &'static str), &'static [u8]>,
{
    let Some(guard) = table.get((handle.collection().as_str(), handle.key()))?
    else {
        return Ok(None);
    };
    let fields: Document = serde_json::from_slice(guard.value())?;
    Ok(Some(Vertex {
        handle: handle.clone(),
        fields,
    }))
}

fn read_edge<T>(
    table: &T,
    collection: EdgeCollection,
    id: u64,
) -> Result<Option<Edge>>
where
    T: ReadableTable<(&'static str, u64), &'static [u8]>,
{
    let Some(guard) = table.get((collection.as_str(), id))? else {
        return Ok(None);
    };
    let stored: StoredEdge = serde_json::from_slice(guard.value())?;
    Ok(Some(Edge {
        handle: EdgeHandle { collection, id },
        from: VertexHandle::parse(&stored.from)?,
        to: VertexHandle::parse(&stored.to)?,
        fields: stored.fields,
    }))
}

fn adjacent_edge_ids<T>(
    table: &T,
    collection: EdgeCollection,
    vertex_id: &str,
) -> Result<Vec<u64>>
where
    T: ReadableMultimapTable<(&'static str, &'static str), u64>,
{
    let mut ids = Vec::new();
    for entry in table.get((collection.as_str(), vertex_id))? {
        ids.push(entry?.value());
    }
    Ok(ids)
}

impl GraphStore for RedbGraph {
    fn create_vertex(
        &self,
        collection: VertexCollection,
        fields: Document,
        key: Option<&str>,
    ) -> Result<VertexHandle> {
        let txn = self.db.begin_write()?;
        let handle = {
            let key = match key {
                Some(k) => k.to_string(),
                None => next_sequence(&txn, collection.as_str())?.to_string(),
            };
            let handle = VertexHandle::new(collection, key);

            let mut vertices = txn.open_table(VERTICES)?;
            if vertices.get((collection.as_str(), handle.key()))?.is_some() {
                return Err(Error::DuplicateVertexKey {
                    collection: collection.as_str(),
                    key: handle.key().to_string(),
                });
            }

            let unique = txn.open_table(UNIQUE_FIELDS)?;
            let mut entries = txn.open_table(UNIQUE_ENTRIES)?;
            for field in unique_fields_of(&unique, collection.as_str())? {
                let Some(value) = fields.get(&field) else {
                    continue;
                };
                let value = index_value(value);
                let slot = (collection.as_str(), field.as_str(), value.as_str());
                if entries.get(slot)?.is_some() {
                    return Err(Error::UniqueConstraint {
                        collection: collection.as_str(),
                        field,
                        value,
                    });
                }
                entries.insert(slot, handle.key())?;
            }

            let bytes = serde_json::to_vec(&fields)?;
            vertices
                .insert((collection.as_str(), handle.key()), bytes.as_slice())?;
            handle
        };
        txn.commit()?;
        Ok(handle)
    }

    fn lookup_vertex(
        &self,
        collection: VertexCollection,
        key: &str,
    ) -> Result<Option<Vertex>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(VERTICES)?;
        read_vertex(&table, &VertexHandle::new(collection, key))
    }

    fn update_vertex(
        &self,
        handle: &VertexHandle,
        fields: Document,
    ) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut vertices = txn.open_table(VERTICES)?;
            let mut vertex =
                read_vertex(&vertices, handle)?.ok_or_else(|| {
                    Error::NotFound {
                        kind: handle.collection().as_str(),
                        name: handle.key().to_string(),
                    }
                })?;

            let collection = handle.collection().as_str();
            let unique = txn.open_table(UNIQUE_FIELDS)?;
            let mut entries = txn.open_table(UNIQUE_ENTRIES)?;
            for field in unique_fields_of(&unique, collection)? {
                let (Some(new), old) =
                    (fields.get(&field), vertex.fields.get(&field))
                else {
                    continue;
                };
                if old == Some(new) {
                    continue;
                }
                let value = index_value(new);
                if entries
                    .get((collection, field.as_str(), value.as_str()))?
                    .is_some()
                {
                    return Err(Error::UniqueConstraint {
                        collection,
                        field,
                        value,
                    });
                }
                if let Some(old) = old {
                    let old = index_value(old);
                    entries.remove((collection, field.as_str(), old.as_str()))?;
                }
                entries.insert(
                    (collection, field.as_str(), value.as_str()),
                    handle.key(),
                )?;
            }

            vertex.fields.extend(fields);
            let bytes = serde_json::to_vec(&vertex.fields)?;
            vertices.insert((collection, handle.key()), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn create_edge(
        &self,
        collection: EdgeCollection,
        from: &VertexHandle,
        to: &VertexHandle,
        fields: Document,
    ) -> Result<EdgeHandle> {
        let txn = self.db.begin_write()?;
        let handle = {
            let vertices = txn.open_table(VERTICES)?;
            for endpoint in [from, to] {
                if read_vertex(&vertices, endpoint)?.is_none() {
                    return Err(Error::NotFound {
                        kind: endpoint.collection().as_str(),
                        name: endpoint.key().to_string(),
                    });
                }
            }

            let id = next_sequence(&txn, collection.as_str())?;
            let (from_id, to_id) = (from.id(), to.id());
            let stored = StoredEdge {
                from: from_id.clone(),
                to: to_id.clone(),
                fields,
            };
            let bytes = serde_json::to_vec(&stored)?;

            let mut edges = txn.open_table(EDGES)?;
            edges.insert((collection.as_str(), id), bytes.as_slice())?;
            let mut outbound = txn.open_multimap_table(OUTBOUND)?;
            outbound.insert((collection.as_str(), from_id.as_str()), id)?;
            let mut inbound = txn.open_multimap_table(INBOUND)?;
            inbound.insert((collection.as_str(), to_id.as_str()), id)?;

            EdgeHandle { collection, id }
        };
        txn.commit()?;
        Ok(handle)
    }

    fn remove_edge(&self, handle: EdgeHandle) -> Result<bool> {
        let collection = handle.collection.as_str();
        let txn = self.db.begin_write()?;
        let removed = {
            let mut edges = txn.open_table(EDGES)?;
            let stored: Option<StoredEdge> =
                match edges.remove((collection, handle.id))? {
                    Some(guard) => Some(serde_json::from_slice(guard.value())?),
                    None => None,
                };
            if let Some(stored) = &stored {
                let mut outbound = txn.open_multimap_table(OUTBOUND)?;
                outbound.remove((collection, stored.from.as_str()), handle.id)?;
                let mut inbound = txn.open_multimap_table(INBOUND)?;
                inbound.remove((collection, stored.to.as_str()), handle.id)?;
            }
            stored.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    fn ensure_unique_index(
        &self,
        collection: VertexCollection,
        field: &str,
    ) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut unique = txn.open_table(UNIQUE_FIELDS)?;
            if unique.get((collection.as_str(), field))?.is_some() {
                return Ok(());
            }
            unique.insert((collection.as_str(), field), true)?;

            let vertices = txn.open_table(VERTICES)?;
            let mut entries = txn.open_table(UNIQUE_ENTRIES)?;
            for entry in vertices.range((collection.as_str(), "")..)? {
                let (k, v) = entry?;
                let (c, key) = k.value();
                if c != collection.as_str() {
                    break;
                }
                let doc: Document = serde_json::from_slice(v.value())?;
                let Some(value) = doc.get(field) else {
                    continue;
                };
                let value = index_value(value);
                let slot = (collection.as_str(), field, value.as_str());
                if entries.get(slot)?.is_some() {
                    return Err(Error::UniqueConstraint {
                        collection: collection.as_str(),
                        field: field.to_string(),
                        value,
                    });
                }
                entries.insert(slot, key)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn traverse(
        &self,
        start: &VertexHandle,
        min_hops: usize,
        max_hops: usize,
        edge_collections: &[EdgeCollection],
        direction: Direction,
    ) -> Result<Vec<TraversalPath>> {
        let txn = self.db.begin_read()?;
        let vertices = txn.open_table(VERTICES)?;
        let edges = txn.open_table(EDGES)?;
        let outbound = txn.open_multimap_table(OUTBOUND)?;
        let inbound = txn.open_multimap_table(INBOUND)?;

        let first = read_vertex(&vertices, start)?.ok_or_else(|| {
            Error::NotFound {
                kind: start.collection().as_str(),
                name: start.key().to_string(),
            }
        })?;

        let mut results = Vec::new();
        let mut stack = vec![TraversalPath {
            vertices: vec![first],
            edges: Vec::new(),
        }];

        while let Some(path) = stack.pop() {
            let depth = path.edges.len();
            if depth >= min_hops {
                results.push(path.clone());
            }
            if depth >= max_hops {
                continue;
            }

            let Some(current) = path.vertices.last() else {
                continue;
            };
            let current_id = current.handle.id();

            let mut steps = Vec::new();
            for &collection in edge_collections {
                if matches!(direction, Direction::Outbound | Direction::Any) {
                    for id in
                        adjacent_edge_ids(&outbound, collection, &current_id)?
                    {
                        if let Some(edge) = read_edge(&edges, collection, id)? {
                            let next = edge.to.clone();
                            steps.push((edge, next));
                        }
                    }
                }
                if matches!(direction, Direction::Inbound | Direction::Any) {
                    for id in
                        adjacent_edge_ids(&inbound, collection, &current_id)?
                    {
                        if let Some(edge) = read_edge(&edges, collection, id)? {
                            let next = edge.from.clone();
                            steps.push((edge, next));
                        }
                    }
                }
            }

            // Reverse so paths pop off the stack in discovery order.
            for (edge, next) in steps.into_iter().rev() {
                if path.edges.iter().any(|e| e.handle == edge.handle) {
                    continue;
                }
                let Some(vertex) = read_vertex(&vertices, &next)? else {
                    continue;
                };
                let mut extended = path.clone();
                extended.edges.push(edge);
                extended.vertices.push(vertex);
                stack.push(extended);
            }
        }

        Ok(results)
    }

    fn find(
        &self,
        collection: VertexCollection,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Vertex>> {
        let txn = self.db.begin_read()?;
        let unique = txn.open_table(UNIQUE_FIELDS)?;
        let vertices = txn.open_table(VERTICES)?;

        if unique.get((collection.as_str(), field))?.is_some() {
            let entries = txn.open_table(UNIQUE_ENTRIES)?;
            let needle = index_value(value);
            let Some(key) =
                entries.get((collection.as_str(), field, needle.as_str()))?
            else {
                return Ok(Vec::new());
            };
            let handle = VertexHandle::new(collection, key.value());
            return Ok(read_vertex(&vertices, &handle)?.into_iter().collect());
        }

        let mut result = Vec::new();
        for entry in vertices.range((collection.as_str(), "")..)? {
            let (k, v) = entry?;
            let (c, key) = k.value();
            if c != collection.as_str() {
                break;
            }
            let fields: Document = serde_json::from_slice(v.value())?;
            if fields.get(field) == Some(value) {
                result.push(Vertex {
                    handle: VertexHandle::new(collection, key),
                    fields,
                });
            }
        }
        Ok(result)
    }

    fn scan(&self, collection: VertexCollection) -> Result<Vec<Vertex>> {
        let txn = self.db.begin_read()?;
        let vertices = txn.open_table(VERTICES)?;
        let mut result = Vec::new();
        for entry in vertices.range((collection.as_str(), "")..)? {
            let (k, v) = entry?;
            let (c, key) = k.value();
            if c != collection.as_str() {
                break;
            }
            result.push(Vertex {
                handle: VertexHandle::new(collection, key),
                fields: serde_json::from_slice(v.value())?,
            });
        }
        Ok(result)
    }

    fn edges(&self, collection: EdgeCollection) -> Result<Vec<Edge>> {
        let txn = self.db.begin_read()?;
        let edges = txn.open_table(EDGES)?;
        let mut result = Vec::new();
        for entry in edges.range((collection.as_str(), 0)..)? {
            let (k, v) = entry?;
            let (c, id) = k.value();
            if c != collection.as_str() {
                break;
            }
            let stored: StoredEdge = serde_json::from_slice(v.value())?;
            result.push(Edge {
                handle: EdgeHandle { collection, id },
                from: VertexHandle::parse(&stored.from)?,
                to: VertexHandle::parse(&stored.to)?,
                fields: stored.fields,
            });
        }
        Ok(result)
    }

    fn edges_between(
        &self,
        collection: EdgeCollection,
        from: &VertexHandle,
        to: &VertexHandle,
    ) -> Result<Vec<Edge>> {
        let txn = self.db.begin_read()?;
        let edges = txn.open_table(EDGES)?;
        let outbound = txn.open_multimap_table(OUTBOUND)?;
        let mut result = Vec::new();
        for id in adjacent_edge_ids(&outbound, collection, &from.id())? {
            if let Some(edge) = read_edge(&edges, collection, id)?
                && &edge.to == to
            {
                result.push(edge);
            }
        }
        Ok(result)
    }

    fn count_vertices(&self, collection: VertexCollection) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let vertices = txn.open_table(VERTICES)?;
        let mut count = 0;
        for entry in vertices.range((collection.as_str(), "")..)? {
            let (k, _v) = entry?;
            if k.value().0 != collection.as_str() {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    fn count_edges(&self, collection: EdgeCollection) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let edges = txn.open_table(EDGES)?;
        let mut count = 0;
        for entry in edges.range((collection.as_str(), 0)..)? {
            let (k, _v) = entry?;
            if k.value().0 != collection.as_str() {
                break;
            }
            count += 1;
        }
        Ok(count)
    }
}

impl std::fmt::Debug for RedbGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbGraph").finish_non_exhaustive()
    }
}
