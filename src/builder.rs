//! Turns adapted module trees and MIB objects into graph mutations.
//!
//! All vertex handles come from the [`DedupCache`] and every edge is gated
//! by it, so building the same model twice (or two models sharing paths)
//! never duplicates anything.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{
    dedup::DedupCache,
    error::{Error, Result},
    graph_store::{
        Document,
        EdgeCollection,
        GraphStore,
        VertexCollection,
        VertexHandle,
        document,
    },
    mib_source::MibObject,
    parse_tree::IntermediateNode,
    seed,
    xpath,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub paths_created: usize,
    pub paths_reused: usize,
    /// Paths first produced by a different model.
    pub collisions: usize,
    pub edges_created: usize,
}

impl BuildStats {
    pub fn merge(&mut self, other: BuildStats) {
        self.paths_created += other.paths_created;
        self.paths_reused += other.paths_reused;
        self.collisions += other.collisions;
        self.edges_created += other.edges_created;
    }
}

/// DataModel vertex key: `name+revision`, or the bare name without one.
pub fn data_model_key(name: &str, revision: Option<&str>) -> String {
    match revision {
        Some(revision) => format!("{name}+{revision}"),
        None => name.to_string(),
    }
}

fn data_path_fields(
    machine_id: &str,
    human_id: &str,
    description: Option<&str>,
    is_leaf: bool,
    is_configurable: bool,
) -> Document {
    document([
        ("machine_id", json!(machine_id)),
        ("human_id", json!(human_id)),
        ("description", description.map_or(Value::Null, |d| json!(d))),
        ("is_leaf", json!(is_leaf)),
        ("is_variable", json!(false)),
        ("is_configurable", json!(is_configurable)),
        ("verified", json!(false)),
    ])
}

pub struct GraphBuilder<'a> {
    store: &'a dyn GraphStore,
    cache: &'a DedupCache,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(store: &'a dyn GraphStore, cache: &'a DedupCache) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &'a dyn GraphStore {
        self.store
    }

    /// Find or create the DataModel vertex and link it to its language.
    pub fn ensure_data_model(
        &self,
        name: &str,
        revision: Option<&str>,
        language: &str,
    ) -> Result<VertexHandle> {
        let key = data_model_key(name, revision);
        let lookup = self.cache.get_or_create_vertex(
            VertexCollection::DataModel,
            &key,
            &key,
            || {
                if let Some(existing) =
                    self.store.lookup_vertex(VertexCollection::DataModel, &key)?
                {
                    return Ok(existing.handle);
                }
                self.store.create_vertex(
                    VertexCollection::DataModel,
                    document([
                        ("name", json!(name)),
                        ("revision", json!(revision)),
                        ("content", Value::Null),
                        ("parsed_checksum", Value::Null),
                    ]),
                    Some(&key),
                )
            },
        )?;

        let dml =
            VertexHandle::new(VertexCollection::DataModelLanguage, language);
        self.gated_edge(
            EdgeCollection::OfDataModelLanguage,
            &dml,
            &lookup.handle,
        )?;
        Ok(lookup.handle)
    }

    /// Build every DataPath under `roots` for the model `dm`. `owner`
    /// names the model in collision reports.
    pub fn build_yang(
        &self,
        dm: &VertexHandle,
        owner: &str,
        roots: &[IntermediateNode],
    ) -> Result<BuildStats> {
        let mut stats = BuildStats::default();
        let mut stack: Vec<(&IntermediateNode, Option<VertexHandle>)> =
            roots.iter().rev().map(|node| (node, None)).collect();

        while let Some((node, parent)) = stack.pop() {
            let machine_id = xpath::machine_id(&node.path_segments);
            let lookup = self.cache.get_or_create_vertex(
                VertexCollection::DataPath,
                &machine_id,
                owner,
                || {
                    self.create_data_path(data_path_fields(
                        &machine_id,
                        &xpath::human_id(&node.path_segments),
                        node.description.as_deref(),
                        node.children.is_empty(),
                        node.is_configurable,
                    ))
                },
            )?;

            if lookup.created() {
                stats.paths_created += 1;
            } else {
                stats.paths_reused += 1;
                if lookup.collides_with(owner) {
                    stats.collisions += 1;
                    debug!(
                        machine_id = %machine_id,
                        model = owner,
                        "Data path already produced by another model"
                    );
                }
            }
            let dp = lookup.handle;

            stats.edges_created += self.gated_edge(
                EdgeCollection::DataPathFromDataModel,
                dm,
                &dp,
            )?;

            if let Some(primitive) = &node.primitive_type {
                let dt = self.data_type(&machine_id, primitive, owner)?;
                stats.edges_created +=
                    self.gated_edge(EdgeCollection::OfDataType, &dp, &dt)?;
            }

            if let Some(parent) = &parent {
                stats.edges_created += self.link_parent(&dp, parent)?;
            }

            for child in node.children.iter().rev() {
                stack.push((child, Some(dp.clone())));
            }
        }

        Ok(stats)
    }

    /// Build one DataPath per MIB object, keyed by OID.
    pub fn build_snmp(
        &self,
        dm: &VertexHandle,
        owner: &str,
        objects: &[MibObject],
    ) -> Result<BuildStats> {
        let mut stats = BuildStats::default();

        for object in objects {
            let lookup = self.cache.get_or_create_vertex(
                VertexCollection::DataPath,
                &object.oid,
                owner,
                || {
                    self.create_data_path(data_path_fields(
                        &object.oid,
                        &object.name,
                        Some(&object.description),
                        !object.data_type.is_empty(),
                        false,
                    ))
                },
            )?;

            if lookup.created() {
                stats.paths_created += 1;
            } else {
                stats.paths_reused += 1;
                if lookup.collides_with(owner) {
                    stats.collisions += 1;
                }
                warn!(oid = %object.oid, model = owner, "Duplicate OID");
            }

            stats.edges_created += self.gated_edge(
                EdgeCollection::DataPathFromDataModel,
                dm,
                &lookup.handle,
            )?;
        }

        Ok(stats)
    }

    fn create_data_path(&self, fields: Document) -> Result<VertexHandle> {
        // A path written by an earlier process that the cache never saw.
        if let Some(machine_id) = fields.get("machine_id")
            && let Some(existing) = self
                .store
                .find(VertexCollection::DataPath, "machine_id", machine_id)?
                .into_iter()
                .next()
        {
            return Ok(existing.handle);
        }
        self.store
            .create_vertex(VertexCollection::DataPath, fields, None)
    }

    fn data_type(
        &self,
        node: &str,
        primitive: &str,
        owner: &str,
    ) -> Result<VertexHandle> {
        let key = seed::data_type_key(seed::YANG, primitive);
        let lookup = self.cache.get_or_create_vertex(
            VertexCollection::DataType,
            &key,
            owner,
            || match self.store.lookup_vertex(VertexCollection::DataType, &key)? {
                Some(vertex) => Ok(vertex.handle),
                None => Err(Error::TypeResolution {
                    node: node.to_string(),
                    reason: format!("no DataType vertex {key}"),
                }),
            },
        )?;
        Ok(lookup.handle)
    }

    /// Parent and child edges are created together, once per pair.
    fn link_parent(
        &self,
        child: &VertexHandle,
        parent: &VertexHandle,
    ) -> Result<usize> {
        let created = self.cache.claim_edge_with(
            EdgeCollection::DataPathParent,
            child,
            parent,
            || {
                self.store.create_edge(
                    EdgeCollection::DataPathParent,
                    child,
                    parent,
                    Document::new(),
                )?;
                self.store.create_edge(
                    EdgeCollection::DataPathChild,
                    parent,
                    child,
                    Document::new(),
                )?;
                Ok(())
            },
        )?;
        Ok(if created { 2 } else { 0 })
    }

    /// Create `from -> to` unless the pair was already claimed. Returns the
    /// number of edges written.
    pub(crate) fn gated_edge(
        &self,
        kind: EdgeCollection,
        from: &VertexHandle,
        to: &VertexHandle,
    ) -> Result<usize> {
        let created = self.cache.claim_edge_with(kind, from, to, || {
            self.store.create_edge(kind, from, to, Document::new())?;
            Ok(())
        })?;
        Ok(usize::from(created))
    }

    /// Delete every `from -> to` edge of `kind` and release the pair.
    /// Returns the number of edges removed.
    pub(crate) fn remove_edges(
        &self,
        kind: EdgeCollection,
        from: &VertexHandle,
        to: &VertexHandle,
    ) -> Result<usize> {
        let mut removed = 0;
        for edge in self.store.edges_between(kind, from, to)? {
            removed += usize::from(self.store.remove_edge(edge.handle)?);
        }
        self.cache.release_edge(kind, from, to);
        Ok(removed)
    }
}
