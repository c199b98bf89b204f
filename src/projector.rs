//! Flattens the graph into one search document per (data path, model,
//! release) combination.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::Result,
    graph_store::{
        Direction,
        Document,
        EdgeCollection,
        GraphStore,
        TraversalPath,
        Vertex,
        VertexCollection,
        VertexHandle,
    },
    search_store::{BulkReport, SearchStore},
};

const DEFAULT_BATCH: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub dp_key: String,
    pub dp_machine_id: String,
    pub dp_human_id: String,
    pub dp_description: Option<String>,
    pub dp_is_leaf: bool,
    pub dp_is_configurable: bool,
    pub dml_key: String,
    pub dml_name: String,
    pub dm_key: String,
    pub dm_name: String,
    pub dm_revision: Option<String>,
    pub release_key: Option<String>,
    pub release_name: Option<String>,
    pub os_key: Option<String>,
    pub os_name: Option<String>,
}

impl SearchDocument {
    pub fn to_document(&self) -> Result<Document> {
        Ok(serde_json::from_value(serde_json::to_value(self)?)?)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectionReport {
    pub data_paths: usize,
    pub documents: usize,
    pub bulk: BulkReport,
}

/// Model-side fields of a document: the model, its language and (when
/// shipped in one) the release and OS.
#[derive(Debug, Clone)]
struct Placement {
    dml: Vertex,
    dm: Vertex,
    release: Option<(Vertex, Vertex)>,
}

pub struct SearchProjector<'a> {
    store: &'a dyn GraphStore,
    releases: HashMap<VertexHandle, Vec<(Vertex, Vertex)>>,
}

impl<'a> SearchProjector<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self {
            store,
            releases: HashMap::new(),
        }
    }

    /// Every document of the graph in DataPath scan order.
    pub fn project(&mut self) -> Result<Vec<SearchDocument>> {
        let mut docs = Vec::new();
        for dp in self.store.scan(VertexCollection::DataPath)? {
            docs.extend(self.project_path(&dp)?);
        }
        Ok(docs)
    }

    /// Project and bulk-index into `index` in batches. Document ids start
    /// at 0 for every call.
    pub fn project_into(
        &mut self,
        search: &dyn SearchStore,
        index: &str,
        batch_size: Option<usize>,
    ) -> Result<ProjectionReport> {
        let batch_size = batch_size.unwrap_or(DEFAULT_BATCH).max(1);
        let mut report = ProjectionReport::default();
        let mut batch: Vec<(u64, Document)> = Vec::with_capacity(batch_size);
        let mut next_id: u64 = 0;

        for dp in self.store.scan(VertexCollection::DataPath)? {
            report.data_paths += 1;
            for doc in self.project_path(&dp)? {
                batch.push((next_id, doc.to_document()?));
                next_id += 1;
                if batch.len() == batch_size {
                    report.bulk.merge(search.bulk_index(index, &batch)?);
                    batch.clear();
                }
            }
        }
        if !batch.is_empty() {
            report.bulk.merge(search.bulk_index(index, &batch)?);
        }

        report.documents = next_id as usize;
        info!(
            index,
            data_paths = report.data_paths,
            documents = report.documents,
            failed = report.bulk.failures.len(),
            "Projected graph into search index"
        );
        Ok(report)
    }

    /// Documents for one DataPath vertex.
    pub fn project_path(&mut self, dp: &Vertex) -> Result<Vec<SearchDocument>> {
        let mut docs = Vec::new();
        for placement in self.placements(dp)? {
            docs.push(document_for(dp, &placement));
        }
        if docs.is_empty() {
            debug!(dp = %dp.handle, "Data path has no model");
        }
        Ok(docs)
    }

    fn placements(&mut self, dp: &Vertex) -> Result<Vec<Placement>> {
        let paths = self.store.traverse(
            &dp.handle,
            2,
            2,
            &[
                EdgeCollection::DataPathFromDataModel,
                EdgeCollection::OfDataModelLanguage,
            ],
            Direction::Inbound,
        )?;

        let mut placements = Vec::new();
        for (dm, dml) in pairs(
            paths,
            VertexCollection::DataModel,
            VertexCollection::DataModelLanguage,
        ) {
            let releases = self.releases_of(&dm)?;
            if releases.is_empty() {
                placements.push(Placement {
                    dml,
                    dm,
                    release: None,
                });
                continue;
            }
            for release in releases {
                placements.push(Placement {
                    dml: dml.clone(),
                    dm: dm.clone(),
                    release: Some(release),
                });
            }
        }
        Ok(placements)
    }

    fn releases_of(&mut self, dm: &Vertex) -> Result<Vec<(Vertex, Vertex)>> {
        if let Some(cached) = self.releases.get(&dm.handle) {
            return Ok(cached.clone());
        }
        let paths = self.store.traverse(
            &dm.handle,
            2,
            2,
            &[EdgeCollection::ReleaseHasDataModel, EdgeCollection::OsHasRelease],
            Direction::Inbound,
        )?;
        let found = pairs(paths, VertexCollection::Release, VertexCollection::Os);
        self.releases.insert(dm.handle.clone(), found.clone());
        Ok(found)
    }
}

/// `(vertices[1], vertices[2])` of each two-hop path whose vertices are in
/// the expected collections.
fn pairs(
    paths: Vec<TraversalPath>,
    first: VertexCollection,
    second: VertexCollection,
) -> Vec<(Vertex, Vertex)> {
    paths
        .into_iter()
        .filter_map(|path| {
            let mut vertices = path.vertices.into_iter().skip(1);
            let a = vertices.next()?;
            let b = vertices.next()?;
            (a.handle.collection() == first && b.handle.collection() == second)
                .then_some((a, b))
        })
        .collect()
}

fn owned(vertex: &Vertex, field: &str) -> Option<String> {
    vertex.str_field(field).map(str::to_string)
}

fn document_for(dp: &Vertex, placement: &Placement) -> SearchDocument {
    let (release, os) = match &placement.release {
        Some((release, os)) => (Some(release), Some(os)),
        None => (None, None),
    };
    SearchDocument {
        dp_key: dp.key().to_string(),
        dp_machine_id: owned(dp, "machine_id").unwrap_or_default(),
        dp_human_id: owned(dp, "human_id").unwrap_or_default(),
        dp_description: owned(dp, "description"),
        dp_is_leaf: dp.flag("is_leaf"),
        dp_is_configurable: dp.flag("is_configurable"),
        dml_key: placement.dml.key().to_string(),
        dml_name: owned(&placement.dml, "name").unwrap_or_default(),
        dm_key: placement.dm.key().to_string(),
        dm_name: owned(&placement.dm, "name").unwrap_or_default(),
        dm_revision: owned(&placement.dm, "revision"),
        release_key: release.map(|r| r.key().to_string()),
        release_name: release.and_then(|r| owned(r, "name")),
        os_key: os.map(|o| o.key().to_string()),
        os_name: os.and_then(|o| owned(o, "name")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::GraphBuilder,
        catalog::Catalog,
        dedup::DedupCache,
        index_config::IndexConfig,
        lineage::LineageLinker,
        parse_tree::{IntermediateNode, PathSegment},
        redb_graph::RedbGraph,
        seed::{self, seed_languages},
        tantivy_index::TantivySearchStore,
    };

    fn node(names: &[&str], children: Vec<IntermediateNode>) -> IntermediateNode {
        IntermediateNode {
            path_segments: names
                .iter()
                .map(|n| PathSegment::new("oc-if", "oc-if", *n))
                .collect(),
            description: Some("Interface MTU".to_string()),
            is_configurable: false,
            primitive_type: children.is_empty().then(|| "uint16".to_string()),
            children,
        }
    }

    /// One YANG model shipped in two IOS XE releases, one MIB model in none.
    fn graph() -> (tempfile::TempDir, RedbGraph) {
        let tmp = tempfile::tempdir().unwrap();
        let store = RedbGraph::open(&tmp.path().join("graph.redb")).unwrap();
        seed_languages(&store).unwrap();
        let cache = DedupCache::new();
        let builder = GraphBuilder::new(&store, &cache);
        let linker = LineageLinker::new(&builder);
        linker.link_catalog(&Catalog::builtin()).unwrap();

        let dm = builder
            .ensure_data_model("oc-if", Some("2019-11-19"), seed::YANG)
            .unwrap();
        let tree = vec![node(
            &["interfaces"],
            vec![node(&["interfaces", "mtu"], vec![])],
        )];
        builder.build_yang(&dm, "oc-if", &tree).unwrap();
        for release in ["16.9.1", "16.9.3"] {
            let key = crate::catalog::release_key("IOS XE", release);
            let rel = VertexHandle::new(VertexCollection::Release, key);
            linker.link_release(&rel, &dm).unwrap();
        }

        let mib = builder.ensure_data_model("IF-MIB", None, seed::SMI).unwrap();
        let objects = vec![crate::mib_source::MibObject {
            oid: "1.3.6.1.2.1.2.2.1.4".to_string(),
            name: "ifMtu".to_string(),
            description: "The size of the largest packet".to_string(),
            data_type: "Integer32".to_string(),
        }];
        builder.build_snmp(&mib, "IF-MIB", &objects).unwrap();
        (tmp, store)
    }

    #[test]
    fn one_document_per_release() {
        let (_tmp, store) = graph();
        let docs = SearchProjector::new(&store).project().unwrap();

        let mtu: Vec<_> = docs
            .iter()
            .filter(|d| d.dp_human_id == "/oc-if:interfaces/mtu")
            .collect();
        assert_eq!(mtu.len(), 2);
        let mut releases: Vec<_> =
            mtu.iter().filter_map(|d| d.release_name.clone()).collect();
        releases.sort();
        assert_eq!(releases, ["16.9.1", "16.9.3"]);
        assert!(mtu.iter().all(|d| d.os_name.as_deref() == Some("IOS XE")));
        assert!(mtu.iter().all(|d| d.dml_name == "YANG"));
        assert!(mtu.iter().all(|d| d.dp_is_leaf));
    }

    #[test]
    fn model_without_release_still_projects() {
        let (_tmp, store) = graph();
        let docs = SearchProjector::new(&store).project().unwrap();

        let mib: Vec<_> =
            docs.iter().filter(|d| d.dp_human_id == "ifMtu").collect();
        assert_eq!(mib.len(), 1);
        let doc = mib[0];
        assert_eq!(doc.dm_name, "IF-MIB");
        assert_eq!(doc.dm_revision, None);
        assert_eq!(doc.dml_name, "SMI");
        assert_eq!(doc.release_name, None);
        assert_eq!(doc.os_key, None);
        assert_eq!(doc.dp_machine_id, "1.3.6.1.2.1.2.2.1.4");
    }

    #[test]
    fn project_into_assigns_sequential_ids() {
        let (_tmp, store) = graph();
        let search = TantivySearchStore::open_in_ram();
        search
            .create_index("datapath", &IndexConfig::datapath())
            .unwrap();

        let report = SearchProjector::new(&store)
            .project_into(&search, "datapath", Some(2))
            .unwrap();
        // interfaces x2, mtu x2, ifMtu x1
        assert_eq!(report.data_paths, 3);
        assert_eq!(report.documents, 5);
        assert_eq!(report.bulk.indexed, 5);
        assert!(report.bulk.failures.is_empty());
        assert_eq!(search.count("datapath").unwrap(), 5);
    }

    #[test]
    fn documents_serialize_with_null_placement() {
        let (_tmp, store) = graph();
        let docs = SearchProjector::new(&store).project().unwrap();
        let mib = docs
            .iter()
            .find(|d| d.dml_name == "SMI")
            .unwrap()
            .to_document()
            .unwrap();
        assert_eq!(mib.len(), 15);
        assert_eq!(mib.get("release_name"), Some(&serde_json::Value::Null));
        assert_eq!(mib.get("dm_name").and_then(|v| v.as_str()), Some("IF-MIB"));
    }
}
