use serde_json::json;
use tracing::debug;

use crate::{
    builder::{GraphBuilder, data_model_key},
    catalog::Catalog,
    error::Result,
    graph_store::{
        Direction,
        EdgeCollection,
        VertexCollection,
        VertexHandle,
        document,
    },
    seed::ensure_vertex,
};

/// Links models to their revisions, releases and the OS catalog.
pub struct LineageLinker<'a> {
    builder: &'a GraphBuilder<'a>,
}

impl<'a> LineageLinker<'a> {
    pub fn new(builder: &'a GraphBuilder<'a>) -> Self {
        Self { builder }
    }

    /// Chain the revisions of `module` in ascending order: each revision
    /// gets `DataModelParent` to its predecessor and the predecessor gets
    /// `DataModelChild` back. Returns the number of edges written.
    pub fn link_revisions(
        &self,
        module: &str,
        revisions: &[String],
    ) -> Result<usize> {
        let mut sorted: Vec<&String> = revisions.iter().collect();
        sorted.sort();
        sorted.dedup();

        // A revision that arrived late sits between two already linked
        // ones; their direct link has to go.
        let store = self.builder.store();
        for (i, revision) in sorted.iter().enumerate() {
            let new = dm_handle(module, revision);
            let expected =
                i.checked_sub(1).map(|p| dm_handle(module, sorted[p]));
            for path in store.traverse(
                &new,
                1,
                1,
                &[EdgeCollection::DataModelParent],
                Direction::Outbound,
            )? {
                let Some(old) = path.vertices.get(1) else {
                    continue;
                };
                if Some(&old.handle) == expected.as_ref() {
                    continue;
                }
                debug!(
                    module,
                    revision = %revision,
                    stale = old.key(),
                    "Unlinking revision"
                );
                self.builder.remove_edges(
                    EdgeCollection::DataModelParent,
                    &new,
                    &old.handle,
                )?;
                self.builder.remove_edges(
                    EdgeCollection::DataModelChild,
                    &old.handle,
                    &new,
                )?;
            }
        }

        let mut created = 0;
        for pair in sorted.windows(2) {
            let old = dm_handle(module, pair[0]);
            let new = dm_handle(module, pair[1]);
            created += self.builder.gated_edge(
                EdgeCollection::DataModelParent,
                &new,
                &old,
            )?;
            created += self.builder.gated_edge(
                EdgeCollection::DataModelChild,
                &old,
                &new,
            )?;
        }
        debug!(module, revisions = sorted.len(), "Linked revision chain");
        Ok(created)
    }

    pub fn link_release(
        &self,
        release: &VertexHandle,
        model: &VertexHandle,
    ) -> Result<usize> {
        self.builder
            .gated_edge(EdgeCollection::ReleaseHasDataModel, release, model)
    }

    /// Create OS and Release vertices for `catalog`, each OS linked to its
    /// releases and each release to the next one.
    pub fn link_catalog(&self, catalog: &Catalog) -> Result<usize> {
        let store = self.builder.store();
        let mut created = 0;

        for os in &catalog.oses {
            let (os_handle, _) = ensure_vertex(
                store,
                VertexCollection::Os,
                &os.key(),
                document([
                    ("name", json!(os.name)),
                    ("description", json!(os.description)),
                ]),
            )?;

            let mut previous: Option<VertexHandle> = None;
            for release in &os.releases {
                let (release_handle, _) = ensure_vertex(
                    store,
                    VertexCollection::Release,
                    &os.release_key(&release.name),
                    document([("name", json!(release.name))]),
                )?;
                created += self.builder.gated_edge(
                    EdgeCollection::OsHasRelease,
                    &os_handle,
                    &release_handle,
                )?;
                if let Some(prev) = &previous {
                    created += self.builder.gated_edge(
                        EdgeCollection::ReleaseRevision,
                        prev,
                        &release_handle,
                    )?;
                }
                previous = Some(release_handle);
            }
        }
        Ok(created)
    }
}

fn dm_handle(module: &str, revision: &str) -> VertexHandle {
    VertexHandle::new(
        VertexCollection::DataModel,
        data_model_key(module, Some(revision)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dedup::DedupCache,
        graph_store::GraphStore,
        redb_graph::RedbGraph,
        seed::{self, seed_languages},
    };

    fn setup() -> (tempfile::TempDir, RedbGraph, DedupCache) {
        let tmp = tempfile::tempdir().unwrap();
        let graph = RedbGraph::open(&tmp.path().join("graph.redb")).unwrap();
        seed_languages(&graph).unwrap();
        (tmp, graph, DedupCache::new())
    }

    #[test]
    fn revisions_form_one_sorted_chain() {
        let (_tmp, graph, cache) = setup();
        let builder = GraphBuilder::new(&graph, &cache);
        for rev in ["2019-06-01", "2018-01-01", "2020-02-02"] {
            builder.ensure_data_model("m", Some(rev), seed::YANG).unwrap();
        }
        let linker = LineageLinker::new(&builder);
        let revisions: Vec<String> =
            ["2020-02-02", "2018-01-01", "2019-06-01", "2018-01-01"]
                .map(String::from)
                .to_vec();

        assert_eq!(linker.link_revisions("m", &revisions).unwrap(), 4);
        assert_eq!(linker.link_revisions("m", &revisions).unwrap(), 0);

        let newest = dm_handle("m", "2020-02-02");
        let older = graph
            .traverse(
                &newest,
                2,
                2,
                &[EdgeCollection::DataModelParent],
                Direction::Outbound,
            )
            .unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].vertices[2].key(), "m+2018-01-01");
    }

    #[test]
    fn late_revision_splits_existing_link() {
        let (_tmp, graph, cache) = setup();
        let builder = GraphBuilder::new(&graph, &cache);
        for rev in ["2018-01-01", "2019-06-01", "2020-02-02"] {
            builder.ensure_data_model("m", Some(rev), seed::YANG).unwrap();
        }
        let linker = LineageLinker::new(&builder);
        let outer: Vec<String> =
            ["2018-01-01", "2020-02-02"].map(String::from).to_vec();
        assert_eq!(linker.link_revisions("m", &outer).unwrap(), 2);

        let all: Vec<String> = ["2018-01-01", "2019-06-01", "2020-02-02"]
            .map(String::from)
            .to_vec();
        assert_eq!(linker.link_revisions("m", &all).unwrap(), 4);

        let newest = dm_handle("m", "2020-02-02");
        let oldest = dm_handle("m", "2018-01-01");
        let parent = EdgeCollection::DataModelParent;
        let child = EdgeCollection::DataModelChild;
        let skip = graph.edges_between(parent, &newest, &oldest).unwrap();
        assert!(skip.is_empty());
        let skip = graph.edges_between(child, &oldest, &newest).unwrap();
        assert!(skip.is_empty());
        assert_eq!(graph.count_edges(parent).unwrap(), 2);
        assert_eq!(graph.count_edges(child).unwrap(), 2);
    }

    #[test]
    fn catalog_links_releases_in_order() {
        let (_tmp, graph, cache) = setup();
        let builder = GraphBuilder::new(&graph, &cache);
        let linker = LineageLinker::new(&builder);
        let catalog = Catalog::builtin();

        let created = linker.link_catalog(&catalog).unwrap();
        // Releases per OS: 10, 22, 14; each has an OS edge, all but the
        // first have a revision edge.
        assert_eq!(created, 46 + 43);
        assert_eq!(graph.count_vertices(VertexCollection::Os).unwrap(), 3);
        assert_eq!(
            graph.count_vertices(VertexCollection::Release).unwrap(),
            46
        );

        let again = linker.link_catalog(&catalog).unwrap();
        assert_eq!(again, 0);

        let first =
            VertexHandle::new(VertexCollection::Release, "IOS_XE+16.3.1");
        let next = graph
            .traverse(
                &first,
                1,
                1,
                &[EdgeCollection::ReleaseRevision],
                Direction::Outbound,
            )
            .unwrap();
        assert_eq!(next[0].vertices[1].key(), "IOS_XE+16.3.2");
    }

    #[test]
    fn release_link_is_gated() {
        let (_tmp, graph, cache) = setup();
        let builder = GraphBuilder::new(&graph, &cache);
        let linker = LineageLinker::new(&builder);
        linker.link_catalog(&Catalog::builtin()).unwrap();
        let dm = builder.ensure_data_model("m", Some("1"), seed::YANG).unwrap();
        let release =
            VertexHandle::new(VertexCollection::Release, "NX-OS+9.2(1)");

        assert_eq!(linker.link_release(&release, &dm).unwrap(), 1);
        assert_eq!(linker.link_release(&release, &dm).unwrap(), 0);
    }
}
