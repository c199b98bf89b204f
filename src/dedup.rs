//! Run-scoped deduplication of vertices and edges.
//!
//! The cache is the only path by which the builder obtains vertex handles, so
//! two scopes racing on the same key see exactly one creation. Edge pairs are
//! canonicalized, which makes a claim on `(a, b)` also cover `(b, a)`.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    error::Result,
    graph_store::{EdgeCollection, GraphStore, VertexCollection, VertexHandle},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Created,
    /// The key was already known. `previous_owner` is the model that first
    /// produced it, `None` when it came from an earlier run.
    Reused { previous_owner: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLookup {
    pub handle: VertexHandle,
    pub outcome: LookupOutcome,
}

impl CacheLookup {
    pub fn created(&self) -> bool {
        self.outcome == LookupOutcome::Created
    }

    /// True when the key was first produced by a different model in this
    /// run.
    pub fn collides_with(&self, owner: &str) -> bool {
        matches!(
            &self.outcome,
            LookupOutcome::Reused { previous_owner: Some(prev) } if prev != owner
        )
    }
}

#[derive(Debug)]
struct VertexEntry {
    handle: VertexHandle,
    owner: Option<String>,
}

#[derive(Debug, Default)]
pub struct DedupCache {
    vertices: Mutex<HashMap<(VertexCollection, String), VertexEntry>>,
    edges: Mutex<HashMap<EdgeCollection, HashSet<(String, String)>>>,
}

fn canonical_pair(a: &VertexHandle, b: &VertexHandle) -> (String, String) {
    let (a, b) = (a.id(), b.id());
    if a <= b { (a, b) } else { (b, a) }
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the handle for `key`, calling `factory` to create the vertex
    /// only if no handle is known. The lock is held across the factory call.
    pub fn get_or_create_vertex<F>(
        &self,
        kind: VertexCollection,
        key: &str,
        owner: &str,
        factory: F,
    ) -> Result<CacheLookup>
    where
        F: FnOnce() -> Result<VertexHandle>,
    {
        let mut vertices = self.vertices.lock();
        let slot = (kind, key.to_string());

        if let Some(entry) = vertices.get(&slot) {
            return Ok(CacheLookup {
                handle: entry.handle.clone(),
                outcome: LookupOutcome::Reused {
                    previous_owner: entry.owner.clone(),
                },
            });
        }

        let handle = factory()?;
        vertices.insert(
            slot,
            VertexEntry {
                handle: handle.clone(),
                owner: Some(owner.to_string()),
            },
        );
        Ok(CacheLookup {
            handle,
            outcome: LookupOutcome::Created,
        })
    }

    /// Record the unordered pair `(a, b)` for `kind`. True exactly once per
    /// pair.
    pub fn try_claim_edge(
        &self,
        kind: EdgeCollection,
        a: &VertexHandle,
        b: &VertexHandle,
    ) -> bool {
        self.edges
            .lock()
            .entry(kind)
            .or_default()
            .insert(canonical_pair(a, b))
    }

    /// Like [`try_claim_edge`](Self::try_claim_edge), but the claim is only
    /// recorded once `create` succeeds. Returns whether `create` ran.
    pub fn claim_edge_with<F>(
        &self,
        kind: EdgeCollection,
        a: &VertexHandle,
        b: &VertexHandle,
        create: F,
    ) -> Result<bool>
    where
        F: FnOnce() -> Result<()>,
    {
        let pair = canonical_pair(a, b);
        let mut edges = self.edges.lock();
        let claimed = edges.entry(kind).or_default();
        if claimed.contains(&pair) {
            return Ok(false);
        }
        create()?;
        claimed.insert(pair);
        Ok(true)
    }

    /// Forget the claim on `(a, b)` after its edges were removed.
    pub fn release_edge(
        &self,
        kind: EdgeCollection,
        a: &VertexHandle,
        b: &VertexHandle,
    ) {
        if let Some(set) = self.edges.lock().get_mut(&kind) {
            set.remove(&canonical_pair(a, b));
        }
    }

    pub fn is_edge_claimed(
        &self,
        kind: EdgeCollection,
        a: &VertexHandle,
        b: &VertexHandle,
    ) -> bool {
        self.edges
            .lock()
            .get(&kind)
            .is_some_and(|set| set.contains(&canonical_pair(a, b)))
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.lock().len()
    }

    /// Seed the cache from an existing graph so a new run reuses what
    /// earlier runs created. DataPaths are keyed by `machine_id`, every
    /// other collection by vertex key.
    pub fn hydrate(&self, store: &dyn GraphStore) -> Result<()> {
        let mut vertices = self.vertices.lock();
        for collection in VertexCollection::ALL {
            if collection == VertexCollection::Calculation {
                continue;
            }
            for vertex in store.scan(collection)? {
                let key = match collection {
                    VertexCollection::DataPath => {
                        match vertex.str_field("machine_id") {
                            Some(id) => id.to_string(),
                            None => continue,
                        }
                    }
                    _ => vertex.key().to_string(),
                };
                vertices.insert(
                    (collection, key),
                    VertexEntry {
                        handle: vertex.handle,
                        owner: None,
                    },
                );
            }
        }

        let mut edges = self.edges.lock();
        let mut edge_count = 0;
        for collection in EdgeCollection::ALL {
            let claimed = edges.entry(collection).or_default();
            for edge in store.edges(collection)? {
                claimed.insert(canonical_pair(&edge.from, &edge.to));
                edge_count += 1;
            }
        }

        debug!(
            vertices = vertices.len(),
            edges = edge_count,
            "Hydrated dedup cache"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
    };

    use serde_json::json;

    use super::*;
    use crate::{
        error::Error,
        graph_store::{Document, document},
        redb_graph::RedbGraph,
    };

    fn handle(key: &str) -> VertexHandle {
        VertexHandle::new(VertexCollection::DataPath, key)
    }

    #[test]
    fn second_lookup_reuses() {
        let cache = DedupCache::new();
        let first = cache
            .get_or_create_vertex(VertexCollection::DataPath, "/a", "m1", || {
                Ok(handle("1"))
            })
            .unwrap();
        assert!(first.created());

        let second = cache
            .get_or_create_vertex(VertexCollection::DataPath, "/a", "m1", || {
                panic!("factory must not run twice")
            })
            .unwrap();
        assert_eq!(second.handle, first.handle);
        assert!(!second.created());
        assert!(!second.collides_with("m1"));
        assert!(second.collides_with("m2"));
    }

    #[test]
    fn keys_are_scoped_by_kind() {
        let cache = DedupCache::new();
        cache
            .get_or_create_vertex(VertexCollection::DataPath, "x", "m", || {
                Ok(handle("1"))
            })
            .unwrap();
        let other = cache
            .get_or_create_vertex(VertexCollection::DataModel, "x", "m", || {
                Ok(VertexHandle::new(VertexCollection::DataModel, "x"))
            })
            .unwrap();
        assert!(other.created());
        assert_eq!(cache.vertex_count(), 2);
    }

    #[test]
    fn failed_factory_leaves_no_entry() {
        let cache = DedupCache::new();
        let err = cache.get_or_create_vertex(
            VertexCollection::DataPath,
            "/a",
            "m",
            || Err(Error::Config("boom".into())),
        );
        assert!(err.is_err());

        let retry = cache
            .get_or_create_vertex(VertexCollection::DataPath, "/a", "m", || {
                Ok(handle("1"))
            })
            .unwrap();
        assert!(retry.created());
    }

    #[test]
    fn edge_claims_are_unordered() {
        let cache = DedupCache::new();
        let (a, b) = (handle("1"), handle("2"));
        let kind = EdgeCollection::DataPathParent;

        assert!(cache.try_claim_edge(kind, &a, &b));
        assert!(!cache.try_claim_edge(kind, &b, &a));
        assert!(cache.try_claim_edge(EdgeCollection::DataPathMatch, &a, &b));
        assert!(cache.is_edge_claimed(kind, &b, &a));
    }

    #[test]
    fn claim_with_failure_is_not_recorded() {
        let cache = DedupCache::new();
        let (a, b) = (handle("1"), handle("2"));
        let kind = EdgeCollection::OfDataType;

        assert!(
            cache
                .claim_edge_with(kind, &a, &b, || Err(Error::Config(
                    "down".into()
                )))
                .is_err()
        );
        assert!(!cache.is_edge_claimed(kind, &a, &b));
        assert!(cache.claim_edge_with(kind, &a, &b, || Ok(())).unwrap());
        assert!(!cache.claim_edge_with(kind, &a, &b, || Ok(())).unwrap());
    }

    #[test]
    fn concurrent_lookups_create_once() {
        let cache = Arc::new(DedupCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    cache
                        .get_or_create_vertex(
                            VertexCollection::DataPath,
                            "/shared",
                            &format!("m{i}"),
                            || {
                                calls.fetch_add(1, Ordering::SeqCst);
                                Ok(handle("1"))
                            },
                        )
                        .unwrap()
                })
            })
            .collect();

        let created = workers
            .into_iter()
            .map(|w| w.join().unwrap())
            .filter(CacheLookup::created)
            .count();
        assert_eq!(created, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hydrate_picks_up_prior_graph() {
        let tmp = tempfile::tempdir().unwrap();
        let graph = RedbGraph::open(&tmp.path().join("graph.redb")).unwrap();
        let dm = graph
            .create_vertex(
                VertexCollection::DataModel,
                Document::new(),
                Some("m+1"),
            )
            .unwrap();
        let dp = graph
            .create_vertex(
                VertexCollection::DataPath,
                document([("machine_id", json!("/m:a"))]),
                None,
            )
            .unwrap();
        graph
            .create_edge(
                EdgeCollection::DataPathFromDataModel,
                &dm,
                &dp,
                Document::new(),
            )
            .unwrap();

        let cache = DedupCache::new();
        cache.hydrate(&graph).unwrap();

        let found = cache
            .get_or_create_vertex(VertexCollection::DataPath, "/m:a", "m", || {
                panic!("should be hydrated")
            })
            .unwrap();
        assert_eq!(found.handle, dp);
        assert!(!found.collides_with("m"));
        assert!(!cache.try_claim_edge(
            EdgeCollection::DataPathFromDataModel,
            &dm,
            &dp
        ));
    }
}
