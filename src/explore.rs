//! Read-side queries over the graph: path lookup, details, listings and a
//! graph-only filtered search.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    error::{Error, Result},
    graph_store::{
        Direction,
        Document,
        EdgeCollection,
        GraphStore,
        Vertex,
        VertexCollection,
        VertexHandle,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct PathRef {
    pub key: String,
    pub human_id: String,
    pub machine_id: String,
}

impl PathRef {
    pub fn from_vertex(vertex: &Vertex) -> Self {
        Self {
            key: vertex.key().to_string(),
            human_id: vertex.str_field("human_id").unwrap_or("").to_string(),
            machine_id: vertex
                .str_field("machine_id")
                .unwrap_or("")
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelRevision {
    pub revision: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataTypeRef {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPathDetails {
    pub key: String,
    pub fields: Document,
    /// Model name to every revision (and its language) containing the path.
    pub models: BTreeMap<String, Vec<ModelRevision>>,
    /// `"OS - release"` labels.
    pub os_releases: BTreeSet<String>,
    pub languages: BTreeSet<String>,
    pub parents: Vec<PathRef>,
    pub children: Vec<PathRef>,
    pub data_types: Vec<DataTypeRef>,
    pub matches: Vec<PathRef>,
}

/// Vertices one `edge` hop away from `start`.
pub(crate) fn neighbours(
    store: &dyn GraphStore,
    start: &VertexHandle,
    edge: EdgeCollection,
    direction: Direction,
) -> Result<Vec<Vertex>> {
    Ok(store
        .traverse(start, 1, 1, &[edge], direction)?
        .into_iter()
        .filter_map(|path| path.vertices.into_iter().nth(1))
        .collect())
}

fn sorted_refs(vertices: Vec<Vertex>) -> Vec<PathRef> {
    let mut refs: Vec<PathRef> =
        vertices.iter().map(PathRef::from_vertex).collect();
    refs.sort_by(|a, b| a.key.cmp(&b.key));
    refs.dedup();
    refs
}

fn name_of(vertex: &Vertex) -> String {
    vertex.str_field("name").unwrap_or("").to_string()
}

/// DataPaths whose human or machine id is exactly `id`.
pub fn find_by_arbitrary_id(
    store: &dyn GraphStore,
    id: &str,
) -> Result<Vec<PathRef>> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    for field in ["machine_id", "human_id"] {
        for vertex in store.find(VertexCollection::DataPath, field, &json!(id))? {
            if seen.insert(vertex.handle.clone()) {
                found.push(PathRef::from_vertex(&vertex));
            }
        }
    }
    Ok(found)
}

/// Resolve `id` to exactly one DataPath, trying `machine_id` before
/// `human_id`.
pub fn resolve_data_path(store: &dyn GraphStore, id: &str) -> Result<Vertex> {
    let value = json!(id);
    if let Some(vertex) = store
        .find(VertexCollection::DataPath, "machine_id", &value)?
        .into_iter()
        .next()
    {
        return Ok(vertex);
    }

    let mut by_human =
        store.find(VertexCollection::DataPath, "human_id", &value)?;
    match by_human.len() {
        0 => Err(Error::NotFound {
            kind: "DataPath",
            name: id.to_string(),
        }),
        1 => Ok(by_human.remove(0)),
        _ => Err(Error::Ambiguous {
            kind: "DataPath",
            name: id.to_string(),
        }),
    }
}

pub fn datapath_details(
    store: &dyn GraphStore,
    key: &str,
) -> Result<DataPathDetails> {
    let dp = store.get_vertex(VertexCollection::DataPath, key)?;
    let handle = &dp.handle;

    let mut os_releases = BTreeSet::new();
    for path in store.traverse(
        handle,
        3,
        3,
        &[
            EdgeCollection::DataPathFromDataModel,
            EdgeCollection::ReleaseHasDataModel,
            EdgeCollection::OsHasRelease,
        ],
        Direction::Inbound,
    )? {
        if let [_, _, release, os] = path.vertices.as_slice()
            && os.handle.collection() == VertexCollection::Os
        {
            os_releases.insert(format!("{} - {}", name_of(os), name_of(release)));
        }
    }

    let mut models: BTreeMap<String, Vec<ModelRevision>> = BTreeMap::new();
    let mut languages = BTreeSet::new();
    for path in store.traverse(
        handle,
        2,
        2,
        &[
            EdgeCollection::DataPathFromDataModel,
            EdgeCollection::OfDataModelLanguage,
        ],
        Direction::Inbound,
    )? {
        let [_, dm, dml] = path.vertices.as_slice() else {
            continue;
        };
        if dml.handle.collection() != VertexCollection::DataModelLanguage {
            continue;
        }
        let language = name_of(dml);
        languages.insert(language.clone());
        models.entry(name_of(dm)).or_default().push(ModelRevision {
            revision: dm.str_field("revision").unwrap_or("").to_string(),
            language,
        });
    }

    let data_types = neighbours(
        store,
        handle,
        EdgeCollection::OfDataType,
        Direction::Outbound,
    )?
    .iter()
    .map(|dt| DataTypeRef {
        key: dt.key().to_string(),
        name: name_of(dt),
    })
    .collect();

    Ok(DataPathDetails {
        key: dp.key().to_string(),
        models,
        os_releases,
        languages,
        parents: sorted_refs(neighbours(
            store,
            handle,
            EdgeCollection::DataPathParent,
            Direction::Outbound,
        )?),
        children: sorted_refs(neighbours(
            store,
            handle,
            EdgeCollection::DataPathChild,
            Direction::Outbound,
        )?),
        data_types,
        matches: sorted_refs(neighbours(
            store,
            handle,
            EdgeCollection::DataPathMatch,
            Direction::Any,
        )?),
        fields: dp.fields,
    })
}

/// `"OS - release"` labels, OS ascending and releases descending.
pub fn list_os_releases(store: &dyn GraphStore) -> Result<Vec<String>> {
    let mut pairs = Vec::new();
    for os in store.scan(VertexCollection::Os)? {
        for release in neighbours(
            store,
            &os.handle,
            EdgeCollection::OsHasRelease,
            Direction::Outbound,
        )? {
            pairs.push((name_of(&os), name_of(&release)));
        }
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));
    Ok(pairs
        .into_iter()
        .map(|(os, release)| format!("{os} - {release}"))
        .collect())
}

pub fn list_languages(store: &dyn GraphStore) -> Result<Vec<String>> {
    let mut names: Vec<String> = store
        .scan(VertexCollection::DataModelLanguage)?
        .iter()
        .map(name_of)
        .collect();
    names.sort();
    Ok(names)
}

/// Vertex or edge counts for the named collections.
pub fn collection_counts(
    store: &dyn GraphStore,
    names: &[String],
) -> Result<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();
    for name in names {
        let count = if let Some(vertices) = VertexCollection::parse(name) {
            store.count_vertices(vertices)?
        } else if let Some(edges) = EdgeCollection::parse(name) {
            store.count_edges(edges)?
        } else {
            return Err(Error::NotFound {
                kind: "collection",
                name: name.clone(),
            });
        };
        counts.insert(name.clone(), count);
    }
    Ok(counts)
}

/// Every collection name, vertices first.
pub fn all_collection_names() -> Vec<String> {
    VertexCollection::ALL
        .iter()
        .map(|c| c.as_str().to_string())
        .chain(EdgeCollection::ALL.iter().map(|c| c.as_str().to_string()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSearchCriteria {
    pub filter_str: String,
    pub os_releases: Vec<(String, String)>,
    pub languages: Vec<String>,
    pub exclude_config: bool,
    pub only_leaves: bool,
    pub start: usize,
    pub limit: usize,
}

impl Default for GraphSearchCriteria {
    fn default() -> Self {
        Self {
            filter_str: String::new(),
            os_releases: Vec::new(),
            languages: Vec::new(),
            exclude_config: true,
            only_leaves: true,
            start: 0,
            limit: 10,
        }
    }
}

/// OS -> release -> language -> model name -> paths.
pub type GraphSearchResult = BTreeMap<
    String,
    BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<PathRef>>>>,
>;

/// Lowercased alphanumeric runs of `text`.
fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Filter words: the filter string split on space, `-`, `/`, `:` and `,`.
pub fn filter_words(filter: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in filter.split([' ', '-', '/', ':', ',']) {
        let word = word.trim().to_lowercase();
        if !word.is_empty() && !out.contains(&word) {
            out.push(word);
        }
    }
    out
}

/// Whether every filter word is a whole word of the path's human id, or
/// every one is a whole word of its machine id.
fn path_matches(dp: &Vertex, filter: &[String]) -> bool {
    if filter.is_empty() {
        return false;
    }
    ["human_id", "machine_id"].iter().any(|field| {
        let have = words(dp.str_field(field).unwrap_or(""));
        filter.iter().all(|w| have.contains(w))
    })
}

/// Walk OS -> release -> model -> path, restricted to the requested
/// releases and languages, and return at most `limit` paths per model
/// after skipping `start`, sorted by human id.
pub fn graph_search(
    store: &dyn GraphStore,
    criteria: &GraphSearchCriteria,
) -> Result<GraphSearchResult> {
    let filter = filter_words(&criteria.filter_str);
    let mut result = GraphSearchResult::new();

    let dmls: Vec<Vertex> = store
        .scan(VertexCollection::DataModelLanguage)?
        .into_iter()
        .filter(|dml| criteria.languages.contains(&name_of(dml)))
        .collect();
    let mut models_by_language: Vec<(String, HashSet<VertexHandle>)> =
        Vec::new();
    for dml in &dmls {
        let models = neighbours(
            store,
            &dml.handle,
            EdgeCollection::OfDataModelLanguage,
            Direction::Outbound,
        )?;
        models_by_language.push((
            name_of(dml),
            models.into_iter().map(|m| m.handle).collect(),
        ));
    }

    let mut oses = store.scan(VertexCollection::Os)?;
    oses.sort_by_key(name_of);
    for os in oses {
        let os_name = name_of(&os);
        let wanted: Vec<&String> = criteria
            .os_releases
            .iter()
            .filter(|(o, _)| *o == os_name)
            .map(|(_, r)| r)
            .collect();
        if wanted.is_empty() {
            continue;
        }

        let mut releases: Vec<Vertex> = neighbours(
            store,
            &os.handle,
            EdgeCollection::OsHasRelease,
            Direction::Outbound,
        )?
        .into_iter()
        .filter(|r| wanted.contains(&&name_of(r)))
        .collect();
        releases.sort_by_key(name_of);

        let os_entry = result.entry(os_name).or_default();
        for release in releases {
            let release_entry = os_entry.entry(name_of(&release)).or_default();
            let models = neighbours(
                store,
                &release.handle,
                EdgeCollection::ReleaseHasDataModel,
                Direction::Outbound,
            )?;

            for (language, language_models) in &models_by_language {
                let language_entry =
                    release_entry.entry(language.clone()).or_default();
                for dm in models
                    .iter()
                    .filter(|dm| language_models.contains(&dm.handle))
                {
                    let matched: Vec<Vertex> = neighbours(
                        store,
                        &dm.handle,
                        EdgeCollection::DataPathFromDataModel,
                        Direction::Outbound,
                    )?
                    .into_iter()
                    .filter(|dp| path_matches(dp, &filter))
                    .collect();
                    if matched.is_empty() {
                        continue;
                    }

                    let mut paths: Vec<PathRef> = matched
                        .iter()
                        .filter(|dp| {
                            !(criteria.exclude_config
                                && dp.flag("is_configurable"))
                                && !(criteria.only_leaves && !dp.flag("is_leaf"))
                        })
                        .map(PathRef::from_vertex)
                        .collect();
                    paths.sort_by(|a, b| a.human_id.cmp(&b.human_id));
                    let page = paths
                        .into_iter()
                        .skip(criteria.start)
                        .take(criteria.limit)
                        .collect();
                    language_entry.insert(name_of(dm), page);
                }
            }
        }
    }
    Ok(result)
}
