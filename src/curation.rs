//! Hand-curated links between data paths: matches (equivalent paths across
//! models) and calculations (paths derived from other paths).
//!
//! Paths are named by machine id or human id. The native dump format keys
//! everything by machine id so it survives re-ingestion.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::{
    error::{Error, Result},
    explore::{PathRef, neighbours, resolve_data_path},
    graph_store::{
        Direction,
        EdgeCollection,
        EdgeHandle,
        GraphStore,
        Vertex,
        VertexCollection,
        VertexHandle,
        document,
    },
};

/// Seconds since the Unix epoch, as stored on match edges.
pub fn now_timestamp() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOptions {
    pub author: String,
    pub annotation: Option<String>,
    #[serde(default)]
    pub weight: i64,
    #[serde(default)]
    pub validated: bool,
    /// Defaults to now.
    #[serde(default)]
    pub timestamp: Option<f64>,
}

impl MatchOptions {
    pub fn new(author: &str) -> Self {
        Self {
            author: author.to_string(),
            annotation: None,
            weight: 0,
            validated: false,
            timestamp: None,
        }
    }
}

fn has_annotation(annotation: Option<&str>) -> bool {
    annotation.is_some_and(|a| !a.is_empty())
}

fn ensure_unmapped(
    store: &dyn GraphStore,
    a: &VertexHandle,
    b: &VertexHandle,
) -> Result<()> {
    let kind = EdgeCollection::DataPathMatch;
    if !store.edges_between(kind, a, b)?.is_empty()
        || !store.edges_between(kind, b, a)?.is_empty()
    {
        return Err(Error::MappingExists {
            from: a.to_string(),
            to: b.to_string(),
        });
    }
    Ok(())
}

/// Match two paths named by machine or human id. `needs_human` is set
/// exactly when an annotation is given.
pub fn add_match(
    store: &dyn GraphStore,
    first: &str,
    second: &str,
    options: &MatchOptions,
) -> Result<EdgeHandle> {
    let a = resolve_data_path(store, first)?;
    let b = resolve_data_path(store, second)?;
    ensure_unmapped(store, &a.handle, &b.handle)?;

    debug!(from = first, to = second, "Mapping data paths");
    store.create_edge(
        EdgeCollection::DataPathMatch,
        &a.handle,
        &b.handle,
        document([
            (
                "timestamp",
                json!(options.timestamp.unwrap_or_else(now_timestamp)),
            ),
            ("author", json!(options.author)),
            ("validated", json!(options.validated)),
            ("weight", json!(options.weight)),
            ("annotation", json!(options.annotation)),
            (
                "needs_human",
                json!(has_annotation(options.annotation.as_deref())),
            ),
        ]),
    )
}

/// Match two paths by vertex key. Such a match needs human review when it
/// is annotated and not at full weight.
pub fn add_match_by_key(
    store: &dyn GraphStore,
    base_key: &str,
    match_key: &str,
    author: &str,
    weight: i64,
    annotation: Option<&str>,
) -> Result<EdgeHandle> {
    let base = store.get_vertex(VertexCollection::DataPath, base_key)?;
    let other = store.get_vertex(VertexCollection::DataPath, match_key)?;
    ensure_unmapped(store, &base.handle, &other.handle)?;

    debug!(from = %base.handle, to = %other.handle, "Mapping data paths");
    store.create_edge(
        EdgeCollection::DataPathMatch,
        &base.handle,
        &other.handle,
        document([
            ("timestamp", json!(now_timestamp())),
            ("author", json!(author)),
            ("validated", json!(false)),
            ("weight", json!(weight)),
            ("annotation", json!(annotation)),
            (
                "needs_human",
                json!(has_annotation(annotation) && weight != 100),
            ),
        ]),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationDef {
    pub name: String,
    pub description: String,
    pub equation: String,
    pub author: String,
    /// Input paths, by machine or human id.
    #[serde(rename = "InCalculation")]
    pub factors: Vec<String>,
    /// Output paths, by machine or human id.
    #[serde(rename = "CalculationResult")]
    pub results: Vec<String>,
}

fn resolve_all(
    store: &dyn GraphStore,
    ids: &[String],
) -> Result<BTreeSet<VertexHandle>> {
    ids.iter()
        .map(|id| Ok(resolve_data_path(store, id)?.handle))
        .collect()
}

pub fn add_calculation(
    store: &dyn GraphStore,
    definition: &CalculationDef,
) -> Result<VertexHandle> {
    let factors = resolve_all(store, &definition.factors)?;
    let results = resolve_all(store, &definition.results)?;

    let existing = store.find(
        VertexCollection::Calculation,
        "name",
        &json!(definition.name),
    )?;
    if !existing.is_empty() {
        return Err(Error::CalculationExists(definition.name.clone()));
    }

    debug!(name = %definition.name, "Adding calculation");
    let calc = store.create_vertex(
        VertexCollection::Calculation,
        document([
            ("name", json!(definition.name)),
            ("description", json!(definition.description)),
            ("equation", json!(definition.equation)),
            ("author", json!(definition.author)),
        ]),
        None,
    )?;
    for dp in &factors {
        store.create_edge(
            EdgeCollection::InCalculation,
            dp,
            &calc,
            Default::default(),
        )?;
    }
    for dp in &results {
        store.create_edge(
            EdgeCollection::CalculationResult,
            &calc,
            dp,
            Default::default(),
        )?;
    }
    Ok(calc)
}

/// DataPaths whose human or machine id is one of `ids`, sorted by human id.
fn paths_named(store: &dyn GraphStore, ids: &[String]) -> Result<Vec<Vertex>> {
    let mut found: BTreeMap<VertexHandle, Vertex> = BTreeMap::new();
    for id in ids {
        for field in ["human_id", "machine_id"] {
            let value = json!(id);
            for dp in store.find(VertexCollection::DataPath, field, &value)? {
                found.insert(dp.handle.clone(), dp);
            }
        }
    }
    let mut paths: Vec<Vertex> = found.into_values().collect();
    paths.sort_by(|a, b| {
        a.str_field("human_id").cmp(&b.str_field("human_id"))
    });
    Ok(paths)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchSummary {
    #[serde(flatten)]
    pub path: PathRef,
    pub matches: Vec<PathRef>,
}

/// For each named path with at least one match, its matches sorted by
/// human id.
pub fn fetch_matches(
    store: &dyn GraphStore,
    ids: &[String],
) -> Result<Vec<MatchSummary>> {
    let mut out = Vec::new();
    for dp in paths_named(store, ids)? {
        let mut matches: Vec<PathRef> = neighbours(
            store,
            &dp.handle,
            EdgeCollection::DataPathMatch,
            Direction::Any,
        )?
        .iter()
        .map(PathRef::from_vertex)
        .collect();
        if matches.is_empty() {
            continue;
        }
        matches.sort_by(|a, b| a.human_id.cmp(&b.human_id));
        out.push(MatchSummary {
            path: PathRef::from_vertex(&dp),
            matches,
        });
    }
    Ok(out)
}

/// Per language, every path of its models that takes part in a match.
pub fn matched_paths_by_language(
    store: &dyn GraphStore,
) -> Result<BTreeMap<String, Vec<PathRef>>> {
    let mut out = BTreeMap::new();
    for dml in store.scan(VertexCollection::DataModelLanguage)? {
        let mut matched: BTreeSet<PathRef> = BTreeSet::new();
        for dm in neighbours(
            store,
            &dml.handle,
            EdgeCollection::OfDataModelLanguage,
            Direction::Outbound,
        )? {
            for dp in neighbours(
                store,
                &dm.handle,
                EdgeCollection::DataPathFromDataModel,
                Direction::Outbound,
            )? {
                let partners = neighbours(
                    store,
                    &dp.handle,
                    EdgeCollection::DataPathMatch,
                    Direction::Any,
                )?;
                if !partners.is_empty() {
                    matched.insert(PathRef::from_vertex(&dp));
                }
            }
        }
        let mut paths: Vec<PathRef> = matched.into_iter().collect();
        paths.sort_by(|a, b| a.human_id.cmp(&b.human_id));
        let name = dml.str_field("name").unwrap_or("").to_string();
        out.insert(name, paths);
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationView {
    pub key: String,
    pub name: String,
    pub result: Option<PathRef>,
    pub factors: Vec<PathRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationSummary {
    #[serde(flatten)]
    pub path: PathRef,
    pub as_result: Vec<CalculationView>,
    pub as_factor: Vec<CalculationView>,
}

fn calculation_view(
    store: &dyn GraphStore,
    calc: &Vertex,
) -> Result<CalculationView> {
    let result = neighbours(
        store,
        &calc.handle,
        EdgeCollection::CalculationResult,
        Direction::Outbound,
    )?
    .first()
    .map(PathRef::from_vertex);
    let factors = neighbours(
        store,
        &calc.handle,
        EdgeCollection::InCalculation,
        Direction::Inbound,
    )?
    .iter()
    .map(PathRef::from_vertex)
    .collect();
    Ok(CalculationView {
        key: calc.key().to_string(),
        name: calc.str_field("name").unwrap_or("").to_string(),
        result,
        factors,
    })
}

/// For each named path taking part in a calculation, the calculations it
/// results from and those it feeds.
pub fn fetch_calculations(
    store: &dyn GraphStore,
    ids: &[String],
) -> Result<Vec<CalculationSummary>> {
    let mut out = Vec::new();
    for dp in paths_named(store, ids)? {
        let as_result = neighbours(
            store,
            &dp.handle,
            EdgeCollection::CalculationResult,
            Direction::Inbound,
        )?
        .iter()
        .map(|calc| calculation_view(store, calc))
        .collect::<Result<Vec<_>>>()?;
        let as_factor = neighbours(
            store,
            &dp.handle,
            EdgeCollection::InCalculation,
            Direction::Outbound,
        )?
        .iter()
        .map(|calc| calculation_view(store, calc))
        .collect::<Result<Vec<_>>>()?;

        if as_result.is_empty() && as_factor.is_empty() {
            continue;
        }
        out.push(CalculationSummary {
            path: PathRef::from_vertex(&dp),
            as_result,
            as_factor,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    #[serde(rename = "_from")]
    pub from: String,
    #[serde(rename = "_to")]
    pub to: String,
    pub author: String,
    #[serde(default)]
    pub annotation: Option<String>,
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub validated: bool,
    #[serde(default)]
    pub weight: i64,
    #[serde(default)]
    pub needs_human: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeDump {
    #[serde(rename = "DataPathMatch", default)]
    pub matches: Vec<MatchRecord>,
    #[serde(rename = "Calculation", default)]
    pub calculations: Vec<CalculationDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchFailure {
    #[serde(rename = "_from")]
    pub from: String,
    #[serde(rename = "_to")]
    pub to: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalculationFailure {
    pub name: String,
    #[serde(rename = "InCalculation")]
    pub factors: Vec<String>,
    #[serde(rename = "CalculationResult")]
    pub results: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportFailures {
    #[serde(rename = "DataPathMatch")]
    pub matches: Vec<MatchFailure>,
    #[serde(rename = "Calculation")]
    pub calculations: Vec<CalculationFailure>,
}

impl ImportFailures {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty() && self.calculations.is_empty()
    }
}

fn machine_id_of(
    store: &dyn GraphStore,
    handle: &VertexHandle,
) -> Result<String> {
    let vertex = store.get_vertex(handle.collection(), handle.key())?;
    Ok(vertex.str_field("machine_id").unwrap_or("").to_string())
}

/// Every match and calculation, paths named by machine id.
pub fn export_native(store: &dyn GraphStore) -> Result<NativeDump> {
    let mut dump = NativeDump::default();

    for edge in store.edges(EdgeCollection::DataPathMatch)? {
        let field = |name: &str| edge.fields.get(name).cloned();
        dump.matches.push(MatchRecord {
            from: machine_id_of(store, &edge.from)?,
            to: machine_id_of(store, &edge.to)?,
            author: field("author")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            annotation: field("annotation")
                .and_then(|v| v.as_str().map(str::to_string)),
            timestamp: field("timestamp").and_then(|v| v.as_f64()),
            validated: field("validated")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            weight: field("weight").and_then(|v| v.as_i64()).unwrap_or(0),
            needs_human: field("needs_human")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        });
    }

    for calc in store.scan(VertexCollection::Calculation)? {
        let text = |name: &str| calc.str_field(name).unwrap_or("").to_string();
        let machine_ids = |kind: EdgeCollection,
                           direction: Direction|
         -> Result<Vec<String>> {
            Ok(neighbours(store, &calc.handle, kind, direction)?
                .iter()
                .map(|dp| {
                    dp.str_field("machine_id").unwrap_or("").to_string()
                })
                .collect())
        };
        dump.calculations.push(CalculationDef {
            name: text("name"),
            description: text("description"),
            equation: text("equation"),
            author: text("author"),
            factors: machine_ids(
                EdgeCollection::InCalculation,
                Direction::Inbound,
            )?,
            results: machine_ids(
                EdgeCollection::CalculationResult,
                Direction::Outbound,
            )?,
        });
    }

    info!(
        matches = dump.matches.len(),
        calculations = dump.calculations.len(),
        "Exported curated mappings"
    );
    Ok(dump)
}

/// Re-create every match and calculation of `dump`. Items that fail are
/// reported and skipped.
pub fn import_native(
    store: &dyn GraphStore,
    dump: &NativeDump,
) -> Result<ImportFailures> {
    let mut failures = ImportFailures::default();

    for record in &dump.matches {
        let options = MatchOptions {
            author: record.author.clone(),
            annotation: record.annotation.clone(),
            weight: record.weight,
            validated: record.validated,
            timestamp: record.timestamp,
        };
        if let Err(e) = add_match(store, &record.from, &record.to, &options) {
            warn!(
                from = %record.from,
                to = %record.to,
                error = %e,
                "Match not imported"
            );
            failures.matches.push(MatchFailure {
                from: record.from.clone(),
                to: record.to.clone(),
                message: e.to_string(),
            });
        }
    }

    for definition in &dump.calculations {
        if let Err(e) = add_calculation(store, definition) {
            warn!(
                name = %definition.name,
                error = %e,
                "Calculation not imported"
            );
            failures.calculations.push(CalculationFailure {
                name: definition.name.clone(),
                factors: definition.factors.clone(),
                results: definition.results.clone(),
                message: e.to_string(),
            });
        }
    }

    info!(
        matches = dump.matches.len() - failures.matches.len(),
        calculations = dump.calculations.len() - failures.calculations.len(),
        failed = failures.matches.len() + failures.calculations.len(),
        "Imported curated mappings"
    );
    Ok(failures)
}

/// The stored fields of a match edge between two paths, if any.
pub fn match_fields(
    store: &dyn GraphStore,
    a: &VertexHandle,
    b: &VertexHandle,
) -> Result<Option<BTreeMap<String, Value>>> {
    let kind = EdgeCollection::DataPathMatch;
    let mut edges = store.edges_between(kind, a, b)?;
    edges.extend(store.edges_between(kind, b, a)?);
    Ok(edges
        .into_iter()
        .next()
        .map(|e| e.fields.into_iter().collect()))
}
