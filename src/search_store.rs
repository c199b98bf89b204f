//! Search store abstraction and its query model.
//!
//! A [`SearchRequest`] is a scored multi-field match, zero-score filters and
//! a terms aggregation on `dp_human_id`. It can be rendered as an
//! Elasticsearch request body for inspection.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::error;

use crate::{
    error::{Error, Result},
    graph_store::Document,
    index_config::{IndexConfig, KEYWORD_SUBFIELD},
};

#[derive(Debug, Clone, PartialEq)]
pub struct BoostedField {
    pub name: String,
    pub boost: f32,
}

impl BoostedField {
    pub fn new(name: &str, boost: f32) -> Self {
        Self {
            name: name.to_string(),
            boost,
        }
    }
}

/// `most_fields` match with operator AND: every query term must match
/// within a field, and the scores of matching fields add up.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiMatch {
    pub query: String,
    pub fields: Vec<BoostedField>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Exact keyword match.
    Term { field: String, value: String },
    Flag { field: String, value: bool },
    AllOf(Vec<Filter>),
    AnyOf(Vec<Filter>),
}

fn es_filters(filters: &[Filter]) -> Vec<Value> {
    filters.iter().map(Filter::to_es_json).collect()
}

impl Filter {
    pub fn term(field: &str, value: &str) -> Self {
        Filter::Term {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn flag(field: &str, value: bool) -> Self {
        Filter::Flag {
            field: field.to_string(),
            value,
        }
    }

    fn to_es_json(&self) -> Value {
        match self {
            Filter::Term { field, value } => {
                json!({"match_phrase": {field: value}})
            }
            Filter::Flag { field, value } => {
                json!({"match_phrase": {field: {"query": value}}})
            }
            Filter::AllOf(filters) => json!({"bool": {
                "filter": es_filters(filters)
            }}),
            Filter::AnyOf(filters) => json!({"bool": {
                "minimum_should_match": 1,
                "should": es_filters(filters)
            }}),
        }
    }
}

/// Buckets per distinct `dp_human_id`, each with its max score and the
/// machine id of every contributing `dp_key`.
#[derive(Debug, Clone, PartialEq)]
pub struct HumanIdAggregation {
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub must: MultiMatch,
    pub filters: Vec<Filter>,
    pub aggregation: HumanIdAggregation,
}

impl SearchRequest {
    pub fn to_es_json(&self) -> Value {
        let fields: Vec<String> = self
            .must
            .fields
            .iter()
            .map(|f| {
                if (f.boost - 1.0).abs() < f32::EPSILON {
                    f.name.clone()
                } else {
                    format!("{}^{}", f.name, f.boost)
                }
            })
            .collect();

        json!({
            "size": 0,
            "sort": ["_score"],
            "query": {"bool": {
                "must": [{"multi_match": {
                    "query": self.must.query,
                    "operator": "and",
                    "type": "most_fields",
                    "fields": fields,
                }}],
                "filter": es_filters(&self.filters),
            }},
            "aggs": {"human_id": {
                "terms": {
                    "field": format!("dp_human_id.{KEYWORD_SUBFIELD}"),
                    "size": self.aggregation.size,
                    "order": {"relevance": "desc"},
                },
                "aggs": {
                    "relevance": {"max": {"script": "_score"}},
                    "dp_key": {
                        "terms": {"field": "dp_key"},
                        "aggs": {"machine_id": {"terms": {
                            "field": format!("dp_machine_id.{KEYWORD_SUBFIELD}")
                        }}},
                    },
                },
            }},
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub human_id: String,
    pub doc_count: u64,
    pub relevance: f32,
    /// `(dp_key, machine_id)` in first-seen order.
    pub machine_ids: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawSearchResponse {
    pub took_ms: u64,
    pub total_hits: u64,
    pub buckets: Vec<Bucket>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub id: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub indexed: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkReport {
    pub fn merge(&mut self, other: BulkReport) {
        self.indexed += other.indexed;
        self.failures.extend(other.failures);
    }
}

pub trait SearchStore: Send + Sync {
    /// Create `name` from `config`. Fails with
    /// [`Error::IndexAlreadyExists`] when it is already there.
    fn create_index(&self, name: &str, config: &IndexConfig) -> Result<()>;

    /// Remove `name` and its data. Returns whether it existed.
    fn delete_index(&self, name: &str) -> Result<bool>;

    fn index_exists(&self, name: &str) -> Result<bool>;

    /// Index documents under their synthetic ids. Individual documents may
    /// fail without failing the batch.
    fn bulk_index(
        &self,
        name: &str,
        docs: &[(u64, Document)],
    ) -> Result<BulkReport>;

    fn search(
        &self,
        name: &str,
        request: &SearchRequest,
    ) -> Result<RawSearchResponse>;

    fn count(&self, name: &str) -> Result<u64>;
}

/// Create the index if missing. Returns whether it was created; an existing
/// index counts as success.
pub fn provision(
    store: &dyn SearchStore,
    name: &str,
    config: &IndexConfig,
) -> Result<bool> {
    match store.create_index(name, config) {
        Ok(()) => Ok(true),
        Err(Error::IndexAlreadyExists(_)) => Ok(false),
        Err(e) => {
            error!(index = name, error = %e, "Failed to provision index");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_renders_elasticsearch_body() {
        let request = SearchRequest {
            must: MultiMatch {
                query: "in octets".into(),
                fields: vec![
                    BoostedField::new("dp_human_id", 3.0),
                    BoostedField::new("dp_machine_id", 1.0),
                ],
            },
            filters: vec![
                Filter::AnyOf(vec![Filter::AllOf(vec![
                    Filter::term("os_name", "IOS XE"),
                    Filter::term("release_name", "16.9.1"),
                ])]),
                Filter::flag("dp_is_configurable", false),
            ],
            aggregation: HumanIdAggregation { size: 150 },
        };
        let body = request.to_es_json();

        let mm = &body["query"]["bool"]["must"][0]["multi_match"];
        assert_eq!(mm["fields"], json!(["dp_human_id^3", "dp_machine_id"]));
        assert_eq!(mm["operator"], "and");
        assert_eq!(mm["type"], "most_fields");

        let filters = body["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0]["bool"]["minimum_should_match"], 1);
        assert_eq!(
            filters[1],
            json!({"match_phrase": {"dp_is_configurable": {"query": false}}})
        );

        assert_eq!(body["aggs"]["human_id"]["terms"]["size"], 150);
        assert_eq!(
            body["aggs"]["human_id"]["terms"]["field"],
            "dp_human_id.keyword"
        );
    }

    #[test]
    fn bulk_reports_merge() {
        let mut total = BulkReport::default();
        total.merge(BulkReport {
            indexed: 2,
            failures: vec![],
        });
        total.merge(BulkReport {
            indexed: 1,
            failures: vec![BulkFailure {
                id: 7,
                reason: "bad".into(),
            }],
        });
        assert_eq!(total.indexed, 3);
        assert_eq!(total.failures[0].id, 7);
    }
}
