use std::collections::BTreeMap;

use serde::Serialize;

use crate::search_store::RawSearchResponse;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedHumanId {
    pub human_id: String,
    pub relevance: f32,
    /// Top machine id per contributing data path key.
    pub machine_id: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub took: u64,
    pub hits: u64,
    pub human_ids: Vec<RankedHumanId>,
}

#[derive(Debug, Clone, Copy)]
pub struct RankAggregator {
    num_results: usize,
}

impl RankAggregator {
    pub fn new(num_results: usize) -> Self {
        Self { num_results }
    }

    /// Order buckets by relevance (ties by human id) and keep the first
    /// `num_results`.
    pub fn aggregate(&self, raw: RawSearchResponse) -> SearchResponse {
        let mut buckets = raw.buckets;
        buckets.sort_by(|a, b| {
            b.relevance
                .total_cmp(&a.relevance)
                .then_with(|| a.human_id.cmp(&b.human_id))
        });
        buckets.truncate(self.num_results);

        let human_ids = buckets
            .into_iter()
            .map(|bucket| {
                let mut machine_id = BTreeMap::new();
                for (dp_key, id) in bucket.machine_ids {
                    machine_id.entry(dp_key).or_insert(id);
                }
                RankedHumanId {
                    human_id: bucket.human_id,
                    relevance: bucket.relevance,
                    machine_id,
                }
            })
            .collect();

        SearchResponse {
            took: raw.took_ms,
            hits: raw.total_hits,
            human_ids,
        }
    }
}
