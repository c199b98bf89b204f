use tracing::debug;

use crate::{
    error::Result,
    query::{QueryPlanner, SearchCriteria},
    rank::{RankAggregator, SearchResponse},
    search_store::SearchStore,
};

/// Execute the full search pipeline.
///
/// 1. Plan the request from `criteria`
/// 2. Run it against `index`
/// 3. Rank the human-id buckets and keep `num_results`
pub fn execute_search(
    store: &dyn SearchStore,
    index: &str,
    criteria: &SearchCriteria,
) -> Result<SearchResponse> {
    let request = QueryPlanner.plan(criteria);
    debug!(
        index,
        query = %request.must.query,
        filters = request.filters.len(),
        "Running search"
    );

    let raw = store.search(index, &request)?;
    Ok(RankAggregator::new(criteria.num_results).aggregate(raw))
}

/// Format results for human-readable terminal output.
pub fn format_human(response: &SearchResponse) {
    if response.human_ids.is_empty() {
        println!("No results found.");
        return;
    }

    for (i, hit) in response.human_ids.iter().enumerate() {
        println!("{:>3}. [{:.3}] {}", i + 1, hit.relevance, hit.human_id);
        for (dp_key, machine_id) in &hit.machine_id {
            println!("     {dp_key}: {machine_id}");
        }
    }
    println!(
        "\n{} result(s) from {} hit(s) in {}ms",
        response.human_ids.len(),
        response.hits,
        response.took
    );
}

/// Format results as JSON output.
pub fn format_json(response: &SearchResponse) -> Result<()> {
    println!("{}", serde_json::to_string(response)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        graph_store::{Document, document},
        index_config::IndexConfig,
        tantivy_index::TantivySearchStore,
    };

    fn doc(
        key: &str,
        human_id: &str,
        os: &str,
        release: &str,
        leaf: bool,
        configurable: bool,
    ) -> Document {
        document([
            ("dp_key", json!(key)),
            ("dp_human_id", json!(human_id)),
            ("dp_machine_id", json!(human_id)),
            ("dp_description", json!(null)),
            ("dp_is_leaf", json!(leaf)),
            ("dp_is_configurable", json!(configurable)),
            ("dml_name", json!("YANG")),
            ("os_name", json!(os)),
            ("release_name", json!(release)),
        ])
    }

    fn setup_index() -> TantivySearchStore {
        let store = TantivySearchStore::open_in_ram();
        store
            .create_index("datapath", &IndexConfig::datapath())
            .unwrap();
        let xe = ("IOS XE", "16.9.1");
        let rows = [
            ("1", "/if:interfaces/ifInOctets", xe, true, false),
            ("1", "/if:interfaces/ifInOctets", ("IOS XR", "6.5.1"), true, false),
            ("2", "/if:interfaces/ifHCInOctets", xe, true, false),
            ("3", "/if:interfaces", xe, false, false),
            ("4", "/if:interfaces/mtu", xe, true, true),
        ];
        let docs: Vec<_> = rows
            .iter()
            .enumerate()
            .map(|(i, (key, human_id, (os, rel), leaf, config))| {
                (i as u64, doc(key, human_id, os, rel, *leaf, *config))
            })
            .collect();
        store.bulk_index("datapath", &docs).unwrap();
        store
    }

    #[test]
    fn default_criteria_return_leaf_state_paths() {
        let store = setup_index();
        let response = execute_search(
            &store,
            "datapath",
            &SearchCriteria::new("interfaces"),
        )
        .unwrap();

        let found: Vec<_> =
            response.human_ids.iter().map(|h| h.human_id.as_str()).collect();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&"/if:interfaces/ifInOctets"));
        assert!(found.contains(&"/if:interfaces/ifHCInOctets"));
    }

    #[test]
    fn os_release_pair_restricts_hits() {
        let store = setup_index();
        let criteria = SearchCriteria {
            os_releases: vec![("IOS XR".into(), "6.5.1".into())],
            ..SearchCriteria::new("octets")
        };
        let response = execute_search(&store, "datapath", &criteria).unwrap();

        assert_eq!(response.hits, 1);
        assert_eq!(response.human_ids[0].human_id, "/if:interfaces/ifInOctets");
        assert_eq!(response.human_ids[0].machine_id.len(), 1);
    }

    #[test]
    fn disabling_leaves_selects_containers() {
        let store = setup_index();
        let criteria = SearchCriteria {
            only_leaves: false,
            ..SearchCriteria::new("interfaces")
        };
        let response = execute_search(&store, "datapath", &criteria).unwrap();
        assert_eq!(response.human_ids.len(), 1);
        assert_eq!(response.human_ids[0].human_id, "/if:interfaces");
    }

    #[test]
    fn num_results_limits_buckets() {
        let store = setup_index();
        let criteria = SearchCriteria {
            num_results: 1,
            ..SearchCriteria::new("interfaces")
        };
        let response = execute_search(&store, "datapath", &criteria).unwrap();
        assert_eq!(response.human_ids.len(), 1);
        assert!(response.hits >= 2);
    }

    #[test]
    fn unrelated_query_finds_nothing() {
        let store = setup_index();
        let response = execute_search(
            &store,
            "datapath",
            &SearchCriteria::new("xyzzy_nonexistent"),
        )
        .unwrap();
        assert!(response.human_ids.is_empty());
        assert_eq!(response.hits, 0);
    }
}
