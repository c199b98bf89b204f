//! Turns user search criteria into a [`SearchRequest`].

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    search_store::{
        BoostedField,
        Filter,
        HumanIdAggregation,
        MultiMatch,
        SearchRequest,
    },
};

pub const DEFAULT_NUM_RESULTS: usize = 150;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub filter_str: String,
    /// `(os name, release name)` pairs; a document must match one pair.
    #[serde(default)]
    pub os_releases: Vec<(String, String)>,
    #[serde(default)]
    pub languages: Vec<String>,
    pub exclude_config: bool,
    pub only_leaves: bool,
    pub num_results: usize,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            filter_str: String::new(),
            os_releases: Vec::new(),
            languages: Vec::new(),
            exclude_config: true,
            only_leaves: true,
            num_results: DEFAULT_NUM_RESULTS,
        }
    }
}

impl SearchCriteria {
    pub fn new(filter_str: &str) -> Self {
        Self {
            filter_str: filter_str.to_string(),
            ..Self::default()
        }
    }

    /// Trimmed, lowercased filter string.
    pub fn normalized_filter(&self) -> String {
        self.filter_str.trim().to_lowercase()
    }

    /// Whether any filter besides the text match is active.
    fn has_filters(&self) -> bool {
        !self.os_releases.is_empty()
            || !self.languages.is_empty()
            || self.exclude_config
            || self.only_leaves
    }
}

/// Parse `"IOS XE - 16.9.1"` into `("IOS XE", "16.9.1")`.
pub fn parse_os_release(value: &str) -> Result<(String, String)> {
    value
        .split_once(" - ")
        .map(|(os, release)| (os.trim().to_string(), release.trim().to_string()))
        .filter(|(os, release)| !os.is_empty() && !release.is_empty())
        .ok_or_else(|| {
            Error::Config(format!(
                "expected \"<os> - <release>\", got {value:?}"
            ))
        })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryPlanner;

impl QueryPlanner {
    pub fn plan(&self, criteria: &SearchCriteria) -> SearchRequest {
        let mut filters = Vec::new();

        if !criteria.os_releases.is_empty() {
            filters.push(Filter::AnyOf(
                criteria
                    .os_releases
                    .iter()
                    .map(|(os, release)| {
                        Filter::AllOf(vec![
                            Filter::term("os_name", os),
                            Filter::term("release_name", release),
                        ])
                    })
                    .collect(),
            ));
        }

        if !criteria.languages.is_empty() {
            filters.push(Filter::AnyOf(
                criteria
                    .languages
                    .iter()
                    .map(|lang| Filter::term("dml_name", lang))
                    .collect(),
            ));
        }

        if criteria.exclude_config {
            filters.push(Filter::flag("dp_is_configurable", false));
        }

        // With any filter active the leaf flag is pinned to `only_leaves`,
        // so turning leaves off selects containers only.
        if criteria.has_filters() {
            filters.push(Filter::flag("dp_is_leaf", criteria.only_leaves));
        }

        SearchRequest {
            must: MultiMatch {
                query: criteria.normalized_filter(),
                fields: vec![
                    BoostedField::new("dp_human_id", 3.0),
                    BoostedField::new("dp_machine_id", 1.0),
                    BoostedField::new("dp_description", 1.0),
                ],
            },
            filters,
            aggregation: HumanIdAggregation {
                size: criteria.num_results,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_exclude_config_and_keep_leaves() {
        let request = QueryPlanner.plan(&SearchCriteria::new("  In Octets "));
        assert_eq!(request.must.query, "in octets");
        assert_eq!(request.must.fields[0].name, "dp_human_id");
        assert_eq!(request.must.fields[0].boost, 3.0);
        assert_eq!(
            request.filters,
            vec![
                Filter::flag("dp_is_configurable", false),
                Filter::flag("dp_is_leaf", true),
            ]
        );
        assert_eq!(request.aggregation.size, DEFAULT_NUM_RESULTS);
    }

    #[test]
    fn os_releases_are_matched_pairwise() {
        let criteria = SearchCriteria {
            os_releases: vec![
                ("IOS XE".into(), "16.9.1".into()),
                ("IOS XR".into(), "6.5.1".into()),
            ],
            languages: vec!["YANG".into()],
            ..SearchCriteria::new("mtu")
        };
        let request = QueryPlanner.plan(&criteria);

        let Filter::AnyOf(pairs) = &request.filters[0] else {
            panic!("expected os/release disjunction");
        };
        assert_eq!(pairs.len(), 2);
        assert_eq!(
            pairs[1],
            Filter::AllOf(vec![
                Filter::term("os_name", "IOS XR"),
                Filter::term("release_name", "6.5.1"),
            ])
        );
        assert_eq!(
            request.filters[1],
            Filter::AnyOf(vec![Filter::term("dml_name", "YANG")])
        );
    }

    #[test]
    fn leaf_flag_follows_only_leaves_when_filtering() {
        let containers = SearchCriteria {
            exclude_config: false,
            only_leaves: false,
            languages: vec!["SMI".into()],
            ..SearchCriteria::new("if")
        };
        let request = QueryPlanner.plan(&containers);
        assert_eq!(
            request.filters.last(),
            Some(&Filter::flag("dp_is_leaf", false))
        );

        let unfiltered = SearchCriteria {
            exclude_config: false,
            only_leaves: false,
            ..SearchCriteria::new("if")
        };
        assert!(QueryPlanner.plan(&unfiltered).filters.is_empty());
    }

    #[test]
    fn os_release_parsing() {
        assert_eq!(
            parse_os_release("NX-OS - 7.0(3)I7(1)").unwrap(),
            ("NX-OS".to_string(), "7.0(3)I7(1)".to_string())
        );
        assert!(parse_os_release("IOS XE").is_err());
        assert!(parse_os_release(" - 16.9.1").is_err());
    }
}
