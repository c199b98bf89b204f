//! Search index definition: settings, analysis chain and field mappings.
//!
//! The shape follows the Elasticsearch index-creation body so it can be
//! exported as-is; [`crate::tantivy_index`] builds its schema and analyzers
//! from the same value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const PATH_ANALYZER: &str = "generic_path_analyzer";
pub const PATH_TOKENIZER: &str = "generic_path_tokenizer";
pub const WORD_DELIMITER: &str = "preserve_word_delimiter";
pub const LOWERCASE: &str = "lowercase";
pub const NETWORK_SYNONYM: &str = "network_synonym";
/// Built-in English stemming analyzer.
pub const SNOWBALL: &str = "snowball";
/// Name of the exact-match subfield on path fields.
pub const KEYWORD_SUBFIELD: &str = "keyword";

pub const PATH_SPLIT_PATTERN: &str = r"[\.\-/:]";

pub const NETWORK_SYNONYMS: [&str; 6] = [
    "optic, transceiver",
    "intf, interface, if, int",
    "ucast, unicast",
    "mcast, multicast",
    "pkt, packet",
    "in, inbound",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub settings: IndexSettings,
    pub mappings: Mappings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSettings {
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    pub analysis: Analysis,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub analyzer: BTreeMap<String, AnalyzerDef>,
    #[serde(default)]
    pub tokenizer: BTreeMap<String, TokenizerDef>,
    #[serde(default)]
    pub filter: BTreeMap<String, FilterDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalyzerDef {
    Custom { tokenizer: String, filter: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenizerDef {
    SimplePatternSplit { pattern: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterDef {
    WordDelimiter { preserve_original: bool },
    Synonym { expand: bool, synonyms: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mappings {
    pub properties: BTreeMap<String, FieldMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldMapping {
    Keyword,
    Boolean,
    Text {
        analyzer: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        fields: BTreeMap<String, FieldMapping>,
    },
}

impl FieldMapping {
    fn path() -> Self {
        FieldMapping::Text {
            analyzer: PATH_ANALYZER.to_string(),
            fields: BTreeMap::from([(
                KEYWORD_SUBFIELD.to_string(),
                FieldMapping::Keyword,
            )]),
        }
    }

    /// Whether the field carries an exact-match subfield.
    pub fn has_keyword(&self) -> bool {
        matches!(self, FieldMapping::Text { fields, .. }
            if fields.contains_key(KEYWORD_SUBFIELD))
    }
}

/// Split characters of a `[...]` character-class pattern.
pub fn pattern_chars(pattern: &str) -> Vec<char> {
    let inner = pattern
        .strip_prefix('[')
        .and_then(|p| p.strip_suffix(']'))
        .unwrap_or(pattern);
    let mut chars = Vec::new();
    let mut escaped = false;
    for ch in inner.chars() {
        if ch == '\\' && !escaped {
            escaped = true;
            continue;
        }
        chars.push(ch);
        escaped = false;
    }
    chars
}

/// Parse `a, b, c` synonym rules into groups.
pub fn synonym_groups(rules: &[String]) -> Vec<Vec<String>> {
    rules
        .iter()
        .map(|rule| {
            rule.split(',')
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        })
        .collect()
}

impl IndexConfig {
    /// The data path index.
    pub fn datapath() -> Self {
        let analysis = Analysis {
            analyzer: BTreeMap::from([(
                PATH_ANALYZER.to_string(),
                AnalyzerDef::Custom {
                    tokenizer: PATH_TOKENIZER.to_string(),
                    filter: vec![
                        WORD_DELIMITER.to_string(),
                        LOWERCASE.to_string(),
                        NETWORK_SYNONYM.to_string(),
                    ],
                },
            )]),
            tokenizer: BTreeMap::from([(
                PATH_TOKENIZER.to_string(),
                TokenizerDef::SimplePatternSplit {
                    pattern: PATH_SPLIT_PATTERN.to_string(),
                },
            )]),
            filter: BTreeMap::from([
                (
                    WORD_DELIMITER.to_string(),
                    FilterDef::WordDelimiter {
                        preserve_original: true,
                    },
                ),
                (
                    NETWORK_SYNONYM.to_string(),
                    FilterDef::Synonym {
                        expand: true,
                        synonyms: NETWORK_SYNONYMS
                            .iter()
                            .map(|s| s.to_string())
                            .collect(),
                    },
                ),
            ]),
        };

        let mut properties = BTreeMap::new();
        for keyword in [
            "dp_key",
            "dml_key",
            "dml_name",
            "dm_key",
            "dm_name",
            "dm_revision",
            "release_key",
            "release_name",
            "os_key",
            "os_name",
        ] {
            properties.insert(keyword.to_string(), FieldMapping::Keyword);
        }
        properties.insert("dp_machine_id".to_string(), FieldMapping::path());
        properties.insert("dp_human_id".to_string(), FieldMapping::path());
        properties.insert(
            "dp_description".to_string(),
            FieldMapping::Text {
                analyzer: SNOWBALL.to_string(),
                fields: BTreeMap::new(),
            },
        );
        properties.insert("dp_is_leaf".to_string(), FieldMapping::Boolean);
        properties
            .insert("dp_is_configurable".to_string(), FieldMapping::Boolean);

        Self {
            settings: IndexSettings {
                number_of_shards: 1,
                number_of_replicas: 0,
                analysis,
            },
            mappings: Mappings { properties },
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_to_elasticsearch_shape() {
        let body = IndexConfig::datapath().to_json().unwrap();

        assert_eq!(body["settings"]["number_of_shards"], 1);
        assert_eq!(body["settings"]["number_of_replicas"], 0);
        assert_eq!(
            body["settings"]["analysis"]["analyzer"][PATH_ANALYZER],
            json!({
                "type": "custom",
                "tokenizer": "generic_path_tokenizer",
                "filter": [
                    "preserve_word_delimiter",
                    "lowercase",
                    "network_synonym"
                ]
            })
        );
        assert_eq!(
            body["settings"]["analysis"]["filter"][WORD_DELIMITER],
            json!({"type": "word_delimiter", "preserve_original": true})
        );
        assert_eq!(
            body["mappings"]["properties"]["dp_human_id"],
            json!({
                "type": "text",
                "analyzer": "generic_path_analyzer",
                "fields": {"keyword": {"type": "keyword"}}
            })
        );
        assert_eq!(
            body["mappings"]["properties"]["dp_is_leaf"],
            json!({"type": "boolean"})
        );
        assert_eq!(
            body["mappings"]["properties"]["os_name"],
            json!({"type": "keyword"})
        );
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = IndexConfig::datapath();
        let parsed: IndexConfig =
            serde_json::from_value(config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn pattern_and_synonym_parsing() {
        assert_eq!(pattern_chars(PATH_SPLIT_PATTERN), ['.', '-', '/', ':']);

        let groups = synonym_groups(&[
            "intf, interface, if, int".to_string(),
            "Pkt,packet".to_string(),
        ]);
        assert_eq!(groups[0], ["intf", "interface", "if", "int"]);
        assert_eq!(groups[1], ["pkt", "packet"]);
    }
}
