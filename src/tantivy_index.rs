use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use parking_lot::RwLock;
use serde_json::Value;
use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    TantivyDocument,
    Term,
    collector::{Count, TopDocs},
    query::{BooleanQuery, BoostQuery, ConstScoreQuery, Occur, Query, TermQuery},
    schema::{
        Field,
        INDEXED,
        IndexRecordOption,
        STORED,
        STRING,
        Schema,
        TextFieldIndexing,
        TextOptions,
        Value as _,
    },
};
use tracing::{debug, error};

use crate::{
    error::{Error, Result},
    graph_store::Document,
    index_config::{FieldMapping, IndexConfig, SNOWBALL},
    path_analyzer::{PathTokenizer, snowball_analyzer},
    search_store::{
        BulkFailure,
        BulkReport,
        Bucket,
        Filter,
        MultiMatch,
        RawSearchResponse,
        SearchRequest,
        SearchStore,
    },
};

/// Stored synthetic document id.
pub const ID_FIELD: &str = "_id";

const WRITER_MEMORY: usize = 50_000_000;

/// Tantivy field holding the exact-match form of `field`.
pub fn keyword_field(field: &str) -> String {
    format!("{field}_keyword")
}

struct OpenIndex {
    index: Index,
    reader: IndexReader,
    schema: Schema,
}

impl OpenIndex {
    fn field(&self, name: &str) -> Result<Field> {
        self.schema
            .get_field(name)
            .map_err(|_| Error::Config(format!("unknown index field: {name}")))
    }
}

fn build_schema(config: &IndexConfig) -> Schema {
    let mut builder = Schema::builder();
    builder.add_u64_field(ID_FIELD, INDEXED | STORED);

    for (name, mapping) in &config.mappings.properties {
        match mapping {
            FieldMapping::Keyword => {
                builder.add_text_field(name, STRING | STORED);
            }
            FieldMapping::Boolean => {
                builder.add_bool_field(name, INDEXED | STORED);
            }
            FieldMapping::Text { analyzer, .. } => {
                let opts = TextOptions::default()
                    .set_indexing_options(
                        TextFieldIndexing::default()
                            .set_tokenizer(analyzer)
                            .set_index_option(
                                IndexRecordOption::WithFreqsAndPositions,
                            ),
                    )
                    .set_stored();
                builder.add_text_field(name, opts);
                if mapping.has_keyword() {
                    builder.add_text_field(
                        &keyword_field(name),
                        STRING | STORED,
                    );
                }
            }
        }
    }
    builder.build()
}

fn register_tokenizers(index: &Index, config: &IndexConfig) -> Result<()> {
    index.tokenizers().register(SNOWBALL, snowball_analyzer());
    for name in config.settings.analysis.analyzer.keys() {
        let tokenizer = PathTokenizer::from_config(config, name)?;
        index.tokenizers().register(name, tokenizer.analyzer());
    }
    Ok(())
}

/// [`SearchStore`] over tantivy indexes, one directory per index under a
/// root, or entirely in memory.
pub struct TantivySearchStore {
    root: Option<PathBuf>,
    open: RwLock<HashMap<String, Arc<OpenIndex>>>,
}

impl TantivySearchStore {
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: Some(root.to_path_buf()),
            open: RwLock::new(HashMap::new()),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn open_in_ram() -> Self {
        Self {
            root: None,
            open: RwLock::new(HashMap::new()),
        }
    }

    fn index_dir(&self, name: &str) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(name))
    }

    fn config_path(&self, name: &str) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(format!("{name}.config.json")))
    }

    fn on_disk(&self, name: &str) -> bool {
        self.config_path(name).is_some_and(|p| p.exists())
    }

    fn mmap_dir(dir: &Path) -> Result<tantivy::directory::MmapDirectory> {
        tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| {
                tantivy::TantivyError::SystemError(e.to_string()).into()
            })
    }

    fn load(&self, name: &str) -> Result<Arc<OpenIndex>> {
        if let Some(open) = self.open.read().get(name) {
            return Ok(Arc::clone(open));
        }

        let (Some(dir), Some(config_path)) =
            (self.index_dir(name), self.config_path(name))
        else {
            return Err(not_found(name));
        };
        if !config_path.exists() {
            return Err(not_found(name));
        }

        let config: IndexConfig =
            serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let index = Index::open(Self::mmap_dir(&dir)?)?;
        register_tokenizers(&index, &config)?;
        let reader = index.reader()?;
        let schema = index.schema();

        let open = Arc::new(OpenIndex {
            index,
            reader,
            schema,
        });
        self.open
            .write()
            .insert(name.to_string(), Arc::clone(&open));
        debug!(index = name, "Opened search index");
        Ok(open)
    }

    fn to_document(
        open: &OpenIndex,
        id: u64,
        source: &Document,
    ) -> Result<TantivyDocument> {
        let mut doc = TantivyDocument::default();
        doc.add_u64(open.field(ID_FIELD)?, id);

        for (name, value) in source {
            let field = open.field(name)?;
            match value {
                Value::Null => {}
                Value::String(text) => {
                    doc.add_text(field, text);
                    let keyword = keyword_field(name);
                    if let Ok(keyword) = open.schema.get_field(&keyword) {
                        doc.add_text(keyword, text);
                    }
                }
                Value::Bool(flag) => doc.add_bool(field, *flag),
                other => {
                    return Err(Error::Config(format!(
                        "field {name} cannot hold {other}"
                    )));
                }
            }
        }
        Ok(doc)
    }

    fn match_query(
        open: &OpenIndex,
        must: &MultiMatch,
    ) -> Result<Option<Box<dyn Query>>> {
        let mut per_field: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        for boosted in &must.fields {
            let field = open.field(&boosted.name)?;
            let mut analyzer = open.index.tokenizer_for_field(field)?;
            let mut stream = analyzer.token_stream(&must.query);

            // Terms at one position are alternatives (synonyms, the
            // preserved original); every position must match.
            let mut positions: BTreeMap<usize, Vec<String>> = BTreeMap::new();
            while stream.advance() {
                let token = stream.token();
                positions
                    .entry(token.position)
                    .or_default()
                    .push(token.text.clone());
            }
            if positions.is_empty() {
                continue;
            }

            let groups: Vec<(Occur, Box<dyn Query>)> = positions
                .into_values()
                .map(|words| {
                    let alternatives: Vec<(Occur, Box<dyn Query>)> = words
                        .into_iter()
                        .map(|word| {
                            let term = Term::from_field_text(field, &word);
                            let query: Box<dyn Query> = Box::new(
                                TermQuery::new(
                                    term,
                                    IndexRecordOption::WithFreqs,
                                ),
                            );
                            (Occur::Should, query)
                        })
                        .collect();
                    let group: Box<dyn Query> =
                        Box::new(BooleanQuery::new(alternatives));
                    (Occur::Must, group)
                })
                .collect();

            let query: Box<dyn Query> = Box::new(BooleanQuery::new(groups));
            per_field.push((
                Occur::Should,
                Box::new(BoostQuery::new(query, boosted.boost)),
            ));
        }

        if per_field.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(BooleanQuery::new(per_field))))
    }

    fn filter_query(
        open: &OpenIndex,
        filter: &Filter,
    ) -> Result<Box<dyn Query>> {
        Ok(match filter {
            Filter::Term { field, value } => Box::new(TermQuery::new(
                Term::from_field_text(open.field(field)?, value),
                IndexRecordOption::Basic,
            )),
            Filter::Flag { field, value } => Box::new(TermQuery::new(
                Term::from_field_bool(open.field(field)?, *value),
                IndexRecordOption::Basic,
            )),
            Filter::AllOf(filters) => Box::new(BooleanQuery::new(
                filters
                    .iter()
                    .map(|f| Ok((Occur::Must, Self::filter_query(open, f)?)))
                    .collect::<Result<Vec<_>>>()?,
            )),
            Filter::AnyOf(filters) => Box::new(BooleanQuery::new(
                filters
                    .iter()
                    .map(|f| Ok((Occur::Should, Self::filter_query(open, f)?)))
                    .collect::<Result<Vec<_>>>()?,
            )),
        })
    }
}

fn not_found(name: &str) -> Error {
    Error::NotFound {
        kind: "search index",
        name: name.to_string(),
    }
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

impl SearchStore for TantivySearchStore {
    fn create_index(&self, name: &str, config: &IndexConfig) -> Result<()> {
        if self.index_exists(name)? {
            return Err(Error::IndexAlreadyExists(name.to_string()));
        }

        let schema = build_schema(config);
        let index = match (self.index_dir(name), self.config_path(name)) {
            (Some(dir), Some(config_path)) => {
                std::fs::create_dir_all(&dir)?;
                let index = Index::create(
                    Self::mmap_dir(&dir)?,
                    schema.clone(),
                    tantivy::IndexSettings::default(),
                )?;
                let json = serde_json::to_vec_pretty(config)?;
                std::fs::write(config_path, json)?;
                index
            }
            _ => Index::create_in_ram(schema.clone()),
        };
        register_tokenizers(&index, config)?;
        let reader = index.reader()?;

        self.open.write().insert(
            name.to_string(),
            Arc::new(OpenIndex {
                index,
                reader,
                schema,
            }),
        );
        debug!(index = name, "Created search index");
        Ok(())
    }

    fn delete_index(&self, name: &str) -> Result<bool> {
        let was_open = self.open.write().remove(name).is_some();
        if !self.on_disk(name) {
            return Ok(was_open);
        }
        if let Some(dir) = self.index_dir(name)
            && dir.exists()
        {
            std::fs::remove_dir_all(dir)?;
        }
        if let Some(config_path) = self.config_path(name) {
            std::fs::remove_file(config_path)?;
        }
        Ok(true)
    }

    fn index_exists(&self, name: &str) -> Result<bool> {
        Ok(self.open.read().contains_key(name) || self.on_disk(name))
    }

    fn bulk_index(
        &self,
        name: &str,
        docs: &[(u64, Document)],
    ) -> Result<BulkReport> {
        let open = self.load(name)?;
        let mut writer: IndexWriter = open.index.writer(WRITER_MEMORY)?;
        let mut report = BulkReport::default();

        for (id, source) in docs {
            let added = Self::to_document(&open, *id, source)
                .and_then(|doc| Ok(writer.add_document(doc)?));
            match added {
                Ok(_) => report.indexed += 1,
                Err(e) => {
                    error!(
                        index = name,
                        id,
                        error = %e,
                        "Failed to index document"
                    );
                    report.failures.push(BulkFailure {
                        id: *id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        writer.commit()?;
        open.reader.reload()?;
        Ok(report)
    }

    fn search(
        &self,
        name: &str,
        request: &SearchRequest,
    ) -> Result<RawSearchResponse> {
        let started = Instant::now();
        let open = self.load(name)?;
        open.reader.reload()?;
        let searcher = open.reader.searcher();

        // A query that analyzes to nothing matches nothing.
        let Some(scored) = Self::match_query(&open, &request.must)? else {
            return Ok(RawSearchResponse {
                took_ms: started.elapsed().as_millis() as u64,
                total_hits: 0,
                buckets: Vec::new(),
            });
        };

        let mut clauses: Vec<(Occur, Box<dyn Query>)> =
            vec![(Occur::Must, scored)];
        for filter in &request.filters {
            let query = Self::filter_query(&open, filter)?;
            let unscored = ConstScoreQuery::new(query, 0.0);
            clauses.push((Occur::Must, Box::new(unscored)));
        }
        let query = BooleanQuery::new(clauses);

        let total_hits = searcher.search(&query, &Count)?;
        let hits =
            searcher.search(&query, &TopDocs::with_limit(total_hits.max(1)))?;

        let human_id = open.field(&keyword_field("dp_human_id"))?;
        let machine_id = open.field(&keyword_field("dp_machine_id"))?;
        let dp_key = open.field("dp_key")?;

        let mut buckets: HashMap<String, Bucket> = HashMap::new();
        for (score, address) in hits {
            let doc: TantivyDocument = searcher.doc(address)?;
            let key = extract_text(&doc, human_id);
            let bucket = buckets.entry(key.clone()).or_insert_with(|| Bucket {
                human_id: key,
                doc_count: 0,
                relevance: f32::MIN,
                machine_ids: Vec::new(),
            });
            bucket.doc_count += 1;
            bucket.relevance = bucket.relevance.max(score);

            let dp = extract_text(&doc, dp_key);
            if !bucket.machine_ids.iter().any(|(k, _)| *k == dp) {
                bucket
                    .machine_ids
                    .push((dp, extract_text(&doc, machine_id)));
            }
        }

        let mut buckets: Vec<Bucket> = buckets.into_values().collect();
        buckets.sort_by(|a, b| {
            b.relevance
                .total_cmp(&a.relevance)
                .then_with(|| a.human_id.cmp(&b.human_id))
        });
        buckets.truncate(request.aggregation.size);

        Ok(RawSearchResponse {
            took_ms: started.elapsed().as_millis() as u64,
            total_hits: total_hits as u64,
            buckets,
        })
    }

    fn count(&self, name: &str) -> Result<u64> {
        let open = self.load(name)?;
        open.reader.reload()?;
        Ok(open.reader.searcher().num_docs())
    }
}

impl std::fmt::Debug for TantivySearchStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TantivySearchStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        graph_store::document,
        search_store::{BoostedField, HumanIdAggregation, provision},
    };

    fn doc(
        key: &str,
        human_id: &str,
        machine_id: &str,
        os: Option<&str>,
        configurable: bool,
    ) -> Document {
        document([
            ("dp_key", json!(key)),
            ("dp_human_id", json!(human_id)),
            ("dp_machine_id", json!(machine_id)),
            ("dp_description", json!("Counts received packets")),
            ("dp_is_leaf", json!(true)),
            ("dp_is_configurable", json!(configurable)),
            ("dml_name", json!("YANG")),
            ("os_name", json!(os)),
            ("release_name", json!(os.map(|_| "16.9.1"))),
        ])
    }

    fn request(query: &str, filters: Vec<Filter>) -> SearchRequest {
        SearchRequest {
            must: MultiMatch {
                query: query.to_string(),
                fields: vec![
                    BoostedField::new("dp_human_id", 3.0),
                    BoostedField::new("dp_machine_id", 1.0),
                    BoostedField::new("dp_description", 1.0),
                ],
            },
            filters,
            aggregation: HumanIdAggregation { size: 150 },
        }
    }

    fn seeded_store() -> TantivySearchStore {
        let store = TantivySearchStore::open_in_ram();
        store
            .create_index("datapath", &IndexConfig::datapath())
            .unwrap();
        let docs = vec![
            (
                0,
                doc(
                    "1",
                    "/oc-if:interfaces/interface/state/counters/in-unicast-pkts",
                    "/oc-if:interfaces/oc-if:interface/oc-if:state/oc-if:counters/oc-if:in-unicast-pkts",
                    Some("IOS XE"),
                    false,
                ),
            ),
            (
                1,
                doc(
                    "1",
                    "/oc-if:interfaces/interface/state/counters/in-unicast-pkts",
                    "/oc-if:interfaces/oc-if:interface/oc-if:state/oc-if:counters/oc-if:in-unicast-pkts",
                    None,
                    false,
                ),
            ),
            (
                2,
                doc(
                    "2",
                    "/oc-if:interfaces/interface/config/mtu",
                    "/oc-if:interfaces/oc-if:interface/oc-if:config/oc-if:mtu",
                    Some("IOS XE"),
                    true,
                ),
            ),
        ];
        let report = store.bulk_index("datapath", &docs).unwrap();
        assert_eq!(report.indexed, 3);
        store
    }

    #[test]
    fn create_twice_reports_existing() {
        let store = TantivySearchStore::open_in_ram();
        let config = IndexConfig::datapath();
        assert!(provision(&store, "datapath", &config).unwrap());
        assert!(!provision(&store, "datapath", &config).unwrap());
        assert!(matches!(
            store.create_index("datapath", &config),
            Err(Error::IndexAlreadyExists(_))
        ));
    }

    #[test]
    fn synonyms_match_and_bucket_by_human_id() {
        let store = seeded_store();
        let response = store
            .search("datapath", &request("interface unicast packet", vec![]))
            .unwrap();

        // Every word has to land in the same field; "pkts" is not "packet".
        assert_eq!(response.total_hits, 0);

        let response = store
            .search("datapath", &request("intf ucast", vec![]))
            .unwrap();
        assert_eq!(response.total_hits, 2);
        assert_eq!(response.buckets.len(), 1);
        let bucket = &response.buckets[0];
        assert_eq!(bucket.doc_count, 2);
        assert_eq!(bucket.machine_ids.len(), 1);
        assert_eq!(bucket.machine_ids[0].0, "1");
    }

    #[test]
    fn filters_do_not_score_but_restrict() {
        let store = seeded_store();
        let unfiltered = store
            .search("datapath", &request("interfaces", vec![]))
            .unwrap();
        assert_eq!(unfiltered.total_hits, 3);

        let filtered = store
            .search(
                "datapath",
                &request(
                    "interfaces",
                    vec![
                        Filter::term("os_name", "IOS XE"),
                        Filter::flag("dp_is_configurable", false),
                    ],
                ),
            )
            .unwrap();
        assert_eq!(filtered.total_hits, 1);
        let human = &filtered.buckets[0].human_id;
        assert!(human.ends_with("in-unicast-pkts"));
    }

    #[test]
    fn stop_words_in_query_are_ignored_for_descriptions() {
        let store = TantivySearchStore::open_in_ram();
        store
            .create_index("datapath", &IndexConfig::datapath())
            .unwrap();
        let sensor = document([
            ("dp_key", json!("7")),
            ("dp_human_id", json!("/env:sensors/value")),
            ("dp_machine_id", json!("/env:sensors/env:value")),
            ("dp_description", json!("Current temperature reading")),
            ("dp_is_leaf", json!(true)),
            ("dp_is_configurable", json!(false)),
        ]);
        store.bulk_index("datapath", &[(0, sensor)]).unwrap();

        let response = store
            .search("datapath", &request("the temperature", vec![]))
            .unwrap();
        assert_eq!(response.total_hits, 1);
        assert_eq!(response.buckets[0].human_id, "/env:sensors/value");
    }

    #[test]
    fn empty_query_matches_nothing() {
        let store = seeded_store();
        let response = store.search("datapath", &request("  ", vec![])).unwrap();
        assert_eq!(response.total_hits, 0);
        assert!(response.buckets.is_empty());
    }

    #[test]
    fn unknown_field_fails_one_document() {
        let store = TantivySearchStore::open_in_ram();
        store
            .create_index("datapath", &IndexConfig::datapath())
            .unwrap();
        let bad = document([("no_such_field", json!("x"))]);
        let good = doc("1", "/a:b", "/a:b", None, false);

        let report = store
            .bulk_index("datapath", &[(0, bad), (1, good)])
            .unwrap();
        assert_eq!(report.indexed, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, 0);
        assert_eq!(store.count("datapath").unwrap(), 1);
    }

    #[test]
    fn on_disk_index_survives_reopen_and_delete() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = TantivySearchStore::open(tmp.path()).unwrap();
            store
                .create_index("datapath", &IndexConfig::datapath())
                .unwrap();
            store
                .bulk_index(
                    "datapath",
                    &[(0, doc("1", "/a:ifMtu", "/a:ifMtu", None, false))],
                )
                .unwrap();
        }

        let store = TantivySearchStore::open(tmp.path()).unwrap();
        assert!(store.index_exists("datapath").unwrap());
        let hits = store.search("datapath", &request("mtu", vec![])).unwrap();
        assert_eq!(hits.total_hits, 1);

        assert!(store.delete_index("datapath").unwrap());
        assert!(!store.index_exists("datapath").unwrap());
        assert!(!store.delete_index("datapath").unwrap());
    }

    #[test]
    fn missing_index_is_not_found() {
        let store = TantivySearchStore::open_in_ram();
        assert!(matches!(
            store.count("nope"),
            Err(Error::NotFound { .. })
        ));
    }
}
