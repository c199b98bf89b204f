//! Ingestion runs over directories of source dumps.
//!
//! YANG dumps are laid out `<root>/<os code>/<release folder>/*.json`. Each
//! (OS, release) directory is a scope; scopes run in parallel and share one
//! [`DedupCache`]. A model that fails to load or build is recorded in the
//! report and the run carries on.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::{
    builder::{BuildStats, GraphBuilder},
    catalog::Catalog,
    config_db::RunRecord,
    dedup::DedupCache,
    error::{Error, Result},
    graph_store::{GraphStore, VertexCollection, VertexHandle},
    lineage::LineageLinker,
    mib_source::MibDump,
    seed,
    walker::{self, DiscoveredFile},
    yang_source::{ModuleDump, ModuleSet},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelFailure {
    pub scope: String,
    pub source: String,
    pub error: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestReport {
    pub scopes: usize,
    pub models_ok: usize,
    pub failures: Vec<ModelFailure>,
    pub stats: BuildStats,
    pub revision_edges: usize,
}

impl IngestReport {
    pub fn to_run_record(&self, source: &str, root: &Path) -> RunRecord {
        RunRecord {
            finished_at: Utc::now(),
            source: source.to_string(),
            root: root.to_string_lossy().into_owned(),
            models_ok: self.models_ok,
            models_failed: self.failures.len(),
            paths_created: self.stats.paths_created,
            paths_reused: self.stats.paths_reused,
            collisions: self.stats.collisions,
        }
    }

    fn absorb(&mut self, outcome: ScopeOutcome) {
        self.scopes += 1;
        self.models_ok += outcome.models_ok;
        self.failures.extend(outcome.failures);
        self.stats.merge(outcome.stats);
    }
}

/// One (OS, release) directory.
#[derive(Debug, Clone)]
struct Scope {
    release_key: String,
    dir: PathBuf,
}

#[derive(Debug, Default)]
struct ScopeOutcome {
    models_ok: usize,
    failures: Vec<ModelFailure>,
    stats: BuildStats,
    revisions: Vec<(String, String)>,
}

impl ScopeOutcome {
    fn fail(&mut self, scope: &str, source: &str, err: &Error) {
        error!(scope, source, error = %err, "Model failed");
        self.failures.push(ModelFailure {
            scope: scope.to_string(),
            source: source.to_string(),
            error: err.to_string(),
        });
    }
}

pub struct Ingestor<'a> {
    store: &'a dyn GraphStore,
    catalog: &'a Catalog,
    cache: Arc<DedupCache>,
    jobs: Option<usize>,
}

impl<'a> Ingestor<'a> {
    /// An ingestor whose cache is hydrated from `store`, so the run adds to
    /// what earlier runs built.
    pub fn new(store: &'a dyn GraphStore, catalog: &'a Catalog) -> Result<Self> {
        let cache = DedupCache::new();
        cache.hydrate(store)?;
        Ok(Self::with_cache(store, catalog, Arc::new(cache)))
    }

    pub fn with_cache(
        store: &'a dyn GraphStore,
        catalog: &'a Catalog,
        cache: Arc<DedupCache>,
    ) -> Self {
        Self {
            store,
            catalog,
            cache,
            jobs: None,
        }
    }

    /// Limit the worker pool; defaults to one thread per core.
    pub fn jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs;
        self
    }

    fn pool(&self) -> Result<rayon::ThreadPool> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(jobs) = self.jobs {
            builder = builder.num_threads(jobs);
        }
        builder
            .build()
            .map_err(|e| Error::Config(format!("worker pool: {e}")))
    }

    /// Ingest every known (OS, release) directory under `root`.
    pub fn ingest_yang(&self, root: &Path) -> Result<IngestReport> {
        let builder = GraphBuilder::new(self.store, &self.cache);
        LineageLinker::new(&builder).link_catalog(self.catalog)?;

        let scopes = self.discover_scopes(root)?;
        info!(scopes = scopes.len(), root = %root.display(), "Ingesting YANG");

        let outcomes: Vec<ScopeOutcome> = self.pool()?.install(|| {
            scopes
                .par_iter()
                .map(|scope| self.ingest_scope(scope))
                .collect()
        });

        let mut report = IngestReport::default();
        let mut revisions: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for mut outcome in outcomes {
            for (module, revision) in outcome.revisions.drain(..) {
                revisions.entry(module).or_default().insert(revision);
            }
            report.absorb(outcome);
        }

        // Chains are linked once over every scope so they cannot branch.
        let linker = LineageLinker::new(&builder);
        for (module, mut seen) in revisions {
            seen.extend(self.stored_revisions(&module)?);
            let seen: Vec<String> = seen.into_iter().collect();
            report.revision_edges += linker.link_revisions(&module, &seen)?;
        }

        info!(
            models = report.models_ok,
            failed = report.failures.len(),
            paths_created = report.stats.paths_created,
            collisions = report.stats.collisions,
            "YANG ingestion finished"
        );
        Ok(report)
    }

    /// Ingest a directory of flat MIB files, one model per file.
    pub fn ingest_mibs(&self, dir: &Path) -> Result<IngestReport> {
        let files = walker::discover_files(dir)?;
        info!(files = files.len(), dir = %dir.display(), "Ingesting MIBs");

        let loaded: Vec<(&DiscoveredFile, Result<MibDump>)> = files
            .par_iter()
            .map(|file| (file, MibDump::read(&file.absolute_path)))
            .collect();

        let builder = GraphBuilder::new(self.store, &self.cache);
        let scope = "mib";
        let mut outcome = ScopeOutcome::default();
        for (file, dump) in loaded {
            let source = file.relative_path.to_string_lossy();
            let result = dump.and_then(|dump| {
                let dm = builder.ensure_data_model(&dump.name, None, seed::SMI)?;
                builder.build_snmp(&dm, &dump.name, &dump.objects)
            });
            match result {
                Ok(stats) => {
                    outcome.models_ok += 1;
                    outcome.stats.merge(stats);
                }
                Err(e) => outcome.fail(scope, &source, &e),
            }
        }

        let mut report = IngestReport::default();
        report.absorb(outcome);
        info!(
            models = report.models_ok,
            failed = report.failures.len(),
            paths_created = report.stats.paths_created,
            "MIB ingestion finished"
        );
        Ok(report)
    }

    fn discover_scopes(&self, root: &Path) -> Result<Vec<Scope>> {
        let mut scopes = Vec::new();
        for code in walker::subdirectories(root)? {
            if self.catalog.os_by_code(&code).is_none() {
                warn!(code, "Skipping directory of unknown OS");
                continue;
            }
            for folder in walker::subdirectories(&root.join(&code))? {
                match self.catalog.release_for_folder(&code, &folder) {
                    Some(release) => scopes.push(Scope {
                        release_key: release.key(),
                        dir: root.join(&code).join(&folder),
                    }),
                    None => warn!(code, folder, "Skipping unknown release"),
                }
            }
        }
        Ok(scopes)
    }

    fn ingest_scope(&self, scope: &Scope) -> ScopeOutcome {
        let mut outcome = ScopeOutcome::default();
        let name = scope.release_key.as_str();

        let files = match walker::discover_files(&scope.dir) {
            Ok(files) => files,
            Err(e) => {
                outcome.fail(name, &scope.dir.to_string_lossy(), &e);
                return outcome;
            }
        };

        // Parse in parallel, then build sequentially per scope.
        let parsed: Vec<_> = files
            .par_iter()
            .map(|file| (file, ModuleDump::read(&file.absolute_path)))
            .collect();

        let mut modules = ModuleSet::default();
        for (file, dump) in parsed {
            let source = file.relative_path.to_string_lossy();
            if let Err(e) = dump.and_then(|dump| modules.insert(dump)) {
                outcome.fail(name, &source, &e);
            }
        }

        let builder = GraphBuilder::new(self.store, &self.cache);
        let linker = LineageLinker::new(&builder);
        let release = VertexHandle::new(
            VertexCollection::Release,
            scope.release_key.clone(),
        );

        for dump in modules.iter() {
            let owner = format!("{}+{}", dump.name, dump.revision);
            let result = dump.adapt().and_then(|adapted| {
                let dm = builder.ensure_data_model(
                    &adapted.name,
                    adapted.revision.as_deref(),
                    seed::YANG,
                )?;
                let stats = builder.build_yang(&dm, &owner, &adapted.roots)?;
                linker.link_release(&release, &dm)?;
                Ok(stats)
            });
            match result {
                Ok(stats) => {
                    outcome.models_ok += 1;
                    outcome.stats.merge(stats);
                    outcome
                        .revisions
                        .push((dump.name.clone(), dump.revision.clone()));
                }
                Err(e) => outcome.fail(name, &owner, &e),
            }
        }

        info!(
            scope = name,
            models = outcome.models_ok,
            failed = outcome.failures.len(),
            "Scope done"
        );
        outcome
    }

    /// Revisions of `module` already in the graph.
    fn stored_revisions(&self, module: &str) -> Result<Vec<String>> {
        Ok(self
            .store
            .find(
                VertexCollection::DataModel,
                "name",
                &Value::String(module.to_string()),
            )?
            .iter()
            .filter_map(|dm| dm.str_field("revision").map(str::to_string))
            .collect())
    }
}
