use std::path::Path;

use clap::Parser;
use serde_json::json;
use tdm::{
    ConfigDb,
    DataDir,
    RedbGraph,
    TantivySearchStore,
    builder::GraphBuilder,
    catalog::Catalog,
    config_db::keys,
    curation::{self, CalculationDef, MatchOptions, NativeDump},
    dedup::DedupCache,
    error::{self, Error},
    explore::{self, GraphSearchCriteria},
    graph_store::GraphStore,
    index_config::IndexConfig,
    ingestion::{IngestReport, Ingestor},
    lineage::LineageLinker,
    mib_source,
    projector::SearchProjector,
    query::{DEFAULT_NUM_RESULTS, SearchCriteria, parse_os_release},
    search,
    search_store::{self, SearchStore},
    seed,
};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{
    CalcAction,
    Cli,
    Command,
    ConfigAction,
    IngestSource,
    ListTarget,
    MatchAction,
};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("TDM_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;

    match cli.command {
        Command::Init(args) => {
            let graph = RedbGraph::open(&data_dir.graph_db())?;
            let catalog = load_catalog(&config_db, args.catalog.as_deref())?;
            cmd_init(&graph, &config_db, &data_dir, &catalog)?;
        }
        Command::Ingest { source } => {
            let graph = RedbGraph::open(&data_dir.graph_db())?;
            seed::seed_languages(&graph)?;
            match source {
                IngestSource::Yang {
                    root,
                    catalog,
                    jobs,
                } => {
                    let catalog =
                        load_catalog(&config_db, catalog.as_deref())?;
                    let report = Ingestor::new(&graph, &catalog)?
                        .jobs(jobs)
                        .ingest_yang(&root)?;
                    finish_ingest(&config_db, "yang", &root, &report)?;
                }
                IngestSource::Mibs { dir } => {
                    let catalog = load_catalog(&config_db, None)?;
                    let report =
                        Ingestor::new(&graph, &catalog)?.ingest_mibs(&dir)?;
                    finish_ingest(&config_db, "mibs", &dir, &report)?;
                }
            }
        }
        Command::FlattenMibs { src, dst } => {
            let written = mib_source::flatten_dir(&src, &dst)?;
            println!("Flattened {written} MIB(s) into {}", dst.display());
        }
        Command::Project(args) => {
            let graph = RedbGraph::open(&data_dir.graph_db())?;
            let search_index = open_search(&data_dir)?;
            let index = match &args.index {
                Some(index) => index.clone(),
                None => config_db.index_name()?,
            };
            cmd_project(&graph, &search_index, &index, &args)?;
        }
        Command::Search(args) => {
            let search_index = open_search(&data_dir)?;
            let index = match &args.index {
                Some(index) => index.clone(),
                None => config_db.index_name()?,
            };
            let criteria = search_criteria(&config_db, &args)?;
            let response =
                search::execute_search(&search_index, &index, &criteria)?;

            if args.json {
                search::format_json(&response)?;
            } else {
                search::format_human(&response);
            }
        }
        Command::Browse(args) => {
            let graph = RedbGraph::open(&data_dir.graph_db())?;
            let criteria = GraphSearchCriteria {
                filter_str: args.query,
                os_releases: args
                    .os_releases
                    .iter()
                    .map(|v| parse_os_release(v))
                    .collect::<error::Result<_>>()?,
                languages: args.languages,
                exclude_config: !args.include_config,
                only_leaves: !args.containers,
                start: args.start,
                limit: args.limit,
            };
            let result = explore::graph_search(&graph, &criteria)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Show(args) => {
            let graph = RedbGraph::open(&data_dir.graph_db())?;
            cmd_show(&graph, &args)?;
        }
        Command::Find { id } => {
            let graph = RedbGraph::open(&data_dir.graph_db())?;
            let found = explore::find_by_arbitrary_id(&graph, &id)?;
            if found.is_empty() {
                return Err(Error::NotFound {
                    kind: "DataPath",
                    name: id,
                });
            }
            for path in &found {
                let (key, machine_id) = (&path.key, &path.machine_id);
                println!("{key}\t{machine_id}\t{}", path.human_id);
            }
        }
        Command::List { what } => {
            let names = match what {
                ListTarget::Releases => {
                    let graph = RedbGraph::open(&data_dir.graph_db())?;
                    explore::list_os_releases(&graph)?
                }
                ListTarget::Languages => {
                    let graph = RedbGraph::open(&data_dir.graph_db())?;
                    explore::list_languages(&graph)?
                }
                ListTarget::Collections => explore::all_collection_names(),
            };
            for name in names {
                println!("{name}");
            }
        }
        Command::Count { collections } => {
            let graph = RedbGraph::open(&data_dir.graph_db())?;
            let names = if collections.is_empty() {
                explore::all_collection_names()
            } else {
                collections
            };
            for (name, count) in explore::collection_counts(&graph, &names)? {
                println!("{name}\t{count}");
            }
        }
        Command::Match { action } => {
            let graph = RedbGraph::open(&data_dir.graph_db())?;
            cmd_match(&graph, action)?;
        }
        Command::Calc { action } => {
            let graph = RedbGraph::open(&data_dir.graph_db())?;
            cmd_calc(&graph, action)?;
        }
        Command::Export { output } => {
            let graph = RedbGraph::open(&data_dir.graph_db())?;
            let dump = curation::export_native(&graph)?;
            let json = serde_json::to_string_pretty(&dump)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    eprintln!(
                        "Exported {} match(es) and {} calculation(s) to {}",
                        dump.matches.len(),
                        dump.calculations.len(),
                        path.display()
                    );
                }
                None => println!("{json}"),
            }
        }
        Command::Import { file } => {
            let graph = RedbGraph::open(&data_dir.graph_db())?;
            let dump: NativeDump =
                serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            let failures = curation::import_native(&graph, &dump)?;
            if failures.is_empty() {
                println!(
                    "Imported {} match(es) and {} calculation(s)",
                    dump.matches.len(),
                    dump.calculations.len()
                );
            } else {
                println!("{}", serde_json::to_string_pretty(&failures)?);
            }
        }
        Command::Config { action } => cmd_config(&config_db, action)?,
        Command::Status(args) => {
            cmd_status(&config_db, &data_dir, args.json)?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn open_search(data_dir: &DataDir) -> error::Result<TantivySearchStore> {
    TantivySearchStore::open(&data_dir.tantivy_dir()?)
}

/// The catalog named on the command line, then the stored setting, then
/// the built-in one.
fn load_catalog(
    config_db: &ConfigDb,
    explicit: Option<&Path>,
) -> error::Result<Catalog> {
    if let Some(path) = explicit {
        return Catalog::load(path);
    }
    match config_db.get_setting(keys::CATALOG_PATH)? {
        Some(path) => Catalog::load(Path::new(&path)),
        None => Ok(Catalog::builtin()),
    }
}

fn cmd_init(
    graph: &RedbGraph,
    config_db: &ConfigDb,
    data_dir: &DataDir,
    catalog: &Catalog,
) -> error::Result<()> {
    let seeded = seed::seed_languages(graph)?;

    let cache = DedupCache::new();
    cache.hydrate(graph)?;
    let builder = GraphBuilder::new(graph, &cache);
    let revisions = LineageLinker::new(&builder).link_catalog(catalog)?;

    let search_index = open_search(data_dir)?;
    let index = config_db.index_name()?;
    let config = IndexConfig::datapath();
    let created = search_store::provision(&search_index, &index, &config)?;

    println!(
        "Seeded {} language(s) and {} data type(s)",
        seeded.languages, seeded.data_types
    );
    println!("Linked {revisions} release revision(s)");
    if created {
        println!("Created search index '{index}'");
    } else {
        println!("Search index '{index}' already exists");
    }
    Ok(())
}

fn finish_ingest(
    config_db: &ConfigDb,
    source: &str,
    root: &Path,
    report: &IngestReport,
) -> error::Result<()> {
    config_db.record_run(&report.to_run_record(source, root))?;

    for failure in &report.failures {
        eprintln!(
            "  failed {}/{}: {}",
            failure.scope, failure.source, failure.error
        );
    }
    println!(
        "Ingested {} model(s) in {} scope(s), {} failed",
        report.models_ok,
        report.scopes,
        report.failures.len()
    );
    println!(
        "Data paths: {} created, {} reused, {} collision(s)",
        report.stats.paths_created,
        report.stats.paths_reused,
        report.stats.collisions
    );
    if report.revision_edges > 0 {
        println!("Linked {} model revision(s)", report.revision_edges);
    }
    Ok(())
}

fn cmd_project(
    graph: &RedbGraph,
    search_index: &TantivySearchStore,
    index: &str,
    args: &cli::ProjectArgs,
) -> error::Result<()> {
    if args.recreate && search_index.delete_index(index)? {
        eprintln!("Deleted index '{index}'");
    }
    search_store::provision(search_index, index, &IndexConfig::datapath())?;

    let report = SearchProjector::new(graph).project_into(
        search_index,
        index,
        args.batch_size,
    )?;

    for failure in &report.bulk.failures {
        eprintln!("  document {} failed: {}", failure.id, failure.reason);
    }
    println!(
        "Indexed {} document(s) for {} data path(s) into '{index}'",
        report.bulk.indexed, report.data_paths
    );
    Ok(())
}

fn search_criteria(
    config_db: &ConfigDb,
    args: &cli::SearchArgs,
) -> error::Result<SearchCriteria> {
    let num_results = match args.count {
        Some(n) => n,
        None => match config_db.get_setting(keys::NUM_RESULTS)? {
            Some(value) => value.parse().map_err(|_| {
                Error::Config(format!(
                    "setting {} is not a number: {value}",
                    keys::NUM_RESULTS
                ))
            })?,
            None => DEFAULT_NUM_RESULTS,
        },
    };

    Ok(SearchCriteria {
        filter_str: args.query.clone(),
        os_releases: args
            .os_releases
            .iter()
            .map(|v| parse_os_release(v))
            .collect::<error::Result<_>>()?,
        languages: args.languages.clone(),
        exclude_config: !args.include_config,
        only_leaves: !args.containers,
        num_results,
    })
}

fn cmd_show(graph: &RedbGraph, args: &cli::ShowArgs) -> error::Result<()> {
    let key = if args.key {
        args.id.clone()
    } else {
        explore::resolve_data_path(graph, &args.id)?.key().to_string()
    };
    let details = explore::datapath_details(graph, &key)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&details)?);
        return Ok(());
    }

    println!("Key: {}", details.key);
    for (name, value) in &details.fields {
        println!("{name}: {value}");
    }
    println!("Models:");
    for (model, revisions) in &details.models {
        for rev in revisions {
            println!("  {model} {} ({})", rev.revision, rev.language);
        }
    }
    println!("Releases:");
    for label in &details.os_releases {
        println!("  {label}");
    }
    let sections = [
        ("Parents", &details.parents),
        ("Children", &details.children),
        ("Matches", &details.matches),
    ];
    for (title, paths) in sections {
        if paths.is_empty() {
            continue;
        }
        println!("{title}:");
        for path in paths {
            println!("  {} {}", path.key, path.human_id);
        }
    }
    for data_type in &details.data_types {
        println!("Type: {} ({})", data_type.name, data_type.key);
    }
    Ok(())
}

fn cmd_match(graph: &dyn GraphStore, action: MatchAction) -> error::Result<()> {
    match action {
        MatchAction::Add {
            first,
            second,
            author,
            annotation,
            weight,
            validated,
        } => {
            let options = MatchOptions {
                annotation,
                weight,
                validated,
                ..MatchOptions::new(&author)
            };
            curation::add_match(graph, &first, &second, &options)?;
            println!("Matched {first} <-> {second}");
        }
        MatchAction::AddByKey {
            base_key,
            match_key,
            author,
            weight,
            annotation,
        } => {
            curation::add_match_by_key(
                graph,
                &base_key,
                &match_key,
                &author,
                weight,
                annotation.as_deref(),
            )?;
            println!("Matched {base_key} <-> {match_key}");
        }
        MatchAction::Show { ids } => {
            let found = curation::fetch_matches(graph, &ids)?;
            println!("{}", serde_json::to_string_pretty(&found)?);
        }
        MatchAction::List => {
            let grouped = curation::matched_paths_by_language(graph)?;
            println!("{}", serde_json::to_string_pretty(&grouped)?);
        }
    }
    Ok(())
}

fn cmd_calc(graph: &dyn GraphStore, action: CalcAction) -> error::Result<()> {
    match action {
        CalcAction::Add {
            name,
            description,
            equation,
            author,
            factors,
            results,
        } => {
            let definition = CalculationDef {
                name,
                description,
                equation,
                author,
                factors,
                results,
            };
            curation::add_calculation(graph, &definition)?;
            println!("Added calculation '{}'", definition.name);
        }
        CalcAction::Show { ids } => {
            let found = curation::fetch_calculations(graph, &ids)?;
            println!("{}", serde_json::to_string_pretty(&found)?);
        }
    }
    Ok(())
}

fn cmd_config(config_db: &ConfigDb, action: ConfigAction) -> error::Result<()> {
    match action {
        ConfigAction::Get { key } => match config_db.get_setting(&key)? {
            Some(value) => println!("{value}"),
            None => {
                return Err(Error::NotFound {
                    kind: "setting",
                    name: key,
                });
            }
        },
        ConfigAction::Set { key, value } => {
            config_db.set_setting(&key, &value)?;
            println!("Set {key} = {value}");
        }
        ConfigAction::Unset { key } => {
            if !config_db.remove_setting(&key)? {
                return Err(Error::NotFound {
                    kind: "setting",
                    name: key,
                });
            }
            println!("Removed {key}");
        }
        ConfigAction::List => {
            for (key, value) in config_db.list_settings()? {
                println!("{key}\t{value}");
            }
        }
    }
    Ok(())
}

fn cmd_status(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    json: bool,
) -> error::Result<()> {
    let graph = RedbGraph::open(&data_dir.graph_db())?;
    let search_index = open_search(data_dir)?;
    let index = config_db.index_name()?;

    let counts =
        explore::collection_counts(&graph, &explore::all_collection_names())?;
    let documents = if search_index.index_exists(&index)? {
        Some(search_index.count(&index)?)
    } else {
        None
    };
    let runs = config_db.recent_runs(5)?;

    if json {
        let status = json!({
            "data_dir": data_dir.root().display().to_string(),
            "index": index,
            "documents": documents,
            "collections": counts,
            "recent_runs": runs,
        });
        println!("{status}");
        return Ok(());
    }

    println!("Data directory: {}", data_dir.root().display());
    match documents {
        Some(count) => println!("Index '{index}': {count} document(s)"),
        None => println!("Index '{index}': not created"),
    }
    println!("Collections:");
    for (name, count) in &counts {
        println!("  {name}: {count}");
    }
    if !runs.is_empty() {
        println!("Recent runs:");
        for run in &runs {
            println!(
                "  {} {} {}: {} ok, {} failed",
                run.finished_at.format("%Y-%m-%d %H:%M:%S"),
                run.source,
                run.root,
                run.models_ok,
                run.models_failed
            );
        }
    }
    Ok(())
}
