use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "tdm",
    about = "Ingest YANG and MIB data models into a searchable graph"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Seed languages, OS releases and the search index
    Init(InitArgs),
    /// Load data models into the graph
    Ingest {
        #[command(subcommand)]
        source: IngestSource,
    },
    /// Flatten compiled MIB JSON into the form `ingest mibs` reads
    FlattenMibs {
        /// Directory of compiled MIB JSON files
        src: PathBuf,
        /// Output directory
        dst: PathBuf,
    },
    /// Project the graph into the search index
    Project(ProjectArgs),
    /// Ranked full-text search over data paths
    Search(SearchArgs),
    /// Word search by walking the graph from OS releases
    Browse(BrowseArgs),
    /// Show everything known about one data path
    Show(ShowArgs),
    /// Find data paths by exact machine or human id
    Find {
        /// Machine or human id
        id: String,
    },
    /// List OS releases, languages or collections
    List {
        #[command(subcommand)]
        what: ListTarget,
    },
    /// Count documents in graph collections
    Count {
        /// Collection names (all when omitted)
        collections: Vec<String>,
    },
    /// Curate matches between data paths
    Match {
        #[command(subcommand)]
        action: MatchAction,
    },
    /// Curate calculations over data paths
    Calc {
        #[command(subcommand)]
        action: CalcAction,
    },
    /// Write all matches and calculations as JSON
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Re-create matches and calculations from an export
    Import {
        /// File written by `export`
        file: PathBuf,
    },
    /// Read or change stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show system status and statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Init --

#[derive(Debug, Parser)]
pub struct InitArgs {
    /// OS/release catalog JSON (built-in catalog when omitted)
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}

// -- Ingest --

#[derive(Debug, Subcommand)]
pub enum IngestSource {
    /// Directory laid out as <os code>/<release folder>/*.json
    Yang {
        root: PathBuf,
        /// OS/release catalog JSON (built-in catalog when omitted)
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Worker threads (one per core by default)
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Directory of flattened MIB JSON files
    Mibs {
        dir: PathBuf,
    },
}

// -- Project --

#[derive(Debug, Parser)]
pub struct ProjectArgs {
    /// Delete and re-create the index first
    #[arg(long)]
    pub recreate: bool,

    /// Documents per bulk request
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Index name (defaults to the `index_name` setting)
    #[arg(long)]
    pub index: Option<String>,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Restrict to an OS release, as "<os> - <release>" (repeatable)
    #[arg(long = "os")]
    pub os_releases: Vec<String>,

    /// Restrict to a data model language (repeatable)
    #[arg(long = "lang")]
    pub languages: Vec<String>,

    /// Include configurable paths
    #[arg(long)]
    pub include_config: bool,

    /// Return containers instead of leaves
    #[arg(long)]
    pub containers: bool,

    /// Number of human ids to return
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Index name (defaults to the `index_name` setting)
    #[arg(long)]
    pub index: Option<String>,
}

// -- Browse --

#[derive(Debug, Parser)]
pub struct BrowseArgs {
    /// Words that must all appear in a path id
    pub query: String,

    /// OS release to walk, as "<os> - <release>" (repeatable)
    #[arg(long = "os", required = true)]
    pub os_releases: Vec<String>,

    /// Data model language to include (repeatable)
    #[arg(long = "lang", required = true)]
    pub languages: Vec<String>,

    /// Include configurable paths
    #[arg(long)]
    pub include_config: bool,

    /// Return containers instead of leaves
    #[arg(long)]
    pub containers: bool,

    /// Paths to skip per model
    #[arg(long, default_value = "0")]
    pub start: usize,

    /// Paths to return per model
    #[arg(long, default_value = "10")]
    pub limit: usize,
}

// -- Show --

#[derive(Debug, Parser)]
pub struct ShowArgs {
    /// Machine id, human id, or vertex key with --key
    pub id: String,

    /// Treat the argument as a DataPath vertex key
    #[arg(long)]
    pub key: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- List --

#[derive(Debug, Subcommand)]
pub enum ListTarget {
    /// Every "<os> - <release>" pair
    Releases,
    /// Every data model language
    Languages,
    /// Every graph collection name
    Collections,
}

// -- Match --

#[derive(Debug, Subcommand)]
pub enum MatchAction {
    /// Match two paths named by machine or human id
    Add {
        first: String,
        second: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        annotation: Option<String>,
        #[arg(long, default_value = "0")]
        weight: i64,
        #[arg(long)]
        validated: bool,
    },
    /// Match two paths by vertex key
    AddByKey {
        base_key: String,
        match_key: String,
        #[arg(long)]
        author: String,
        #[arg(long, default_value = "0")]
        weight: i64,
        #[arg(long)]
        annotation: Option<String>,
    },
    /// Show the matches of paths
    Show {
        /// Machine or human ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// List matched paths per language
    List,
}

// -- Calc --

#[derive(Debug, Subcommand)]
pub enum CalcAction {
    /// Add a calculation
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        equation: String,
        #[arg(long)]
        author: String,
        /// Input path by machine or human id (repeatable)
        #[arg(long = "factor", required = true)]
        factors: Vec<String>,
        /// Output path by machine or human id (repeatable)
        #[arg(long = "result", required = true)]
        results: Vec<String>,
    },
    /// Show the calculations paths take part in
    Show {
        /// Machine or human ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print a setting
    Get { key: String },
    /// Store a setting
    Set { key: String, value: String },
    /// Remove a setting
    Unset { key: String },
    /// Print every setting
    List,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "tdm",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_search_defaults() {
        let cli = Cli::parse_from(["tdm", "search", "in octets"]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.query, "in octets");
                assert!(args.os_releases.is_empty());
                assert!(!args.include_config);
                assert!(!args.containers);
                assert_eq!(args.count, None);
                assert!(!args.json);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_repeated_filters() {
        let cli = Cli::parse_from([
            "tdm",
            "search",
            "mtu",
            "--os",
            "IOS XE - 16.9.1",
            "--os",
            "IOS XR - 6.5.1",
            "--lang",
            "YANG",
            "-n",
            "5",
        ]);
        let Command::Search(args) = cli.command else {
            panic!("expected search command");
        };
        assert_eq!(args.os_releases, ["IOS XE - 16.9.1", "IOS XR - 6.5.1"]);
        assert_eq!(args.languages, ["YANG"]);
        assert_eq!(args.count, Some(5));
    }

    #[test]
    fn browse_requires_releases() {
        assert!(Cli::try_parse_from(["tdm", "browse", "mtu"]).is_err());
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
