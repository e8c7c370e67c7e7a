use std::path::{Path, PathBuf};

use cadence_core::{CadenceConfig, CommitRecord, OrderingRule, OutputFormat, RepoScope};
use cadence_lake::CommitLake;
use cadence_metrics::engine::{InMemoryEngine, MetricSettings, MetricsEngine};
use cadence_metrics::report::CycleTimeView;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "cadence",
    version,
    about = "Engineering-velocity metrics from git history",
    long_about = "Cadence measures how fast and how safely a team ships, straight from git history.\n\n\
                   Commit cycle time is the gap between consecutive commits of one author;\n\
                   change-failure rate is the share of commits whose message marks a fix or revert.\n\
                   Every metric can be computed in memory or in SQLite, and the two must agree.\n\n\
                   Examples:\n  \
                     cadence cycle-time --path .             Cycle time by magnitude bucket\n  \
                     cadence cycle-time --view all           Every cycle-time view\n  \
                     cadence change-failure --monthly        Failure rate per calendar month\n  \
                     cadence ingest --db cadence.db          Store the history in SQLite\n  \
                     cadence compare --input commits.json    Check both engines agree"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .cadence.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable tables and summaries (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Repository scope as source:name (default: derived from the input)
    #[arg(long, global = true)]
    scope: Option<RepoScope>,

    /// Metrics engine
    #[arg(long, global = true, default_value = "memory")]
    engine: EngineChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Report commit cycle time
    #[command(long_about = "Report commit cycle time.\n\n\
        Orders each author's commits, takes the gap between consecutive commits, and\n\
        aggregates the gaps overall, per magnitude bucket, per fixed window, per month,\n\
        or per author. Reads a git repository, a JSON export, or a SQLite store.\n\n\
        Examples:\n  cadence cycle-time --path .\n  cadence cycle-time --input commits.json --view months\n  cadence cycle-time --db cadence.db --engine sqlite --format json")]
    CycleTime {
        #[command(flatten)]
        source: SourceArgs,

        /// Which breakdown to show
        #[arg(
            long,
            default_value = "buckets",
            long_help = "Which breakdown to show.\n\n\
                Views:\n  \
                  deltas   Every individual gap\n  \
                  buckets  Aggregates per magnitude bucket (default)\n  \
                  windows  Aggregates per fixed-size window of consecutive gaps\n  \
                  months   Aggregates per calendar month\n  \
                  authors  Aggregates per author\n  \
                  chart    Monthly p75 and stdev in days\n  \
                  all      Every view above"
        )]
        view: CycleTimeView,
    },
    /// Report change-failure rate
    #[command(long_about = "Report change-failure rate.\n\n\
        A commit counts as a failure when its message contains one of the configured\n\
        keywords (case-insensitive). Commits without a message are never failures.\n\n\
        Examples:\n  cadence change-failure --path .\n  cadence change-failure --input commits.json --monthly")]
    ChangeFailure {
        #[command(flatten)]
        source: SourceArgs,

        /// Break the rate down by calendar month
        #[arg(long)]
        monthly: bool,
    },
    /// Count distinct active authors per month
    #[command(long_about = "Count distinct active authors per month.\n\n\
        Examples:\n  cadence authors --path .\n  cadence authors --db cadence.db --scope github:acme/widgets")]
    Authors {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Load commit records into a SQLite store
    #[command(long_about = "Load commit records into a SQLite store.\n\n\
        Replaces every stored record of the scope, so running it twice leaves one\n\
        copy of each commit. Later commands read the store with --db.\n\n\
        Examples:\n  cadence ingest --db cadence.db --path .\n  cadence ingest --db cadence.db --input commits.json --scope github:acme/widgets")]
    Ingest {
        /// SQLite database file to populate
        #[arg(long)]
        db: PathBuf,

        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Read commit records from a JSON export instead of git
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Check that both engines report the same values
    #[command(long_about = "Check that both engines report the same values.\n\n\
        Runs every operation on the in-memory and SQLite engines over the same records\n\
        and compares the reported values. Exits non-zero on any mismatch.\n\n\
        Examples:\n  cadence compare --path .\n  cadence compare --input commits.json --format json")]
    Compare {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Read commit records from a JSON export instead of git
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Create a default .cadence.toml configuration file
    #[command(long_about = "Create a default .cadence.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .cadence.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Where commit records come from.
#[derive(clap::Args)]
struct SourceArgs {
    /// Repository path (default: current directory)
    #[arg(long, default_value = ".")]
    path: PathBuf,

    /// Read commit records from a JSON export instead of git
    #[arg(long, conflicts_with = "db")]
    input: Option<PathBuf>,

    /// Read commit records from a SQLite store populated by `cadence ingest`
    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EngineChoice {
    /// Compute in process memory
    Memory,
    /// Compute with SQL queries over a SQLite store
    Sqlite,
}

const DEFAULT_CONFIG: &str = r#"# Cadence Configuration

# Repository scope (default: local:<repository name>)
# scope = "github:acme/widgets"

[cycle_time]
# ordering = "commit-date-sha"   # or "traversal" (memory engine only)
# bucket_boundaries = [0, 60, 1440, 10080]
# window_size = 1000

[change_failure]
# keywords = ["revert", "hotfix", "bugfix", "bug", "fix", "problem", "issue"]

[history]
# since_days = 0
# branch = "main"

[report]
# minute_decimals = 2
# spread_decimals = 0
"#;

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "cadence=debug,cadence_history=debug,cadence_metrics=debug,cadence_lake=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<CadenceConfig> {
    match path {
        Some(path) => Ok(CadenceConfig::from_file(path)?),
        None => {
            let default_path = Path::new(".cadence.toml");
            if default_path.exists() {
                Ok(CadenceConfig::from_file(default_path)?)
            } else {
                Ok(CadenceConfig::default())
            }
        }
    }
}

/// Pick the scope: flag, then config, then something derived from the source.
fn resolve_scope(
    cli_scope: Option<&RepoScope>,
    config: &CadenceConfig,
    path: &Path,
    input: Option<&Path>,
    db: Option<&CommitLake>,
) -> Result<RepoScope> {
    if let Some(scope) = cli_scope.or(config.scope.as_ref()) {
        return Ok(scope.clone());
    }

    if let Some(input) = input {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "records".to_string());
        return Ok(RepoScope::new("local", &stem)?);
    }

    if let Some(lake) = db {
        let mut scopes = lake.scopes()?;
        return match scopes.len() {
            1 => Ok(scopes.remove(0)),
            0 => miette::bail!(miette::miette!(
                help = "Populate the store first with `cadence ingest --db <file>`",
                "The database holds no commit records"
            )),
            _ => miette::bail!(miette::miette!(
                help = format!(
                    "Pick one with --scope: {}",
                    scopes.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                ),
                "The database holds {} scopes",
                scopes.len()
            )),
        };
    }

    ensure_repository(path)?;
    Ok(cadence_history::scope::local_scope(path)?)
}

fn ensure_repository(path: &Path) -> Result<()> {
    if !path.join(".git").exists() && git2::Repository::discover(path).is_err() {
        miette::bail!(miette::miette!(
            help = "Run cadence from inside a git repository, specify --path to one, or pass --input",
            "Not a git repository: {}",
            path.display()
        ));
    }
    Ok(())
}

/// Read records from a JSON export or by mining git.
fn read_records(path: &Path, input: Option<&Path>, config: &CadenceConfig) -> Result<Vec<CommitRecord>> {
    if let Some(input) = input {
        let records = cadence_history::json::load_records_json(input)?;
        eprintln!("Loaded {} commit records from {}.", records.len(), input.display());
        return Ok(records);
    }

    ensure_repository(path)?;
    let options = cadence_history::mining::MiningOptions::from(&config.history);
    if options.since_days > 0 {
        eprintln!(
            "Mining git history at {} (last {} days)...",
            path.display(),
            options.since_days
        );
    } else {
        eprintln!("Mining git history at {}...", path.display());
    }
    let records = cadence_history::mining::mine_commits(path, &options)?;
    eprintln!("Read {} commits.", records.len());
    Ok(records)
}

fn engine_from_records(
    choice: EngineChoice,
    scope: &RepoScope,
    records: Vec<CommitRecord>,
) -> Result<Box<dyn MetricsEngine>> {
    match choice {
        EngineChoice::Memory => Ok(Box::new(InMemoryEngine::with_records(scope.clone(), records)?)),
        EngineChoice::Sqlite => {
            let mut lake = CommitLake::in_memory()?;
            lake.replace_scope(scope, &records)?;
            Ok(Box::new(lake))
        }
    }
}

/// Resolve the scope and build the selected engine over the command's source.
fn open_engine(
    cli: &Cli,
    config: &CadenceConfig,
    source: &SourceArgs,
) -> Result<(RepoScope, Box<dyn MetricsEngine>)> {
    if let Some(ref db) = source.db {
        if !db.exists() {
            miette::bail!(miette::miette!(
                help = "Create it with `cadence ingest --db <file>`",
                "Database not found: {}",
                db.display()
            ));
        }
        let lake = CommitLake::open(db)?;
        let scope = resolve_scope(cli.scope.as_ref(), config, &source.path, None, Some(&lake))?;
        let stored = lake.count(&scope)?;
        eprintln!("Reading {stored} stored commit records for {scope}.");
        let engine: Box<dyn MetricsEngine> = match cli.engine {
            EngineChoice::Sqlite => Box::new(lake),
            EngineChoice::Memory => {
                Box::new(InMemoryEngine::with_records(scope.clone(), lake.load_scope(&scope)?)?)
            }
        };
        return Ok((scope, engine));
    }

    let input = source.input.as_deref();
    let scope = resolve_scope(cli.scope.as_ref(), config, &source.path, input, None)?;
    let records = read_records(&source.path, input, config)?;
    let engine = engine_from_records(cli.engine, &scope, records)?;
    Ok((scope, engine))
}

fn settings_for(config: &CadenceConfig, engine: EngineChoice) -> Result<MetricSettings> {
    let settings = MetricSettings::from_config(config)?;
    if engine == EngineChoice::Sqlite && settings.ordering == OrderingRule::Traversal {
        miette::bail!(miette::miette!(
            help = "Use --engine memory, or set cycle_time.ordering = \"commit-date-sha\"",
            "The traversal ordering depends on supplier order, which SQLite does not keep"
        ));
    }
    Ok(settings)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    tracing::debug!(format = %cli.format, "configuration loaded");

    match cli.command {
        Command::CycleTime { ref source, view } => {
            let settings = settings_for(&config, cli.engine)?;
            let (scope, engine) = open_engine(&cli, &config, source)?;
            let report = cadence_metrics::report::cycle_time_report(
                engine.as_ref(),
                &scope,
                &settings,
                view,
            )?;

            if report.negative_deltas > 0 {
                eprintln!(
                    "Warning: {} negative cycle times (commit dates out of order).",
                    report.negative_deltas
                );
            }

            match cli.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Markdown => print!("{}", report.to_markdown(&settings.report)),
                OutputFormat::Text => print!("{}", report.to_text(&settings.report)),
            }
        }
        Command::ChangeFailure {
            ref source,
            monthly,
        } => {
            let settings = settings_for(&config, cli.engine)?;
            let (scope, engine) = open_engine(&cli, &config, source)?;
            let report =
                cadence_metrics::report::failure_report(engine.as_ref(), &scope, &settings, monthly)?;

            match cli.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Markdown => print!("{}", report.to_markdown()),
                OutputFormat::Text => print!("{report}"),
            }
        }
        Command::Authors { ref source } => {
            let (scope, engine) = open_engine(&cli, &config, source)?;
            let report = cadence_metrics::report::active_authors_report(engine.as_ref(), &scope)?;

            match cli.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Markdown => print!("{}", report.to_markdown()),
                OutputFormat::Text => print!("{report}"),
            }
        }
        Command::Ingest {
            ref db,
            ref path,
            ref input,
        } => {
            let scope = resolve_scope(cli.scope.as_ref(), &config, path, input.as_deref(), None)?;
            let records = read_records(path, input.as_deref(), &config)?;
            let mut lake = CommitLake::open(db)?;
            let stored = lake.replace_scope(&scope, &records)?;

            match cli.format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "scope": scope,
                    "database": db,
                    "stored": stored,
                }))?,
                _ => println!("Stored {stored} commit records for {scope} in {}", db.display()),
            }
        }
        Command::Compare {
            ref path,
            ref input,
        } => {
            let settings = MetricSettings::from_config(&config)?;
            let scope = resolve_scope(cli.scope.as_ref(), &config, path, input.as_deref(), None)?;
            let records = read_records(path, input.as_deref(), &config)?;

            let memory = engine_from_records(EngineChoice::Memory, &scope, records.clone())?;
            let sqlite = engine_from_records(EngineChoice::Sqlite, &scope, records)?;
            let report =
                cadence_metrics::parity::compare(memory.as_ref(), sqlite.as_ref(), &scope, &settings)?;

            match cli.format {
                OutputFormat::Json => print_json(&report)?,
                _ => print!("{report}"),
            }

            if !report.is_match() {
                miette::bail!(
                    "{} of {} values differ between the {} and {} engines",
                    report.mismatches.len(),
                    report.checked,
                    report.left,
                    report.right
                );
            }
        }
        Command::Init => {
            let path = Path::new(".cadence.toml");
            if path.exists() {
                miette::bail!(".cadence.toml already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created .cadence.toml with default configuration");
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "cadence", &mut std::io::stdout());
        }
    }

    Ok(())
}
