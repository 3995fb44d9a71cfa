//! weft - ingest source trees into a queryable code graph.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use weft_core::graph::{Connector, MemoryStore, Neo4jConnector};
use weft_core::{CancelToken, Config, Extractor, ExtractorRegistry, Language, RunCoordinator, RunObserver, RunPhase, RunReport};

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Ingest source trees into a queryable code graph", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a source tree and write its graph
    Ingest(IngestArgs),
    /// List supported languages
    Languages,
    /// Print the effective configuration (password omitted)
    Config {
        /// Config file to read instead of the default locations
        #[arg(long, env = "WEFT_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct IngestArgs {
    /// Directory to scan (overrides SOURCE_ROOT)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Project tag (overrides PROJECT_NAME)
    #[arg(long)]
    project: Option<String>,

    /// Source language; detected from the tree when omitted
    #[arg(long)]
    language: Option<Language>,

    /// Config file to read instead of the default locations
    #[arg(long, env = "WEFT_CONFIG")]
    config: Option<PathBuf>,

    /// Extract into an in-memory graph instead of the configured store
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "weft=debug" } else { "weft=info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Ingest(args) => ingest(args).await,
        Commands::Languages => {
            list_languages();
            Ok(())
        }
        Commands::Config { config } => {
            let config = Config::resolve(config.as_deref()).wrap_err("Failed to load configuration")?;
            print!("{}", config.to_toml_string());
            Ok(())
        }
    }
}

async fn ingest(args: IngestArgs) -> Result<()> {
    let mut config = Config::resolve(args.config.as_deref()).wrap_err("Failed to load configuration")?;
    if let Some(root) = args.root {
        config.project.source_root = root;
    }
    if let Some(project) = args.project {
        config.project.name = project;
    }
    if let Some(language) = args.language {
        config.project.language = Some(language);
    }

    let memory = MemoryStore::new();
    let connector: Box<dyn Connector> = if args.dry_run {
        config.validate_settings().wrap_err("Invalid configuration")?;
        Box::new(memory.clone())
    } else {
        config.validate().wrap_err("Invalid configuration")?;
        Box::new(Neo4jConnector::new(config.graph_connection()?))
    };

    let (handle, token) = CancelToken::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after in-flight work");
            handle.cancel();
        }
    });

    let progress = Arc::new(Progress::new(args.json));
    let report = RunCoordinator::new(config)
        .with_observer(progress.clone())
        .run(connector.as_ref(), &token)
        .await;
    progress.bar.finish_and_clear();
    let report = report.wrap_err("Ingestion run failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
        if args.dry_run {
            let snapshot = memory.snapshot();
            println!("Dry run graph: {} node(s), {} edge(s)", snapshot.nodes.len(), snapshot.edges.len());
        }
    }
    Ok(())
}

fn list_languages() {
    let registry = ExtractorRegistry::new();
    for language in registry.languages() {
        let Some(extractor) = registry.get(language) else {
            continue;
        };
        let labels = extractor.labels();
        let extensions: Vec<String> = language.extensions().iter().map(|e| format!(".{}", e)).collect();
        println!(
            "{:<8} {:<8} namespace={} types={}/{}/{} callables={}/{}",
            language.name(),
            extensions.join(","),
            labels.namespace.as_str(),
            labels.class.as_str(),
            labels.interface.as_str(),
            labels.structure.as_str(),
            labels.method.as_str(),
            labels.function.as_str(),
        );
    }
}

fn print_summary(report: &RunReport) {
    let language = report.language.map(|l| l.name()).unwrap_or("-");
    println!("Run {} ({}, {})", report.run_id, report.project, language);
    println!(
        "  Files:      {} discovered, {} extracted, {} unparsable, {} rejected",
        report.files_discovered,
        report.files_extracted,
        report.parse_failures.len(),
        report.write_failures.len()
    );
    println!(
        "  Wiped:      {} node(s), {} orphaned shared node(s)",
        report.nodes_wiped, report.orphans_removed
    );
    println!("  Written:    {} node(s), {} edge(s)", report.nodes_written, report.edges_written);
    println!(
        "  Deferred:   {} written, {} pending after {} round(s)",
        report.deferred.written, report.deferred.pending, report.deferred.rounds
    );
    println!("  Unresolved: {} call(s)", report.unresolved_calls);
    for failure in &report.parse_failures {
        println!("  ! {}: {}", failure.path, failure.message);
    }
    if report.cancelled {
        println!("  Cancelled before completion");
    }
}

/// Progress bar over the files of a run.
struct Progress {
    bar: ProgressBar,
}

impl Progress {
    fn new(hidden: bool) -> Self {
        let bar = if hidden { ProgressBar::hidden() } else { ProgressBar::new(0) };
        let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        Self { bar }
    }
}

impl RunObserver for Progress {
    fn phase_entered(&self, phase: RunPhase) {
        self.bar.set_message(phase.display_name());
    }

    fn files_discovered(&self, count: usize) {
        self.bar.set_length(count as u64);
    }

    fn file_finished(&self, path: &str) {
        self.bar.inc(1);
        self.bar.set_message(short_path(path));
    }
}

fn short_path(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}
