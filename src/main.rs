use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use papergraph::builder::{run_build, BuildRequest};
use papergraph::config::Config;
use papergraph::export::{run_export, ExportFormat};
use papergraph::http::cache::ResponseCache;
use papergraph::http::Transport;
use papergraph::sources::{build_adapter, SourceCredentials};
use papergraph::store::GraphStore;
use papergraph::viewer::run_view;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "papergraph")]
#[command(version)]
#[command(about = "Build citation graphs over academic papers")]
#[command(
    long_about = "PaperGraph discovers papers through bibliographic APIs (OpenAlex or \
Semantic Scholar), expands their citation neighborhood, computes text-similarity and \
citation-analytic edges, ranks and clusters the result, and stores everything in a \
single SQLite file that the export and view commands consume."
)]
#[command(after_help = "Examples:
  papergraph build --topic \"graph neural networks\" --out gnn.db
  papergraph build --paper \"Attention Is All You Need\" --spine hybrid --depth 2
  papergraph export --input gnn.db --format graphml
  papergraph inspect --input gnn.db")]
struct Cli {
    /// Log verbosity
    #[arg(long, global = true, default_value = "info",
          value_parser = ["error", "warn", "info", "debug"])]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Build a paper graph from a topic, titles, or DOIs")]
    Build {
        /// Topic query used to seed the graph
        #[arg(long)]
        topic: Option<String>,

        /// Seed paper title (repeatable); the top search hit is used
        #[arg(long = "paper", value_name = "TITLE")]
        papers: Vec<String>,

        /// Seed DOI (repeatable)
        #[arg(long = "doi", value_name = "DOI")]
        dois: Vec<String>,

        /// Bibliographic source
        #[arg(long, value_parser = ["openalex", "s2"])]
        source: Option<String>,

        /// Which edge classes to compute
        #[arg(long, value_parser = ["citation", "similarity", "co-citation", "coupling", "hybrid"])]
        spine: Option<String>,

        /// BFS expansion depth
        #[arg(long)]
        depth: Option<u32>,

        /// Hard cap on stored papers
        #[arg(long)]
        max_papers: Option<usize>,

        /// References fetched per paper
        #[arg(long = "max-refs")]
        max_refs: Option<usize>,

        /// Citations fetched per paper
        #[arg(long = "max-cites")]
        max_cites: Option<usize>,

        /// Drop papers published before this year
        #[arg(long)]
        year_from: Option<i32>,

        /// Drop papers published after this year
        #[arg(long)]
        year_to: Option<i32>,

        /// Output database path
        #[arg(long, default_value = "papergraph.db")]
        out: PathBuf,

        /// Skip the HTTP response cache for this run
        #[arg(long)]
        no_cache: bool,
    },

    #[command(about = "Export a built graph to another format")]
    Export {
        #[arg(long)]
        input: PathBuf,

        #[arg(long, value_parser = ["json", "graphml", "gexf", "csv", "mermaid"])]
        format: String,

        #[arg(long)]
        out: Option<PathBuf>,
    },

    #[command(about = "Write a standalone HTML viewer for a built graph")]
    View {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        out: Option<PathBuf>,
    },

    #[command(about = "Print row counts for a built graph")]
    Inspect {
        #[arg(long)]
        input: PathBuf,
    },

    #[command(about = "Manage the HTTP response cache")]
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    #[command(about = "Delete all cached responses")]
    Clear,
    #[command(about = "Show entry count and size")]
    Stats,
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("papergraph={}", level)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs);

    if let Err(err) = run(cli).await {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Build {
            topic,
            papers,
            dois,
            source,
            spine,
            depth,
            max_papers,
            max_refs,
            max_cites,
            year_from,
            year_to,
            out,
            no_cache,
        } => {
            if topic.as_deref().map_or(true, |t| t.trim().is_empty())
                && papers.is_empty()
                && dois.is_empty()
            {
                bail!("no seeds provided: pass --topic, --paper, or --doi");
            }

            let mut config = Config::load(&std::env::current_dir()?)?;
            if let Some(source) = source {
                config.source = source;
            }
            if let Some(spine) = spine {
                config.spine = papergraph::config::Spine::from_str(&spine)?;
            }
            if let Some(depth) = depth {
                config.depth = depth;
            }
            if let Some(max_papers) = max_papers {
                config.max_papers = max_papers;
            }
            if let Some(max_refs) = max_refs {
                config.max_refs_per_paper = max_refs;
            }
            if let Some(max_cites) = max_cites {
                config.max_cites_per_paper = max_cites;
            }
            if year_from.is_some() {
                config.year_from = year_from;
            }
            if year_to.is_some() {
                config.year_to = year_to;
            }
            if no_cache {
                config.cache.enabled = false;
            }
            config.validate()?;

            let cache = if config.cache.enabled {
                Some(
                    ResponseCache::open(&config.cache.dir, config.cache_ttl())
                        .context("failed to open response cache")?,
                )
            } else {
                None
            };
            let transport = Arc::new(
                Transport::new(Transport::user_agent_for(&config.mailto), cache)
                    .context("failed to build HTTP transport")?,
            );
            let credentials = SourceCredentials {
                api_key: match config.source.as_str() {
                    "openalex" => config.openalex_api_key.clone(),
                    "s2" => config.s2_api_key.clone(),
                    _ => None,
                },
                mailto: Some(config.mailto.clone()),
            };
            let adapter = build_adapter(&config.source, transport.clone(), credentials)?;

            let request = BuildRequest {
                topic,
                titles: papers,
                dois,
                out,
            };
            let outcome = run_build(&config, &request, adapter.as_ref()).await?;

            for (source, count) in transport.request_counts() {
                debug!("{}: {} requests", source, count);
            }
            println!("{}", outcome.out.display());
        }

        Commands::Export { input, format, out } => {
            let format = ExportFormat::from_str(&format)?;
            let path = run_export(&input, format, out.as_deref())?;
            println!("{}", path.display());
        }

        Commands::View { input, out } => {
            let path = run_view(&input, out.as_deref())?;
            println!("{}", path.display());
        }

        Commands::Inspect { input } => {
            let store = GraphStore::open(&input)?;
            let stats = store.stats()?;
            store.close()?;
            println!("Papers:   {:>8}", stats.paper_count);
            println!("Edges:    {:>8}", stats.edge_count);
            println!("Clusters: {:>8}", stats.cluster_count);
            println!("Entities: {:>8}", stats.entity_count);
            println!("Runs:     {:>8}", stats.run_count);
            for (edge_type, count) in &stats.edges_by_type {
                println!("  {:<20} {:>6}", edge_type, count);
            }
        }

        Commands::Cache { action } => {
            let config = Config::load(&std::env::current_dir()?)?;
            let cache = ResponseCache::open(&config.cache.dir, config.cache_ttl())?;
            match action {
                CacheAction::Clear => {
                    let removed = cache.clear()?;
                    println!("removed {} cached responses", removed);
                }
                CacheAction::Stats => {
                    let (count, bytes) = cache.stats()?;
                    println!("{} entries, {} bytes", count, bytes);
                }
            }
        }
    }
    Ok(())
}
