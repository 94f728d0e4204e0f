//! # Product RAG CLI (`rag`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the vector index collection |
//! | `rag ingest` | Chunk, embed and index the docs directory |
//! | `rag sources` | List indexed sources with chunk counts |
//! | `rag search "<query>"` | Print the top snippets for a query |
//! | `rag ask "<question>"` | Run the full product workflow |
//! | `rag serve` | Start the HTTP server |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use product_rag::config::{self, Config};
use product_rag::delivery::DeliveryEvent;
use product_rag::index;
use product_rag::ingest::{ingest_dir, DirOptions};
use product_rag::models::{Language, RetrievalRequest, Tone, WorkflowInput};
use product_rag::server;
use product_rag::services::Services;

/// Product RAG: ingest product docs and answer questions about them.
#[derive(Parser)]
#[command(name = "rag", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Optional; environment variables
    /// override its values.
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index collection. Safe to run repeatedly.
    Init,

    /// Ingest every matching file in the docs directory.
    Ingest {
        /// Docs directory (defaults to `ingest.docs_dir` / `RAG_DOCS_DIR`).
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Count files and chunks without embedding or writing.
        #[arg(long)]
        dry_run: bool,

        /// Remove indexed sources whose file no longer exists.
        #[arg(long)]
        prune: bool,
    },

    /// List indexed sources.
    Sources,

    /// Print the top snippets for a query.
    Search {
        query: String,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a product question.
    Ask {
        question: String,

        /// neutral, helpful, or executive.
        #[arg(long, default_value = "helpful")]
        tone: Tone,

        /// id or en.
        #[arg(long, default_value = "id")]
        language: Language,

        #[arg(long)]
        limit: Option<usize>,

        /// Print the answer as it is generated.
        #[arg(long)]
        stream: bool,
    },

    /// Start the HTTP server.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Sources => list_sources(&cfg).await?,
        command => {
            let services = Services::connect(&cfg).await?;
            let outcome = run(&cfg, &services, command).await;
            services.close().await;
            outcome?;
        }
    }

    Ok(())
}

async fn run(cfg: &Config, services: &Services, command: Commands) -> Result<()> {
    match command {
        Commands::Init => {
            services.ingestor().ensure_index().await?;
            println!(
                "Index '{}' ready ({} dims, {}).",
                cfg.index.name,
                services.embedder.dims(),
                services.embedder.model_name()
            );
        }
        Commands::Ingest {
            dir,
            dry_run,
            prune,
        } => {
            let dir = dir.unwrap_or_else(|| cfg.ingest.docs_dir.clone());
            let ingestor = services.ingestor();
            ingest_dir(cfg, &ingestor, &dir, DirOptions { dry_run, prune }).await?;
        }
        Commands::Search { query, limit } => {
            let limit = limit.unwrap_or(cfg.retrieval.default_limit);
            let request = RetrievalRequest::new(query, limit)?;
            let result = services.retriever().search(&request).await?;
            if result.is_empty() {
                println!("No results.");
            }
            for (i, snippet) in result.snippets.iter().enumerate() {
                println!("{}. {}", i + 1, snippet);
                println!();
            }
        }
        Commands::Ask {
            question,
            tone,
            language,
            limit,
            stream,
        } => {
            let input = WorkflowInput::new(question)
                .with_tone(tone)
                .with_language(language)
                .with_limit(limit.unwrap_or(cfg.retrieval.default_limit));
            let workflow = services.workflow();

            if stream {
                let mut run = workflow.run_streaming(input).await?;
                let mut stdout = std::io::stdout();
                while let Some(event) = run.events.recv().await {
                    match event {
                        DeliveryEvent::Delta(text) => {
                            write!(stdout, "{}", text)?;
                            stdout.flush()?;
                        }
                        DeliveryEvent::Done => {
                            println!();
                            break;
                        }
                        DeliveryEvent::Error(message) => {
                            println!();
                            anyhow::bail!("generation failed: {}", message);
                        }
                    }
                }
                println!("({} snippets)", run.snippets.len());
            } else {
                let result = workflow.run(input).await?;
                println!("{}", result.answer);
                println!();
                println!("({} snippets)", result.snippets.len());
            }
        }
        Commands::Serve => server::run_server(cfg, services).await?,
        Commands::Sources => list_sources(cfg).await?,
    }
    Ok(())
}

async fn list_sources(cfg: &Config) -> Result<()> {
    let index = index::connect(cfg.index_url()?).await?;
    let records = index.sources(&cfg.index.name).await;
    index.close().await;
    let records = records?;

    if records.is_empty() {
        println!("No sources indexed in '{}'.", cfg.index.name);
        return Ok(());
    }

    println!("{:<48} {:>8}  {:<20}  RUN", "SOURCE", "CHUNKS", "UPDATED");
    for r in &records {
        let updated = chrono::DateTime::from_timestamp(r.updated_at, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| r.updated_at.to_string());
        println!(
            "{:<48} {:>8}  {:<20}  {}",
            r.source, r.chunk_count, updated, r.run_id
        );
    }
    Ok(())
}
