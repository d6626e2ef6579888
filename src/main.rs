//! # Bilingual Search CLI (`bsearch`)
//!
//! ## Usage
//!
//! ```bash
//! bsearch --config ./config/bsearch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bsearch init` | Create the SQLite database and run schema migrations |
//! | `bsearch import <file>` | Upsert records from a JSON array and queue embeddings |
//! | `bsearch search "<query>"` | Boolean full-text search |
//! | `bsearch semantic "<query>"` | Semantic search, optionally blended with keyword results |
//! | `bsearch suggest <prefix>` | Typeahead suggestions |
//! | `bsearch hints "<query>"` | Spelling corrections and popular searches for a query with no results |
//! | `bsearch validate "<query>"` | Show how a query is parsed |
//! | `bsearch embed pending` | Process one batch of the embedding queue |
//! | `bsearch embed health` | Check the embedding provider |
//! | `bsearch warm` | Warm the suggestion cache from search history |
//! | `bsearch worker` | Run the embedding worker and cache warmer until Ctrl-C |
//!
//! Set `RUST_LOG` to change log verbosity (default `bilingual_search=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use bilingual_search::commands::{self, Filters};
use bilingual_search::config;
use bilingual_search_core::models::{EntityType, Language};

/// Bilingual (Arabic/English) search over policy records.
#[derive(Parser)]
#[command(name = "bsearch", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/bsearch.toml")]
    config: PathBuf,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Clone)]
struct FilterArgs {
    /// Restrict to an entity type. Repeatable (`--type dossier --type position`).
    #[arg(long = "type", value_name = "TYPE")]
    types: Vec<EntityType>,

    /// Query language (`en` or `ar`). Detected from the text when omitted.
    #[arg(long)]
    lang: Option<Language>,

    /// Maximum number of results.
    #[arg(long)]
    limit: Option<usize>,
}

impl From<FilterArgs> for Filters {
    fn from(args: FilterArgs) -> Self {
        Filters {
            entity_types: args.types,
            language: args.lang,
            limit: args.limit,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Import records from a JSON array file.
    ///
    /// Each record is inserted or replaced; semantic-capable records are
    /// queued for embedding unless `--no-embed` is given.
    Import {
        file: PathBuf,

        /// Do not queue imported records for embedding.
        #[arg(long)]
        no_embed: bool,
    },

    /// Full-text search with AND / OR / NOT and quoted phrases.
    Search {
        query: String,

        #[command(flatten)]
        filters: FilterArgs,

        /// Number of merged results to skip.
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Include archived records.
        #[arg(long)]
        archived: bool,
    },

    /// Semantic search over dossiers, positions, engagements, and documents.
    Semantic {
        query: String,

        #[command(flatten)]
        filters: FilterArgs,

        /// Minimum cosine similarity (defaults to `semantic.similarity_threshold`).
        #[arg(long)]
        threshold: Option<f64>,

        /// Also run a keyword search and return its results separately.
        #[arg(long)]
        hybrid: bool,
    },

    /// Typeahead suggestions for a prefix.
    Suggest {
        prefix: String,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Suggest corrections and popular searches for a query that found nothing.
    Hints {
        query: String,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Parse a query and print its normalized form without searching.
    Validate {
        query: String,

        #[arg(long)]
        lang: Option<Language>,
    },

    /// Manage embeddings.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Warm the suggestion cache once from recent search history.
    Warm,

    /// Run the embedding worker and cache warmer until interrupted.
    Worker,
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Process one batch of the embedding queue.
    Pending {
        /// Only report how many records are queued.
        #[arg(long)]
        dry_run: bool,
    },

    /// Check that the embedding provider is reachable.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bilingual_search=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_config(&cli.config)?;
    let json = cli.json;

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Import { file, no_embed } => {
            commands::run_import(&cfg, &file, no_embed, json).await?;
        }
        Commands::Search {
            query,
            filters,
            offset,
            archived,
        } => {
            commands::run_search(&cfg, &query, &filters.into(), offset, archived, json).await?;
        }
        Commands::Semantic {
            query,
            filters,
            threshold,
            hybrid,
        } => {
            commands::run_semantic(&cfg, &query, &filters.into(), threshold, hybrid, json).await?;
        }
        Commands::Suggest { prefix, filters } => {
            commands::run_suggest(&cfg, &prefix, &filters.into(), json).await?;
        }
        Commands::Hints { query, filters } => {
            commands::run_hints(&cfg, &query, &filters.into(), json).await?;
        }
        Commands::Validate { query, lang } => commands::run_validate(&cfg, &query, lang, json)?,
        Commands::Embed { action } => match action {
            EmbedAction::Pending { dry_run } => {
                commands::run_embed_pending(&cfg, dry_run, json).await?;
            }
            EmbedAction::Health => commands::run_embed_health(&cfg, json).await?,
        },
        Commands::Warm => commands::run_warm(&cfg, json).await?,
        Commands::Worker => commands::run_worker(&cfg).await?,
    }

    Ok(())
}
