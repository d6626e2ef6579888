//! CLI command implementations.
//!
//! Each `run_*` function opens what it needs from the [`Config`], does one
//! thing, and prints a human-readable report to stdout (or JSON with
//! `--json`). Warnings go to stderr so stdout stays parseable.

use anyhow::{bail, Result};
use serde::Serialize;
use std::path::Path;

use bilingual_search_core::models::{EntityType, Language, SearchResult};
use bilingual_search_core::query::{parse_search_query, validate_query_syntax_with_limit};

use crate::config::Config;
use crate::import::read_records;
use crate::service::SearchServices;
use crate::suggest::{NoResultsOptions, NoResultsSuggestions};
use crate::{db, migrate};

/// Filters shared by `search`, `semantic`, and `suggest`.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub entity_types: Vec<EntityType>,
    pub language: Option<Language>,
    pub limit: Option<usize>,
}

impl Filters {
    fn types(&self) -> Option<Vec<EntityType>> {
        (!self.entity_types.is_empty()).then(|| self.entity_types.clone())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_warnings(warnings: &[String]) {
    for w in warnings {
        eprintln!("warning: {}", w);
    }
}

fn print_results(results: &[SearchResult], start: usize) {
    for (i, r) in results.iter().enumerate() {
        let title = match (r.title_en.is_empty(), r.title_ar.is_empty()) {
            (false, false) => format!("{} / {}", r.title_en, r.title_ar),
            (true, false) => r.title_ar.clone(),
            _ => r.title_en.clone(),
        };
        println!(
            "{}. [{:.2}] {} / {}",
            start + i + 1,
            r.rank_score,
            r.entity_type,
            title
        );
        println!("    updated: {}", r.updated_at.format("%Y-%m-%d"));
        if let Some(snippet) = r.snippet_en.as_deref().or(r.snippet_ar.as_deref()) {
            println!("    excerpt: \"{}\"", snippet.replace('\n', " ").trim());
        }
        if r.is_archived {
            println!("    archived");
        }
        println!("    id: {}", r.id);
        println!();
    }
}

pub async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;
    println!("Database initialized successfully.");
    Ok(())
}

pub async fn run_import(config: &Config, path: &Path, no_embed: bool, json: bool) -> Result<()> {
    let records = read_records(path)?;
    let services = SearchServices::open(config).await?;
    let report = services.import(&records, !no_embed).await?;

    if json {
        return print_json(&report);
    }
    println!(
        "Imported {} records ({} queued for embedding).",
        report.imported, report.queued
    );
    Ok(())
}

pub async fn run_search(
    config: &Config,
    query: &str,
    filters: &Filters,
    offset: usize,
    include_archived: bool,
    json: bool,
) -> Result<()> {
    let services = SearchServices::open(config).await?;
    let mut opts = services.search_options(query)?;
    opts.entity_types = filters.types();
    opts.language = filters.language;
    opts.offset = offset;
    opts.include_archived = include_archived;
    if let Some(limit) = filters.limit {
        opts.limit = limit;
    }

    let response = services.search(&opts).await?;
    services.close().await;
    if json {
        return print_json(&response);
    }

    print_warnings(&response.warnings);
    if response.results.is_empty() {
        println!("No results.");
        if offset == 0 {
            let hints = services.no_results(&hint_options(query, filters)).await;
            print_hints(&hints, false);
        }
        return Ok(());
    }
    print_results(&response.results, offset);
    println!(
        "{} of {} results in {} ms{}",
        response.results.len(),
        response.total,
        response.took_ms,
        if response.has_more { " (more available)" } else { "" }
    );
    Ok(())
}

pub async fn run_semantic(
    config: &Config,
    query: &str,
    filters: &Filters,
    threshold: Option<f64>,
    hybrid: bool,
    json: bool,
) -> Result<()> {
    let services = SearchServices::open(config).await?;
    let mut opts = services.semantic_options(query);
    opts.entity_types = filters.types();
    opts.threshold = threshold;
    opts.include_keyword_results = hybrid;
    if let Some(limit) = filters.limit {
        opts.limit = limit;
    }

    let response = services.semantic_search(&opts).await?;
    services.close().await;
    if json {
        return print_json(&response);
    }

    print_warnings(&response.warnings);
    if response.exact_matches.is_empty() && response.semantic_matches.is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !response.exact_matches.is_empty() {
        println!("Exact matches:");
        print_results(&response.exact_matches, 0);
    }
    if !response.semantic_matches.is_empty() {
        println!("Semantic matches (threshold {:.2}):", response.threshold);
        print_results(&response.semantic_matches, 0);
    }
    println!(
        "model: {} ({} dims), total {} ms",
        response.embedding_info.model, response.embedding_info.dimensions, response.timings.total_ms
    );
    Ok(())
}

pub async fn run_suggest(config: &Config, prefix: &str, filters: &Filters, json: bool) -> Result<()> {
    let services = SearchServices::open(config).await?;
    let mut opts = services.suggest_options(prefix);
    opts.entity_types = filters.types();
    opts.language = filters.language;
    if let Some(limit) = filters.limit {
        opts.limit = limit;
    }

    let response = services.suggest(&opts).await;
    services.close().await;
    if json {
        return print_json(&response);
    }

    if response.suggestions.is_empty() {
        println!("No suggestions.");
        return Ok(());
    }
    for s in &response.suggestions {
        let title = match opts.language {
            Some(Language::Ar) => &s.title_ar,
            _ => &s.title_en,
        };
        println!("[{:.2}] {} / {}  ({})", s.score, s.entity_type, title, s.id);
    }
    if response.cache_hit {
        println!("(cached)");
    }
    Ok(())
}

fn hint_options(query: &str, filters: &Filters) -> NoResultsOptions {
    NoResultsOptions {
        entity_types: filters.types(),
        language: filters.language,
        ..NoResultsOptions::new(query)
    }
}

fn print_hints(hints: &NoResultsSuggestions, with_tips: bool) {
    if !hints.typo_corrections.is_empty() {
        let corrected: Vec<&str> = hints
            .typo_corrections
            .iter()
            .map(|c| c.corrected.as_str())
            .collect();
        println!("Did you mean: {}?", corrected.join(", "));
    }
    if !hints.popular_searches.is_empty() {
        let popular: Vec<&str> = hints.popular_searches.iter().map(|p| p.query.as_str()).collect();
        println!("Popular searches: {}", popular.join(", "));
    }
    if with_tips {
        for tip in &hints.search_tips {
            println!("  - {}", tip);
        }
    }
}

/// Recovery hints for a query that found nothing.
pub async fn run_hints(config: &Config, query: &str, filters: &Filters, json: bool) -> Result<()> {
    let services = SearchServices::open(config).await?;
    let hints = services.no_results(&hint_options(query, filters)).await;
    if json {
        return print_json(&hints);
    }
    print_hints(&hints, true);
    Ok(())
}

/// Parse a query without touching the database.
pub fn run_validate(config: &Config, query: &str, language: Option<Language>, json: bool) -> Result<()> {
    validate_query_syntax_with_limit(query, config.search.max_query_length)?;
    let parsed = parse_search_query(query, language);
    if json {
        return print_json(&parsed);
    }
    println!("normalized: {}", parsed.normalized_query);
    println!("language: {}", parsed.language);
    println!("boolean: {}", parsed.has_boolean_operators);
    println!("tokens: {}", parsed.tokens.join(", "));
    Ok(())
}

pub async fn run_embed_pending(config: &Config, dry_run: bool, json: bool) -> Result<()> {
    if !config.embedding.is_enabled() && !dry_run {
        bail!("Embedding provider is disabled. Set [embedding] provider in the config.");
    }
    let services = SearchServices::open(config).await?;
    let pending = services.pending_embeddings().await?;

    if dry_run {
        println!("{} records pending embedding.", pending);
        return Ok(());
    }

    let report = services.process_embeddings_once().await;
    if json {
        return print_json(&report);
    }
    print_warnings(&report.errors);
    println!(
        "Embedded {} records ({} failed, {} dropped, {} were pending).",
        report.processed, report.failed, report.dropped, pending
    );
    Ok(())
}

pub async fn run_embed_health(config: &Config, json: bool) -> Result<()> {
    let services = SearchServices::open(config).await?;
    let health = services.provider_health().await;
    if json {
        return print_json(&health);
    }

    let provider = services.provider();
    println!("provider: {}", config.embedding.provider);
    println!("model: {} ({} dims)", provider.model_name(), provider.dims());
    println!(
        "available: {}",
        if health.available { "yes" } else { "no" }
    );
    println!("latency: {} ms", health.latency_ms);
    if let Some(error) = &health.error {
        println!("error: {}", error);
    }
    Ok(())
}

pub async fn run_warm(config: &Config, json: bool) -> Result<()> {
    let services = SearchServices::open(config).await?;
    let report = services.warm_cache_once().await;
    if json {
        return print_json(&report);
    }
    print_warnings(&report.errors);
    println!(
        "Warmed {} prefixes from {} popular queries.",
        report.prefixes_warmed, report.queries_processed
    );
    Ok(())
}

/// Run the embedding worker and cache warmer until Ctrl-C.
pub async fn run_worker(config: &Config) -> Result<()> {
    let services = SearchServices::open(config).await?;
    services.start_background();
    println!("Worker running. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    services.stop_background().await;
    Ok(())
}
