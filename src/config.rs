//! TOML configuration.
//!
//! Every section is optional and falls back to the reference values, so an
//! empty file is a valid configuration. [`load_config`] parses and then
//! validates cross-field constraints.
//!
//! ```toml
//! [db]
//! path = "./data/bsearch.sqlite"
//!
//! [embedding]
//! provider = "openai"          # disabled | openai | ollama
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [ranking.entity_boosts]
//! dossier = 1.0
//! mou = 0.5
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bilingual_search_core::models::EntityType;
use bilingual_search_core::query::MAX_QUERY_LENGTH;
use bilingual_search_core::ranking::RankingWeights;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub db: DbConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub ranking: RankingConfig,
    pub cache: CacheConfig,
    pub semantic: SemanticConfig,
    pub suggest: SuggestConfig,
    pub worker: WorkerConfig,
    pub warmer: WarmerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/bsearch.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: Option<String>,
    pub dims: Option<usize>,
    /// Base URL. OpenAI-compatible servers (AnythingLLM, vLLM...) go here too.
    pub url: Option<String>,
    /// Environment variable holding the bearer token for `openai`.
    pub api_key_env: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub max_query_length: usize,
    /// Request time budget. `None` waits for every branch.
    pub timeout_ms: Option<u64>,
    /// `partial`, `cached`, or `fail`.
    pub timeout_policy: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            max_query_length: MAX_QUERY_LENGTH,
            timeout_ms: None,
            timeout_policy: "partial".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RankingConfig {
    pub exact_base: f64,
    pub exact_quality: f64,
    pub exact_title: f64,
    pub exact_phrase: f64,
    pub exact_recency: f64,
    pub semantic_quality: f64,
    pub semantic_recency: f64,
    pub semantic_entity: f64,
    pub semantic_cap: f64,
    pub default_entity_boost: f64,
    pub entity_boosts: BTreeMap<String, f64>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        let w = RankingWeights::default();
        Self {
            exact_base: w.exact_base,
            exact_quality: w.exact_quality,
            exact_title: w.exact_title,
            exact_phrase: w.exact_phrase,
            exact_recency: w.exact_recency,
            semantic_quality: w.semantic_quality,
            semantic_recency: w.semantic_recency,
            semantic_entity: w.semantic_entity,
            semantic_cap: w.semantic_cap,
            default_entity_boost: w.default_entity_boost,
            entity_boosts: w
                .entity_boosts
                .iter()
                .map(|(t, b)| (t.as_str().to_string(), *b))
                .collect(),
        }
    }
}

impl RankingConfig {
    /// Typed weights. Unknown entity names are rejected.
    pub fn weights(&self) -> Result<RankingWeights> {
        let mut entity_boosts = BTreeMap::new();
        for (name, boost) in &self.entity_boosts {
            let entity_type: EntityType = name
                .parse()
                .with_context(|| format!("ranking.entity_boosts.{}", name))?;
            entity_boosts.insert(entity_type, *boost);
        }
        Ok(RankingWeights {
            exact_base: self.exact_base,
            exact_quality: self.exact_quality,
            exact_title: self.exact_title,
            exact_phrase: self.exact_phrase,
            exact_recency: self.exact_recency,
            semantic_quality: self.semantic_quality,
            semantic_recency: self.semantic_recency,
            semantic_entity: self.semantic_entity,
            semantic_cap: self.semantic_cap,
            default_entity_boost: self.default_entity_boost,
            entity_boosts,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// `sqlite` (shared through the database file) or `memory` (per process).
    pub backend: String,
    pub suggestion_ttl_secs: u64,
    /// `0` disables the search result cache.
    pub result_ttl_secs: u64,
    /// How long a degraded cache waits before trying to reconnect.
    pub reconnect_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            suggestion_ttl_secs: 300,
            result_ttl_secs: 300,
            reconnect_interval_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SemanticConfig {
    pub similarity_threshold: f64,
    pub default_limit: usize,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            default_limit: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SuggestConfig {
    pub min_prefix_len: usize,
    pub default_limit: usize,
    /// Candidates fetched per entity type before scoring.
    pub candidates_per_type: usize,
    /// Minimum Levenshtein similarity for a "did you mean" correction.
    pub correction_threshold: f64,
    pub max_corrections: usize,
    pub max_popular: usize,
    /// How far back popular searches are drawn from.
    pub history_window_days: i64,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            min_prefix_len: 2,
            default_limit: 10,
            candidates_per_type: 20,
            correction_threshold: 0.6,
            max_corrections: 3,
            max_popular: 5,
            history_window_days: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkerConfig {
    pub interval_secs: u64,
    pub batch_size: usize,
    pub max_retries: u32,
    pub max_text_chars: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            batch_size: 100,
            max_retries: 5,
            max_text_chars: 8000,
        }
    }
}

impl WorkerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WarmerConfig {
    pub interval_secs: u64,
    pub top_queries: usize,
    pub window_days: i64,
    pub min_prefix_len: usize,
    pub max_prefix_len: usize,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    /// `all` or an entity type name.
    pub scopes: Vec<String>,
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 180,
            top_queries: 100,
            window_days: 7,
            min_prefix_len: 2,
            max_prefix_len: 15,
            batch_size: 10,
            batch_delay_ms: 100,
            scopes: vec![
                "all".to_string(),
                "dossier".to_string(),
                "position".to_string(),
            ],
        }
    }
}

impl WarmerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.search.default_limit == 0 || config.search.max_limit == 0 {
        bail!("search.default_limit and search.max_limit must be > 0");
    }
    if config.search.max_query_length == 0 {
        bail!("search.max_query_length must be > 0");
    }
    match config.search.timeout_policy.as_str() {
        "partial" | "cached" | "fail" => {}
        other => bail!(
            "Unknown search.timeout_policy: '{}'. Must be partial, cached, or fail.",
            other
        ),
    }

    match config.cache.backend.as_str() {
        "sqlite" | "memory" => {}
        other => bail!(
            "Unknown cache.backend: '{}'. Must be sqlite or memory.",
            other
        ),
    }

    if !(0.0..=1.0).contains(&config.semantic.similarity_threshold) {
        bail!("semantic.similarity_threshold must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&config.suggest.correction_threshold) {
        bail!("suggest.correction_threshold must be in [0.0, 1.0]");
    }
    if config.suggest.history_window_days <= 0 {
        bail!("suggest.history_window_days must be > 0");
    }

    config.ranking.weights()?;

    if config.worker.batch_size == 0 || config.worker.max_text_chars == 0 {
        bail!("worker.batch_size and worker.max_text_chars must be > 0");
    }
    if config.worker.interval_secs == 0 || config.warmer.interval_secs == 0 {
        bail!("worker.interval_secs and warmer.interval_secs must be > 0");
    }

    if config.warmer.min_prefix_len == 0
        || config.warmer.min_prefix_len > config.warmer.max_prefix_len
    {
        bail!("warmer prefix bounds must satisfy 0 < min_prefix_len <= max_prefix_len");
    }
    if config.warmer.batch_size == 0 {
        bail!("warmer.batch_size must be > 0");
    }
    for scope in &config.warmer.scopes {
        if scope != "all" && scope.parse::<EntityType>().is_err() {
            bail!("Unknown warmer scope: '{}'", scope);
        }
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(())
}
