//! Wiring: builds every orchestrator and background job from a [`Config`]
//! and a set of collaborators.
//!
//! [`SearchServices::open`] is the production path (SQLite store, configured
//! embedding provider, configured cache backend). Tests build the same
//! graph with [`SearchServices::new`] and in-memory collaborators.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;

use bilingual_search_core::embedding::{EmbeddingProvider, ProviderHealth};
use bilingual_search_core::models::{EntityType, Record};
use bilingual_search_core::ranking::RankingEngine;
use bilingual_search_core::store::{EmbeddingQueue, QueryHistory, RecordStore};

use crate::budget::{TimeBudget, TimeoutPolicy};
use crate::cache::{Cache, CacheBackend, MemoryCacheBackend};
use crate::config::Config;
use crate::embed_worker::{BatchReport, EmbeddingWorker, WorkerSettings};
use crate::error::SearchError;
use crate::import::{import_records, ImportReport};
use crate::search::{FullTextSearch, FullTextSettings, SearchOptions, SearchResponse};
use crate::semantic::{SemanticOptions, SemanticResponse, SemanticSearch, SemanticSettings};
use crate::sqlite_cache::SqliteCacheBackend;
use crate::sqlite_store::SqliteStore;
use crate::suggest::{
    NoResultsOptions, NoResultsSuggestions, SuggestOptions, SuggestResponse, SuggestSettings,
    SuggestionService,
};
use crate::warmer::{CacheWarmer, WarmerSettings, WarmingReport};
use crate::{db, embedding, migrate};

/// External systems the services talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub records: Arc<dyn RecordStore>,
    pub queue: Arc<dyn EmbeddingQueue>,
    pub history: Arc<dyn QueryHistory>,
    pub provider: Arc<dyn EmbeddingProvider>,
    pub cache: Arc<Cache>,
}

pub struct SearchServices {
    config: Config,
    collaborators: Collaborators,
    full_text: Arc<FullTextSearch>,
    semantic: SemanticSearch,
    suggestions: Arc<SuggestionService>,
    worker: Arc<EmbeddingWorker>,
    warmer: Arc<CacheWarmer>,
}

impl SearchServices {
    pub fn new(config: &Config, collaborators: Collaborators) -> Result<Self> {
        let ranking = RankingEngine::new(config.ranking.weights()?);

        let full_text = Arc::new(FullTextSearch::new(
            Arc::clone(&collaborators.records),
            Arc::clone(&collaborators.history),
            Arc::clone(&collaborators.cache),
            ranking.clone(),
            FullTextSettings {
                max_query_length: config.search.max_query_length,
                max_limit: config.search.max_limit,
                result_ttl: Duration::from_secs(config.cache.result_ttl_secs),
            },
        ));

        let semantic = SemanticSearch::new(
            Arc::clone(&collaborators.records),
            Arc::clone(&collaborators.provider),
            Arc::clone(&full_text),
            ranking,
            SemanticSettings {
                similarity_threshold: config.semantic.similarity_threshold,
                max_query_length: config.search.max_query_length,
                max_limit: config.search.max_limit,
            },
        );

        let suggestions = Arc::new(SuggestionService::new(
            Arc::clone(&collaborators.records),
            Arc::clone(&collaborators.history),
            Arc::clone(&collaborators.cache),
            SuggestSettings {
                min_prefix_len: config.suggest.min_prefix_len,
                candidates_per_type: config.suggest.candidates_per_type,
                ttl: Duration::from_secs(config.cache.suggestion_ttl_secs),
                correction_threshold: config.suggest.correction_threshold,
                max_corrections: config.suggest.max_corrections,
                max_popular: config.suggest.max_popular,
                history_window: chrono::Duration::days(config.suggest.history_window_days),
                ..SuggestSettings::default()
            },
        ));

        let worker = Arc::new(EmbeddingWorker::new(
            Arc::clone(&collaborators.records),
            Arc::clone(&collaborators.queue),
            Arc::clone(&collaborators.provider),
            WorkerSettings {
                interval: config.worker.interval(),
                batch_size: config.worker.batch_size,
                max_retries: config.worker.max_retries,
                max_text_chars: config.worker.max_text_chars,
            },
        ));

        let warmer = Arc::new(CacheWarmer::new(
            Arc::clone(&collaborators.history),
            Arc::clone(&suggestions),
            WarmerSettings {
                interval: config.warmer.interval(),
                top_queries: config.warmer.top_queries,
                window: chrono::Duration::days(config.warmer.window_days),
                min_prefix_len: config.warmer.min_prefix_len,
                max_prefix_len: config.warmer.max_prefix_len,
                batch_size: config.warmer.batch_size,
                batch_delay: Duration::from_millis(config.warmer.batch_delay_ms),
                scopes: warmer_scopes(&config.warmer.scopes)?,
            },
        ));

        Ok(Self {
            config: config.clone(),
            collaborators,
            full_text,
            semantic,
            suggestions,
            worker,
            warmer,
        })
    }

    /// Connect to the configured database, run migrations, and build the
    /// provider and cache it names.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;

        let store = Arc::new(SqliteStore::new(pool.clone()));
        let backend: Arc<dyn CacheBackend> = match config.cache.backend.as_str() {
            "memory" => Arc::new(MemoryCacheBackend::new()),
            _ => Arc::new(SqliteCacheBackend::new(pool)),
        };
        let cache = Arc::new(
            Cache::connect(
                backend,
                Duration::from_secs(config.cache.reconnect_interval_secs),
            )
            .await,
        );

        Self::new(
            config,
            Collaborators {
                records: store.clone(),
                queue: store.clone(),
                history: store,
                provider: embedding::create_provider(&config.embedding)?,
                cache,
            },
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.collaborators.cache
    }

    /// Options carrying the configured default limit and time budget.
    pub fn search_options(&self, query: impl Into<String>) -> Result<SearchOptions> {
        let budget = match self.config.search.timeout_ms {
            Some(ms) => {
                let policy: TimeoutPolicy = self
                    .config
                    .search
                    .timeout_policy
                    .parse()
                    .map_err(|e: String| anyhow!(e))?;
                Some(TimeBudget::from_millis(ms, policy))
            }
            None => None,
        };
        Ok(SearchOptions {
            limit: self.config.search.default_limit,
            budget,
            ..SearchOptions::new(query)
        })
    }

    pub fn semantic_options(&self, query: impl Into<String>) -> SemanticOptions {
        SemanticOptions {
            limit: self.config.semantic.default_limit,
            ..SemanticOptions::new(query)
        }
    }

    pub fn suggest_options(&self, prefix: impl Into<String>) -> SuggestOptions {
        SuggestOptions {
            limit: self.config.suggest.default_limit,
            ..SuggestOptions::new(prefix)
        }
    }

    pub async fn search(&self, opts: &SearchOptions) -> Result<SearchResponse, SearchError> {
        self.full_text.search(opts).await
    }

    pub async fn semantic_search(
        &self,
        opts: &SemanticOptions,
    ) -> Result<SemanticResponse, SearchError> {
        self.semantic.search(opts).await
    }

    pub async fn suggest(&self, opts: &SuggestOptions) -> SuggestResponse {
        self.suggestions.suggest(opts).await
    }

    pub async fn no_results(&self, opts: &NoResultsOptions) -> NoResultsSuggestions {
        self.suggestions.no_results(opts).await
    }

    pub async fn import(&self, items: &[Record], enqueue: bool) -> Result<ImportReport> {
        let report = import_records(
            self.collaborators.records.as_ref(),
            self.collaborators.queue.as_ref(),
            items,
            enqueue,
        )
        .await?;
        if report.imported > 0 {
            let cleared = self.collaborators.cache.invalidate_pattern("suggest:*").await
                + self.collaborators.cache.invalidate_pattern("results:*").await;
            tracing::debug!(cleared, "invalidated cache after import");
        }
        Ok(report)
    }

    pub async fn process_embeddings_once(&self) -> BatchReport {
        self.worker.process_once().await
    }

    pub async fn pending_embeddings(&self) -> Result<u64> {
        self.collaborators.queue.pending_count().await
    }

    pub async fn provider_health(&self) -> ProviderHealth {
        self.collaborators.provider.health_check().await
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.collaborators.provider
    }

    pub async fn warm_cache_once(&self) -> WarmingReport {
        self.warmer.run_once().await
    }

    /// Wait for detached history and cache writes. Call before a
    /// short-lived process exits.
    pub async fn close(&self) {
        let pending = self.full_text.pending_writes() + self.collaborators.cache.pending_writes();
        if pending > 0 {
            tracing::debug!(pending, "waiting for detached writes");
        }
        self.full_text.flush().await;
        self.collaborators.cache.flush().await;
    }

    pub fn start_background(&self) {
        self.worker.start();
        self.warmer.start();
    }

    pub async fn stop_background(&self) {
        self.worker.stop().await;
        self.warmer.stop().await;
    }
}

fn warmer_scopes(scopes: &[String]) -> Result<Vec<Option<Vec<EntityType>>>> {
    scopes
        .iter()
        .map(|scope| {
            if scope == "all" {
                Ok(None)
            } else {
                Ok(Some(vec![scope.parse::<EntityType>()?]))
            }
        })
        .collect()
}
