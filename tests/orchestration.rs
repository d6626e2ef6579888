use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bilingual_search::budget::{TimeBudget, TimeoutPolicy};
use bilingual_search::cache::{Cache, MemoryCacheBackend};
use bilingual_search::config::Config;
use bilingual_search::embedding::DisabledProvider;
use bilingual_search::error::SearchError;
use bilingual_search::search::SearchOptions;
use bilingual_search::service::{Collaborators, SearchServices};
use bilingual_search::suggest::NoResultsOptions;
use bilingual_search_core::embedding::{EmbeddingProvider, ProviderHealth};
use bilingual_search_core::models::{
    EntityType, Language, MatchType, Record, RecordRow, SuggestionCandidate,
};
use bilingual_search_core::store::memory::InMemoryStore;
use bilingual_search_core::store::{EmbeddingQueue, FullTextRequest, QueryHistory, RecordStore};

// ============ Fixtures ============

fn record(entity_type: EntityType, id: &str, title_en: &str, title_ar: &str) -> Record {
    Record {
        id: id.to_string(),
        entity_type,
        title_en: title_en.to_string(),
        title_ar: title_ar.to_string(),
        description_en: None,
        description_ar: None,
        fields: BTreeMap::new(),
        status: "active".to_string(),
        is_archived: false,
        updated_at: Utc::now(),
    }
}

/// Delegates to an [`InMemoryStore`], failing or stalling selected calls.
struct FlakyStore {
    inner: Arc<InMemoryStore>,
    failing: HashSet<EntityType>,
    delay: Option<Duration>,
    suggestion_calls: AtomicUsize,
}

impl FlakyStore {
    fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            failing: HashSet::new(),
            delay: None,
            suggestion_calls: AtomicUsize::new(0),
        }
    }

    async fn gate(&self, entity_type: EntityType) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&entity_type) {
            bail!("{} table unavailable", entity_type);
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn search_full_text(
        &self,
        entity_type: EntityType,
        request: &FullTextRequest<'_>,
    ) -> Result<Vec<RecordRow>> {
        self.gate(entity_type).await?;
        self.inner.search_full_text(entity_type, request).await
    }

    async fn search_semantic(
        &self,
        entity_type: EntityType,
        embedding: &[f32],
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<RecordRow>> {
        self.gate(entity_type).await?;
        self.inner
            .search_semantic(entity_type, embedding, threshold, limit)
            .await
    }

    async fn suggestion_candidates(
        &self,
        entity_type: EntityType,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<SuggestionCandidate>> {
        self.suggestion_calls.fetch_add(1, Ordering::SeqCst);
        self.gate(entity_type).await?;
        self.inner
            .suggestion_candidates(entity_type, prefix, limit)
            .await
    }

    async fn get_record(&self, entity_type: EntityType, id: &str) -> Result<Option<Record>> {
        self.inner.get_record(entity_type, id).await
    }

    async fn upsert_record(&self, record: &Record) -> Result<()> {
        self.inner.upsert_record(record).await
    }

    async fn store_embedding(&self, entity_type: EntityType, id: &str, embedding: &[f32]) -> Result<()> {
        self.inner.store_embedding(entity_type, id, embedding).await
    }
}

/// Embeds "water" texts along the first axis and everything else along the second.
struct KeywordProvider {
    fail: bool,
}

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    fn model_name(&self) -> &str {
        "keyword-test"
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail {
            bail!("provider offline");
        }
        if text.to_lowercase().contains("water") || text.contains("مياه") {
            Ok(vec![1.0, 0.0])
        } else {
            Ok(vec![0.0, 1.0])
        }
    }
    async fn health_check(&self) -> ProviderHealth {
        ProviderHealth {
            available: !self.fail,
            latency_ms: 1,
            error: None,
        }
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    records: Arc<FlakyStore>,
    backend: Arc<MemoryCacheBackend>,
    services: SearchServices,
}

fn harness_with(
    config: Config,
    configure: impl FnOnce(&mut FlakyStore),
    provider: Arc<dyn EmbeddingProvider>,
) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let mut flaky = FlakyStore::new(Arc::clone(&store));
    configure(&mut flaky);
    let records = Arc::new(flaky);
    let backend = Arc::new(MemoryCacheBackend::new());
    let cache = Arc::new(Cache::new(backend.clone(), Duration::from_secs(3600)));

    let services = SearchServices::new(
        &config,
        Collaborators {
            records: records.clone(),
            queue: store.clone(),
            history: store.clone(),
            provider,
            cache,
        },
    )
    .unwrap();

    Harness {
        store,
        records,
        backend,
        services,
    }
}

fn uncached_config() -> Config {
    let mut config = Config::default();
    config.cache.result_ttl_secs = 0;
    config
}

fn harness() -> Harness {
    harness_with(uncached_config(), |_| {}, Arc::new(DisabledProvider))
}

async fn seed(store: &InMemoryStore, records: &[Record]) {
    for r in records {
        store.upsert_record(r).await.unwrap();
    }
}

// ============ Full-text search ============

#[tokio::test]
async fn test_failing_branch_is_isolated() {
    let h = harness_with(
        uncached_config(),
        |s| {
            s.failing.insert(EntityType::Position);
        },
        Arc::new(DisabledProvider),
    );
    seed(
        &h.store,
        &[
            record(EntityType::Dossier, "d1", "Water security", ""),
            record(EntityType::Position, "p1", "Water position", ""),
            record(EntityType::Engagement, "e1", "Water summit", ""),
            record(EntityType::Document, "doc1", "Water report", ""),
        ],
    )
    .await;

    let opts = SearchOptions {
        entity_types: Some(vec![
            EntityType::Dossier,
            EntityType::Position,
            EntityType::Engagement,
            EntityType::Document,
        ]),
        ..SearchOptions::new("water")
    };
    let response = h.services.search(&opts).await.unwrap();

    assert_eq!(response.warnings.len(), 1);
    assert!(response.warnings[0].contains("position"));
    assert_eq!(response.failed_branches, vec![EntityType::Position]);
    assert_eq!(response.results.len(), 3);
    assert_eq!(response.counts_by_type[&EntityType::Dossier], 1);
    assert_eq!(response.counts_by_type[&EntityType::Engagement], 1);
    assert_eq!(response.counts_by_type[&EntityType::Document], 1);
    assert_eq!(response.counts_by_type[&EntityType::Position], 0);
    assert!(response.results.iter().all(|r| r.entity_type != EntityType::Position));
}

#[tokio::test]
async fn test_exact_results_rank_in_exact_band_and_title_wins() {
    let h = harness();
    let mut body_only = record(EntityType::Dossier, "d2", "Energy outlook", "");
    body_only.description_en = Some("Notes on water pipelines".to_string());
    seed(
        &h.store,
        &[record(EntityType::Dossier, "d1", "Water outlook", ""), body_only],
    )
    .await;

    let response = h.services.search(&SearchOptions::new("water")).await.unwrap();

    assert_eq!(response.results.len(), 2);
    assert_eq!(response.results[0].id, "d1");
    assert!(response
        .results
        .iter()
        .all(|r| r.rank_score > 100.0 && r.rank_score <= 200.0 && r.match_type == MatchType::Exact));
}

#[tokio::test]
async fn test_pagination_over_merged_results() {
    let h = harness();
    let records: Vec<Record> = (0..5)
        .map(|i| record(EntityType::Dossier, &format!("d{}", i), &format!("Water report {}", i), ""))
        .collect();
    seed(&h.store, &records).await;

    let opts = SearchOptions {
        limit: 2,
        offset: 2,
        ..SearchOptions::new("water")
    };
    let response = h.services.search(&opts).await.unwrap();

    assert_eq!(response.total, 5);
    assert_eq!(response.results.len(), 2);
    assert!(response.has_more);

    let last = SearchOptions {
        limit: 2,
        offset: 4,
        ..SearchOptions::new("water")
    };
    let response = h.services.search(&last).await.unwrap();
    assert_eq!(response.results.len(), 1);
    assert!(!response.has_more);
}

#[tokio::test]
async fn test_boolean_not_and_arabic_query() {
    let h = harness();
    seed(
        &h.store,
        &[
            record(EntityType::Dossier, "d1", "Water security", "أمن المياه"),
            record(EntityType::Dossier, "d2", "Water and energy", "المياه والطاقة"),
        ],
    )
    .await;

    let response = h
        .services
        .search(&SearchOptions::new("water NOT energy"))
        .await
        .unwrap();
    let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["d1"]);

    let response = h.services.search(&SearchOptions::new("أمن")).await.unwrap();
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].id, "d1");
}

#[tokio::test]
async fn test_validation_errors_are_hard_errors() {
    let h = harness();
    for bad in ["", "   ", "(water", "\"water"] {
        let err = h.services.search(&SearchOptions::new(bad)).await.unwrap_err();
        assert!(err.is_validation(), "expected validation error for {:?}", bad);
    }
    let long = "a".repeat(501);
    assert!(h.services.search(&SearchOptions::new(long)).await.is_err());
}

#[tokio::test]
async fn test_search_records_history() {
    let h = harness();
    seed(&h.store, &[record(EntityType::Dossier, "d1", "Water security", "")]).await;

    h.services.search(&SearchOptions::new("  Water ")).await.unwrap();
    h.services.close().await;

    let popular = h
        .store
        .popular_queries(Utc::now() - ChronoDuration::days(1), 10)
        .await
        .unwrap();
    assert_eq!(popular.len(), 1);
    assert_eq!(popular[0].query, "water");
}

#[tokio::test]
async fn test_result_cache_serves_repeat_queries() {
    let h = harness_with(Config::default(), |_| {}, Arc::new(DisabledProvider));
    seed(&h.store, &[record(EntityType::Dossier, "d1", "Water security", "")]).await;

    let first = h.services.search(&SearchOptions::new("water")).await.unwrap();
    assert!(!first.from_cache);
    h.services.close().await;

    let second = h.services.search(&SearchOptions::new("water")).await.unwrap();
    assert!(second.from_cache);
    let ids = |r: &[bilingual_search_core::models::SearchResult]| -> Vec<String> {
        r.iter().map(|x| x.id.clone()).collect()
    };
    assert_eq!(ids(&second.results), ids(&first.results));
    assert_eq!(second.total, first.total);
}

#[tokio::test]
async fn test_offset_past_end_returns_empty_page() {
    let h = harness();
    seed(&h.store, &[record(EntityType::Dossier, "d1", "Water security", "")]).await;

    let opts = SearchOptions {
        offset: usize::MAX,
        ..SearchOptions::new("water")
    };
    let response = h.services.search(&opts).await.unwrap();

    assert!(response.results.is_empty());
    assert_eq!(response.total, 1);
    assert!(!response.has_more);
}

// ============ Time budgets ============

fn slow_harness() -> Harness {
    harness_with(
        uncached_config(),
        |s| s.delay = Some(Duration::from_millis(300)),
        Arc::new(DisabledProvider),
    )
}

#[tokio::test]
async fn test_budget_fail_policy_errors() {
    let h = slow_harness();
    let opts = SearchOptions {
        budget: Some(TimeBudget::from_millis(20, TimeoutPolicy::Fail)),
        ..SearchOptions::new("water")
    };
    match h.services.search(&opts).await {
        Err(SearchError::BudgetExceeded { budget_ms }) => assert_eq!(budget_ms, 20),
        other => panic!("expected budget error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_budget_partial_policy_returns_flagged_response() {
    let h = slow_harness();
    let opts = SearchOptions {
        budget: Some(TimeBudget::from_millis(20, TimeoutPolicy::Partial)),
        ..SearchOptions::new("water")
    };
    let response = h.services.search(&opts).await.unwrap();
    assert!(response.timed_out);
    assert!(response.results.is_empty());
    assert!(!response.warnings.is_empty());
}

#[tokio::test]
async fn test_budget_cached_policy_without_cache_degrades_to_partial() {
    let h = slow_harness();
    let opts = SearchOptions {
        budget: Some(TimeBudget::from_millis(20, TimeoutPolicy::Cached)),
        ..SearchOptions::new("water")
    };
    let response = h.services.search(&opts).await.unwrap();
    assert!(response.timed_out);
    assert!(!response.from_cache);
}

// ============ Semantic search ============

async fn seed_embedded(h: &Harness) {
    seed(
        &h.store,
        &[
            record(EntityType::Dossier, "d1", "Water security", ""),
            record(EntityType::Position, "p1", "Water allocation", ""),
            record(EntityType::Dossier, "d2", "Trade agreements", ""),
        ],
    )
    .await;
    h.store.store_embedding(EntityType::Dossier, "d1", &[1.0, 0.0]).await.unwrap();
    h.store.store_embedding(EntityType::Position, "p1", &[0.9, 0.1]).await.unwrap();
    h.store.store_embedding(EntityType::Dossier, "d2", &[0.0, 1.0]).await.unwrap();
}

#[tokio::test]
async fn test_semantic_matches_follow_similarity_not_entity_boost() {
    let h = harness_with(uncached_config(), |_| {}, Arc::new(KeywordProvider { fail: false }));
    seed(
        &h.store,
        &[
            record(EntityType::Dossier, "d1", "Regional cooperation", ""),
            record(EntityType::Document, "doc1", "Field report", ""),
        ],
    )
    .await;
    // cosine with the "water" axis: 0.75 for the dossier, 0.80 for the document
    h.store
        .store_embedding(EntityType::Dossier, "d1", &[0.75, 0.661_437_8])
        .await
        .unwrap();
    h.store
        .store_embedding(EntityType::Document, "doc1", &[0.8, 0.6])
        .await
        .unwrap();

    let response = h
        .services
        .semantic_search(&h.services.semantic_options("water"))
        .await
        .unwrap();

    let ids: Vec<&str> = response.semantic_matches.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["doc1", "d1"]);
    assert!(response.semantic_matches.iter().all(|r| r.rank_score < 100.0));
}

#[tokio::test]
async fn test_semantic_results_in_semantic_band() {
    let h = harness_with(uncached_config(), |_| {}, Arc::new(KeywordProvider { fail: false }));
    seed_embedded(&h).await;

    let response = h
        .services
        .semantic_search(&h.services.semantic_options("drinking water"))
        .await
        .unwrap();

    let ids: HashSet<&str> = response.semantic_matches.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, HashSet::from(["d1", "p1"]));
    assert!(response
        .semantic_matches
        .iter()
        .all(|r| r.rank_score < 100.0 && r.match_type == MatchType::Semantic));
    assert!(response.exact_matches.is_empty());
    assert!(response.embedding_info.generated);
    assert_eq!(response.embedding_info.model, "keyword-test");
    assert_eq!(response.embedding_info.dimensions, 2);
}

#[tokio::test]
async fn test_hybrid_drops_keyword_duplicates() {
    let h = harness_with(uncached_config(), |_| {}, Arc::new(KeywordProvider { fail: false }));
    seed_embedded(&h).await;

    let mut opts = h.services.semantic_options("water security");
    opts.include_keyword_results = true;
    let response = h.services.semantic_search(&opts).await.unwrap();

    let exact: Vec<&str> = response.exact_matches.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(exact, vec!["d1"]);
    let semantic: Vec<&str> = response.semantic_matches.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(semantic, vec!["p1"]);
}

#[tokio::test]
async fn test_embedding_failure_falls_back() {
    let h = harness_with(uncached_config(), |_| {}, Arc::new(KeywordProvider { fail: true }));
    seed_embedded(&h).await;

    let mut opts = h.services.semantic_options("water");
    opts.include_keyword_results = true;
    let hybrid = h.services.semantic_search(&opts).await.unwrap();
    assert!(!hybrid.embedding_info.generated);
    assert!(!hybrid.exact_matches.is_empty());
    assert!(hybrid.semantic_matches.is_empty());
    assert!(hybrid.warnings.iter().any(|w| w.contains("keyword results only")));

    opts.include_keyword_results = false;
    let pure = h.services.semantic_search(&opts).await.unwrap();
    assert!(pure.exact_matches.is_empty());
    assert!(pure.semantic_matches.is_empty());
    assert!(!pure.warnings.is_empty());
}

#[tokio::test]
async fn test_semantic_ignores_unsupported_types() {
    let h = harness_with(uncached_config(), |_| {}, Arc::new(KeywordProvider { fail: false }));
    seed_embedded(&h).await;

    let mut opts = h.services.semantic_options("water");
    opts.entity_types = Some(vec![EntityType::Person, EntityType::Dossier]);
    let response = h.services.semantic_search(&opts).await.unwrap();

    assert!(response.warnings.iter().any(|w| w.contains("person")));
    assert!(response.semantic_matches.iter().all(|r| r.entity_type == EntityType::Dossier));
}

// ============ Suggestions ============

#[tokio::test]
async fn test_suggestions_cache_and_minimum_prefix() {
    let h = harness();
    seed(
        &h.store,
        &[
            record(EntityType::Dossier, "d1", "Water security", "أمن المياه"),
            record(EntityType::Position, "p1", "Clean water access", ""),
        ],
    )
    .await;

    let short = h.services.suggest(&h.services.suggest_options("w")).await;
    assert!(short.suggestions.is_empty());
    assert_eq!(h.records.suggestion_calls.load(Ordering::SeqCst), 0);

    let first = h.services.suggest(&h.services.suggest_options("wat")).await;
    assert!(!first.cache_hit);
    assert_eq!(first.suggestions[0].id, "d1");
    assert_eq!(first.suggestions[0].match_position, 0);
    assert_eq!(first.suggestions.len(), 2);
    h.services.close().await;

    let calls = h.records.suggestion_calls.load(Ordering::SeqCst);
    let second = h.services.suggest(&h.services.suggest_options("wat")).await;
    assert!(second.cache_hit);
    let ids = |r: &[bilingual_search_core::models::Suggestion]| -> Vec<String> {
        r.iter().map(|x| x.id.clone()).collect()
    };
    assert_eq!(ids(&second.suggestions), ids(&first.suggestions));
    assert_eq!(h.records.suggestion_calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn test_suggestions_survive_cache_outage() {
    let h = harness();
    seed(&h.store, &[record(EntityType::Dossier, "d1", "Water security", "")]).await;
    h.backend.set_available(false);

    let response = h.services.suggest(&h.services.suggest_options("water")).await;
    assert_eq!(response.suggestions.len(), 1);
    assert!(!response.cache_hit);
    assert!(h.services.cache().is_degraded());

    let again = h.services.suggest(&h.services.suggest_options("water")).await;
    assert_eq!(again.suggestions.len(), 1);
    assert!(!again.cache_hit);
}

#[tokio::test]
async fn test_empty_suggestions_are_not_cached() {
    let h = harness();

    let miss = h.services.suggest(&h.services.suggest_options("water")).await;
    assert!(miss.suggestions.is_empty());
    assert!(!miss.cache_hit);
    h.services.close().await;
    assert!(h.backend.is_empty());

    seed(&h.store, &[record(EntityType::Dossier, "d1", "Water security", "")]).await;

    let after = h.services.suggest(&h.services.suggest_options("water")).await;
    assert!(!after.cache_hit);
    assert_eq!(after.suggestions.len(), 1);
    assert_eq!(after.suggestions[0].id, "d1");
}

#[tokio::test]
async fn test_no_results_offers_corrections_and_popular_searches() {
    let h = harness();
    seed(
        &h.store,
        &[
            record(EntityType::Dossier, "d1", "Water security", "أمن المياه"),
            record(EntityType::Dossier, "d2", "Energy outlook", ""),
        ],
    )
    .await;
    h.store.record_query_at("climate policy", Utc::now());
    h.store.record_query_at("climate policy", Utc::now());
    h.store.record_query_at("watr security", Utc::now());

    let hints = h
        .services
        .no_results(&NoResultsOptions::new("watr security"))
        .await;

    assert_eq!(hints.original_query, "watr security");
    assert_eq!(hints.typo_corrections.len(), 1);
    assert_eq!(hints.typo_corrections[0].corrected, "Water security");
    assert!(hints.typo_corrections[0].similarity >= 0.9);
    let popular: Vec<&str> = hints.popular_searches.iter().map(|p| p.query.as_str()).collect();
    assert_eq!(popular, vec!["climate policy"]);
    assert_eq!(hints.search_tips[0], "Try different keywords");
    assert!(hints.failed_branches.is_empty());
}

#[tokio::test]
async fn test_no_results_short_query_only_gives_tips() {
    let h = harness();
    seed(&h.store, &[record(EntityType::Dossier, "d1", "Water security", "")]).await;

    let mut opts = NoResultsOptions::new("w");
    opts.language = Some(Language::Ar);
    let hints = h.services.no_results(&opts).await;

    assert!(hints.typo_corrections.is_empty());
    assert!(hints.popular_searches.is_empty());
    assert_eq!(hints.search_tips[0], "جرب كلمات مفتاحية مختلفة");
    assert_eq!(h.records.suggestion_calls.load(Ordering::SeqCst), 0);
}

// ============ Embedding worker ============

#[tokio::test]
async fn test_worker_drops_item_after_max_retries() {
    let h = harness_with(uncached_config(), |_| {}, Arc::new(KeywordProvider { fail: true }));
    seed(&h.store, &[record(EntityType::Dossier, "d1", "Water security", "")]).await;
    let item = h.store.enqueue(EntityType::Dossier, "d1", 1).await.unwrap();

    for attempt in 1..=4 {
        let report = h.services.process_embeddings_once().await;
        assert_eq!(report.failed, 1, "attempt {}", attempt);
        assert_eq!(h.store.queue_item(&item.id).unwrap().retry_count, attempt);
    }

    let report = h.services.process_embeddings_once().await;
    assert_eq!(report.dropped, 1);
    assert!(h.store.queue_item(&item.id).is_none());

    let report = h.services.process_embeddings_once().await;
    assert!(report.is_idle());
}

#[tokio::test]
async fn test_worker_embeds_in_priority_order() {
    let h = harness_with(uncached_config(), |_| {}, Arc::new(KeywordProvider { fail: false }));
    seed(
        &h.store,
        &[
            record(EntityType::Dossier, "d1", "Water security", ""),
            record(EntityType::Document, "doc1", "Trade memo", ""),
        ],
    )
    .await;
    h.store.enqueue(EntityType::Dossier, "d1", 5).await.unwrap();
    h.store.enqueue(EntityType::Document, "doc1", 1).await.unwrap();

    let report = h.services.process_embeddings_once().await;
    assert_eq!(report.processed, 2);
    assert_eq!(h.store.pending_count().await.unwrap(), 0);
    assert_eq!(h.store.embedding(EntityType::Dossier, "d1"), Some(vec![1.0, 0.0]));
    assert_eq!(h.store.embedding(EntityType::Document, "doc1"), Some(vec![0.0, 1.0]));
}

// ============ Cache warmer ============

#[tokio::test]
async fn test_warmer_fills_suggestion_cache() {
    let mut config = uncached_config();
    config.warmer.scopes = vec!["all".to_string(), "dossier".to_string()];
    config.warmer.batch_delay_ms = 0;
    let h = harness_with(config, |_| {}, Arc::new(DisabledProvider));
    seed(&h.store, &[record(EntityType::Dossier, "d1", "Water security", "")]).await;
    h.store.record_query_at("water", Utc::now());
    h.store.record_query_at("water", Utc::now());
    h.store.record_query_at("stale", Utc::now() - ChronoDuration::days(30));

    let report = h.services.warm_cache_once().await;

    assert_eq!(report.queries_processed, 1);
    // "wa", "wat", "wate", "water" in two scopes
    assert_eq!(report.prefixes_warmed, 8);
    assert!(report.errors.is_empty());

    let calls = h.records.suggestion_calls.load(Ordering::SeqCst);
    let response = h.services.suggest(&h.services.suggest_options("wate")).await;
    assert!(response.cache_hit);
    assert_eq!(response.suggestions[0].id, "d1");
    assert_eq!(h.records.suggestion_calls.load(Ordering::SeqCst), calls);
}
