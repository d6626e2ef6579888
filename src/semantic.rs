//! Semantic (vector) search with optional keyword blending.
//!
//! The query is embedded once, then every semantic-capable entity type is
//! searched concurrently for stored vectors at or above the similarity
//! threshold. In hybrid mode a full-text search runs alongside, and any
//! record it already returned is dropped from the semantic list so each
//! record appears at most once. Semantic hits are ordered by similarity;
//! their `rank_score` only places them in the semantic band.
//!
//! An embedding failure is never fatal: hybrid requests fall back to the
//! keyword results, pure semantic requests return empty lists, and both
//! carry a warning.

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use bilingual_search_core::embedding::{EmbeddingProvider, MAX_EMBEDDING_CHARS};
use bilingual_search_core::models::{EntityType, MatchType, RecordRow, SearchResult};
use bilingual_search_core::query::validate_query_syntax_with_limit;
use bilingual_search_core::ranking::{RankingEngine, RankingFactors};
use bilingual_search_core::store::RecordStore;

use crate::error::SearchError;
use crate::search::{requested_types, FullTextSearch, SearchOptions};

#[derive(Debug, Clone)]
pub struct SemanticOptions {
    pub query: String,
    /// Restricted to semantic-capable types; others are dropped with a warning.
    pub entity_types: Option<Vec<EntityType>>,
    /// Overrides the configured similarity threshold.
    pub threshold: Option<f64>,
    pub limit: usize,
    pub include_keyword_results: bool,
}

impl SemanticOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            entity_types: None,
            threshold: None,
            limit: 20,
            include_keyword_results: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticTimings {
    pub embedding_ms: u64,
    pub vector_search_ms: u64,
    pub keyword_search_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingInfo {
    pub model: String,
    pub dimensions: usize,
    /// False when the query embedding could not be produced.
    pub generated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticResponse {
    pub query: String,
    pub exact_matches: Vec<SearchResult>,
    pub semantic_matches: Vec<SearchResult>,
    pub threshold: f64,
    pub warnings: Vec<String>,
    pub failed_branches: Vec<EntityType>,
    pub timings: SemanticTimings,
    pub embedding_info: EmbeddingInfo,
}

#[derive(Debug, Clone)]
pub struct SemanticSettings {
    pub similarity_threshold: f64,
    pub max_query_length: usize,
    pub max_limit: usize,
}

struct VectorOutcome {
    rows: Vec<SearchResult>,
    warnings: Vec<String>,
    failed: Vec<EntityType>,
    generated: bool,
    embedding_ms: u64,
    vector_search_ms: u64,
}

pub struct SemanticSearch {
    records: Arc<dyn RecordStore>,
    provider: Arc<dyn EmbeddingProvider>,
    keyword: Arc<FullTextSearch>,
    ranking: RankingEngine,
    settings: SemanticSettings,
}

impl SemanticSearch {
    pub fn new(
        records: Arc<dyn RecordStore>,
        provider: Arc<dyn EmbeddingProvider>,
        keyword: Arc<FullTextSearch>,
        ranking: RankingEngine,
        settings: SemanticSettings,
    ) -> Self {
        Self {
            records,
            provider,
            keyword,
            ranking,
            settings,
        }
    }

    pub async fn search(&self, opts: &SemanticOptions) -> Result<SemanticResponse, SearchError> {
        let started = Instant::now();
        validate_query_syntax_with_limit(&opts.query, self.settings.max_query_length)?;

        let threshold = opts
            .threshold
            .unwrap_or(self.settings.similarity_threshold)
            .clamp(0.0, 1.0);
        let limit = opts.limit.clamp(1, self.settings.max_limit);
        let mut warnings = Vec::new();

        let requested = match opts.entity_types.as_deref() {
            Some(types) if !types.is_empty() => requested_types(Some(types)),
            _ => EntityType::SEMANTIC.to_vec(),
        };
        let (types, unsupported): (Vec<EntityType>, Vec<EntityType>) =
            requested.into_iter().partition(|t| t.supports_semantic());
        for t in &unsupported {
            warnings.push(format!("{} does not support semantic search", t));
        }

        let keyword = async {
            if !opts.include_keyword_results || types.is_empty() {
                return (None, 0);
            }
            let keyword_started = Instant::now();
            let request = SearchOptions {
                entity_types: Some(types.clone()),
                limit,
                ..SearchOptions::new(opts.query.clone())
            };
            let outcome = self.keyword.search(&request).await;
            (Some(outcome), keyword_started.elapsed().as_millis() as u64)
        };
        let vector = self.vector_search(&opts.query, &types, threshold, limit);

        let ((keyword_outcome, keyword_search_ms), vector) = tokio::join!(keyword, vector);

        let mut failed_branches = vector.failed;
        let mut exact_matches = Vec::new();
        match keyword_outcome {
            Some(Ok(response)) => {
                warnings.extend(response.warnings);
                for t in response.failed_branches {
                    if !failed_branches.contains(&t) {
                        failed_branches.push(t);
                    }
                }
                exact_matches = response.results;
            }
            Some(Err(e)) => warnings.push(format!("keyword search failed: {}", e)),
            None => {}
        }
        warnings.extend(vector.warnings);

        let seen: HashSet<(EntityType, String)> = exact_matches
            .iter()
            .map(|r| (r.entity_type, r.id.clone()))
            .collect();
        let semantic_matches = dedupe(vector.rows, seen, limit);

        if !vector.generated {
            if opts.include_keyword_results {
                warnings.push("semantic search unavailable, returning keyword results only".to_string());
            } else {
                warnings.push("semantic search unavailable".to_string());
            }
        }

        let timings = SemanticTimings {
            embedding_ms: vector.embedding_ms,
            vector_search_ms: vector.vector_search_ms,
            keyword_search_ms,
            total_ms: started.elapsed().as_millis() as u64,
        };

        tracing::debug!(
            query = %opts.query,
            exact = exact_matches.len(),
            semantic = semantic_matches.len(),
            total_ms = timings.total_ms,
            "semantic search completed"
        );

        Ok(SemanticResponse {
            query: opts.query.clone(),
            exact_matches,
            semantic_matches,
            threshold,
            warnings,
            failed_branches,
            timings,
            embedding_info: EmbeddingInfo {
                model: self.provider.model_name().to_string(),
                dimensions: self.provider.dims(),
                generated: vector.generated,
            },
        })
    }

    async fn vector_search(
        &self,
        query: &str,
        types: &[EntityType],
        threshold: f64,
        limit: usize,
    ) -> VectorOutcome {
        let mut outcome = VectorOutcome {
            rows: Vec::new(),
            warnings: Vec::new(),
            failed: Vec::new(),
            generated: false,
            embedding_ms: 0,
            vector_search_ms: 0,
        };
        if types.is_empty() {
            return outcome;
        }

        let text: String = query.trim().chars().take(MAX_EMBEDDING_CHARS).collect();
        let embedding_started = Instant::now();
        let embedded = self.provider.embed(&text).await;
        outcome.embedding_ms = embedding_started.elapsed().as_millis() as u64;

        let embedding = match embedded {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed");
                outcome.warnings.push(format!("embedding generation failed: {}", e));
                return outcome;
            }
        };
        outcome.generated = true;

        let search_started = Instant::now();
        let branches = types.iter().map(|&entity_type| {
            let embedding = &embedding;
            async move {
                (
                    entity_type,
                    self.records
                        .search_semantic(entity_type, embedding, threshold, limit)
                        .await,
                )
            }
        });
        let results = join_all(branches).await;
        outcome.vector_search_ms = search_started.elapsed().as_millis() as u64;

        let mut rows = Vec::new();
        for (entity_type, result) in results {
            match result {
                Ok(found) => rows.extend(found),
                Err(e) => {
                    tracing::warn!(%entity_type, error = %e, "semantic branch failed");
                    outcome
                        .warnings
                        .push(format!("{} semantic search failed: {}", entity_type, e));
                    outcome.failed.push(entity_type);
                }
            }
        }
        let now = Utc::now();
        outcome.rows = by_similarity(rows)
            .into_iter()
            .map(|row| self.rank_row(row, now))
            .collect();
        outcome
    }

    fn rank_row(&self, row: RecordRow, now: chrono::DateTime<Utc>) -> SearchResult {
        let factors = RankingFactors {
            match_quality: row.score,
            title_match: false,
            exact_phrase: false,
            days_since_update: (now - row.updated_at).num_days(),
            entity_type: row.entity_type,
            is_exact_match: false,
        };
        SearchResult {
            rank_score: self.ranking.score(&factors),
            id: row.id,
            entity_type: row.entity_type,
            title_en: row.title_en,
            title_ar: row.title_ar,
            snippet_en: row.snippet_en,
            snippet_ar: row.snippet_ar,
            updated_at: row.updated_at,
            is_archived: row.is_archived,
            match_type: MatchType::Semantic,
        }
    }
}

/// Most similar first. Ties keep branch order.
fn by_similarity(mut rows: Vec<RecordRow>) -> Vec<RecordRow> {
    rows.sort_by(|a, b| b.score.total_cmp(&a.score));
    rows
}

/// Keep the first occurrence of each record not already in `seen`.
fn dedupe(
    rows: Vec<SearchResult>,
    mut seen: HashSet<(EntityType, String)>,
    limit: usize,
) -> Vec<SearchResult> {
    rows.into_iter()
        .filter(|r| seen.insert((r.entity_type, r.id.clone())))
        .take(limit)
        .collect()
}
