//! Full-text search orchestration.
//!
//! One request fans out to every requested entity type concurrently, ranks
//! every returned row as an exact match, and merges the branches into one
//! ordered page.
//!
//! # Pipeline
//!
//! ```text
//! validate → parse → [result cache] → fan-out per type → rank → merge
//!          → stable sort → paginate → [history + cache fill, detached]
//! ```
//!
//! A failing branch is logged, reported in `warnings`/`failed_branches`,
//! and contributes zero rows; it never fails the request. Only validation
//! errors and a `Fail`-policy budget expiry are hard errors.

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use bilingual_search_core::models::{EntityType, Language, MatchType, RecordRow, SearchResult};
use bilingual_search_core::query::{
    parse_search_query, validate_query_syntax_with_limit, ParsedQuery,
};
use bilingual_search_core::ranking::{sort_by_rank, RankingEngine, RankingFactors};
use bilingual_search_core::store::{FullTextRequest, QueryHistory, RecordStore};
use bilingual_search_core::text::normalize_search_text;

use crate::budget::{TimeBudget, TimeoutPolicy};
use crate::cache::{results_key, Cache};
use crate::detached::DetachedWrites;
use crate::error::SearchError;

/// Full-text request.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub query: String,
    /// `None` searches every entity type.
    pub entity_types: Option<Vec<EntityType>>,
    pub language: Option<Language>,
    pub limit: usize,
    pub offset: usize,
    pub include_archived: bool,
    pub budget: Option<TimeBudget>,
}

impl SearchOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            entity_types: None,
            language: None,
            limit: 20,
            offset: 0,
            include_archived: false,
            budget: None,
        }
    }
}

/// How the query was understood, echoed back for debugging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDiagnostics {
    pub original: String,
    pub normalized: String,
    pub language: Language,
    pub has_boolean_operators: bool,
    pub tokens: Vec<String>,
}

impl QueryDiagnostics {
    fn new(original: &str, parsed: &ParsedQuery) -> Self {
        Self {
            original: original.to_string(),
            normalized: parsed.normalized_query.clone(),
            language: parsed.language,
            has_boolean_operators: parsed.has_boolean_operators,
            tokens: parsed.tokens.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    /// Merged row count before pagination.
    pub total: usize,
    pub has_more: bool,
    pub counts_by_type: BTreeMap<EntityType, usize>,
    pub query: QueryDiagnostics,
    pub took_ms: u64,
    pub warnings: Vec<String>,
    pub failed_branches: Vec<EntityType>,
    pub timed_out: bool,
    pub from_cache: bool,
}

#[derive(Debug, Clone)]
pub struct FullTextSettings {
    pub max_query_length: usize,
    pub max_limit: usize,
    /// Zero disables the result cache.
    pub result_ttl: Duration,
}

enum Branch {
    Rows(Vec<RecordRow>),
    Failed(anyhow::Error),
    TimedOut,
}

/// Full-text search orchestrator. Construct once and share.
pub struct FullTextSearch {
    records: Arc<dyn RecordStore>,
    history: Arc<dyn QueryHistory>,
    cache: Arc<Cache>,
    ranking: RankingEngine,
    settings: FullTextSettings,
    writes: DetachedWrites,
}

impl FullTextSearch {
    pub fn new(
        records: Arc<dyn RecordStore>,
        history: Arc<dyn QueryHistory>,
        cache: Arc<Cache>,
        ranking: RankingEngine,
        settings: FullTextSettings,
    ) -> Self {
        Self {
            records,
            history,
            cache,
            ranking,
            settings,
            writes: DetachedWrites::new(),
        }
    }

    /// Wait for pending history writes.
    pub async fn flush(&self) {
        self.writes.flush().await;
    }

    pub fn pending_writes(&self) -> usize {
        self.writes.pending()
    }

    pub async fn search(&self, opts: &SearchOptions) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();
        validate_query_syntax_with_limit(&opts.query, self.settings.max_query_length)?;

        let parsed = parse_search_query(&opts.query, opts.language);
        let types = requested_types(opts.entity_types.as_deref());
        let limit = opts.limit.clamp(1, self.settings.max_limit);
        let cache_key = results_key(
            &parsed.normalized_query,
            Some(&fingerprint(&types, opts, limit)),
        );
        let caching = !self.settings.result_ttl.is_zero();

        if caching {
            if let Some(mut cached) = self.cache.get_json::<SearchResponse>(&cache_key).await {
                cached.from_cache = true;
                cached.took_ms = started.elapsed().as_millis() as u64;
                self.record_history(&opts.query, cached.total);
                return Ok(cached);
            }
        }

        let deadline = opts.budget.map(|b| b.deadline_from(started));
        let mode = parsed.mode();
        let fetch = opts.offset.saturating_add(limit).saturating_add(1);

        let branches = types.iter().map(|&entity_type| {
            let records = Arc::clone(&self.records);
            let parsed = &parsed;
            async move {
                let request = FullTextRequest {
                    query: parsed,
                    mode,
                    limit: fetch,
                    offset: 0,
                    include_archived: opts.include_archived,
                };
                let search = records.search_full_text(entity_type, &request);
                let outcome = match deadline {
                    Some(deadline) => match tokio::time::timeout_at(deadline, search).await {
                        Ok(result) => result,
                        Err(_) => return (entity_type, Branch::TimedOut),
                    },
                    None => search.await,
                };
                match outcome {
                    Ok(rows) => (entity_type, Branch::Rows(rows)),
                    Err(e) => (entity_type, Branch::Failed(e)),
                }
            }
        });
        let outcomes = join_all(branches).await;

        let now = Utc::now();
        let mut merged = Vec::new();
        let mut counts_by_type = BTreeMap::new();
        let mut warnings = Vec::new();
        let mut failed_branches = Vec::new();
        let mut timed_out = false;

        for (entity_type, outcome) in outcomes {
            match outcome {
                Branch::Rows(rows) => {
                    counts_by_type.insert(entity_type, rows.len());
                    merged.extend(rows.into_iter().map(|row| self.rank_row(row, &parsed, now)));
                }
                Branch::Failed(e) => {
                    tracing::warn!(%entity_type, error = %e, "full-text branch failed");
                    warnings.push(format!("{} search failed: {}", entity_type, e));
                    failed_branches.push(entity_type);
                    counts_by_type.insert(entity_type, 0);
                }
                Branch::TimedOut => {
                    timed_out = true;
                    warnings.push(format!("{} search did not finish within the time budget", entity_type));
                    counts_by_type.insert(entity_type, 0);
                }
            }
        }

        if timed_out {
            if let Some(budget) = opts.budget {
                match budget.policy {
                    TimeoutPolicy::Fail => {
                        return Err(SearchError::BudgetExceeded {
                            budget_ms: budget.budget_ms(),
                        });
                    }
                    TimeoutPolicy::Cached => {
                        if let Some(mut cached) =
                            self.cache.get_json::<SearchResponse>(&cache_key).await
                        {
                            cached.from_cache = true;
                            cached.timed_out = true;
                            cached.took_ms = started.elapsed().as_millis() as u64;
                            cached
                                .warnings
                                .push("time budget exceeded, served cached results".to_string());
                            return Ok(cached);
                        }
                        warnings.push("time budget exceeded and no cached results, returning partial results".to_string());
                    }
                    TimeoutPolicy::Partial => {}
                }
            }
        }

        sort_by_rank(&mut merged);
        let total = merged.len();
        let has_more = total > opts.offset.saturating_add(limit);
        let results: Vec<SearchResult> = merged.into_iter().skip(opts.offset).take(limit).collect();

        let response = SearchResponse {
            results,
            total,
            has_more,
            counts_by_type,
            query: QueryDiagnostics::new(&opts.query, &parsed),
            took_ms: started.elapsed().as_millis() as u64,
            warnings,
            failed_branches,
            timed_out,
            from_cache: false,
        };

        tracing::debug!(
            query = %opts.query,
            total,
            took_ms = response.took_ms,
            failed = response.failed_branches.len(),
            "full-text search completed"
        );

        self.record_history(&opts.query, total);
        if caching && !response.timed_out && response.failed_branches.is_empty() {
            self.cache
                .set_json_detached(cache_key, &response, self.settings.result_ttl);
        }

        Ok(response)
    }

    fn rank_row(
        &self,
        row: RecordRow,
        parsed: &ParsedQuery,
        now: chrono::DateTime<Utc>,
    ) -> SearchResult {
        let title = normalize_search_text(&format!("{} {}", row.title_en, row.title_ar));
        let snippet = normalize_search_text(&format!(
            "{} {}",
            row.snippet_en.as_deref().unwrap_or_default(),
            row.snippet_ar.as_deref().unwrap_or_default()
        ));

        let factors = RankingFactors {
            match_quality: row.score,
            title_match: parsed.tokens.iter().any(|t| title.contains(t.as_str())),
            exact_phrase: contains_phrase(parsed, &title) || contains_phrase(parsed, &snippet),
            days_since_update: (now - row.updated_at).num_days(),
            entity_type: row.entity_type,
            is_exact_match: true,
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
            match_type: MatchType::Exact,
        }
    }

    fn record_history(&self, query: &str, result_count: usize) {
        let history = Arc::clone(&self.history);
        let query = query.to_string();
        let normalized = normalize_search_text(&query);
        self.writes.spawn(async move {
            if let Err(e) = history.record_query(&query, &normalized, result_count).await {
                tracing::debug!(error = %e, "failed to record search history");
            }
        });
    }
}

/// Requested types in caller order without duplicates, or all types.
pub(crate) fn requested_types(requested: Option<&[EntityType]>) -> Vec<EntityType> {
    match requested {
        Some(types) if !types.is_empty() => {
            let mut out = Vec::with_capacity(types.len());
            for t in types {
                if !out.contains(t) {
                    out.push(*t);
                }
            }
            out
        }
        _ => EntityType::ALL.to_vec(),
    }
}

fn fingerprint(types: &[EntityType], opts: &SearchOptions, limit: usize) -> String {
    let types: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
    format!(
        "{}|{}|{}|{}|{}",
        types.join(","),
        opts.language.map(|l| l.as_str()).unwrap_or("auto"),
        limit,
        opts.offset,
        opts.include_archived
    )
}

/// A quoted phrase, or the whole multi-term query, occurs verbatim in `text`.
fn contains_phrase(parsed: &ParsedQuery, text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    if parsed
        .tokens
        .iter()
        .any(|t| t.contains(' ') && text.contains(t.as_str()))
    {
        return true;
    }
    parsed.tokens.len() > 1 && text.contains(&parsed.tokens.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_types_dedupes_and_defaults() {
        assert_eq!(requested_types(None), EntityType::ALL.to_vec());
        assert_eq!(requested_types(Some(&[])), EntityType::ALL.to_vec());
        assert_eq!(
            requested_types(Some(&[EntityType::Mou, EntityType::Dossier, EntityType::Mou])),
            vec![EntityType::Mou, EntityType::Dossier]
        );
    }

    #[test]
    fn test_contains_phrase() {
        let quoted = parse_search_query("\"water security\"", Some(Language::En));
        assert!(contains_phrase(&quoted, "regional water security review"));
        assert!(!contains_phrase(&quoted, "security of water"));

        let terms = parse_search_query("climate policy", Some(Language::En));
        assert!(contains_phrase(&terms, "national climate policy"));
        assert!(!contains_phrase(&terms, "policy on climate"));

        let single = parse_search_query("climate", Some(Language::En));
        assert!(!contains_phrase(&single, "climate"));
    }

    #[test]
    fn test_fingerprint_varies_with_page() {
        let mut opts = SearchOptions::new("climate");
        let a = fingerprint(&EntityType::ALL, &opts, 20);
        opts.offset = 20;
        let b = fingerprint(&EntityType::ALL, &opts, 20);
        assert_ne!(a, b);
    }
}
