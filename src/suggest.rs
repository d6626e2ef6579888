//! Typeahead suggestions, cache first.
//!
//! A miss queries every requested entity type concurrently, scores each
//! candidate against its English and Arabic titles, and caches the full
//! sorted list under `suggest:{scope}:{lang}:{prefix}`. The requested
//! `limit` is applied after the cache so one entry serves every page size.
//! Empty lists are never cached, so a prefix starts matching as soon as a
//! record for it exists.

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bilingual_search_core::models::{
    EntityType, Language, PopularQuery, Suggestion, SuggestionCandidate,
};
use bilingual_search_core::store::{QueryHistory, RecordStore};
use bilingual_search_core::suggest::{levenshtein_similarity, score_suggestion, SuggestionScore};
use bilingual_search_core::text::normalize_search_text;

use crate::cache::{suggestion_key, Cache};
use crate::search::requested_types;

#[derive(Debug, Clone)]
pub struct SuggestOptions {
    pub prefix: String,
    pub entity_types: Option<Vec<EntityType>>,
    /// Restricts scoring to one title. `None` takes the better of both.
    pub language: Option<Language>,
    pub limit: usize,
}

impl SuggestOptions {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entity_types: None,
            language: None,
            limit: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub suggestions: Vec<Suggestion>,
    pub cache_hit: bool,
    pub failed_branches: Vec<EntityType>,
}

/// Result of [`SuggestionService::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    Warmed,
    /// Nothing matches the prefix; any stale entry was removed.
    Empty,
    Failed,
}

#[derive(Debug, Clone)]
pub struct NoResultsOptions {
    pub query: String,
    pub entity_types: Option<Vec<EntityType>>,
    /// Language of the search tips. English when unspecified.
    pub language: Option<Language>,
}

impl NoResultsOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            entity_types: None,
            language: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypoCorrection {
    pub original: String,
    pub corrected: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoResultsSuggestions {
    pub original_query: String,
    pub typo_corrections: Vec<TypoCorrection>,
    pub popular_searches: Vec<PopularQuery>,
    pub search_tips: Vec<String>,
    pub failed_branches: Vec<EntityType>,
}

#[derive(Debug, Clone)]
pub struct SuggestSettings {
    pub min_prefix_len: usize,
    pub candidates_per_type: usize,
    pub ttl: Duration,
    /// Corrections need at least this Levenshtein similarity.
    pub correction_threshold: f64,
    pub max_corrections: usize,
    pub max_popular: usize,
    /// Past searches considered for corrections and popular searches.
    pub history_window: chrono::Duration,
    pub history_candidates: usize,
}

impl Default for SuggestSettings {
    fn default() -> Self {
        Self {
            min_prefix_len: 2,
            candidates_per_type: 20,
            ttl: Duration::from_secs(300),
            correction_threshold: 0.6,
            max_corrections: 3,
            max_popular: 5,
            history_window: chrono::Duration::days(30),
            history_candidates: 50,
        }
    }
}

pub struct SuggestionService {
    records: Arc<dyn RecordStore>,
    history: Arc<dyn QueryHistory>,
    cache: Arc<Cache>,
    settings: SuggestSettings,
}

impl SuggestionService {
    pub fn new(
        records: Arc<dyn RecordStore>,
        history: Arc<dyn QueryHistory>,
        cache: Arc<Cache>,
        settings: SuggestSettings,
    ) -> Self {
        Self {
            records,
            history,
            cache,
            settings,
        }
    }

    pub fn min_prefix_len(&self) -> usize {
        self.settings.min_prefix_len
    }

    pub async fn suggest(&self, opts: &SuggestOptions) -> SuggestResponse {
        let Some(prefix) = self.usable_prefix(&opts.prefix) else {
            return SuggestResponse::default();
        };
        let types = requested_types(opts.entity_types.as_deref());
        let key = suggestion_key(&scope(&types), opts.language, &prefix);

        match self.cache.get_json::<Vec<Suggestion>>(&key).await {
            Some(mut cached) if !cached.is_empty() => {
                cached.truncate(opts.limit);
                return SuggestResponse {
                    suggestions: cached,
                    cache_hit: true,
                    failed_branches: Vec::new(),
                };
            }
            _ => {}
        }

        let (mut suggestions, failed_branches) = self.compute(&prefix, &types, opts.language).await;
        if failed_branches.is_empty() && !suggestions.is_empty() {
            self.cache
                .set_json_detached(key, &suggestions, self.settings.ttl);
        }
        suggestions.truncate(opts.limit);

        SuggestResponse {
            suggestions,
            cache_hit: false,
            failed_branches,
        }
    }

    /// Recompute and overwrite the cache entry, ignoring any cached value.
    /// A prefix that now matches nothing has its entry removed.
    pub async fn refresh(
        &self,
        prefix: &str,
        entity_types: Option<&[EntityType]>,
        language: Option<Language>,
    ) -> Refresh {
        let Some(prefix) = self.usable_prefix(prefix) else {
            return Refresh::Failed;
        };
        let types = requested_types(entity_types);
        let (suggestions, failed) = self.compute(&prefix, &types, language).await;
        if !failed.is_empty() {
            return Refresh::Failed;
        }
        let key = suggestion_key(&scope(&types), language, &prefix);
        if suggestions.is_empty() {
            self.cache.delete(&key).await;
            return Refresh::Empty;
        }
        if self.cache.set_json(&key, &suggestions, self.settings.ttl).await {
            Refresh::Warmed
        } else {
            Refresh::Failed
        }
    }

    /// Recovery hints for a search that found nothing: close spellings
    /// from record titles and past searches, popular searches, and tips.
    pub async fn no_results(&self, opts: &NoResultsOptions) -> NoResultsSuggestions {
        let language = opts.language.unwrap_or(Language::En);
        let mut out = NoResultsSuggestions {
            original_query: opts.query.clone(),
            search_tips: search_tips(language),
            ..NoResultsSuggestions::default()
        };

        let query = normalize_search_text(&opts.query);
        if query.chars().count() < self.settings.min_prefix_len.max(2) {
            return out;
        }

        let types = requested_types(opts.entity_types.as_deref());
        let stem: String = query.chars().take(3).collect();
        let since = Utc::now() - self.settings.history_window;

        let titles = join_all(types.iter().map(|&entity_type| {
            let stem = stem.as_str();
            async move {
                (
                    entity_type,
                    self.records
                        .suggestion_candidates(entity_type, stem, self.settings.candidates_per_type)
                        .await,
                )
            }
        }));
        let popular = self
            .history
            .popular_queries(since, self.settings.history_candidates);
        let (titles, popular) = tokio::join!(titles, popular);

        let mut texts: Vec<String> = Vec::new();
        for (entity_type, result) in titles {
            match result {
                Ok(candidates) => {
                    for c in candidates {
                        texts.push(c.title_en);
                        texts.push(c.title_ar);
                    }
                }
                Err(e) => {
                    tracing::warn!(%entity_type, error = %e, "correction branch failed");
                    out.failed_branches.push(entity_type);
                }
            }
        }

        let popular = popular.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load popular queries");
            Vec::new()
        });
        texts.extend(popular.iter().map(|p| p.query.clone()));
        out.typo_corrections = corrections(
            &opts.query,
            &query,
            texts,
            self.settings.correction_threshold,
            self.settings.max_corrections,
        );

        out.popular_searches = popular
            .into_iter()
            .filter(|p| p.query != query)
            .take(self.settings.max_popular)
            .collect();
        out
    }

    fn usable_prefix(&self, raw: &str) -> Option<String> {
        let prefix = normalize_search_text(raw);
        (prefix.chars().count() >= self.settings.min_prefix_len.max(1)).then_some(prefix)
    }

    async fn compute(
        &self,
        prefix: &str,
        types: &[EntityType],
        language: Option<Language>,
    ) -> (Vec<Suggestion>, Vec<EntityType>) {
        let branches = types.iter().map(|&entity_type| async move {
            (
                entity_type,
                self.records
                    .suggestion_candidates(entity_type, prefix, self.settings.candidates_per_type)
                    .await,
            )
        });

        let mut suggestions = Vec::new();
        let mut failed = Vec::new();
        for (entity_type, result) in join_all(branches).await {
            match result {
                Ok(candidates) => suggestions.extend(
                    candidates
                        .into_iter()
                        .map(|c| to_suggestion(prefix, c, language))
                        .filter(|s| s.score > 0.0),
                ),
                Err(e) => {
                    tracing::warn!(%entity_type, error = %e, "suggestion branch failed");
                    failed.push(entity_type);
                }
            }
        }

        suggestions.sort_by(|a, b| b.score.total_cmp(&a.score));
        (suggestions, failed)
    }
}

/// Cache scope: `all` for the full type set, otherwise the type names.
fn scope(types: &[EntityType]) -> String {
    if types.len() == EntityType::ALL.len() {
        return "all".to_string();
    }
    types.iter().map(|t| t.as_str()).collect::<Vec<_>>().join("+")
}

fn to_suggestion(prefix: &str, candidate: SuggestionCandidate, language: Option<Language>) -> Suggestion {
    let best = match language {
        Some(Language::En) => score_suggestion(prefix, &candidate.title_en),
        Some(Language::Ar) => score_suggestion(prefix, &candidate.title_ar),
        None => better(
            score_suggestion(prefix, &candidate.title_en),
            score_suggestion(prefix, &candidate.title_ar),
        ),
    };
    Suggestion {
        id: candidate.id,
        entity_type: candidate.entity_type,
        title_en: candidate.title_en,
        title_ar: candidate.title_ar,
        preview_en: candidate.preview_en,
        preview_ar: candidate.preview_ar,
        score: best.score,
        match_position: best.match_position,
    }
}

fn better(a: SuggestionScore, b: SuggestionScore) -> SuggestionScore {
    if b.score > a.score {
        b
    } else {
        a
    }
}

/// Distinct texts close to, but not equal to, the normalized query, best first.
fn corrections(
    original: &str,
    normalized: &str,
    texts: Vec<String>,
    threshold: f64,
    max: usize,
) -> Vec<TypoCorrection> {
    let mut seen = HashSet::new();
    let mut out: Vec<TypoCorrection> = texts
        .into_iter()
        .filter(|t| !t.trim().is_empty())
        .filter(|t| seen.insert(normalize_search_text(t)))
        .filter_map(|text| {
            let similarity = levenshtein_similarity(normalized, &text);
            (similarity >= threshold && similarity < 1.0).then(|| TypoCorrection {
                original: original.to_string(),
                corrected: text,
                similarity,
            })
        })
        .collect();
    out.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    out.truncate(max);
    out
}

fn search_tips(language: Language) -> Vec<String> {
    let tips: [&str; 4] = match language {
        Language::Ar => [
            "جرب كلمات مفتاحية مختلفة",
            "تحقق من الإملاء",
            "استخدم مصطلحات أعم",
            "جرب البحث بلغة أخرى",
        ],
        Language::En => [
            "Try different keywords",
            "Check your spelling",
            "Use broader terms",
            "Try searching in another language",
        ],
    };
    tips.iter().map(|t| t.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(en: &str, ar: &str) -> SuggestionCandidate {
        SuggestionCandidate {
            id: "c1".into(),
            entity_type: EntityType::Dossier,
            title_en: en.into(),
            title_ar: ar.into(),
            preview_en: None,
            preview_ar: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_scope_names() {
        assert_eq!(scope(&EntityType::ALL), "all");
        assert_eq!(scope(&[EntityType::Dossier]), "dossier");
        assert_eq!(
            scope(&[EntityType::Dossier, EntityType::Position]),
            "dossier+position"
        );
    }

    #[test]
    fn test_best_title_wins_without_language() {
        let s = to_suggestion("مياه", candidate("Regional water", "مياه إقليمية"), None);
        assert_eq!(s.match_position, 0);
        assert!(s.score >= 0.9);
    }

    #[test]
    fn test_language_restricts_scored_title() {
        let s = to_suggestion(
            "مياه",
            candidate("Regional water", "مياه إقليمية"),
            Some(Language::En),
        );
        assert!(s.score < 0.5);
    }

    #[test]
    fn test_corrections_skip_exact_and_distant() {
        let texts = vec![
            "Water".to_string(),
            "water".to_string(),
            "Waiter".to_string(),
            "Energy".to_string(),
            "watr".to_string(),
        ];
        let out = corrections("Watter", "watter", texts, 0.6, 3);
        let corrected: Vec<&str> = out.iter().map(|c| c.corrected.as_str()).collect();
        assert_eq!(corrected, vec!["Water", "Waiter", "watr"]);
        assert!(out.iter().all(|c| c.original == "Watter"));
        assert!(out.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn test_search_tips_follow_language() {
        assert_eq!(search_tips(Language::En)[1], "Check your spelling");
        assert_eq!(search_tips(Language::Ar)[1], "تحقق من الإملاء");
    }
}
