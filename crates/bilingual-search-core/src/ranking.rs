//! Result scoring and ordering.
//!
//! Scores fall into two disjoint bands so that any exact match always
//! outranks any semantic or fuzzy match:
//!
//! ```text
//! exact:    clamp(100 + q*40 + title*30 + phrase*20 + recency*10, 100.01, 200)
//! semantic: clamp(q*60 + recency*10 + type_boost*30, 0, 99)
//! ```
//!
//! `recency = max(0, 1 - log10(days + 1) / log10(366))`, so an item updated
//! today gets the full recency weight and anything older than a year gets
//! none.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{EntityType, SearchResult};

/// Lowest score an exact match can receive.
pub const EXACT_FLOOR: f64 = 100.0;
/// Highest score any result can receive.
pub const EXACT_CEILING: f64 = 200.0;
/// Margin that keeps exact scores strictly above [`EXACT_FLOOR`].
pub const EXACT_EPSILON: f64 = 0.01;

const RECENCY_HORIZON_DAYS: f64 = 366.0;

/// Per-row inputs to the scoring formula.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingFactors {
    /// Backend relevance in `[0, 1]`.
    pub match_quality: f64,
    pub title_match: bool,
    pub exact_phrase: bool,
    pub days_since_update: i64,
    pub entity_type: EntityType,
    pub is_exact_match: bool,
}

/// Tunable weights. Defaults are the reference values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
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
    pub entity_boosts: BTreeMap<EntityType, f64>,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            exact_base: 100.0,
            exact_quality: 40.0,
            exact_title: 30.0,
            exact_phrase: 20.0,
            exact_recency: 10.0,
            semantic_quality: 60.0,
            semantic_recency: 10.0,
            semantic_entity: 30.0,
            semantic_cap: 99.0,
            default_entity_boost: 0.5,
            entity_boosts: default_entity_boosts(),
        }
    }
}

/// Reference ordering: dossier > position > engagement > document > person > mou.
pub fn default_entity_boosts() -> BTreeMap<EntityType, f64> {
    BTreeMap::from([
        (EntityType::Dossier, 1.0),
        (EntityType::Position, 0.9),
        (EntityType::Engagement, 0.8),
        (EntityType::Document, 0.7),
        (EntityType::Person, 0.6),
        (EntityType::Mou, 0.5),
    ])
}

/// Applies [`RankingWeights`] to rows. Stateless apart from the weights.
#[derive(Debug, Clone, Default)]
pub struct RankingEngine {
    weights: RankingWeights,
}

impl RankingEngine {
    pub fn new(weights: RankingWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &RankingWeights {
        &self.weights
    }

    pub fn score(&self, factors: &RankingFactors) -> f64 {
        let w = &self.weights;
        let quality = factors.match_quality.clamp(0.0, 1.0);
        let recency = recency_boost(factors.days_since_update);

        if factors.is_exact_match {
            let mut score = w.exact_base + quality * w.exact_quality + recency * w.exact_recency;
            if factors.title_match {
                score += w.exact_title;
            }
            if factors.exact_phrase {
                score += w.exact_phrase;
            }
            score.clamp(EXACT_FLOOR + EXACT_EPSILON, EXACT_CEILING)
        } else {
            let boost = self.entity_type_boost(factors.entity_type);
            let score = quality * w.semantic_quality
                + recency * w.semantic_recency
                + boost * w.semantic_entity;
            score.clamp(0.0, w.semantic_cap.min(EXACT_FLOOR - EXACT_EPSILON))
        }
    }

    pub fn entity_type_boost(&self, entity_type: EntityType) -> f64 {
        self.weights
            .entity_boosts
            .get(&entity_type)
            .copied()
            .unwrap_or(self.weights.default_entity_boost)
    }
}

/// Freshness factor in `[0, 1]`. Future timestamps count as brand new.
pub fn recency_boost(days_since_update: i64) -> f64 {
    if days_since_update < 0 {
        return 1.0;
    }
    let decay = ((days_since_update as f64) + 1.0).log10() / RECENCY_HORIZON_DAYS.log10();
    (1.0 - decay).max(0.0)
}

/// Stable sort, highest score first. Equal scores keep input order.
pub fn sort_by_rank(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.rank_score.total_cmp(&a.rank_score));
}

/// Split into `(exact, semantic)` at the band boundary, each sorted by
/// [`sort_by_rank`].
pub fn separate_match_types(results: Vec<SearchResult>) -> (Vec<SearchResult>, Vec<SearchResult>) {
    let (mut exact, mut semantic): (Vec<_>, Vec<_>) = results
        .into_iter()
        .partition(|r| r.rank_score >= EXACT_FLOOR);
    sort_by_rank(&mut exact);
    sort_by_rank(&mut semantic);
    (exact, semantic)
}
