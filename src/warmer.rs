//! Suggestion cache warming.
//!
//! Takes the most frequent queries from recent search history, expands each
//! into its typeahead prefixes, and recomputes the suggestion cache entry
//! for every prefix in every configured scope. Work is done in small
//! concurrent batches with a pause between them to keep load on the record
//! store bounded.

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use bilingual_search_core::models::EntityType;
use bilingual_search_core::store::QueryHistory;
use bilingual_search_core::text::normalize_search_text;

use crate::suggest::{Refresh, SuggestionService};

#[derive(Debug, Clone)]
pub struct WarmerSettings {
    pub interval: Duration,
    pub top_queries: usize,
    pub window: chrono::Duration,
    pub min_prefix_len: usize,
    pub max_prefix_len: usize,
    pub batch_size: usize,
    pub batch_delay: Duration,
    /// `None` is the all-types scope.
    pub scopes: Vec<Option<Vec<EntityType>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WarmingReport {
    pub queries_processed: usize,
    pub prefixes_warmed: usize,
    /// Prefixes that currently match no record and were left uncached.
    pub prefixes_empty: usize,
    pub errors: Vec<String>,
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct CacheWarmer {
    history: Arc<dyn QueryHistory>,
    suggestions: Arc<SuggestionService>,
    settings: WarmerSettings,
    running: Mutex<Option<Running>>,
}

impl CacheWarmer {
    pub fn new(
        history: Arc<dyn QueryHistory>,
        suggestions: Arc<SuggestionService>,
        settings: WarmerSettings,
    ) -> Self {
        Self {
            history,
            suggestions,
            settings,
            running: Mutex::new(None),
        }
    }

    pub async fn run_once(&self) -> WarmingReport {
        let mut report = WarmingReport::default();
        let since = chrono::Utc::now() - self.settings.window;

        let popular = match self
            .history
            .popular_queries(since, self.settings.top_queries)
            .await
        {
            Ok(popular) => popular,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load popular queries");
                report.errors.push(format!("popular queries: {}", e));
                return report;
            }
        };
        report.queries_processed = popular.len();

        let min = self
            .settings
            .min_prefix_len
            .max(self.suggestions.min_prefix_len());
        let mut seen = HashSet::new();
        let mut prefixes = Vec::new();
        for entry in &popular {
            for prefix in prefixes_for(&entry.query, min, self.settings.max_prefix_len) {
                if seen.insert(prefix.clone()) {
                    prefixes.push(prefix);
                }
            }
        }

        let jobs: Vec<(&str, Option<&[EntityType]>)> = prefixes
            .iter()
            .flat_map(|p| {
                self.settings
                    .scopes
                    .iter()
                    .map(move |scope| (p.as_str(), scope.as_deref()))
            })
            .collect();

        let batch_size = self.settings.batch_size.max(1);
        for (i, batch) in jobs.chunks(batch_size).enumerate() {
            if i > 0 && !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|&(prefix, scope)| self.suggestions.refresh(prefix, scope, None)),
            )
            .await;
            for (&(prefix, scope), outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Refresh::Warmed => report.prefixes_warmed += 1,
                    Refresh::Empty => report.prefixes_empty += 1,
                    Refresh::Failed => report
                        .errors
                        .push(format!("failed to warm '{}' ({})", prefix, scope_label(scope))),
                }
            }
        }

        tracing::info!(
            queries = report.queries_processed,
            warmed = report.prefixes_warmed,
            errors = report.errors.len(),
            "cache warming finished"
        );
        report
    }

    pub fn start(self: &Arc<Self>) {
        let mut running = self.running.lock();
        if running.is_some() {
            tracing::warn!("cache warmer already running");
            return;
        }

        let (shutdown, mut stop) = watch::channel(false);
        let warmer = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(warmer.settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        warmer.run_once().await;
                    }
                    _ = stop.changed() => break,
                }
            }
        });

        *running = Some(Running { shutdown, handle });
    }

    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };
        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            tracing::error!(error = %e, "cache warmer task panicked");
        }
    }
}

fn scope_label(scope: Option<&[EntityType]>) -> String {
    match scope {
        None => "all".to_string(),
        Some(types) => types
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join("+"),
    }
}

/// Every prefix of the normalized query between `min` and `max` characters
/// long. Prefixes ending in whitespace are skipped since they normalize to
/// the shorter prefix.
pub fn prefixes_for(query: &str, min: usize, max: usize) -> Vec<String> {
    let normalized = normalize_search_text(query);
    let chars: Vec<char> = normalized.chars().collect();
    let upper = max.min(chars.len());
    let lower = min.max(1);

    (lower..=upper)
        .filter(|&len| !chars[len - 1].is_whitespace())
        .map(|len| chars[..len].iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_for_ascii() {
        assert_eq!(prefixes_for("Water", 2, 15), vec!["wa", "wat", "wate", "water"]);
    }

    #[test]
    fn test_prefixes_for_respects_max_and_spaces() {
        let p = prefixes_for("the sea", 2, 5);
        assert_eq!(p, vec!["th", "the", "the s"]);
    }

    #[test]
    fn test_prefixes_for_counts_characters() {
        let p = prefixes_for("مياه", 2, 15);
        assert_eq!(p, vec!["مي", "ميا", "مياه"]);
    }

    #[test]
    fn test_prefixes_for_short_query() {
        assert!(prefixes_for("a", 2, 15).is_empty());
        assert!(prefixes_for("", 2, 15).is_empty());
    }
}
