//! Errors surfaced to callers of the search services.
//!
//! Everything else (branch failures, embedding outages, cache outages) is
//! reported as a warning inside a successful response.

use bilingual_search_core::query::QueryError;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Invalid(#[from] QueryError),
    #[error("search exceeded its time budget of {budget_ms} ms")]
    BudgetExceeded { budget_ms: u64 },
}

impl SearchError {
    /// True for caller mistakes that must not be retried.
    pub fn is_validation(&self) -> bool {
        matches!(self, SearchError::Invalid(_))
    }
}
