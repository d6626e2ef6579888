//! Per-request time budgets.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

/// What happens when a budget expires before every branch finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutPolicy {
    /// Return whatever finished and set `timed_out`.
    Partial,
    /// Serve the cached response for the same request if there is one,
    /// otherwise behave like `Partial`.
    Cached,
    /// Return [`SearchError::BudgetExceeded`](crate::error::SearchError::BudgetExceeded).
    Fail,
}

impl FromStr for TimeoutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "partial" => Ok(TimeoutPolicy::Partial),
            "cached" => Ok(TimeoutPolicy::Cached),
            "fail" => Ok(TimeoutPolicy::Fail),
            other => Err(format!("unknown timeout policy: {}", other)),
        }
    }
}

/// A deadline plus what to do when it passes. Callers that want to wait
/// for every branch pass no budget at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBudget {
    pub duration: Duration,
    pub policy: TimeoutPolicy,
}

impl TimeBudget {
    pub fn new(duration: Duration, policy: TimeoutPolicy) -> Self {
        Self { duration, policy }
    }

    pub fn from_millis(ms: u64, policy: TimeoutPolicy) -> Self {
        Self::new(Duration::from_millis(ms), policy)
    }

    pub fn deadline_from(&self, start: Instant) -> Instant {
        start + self.duration
    }

    pub fn budget_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}
