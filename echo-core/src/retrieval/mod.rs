//! Memory Retrieval — weighted ranking over a character's memory store.
//!
//! Candidates are every non-stale item in `long_term ∪ short_term`. The
//! ordering is total: score descending, then newer timestamp, then store
//! order (long-term before short-term, oldest first within a tier). The same
//! store and query therefore always yield the same list.

pub mod scoring;

use crate::config::RetrievalConfig;
use crate::memory::{MemoryItem, MemoryStore};
use crate::types::{RetrievalScore, Turn};

use self::scoring::QueryTerms;

/// A scored retrieval result.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    /// The retrieved memory.
    pub memory: MemoryItem,
    /// Combined retrieval score.
    pub score: RetrievalScore,
    /// Per-factor breakdown.
    pub breakdown: ScoreBreakdown,
}

/// Breakdown of a retrieval score into its weighted component factors.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreBreakdown {
    /// Recency contribution.
    pub recency: f64,
    /// Salience contribution.
    pub salience: f64,
    /// Textual relevance contribution.
    pub relevance: f64,
}

impl ScoreBreakdown {
    /// Sum of the weighted factors.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.recency + self.salience + self.relevance
    }
}

/// Ranks memories against a query.
#[derive(Debug, Clone, Default)]
pub struct RetrievalEngine {
    config: RetrievalConfig,
}

impl RetrievalEngine {
    /// Create a new retrieval engine with the given configuration.
    #[must_use]
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve the top-K memories for `query` as of turn `now`.
    ///
    /// An empty store yields an empty list.
    #[must_use]
    pub fn retrieve(&self, query: &str, store: &MemoryStore, now: Turn) -> Vec<RetrievalResult> {
        let terms = QueryTerms::new(query);

        let mut scored: Vec<(usize, RetrievalResult)> = store
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.stale)
            .map(|(order, memory)| {
                let breakdown = scoring::compute_breakdown(memory, &terms, now, &self.config);
                let result = RetrievalResult {
                    memory: memory.clone(),
                    score: RetrievalScore::new(breakdown.total()),
                    breakdown,
                };
                (order, result)
            })
            .collect();

        scored.sort_by(|(ia, a), (ib, b)| {
            b.score
                .cmp(&a.score)
                .then(b.memory.timestamp.cmp(&a.memory.timestamp))
                .then(ia.cmp(ib))
        });
        scored.truncate(self.config.top_k);
        scored.into_iter().map(|(_, r)| r).collect()
    }
}
