//! Per-factor scoring functions for memory retrieval.
//!
//! Score = w₁·Recency(m) + w₂·Salience(m) + w₃·Relevance(m)
//!
//! Where:
//!   Recency(m)   = exp(-λ · ΔT)            ΔT in turns
//!   Salience(m)  = stored salience (0–1)
//!   Relevance(m) = |bigrams(query) ∩ bigrams(m)| / |bigrams(query)|
//!
//! Relevance works on character bigrams so it needs no word segmentation and
//! behaves the same for Japanese and English text.

use std::collections::BTreeSet;

use crate::config::RetrievalConfig;
use crate::memory::MemoryItem;
use crate::retrieval::ScoreBreakdown;
use crate::types::Turn;

/// Compute the full score breakdown for a single memory.
#[must_use]
pub fn compute_breakdown(
    memory: &MemoryItem,
    query: &QueryTerms,
    now: Turn,
    config: &RetrievalConfig,
) -> ScoreBreakdown {
    ScoreBreakdown {
        recency: config.recency_weight * recency_score(memory, now, config.recency_decay),
        salience: config.salience_weight * f64::from(memory.salience.clamp(0.0, 1.0)),
        relevance: config.relevance_weight * query.overlap(&memory.content),
    }
}

/// Recency: exponential decay over elapsed turns.
#[allow(clippy::cast_precision_loss)]
fn recency_score(memory: &MemoryItem, now: Turn, lambda: f64) -> f64 {
    let age = now.since(memory.timestamp) as f64;
    (-lambda * age).exp()
}

/// Pre-tokenised query text.
#[derive(Debug, Clone, Default)]
pub struct QueryTerms {
    grams: BTreeSet<(char, char)>,
}

impl QueryTerms {
    /// Tokenise a query.
    #[must_use]
    pub fn new(text: &str) -> Self {
        Self { grams: bigrams(text) }
    }

    /// Whether the query has no usable terms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grams.is_empty()
    }

    /// Share of the query's bigrams that also appear in `text` (0–1).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn overlap(&self, text: &str) -> f64 {
        if self.grams.is_empty() {
            return 0.0;
        }
        let other = bigrams(text);
        let shared = self.grams.intersection(&other).count();
        shared as f64 / self.grams.len() as f64
    }
}

/// Lower-cased alphanumeric character bigrams. Punctuation and whitespace
/// split runs; a run of one character contributes `(c, c)`.
fn bigrams(text: &str) -> BTreeSet<(char, char)> {
    let mut grams = BTreeSet::new();
    let lowered = text.to_lowercase();
    for run in lowered.split(|c: char| !c.is_alphanumeric()) {
        let chars: Vec<char> = run.chars().collect();
        match chars.as_slice() {
            [] => {}
            [single] => {
                grams.insert((*single, *single));
            }
            _ => {
                for pair in chars.windows(2) {
                    grams.insert((pair[0], pair[1]));
                }
            }
        }
    }
    grams
}
