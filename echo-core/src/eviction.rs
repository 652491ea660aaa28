//! Short-term overflow and long-term forgetting.
//!
//! ```text
//! new item ──▶ ┌────────────┐  oldest, salience > threshold  ┌───────────┐
//!              │ short-term │ ─────────────────────────────▶ │ long-term │ ──▶ forgotten
//!              │ (N items)  │                                │ (cap M)   │     (least salient)
//!              └────────────┘ ──▶ evicted (otherwise)        └───────────┘
//! ```
//!
//! Long-term memory is only ever fed from short-term, so every long-term
//! item was once short-term. Overflow is policy, never an error.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MemoryConfig;
use crate::memory::{MemoryItem, MemoryStore};
use crate::types::MemoryId;

/// What happened to an item pushed out of a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Overflow {
    /// Left short-term and moved to long-term.
    Promoted(MemoryId),
    /// Left short-term and was discarded.
    Evicted(MemoryId),
    /// Dropped from long-term to respect its capacity.
    Forgotten(MemoryId),
}

/// Admit a new item into short-term memory, resolving any overflow.
///
/// Returns every promotion / eviction / forgetting that happened, in order.
pub fn admit(store: &mut MemoryStore, item: MemoryItem, config: &MemoryConfig) -> Vec<Overflow> {
    store.push_short_term(item);

    let mut outcome = Vec::new();
    while store.short_term().len() > config.short_term_capacity.max(1) {
        let Some(oldest) = store.pop_oldest_short_term() else {
            break;
        };
        if oldest.salience > config.promotion_threshold {
            debug!(id = %oldest.id, salience = oldest.salience, "Promoting memory to long-term");
            outcome.push(Overflow::Promoted(oldest.id));
            store.push_long_term(oldest);
        } else {
            debug!(id = %oldest.id, salience = oldest.salience, "Evicting short-term memory");
            outcome.push(Overflow::Evicted(oldest.id));
        }
    }

    outcome.extend(enforce_long_term_cap(store, config.long_term_capacity));
    outcome
}

/// Drop the least salient long-term items (oldest first on ties) until the
/// tier fits in `capacity`.
fn enforce_long_term_cap(store: &mut MemoryStore, capacity: usize) -> Vec<Overflow> {
    let mut forgotten = Vec::new();
    let long_term = store.long_term_mut();
    while long_term.len() > capacity {
        let weakest = long_term
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.salience
                    .total_cmp(&b.salience)
                    .then(a.timestamp.cmp(&b.timestamp))
            })
            .map(|(idx, _)| idx);
        let Some(idx) = weakest else {
            break;
        };
        let item = long_term.remove(idx);
        debug!(id = %item.id, salience = item.salience, "Forgetting long-term memory");
        forgotten.push(Overflow::Forgotten(item.id));
    }
    forgotten
}
