//! Character memory: items, the per-character store, and the manager that
//! records turns and retrieves context.
//!
//! - **Short-term** — the last N things that happened, in order
//! - **Long-term** — items that were salient enough to survive leaving short-term
//!
//! Items enter only through [`MemoryManager::record_turn`] and only move to
//! long-term through [`crate::eviction::admit`].

pub mod item;
pub mod store;

pub use item::{MemoryDraft, MemoryItem};
pub use store::MemoryStore;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{MemoryConfig, RetrievalConfig};
use crate::delta::StateDelta;
use crate::eviction::{self, Overflow};
use crate::retrieval::RetrievalEngine;
use crate::router::Intent;
use crate::types::{MemoryId, Turn};

/// Result of recording one turn into a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    /// ID of the newly stored item, if the delta carried a memory.
    pub recorded: Option<MemoryId>,
    /// Item flagged stale because the new one supersedes it.
    pub superseded: Option<MemoryId>,
    /// Promotions, evictions and forgetting caused by the insert.
    pub overflow: Vec<Overflow>,
}

/// Records turn outcomes into memory stores and ranks them for prompts.
#[derive(Debug, Clone, Default)]
pub struct MemoryManager {
    config: MemoryConfig,
    retrieval: RetrievalEngine,
}

impl MemoryManager {
    /// Create a manager.
    #[must_use]
    pub fn new(config: MemoryConfig, retrieval: RetrievalConfig) -> Self {
        Self {
            config,
            retrieval: RetrievalEngine::new(retrieval),
        }
    }

    /// Memory capacity settings.
    #[must_use]
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Store the delta's memory candidate (if any) as of turn `now`.
    ///
    /// Blank candidates are ignored. A candidate that supersedes an existing
    /// item flags that item stale before the new one is admitted.
    pub fn record_turn(&self, store: &mut MemoryStore, delta: &StateDelta, now: Turn) -> RecordOutcome {
        let Some(draft) = delta.memory_candidate.as_ref() else {
            return RecordOutcome::default();
        };
        if draft.content.trim().is_empty() {
            return RecordOutcome::default();
        }

        let superseded = draft.supersedes.filter(|old| store.mark_stale(*old));
        let item = MemoryItem::from_draft(draft, now);
        let recorded = item.id;
        debug!(
            character = %delta.character_id,
            id = %recorded,
            salience = item.salience,
            "Recording memory"
        );
        let overflow = eviction::admit(store, item, &self.config);

        RecordOutcome {
            recorded: Some(recorded),
            superseded,
            overflow,
        }
    }

    /// The top-K memories relevant to `intent`, best first.
    #[must_use]
    pub fn retrieve_context(&self, store: &MemoryStore, intent: &Intent, now: Turn) -> Vec<MemoryItem> {
        self.retrieval
            .retrieve(&intent.raw_text, store, now)
            .into_iter()
            .map(|r| r.memory)
            .collect()
    }

    /// Landmark long-term memories in chronological order, for history views.
    #[must_use]
    pub fn history_summary<'a>(&self, store: &'a MemoryStore) -> Vec<&'a MemoryItem> {
        let mut landmarks: Vec<&MemoryItem> = store
            .long_term()
            .iter()
            .filter(|m| !m.stale && m.salience >= self.config.landmark_salience)
            .collect();
        landmarks.sort_by_key(|m| m.timestamp);
        landmarks
    }
}
