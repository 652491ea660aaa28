//! A single remembered thing, and the draft a model reply proposes.

use serde::{Deserialize, Serialize};

use crate::types::{MemoryId, MemoryKind, Turn};

/// A memory held by exactly one character.
///
/// Items are never edited after creation. A newer item may supersede an older
/// one, which is then flagged `stale` and skipped by retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Unique ID.
    pub id: MemoryId,
    /// What is remembered.
    pub content: String,
    /// Category.
    pub kind: MemoryKind,
    /// Turn on which it was recorded.
    pub timestamp: Turn,
    /// Importance (0.0–1.0). Governs promotion, forgetting and ranking.
    pub salience: f32,
    /// Superseded by a newer item.
    #[serde(default)]
    pub stale: bool,
    /// The older item this one replaces, if any.
    #[serde(default)]
    pub supersedes: Option<MemoryId>,
}

impl MemoryItem {
    /// Create a new memory. Salience is clamped to [0, 1]; non-finite values become 0.
    #[must_use]
    pub fn new(content: impl Into<String>, kind: MemoryKind, timestamp: Turn, salience: f32) -> Self {
        let salience = if salience.is_finite() { salience.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            id: MemoryId::new(),
            content: content.into(),
            kind,
            timestamp,
            salience,
            stale: false,
            supersedes: None,
        }
    }

    /// Materialise a draft at the given turn.
    #[must_use]
    pub fn from_draft(draft: &MemoryDraft, now: Turn) -> Self {
        let mut item = Self::new(draft.content.clone(), draft.kind, now, draft.salience);
        item.supersedes = draft.supersedes;
        item
    }
}

/// A memory proposed by a model reply, not yet stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDraft {
    /// What should be remembered.
    pub content: String,
    /// Category.
    pub kind: MemoryKind,
    /// Proposed importance (0.0–1.0).
    pub salience: f32,
    /// Existing item this replaces.
    pub supersedes: Option<MemoryId>,
}

impl MemoryDraft {
    /// Create an episodic draft.
    #[must_use]
    pub fn episodic(content: impl Into<String>, salience: f32) -> Self {
        Self {
            content: content.into(),
            kind: MemoryKind::Episodic,
            salience,
            supersedes: None,
        }
    }

    /// Mark this draft as replacing an existing item.
    #[must_use]
    pub fn superseding(mut self, id: MemoryId) -> Self {
        self.supersedes = Some(id);
        self
    }
}
