//! Structured change to one character, decoded from a model reply.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::memory::MemoryDraft;
use crate::types::{CharacterId, EmotionKind, LocationId};

/// A validated-shape (but not yet applied) change to one character's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    /// Character the change applies to.
    pub character_id: CharacterId,
    /// Signed change per emotion, summed onto the current value then clamped.
    pub emotion_changes: BTreeMap<EmotionKind, f32>,
    /// Signed change to affinity toward the player.
    pub affinity_change: f32,
    /// Signed change to this character's standing toward other characters.
    #[serde(default)]
    pub relationship_changes: BTreeMap<CharacterId, f32>,
    /// Where the character moves, if anywhere.
    pub location_change: Option<LocationId>,
    /// What the character should remember from this turn.
    pub memory_candidate: Option<MemoryDraft>,
    /// What the character says or does, shown to the player.
    pub narrative_text: String,
}

impl StateDelta {
    /// A delta that changes nothing and only carries narration.
    #[must_use]
    pub fn narrative(character_id: CharacterId, text: impl Into<String>) -> Self {
        Self {
            character_id,
            emotion_changes: BTreeMap::new(),
            affinity_change: 0.0,
            relationship_changes: BTreeMap::new(),
            location_change: None,
            memory_candidate: None,
            narrative_text: text.into(),
        }
    }

    /// Add an emotion change.
    #[must_use]
    pub fn with_emotion(mut self, kind: EmotionKind, change: f32) -> Self {
        self.emotion_changes.insert(kind, change);
        self
    }

    /// Set the affinity change.
    #[must_use]
    pub fn with_affinity(mut self, change: f32) -> Self {
        self.affinity_change = change;
        self
    }

    /// Add a change in standing toward another character.
    #[must_use]
    pub fn with_relationship(mut self, other: impl Into<String>, change: f32) -> Self {
        self.relationship_changes.insert(CharacterId::new(other), change);
        self
    }

    /// Move the character.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location_change = Some(LocationId::new(location));
        self
    }

    /// Attach a memory candidate.
    #[must_use]
    pub fn with_memory(mut self, draft: MemoryDraft) -> Self {
        self.memory_candidate = Some(draft);
        self
    }

    /// Whether every numeric field is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.affinity_change.is_finite()
            && self.emotion_changes.values().all(|v| v.is_finite())
            && self.relationship_changes.values().all(|v| v.is_finite())
            && self
                .memory_candidate
                .as_ref()
                .is_none_or(|m| m.salience.is_finite())
    }
}
