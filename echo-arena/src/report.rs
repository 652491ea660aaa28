//! What the UI receives after each player input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use echo_core::memory::RecordOutcome;
use echo_core::tracker::Applied;
use echo_core::{CharacterId, EmotionKind, LocationId, StateDelta, Turn};

use crate::error::TurnFailure;

/// Result of one player input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnReport {
    /// The turn ran. Entries follow intent order.
    Resolved {
        /// Turn the entries belong to.
        turn: Turn,
        /// One entry per intent.
        entries: Vec<TurnEntry>,
    },
    /// A name matched several characters here; nothing ran and the player
    /// must be asked which one they meant.
    Disambiguation {
        /// The ambiguous text.
        name: String,
        /// Characters it could mean.
        candidates: Vec<CharacterId>,
    },
}

impl TurnReport {
    /// Entries of a resolved turn; empty for a disambiguation request.
    #[must_use]
    pub fn entries(&self) -> &[TurnEntry] {
        match self {
            Self::Resolved { entries, .. } => entries,
            Self::Disambiguation { .. } => &[],
        }
    }

    /// Entry for `id`, if that character took part.
    #[must_use]
    pub fn entry_for(&self, id: &CharacterId) -> Option<&TurnEntry> {
        self.entries().iter().find(|e| e.character_id.as_ref() == Some(id))
    }
}

/// One line of a turn report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEntry {
    /// Responding character; `None` for the environment.
    pub character_id: Option<CharacterId>,
    /// Text to show the player. Empty for failures.
    pub narrative_text: String,
    /// What happened to state.
    pub outcome: EntryOutcome,
}

impl TurnEntry {
    /// An environment narration.
    #[must_use]
    pub fn environment(text: impl Into<String>) -> Self {
        Self {
            character_id: None,
            narrative_text: text.into(),
            outcome: EntryOutcome::Environment,
        }
    }

    /// A failure, attributed to `character` when there is one.
    #[must_use]
    pub fn failed(character: Option<CharacterId>, failure: TurnFailure) -> Self {
        Self {
            character_id: character,
            narrative_text: String::new(),
            outcome: EntryOutcome::Failed(failure),
        }
    }

    /// Whether this entry changed a character's state.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self.outcome, EntryOutcome::Applied(_))
    }
}

/// Outcome of one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum EntryOutcome {
    /// A character's delta was applied.
    Applied(DeltaSummary),
    /// The environment responded (movement, inspection, item use).
    Environment,
    /// No state changed for this entry.
    Failed(TurnFailure),
}

/// Summary of an applied delta, for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaSummary {
    /// Requested emotion changes (before clamping).
    pub emotion_changes: BTreeMap<EmotionKind, f32>,
    /// Emotion intensities after the change.
    pub emotions_after: BTreeMap<EmotionKind, f32>,
    /// Affinity after the change.
    pub affinity_after: f32,
    /// New location, if the character moved.
    pub moved_to: Option<LocationId>,
    /// What happened in memory.
    pub memory: RecordOutcome,
}

impl DeltaSummary {
    /// Summarise `delta` as applied.
    #[must_use]
    pub fn new(delta: &StateDelta, applied: &Applied) -> Self {
        Self {
            emotion_changes: delta.emotion_changes.clone(),
            emotions_after: applied.state.emotions().clone(),
            affinity_after: applied.state.affinity(),
            moved_to: delta.location_change.clone(),
            memory: applied.record.clone(),
        }
    }
}
