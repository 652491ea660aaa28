//! Character persona and mutable per-character state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::StateBounds;
use crate::memory::MemoryStore;
use crate::types::{CharacterId, EmotionKind, ItemId, LocationId};

/// Immutable character template, shared between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Display name, matched against player text.
    pub name: String,
    /// Other names the player may use (nicknames, titles).
    #[serde(default)]
    pub aliases: Vec<String>,
    /// One-line description.
    pub description: String,
    /// Personality summary.
    pub personality: String,
    /// Background story.
    #[serde(default)]
    pub background: String,
}

impl Persona {
    /// Create a persona.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        personality: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: description.into(),
            personality: personality.into(),
            background: String::new(),
        }
    }

    /// Add an alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Set the background story.
    #[must_use]
    pub fn with_background(mut self, background: impl Into<String>) -> Self {
        self.background = background.into();
        self
    }
}

/// Mutable state of one character for the duration of a session.
///
/// Built at load time, then owned by the tracker; every later change goes
/// through [`crate::tracker::StateTracker::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterState {
    id: CharacterId,
    persona: Arc<Persona>,
    #[serde(default)]
    emotions: BTreeMap<EmotionKind, f32>,
    #[serde(default)]
    affinity: f32,
    #[serde(default)]
    relationships: BTreeMap<CharacterId, f32>,
    location: LocationId,
    #[serde(default)]
    inventory: BTreeSet<ItemId>,
    #[serde(default)]
    memory: MemoryStore,
}

impl CharacterState {
    /// Create a character with neutral emotions and affinity.
    #[must_use]
    pub fn new(id: impl Into<String>, persona: Arc<Persona>, location: impl Into<String>) -> Self {
        Self {
            id: CharacterId::new(id),
            persona,
            emotions: BTreeMap::new(),
            affinity: 0.0,
            relationships: BTreeMap::new(),
            location: LocationId::new(location),
            inventory: BTreeSet::new(),
            memory: MemoryStore::default(),
        }
    }

    /// Set an initial emotion intensity (clamped to the default range).
    #[must_use]
    pub fn with_emotion(mut self, kind: EmotionKind, value: f32) -> Self {
        self.emotions.insert(kind, StateBounds::default().clamp_emotion(finite_or_zero(value)));
        self
    }

    /// Set the initial affinity (clamped to the default range).
    #[must_use]
    pub fn with_affinity(mut self, value: f32) -> Self {
        self.affinity = StateBounds::default().clamp_affinity(finite_or_zero(value));
        self
    }

    /// Set the initial standing toward another character (clamped like affinity).
    #[must_use]
    pub fn with_relationship(mut self, other: impl Into<String>, value: f32) -> Self {
        self.relationships.insert(
            CharacterId::new(other),
            StateBounds::default().clamp_affinity(finite_or_zero(value)),
        );
        self
    }

    /// Give the character an item.
    #[must_use]
    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.inventory.insert(ItemId::new(item));
        self
    }

    /// Character ID.
    #[must_use]
    pub fn id(&self) -> &CharacterId {
        &self.id
    }

    /// Persona template.
    #[must_use]
    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    /// Shared handle to the persona template.
    #[must_use]
    pub fn persona_handle(&self) -> Arc<Persona> {
        Arc::clone(&self.persona)
    }

    /// Current intensity of an emotion (0 when never set).
    #[must_use]
    pub fn emotion(&self, kind: EmotionKind) -> f32 {
        self.emotions.get(&kind).copied().unwrap_or(0.0)
    }

    /// All explicitly set emotions.
    #[must_use]
    pub fn emotions(&self) -> &BTreeMap<EmotionKind, f32> {
        &self.emotions
    }

    /// Emotions above `threshold`, strongest first.
    #[must_use]
    pub fn salient_emotions(&self, threshold: f32) -> Vec<(EmotionKind, f32)> {
        let mut out: Vec<(EmotionKind, f32)> = self
            .emotions
            .iter()
            .filter(|(_, v)| **v > threshold)
            .map(|(k, v)| (*k, *v))
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        out
    }

    /// Relationship toward the player.
    #[must_use]
    pub fn affinity(&self) -> f32 {
        self.affinity
    }

    /// Standing toward another character (0 when they have never interacted).
    #[must_use]
    pub fn relationship(&self, other: &CharacterId) -> f32 {
        self.relationships.get(other).copied().unwrap_or(0.0)
    }

    /// Every recorded relationship.
    #[must_use]
    pub fn relationships(&self) -> &BTreeMap<CharacterId, f32> {
        &self.relationships
    }

    /// Where the character stands.
    #[must_use]
    pub fn location(&self) -> &LocationId {
        &self.location
    }

    /// Items carried.
    #[must_use]
    pub fn inventory(&self) -> &BTreeSet<ItemId> {
        &self.inventory
    }

    /// The character's memory.
    #[must_use]
    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub(crate) fn memory_mut(&mut self) -> &mut MemoryStore {
        &mut self.memory
    }

    pub(crate) fn set_emotions(&mut self, emotions: BTreeMap<EmotionKind, f32>) {
        self.emotions = emotions;
    }

    pub(crate) fn set_affinity(&mut self, affinity: f32) {
        self.affinity = affinity;
    }

    pub(crate) fn set_relationships(&mut self, relationships: BTreeMap<CharacterId, f32>) {
        self.relationships = relationships;
    }

    pub(crate) fn set_location(&mut self, location: LocationId) {
        self.location = location;
    }

    /// Re-clamp every value into `bounds` (used when a character is loaded).
    pub(crate) fn clamp_into(&mut self, bounds: &StateBounds) {
        for value in self.emotions.values_mut() {
            *value = bounds.clamp_emotion(finite_or_zero(*value));
        }
        self.affinity = bounds.clamp_affinity(finite_or_zero(self.affinity));
        for value in self.relationships.values_mut() {
            *value = bounds.clamp_affinity(finite_or_zero(*value));
        }
    }

    /// Whether every value lies within `bounds`.
    #[must_use]
    pub fn within(&self, bounds: &StateBounds) -> bool {
        let emotions_ok = self
            .emotions
            .values()
            .all(|v| v.is_finite() && (bounds.emotion_min..=bounds.emotion_max).contains(v));
        let affinity_ok = |v: &f32| v.is_finite() && (bounds.affinity_min..=bounds.affinity_max).contains(v);
        emotions_ok && affinity_ok(&self.affinity) && self.relationships.values().all(affinity_ok)
    }
}

fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() { value } else { 0.0 }
}
