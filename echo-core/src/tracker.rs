//! State Tracker — the single authority for mutating session state.
//!
//! World and characters live behind one lock per session. [`StateTracker::apply`]
//! validates a whole delta before touching anything, so a rejected delta
//! leaves the session exactly as it was.
//!
//! Per-character phases during a turn:
//!
//! ```text
//! Idle ──begin──▶ Processing ──apply / reject──▶ Resolved ──settle──▶ Idle
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::character::CharacterState;
use crate::config::{EchoConfig, StateBounds};
use crate::delta::StateDelta;
use crate::error::{CoreError, Result};
use crate::memory::{MemoryManager, RecordOutcome};
use crate::snapshot::SessionSnapshot;
use crate::types::{CharacterId, EmotionKind, LocationId, Turn, Weather};
use crate::world::WorldState;

/// Where a character is within the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPhase {
    /// Not involved in a turn.
    Idle,
    /// Waiting on its model reply.
    Processing,
    /// Reply applied or rejected; waiting for the turn to close.
    Resolved,
}

/// A successfully applied delta.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// The character's state after the change.
    pub state: CharacterState,
    /// What happened in memory.
    pub record: RecordOutcome,
}

#[derive(Debug)]
struct SessionState {
    world: WorldState,
    characters: BTreeMap<CharacterId, CharacterState>,
    phases: BTreeMap<CharacterId, TurnPhase>,
}

/// Shared handle to one session's state. Cloning shares the same state.
#[derive(Debug, Clone)]
pub struct StateTracker {
    inner: Arc<Mutex<SessionState>>,
    bounds: StateBounds,
    memory: MemoryManager,
    require_adjacent_moves: bool,
    event_log_capacity: usize,
}

impl StateTracker {
    /// Start a session over `world` with no characters yet.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidState` if the world violates its invariants.
    pub fn new(world: WorldState, config: &EchoConfig) -> Result<Self> {
        world.check_invariants(&BTreeMap::new())?;
        Ok(Self {
            inner: Arc::new(Mutex::new(SessionState {
                world,
                characters: BTreeMap::new(),
                phases: BTreeMap::new(),
            })),
            bounds: config.bounds,
            memory: MemoryManager::new(config.memory.clone(), config.retrieval.clone()),
            require_adjacent_moves: config.turn.require_adjacent_moves,
            event_log_capacity: config.turn.event_log_capacity,
        })
    }

    /// Start a session from a saved snapshot.
    ///
    /// # Errors
    /// Returns an error if the snapshot fails validation.
    pub fn from_snapshot(snapshot: SessionSnapshot, config: &EchoConfig) -> Result<Self> {
        snapshot.validate(&config.bounds)?;
        let phases = snapshot.characters.keys().map(|id| (id.clone(), TurnPhase::Idle)).collect();
        Ok(Self {
            inner: Arc::new(Mutex::new(SessionState {
                world: snapshot.world,
                characters: snapshot.characters,
                phases,
            })),
            bounds: config.bounds,
            memory: MemoryManager::new(config.memory.clone(), config.retrieval.clone()),
            require_adjacent_moves: config.turn.require_adjacent_moves,
            event_log_capacity: config.turn.event_log_capacity,
        })
    }

    /// Value bounds enforced on every update.
    #[must_use]
    pub fn bounds(&self) -> &StateBounds {
        &self.bounds
    }

    /// The memory manager used to record turns.
    #[must_use]
    pub fn memory_manager(&self) -> &MemoryManager {
        &self.memory
    }

    /// Load a character into the session, placing it at its location.
    ///
    /// Emotion and affinity values are clamped into the configured bounds.
    ///
    /// # Errors
    /// Returns an error if the ID is already taken or the location is unknown.
    pub fn add_character(&self, mut character: CharacterState) -> Result<()> {
        let mut state = self.inner.lock();
        let id = character.id().clone();
        if state.characters.contains_key(&id) {
            return Err(CoreError::InvalidState(format!("character '{id}' already loaded")));
        }
        if !state.world.contains(character.location()) {
            return Err(CoreError::UnknownLocation {
                character: id,
                location: character.location().clone(),
            });
        }
        character.clamp_into(&self.bounds);
        state.world.place(&id, character.location());
        info!(character = %id, location = %character.location(), "Character loaded");
        state.phases.insert(id.clone(), TurnPhase::Idle);
        state.characters.insert(id, character);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Delta application
    // -----------------------------------------------------------------------

    /// Apply one delta atomically and return the character's new state.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidDelta`] (state untouched) if the character
    /// is unknown, a value is not finite, the location does not exist (or is
    /// not adjacent when adjacency is required), or the memory supersedes an
    /// item the character does not hold.
    pub fn apply(&self, delta: &StateDelta) -> Result<CharacterState> {
        self.apply_with_outcome(delta).map(|applied| applied.state)
    }

    /// Like [`Self::apply`], also reporting what happened in memory.
    ///
    /// Outside a turn (phase `Idle`) the delta is applied without a phase
    /// change; inside a turn it moves the character `Processing → Resolved`.
    ///
    /// # Errors
    /// See [`Self::apply`]. Also fails with `InvalidTransition` if the
    /// character was already resolved this turn.
    pub fn apply_with_outcome(&self, delta: &StateDelta) -> Result<Applied> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let id = &delta.character_id;
        let invalid = |reason: String| CoreError::InvalidDelta {
            character: id.clone(),
            reason,
        };

        // -- validate -------------------------------------------------------
        let character = state
            .characters
            .get(id)
            .ok_or_else(|| invalid("no such character".into()))?;
        if !delta.is_finite() {
            return Err(invalid("delta contains a non-finite value".into()));
        }
        if let Some(to) = &delta.location_change {
            if !state.world.contains(to) {
                return Err(invalid(format!("unknown location '{to}'")));
            }
            let from = character.location();
            if self.require_adjacent_moves && to != from && !state.world.is_adjacent(from, to) {
                return Err(invalid(format!("'{to}' is not adjacent to '{from}'")));
            }
        }
        for other in delta.relationship_changes.keys() {
            if other == id {
                return Err(invalid("relationship change toward itself".into()));
            }
            if !state.characters.contains_key(other) {
                return Err(invalid(format!("relationship change toward unknown character '{other}'")));
            }
        }
        if let Some(old) = delta.memory_candidate.as_ref().and_then(|m| m.supersedes) {
            if !character.memory().contains(old) {
                return Err(invalid(format!("supersedes unknown memory {old}")));
            }
        }
        let phase = state.phases.get(id).copied().unwrap_or(TurnPhase::Idle);
        let next_phase = match phase {
            TurnPhase::Idle => TurnPhase::Idle,
            TurnPhase::Processing => TurnPhase::Resolved,
            TurnPhase::Resolved => {
                return Err(CoreError::InvalidTransition {
                    character: id.clone(),
                    from: phase,
                    to: TurnPhase::Resolved,
                });
            }
        };

        // -- stage ----------------------------------------------------------
        let mut emotions: BTreeMap<EmotionKind, f32> = character.emotions().clone();
        for (kind, change) in &delta.emotion_changes {
            let current = character.emotion(*kind);
            emotions.insert(*kind, self.bounds.clamp_emotion(current + change));
        }
        let affinity = self.bounds.clamp_affinity(character.affinity() + delta.affinity_change);
        let mut relationships = character.relationships().clone();
        for (other, change) in &delta.relationship_changes {
            let current = character.relationship(other);
            relationships.insert(other.clone(), self.bounds.clamp_affinity(current + change));
        }
        let from = character.location().clone();
        let now = state.world.turn();

        // -- commit ---------------------------------------------------------
        if let Some(to) = &delta.location_change {
            if *to != from {
                state.world.relocate(id, &from, to);
            }
        }
        let character = state
            .characters
            .get_mut(id)
            .ok_or_else(|| invalid("no such character".into()))?;
        character.set_emotions(emotions);
        character.set_affinity(affinity);
        character.set_relationships(relationships);
        if let Some(to) = &delta.location_change {
            character.set_location(to.clone());
        }
        let record = self.memory.record_turn(character.memory_mut(), delta, now);
        let updated = character.clone();
        state.phases.insert(id.clone(), next_phase);

        debug!(
            character = %id,
            affinity = updated.affinity(),
            location = %updated.location(),
            recorded = ?record.recorded,
            "Delta applied"
        );
        Ok(Applied { state: updated, record })
    }

    // -----------------------------------------------------------------------
    // Turn phases
    // -----------------------------------------------------------------------

    /// Current phase of a character.
    #[must_use]
    pub fn phase(&self, id: &CharacterId) -> Option<TurnPhase> {
        self.inner.lock().phases.get(id).copied()
    }

    /// `Idle → Processing`.
    ///
    /// # Errors
    /// `UnknownTarget` for an unknown character, `InvalidTransition` otherwise.
    pub fn begin(&self, id: &CharacterId) -> Result<()> {
        self.transition(id, TurnPhase::Idle, TurnPhase::Processing)
    }

    /// `Processing → Resolved` without applying anything (the reply failed).
    ///
    /// # Errors
    /// `UnknownTarget` for an unknown character, `InvalidTransition` otherwise.
    pub fn reject(&self, id: &CharacterId) -> Result<()> {
        warn!(character = %id, "Turn resolved without a state change");
        self.transition(id, TurnPhase::Processing, TurnPhase::Resolved)
    }

    /// `Resolved → Idle`.
    ///
    /// # Errors
    /// `UnknownTarget` for an unknown character, `InvalidTransition` otherwise.
    pub fn settle(&self, id: &CharacterId) -> Result<()> {
        self.transition(id, TurnPhase::Resolved, TurnPhase::Idle)
    }

    fn transition(&self, id: &CharacterId, from: TurnPhase, to: TurnPhase) -> Result<()> {
        let mut state = self.inner.lock();
        let phase = state
            .phases
            .get_mut(id)
            .ok_or_else(|| CoreError::UnknownTarget(id.to_string()))?;
        if *phase != from {
            return Err(CoreError::InvalidTransition {
                character: id.clone(),
                from: *phase,
                to,
            });
        }
        *phase = to;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // World updates
    // -----------------------------------------------------------------------

    /// Move the player. Returns the new location ID.
    ///
    /// # Errors
    /// `UnknownTarget` if the location does not exist, or is not adjacent when
    /// adjacency is required.
    pub fn move_player(&self, to: &LocationId) -> Result<LocationId> {
        let mut state = self.inner.lock();
        if !state.world.contains(to) {
            return Err(CoreError::UnknownTarget(to.to_string()));
        }
        let from = state.world.player_location().clone();
        if self.require_adjacent_moves && *to != from && !state.world.is_adjacent(&from, to) {
            return Err(CoreError::UnknownTarget(format!("{to} (not reachable from {from})")));
        }
        state.world.set_player_location(to.clone());
        info!(from = %from, to = %to, "Player moved");
        Ok(to.clone())
    }

    /// Close the current turn.
    pub fn advance_turn(&self) -> Turn {
        self.inner.lock().world.advance_turn()
    }

    /// Move the world clock forward (or backward for negative values).
    pub fn advance_clock(&self, minutes: i64) {
        self.inner.lock().world.advance_clock(minutes);
    }

    /// Change the weather.
    pub fn set_weather(&self, weather: Weather) {
        self.inner.lock().world.set_weather(weather);
    }

    /// Record something every character should know about. Blank text is
    /// ignored; returns whether the event was logged.
    pub fn add_global_event(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        let mut state = self.inner.lock();
        state.world.record_event(text.to_string(), self.event_log_capacity);
        info!(turn = state.world.turn().0, event = text, "World event recorded");
        true
    }

    // -----------------------------------------------------------------------
    // Reads & persistence boundary
    // -----------------------------------------------------------------------

    /// A copy of one character's state.
    #[must_use]
    pub fn character(&self, id: &CharacterId) -> Option<CharacterState> {
        self.inner.lock().characters.get(id).cloned()
    }

    /// IDs of all loaded characters.
    #[must_use]
    pub fn character_ids(&self) -> Vec<CharacterId> {
        self.inner.lock().characters.keys().cloned().collect()
    }

    /// A consistent copy of the whole session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.lock();
        SessionSnapshot::new(state.world.clone(), state.characters.clone())
    }

    /// Replace the whole session with a saved snapshot.
    ///
    /// # Errors
    /// Returns an error (state untouched) if the snapshot fails validation.
    pub fn restore(&self, snapshot: SessionSnapshot) -> Result<()> {
        snapshot.validate(&self.bounds)?;
        let mut state = self.inner.lock();
        state.phases = snapshot.characters.keys().map(|id| (id.clone(), TurnPhase::Idle)).collect();
        state.world = snapshot.world;
        state.characters = snapshot.characters;
        info!(turn = state.world.turn().0, characters = state.characters.len(), "Session restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveTime;

    use super::*;
    use crate::character::Persona;
    use crate::memory::MemoryDraft;
    use crate::world::Location;

    fn tracker() -> StateTracker {
        let world = WorldState::new("academy", NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"))
            .with_location(Location::new("academy", "Academy", ""))
            .with_location(Location::new("square", "Square", ""))
            .with_location(Location::new("inn", "Inn", ""))
            .connect("academy", "square")
            .connect("square", "inn");
        let tracker = StateTracker::new(world, &EchoConfig::default()).expect("valid world");
        let persona = Arc::new(Persona::new("Alice", "", ""));
        tracker
            .add_character(
                CharacterState::new("alice", persona, "academy")
                    .with_emotion(EmotionKind::Joy, 0.5)
                    .with_affinity(0.9),
            )
            .expect("added");
        tracker
    }

    fn alice() -> CharacterId {
        CharacterId::new("alice")
    }

    #[test]
    fn affinity_sum_is_clamped() {
        let t = tracker();
        let state = t
            .apply(&StateDelta::narrative(alice(), "!").with_affinity(5.0))
            .expect("applies");
        assert!((state.affinity() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn emotions_sum_then_clamp() {
        let t = tracker();
        let state = t
            .apply(
                &StateDelta::narrative(alice(), "...")
                    .with_emotion(EmotionKind::Joy, -2.0)
                    .with_emotion(EmotionKind::Trust, 0.25),
            )
            .expect("applies");
        assert!(state.emotion(EmotionKind::Joy).abs() < f32::EPSILON);
        assert!((state.emotion(EmotionKind::Trust) - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn unknown_location_rejected_without_mutation() {
        let t = tracker();
        let before = t.snapshot();
        let delta = StateDelta::narrative(alice(), "off I go")
            .with_affinity(0.05)
            .with_location("moon")
            .with_memory(MemoryDraft::episodic("left for the moon", 0.9));
        assert!(matches!(t.apply(&delta), Err(CoreError::InvalidDelta { .. })));
        assert_eq!(t.snapshot(), before);
    }

    #[test]
    fn location_change_moves_occupancy() {
        let t = tracker();
        t.apply(&StateDelta::narrative(alice(), "walks").with_location("inn"))
            .expect("applies");
        let snap = t.snapshot();
        let inn = snap.world.location(&LocationId::new("inn")).expect("inn");
        let academy = snap.world.location(&LocationId::new("academy")).expect("academy");
        assert!(inn.occupants.contains(&alice()));
        assert!(!academy.occupants.contains(&alice()));
        assert!(snap.validate(&StateBounds::default()).is_ok());
    }

    #[test]
    fn adjacency_enforced_when_configured() {
        let mut config = EchoConfig::default();
        config.turn.require_adjacent_moves = true;
        let t = StateTracker::from_snapshot(tracker().snapshot(), &config).expect("restores");
        let err = t.apply(&StateDelta::narrative(alice(), "teleports").with_location("inn"));
        assert!(matches!(err, Err(CoreError::InvalidDelta { .. })));
        assert!(t.apply(&StateDelta::narrative(alice(), "walks").with_location("square")).is_ok());
    }

    #[test]
    fn non_finite_delta_rejected() {
        let t = tracker();
        let before = t.snapshot();
        let delta = StateDelta::narrative(alice(), "?").with_emotion(EmotionKind::Fear, f32::NAN);
        assert!(t.apply(&delta).is_err());
        assert_eq!(t.snapshot(), before);
    }

    #[test]
    fn unknown_character_rejected() {
        let t = tracker();
        let delta = StateDelta::narrative(CharacterId::new("ghost"), "boo");
        assert!(matches!(t.apply(&delta), Err(CoreError::InvalidDelta { .. })));
    }

    #[test]
    fn phase_machine_round_trip() {
        let t = tracker();
        let id = alice();
        assert_eq!(t.phase(&id), Some(TurnPhase::Idle));
        assert!(t.settle(&id).is_err());
        t.begin(&id).expect("idle -> processing");
        assert!(t.begin(&id).is_err());
        t.apply(&StateDelta::narrative(id.clone(), "hi")).expect("processing -> resolved");
        assert_eq!(t.phase(&id), Some(TurnPhase::Resolved));
        assert!(t.apply(&StateDelta::narrative(id.clone(), "again")).is_err());
        t.settle(&id).expect("resolved -> idle");
        assert_eq!(t.phase(&id), Some(TurnPhase::Idle));

        t.begin(&id).expect("begin");
        t.reject(&id).expect("reject");
        t.settle(&id).expect("settle");
    }

    #[test]
    fn memory_recorded_at_current_turn() {
        let t = tracker();
        t.advance_turn();
        t.advance_turn();
        let applied = t
            .apply_with_outcome(
                &StateDelta::narrative(alice(), "ok").with_memory(MemoryDraft::episodic("met the player", 0.8)),
            )
            .expect("applies");
        let id = applied.record.recorded.expect("recorded");
        let item = applied.state.memory().get(id).expect("stored");
        assert_eq!(item.timestamp, Turn(2));
    }

    #[test]
    fn supersedes_unknown_memory_rejected() {
        let t = tracker();
        let delta = StateDelta::narrative(alice(), "...")
            .with_memory(MemoryDraft::episodic("x", 0.5).superseding(crate::types::MemoryId::new()));
        assert!(matches!(t.apply(&delta), Err(CoreError::InvalidDelta { .. })));
    }

    #[test]
    fn move_player_validates_location() {
        let t = tracker();
        assert!(t.move_player(&LocationId::new("nowhere")).is_err());
        t.move_player(&LocationId::new("square")).expect("moves");
        assert_eq!(t.snapshot().world.player_location(), &LocationId::new("square"));
    }

    #[test]
    fn world_clock_weather_and_turn_advance() {
        let t = tracker();
        t.set_weather(Weather::Rainy);
        t.advance_clock(30);
        t.advance_turn();
        let world = t.snapshot().world;
        assert_eq!(world.weather(), Weather::Rainy);
        assert_eq!(world.clock(), NaiveTime::from_hms_opt(9, 30, 0).expect("valid time"));
        assert_eq!(world.turn(), Turn(1));
    }

    #[test]
    fn relationship_changes_sum_clamp_and_need_a_known_target() {
        let t = tracker();
        t.add_character(CharacterState::new("bob", Arc::new(Persona::new("Bob", "", "")), "inn"))
            .expect("bob joins");
        let bob = CharacterId::new("bob");

        t.apply(&StateDelta::narrative(alice(), "hm").with_relationship("bob", 0.7))
            .expect("applies");
        let state = t
            .apply(&StateDelta::narrative(alice(), "hm").with_relationship("bob", 0.7))
            .expect("applies");
        assert!((state.relationship(&bob) - 1.0).abs() < f32::EPSILON);
        assert!(t.character(&bob).expect("present").relationship(&alice()).abs() < f32::EPSILON);

        let before = t.snapshot();
        for target in ["alice", "zed"] {
            let err = t
                .apply(&StateDelta::narrative(alice(), "hm").with_relationship(target, 0.1))
                .expect_err("rejected");
            assert!(matches!(err, CoreError::InvalidDelta { .. }), "{target}: {err}");
        }
        assert_eq!(t.snapshot(), before);
    }

    #[test]
    fn global_events_are_logged_against_the_current_turn() {
        let mut config = EchoConfig::default();
        config.turn.event_log_capacity = 2;
        let t = StateTracker::from_snapshot(tracker().snapshot(), &config).expect("restores");
        assert!(!t.add_global_event("   "));
        assert!(t.add_global_event("The bell tolls"));
        t.advance_turn();
        assert!(t.add_global_event("A storm gathers"));
        assert!(t.add_global_event("The gates close"));

        let world = t.snapshot().world;
        let logged: Vec<(u64, &str)> = world.events().map(|e| (e.turn.0, e.text.as_str())).collect();
        assert_eq!(logged, vec![(1, "A storm gathers"), (1, "The gates close")]);
    }

    #[test]
    fn duplicate_or_misplaced_characters_rejected() {
        let t = tracker();
        let persona = Arc::new(Persona::new("Other", "", ""));
        assert!(t.add_character(CharacterState::new("alice", Arc::clone(&persona), "academy")).is_err());
        assert!(matches!(
            t.add_character(CharacterState::new("bob", persona, "moon")),
            Err(CoreError::UnknownLocation { .. })
        ));
    }
}
