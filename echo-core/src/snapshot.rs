//! Serialisable session snapshot, the boundary to whatever persists sessions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::character::CharacterState;
use crate::config::StateBounds;
use crate::error::{CoreError, Result};
use crate::types::CharacterId;
use crate::world::WorldState;

/// Current snapshot schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// A complete, self-consistent copy of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Schema version the snapshot was written with.
    pub schema_version: u32,
    /// World state.
    pub world: WorldState,
    /// Every character, including its memory.
    pub characters: BTreeMap<CharacterId, CharacterState>,
}

impl SessionSnapshot {
    /// Wrap state at the current schema version.
    #[must_use]
    pub fn new(world: WorldState, characters: BTreeMap<CharacterId, CharacterState>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            world,
            characters,
        }
    }

    /// Check that the snapshot can be loaded.
    ///
    /// # Errors
    /// `InvalidState` for an unsupported schema, mismatched character keys,
    /// out-of-range values or any world invariant violation.
    pub fn validate(&self, bounds: &StateBounds) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(CoreError::InvalidState(format!(
                "unsupported snapshot schema version {} (expected {SCHEMA_VERSION})",
                self.schema_version
            )));
        }
        for (key, character) in &self.characters {
            if key != character.id() {
                return Err(CoreError::InvalidState(format!(
                    "character stored under '{key}' has id '{}'",
                    character.id()
                )));
            }
            if !character.within(bounds) {
                return Err(CoreError::InvalidState(format!("character '{key}' has out-of-range values")));
            }
        }
        self.world.check_invariants(&self.characters)
    }

    /// Serialise to pretty JSON.
    ///
    /// # Errors
    /// Returns `CoreError::Serialization` on failure.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// Deserialise from JSON and validate against default bounds.
    ///
    /// # Errors
    /// `Serialization` for undecodable input, `InvalidState` if it fails validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(json).map_err(|e| CoreError::Serialization(e.to_string()))?;
        snapshot.validate(&StateBounds::default())?;
        Ok(snapshot)
    }
}
