//! Error types for the EchoArena core library.

use thiserror::Error;

use crate::tracker::TurnPhase;
use crate::types::{CharacterId, LocationId};

/// Top-level error type for all core operations.
///
/// Router, parser and tracker errors are scoped to one character (or one
/// player input) and never abort sibling work.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Two or more in-scope characters match the same span of player text.
    #[error("Ambiguous target '{name}': matches {candidates:?}")]
    AmbiguousTarget {
        /// The text span that matched.
        name: String,
        /// Every in-scope character it could refer to.
        candidates: Vec<CharacterId>,
    },

    /// A referenced character, item or location does not exist (or is out of scope).
    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    /// Model output could not be decoded into a state delta.
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// A decoded delta failed validation against current state.
    #[error("Invalid delta for {character}: {reason}")]
    InvalidDelta {
        /// Character the delta was addressed to.
        character: CharacterId,
        /// What failed.
        reason: String,
    },

    /// A character was driven through an illegal turn-phase transition.
    #[error("Illegal phase transition for {character}: {from:?} -> {to:?}")]
    InvalidTransition {
        /// The character.
        character: CharacterId,
        /// Phase it was in.
        from: TurnPhase,
        /// Phase that was requested.
        to: TurnPhase,
    },

    /// A character references a location that is not part of the world.
    #[error("Character {character} placed at unknown location {location}")]
    UnknownLocation {
        /// The character.
        character: CharacterId,
        /// The missing location.
        location: LocationId,
    },

    /// Session state violates a structural invariant (e.g. on restore).
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, CoreError>;
