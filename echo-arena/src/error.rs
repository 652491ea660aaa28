//! Arena error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use echo_core::CoreError;
use echo_llm::LlmError;

/// Errors that abort a whole operation (as opposed to one character's turn).
#[derive(Debug, Error)]
pub enum ArenaError {
    /// State, routing or snapshot error from the core.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Model backend or prompt template error.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// I/O error (session files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The session was used in a way it does not support.
    #[error("Session error: {0}")]
    Session(String),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ArenaError>;

/// Why one character produced no state change this turn.
///
/// Failures are per character: a sibling's failure never prevents another
/// character's delta from being applied.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnFailure {
    /// The player named someone who is not here.
    #[error("'{name}' is not here")]
    NoSuchTarget {
        /// The name as the player wrote it.
        name: String,
    },

    /// The model's reply could not be decoded into a state change.
    #[error("malformed reply: {reason}")]
    Malformed {
        /// Parser diagnostic.
        reason: String,
    },

    /// The decoded change was refused by the tracker.
    #[error("rejected change: {reason}")]
    InvalidDelta {
        /// Tracker diagnostic.
        reason: String,
    },

    /// Every attempt hit the deadline.
    #[error("no reply after {attempts} attempt(s)")]
    ModelTimeout {
        /// Attempts made, including the first.
        attempts: u32,
    },

    /// The backend failed for a reason other than the deadline.
    #[error("model unavailable: {reason}")]
    ModelUnavailable {
        /// Backend diagnostic.
        reason: String,
    },
}

impl TurnFailure {
    /// Map a parser or tracker error onto the failure a UI shows.
    #[must_use]
    pub fn from_core(err: &CoreError) -> Self {
        match err {
            CoreError::MalformedResponse(reason) => Self::Malformed { reason: reason.clone() },
            CoreError::InvalidDelta { reason, .. } => Self::InvalidDelta { reason: reason.clone() },
            CoreError::UnknownTarget(name) => Self::NoSuchTarget { name: name.clone() },
            other => Self::InvalidDelta {
                reason: other.to_string(),
            },
        }
    }
}
