//! # echo-arena — Turn Pipeline for EchoArena
//!
//! Ties the synchronous core (`echo-core`) to language models (`echo-llm`).
//! An [`ArenaSession`] owns one sandbox; each call to
//! [`ArenaSession::process_turn`] routes the player's text, asks every
//! addressed character for a reply concurrently, then applies the replies
//! one at a time and returns a [`TurnReport`] for the UI.
//!
//! The model sits behind the [`CharacterModel`] trait, so tests and other
//! frontends can supply their own.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod environment;
pub mod error;
pub mod logging;
pub mod model;
pub mod profiles;
pub mod report;
pub mod sample;
pub mod session;

pub use error::{ArenaError, TurnFailure};
pub use model::{CharacterModel, LlmCharacterModel};
pub use profiles::ProfileRegistry;
pub use report::{DeltaSummary, EntryOutcome, TurnEntry, TurnReport};
pub use session::ArenaSession;
