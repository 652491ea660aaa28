//! # EchoArena Core Library
//!
//! Character state and memory core for a multi-character text role-playing
//! sandbox. Raw player text goes in; routed intents, bounded prompt contexts
//! and validated state changes come out.
//!
//! ```text
//! player text ─▶ router ─▶ per character: retrieve memory ─▶ build context
//!                                          ─▶ (model call, outside this crate)
//!                                          ─▶ parse reply ─▶ tracker.apply
//! ```
//!
//! - **World** — clock, weather, locations, where the player stands
//! - **Characters** — persona, emotions, affinity, location, inventory
//! - **Memory** — bounded short-term queue, promotion-only long-term store
//!
//! Everything here is synchronous and performs no network I/O. The async
//! turn pipeline lives in `echo-arena`.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod character;
pub mod config;
pub mod context;
pub mod delta;
pub mod error;
pub mod eviction;
pub mod memory;
pub mod parser;
pub mod retrieval;
pub mod router;
pub mod snapshot;
pub mod tracker;
pub mod types;
pub mod world;

pub use character::{CharacterState, Persona};
pub use config::EchoConfig;
pub use context::{BoundedContext, PromptBuilder};
pub use delta::StateDelta;
pub use error::CoreError;
pub use memory::{MemoryManager, MemoryStore};
pub use router::{Addressee, Intent, TargetRef};
pub use snapshot::SessionSnapshot;
pub use tracker::StateTracker;
pub use types::*;
pub use world::{GlobalEvent, Location, WorldState};
