//! # echo-llm — Language Model Access for EchoArena
//!
//! One interface for text generation across backends:
//!   - **OpenAI-compatible API** (default; also fits most hosted gateways)
//!   - **Ollama** (local)
//!   - **None** (every call fails with `Unavailable`, useful offline)
//!
//! The crate knows nothing about characters or world state. It renders
//! prompt templates and moves text over HTTP; turning a reply into a state
//! change is `echo-core`'s job.
//!
//! ```text
//! BoundedContext ─▶ PromptEngine::render ─▶ LlmRequest ─▶ LlmClient::generate
//!                                                               │
//!                                              LlmResponse.text ◀┘
//! ```

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod error;
pub mod prompt;
pub mod types;

pub use client::{LlmClient, LlmProvider};
pub use error::LlmError;
pub use prompt::{PromptEngine, PromptId, PromptTemplate};
pub use types::{LlmRequest, LlmResponse};
