//! The language model seam: one character, one bounded context, one reply.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use echo_core::config::ModelProfile;
use echo_core::{BoundedContext, EmotionKind};
use echo_llm::{LlmClient, LlmError, LlmRequest, PromptEngine, PromptId};

use crate::error::TurnFailure;

/// Produces a character's raw reply for a bounded context.
///
/// Implementations must not touch session state; the reply is parsed and
/// applied by the session afterwards.
#[async_trait]
pub trait CharacterModel: Send + Sync {
    /// Generate the raw reply text.
    async fn complete(&self, context: &BoundedContext, profile: &ModelProfile) -> Result<String, LlmError>;
}

/// [`CharacterModel`] backed by an [`LlmClient`] and the character-turn prompt.
#[derive(Debug, Clone)]
pub struct LlmCharacterModel {
    client: LlmClient,
    prompts: PromptEngine,
    http_timeout_ms: u64,
}

impl LlmCharacterModel {
    /// Wrap a client with the given templates.
    #[must_use]
    pub fn new(client: LlmClient, prompts: PromptEngine) -> Self {
        Self {
            client,
            prompts,
            http_timeout_ms: 30_000,
        }
    }

    /// Per-request HTTP timeout. The session's own deadline still applies.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout_ms: u64) -> Self {
        self.http_timeout_ms = timeout_ms;
        self
    }

    /// Build the request for `context`.
    ///
    /// # Errors
    /// `Template` if the loaded prompt cannot be rendered.
    pub fn request(&self, context: &BoundedContext, profile: &ModelProfile) -> Result<LlmRequest, LlmError> {
        let (system, user) = render_context(&self.prompts, context)?;
        Ok(LlmRequest::new(system, user, profile.model.clone())
            .with_sampling(profile.temperature, profile.max_tokens)
            .with_timeout(self.http_timeout_ms))
    }
}

#[async_trait]
impl CharacterModel for LlmCharacterModel {
    async fn complete(&self, context: &BoundedContext, profile: &ModelProfile) -> Result<String, LlmError> {
        let request = self.request(context, profile)?;
        let response = self.client.generate(&request).await?;
        debug!(
            character = %context.character_id,
            model = %response.model,
            tokens = response.tokens_generated,
            latency_ms = response.latency_ms,
            "Character reply received"
        );
        Ok(response.text)
    }
}

/// Render a context into `(system, user)` prompts.
///
/// # Errors
/// `Template` if the character-turn template is missing or incomplete.
pub fn render_context(prompts: &PromptEngine, context: &BoundedContext) -> Result<(String, String), LlmError> {
    let memory = context.memory_block();
    let world = context.world_block();
    let emotion_names = EmotionKind::ALL.map(EmotionKind::as_str).join(", ");
    prompts.render(
        PromptId::CharacterTurn,
        &[
            ("character_id", context.character_id.as_str()),
            ("character_name", context.character_name.as_str()),
            ("persona", context.persona.as_str()),
            ("memory", memory.as_str()),
            ("world", world.as_str()),
            ("utterance", context.utterance.as_str()),
            ("emotion_names", emotion_names.as_str()),
        ],
    )
}

/// Call `model` under a per-attempt deadline.
///
/// A deadline miss (or a backend timeout) is retried up to `max_retries`
/// times; any other backend error fails at once.
///
/// # Errors
/// `ModelTimeout` once every attempt timed out, `ModelUnavailable` for any
/// other backend error.
pub async fn call_with_deadline(
    model: &dyn CharacterModel,
    context: &BoundedContext,
    profile: &ModelProfile,
    deadline: Duration,
    max_retries: u32,
) -> Result<String, TurnFailure> {
    let attempts = max_retries.saturating_add(1);
    for attempt in 1..=attempts {
        match tokio::time::timeout(deadline, model.complete(context, profile)).await {
            Ok(Ok(text)) => return Ok(text),
            Ok(Err(LlmError::Timeout(_))) | Err(_) => {
                warn!(
                    character = %context.character_id,
                    attempt,
                    of = attempts,
                    deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                    "Model call missed its deadline"
                );
            }
            Ok(Err(e)) => {
                warn!(character = %context.character_id, error = %e, "Model call failed");
                return Err(TurnFailure::ModelUnavailable { reason: e.to_string() });
            }
        }
    }
    Err(TurnFailure::ModelTimeout { attempts })
}
