//! Configuration for an EchoArena session.
//!
//! Maps directly to `echo.toml`. Every field has a default, so an empty file
//! (or no file at all) yields a working configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EchoConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Short/long-term memory capacities and promotion policy.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Retrieval ranking weights.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Prompt context budget.
    #[serde(default)]
    pub prompt: PromptConfig,
    /// Declared value ranges for character state.
    #[serde(default)]
    pub bounds: StateBounds,
    /// Turn pipeline timeouts and concurrency.
    #[serde(default)]
    pub turn: TurnConfig,
    /// Language model backend and per-character model profiles.
    #[serde(default)]
    pub llm: LlmConfig,
}

impl EchoConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `CoreError::Config` if the TOML is invalid or the values are
    /// out of range.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Apply `ECHO_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Recognised keys: `ECHO_DEFAULT_MODEL`, `ECHO_DEFAULT_TEMPERATURE`,
    /// `ECHO_MAX_TOKENS`, `ECHO_LOG_LEVEL`. Unparseable values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("ECHO_DEFAULT_MODEL").filter(|m| !m.trim().is_empty()) {
            self.llm.default_profile.model = model.trim().to_string();
        }
        if let Some(temperature) = lookup("ECHO_DEFAULT_TEMPERATURE").and_then(|t| t.trim().parse().ok()) {
            self.llm.default_profile.temperature = temperature;
        }
        if let Some(max_tokens) = lookup("ECHO_MAX_TOKENS").and_then(|t| t.trim().parse().ok()) {
            self.llm.default_profile.max_tokens = max_tokens;
        }
        if let Some(level) = lookup("ECHO_LOG_LEVEL").filter(|l| !l.trim().is_empty()) {
            self.general.log_level = level.trim().to_lowercase();
        }
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns `CoreError::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.memory.short_term_capacity == 0 {
            return Err(CoreError::Config("memory.short_term_capacity must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.memory.promotion_threshold) {
            return Err(CoreError::Config("memory.promotion_threshold must be within [0, 1]".into()));
        }
        let w = &self.retrieval;
        for (name, value) in [
            ("recency_weight", w.recency_weight),
            ("salience_weight", w.salience_weight),
            ("relevance_weight", w.relevance_weight),
            ("recency_decay", w.recency_decay),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(CoreError::Config(format!("retrieval.{name} must be a non-negative number")));
            }
        }
        let b = &self.bounds;
        if !(b.emotion_min < b.emotion_max) || !(b.affinity_min < b.affinity_max) {
            return Err(CoreError::Config("bounds: min must be below max".into()));
        }
        if !b.max_plausible_delta.is_finite() || b.max_plausible_delta <= 0.0 {
            return Err(CoreError::Config("bounds.max_plausible_delta must be positive".into()));
        }
        if self.turn.minutes_per_turn < 0 {
            return Err(CoreError::Config("turn.minutes_per_turn must not be negative".into()));
        }
        if self.turn.max_concurrent_calls == 0 {
            return Err(CoreError::Config("turn.max_concurrent_calls must be at least 1".into()));
        }
        if self.turn.event_log_capacity == 0 {
            return Err(CoreError::Config("turn.event_log_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

/// Per-character memory capacity and promotion policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Short-term capacity N. Overflow evicts (or promotes) the oldest item.
    #[serde(default = "default_short_term_capacity")]
    pub short_term_capacity: usize,
    /// Long-term capacity. Overflow forgets the least salient item.
    #[serde(default = "default_long_term_capacity")]
    pub long_term_capacity: usize,
    /// Items leaving short-term with salience strictly above this are promoted.
    #[serde(default = "default_promotion_threshold")]
    pub promotion_threshold: f32,
    /// Long-term items at or above this salience appear in the history summary.
    #[serde(default = "default_landmark_salience")]
    pub landmark_salience: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_capacity: default_short_term_capacity(),
            long_term_capacity: default_long_term_capacity(),
            promotion_threshold: default_promotion_threshold(),
            landmark_salience: default_landmark_salience(),
        }
    }
}

/// Retrieval algorithm settings.
///
/// Score = w₁·exp(-λ·age) + w₂·salience + w₃·relevance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of memories returned per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// w₁
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,
    /// w₂
    #[serde(default = "default_salience_weight")]
    pub salience_weight: f64,
    /// w₃
    #[serde(default = "default_relevance_weight")]
    pub relevance_weight: f64,
    /// λ, per turn.
    #[serde(default = "default_recency_decay")]
    pub recency_decay: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            recency_weight: default_recency_weight(),
            salience_weight: default_salience_weight(),
            relevance_weight: default_relevance_weight(),
            recency_decay: default_recency_decay(),
        }
    }
}

/// Prompt context settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Maximum total size of persona + memory + world + utterance, in chars.
    #[serde(default = "default_char_budget")]
    pub char_budget: usize,
    /// Emotions at or below this intensity are left out of the persona section.
    #[serde(default = "default_emotion_display_threshold")]
    pub emotion_display_threshold: f32,
    /// World events shown to each character, newest last.
    #[serde(default = "default_recent_events")]
    pub recent_events: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            char_budget: default_char_budget(),
            emotion_display_threshold: default_emotion_display_threshold(),
            recent_events: default_recent_events(),
        }
    }
}

/// Declared ranges for character state. Updates clamp into these.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateBounds {
    /// Lowest emotion intensity.
    #[serde(default)]
    pub emotion_min: f32,
    /// Highest emotion intensity.
    #[serde(default = "default_one")]
    pub emotion_max: f32,
    /// Lowest affinity.
    #[serde(default = "default_minus_one")]
    pub affinity_min: f32,
    /// Highest affinity.
    #[serde(default = "default_one")]
    pub affinity_max: f32,
    /// Any single delta with a larger magnitude is treated as malformed output.
    #[serde(default = "default_max_plausible_delta")]
    pub max_plausible_delta: f32,
}

impl StateBounds {
    /// Clamp an emotion intensity into range.
    #[must_use]
    pub fn clamp_emotion(&self, value: f32) -> f32 {
        value.clamp(self.emotion_min, self.emotion_max)
    }

    /// Clamp an affinity value into range.
    #[must_use]
    pub fn clamp_affinity(&self, value: f32) -> f32 {
        value.clamp(self.affinity_min, self.affinity_max)
    }

    /// Whether a delta is finite and within the plausible magnitude.
    #[must_use]
    pub fn is_plausible(&self, delta: f32) -> bool {
        delta.is_finite() && delta.abs() <= self.max_plausible_delta
    }
}

impl Default for StateBounds {
    fn default() -> Self {
        Self {
            emotion_min: 0.0,
            emotion_max: 1.0,
            affinity_min: -1.0,
            affinity_max: 1.0,
            max_plausible_delta: default_max_plausible_delta(),
        }
    }
}

/// Turn pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Per-attempt deadline for one character's model call.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Extra attempts after a timeout before the call is recorded as failed.
    #[serde(default = "default_max_timeout_retries")]
    pub max_timeout_retries: u32,
    /// Model calls in flight per session.
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
    /// Reject location changes to non-adjacent locations.
    #[serde(default)]
    pub require_adjacent_moves: bool,
    /// Game minutes the world clock advances per resolved turn.
    #[serde(default = "default_minutes_per_turn")]
    pub minutes_per_turn: i64,
    /// World events the tracker retains before dropping the oldest.
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_timeout_retries: default_max_timeout_retries(),
            max_concurrent_calls: default_max_concurrent_calls(),
            require_adjacent_moves: false,
            minutes_per_turn: default_minutes_per_turn(),
            event_log_capacity: default_event_log_capacity(),
        }
    }
}

/// Which model backs a character, and how it samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Model name as understood by the backend.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum output tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ModelProfile {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Language model backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Backend: `"openai"`, `"ollama"` or `"none"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Backend base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key (OpenAI-compatible backends).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// HTTP-level retries inside the client (independent of turn timeouts).
    #[serde(default = "default_http_retries")]
    pub http_retries: u32,
    /// Profile used by characters without an override.
    #[serde(default)]
    pub default_profile: ModelProfile,
    /// Per-character overrides, keyed by character ID.
    #[serde(default)]
    pub characters: BTreeMap<String, ModelProfile>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            http_retries: default_http_retries(),
            default_profile: ModelProfile::default(),
            characters: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value helpers for serde
// ---------------------------------------------------------------------------

fn default_log_level() -> String {
    "info".to_string()
}
fn default_short_term_capacity() -> usize {
    10
}
fn default_long_term_capacity() -> usize {
    100
}
fn default_promotion_threshold() -> f32 {
    0.5
}
fn default_landmark_salience() -> f32 {
    0.7
}
fn default_top_k() -> usize {
    5
}
fn default_recency_weight() -> f64 {
    0.2
}
fn default_salience_weight() -> f64 {
    0.35
}
fn default_relevance_weight() -> f64 {
    0.45
}
fn default_recency_decay() -> f64 {
    0.1
}
fn default_char_budget() -> usize {
    4000
}
fn default_emotion_display_threshold() -> f32 {
    0.3
}
fn default_one() -> f32 {
    1.0
}
fn default_minus_one() -> f32 {
    -1.0
}
fn default_max_plausible_delta() -> f32 {
    10.0
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_max_timeout_retries() -> u32 {
    1
}
fn default_max_concurrent_calls() -> usize {
    5
}
fn default_minutes_per_turn() -> i64 {
    5
}
fn default_event_log_capacity() -> usize {
    20
}
fn default_recent_events() -> usize {
    3
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_provider() -> String {
    "openai".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_http_retries() -> u32 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = EchoConfig::from_toml("").expect("empty config parses");
        assert_eq!(config, EchoConfig::default());
        assert_eq!(config.memory.short_term_capacity, 10);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.llm.default_profile.model, "gpt-4o-mini");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = EchoConfig::from_toml(
            r#"
            [memory]
            short_term_capacity = 5

            [llm.characters.sample_npc]
            model = "llama3.2"
            temperature = 0.2
            "#,
        )
        .expect("parses");
        assert_eq!(config.memory.short_term_capacity, 5);
        assert!((config.memory.promotion_threshold - 0.5).abs() < f32::EPSILON);
        let profile = &config.llm.characters["sample_npc"];
        assert_eq!(profile.model, "llama3.2");
        assert_eq!(profile.max_tokens, 4096);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(EchoConfig::from_toml("[memory]\nshort_term_capacity = 0").is_err());
        assert!(EchoConfig::from_toml("[bounds]\nemotion_min = 1.0\nemotion_max = 0.0").is_err());
        assert!(EchoConfig::from_toml("[retrieval]\nrecency_weight = -1.0").is_err());
        assert!(EchoConfig::from_toml("[turn]\nevent_log_capacity = 0").is_err());
        assert!(EchoConfig::from_toml("not = [valid").is_err());
    }

    #[test]
    fn overrides_apply_from_lookup() {
        let mut config = EchoConfig::default();
        config.apply_overrides_from(|key| match key {
            "ECHO_DEFAULT_MODEL" => Some("mistral".into()),
            "ECHO_DEFAULT_TEMPERATURE" => Some("0.25".into()),
            "ECHO_MAX_TOKENS" => Some("not-a-number".into()),
            "ECHO_LOG_LEVEL" => Some("DEBUG".into()),
            _ => None,
        });
        assert_eq!(config.llm.default_profile.model, "mistral");
        assert!((config.llm.default_profile.temperature - 0.25).abs() < f32::EPSILON);
        assert_eq!(config.llm.default_profile.max_tokens, 4096);
        assert_eq!(config.general.log_level, "debug");
    }

    #[test]
    fn bounds_clamp_and_plausibility() {
        let bounds = StateBounds::default();
        assert!((bounds.clamp_affinity(5.9) - 1.0).abs() < f32::EPSILON);
        assert!((bounds.clamp_emotion(-0.4)).abs() < f32::EPSILON);
        assert!(bounds.is_plausible(5.0));
        assert!(!bounds.is_plausible(50.0));
        assert!(!bounds.is_plausible(f32::NAN));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("echo.toml");
        std::fs::write(&path, "[prompt]\nchar_budget = 1200\n").expect("write");
        let config = EchoConfig::from_file(&path).expect("loads");
        assert_eq!(config.prompt.char_budget, 1200);
        assert!(EchoConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
