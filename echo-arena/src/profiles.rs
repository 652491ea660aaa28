//! Per-character model profiles.

use std::collections::BTreeMap;

use echo_core::CharacterId;
use echo_core::config::{LlmConfig, ModelProfile};

/// Resolves which model profile backs each character.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    default: ModelProfile,
    overrides: BTreeMap<CharacterId, ModelProfile>,
}

impl ProfileRegistry {
    /// Registry from the `[llm]` config section.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            default: config.default_profile.clone(),
            overrides: config
                .characters
                .iter()
                .map(|(id, profile)| (CharacterId::new(id.as_str()), profile.clone()))
                .collect(),
        }
    }

    /// Give `id` its own profile.
    #[must_use]
    pub fn with_override(mut self, id: impl Into<String>, profile: ModelProfile) -> Self {
        self.overrides.insert(CharacterId::new(id), profile);
        self
    }

    /// Profile for `id`: its override, else the default.
    #[must_use]
    pub fn resolve(&self, id: &CharacterId) -> &ModelProfile {
        self.overrides.get(id).unwrap_or(&self.default)
    }
}
