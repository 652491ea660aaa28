//! Prompt templates for EchoArena character turns.
//!
//! Every prompt is a versioned, testable artifact. The built-in templates
//! below are compiled in; a directory of TOML files with the same shape can
//! replace them at startup.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{LlmError, Result};

/// System prompt for one character's reply to the player.
pub const CHARACTER_TURN_SYSTEM: &str = r"You are {character_name}, a character in a shared role-playing scene.

{persona}

RULES:
- Stay in character. Never break the fourth wall.
- Speak in the language the player uses.
- Reference memories naturally, don't list them.
- Only react to what your character could plausibly see or hear.
- Your response must be a single JSON object and nothing else.";

/// User prompt carrying memory, world and the player's words, plus the
/// reply contract.
pub const CHARACTER_TURN_USER: &str = r#"What you remember:
{memory}

Where you are:
{world}

The player says or does:
{utterance}

Reply as {character_name}. Return JSON:
{{"character_id": "{character_id}", "narrative": "what you say and do", "emotions": {{"<EMOTION>": <change -1.0 to 1.0>}}, "affinity_change": <float -1.0 to 1.0>, "relationship_changes": {{}}, "location_change": null, "memory": {{"content": "what you will remember", "kind": "episodic", "salience": <float 0.0 to 1.0>, "supersedes": null}}}}

Allowed emotions: {emotion_names}.
Use an empty object for "emotions" when nothing changes. "relationship_changes" maps the ID of someone present to a change -1.0 to 1.0 in how you regard them. Set "location_change" to a location ID only if you leave for it. Set "memory" to null when nothing is worth remembering."#;

/// Placeholders every character-turn template must be rendered with.
pub const CHARACTER_TURN_VARS: &[&str] = &[
    "character_id",
    "character_name",
    "persona",
    "memory",
    "world",
    "utterance",
    "emotion_names",
];

/// Template interpolation for prompts.
///
/// Replaces `{key}` with the corresponding value. `{{` and `}}` become
/// literal braces. Placeholders with no value are left as written.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
        } else if let Some((key, after)) = placeholder(tail) {
            match vars.iter().find(|(k, _)| *k == key) {
                Some((_, value)) => out.push_str(value),
                None => {
                    out.push('{');
                    out.push_str(key);
                    out.push('}');
                }
            }
            rest = after;
        } else {
            out.push_str(&tail[..1]);
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Placeholder names a template expects, in first-appearance order.
#[must_use]
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut found: Vec<&str> = Vec::new();
    let mut rest = template;
    while let Some(pos) = rest.find(['{', '}']) {
        let tail = &rest[pos..];
        if tail.starts_with("{{") || tail.starts_with("}}") {
            rest = &tail[2..];
        } else if let Some((key, after)) = placeholder(tail) {
            if !found.contains(&key) {
                found.push(key);
            }
            rest = after;
        } else {
            rest = &tail[1..];
        }
    }
    found
}

/// `{identifier}` at the start of `s`, with the text after it.
fn placeholder(s: &str) -> Option<(&str, &str)> {
    let body = s.strip_prefix('{')?;
    let end = body.find('}')?;
    let key = &body[..end];
    let valid = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then(|| (key, &body[end + 1..]))
}

// ---------------------------------------------------------------------------
// PromptEngine: versioned TOML template loader
// ---------------------------------------------------------------------------

/// Identifies a prompt template by purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// A character replying to the player.
    CharacterTurn,
}

impl PromptId {
    /// Returns the TOML filename (without path) for this prompt.
    #[must_use]
    pub fn filename(self) -> &'static str {
        match self {
            Self::CharacterTurn => "character_turn.toml",
        }
    }

    /// Placeholders a template for this prompt must supply.
    #[must_use]
    pub fn required_vars(self) -> &'static [&'static str] {
        match self {
            Self::CharacterTurn => CHARACTER_TURN_VARS,
        }
    }

    /// All prompt IDs.
    #[must_use]
    pub fn all() -> &'static [PromptId] {
        &[Self::CharacterTurn]
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CharacterTurn => "character_turn",
        };
        write!(f, "{name}")
    }
}

impl FromStr for PromptId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "character_turn" => Ok(Self::CharacterTurn),
            _ => Err(format!("unknown prompt id: '{s}'")),
        }
    }
}

/// Metadata and templates parsed from a TOML prompt file.
#[derive(Debug, Clone, Deserialize)]
struct TomlPromptFile {
    prompt: TomlPromptData,
}

/// Inner `[prompt]` section of a TOML file.
#[derive(Debug, Clone, Deserialize)]
struct TomlPromptData {
    version: String,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    temperature: Option<f32>,
    system: String,
    user: String,
}

/// A loaded, ready-to-render prompt template.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    /// Prompt version string (e.g., "1.0").
    pub version: String,
    /// Output length suggested by the template, if any.
    pub max_tokens: Option<u32>,
    /// Sampling temperature suggested by the template, if any.
    pub temperature: Option<f32>,
    /// System prompt template (contains `{key}` placeholders).
    pub system: String,
    /// User prompt template (contains `{key}` placeholders).
    pub user: String,
}

impl PromptTemplate {
    /// Placeholders used by either half of the template.
    #[must_use]
    pub fn placeholders(&self) -> Vec<&str> {
        let mut all = placeholders(&self.system);
        for key in placeholders(&self.user) {
            if !all.contains(&key) {
                all.push(key);
            }
        }
        all
    }
}

/// Engine that loads versioned TOML prompt templates and renders them.
///
/// # Example
///
/// ```no_run
/// use echo_llm::prompt::{PromptEngine, PromptId};
///
/// let engine = PromptEngine::from_directory("echo-llm/prompts/v1").unwrap();
/// let tpl = engine.get(PromptId::CharacterTurn).unwrap();
/// let system = echo_llm::prompt::render_template(
///     &tpl.system,
///     &[("character_name", "アリス"), ("persona", "Name: アリス")],
/// );
/// ```
#[derive(Debug, Clone)]
pub struct PromptEngine {
    templates: HashMap<PromptId, PromptTemplate>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptEngine {
    /// Create a `PromptEngine` pre-loaded with the compiled-in templates.
    #[must_use]
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            PromptId::CharacterTurn,
            PromptTemplate {
                version: "builtin".into(),
                max_tokens: None,
                temperature: None,
                system: CHARACTER_TURN_SYSTEM.into(),
                user: CHARACTER_TURN_USER.into(),
            },
        );
        Self { templates }
    }

    /// Load prompt templates from a directory of TOML files.
    ///
    /// Each TOML file must match a known [`PromptId`] filename; unknown files
    /// are ignored. Prompts without a file keep their built-in template.
    ///
    /// # Errors
    ///
    /// `Template` if the directory holds no known file, a file cannot be
    /// read or parsed, or a template omits a required placeholder.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut engine = Self::builtin();
        let mut loaded = 0usize;

        for id in PromptId::all() {
            let path = dir.join(id.filename());
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .map_err(|e| LlmError::Template(format!("failed to read {}: {e}", path.display())))?;
            let parsed: TomlPromptFile = toml::from_str(&content)
                .map_err(|e| LlmError::Template(format!("failed to parse {}: {e}", path.display())))?;

            let d = parsed.prompt;
            let template = PromptTemplate {
                version: d.version,
                max_tokens: d.max_tokens,
                temperature: d.temperature,
                system: d.system,
                user: d.user,
            };
            let present = template.placeholders();
            if let Some(missing) = id.required_vars().iter().find(|v| !present.contains(v)) {
                return Err(LlmError::Template(format!(
                    "{} does not use required placeholder '{{{missing}}}'",
                    path.display()
                )));
            }
            engine.templates.insert(*id, template);
            loaded += 1;
        }

        if loaded == 0 {
            return Err(LlmError::Template(format!(
                "no prompt templates found in directory: {}",
                dir.display()
            )));
        }
        Ok(engine)
    }

    /// Get a loaded prompt template by ID.
    #[must_use]
    pub fn get(&self, id: PromptId) -> Option<&PromptTemplate> {
        self.templates.get(&id)
    }

    /// Render both system and user prompts for a given ID.
    ///
    /// Returns `(system_prompt, user_prompt)` with all `{key}` placeholders
    /// replaced.
    ///
    /// # Errors
    ///
    /// `Template` if the prompt is not loaded or a placeholder it uses has
    /// no value in `vars`.
    pub fn render(&self, id: PromptId, vars: &[(&str, &str)]) -> Result<(String, String)> {
        let tpl = self
            .get(id)
            .ok_or_else(|| LlmError::Template(format!("prompt template '{id}' not loaded")))?;
        if let Some(missing) = tpl
            .placeholders()
            .into_iter()
            .find(|key| !vars.iter().any(|(k, _)| k == key))
        {
            return Err(LlmError::Template(format!("prompt '{id}' needs a value for '{missing}'")));
        }

        let system = render_template(&tpl.system, vars);
        let user = render_template(&tpl.user, vars);
        Ok((system, user))
    }

    /// Number of loaded templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether no templates are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
