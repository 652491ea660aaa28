//! Response Parser — decodes a model reply into a [`StateDelta`].
//!
//! Expected reply shape (extra fields are ignored):
//!
//! ```json
//! {
//!   "narrative": "…what the character says or does…",
//!   "emotions": { "JOY": 0.1, "TRUST": -0.05 },
//!   "affinity_change": 0.05,
//!   "relationship_changes": { "bob": -0.1 },
//!   "location_change": null,
//!   "memory": { "content": "…", "kind": "episodic", "salience": 0.6, "supersedes": null },
//!   "character_id": "sample_npc"
//! }
//! ```
//!
//! `narrative`, `emotions` and `affinity_change` are required and never
//! defaulted. The object may be wrapped in a Markdown fence or prose.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::config::StateBounds;
use crate::delta::StateDelta;
use crate::error::{CoreError, Result};
use crate::memory::MemoryDraft;
use crate::types::{CharacterId, EmotionKind, LocationId, MemoryId, MemoryKind};
use crate::world::WorldState;

#[derive(Debug, Deserialize)]
struct WireReply {
    narrative: String,
    emotions: BTreeMap<String, f32>,
    affinity_change: f32,
    #[serde(default)]
    relationship_changes: BTreeMap<String, f32>,
    #[serde(default)]
    location_change: Option<String>,
    #[serde(default)]
    memory: Option<WireMemory>,
    #[serde(default)]
    character_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMemory {
    content: String,
    #[serde(default)]
    kind: Option<String>,
    salience: f32,
    #[serde(default)]
    supersedes: Option<String>,
}

/// Decodes model replies against a set of value bounds.
#[derive(Debug, Clone, Default)]
pub struct ResponseParser {
    bounds: StateBounds,
}

impl ResponseParser {
    /// Create a parser that rejects deltas outside `bounds.max_plausible_delta`.
    #[must_use]
    pub fn new(bounds: StateBounds) -> Self {
        Self { bounds }
    }

    /// Decode `model_output` into a delta for `expected`.
    ///
    /// # Errors
    /// Returns [`CoreError::MalformedResponse`] when the output is not the
    /// expected shape, names another character, repeats or misnames an
    /// emotion, carries a non-finite or implausibly large delta, or
    /// references a location or character that does not exist.
    pub fn parse(&self, model_output: &str, expected: &CharacterId, world: &WorldState) -> Result<StateDelta> {
        let json = extract_json_object(model_output)
            .ok_or_else(|| malformed("no JSON object found in model output"))?;
        let reply: WireReply =
            serde_json::from_str(json).map_err(|e| malformed(format!("JSON decode failed: {e}")))?;

        if let Some(named) = reply.character_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            if named != expected.as_str() {
                return Err(malformed(format!("reply is for '{named}', expected '{expected}'")));
            }
        }

        let mut emotion_changes = BTreeMap::new();
        for (name, change) in reply.emotions {
            let kind: EmotionKind = name.parse().map_err(malformed)?;
            self.check_plausible(&format!("emotion {kind}"), change)?;
            if emotion_changes.insert(kind, change).is_some() {
                return Err(malformed(format!("emotion {kind} given more than once")));
            }
        }
        self.check_plausible("affinity_change", reply.affinity_change)?;

        let mut relationship_changes = BTreeMap::new();
        for (raw, change) in reply.relationship_changes {
            let other = CharacterId::new(raw.trim());
            if &other == expected {
                return Err(malformed("relationship change toward oneself"));
            }
            if !world.locations().any(|l| l.occupants.contains(&other)) {
                return Err(malformed(format!("relationship change toward unknown character '{other}'")));
            }
            self.check_plausible(&format!("relationship with {other}"), change)?;
            relationship_changes.insert(other, change);
        }

        let location_change = match reply.location_change.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let id = LocationId::new(raw);
                if !world.contains(&id) {
                    return Err(malformed(format!("unknown location '{raw}'")));
                }
                Some(id)
            }
        };

        let memory_candidate = match reply.memory {
            Some(m) if !m.content.trim().is_empty() => Some(memory_draft(m)?),
            _ => None,
        };

        Ok(StateDelta {
            character_id: expected.clone(),
            emotion_changes,
            affinity_change: reply.affinity_change,
            relationship_changes,
            location_change,
            memory_candidate,
            narrative_text: reply.narrative.trim().to_string(),
        })
    }

    fn check_plausible(&self, field: &str, value: f32) -> Result<()> {
        if self.bounds.is_plausible(value) {
            Ok(())
        } else {
            Err(malformed(format!(
                "{field} = {value} is not a finite change within ±{}",
                self.bounds.max_plausible_delta
            )))
        }
    }
}

/// Decode with default bounds.
///
/// # Errors
/// See [`ResponseParser::parse`].
pub fn parse(model_output: &str, expected: &CharacterId, world: &WorldState) -> Result<StateDelta> {
    ResponseParser::default().parse(model_output, expected, world)
}

fn memory_draft(m: WireMemory) -> Result<MemoryDraft> {
    if !m.salience.is_finite() {
        return Err(malformed("memory salience is not a finite number"));
    }
    let kind = match m.kind.as_deref().map(str::trim) {
        None | Some("") => MemoryKind::Episodic,
        Some(raw) => raw.parse().map_err(malformed)?,
    };
    let supersedes = match m.supersedes.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => {
            let raw = raw.trim_start_matches('#');
            Some(
                raw.parse::<MemoryId>()
                    .map_err(|e| malformed(format!("bad supersedes id '{raw}': {e}")))?,
            )
        }
    };
    Ok(MemoryDraft {
        content: m.content.trim().to_string(),
        kind,
        salience: m.salience,
        supersedes,
    })
}

fn malformed(reason: impl Into<String>) -> CoreError {
    CoreError::MalformedResponse(reason.into())
}

/// The first balanced `{…}` object in `text`, honouring JSON string escapes.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}
