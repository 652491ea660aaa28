//! Prompt Builder — assembles the size-capped context for one model call.
//!
//! A [`BoundedContext`] has four sections. Persona and the player's utterance
//! are always kept whole. When the total exceeds the character budget, memory
//! lines are dropped first (lowest-ranked first), then world lines (last
//! first). Sizes are counted in Unicode scalar values, not bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::character::CharacterState;
use crate::config::PromptConfig;
use crate::memory::MemoryItem;
use crate::router::Intent;
use crate::types::CharacterId;
use crate::world::WorldState;

/// Size-capped bundle of persona, memory, world and intent data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundedContext {
    /// Character the context was built for.
    pub character_id: CharacterId,
    /// That character's display name.
    pub character_name: String,
    /// Persona summary, current feelings and affinity. Never truncated.
    pub persona: String,
    /// The player's utterance. Never truncated.
    pub utterance: String,
    /// Relevant memories, best first.
    pub memory_lines: Vec<String>,
    /// World snapshot lines.
    pub world_lines: Vec<String>,
    /// Memory lines dropped to fit the budget.
    pub dropped_memory: usize,
    /// World lines dropped to fit the budget.
    pub dropped_world: usize,
    /// The budget this context was built against.
    pub char_budget: usize,
}

impl BoundedContext {
    /// Total size of all sections, in chars (one extra per list line for the newline).
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.persona.chars().count()
            + self.utterance.chars().count()
            + lines_len(&self.memory_lines)
            + lines_len(&self.world_lines)
    }

    /// Whether the context fits its budget. Can be false only when persona and
    /// utterance alone exceed it.
    #[must_use]
    pub fn fits(&self) -> bool {
        self.char_len() <= self.char_budget
    }

    /// Memory lines as one block.
    #[must_use]
    pub fn memory_block(&self) -> String {
        if self.memory_lines.is_empty() {
            "(nothing relevant)".to_string()
        } else {
            self.memory_lines.join("\n")
        }
    }

    /// World lines as one block.
    #[must_use]
    pub fn world_block(&self) -> String {
        self.world_lines.join("\n")
    }
}

fn lines_len(lines: &[String]) -> usize {
    lines.iter().map(|l| l.chars().count() + 1).sum()
}

/// Builds [`BoundedContext`]s. Pure; performs no I/O.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    config: PromptConfig,
}

impl PromptBuilder {
    /// Create a builder.
    #[must_use]
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    /// Build the context for `character` responding to `intent`.
    ///
    /// `memory` must already be ranked best-first (as returned by
    /// [`crate::memory::MemoryManager::retrieve_context`]). `cast` is used to
    /// name the other characters present.
    #[must_use]
    pub fn build(
        &self,
        character: &CharacterState,
        world: &WorldState,
        intent: &Intent,
        memory: &[MemoryItem],
        cast: &BTreeMap<CharacterId, CharacterState>,
    ) -> BoundedContext {
        let mut context = BoundedContext {
            character_id: character.id().clone(),
            character_name: character.persona().name.clone(),
            persona: self.persona_section(character),
            utterance: intent.raw_text.trim().to_string(),
            memory_lines: memory.iter().map(memory_line).collect(),
            world_lines: world_lines(character, world, cast, self.config.recent_events),
            dropped_memory: 0,
            dropped_world: 0,
            char_budget: self.config.char_budget,
        };

        while context.char_len() > context.char_budget && context.memory_lines.pop().is_some() {
            context.dropped_memory += 1;
        }
        while context.char_len() > context.char_budget && context.world_lines.pop().is_some() {
            context.dropped_world += 1;
        }
        if !context.fits() {
            tracing::warn!(
                character = %context.character_id,
                size = context.char_len(),
                budget = context.char_budget,
                "Persona and utterance alone exceed the prompt budget"
            );
        }
        context
    }

    fn persona_section(&self, character: &CharacterState) -> String {
        let persona = character.persona();
        let mut lines = vec![
            format!("Name: {}", persona.name),
            format!("Description: {}", persona.description),
            format!("Personality: {}", persona.personality),
        ];
        if !persona.background.trim().is_empty() {
            lines.push(format!("Background: {}", persona.background));
        }
        let feelings: Vec<String> = character
            .salient_emotions(self.config.emotion_display_threshold)
            .into_iter()
            .map(|(kind, value)| format!("{kind} {value:.2}"))
            .collect();
        if feelings.is_empty() {
            lines.push("Feelings: calm".to_string());
        } else {
            lines.push(format!("Feelings: {}", feelings.join(", ")));
        }
        lines.push(format!("Affinity toward the player: {:.2}", character.affinity()));
        lines.join("\n")
    }
}

fn memory_line(item: &MemoryItem) -> String {
    format!("- [turn {}] {} (#{})", item.timestamp.0, item.content, item.id)
}

fn world_lines(
    character: &CharacterState,
    world: &WorldState,
    cast: &BTreeMap<CharacterId, CharacterState>,
    recent_events: usize,
) -> Vec<String> {
    let mut lines = vec![
        format!("Time: {} ({})", world.time_of_day(), world.clock().format("%H:%M")),
        format!("Weather: {}", world.weather()),
    ];
    if let Some(here) = world.location(character.location()) {
        lines.push(format!("Location: {} ({}): {}", here.name, here.id, here.description));
        let others: Vec<String> = here
            .occupants
            .iter()
            .filter(|id| *id != character.id())
            .filter_map(|id| {
                cast.get(id)
                    .map(|c| format!("{} ({id}, relationship {:+.1})", c.persona().name, character.relationship(id)))
            })
            .collect();
        if !others.is_empty() {
            lines.push(format!("Also present: {}", others.join(", ")));
        }
        if !here.items.is_empty() {
            let items: Vec<&str> = here.items.iter().map(|i| i.as_str()).collect();
            lines.push(format!("Items here: {}", items.join(", ")));
        }
        let exits: Vec<String> = here
            .adjacent
            .iter()
            .filter_map(|id| world.location(id).map(|l| format!("{} ({})", l.name, l.id)))
            .collect();
        if !exits.is_empty() {
            lines.push(format!("Exits: {}", exits.join(", ")));
        }
    }
    if !character.inventory().is_empty() {
        let items: Vec<&str> = character.inventory().iter().map(|i| i.as_str()).collect();
        lines.push(format!("Carrying: {}", items.join(", ")));
    }
    let events: Vec<&str> = world.recent_events(recent_events).map(|e| e.text.as_str()).collect();
    if !events.is_empty() {
        lines.push(format!("Recent events: {}", events.join(" / ")));
    }
    lines
}
