//! Action Router — turns raw player text into routed intents.
//!
//! Routing is a pure function of the text and a state snapshot:
//!
//! 1. Find name spans: characters (full name, aliases, name parts), locations
//!    (name or ID) and items lying anywhere in the world. Matching is
//!    case-insensitive containment; a longer span shadows any shorter span it
//!    overlaps.
//! 2. Resolve each surviving span against the player's location. Two in-scope
//!    characters on one span is an [`CoreError::AmbiguousTarget`].
//! 3. Classify the verb with a closed cue vocabulary, using the fixed priority
//!    *named character > movement > inspection > item use > dialogue*.
//!
//! Output: one intent per addressed character, at most one environment
//! intent, and one `NoSuchTarget` intent per known name that is out of scope.
//! A character named out of scope is never replaced by the focused one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::character::CharacterState;
use crate::error::{CoreError, Result};
use crate::types::{ActionKind, CharacterId, ItemId, LocationId};
use crate::world::WorldState;

/// Who an intent is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Addressee {
    /// A character in the player's location.
    Character(CharacterId),
    /// The surroundings (movement, inspection, item use, talking to nobody).
    Environment,
    /// A known name that is not reachable from here. Routed to no one.
    NoSuchTarget(String),
}

/// Something an intent refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetRef {
    /// A character.
    Character(CharacterId),
    /// An item.
    Item(ItemId),
    /// A location.
    Location(LocationId),
}

/// Parsed representation of a player action, before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// The player's text, unmodified.
    pub raw_text: String,
    /// What kind of action this is.
    pub action_kind: ActionKind,
    /// Referenced characters, items and locations, in text order.
    pub targets: Vec<TargetRef>,
    /// Who should respond.
    pub addressee: Addressee,
}

impl Intent {
    /// The addressed character, if any.
    #[must_use]
    pub fn character(&self) -> Option<&CharacterId> {
        match &self.addressee {
            Addressee::Character(id) => Some(id),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Verb vocabulary
// ---------------------------------------------------------------------------

const MOVEMENT_CUES: &[&str] = &[
    "行く", "向かう", "移動", "入る", "戻る", "go", "move", "walk", "enter", "travel", "head",
];
const INSPECT_CUES: &[&str] = &[
    "調べる", "見る", "見回", "観察", "調査", "examine", "look", "inspect", "search", "observe",
];
const USE_CUES: &[&str] = &["使う", "使用", "飲む", "食べる", "use", "drink", "eat", "apply"];
const DIALOGUE_CUES: &[&str] = &[
    "話す", "話しかけ", "挨拶", "聞く", "言う", "尋ねる", "say", "ask", "talk", "greet", "tell",
];

/// Vocabulary in priority order.
const VOCABULARY: &[(ActionKind, &[&str])] = &[
    (ActionKind::Move, MOVEMENT_CUES),
    (ActionKind::Inspect, INSPECT_CUES),
    (ActionKind::UseItem, USE_CUES),
    (ActionKind::Dialogue, DIALOGUE_CUES),
];

/// English inflections accepted after an ASCII cue.
const ASCII_SUFFIXES: &[&str] = &["", "s", "es", "d", "ed", "ing"];

/// Classify text by verb cues alone. Falls back to dialogue.
#[must_use]
pub fn classify(text: &str) -> ActionKind {
    let lowered = text.to_lowercase();
    VOCABULARY
        .iter()
        .find(|(_, cues)| cues.iter().any(|cue| contains_cue(&lowered, cue)))
        .map_or(ActionKind::Dialogue, |(kind, _)| *kind)
}

fn contains_cue(lowered: &str, cue: &str) -> bool {
    if !cue.is_ascii() {
        return lowered.contains(cue);
    }
    if contains_word(lowered, cue, ASCII_SUFFIXES) {
        return true;
    }
    // use → using, move → moving
    cue.strip_suffix('e')
        .is_some_and(|stem| contains_word(lowered, stem, &["ing"]))
}

fn contains_word(lowered: &str, cue: &str, suffixes: &[&str]) -> bool {
    lowered.match_indices(cue).any(|(start, _)| {
        let end = start + cue.len();
        let left_ok = lowered[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_ascii_alphanumeric());
        let tail: String = lowered[end..]
            .chars()
            .take_while(char::is_ascii_alphanumeric)
            .collect();
        left_ok && suffixes.contains(&tail.as_str())
    })
}

// ---------------------------------------------------------------------------
// Name spans
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Span {
    start: usize,
    end: usize,
    width: usize,
    label: String,
    hits: Vec<TargetRef>,
}

impl Span {
    fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

fn find_spans(lowered: &str, key: &str) -> Vec<(usize, usize)> {
    let needle = key.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    lowered
        .match_indices(needle.as_str())
        .map(|(start, m)| (start, start + m.len()))
        .filter(|(start, end)| {
            if !needle.is_ascii() {
                return true;
            }
            let left = lowered[..*start].chars().next_back();
            let right = lowered[*end..].chars().next();
            left.is_none_or(|c| !c.is_ascii_alphanumeric())
                && right.is_none_or(|c| !c.is_ascii_alphanumeric())
        })
        .collect()
}

/// Keys a character can be referred to by.
fn character_keys(character: &CharacterState) -> Vec<String> {
    let persona = character.persona();
    let mut keys = vec![persona.name.clone()];
    keys.extend(persona.aliases.iter().cloned());
    let parts: Vec<&str> = persona
        .name
        .split(|c: char| c.is_whitespace() || c == '・' || c == '·')
        .filter(|p| p.chars().count() >= 2)
        .collect();
    if parts.len() > 1 {
        keys.extend(parts.into_iter().map(str::to_string));
    }
    keys
}

fn collect_spans(
    lowered: &str,
    world: &WorldState,
    characters: &BTreeMap<CharacterId, CharacterState>,
) -> Vec<Span> {
    let mut by_range: BTreeMap<(usize, usize), Span> = BTreeMap::new();
    let mut add = |key: &str, target: TargetRef| {
        for (start, end) in find_spans(lowered, key) {
            let span = by_range.entry((start, end)).or_insert_with(|| Span {
                start,
                end,
                width: lowered[start..end].chars().count(),
                label: key.trim().to_string(),
                hits: Vec::new(),
            });
            if !span.hits.contains(&target) {
                span.hits.push(target.clone());
            }
        }
    };

    for character in characters.values() {
        for key in character_keys(character) {
            add(&key, TargetRef::Character(character.id().clone()));
        }
    }
    for location in world.locations() {
        add(&location.name, TargetRef::Location(location.id.clone()));
        add(location.id.as_str(), TargetRef::Location(location.id.clone()));
    }
    for location in world.locations() {
        for item in &location.items {
            add(item.as_str(), TargetRef::Item(item.clone()));
        }
    }

    // Longest first; a span survives only if it overlaps nothing already kept.
    let mut spans: Vec<Span> = by_range.into_values().collect();
    spans.sort_by(|a, b| b.width.cmp(&a.width).then(a.start.cmp(&b.start)));
    let mut kept: Vec<Span> = Vec::new();
    for span in spans {
        if !kept.iter().any(|k| k.overlaps(&span)) {
            kept.push(span);
        }
    }
    kept.sort_by_key(|s| s.start);
    kept
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Resolved {
    characters: Vec<CharacterId>,
    refs: Vec<TargetRef>,
    locations: Vec<(LocationId, String)>,
    /// Characters named but not present.
    out_of_scope: Vec<String>,
    /// Items named that lie somewhere else.
    items_elsewhere: Vec<String>,
}

fn resolve_spans(
    spans: Vec<Span>,
    world: &WorldState,
    characters: &BTreeMap<CharacterId, CharacterState>,
) -> Result<Resolved> {
    let here = world.player_location();
    let items_here = world.location(here).map(|l| &l.items);
    let mut resolved = Resolved::default();

    for span in spans {
        let in_scope: Vec<CharacterId> = span
            .hits
            .iter()
            .filter_map(|t| match t {
                TargetRef::Character(id) => Some(id),
                _ => None,
            })
            .filter(|id| characters.get(*id).is_some_and(|c| c.location() == here))
            .cloned()
            .collect();

        if in_scope.len() > 1 {
            return Err(CoreError::AmbiguousTarget {
                name: span.label,
                candidates: in_scope,
            });
        }
        if let Some(id) = in_scope.into_iter().next() {
            if !resolved.characters.contains(&id) {
                resolved.characters.push(id);
            }
            continue;
        }

        let item_here = span.hits.iter().find(|t| match t {
            TargetRef::Item(id) => items_here.is_some_and(|items| items.contains(id)),
            _ => false,
        });
        let location = span.hits.iter().find_map(|t| match t {
            TargetRef::Location(id) => Some(id.clone()),
            _ => None,
        });
        let names_character = span.hits.iter().any(|t| matches!(t, TargetRef::Character(_)));
        if let Some(item) = item_here {
            resolved.refs.push(item.clone());
        } else if let Some(location) = location {
            resolved.locations.push((location, span.label));
        } else if names_character {
            if !resolved.out_of_scope.contains(&span.label) {
                resolved.out_of_scope.push(span.label);
            }
        } else if !resolved.items_elsewhere.contains(&span.label) {
            resolved.items_elsewhere.push(span.label);
        }
    }
    Ok(resolved)
}

/// Route raw player text against a state snapshot.
///
/// `focus` is the character the player is currently talking to; plain
/// dialogue with no named target goes to it when it is in scope.
///
/// # Errors
/// Returns [`CoreError::AmbiguousTarget`] when two in-scope characters match
/// the same span of text. No intents are produced in that case.
pub fn route(
    raw_text: &str,
    world: &WorldState,
    characters: &BTreeMap<CharacterId, CharacterState>,
    focus: Option<&CharacterId>,
) -> Result<Vec<Intent>> {
    let text = raw_text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let lowered = text.to_lowercase();
    let spans = collect_spans(&lowered, world, characters);
    let resolved = resolve_spans(spans, world, characters)?;
    let here = world.player_location();

    let intent = |action_kind, targets, addressee| Intent {
        raw_text: raw_text.to_string(),
        action_kind,
        targets,
        addressee,
    };
    let reachable = |id: &LocationId| id == here || world.is_adjacent(here, id);

    let mut intents = Vec::new();
    // Known names the environment cannot reach either.
    let mut unreachable: Vec<String> = Vec::new();

    if resolved.characters.is_empty() {
        match classify(text) {
            ActionKind::Move => match resolved.locations.first() {
                Some((id, _)) if reachable(id) => intents.push(intent(
                    ActionKind::Move,
                    vec![TargetRef::Location(id.clone())],
                    Addressee::Environment,
                )),
                Some((_, label)) => intents.push(intent(
                    ActionKind::Move,
                    Vec::new(),
                    Addressee::NoSuchTarget(label.clone()),
                )),
                None => intents.push(intent(ActionKind::Move, Vec::new(), Addressee::Environment)),
            },
            ActionKind::Inspect => {
                let mut targets = resolved.refs.clone();
                for (id, label) in &resolved.locations {
                    if reachable(id) {
                        targets.push(TargetRef::Location(id.clone()));
                    } else {
                        unreachable.push(label.clone());
                    }
                }
                unreachable.extend(resolved.items_elsewhere.iter().cloned());
                if !targets.is_empty() || (unreachable.is_empty() && resolved.out_of_scope.is_empty()) {
                    intents.push(intent(ActionKind::Inspect, targets, Addressee::Environment));
                }
            }
            ActionKind::UseItem => {
                unreachable.extend(resolved.items_elsewhere.iter().cloned());
                if !resolved.refs.is_empty() || (unreachable.is_empty() && resolved.out_of_scope.is_empty()) {
                    intents.push(intent(ActionKind::UseItem, resolved.refs.clone(), Addressee::Environment));
                }
            }
            ActionKind::Dialogue => {
                let focused = focus
                    .filter(|id| characters.get(*id).is_some_and(|c| c.location() == here))
                    .filter(|_| resolved.out_of_scope.is_empty());
                match focused {
                    Some(id) => {
                        let mut targets = vec![TargetRef::Character(id.clone())];
                        targets.extend(resolved.refs.iter().cloned());
                        intents.push(intent(
                            ActionKind::Dialogue,
                            targets,
                            Addressee::Character(id.clone()),
                        ));
                    }
                    // Talking to an absent character is only a no-such-target report.
                    None if !resolved.out_of_scope.is_empty() => {}
                    None => intents.push(intent(
                        ActionKind::Dialogue,
                        resolved.refs.clone(),
                        Addressee::Environment,
                    )),
                }
            }
        }
    } else {
        for id in &resolved.characters {
            let mut targets = vec![TargetRef::Character(id.clone())];
            targets.extend(resolved.refs.iter().cloned());
            targets.extend(resolved.locations.iter().map(|(l, _)| TargetRef::Location(l.clone())));
            intents.push(intent(ActionKind::Dialogue, targets, Addressee::Character(id.clone())));
        }
    }

    for name in resolved.out_of_scope {
        intents.push(intent(ActionKind::Dialogue, Vec::new(), Addressee::NoSuchTarget(name)));
    }
    for name in unreachable {
        intents.push(intent(classify(text), Vec::new(), Addressee::NoSuchTarget(name)));
    }
    Ok(intents)
}
