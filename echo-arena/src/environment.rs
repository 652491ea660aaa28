//! Environment-directed actions: movement, inspection, item use, and words
//! spoken to nobody in particular.
//!
//! These are resolved locally without a model call.

use echo_core::router::{Intent, TargetRef};
use echo_core::world::Location;
use echo_core::{ActionKind, ItemId, LocationId, SessionSnapshot, StateTracker};

use crate::error::TurnFailure;
use crate::report::TurnEntry;

/// Resolve one environment intent against the live session.
#[must_use]
pub fn resolve(tracker: &StateTracker, intent: &Intent) -> TurnEntry {
    match intent.action_kind {
        ActionKind::Move => match first_location(intent) {
            Some(to) => move_to(tracker, to),
            None => {
                let snap = tracker.snapshot();
                TurnEntry::environment(format!(
                    "You are not sure where to go.{}",
                    exits_sentence(&snap, snap.world.player_location())
                ))
            }
        },
        ActionKind::Inspect => {
            let snap = tracker.snapshot();
            match first_item(intent) {
                Some(item) => TurnEntry::environment(format!("You examine the {item}. It looks like an ordinary {item}.")),
                None => TurnEntry::environment(describe_here(&snap)),
            }
        }
        ActionKind::UseItem => match first_item(intent) {
            Some(item) => TurnEntry::environment(format!("You use the {item}. Nothing obvious happens.")),
            None => TurnEntry::environment("There is nothing here like that to use."),
        },
        ActionKind::Dialogue => TurnEntry::environment("Your words hang in the air. No one answers."),
    }
}

fn move_to(tracker: &StateTracker, to: &LocationId) -> TurnEntry {
    let here = tracker.snapshot().world.player_location().clone();
    if *to == here {
        return TurnEntry::environment("You are already here.");
    }
    match tracker.move_player(to) {
        Ok(_) => {
            let snap = tracker.snapshot();
            let arrival = snap
                .world
                .location(to)
                .map(|loc| format!("You arrive at {}. {}", loc.name, loc.description))
                .unwrap_or_default();
            TurnEntry::environment(format!("{arrival}{}", present_sentence(&snap, to)))
        }
        Err(err) => TurnEntry::failed(None, TurnFailure::from_core(&err)),
    }
}

/// Scene description of the player's location.
#[must_use]
pub fn describe_here(snap: &SessionSnapshot) -> String {
    let here = snap.world.player_location();
    let Some(location) = snap.world.location(here) else {
        return "You see nothing you recognise.".to_string();
    };
    let mut text = format!(
        "{}: {} It is {} ({}), and the weather is {}.",
        location.name,
        location.description,
        snap.world.time_of_day(),
        snap.world.clock().format("%H:%M"),
        snap.world.weather()
    );
    text.push_str(&present_sentence(snap, here));
    text.push_str(&items_sentence(location));
    text.push_str(&exits_sentence(snap, here));
    text
}

fn present_sentence(snap: &SessionSnapshot, at: &LocationId) -> String {
    let Some(location) = snap.world.location(at) else {
        return String::new();
    };
    let names: Vec<&str> = location
        .occupants
        .iter()
        .filter_map(|id| snap.characters.get(id).map(|c| c.persona().name.as_str()))
        .collect();
    if names.is_empty() {
        String::new()
    } else {
        format!(" Here: {}.", names.join(", "))
    }
}

fn items_sentence(location: &Location) -> String {
    if location.items.is_empty() {
        return String::new();
    }
    let items: Vec<&str> = location.items.iter().map(ItemId::as_str).collect();
    format!(" You notice: {}.", items.join(", "))
}

fn exits_sentence(snap: &SessionSnapshot, at: &LocationId) -> String {
    let Some(location) = snap.world.location(at) else {
        return String::new();
    };
    let exits: Vec<&str> = location
        .adjacent
        .iter()
        .filter_map(|id| snap.world.location(id).map(|l| l.name.as_str()))
        .collect();
    if exits.is_empty() {
        String::new()
    } else {
        format!(" Exits: {}.", exits.join(", "))
    }
}

fn first_location(intent: &Intent) -> Option<&LocationId> {
    intent.targets.iter().find_map(|t| match t {
        TargetRef::Location(id) => Some(id),
        _ => None,
    })
}

fn first_item(intent: &Intent) -> Option<&ItemId> {
    intent.targets.iter().find_map(|t| match t {
        TargetRef::Item(id) => Some(id),
        _ => None,
    })
}
