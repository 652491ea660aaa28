//! World state: clock, weather, locations, the player's position and a log
//! of world-wide events.
//!
//! Reads are public. Mutation after session start is crate-private and only
//! reachable through [`crate::tracker::StateTracker`].

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::character::CharacterState;
use crate::error::{CoreError, Result};
use crate::types::{CharacterId, ItemId, LocationId, TimeOfDay, Turn, Weather};

/// A place in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Unique ID.
    pub id: LocationId,
    /// Display name, matched against player text.
    pub name: String,
    /// Prose description.
    pub description: String,
    /// Locations reachable from here.
    #[serde(default)]
    pub adjacent: BTreeSet<LocationId>,
    /// Characters currently standing here.
    #[serde(default)]
    pub occupants: BTreeSet<CharacterId>,
    /// Items lying here.
    #[serde(default)]
    pub items: BTreeSet<ItemId>,
}

impl Location {
    /// Create an empty location.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: LocationId::new(id),
            name: name.into(),
            description: description.into(),
            adjacent: BTreeSet::new(),
            occupants: BTreeSet::new(),
            items: BTreeSet::new(),
        }
    }

    /// Add an item lying at this location.
    #[must_use]
    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.items.insert(ItemId::new(item));
        self
    }
}

/// Something that happened to the whole world, visible to every character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalEvent {
    /// Turn the event was recorded on.
    pub turn: Turn,
    /// What happened.
    pub text: String,
}

/// Shared world state for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    clock: NaiveTime,
    weather: Weather,
    locations: BTreeMap<LocationId, Location>,
    player_location: LocationId,
    turn: Turn,
    #[serde(default)]
    events: VecDeque<GlobalEvent>,
}

impl WorldState {
    /// Create a world with the player standing at `player_location`.
    ///
    /// The location must be added with [`Self::with_location`] before the
    /// world is handed to a tracker.
    #[must_use]
    pub fn new(player_location: impl Into<String>, clock: NaiveTime) -> Self {
        Self {
            clock,
            weather: Weather::default(),
            locations: BTreeMap::new(),
            player_location: LocationId::new(player_location),
            turn: Turn::default(),
            events: VecDeque::new(),
        }
    }

    /// Add a location. Occupants are cleared; characters are placed by the tracker.
    #[must_use]
    pub fn with_location(mut self, mut location: Location) -> Self {
        location.occupants.clear();
        self.locations.insert(location.id.clone(), location);
        self
    }

    /// Connect two locations in both directions. Unknown IDs are ignored.
    #[must_use]
    pub fn connect(mut self, a: &str, b: &str) -> Self {
        let (a, b) = (LocationId::new(a), LocationId::new(b));
        if self.locations.contains_key(&a) && self.locations.contains_key(&b) && a != b {
            if let Some(loc) = self.locations.get_mut(&a) {
                loc.adjacent.insert(b.clone());
            }
            if let Some(loc) = self.locations.get_mut(&b) {
                loc.adjacent.insert(a);
            }
        }
        self
    }

    /// Set the initial weather.
    #[must_use]
    pub fn with_weather(mut self, weather: Weather) -> Self {
        self.weather = weather;
        self
    }

    // -- reads ---------------------------------------------------------------

    /// Wall-clock time.
    #[must_use]
    pub fn clock(&self) -> NaiveTime {
        self.clock
    }

    /// Time-of-day bucket for the current clock.
    #[must_use]
    pub fn time_of_day(&self) -> TimeOfDay {
        TimeOfDay::from_clock(self.clock)
    }

    /// Current weather.
    #[must_use]
    pub fn weather(&self) -> Weather {
        self.weather
    }

    /// Current turn.
    #[must_use]
    pub fn turn(&self) -> Turn {
        self.turn
    }

    /// Where the player stands.
    #[must_use]
    pub fn player_location(&self) -> &LocationId {
        &self.player_location
    }

    /// Look up a location.
    #[must_use]
    pub fn location(&self, id: &LocationId) -> Option<&Location> {
        self.locations.get(id)
    }

    /// Whether a location exists.
    #[must_use]
    pub fn contains(&self, id: &LocationId) -> bool {
        self.locations.contains_key(id)
    }

    /// All locations, ordered by ID.
    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.locations.values()
    }

    /// Whether `to` is reachable in one step from `from`.
    #[must_use]
    pub fn is_adjacent(&self, from: &LocationId, to: &LocationId) -> bool {
        self.locations
            .get(from)
            .is_some_and(|loc| loc.adjacent.contains(to))
    }

    /// The last `n` world events, oldest first.
    pub fn recent_events(&self, n: usize) -> impl Iterator<Item = &GlobalEvent> {
        self.events.iter().skip(self.events.len().saturating_sub(n))
    }

    /// Every retained world event, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &GlobalEvent> {
        self.events.iter()
    }

    // -- crate-private mutation ------------------------------------------------

    pub(crate) fn set_player_location(&mut self, to: LocationId) {
        self.player_location = to;
    }

    pub(crate) fn place(&mut self, character: &CharacterId, at: &LocationId) {
        if let Some(loc) = self.locations.get_mut(at) {
            loc.occupants.insert(character.clone());
        }
    }

    pub(crate) fn relocate(&mut self, character: &CharacterId, from: &LocationId, to: &LocationId) {
        if let Some(loc) = self.locations.get_mut(from) {
            loc.occupants.remove(character);
        }
        self.place(character, to);
    }

    pub(crate) fn advance_turn(&mut self) -> Turn {
        self.turn = self.turn.next();
        self.turn
    }

    pub(crate) fn advance_clock(&mut self, minutes: i64) {
        self.clock = self.clock.overflowing_add_signed(Duration::minutes(minutes)).0;
    }

    pub(crate) fn set_weather(&mut self, weather: Weather) {
        self.weather = weather;
    }

    /// Append an event, dropping the oldest beyond `capacity`.
    pub(crate) fn record_event(&mut self, text: String, capacity: usize) {
        self.events.push_back(GlobalEvent { turn: self.turn, text });
        while self.events.len() > capacity {
            self.events.pop_front();
        }
    }

    /// Verify the structural invariants against a set of characters.
    ///
    /// - the player's location exists
    /// - every adjacency edge points at an existing location
    /// - every character stands at an existing location
    /// - each location's occupant set is exactly the characters standing there
    ///
    /// # Errors
    /// Returns `CoreError::InvalidState` naming the first violation.
    pub fn check_invariants(&self, characters: &BTreeMap<CharacterId, CharacterState>) -> Result<()> {
        if !self.contains(&self.player_location) {
            return Err(CoreError::InvalidState(format!(
                "player location '{}' does not exist",
                self.player_location
            )));
        }
        for loc in self.locations.values() {
            if let Some(missing) = loc.adjacent.iter().find(|a| !self.contains(a)) {
                return Err(CoreError::InvalidState(format!(
                    "location '{}' is adjacent to unknown location '{missing}'",
                    loc.id
                )));
            }
            for occupant in &loc.occupants {
                let here = characters.get(occupant).is_some_and(|c| c.location() == &loc.id);
                if !here {
                    return Err(CoreError::InvalidState(format!(
                        "location '{}' lists occupant '{occupant}' who is not there",
                        loc.id
                    )));
                }
            }
        }
        for (id, character) in characters {
            let listed = self
                .locations
                .get(character.location())
                .is_some_and(|loc| loc.occupants.contains(id));
            if !listed {
                return Err(CoreError::InvalidState(format!(
                    "character '{id}' stands at '{}' but is not listed there",
                    character.location()
                )));
            }
        }
        Ok(())
    }
}
