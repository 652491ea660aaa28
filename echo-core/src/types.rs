//! Identifiers and closed vocabularies shared across EchoArena.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for a character (e.g. `"sample_npc"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub String);

impl CharacterId {
    /// Create a character ID from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CharacterId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unique identifier for a location (e.g. `"magic_academy"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(pub String);

impl LocationId {
    /// Create a location ID from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocationId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Item identifier. Items are named by their display text (e.g. `"魔法の杖"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Create an item ID from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier (also the display name).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unique identifier for a single memory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Generate a new random memory ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MemoryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

// ---------------------------------------------------------------------------
// Turn counter
// ---------------------------------------------------------------------------

/// Monotonic turn counter. One turn = one resolved player input.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Turn(pub u64);

impl Turn {
    /// The turn after this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// How many turns have elapsed since `earlier` (0 if `earlier` is in the future).
    #[must_use]
    pub fn since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "turn {}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Emotions
// ---------------------------------------------------------------------------

/// The closed set of emotions a character can feel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmotionKind {
    /// Happiness, delight.
    Joy,
    /// Grief, sorrow.
    Sadness,
    /// Irritation up to rage.
    Anger,
    /// Anxiety up to terror.
    Fear,
    /// Revulsion.
    Disgust,
    /// Astonishment.
    Surprise,
    /// Confidence in the other party.
    Trust,
    /// Eagerness about what comes next.
    Anticipation,
    /// Affection.
    Love,
    /// Loathing.
    Hate,
}

impl EmotionKind {
    /// Every emotion, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Joy,
        Self::Sadness,
        Self::Anger,
        Self::Fear,
        Self::Disgust,
        Self::Surprise,
        Self::Trust,
        Self::Anticipation,
        Self::Love,
        Self::Hate,
    ];

    /// Wire name, as used in model replies and snapshots.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Joy => "JOY",
            Self::Sadness => "SADNESS",
            Self::Anger => "ANGER",
            Self::Fear => "FEAR",
            Self::Disgust => "DISGUST",
            Self::Surprise => "SURPRISE",
            Self::Trust => "TRUST",
            Self::Anticipation => "ANTICIPATION",
            Self::Love => "LOVE",
            Self::Hate => "HATE",
        }
    }
}

impl fmt::Display for EmotionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionKind {
    type Err = String;

    /// Case-insensitive; accepts `"joy"`, `"Joy"` and `"JOY"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown emotion: '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Actions & memory kinds
// ---------------------------------------------------------------------------

/// What kind of action a routed player input represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Talking to someone (or to nobody in particular).
    Dialogue,
    /// Moving to another location.
    Move,
    /// Looking at the surroundings or at something specific.
    Inspect,
    /// Using an item.
    UseItem,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dialogue => "dialogue",
            Self::Move => "move",
            Self::Inspect => "inspect",
            Self::UseItem => "use_item",
        };
        f.write_str(name)
    }
}

/// Category of a memory item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Something that happened.
    #[default]
    Episodic,
    /// Something about a relationship with someone.
    Relational,
    /// Something the character now knows.
    Factual,
}

impl FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "episodic" => Ok(Self::Episodic),
            "relational" => Ok(Self::Relational),
            "factual" => Ok(Self::Factual),
            _ => Err(format!("unknown memory kind: '{s}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// World vocabularies
// ---------------------------------------------------------------------------

/// Current weather.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    /// Clear skies.
    #[default]
    Sunny,
    /// Overcast.
    Cloudy,
    /// Rain.
    Rainy,
    /// Thunderstorm.
    Stormy,
    /// Fog.
    Foggy,
    /// Snow.
    Snowy,
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sunny => "sunny",
            Self::Cloudy => "cloudy",
            Self::Rainy => "rainy",
            Self::Stormy => "stormy",
            Self::Foggy => "foggy",
            Self::Snowy => "snowy",
        };
        f.write_str(name)
    }
}

/// Coarse time-of-day bucket derived from the world clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    /// 05:00–06:59
    Dawn,
    /// 07:00–09:59
    Morning,
    /// 10:00–13:59
    Noon,
    /// 14:00–16:59
    Afternoon,
    /// 17:00–19:59
    Evening,
    /// 20:00–22:59
    Night,
    /// 23:00–04:59
    Midnight,
}

impl TimeOfDay {
    /// Bucket a wall-clock time.
    #[must_use]
    pub fn from_clock(clock: NaiveTime) -> Self {
        match clock.hour() {
            5..=6 => Self::Dawn,
            7..=9 => Self::Morning,
            10..=13 => Self::Noon,
            14..=16 => Self::Afternoon,
            17..=19 => Self::Evening,
            20..=22 => Self::Night,
            _ => Self::Midnight,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dawn => "dawn",
            Self::Morning => "morning",
            Self::Noon => "noon",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Night => "night",
            Self::Midnight => "midnight",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

/// Totally ordered retrieval score (higher = more relevant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct RetrievalScore(pub OrderedFloat<f64>);

impl RetrievalScore {
    /// Wrap a raw score.
    #[must_use]
    pub fn new(score: f64) -> Self {
        Self(OrderedFloat(score))
    }

    /// The raw score.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0.into_inner()
    }
}
