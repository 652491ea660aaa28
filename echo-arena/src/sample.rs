//! Built-in sample scene: a magic academy, the square beside it and an inn.

use std::sync::Arc;

use chrono::NaiveTime;

use echo_core::error::Result;
use echo_core::world::{Location, WorldState};
use echo_core::{CharacterState, EchoConfig, EmotionKind, Persona, StateTracker, Weather};

/// ID of the sample character.
pub const SAMPLE_CHARACTER: &str = "sample_npc";

/// The sample world at noon, player at the academy.
#[must_use]
pub fn world() -> WorldState {
    let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default();
    WorldState::new("magic_academy", noon)
        .with_weather(Weather::Sunny)
        .with_location(
            Location::new(
                "magic_academy",
                "魔法学園",
                "若い魔法使いたちが学ぶ巨大な学園。古い石造りの建物には数千年の歴史がある。",
            )
            .with_item("魔法の杖")
            .with_item("古い魔道書")
            .with_item("クリスタルボール"),
        )
        .with_location(
            Location::new(
                "city_square",
                "中央広場",
                "王国の中心に位置する広い広場。噴水や露店が立ち並び、常に人で賑わっている。",
            )
            .with_item("水筒")
            .with_item("パン")
            .with_item("リンゴ"),
        )
        .with_location(
            Location::new(
                "inn",
                "冒険者の宿",
                "冒険者たちが集まる古い宿屋。暖炉の火が温かく、様々な噂話が飛び交う。",
            )
            .with_item("ビール")
            .with_item("ろうそく"),
        )
        .connect("magic_academy", "city_square")
        .connect("city_square", "inn")
}

/// アリス, a top student at the academy.
#[must_use]
pub fn alice() -> CharacterState {
    let persona = Persona::new(
        "アリス",
        "魔法学校の優等生。幼い頃から魔法の才能に恵まれ、特に風の魔法が得意。",
        "好奇心旺盛で明るい性格。新しいことを学ぶのが大好きだが、時々夢見がちになることも。人付き合いは得意で、誰とでもすぐに打ち解ける。",
    )
    .with_background(
        "裕福な魔法使いの家庭に生まれ、5歳の時に魔法の才能が開花。現在は魔法学校の上級生として、様々な魔法を学んでいる。将来は魔法研究者になることを夢見ている。",
    );
    CharacterState::new(SAMPLE_CHARACTER, Arc::new(persona), "magic_academy")
        .with_emotion(EmotionKind::Joy, 0.7)
        .with_emotion(EmotionKind::Trust, 0.6)
        .with_emotion(EmotionKind::Anticipation, 0.8)
}

/// A tracker holding the sample world and character.
///
/// # Errors
/// Only if the sample data violates a world invariant.
pub fn tracker(config: &EchoConfig) -> Result<StateTracker> {
    let tracker = StateTracker::new(world(), config)?;
    tracker.add_character(alice())?;
    Ok(tracker)
}
