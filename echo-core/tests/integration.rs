//! Integration Tests — end-to-end core flows
//!
//! Route → retrieve → build → parse → apply, plus the persistence boundary.

use std::sync::Arc;

use chrono::NaiveTime;

use echo_core::config::{EchoConfig, MemoryConfig};
use echo_core::context::PromptBuilder;
use echo_core::delta::StateDelta;
use echo_core::error::CoreError;
use echo_core::eviction::{self, Overflow};
use echo_core::memory::{MemoryDraft, MemoryItem, MemoryStore};
use echo_core::parser::ResponseParser;
use echo_core::router::{self, Addressee};
use echo_core::snapshot::SessionSnapshot;
use echo_core::tracker::StateTracker;
use echo_core::types::{ActionKind, CharacterId, EmotionKind, LocationId, MemoryKind, Turn};
use echo_core::world::{Location, WorldState};
use echo_core::{CharacterState, Persona};

fn world() -> WorldState {
    WorldState::new("magic_academy", NaiveTime::from_hms_opt(10, 0, 0).expect("valid time"))
        .with_location(
            Location::new("magic_academy", "魔法学院", "古い石造りの学院。").with_item("魔法の杖"),
        )
        .with_location(Location::new("city_square", "中央広場", "賑やかな広場。"))
        .with_location(Location::new("inn", "宿屋", "暖炉のある宿。"))
        .connect("magic_academy", "city_square")
        .connect("city_square", "inn")
}

fn alice_persona() -> Arc<Persona> {
    Arc::new(
        Persona::new("アリス", "魔法学院の生徒", "好奇心旺盛で明るい")
            .with_background("幼い頃から魔法に憧れていた。"),
    )
}

fn session() -> StateTracker {
    let tracker = StateTracker::new(world(), &EchoConfig::default()).expect("valid world");
    tracker
        .add_character(
            CharacterState::new("sample_npc", alice_persona(), "magic_academy")
                .with_emotion(EmotionKind::Joy, 0.7)
                .with_emotion(EmotionKind::Trust, 0.6)
                .with_emotion(EmotionKind::Anticipation, 0.8),
        )
        .expect("added");
    tracker
}

fn alice() -> CharacterId {
    CharacterId::new("sample_npc")
}

// ---------------------------------------------------------------------------
// Full turn through the core
// ---------------------------------------------------------------------------

#[test]
fn full_turn_through_core() {
    let tracker = session();
    let snap = tracker.snapshot();

    // 1. Route
    let intents = router::route("アリスに挨拶する", &snap.world, &snap.characters, None).expect("routes");
    assert_eq!(intents.len(), 1);
    let intent = &intents[0];
    assert_eq!(intent.action_kind, ActionKind::Dialogue);
    assert_eq!(intent.addressee, Addressee::Character(alice()));

    // 2. Retrieve + build
    let character = &snap.characters[&alice()];
    let memory = tracker
        .memory_manager()
        .retrieve_context(character.memory(), intent, snap.world.turn());
    assert!(memory.is_empty());
    let ctx = PromptBuilder::default().build(character, &snap.world, intent, &memory, &snap.characters);
    assert!(ctx.persona.contains("アリス"));
    assert!(ctx.world_lines.iter().any(|l| l.contains("魔法学院")));

    // 3. Parse the model's reply
    let reply = r#"```json
    {"narrative": "こんにちは！今日はいい天気ですね。",
     "emotions": {"JOY": 0.1},
     "affinity_change": 0.1,
     "memory": {"content": "プレイヤーが挨拶してくれた", "kind": "relational", "salience": 0.6}}
    ```"#;
    let delta = ResponseParser::default()
        .parse(reply, &alice(), &snap.world)
        .expect("parses");

    // 4. Apply
    tracker.begin(&alice()).expect("begin");
    let state = tracker.apply(&delta).expect("applies");
    tracker.settle(&alice()).expect("settle");
    tracker.advance_turn();

    assert!((state.emotion(EmotionKind::Joy) - 0.8).abs() < 1e-6);
    assert!((state.affinity() - 0.1).abs() < 1e-6);
    assert_eq!(state.memory().short_term().len(), 1);

    // 5. Next turn retrieves what was just remembered
    let snap = tracker.snapshot();
    let intents = router::route("アリス、さっきの挨拶を覚えてる？", &snap.world, &snap.characters, None)
        .expect("routes");
    let memory = tracker.memory_manager().retrieve_context(
        snap.characters[&alice()].memory(),
        &intents[0],
        snap.world.turn(),
    );
    assert_eq!(memory.len(), 1);
    assert_eq!(memory[0].content, "プレイヤーが挨拶してくれた");
}

// ---------------------------------------------------------------------------
// Named scenarios
// ---------------------------------------------------------------------------

#[test]
fn ambiguous_name_in_scope_produces_no_intents() {
    let tracker = session();
    tracker
        .add_character(CharacterState::new("alice_twin", alice_persona(), "magic_academy"))
        .expect("added");
    let snap = tracker.snapshot();
    let result = router::route("アリスに挨拶する", &snap.world, &snap.characters, None);
    match result {
        Err(CoreError::AmbiguousTarget { name, candidates }) => {
            assert_eq!(name, "アリス");
            assert!(candidates.contains(&alice()));
            assert!(candidates.contains(&CharacterId::new("alice_twin")));
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
}

#[test]
fn affinity_near_max_plus_large_change_clamps_to_one() {
    let tracker = StateTracker::new(world(), &EchoConfig::default()).expect("valid world");
    tracker
        .add_character(CharacterState::new("sample_npc", alice_persona(), "magic_academy").with_affinity(0.9))
        .expect("added");
    let state = tracker
        .apply(&StateDelta::narrative(alice(), "ありがとう！").with_affinity(5.0))
        .expect("applies");
    assert!((state.affinity() - 1.0).abs() < f32::EPSILON);
}

#[test]
fn full_short_term_evicts_oldest_low_salience_item() {
    let config = MemoryConfig {
        short_term_capacity: 5,
        ..MemoryConfig::default()
    };
    let mut store = MemoryStore::new();
    let mut ids = Vec::new();
    for turn in 0..5 {
        let item = MemoryItem::new(format!("雑談 {turn}"), MemoryKind::Episodic, Turn(turn), 0.1);
        ids.push(item.id);
        eviction::admit(&mut store, item, &config);
    }
    let outcome = eviction::admit(
        &mut store,
        MemoryItem::new("雑談 5", MemoryKind::Episodic, Turn(5), 0.1),
        &config,
    );
    assert_eq!(outcome, vec![Overflow::Evicted(ids[0])]);
    assert_eq!(store.short_term().len(), 5);
    assert!(store.long_term().is_empty());
}

#[test]
fn delta_with_unknown_location_is_rejected_and_state_unchanged() {
    let tracker = session();
    let before = tracker.snapshot();
    let delta = StateDelta::narrative(alice(), "月へ行きます")
        .with_emotion(EmotionKind::Joy, 0.2)
        .with_location("the_moon")
        .with_memory(MemoryDraft::episodic("月へ旅立った", 0.9));
    let err = tracker.apply(&delta).expect_err("rejected");
    assert!(matches!(err, CoreError::InvalidDelta { .. }));
    assert_eq!(tracker.snapshot(), before);
}

// ---------------------------------------------------------------------------
// Persistence boundary
// ---------------------------------------------------------------------------

#[test]
fn snapshot_json_round_trip_restores_session() {
    let tracker = session();
    tracker
        .apply(
            &StateDelta::narrative(alice(), "広場へ行こう")
                .with_location("city_square")
                .with_memory(MemoryDraft::episodic("広場へ移動した", 0.4)),
        )
        .expect("applies");
    tracker.advance_turn();
    let saved = tracker.snapshot();
    let json = saved.to_json().expect("serialises");

    let loaded = SessionSnapshot::from_json(&json).expect("loads");
    assert_eq!(loaded, saved);

    let fresh = StateTracker::new(world(), &EchoConfig::default()).expect("valid world");
    fresh.restore(loaded).expect("restores");
    let alice_state = fresh.character(&alice()).expect("restored");
    assert_eq!(alice_state.location(), &LocationId::new("city_square"));
    assert_eq!(alice_state.memory().len(), 1);
    assert_eq!(fresh.snapshot().world.turn(), Turn(1));
}

#[test]
fn corrupted_snapshot_is_refused() {
    let tracker = session();
    let mut snap = tracker.snapshot();
    // Character claims to stand somewhere it is not listed.
    let moved = CharacterState::new("sample_npc", alice_persona(), "inn");
    snap.characters.insert(alice(), moved);
    assert!(matches!(
        snap.validate(&echo_core::config::StateBounds::default()),
        Err(CoreError::InvalidState(_))
    ));
    let before = tracker.snapshot();
    assert!(tracker.restore(snap).is_err());
    assert_eq!(tracker.snapshot(), before);

    let mut wrong_version = tracker.snapshot();
    wrong_version.schema_version = 99;
    assert!(tracker.restore(wrong_version).is_err());
}

#[test]
fn parser_rejects_and_tracker_never_sees_bad_output() {
    let tracker = session();
    let before = tracker.snapshot();
    let parser = ResponseParser::default();
    for reply in [
        "I'd rather not answer in JSON.",
        r#"{"narrative": "x", "emotions": {"JOY": 0.1}}"#,
        r#"{"narrative": "x", "emotions": {"ENNUI": 0.1}, "affinity_change": 0}"#,
    ] {
        assert!(matches!(
            parser.parse(reply, &alice(), &before.world),
            Err(CoreError::MalformedResponse(_))
        ));
    }
    assert_eq!(tracker.snapshot(), before);
}

#[test]
fn characters_elsewhere_are_reported_not_routed() {
    let tracker = session();
    tracker
        .add_character(CharacterState::new(
            "innkeeper",
            Arc::new(Persona::new("マルタ", "宿屋の女将", "世話好き")),
            "inn",
        ))
        .expect("added");
    let snap = tracker.snapshot();
    let intents = router::route("アリスとマルタに挨拶", &snap.world, &snap.characters, None).expect("routes");
    assert_eq!(intents.len(), 2);
    assert_eq!(intents[0].addressee, Addressee::Character(alice()));
    assert_eq!(intents[1].addressee, Addressee::NoSuchTarget("マルタ".into()));
}
