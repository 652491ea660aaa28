//! End-to-end turns through `ArenaSession` with scripted character models.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use echo_arena::{ArenaSession, CharacterModel, EntryOutcome, TurnFailure, TurnReport, sample};
use echo_core::config::ModelProfile;
use echo_core::tracker::TurnPhase;
use echo_core::{BoundedContext, CharacterId, CharacterState, EchoConfig, EmotionKind, LocationId, Persona};
use echo_llm::LlmError;

// ---------------------------------------------------------------------------
// Scripted models
// ---------------------------------------------------------------------------

/// Answers each character with its own canned reply.
struct PerCharacter(BTreeMap<&'static str, &'static str>);

#[async_trait]
impl CharacterModel for PerCharacter {
    async fn complete(&self, context: &BoundedContext, _: &ModelProfile) -> Result<String, LlmError> {
        self.0
            .get(context.character_id.as_str())
            .map(|reply| (*reply).to_string())
            .ok_or_else(|| LlmError::Unavailable(format!("no script for {}", context.character_id)))
    }
}

/// Never answers within any sane deadline.
struct Stalled;

#[async_trait]
impl CharacterModel for Stalled {
    async fn complete(&self, _: &BoundedContext, _: &ModelProfile) -> Result<String, LlmError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

/// Records the highest number of calls in flight at once.
#[derive(Default)]
struct Gauge {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl CharacterModel for Gauge {
    async fn complete(&self, _: &BoundedContext, _: &ModelProfile) -> Result<String, LlmError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(QUIET.to_string())
    }
}

/// Replies with a fixed reply and keeps the world lines it was shown.
struct Witness {
    reply: &'static str,
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl CharacterModel for Witness {
    async fn complete(&self, context: &BoundedContext, _: &ModelProfile) -> Result<String, LlmError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.extend(context.world_lines.iter().cloned());
        }
        Ok(self.reply.to_string())
    }
}

const QUIET: &str = r#"{"narrative": "……", "emotions": {}, "affinity_change": 0}"#;

fn alice_id() -> CharacterId {
    CharacterId::new(sample::SAMPLE_CHARACTER)
}

fn character(id: &str, persona: Persona, at: &str) -> CharacterState {
    CharacterState::new(id, Arc::new(persona), at)
}

fn session_with(config: &EchoConfig, model: impl CharacterModel + 'static) -> ArenaSession {
    let tracker = sample::tracker(config).expect("sample loads");
    ArenaSession::with_tracker(tracker, config, Arc::new(model))
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_bad_reply_does_not_block_the_other_character() {
    let model = PerCharacter(BTreeMap::from([
        (sample::SAMPLE_CHARACTER, r#"{"narrative": "いらっしゃい", "emotions": {"JOY": 0.1}, "affinity_change": 0.1}"#),
        ("bob", r#"{"narrative": "ふん", "emotions": {"BOREDOM": 0.4}, "affinity_change": 0}"#),
    ]));
    let mut session = session_with(&EchoConfig::default(), model);
    session
        .add_character(character("bob", Persona::new("ボブ", "見習い鍛冶師", "無口"), "magic_academy"))
        .expect("bob joins");
    let bob = CharacterId::new("bob");
    let bob_before = session.tracker().character(&bob).expect("present");

    let report = session.process_turn("アリスとボブ、こんにちは").await.expect("turn runs");

    assert_eq!(report.entries().len(), 2);
    let alice_entry = report.entry_for(&alice_id()).expect("alice answered");
    assert!(alice_entry.is_applied());
    assert!(matches!(
        report.entry_for(&bob).map(|e| &e.outcome),
        Some(EntryOutcome::Failed(TurnFailure::Malformed { .. }))
    ));

    let alice = session.tracker().character(&alice_id()).expect("present");
    assert!((alice.emotion(EmotionKind::Joy) - 0.8).abs() < 1e-6);
    assert_eq!(session.tracker().character(&bob), Some(bob_before));
    assert_eq!(session.tracker().phase(&bob), Some(TurnPhase::Idle));
    assert_eq!(session.tracker().phase(&alice_id()), Some(TurnPhase::Idle));
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_respect_the_session_cap() {
    let mut config = EchoConfig::default();
    config.turn.max_concurrent_calls = 1;
    let gauge = Arc::new(Gauge::default());
    let tracker = sample::tracker(&config).expect("sample loads");
    let mut session = ArenaSession::with_tracker(tracker, &config, Arc::clone(&gauge) as Arc<dyn CharacterModel>);
    for (id, name) in [("bob", "ボブ"), ("carol", "キャロル")] {
        session
            .add_character(character(id, Persona::new(name, "", ""), "magic_academy"))
            .expect("joins");
    }

    let report = session
        .process_turn("アリス、ボブ、キャロル、おはよう")
        .await
        .expect("turn runs");

    assert_eq!(report.entries().len(), 3);
    assert!(report.entries().iter().all(|e| e.is_applied()));
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn repeated_timeouts_leave_the_character_untouched() {
    let mut config = EchoConfig::default();
    config.turn.timeout_ms = 100;
    config.turn.max_timeout_retries = 1;
    let mut session = session_with(&config, Stalled);
    let before = session.tracker().character(&alice_id()).expect("present");

    let report = session.process_turn("アリス、聞こえる？").await.expect("turn runs");

    assert_eq!(
        report.entry_for(&alice_id()).map(|e| &e.outcome),
        Some(&EntryOutcome::Failed(TurnFailure::ModelTimeout { attempts: 2 }))
    );
    assert_eq!(session.tracker().character(&alice_id()), Some(before));
    assert_eq!(session.tracker().phase(&alice_id()), Some(TurnPhase::Idle));
    assert_eq!(session.tracker().snapshot().world.turn().0, 1);
}

#[tokio::test]
async fn absent_character_is_reported_not_invented() {
    let mut session = session_with(&EchoConfig::default(), PerCharacter(BTreeMap::new()));
    session
        .add_character(character("bob", Persona::new("ボブ", "", ""), "inn"))
        .expect("bob joins");

    let report = session.process_turn("ボブ、元気？").await.expect("turn runs");

    assert_eq!(report.entries().len(), 1);
    let entry = &report.entries()[0];
    assert_eq!(entry.character_id, None);
    assert_eq!(
        entry.outcome,
        EntryOutcome::Failed(TurnFailure::NoSuchTarget { name: "ボブ".into() })
    );
}

#[tokio::test]
async fn shared_alias_asks_for_disambiguation() {
    let mut session = session_with(&EchoConfig::default(), PerCharacter(BTreeMap::new()));
    for (id, name) in [("mentor_a", "エルザ"), ("mentor_b", "ハンス")] {
        session
            .add_character(character(id, Persona::new(name, "", "").with_alias("先生"), "magic_academy"))
            .expect("joins");
    }
    let before = session.tracker().snapshot();

    let report = session.process_turn("先生、質問があります").await.expect("turn runs");

    match report {
        TurnReport::Disambiguation { name, candidates } => {
            assert_eq!(name, "先生");
            assert_eq!(candidates.len(), 2);
        }
        other @ TurnReport::Resolved { .. } => panic!("expected disambiguation, got {other:?}"),
    }
    assert_eq!(session.tracker().snapshot(), before);
}

#[tokio::test]
async fn absent_name_is_not_sent_to_the_focused_character() {
    let mut session = session_with(&EchoConfig::default(), PerCharacter(BTreeMap::new()));
    session
        .add_character(character("bob", Persona::new("ボブ", "", ""), "inn"))
        .expect("bob joins");
    session.set_focus(Some(alice_id())).expect("alice is here");
    let before = session.tracker().character(&alice_id()).expect("present");

    let report = session.process_turn("ボブ、元気？").await.expect("turn runs");

    assert_eq!(report.entries().len(), 1);
    assert_eq!(
        report.entries()[0].outcome,
        EntryOutcome::Failed(TurnFailure::NoSuchTarget { name: "ボブ".into() })
    );
    assert_eq!(session.tracker().character(&alice_id()), Some(before));
}

// ---------------------------------------------------------------------------
// Relationships and world events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn world_events_and_relationships_reach_the_character() {
    let witness = Arc::new(Witness {
        reply: r#"{"narrative": "ボブ？まあね", "emotions": {}, "affinity_change": 0,
            "relationship_changes": {"bob": 0.3}}"#,
        seen: Mutex::new(Vec::new()),
    });
    let config = EchoConfig::default();
    let tracker = sample::tracker(&config).expect("sample loads");
    let mut session = ArenaSession::with_tracker(tracker, &config, Arc::clone(&witness) as Arc<dyn CharacterModel>);
    session
        .add_character(character("bob", Persona::new("ボブ", "", ""), "magic_academy"))
        .expect("bob joins");
    assert!(session.tracker().add_global_event("学園祭が始まった"));

    let report = session.process_turn("アリス、学園祭はどう？").await.expect("turn runs");

    assert!(report.entry_for(&alice_id()).is_some_and(|e| e.is_applied()));
    let alice = session.tracker().character(&alice_id()).expect("present");
    assert!((alice.relationship(&CharacterId::new("bob")) - 0.3).abs() < 1e-6);
    let seen = witness.seen.lock().expect("not poisoned");
    assert!(seen.iter().any(|l| l == "Recent events: 学園祭が始まった"));
    assert!(seen.iter().any(|l| l.starts_with("Also present:") && l.contains("ボブ (bob, relationship +0.0)")));
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn walking_to_the_square_moves_the_player() {
    let mut session = session_with(&EchoConfig::default(), PerCharacter(BTreeMap::new()));

    let report = session.process_turn("中央広場へ行く").await.expect("turn runs");

    assert_eq!(report.entries().len(), 1);
    assert_eq!(report.entries()[0].outcome, EntryOutcome::Environment);
    assert!(report.entries()[0].narrative_text.contains("中央広場"));
    assert_eq!(
        session.tracker().snapshot().world.player_location(),
        &LocationId::new("city_square")
    );
}

#[tokio::test]
async fn unreachable_destination_is_a_missing_target() {
    let mut session = session_with(&EchoConfig::default(), PerCharacter(BTreeMap::new()));

    let report = session.process_turn("冒険者の宿へ行く").await.expect("turn runs");

    assert_eq!(
        report.entries()[0].outcome,
        EntryOutcome::Failed(TurnFailure::NoSuchTarget { name: "冒険者の宿".into() })
    );
    assert_eq!(
        session.tracker().snapshot().world.player_location(),
        &LocationId::new("magic_academy")
    );
}

// ---------------------------------------------------------------------------
// Persistence and UI boundary
// ---------------------------------------------------------------------------

#[tokio::test]
async fn saved_session_resumes_from_disk() {
    let reply = r#"{"narrative": "また明日ね", "emotions": {"JOY": 0.2}, "affinity_change": 0.3,
        "memory": {"content": "明日も会う約束をした", "salience": 0.8}}"#;
    let config = EchoConfig::default();
    let mut session = session_with(&config, PerCharacter(BTreeMap::from([(sample::SAMPLE_CHARACTER, reply)])));
    session.process_turn("アリス、また明日").await.expect("turn runs");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.json");
    std::fs::write(&path, session.save_json().expect("saves")).expect("writes");

    let mut resumed = session_with(&config, PerCharacter(BTreeMap::new()));
    resumed
        .load_json(&std::fs::read_to_string(&path).expect("reads"))
        .expect("loads");
    assert_eq!(resumed.tracker().snapshot(), session.tracker().snapshot());
    let alice = resumed.tracker().character(&alice_id()).expect("present");
    assert!(alice.memory().iter().any(|m| m.content == "明日も会う約束をした"));
}

#[tokio::test]
async fn inspecting_a_distant_location_is_a_missing_target() {
    let mut session = session_with(&EchoConfig::default(), PerCharacter(BTreeMap::new()));

    let report = session.process_turn("冒険者の宿を調べる").await.expect("turn runs");

    assert_eq!(report.entries().len(), 1);
    assert_eq!(
        report.entries()[0].outcome,
        EntryOutcome::Failed(TurnFailure::NoSuchTarget { name: "冒険者の宿".into() })
    );
}

#[tokio::test]
async fn reports_serialise_with_tagged_outcomes() {
    let mut session = session_with(&EchoConfig::default(), PerCharacter(BTreeMap::new()));
    let report = session.process_turn("冒険者の宿へ行く").await.expect("turn runs");

    let json: serde_json::Value = serde_json::to_value(&report).expect("serialises");
    assert_eq!(json["status"], "resolved");
    let outcome = &json["entries"][0]["outcome"];
    assert_eq!(outcome["type"], "failed");
    assert_eq!(outcome["detail"]["kind"], "no_such_target");
}
