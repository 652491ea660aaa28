//! EchoArena core benchmarks.
//!
//! Targets (release build, one core):
//!   memory_record_single ............... < 10μs
//!   memory_retrieval_top5_from_200 ..... < 500μs
//!   route_20_characters ................ < 100μs
//!   context_build_single ............... < 100μs
//!   apply_delta_single ................. < 20μs

use std::collections::BTreeMap;
use std::hint::black_box;
use std::sync::Arc;

use chrono::NaiveTime;
use criterion::{Criterion, criterion_group, criterion_main};

use echo_core::config::{MemoryConfig, PromptConfig, RetrievalConfig};
use echo_core::memory::MemoryDraft;
use echo_core::router::{self, Addressee, Intent, TargetRef};
use echo_core::{
    ActionKind, CharacterId, CharacterState, EchoConfig, EmotionKind, Location, MemoryManager, MemoryStore,
    Persona, PromptBuilder, StateDelta, StateTracker, Turn, WorldState,
};

const PLACES: &[&str] = &["市場", "港", "図書館", "鍛冶場", "神殿", "酒場"];

fn world() -> WorldState {
    let mut world = WorldState::new("square", NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default())
        .with_location(Location::new("square", "中央広場", "噴水のある広場").with_item("パン"));
    for (i, name) in PLACES.iter().enumerate() {
        let id = format!("place_{i}");
        world = world
            .with_location(Location::new(id.as_str(), *name, "どこにでもある場所"))
            .connect("square", &id);
    }
    world
}

fn cast(n: usize) -> BTreeMap<CharacterId, CharacterState> {
    (0..n)
        .map(|i| {
            let persona = Persona::new(format!("住人{i:02}"), "町の住人", "穏やか");
            let c = CharacterState::new(format!("npc_{i}"), Arc::new(persona), "square")
                .with_emotion(EmotionKind::Joy, 0.5);
            (c.id().clone(), c)
        })
        .collect()
}

fn delta_with_memory(id: &CharacterId, i: u32) -> StateDelta {
    let topic = PLACES[i as usize % PLACES.len()];
    StateDelta::narrative(id.clone(), "……").with_memory(MemoryDraft::episodic(
        format!("{topic}で出来事{i}があった"),
        (f64::from(i % 10) / 10.0) as f32,
    ))
}

fn intent_for(id: &CharacterId, text: &str) -> Intent {
    Intent {
        raw_text: text.to_string(),
        action_kind: ActionKind::Dialogue,
        targets: vec![TargetRef::Character(id.clone())],
        addressee: Addressee::Character(id.clone()),
    }
}

fn populated_store(manager: &MemoryManager, id: &CharacterId, n: u32) -> MemoryStore {
    let mut store = MemoryStore::new();
    for i in 0..n {
        manager.record_turn(&mut store, &delta_with_memory(id, i), Turn(u64::from(i)));
    }
    store
}

/// Recording one memory candidate into a store at capacity.
fn bench_memory_record(c: &mut Criterion) {
    let manager = MemoryManager::new(MemoryConfig::default(), RetrievalConfig::default());
    let id = CharacterId::new("npc_0");
    let store = populated_store(&manager, &id, 200);
    let delta = delta_with_memory(&id, 7);

    c.bench_function("memory_record_single", |b| {
        b.iter_batched(
            || store.clone(),
            |mut store| manager.record_turn(&mut store, black_box(&delta), Turn(500)),
            criterion::BatchSize::SmallInput,
        );
    });
}

/// Top-K retrieval over a full store.
fn bench_memory_retrieval(c: &mut Criterion) {
    let manager = MemoryManager::new(MemoryConfig::default(), RetrievalConfig::default());
    let id = CharacterId::new("npc_0");
    let store = populated_store(&manager, &id, 200);
    let intent = intent_for(&id, "港で何があったの？");

    c.bench_function("memory_retrieval_top5_from_200", |b| {
        b.iter(|| manager.retrieve_context(black_box(&store), black_box(&intent), Turn(250)));
    });
}

/// Routing a sentence naming two of twenty present characters.
fn bench_route(c: &mut Criterion) {
    let world = world();
    let characters = cast(20);

    c.bench_function("route_20_characters", |b| {
        b.iter(|| {
            router::route(
                black_box("住人03と住人17、パンを分けてくれない？"),
                &world,
                &characters,
                None,
            )
        });
    });
}

/// Building one bounded context with a crowded scene.
fn bench_context_build(c: &mut Criterion) {
    let world = world();
    let characters = cast(20);
    let manager = MemoryManager::new(MemoryConfig::default(), RetrievalConfig::default());
    let id = CharacterId::new("npc_3");
    let store = populated_store(&manager, &id, 200);
    let intent = intent_for(&id, "市場の話を聞かせて");
    let memory = manager.retrieve_context(&store, &intent, Turn(250));
    let builder = PromptBuilder::new(PromptConfig::default());
    let Some(character) = characters.get(&id) else {
        return;
    };

    c.bench_function("context_build_single", |b| {
        b.iter(|| builder.build(black_box(character), &world, &intent, &memory, &characters));
    });
}

/// Validating and committing one delta through the tracker.
fn bench_apply_delta(c: &mut Criterion) {
    let config = EchoConfig::default();
    let Ok(tracker) = StateTracker::new(world(), &config) else {
        return;
    };
    for character in cast(20).into_values() {
        if tracker.add_character(character).is_err() {
            return;
        }
    }
    let id = CharacterId::new("npc_5");
    let delta = StateDelta::narrative(id, "ありがとう").with_emotion(EmotionKind::Joy, 0.0);

    c.bench_function("apply_delta_single", |b| {
        b.iter(|| tracker.apply(black_box(&delta)));
    });
}

criterion_group!(
    benches,
    bench_memory_record,
    bench_memory_retrieval,
    bench_route,
    bench_context_build,
    bench_apply_delta,
);
criterion_main!(benches);
