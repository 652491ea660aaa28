//! ArenaSession — one player's sandbox and its turn pipeline.
//!
//! ```text
//! snapshot ─▶ route ─▶ per addressed character (concurrent, semaphore-capped):
//!                          retrieve ─▶ build context ─▶ model call with deadline
//!          ─▶ in intent order (serial): parse ─▶ apply / reject ─▶ settle
//!          ─▶ environment intents resolved in place ─▶ advance turn and clock
//! ```
//!
//! Routing, retrieval and context building all read the single snapshot
//! taken at the start of the turn. Only the serial phase writes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use echo_core::config::{ModelProfile, TurnConfig};
use echo_core::parser::ResponseParser;
use echo_core::router::{self, Addressee, Intent};
use echo_core::{
    CharacterId, CharacterState, CoreError, EchoConfig, PromptBuilder, SessionSnapshot, StateTracker, WorldState,
};

use crate::environment;
use crate::error::{ArenaError, Result, TurnFailure};
use crate::model::{CharacterModel, call_with_deadline};
use crate::profiles::ProfileRegistry;
use crate::report::{DeltaSummary, EntryOutcome, TurnEntry, TurnReport};

/// A running session: shared state plus everything needed to run turns.
pub struct ArenaSession {
    tracker: StateTracker,
    model: Arc<dyn CharacterModel>,
    builder: PromptBuilder,
    parser: ResponseParser,
    registry: ProfileRegistry,
    profiles: BTreeMap<CharacterId, ModelProfile>,
    turn: TurnConfig,
    permits: Arc<Semaphore>,
    focus: Option<CharacterId>,
}

/// One intent's work item between the concurrent and serial phases.
enum Pending {
    Character(CharacterId, JoinHandle<std::result::Result<String, TurnFailure>>),
    Environment(Intent),
    Missing(String),
}

impl ArenaSession {
    /// Start a session over `world` with no characters.
    ///
    /// # Errors
    /// If the config or world is invalid.
    pub fn new(world: WorldState, config: &EchoConfig, model: Arc<dyn CharacterModel>) -> Result<Self> {
        config.validate()?;
        let tracker = StateTracker::new(world, config)?;
        Ok(Self::with_tracker(tracker, config, model))
    }

    /// Wrap an existing tracker. Profiles are resolved for the characters it
    /// already holds.
    #[must_use]
    pub fn with_tracker(tracker: StateTracker, config: &EchoConfig, model: Arc<dyn CharacterModel>) -> Self {
        let registry = ProfileRegistry::from_config(&config.llm);
        let profiles = tracker
            .character_ids()
            .into_iter()
            .map(|id| {
                let profile = registry.resolve(&id).clone();
                (id, profile)
            })
            .collect();
        Self {
            tracker,
            model,
            builder: PromptBuilder::new(config.prompt.clone()),
            parser: ResponseParser::new(config.bounds),
            registry,
            profiles,
            turn: config.turn.clone(),
            permits: Arc::new(Semaphore::new(config.turn.max_concurrent_calls.max(1))),
            focus: None,
        }
    }

    /// The session's state tracker.
    #[must_use]
    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    /// Add a character and fix its model profile.
    ///
    /// # Errors
    /// If the ID is taken or the character stands somewhere unknown.
    pub fn add_character(&mut self, character: CharacterState) -> Result<()> {
        let id = character.id().clone();
        self.tracker.add_character(character)?;
        let profile = self.registry.resolve(&id).clone();
        info!(character = %id, model = %profile.model, "Character joined");
        self.profiles.insert(id, profile);
        Ok(())
    }

    /// Model profile a character was loaded with.
    #[must_use]
    pub fn profile(&self, id: &CharacterId) -> Option<&ModelProfile> {
        self.profiles.get(id)
    }

    /// Character that plain dialogue goes to when nobody is named.
    #[must_use]
    pub fn focus(&self) -> Option<&CharacterId> {
        self.focus.as_ref()
    }

    /// Set or clear the focused character.
    ///
    /// # Errors
    /// `UnknownTarget` for an ID not in the session.
    pub fn set_focus(&mut self, id: Option<CharacterId>) -> Result<()> {
        if let Some(id) = &id {
            if !self.profiles.contains_key(id) {
                return Err(CoreError::UnknownTarget(id.to_string()).into());
            }
        }
        self.focus = id;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Persistence boundary
    // -----------------------------------------------------------------------

    /// Serialise the whole session to JSON.
    ///
    /// # Errors
    /// On serialisation failure.
    pub fn save_json(&self) -> Result<String> {
        Ok(self.tracker.snapshot().to_json()?)
    }

    /// Replace the session state with a saved snapshot.
    ///
    /// # Errors
    /// If the JSON is undecodable or the snapshot fails validation; the
    /// session is unchanged in that case.
    pub fn load_json(&mut self, json: &str) -> Result<()> {
        let snapshot = SessionSnapshot::from_json(json)?;
        self.restore(snapshot)
    }

    /// Replace the session state with `snapshot`.
    ///
    /// # Errors
    /// If the snapshot fails validation; the session is unchanged in that case.
    pub fn restore(&mut self, snapshot: SessionSnapshot) -> Result<()> {
        let ids: Vec<CharacterId> = snapshot.characters.keys().cloned().collect();
        self.tracker.restore(snapshot)?;
        self.profiles = ids
            .into_iter()
            .map(|id| {
                let profile = self.registry.resolve(&id).clone();
                (id, profile)
            })
            .collect();
        if self.focus.as_ref().is_some_and(|f| !self.profiles.contains_key(f)) {
            self.focus = None;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Turn pipeline
    // -----------------------------------------------------------------------

    /// Run one player input through the pipeline.
    ///
    /// Per-character failures are reported in the returned entries and never
    /// abort the turn. An ambiguous name aborts before anything runs and is
    /// returned as [`TurnReport::Disambiguation`].
    ///
    /// # Errors
    /// Only for internal inconsistencies (a tracker phase out of step).
    pub async fn process_turn(&mut self, raw_text: &str) -> Result<TurnReport> {
        let snapshot = self.tracker.snapshot();
        let turn = snapshot.world.turn();

        let intents = match router::route(raw_text, &snapshot.world, &snapshot.characters, self.focus.as_ref()) {
            Ok(intents) => intents,
            Err(CoreError::AmbiguousTarget { name, candidates }) => {
                info!(%name, candidates = candidates.len(), "Ambiguous name, asking the player");
                return Ok(TurnReport::Disambiguation { name, candidates });
            }
            Err(e) => return Err(e.into()),
        };
        if intents.is_empty() {
            return Ok(TurnReport::Resolved {
                turn,
                entries: Vec::new(),
            });
        }
        debug!(turn = turn.0, intents = intents.len(), "Routed player input");

        // -- fan out -------------------------------------------------------
        let mut pending = Vec::with_capacity(intents.len());
        for intent in intents {
            match &intent.addressee {
                Addressee::Character(id) => {
                    let handle = self.spawn_reply(&snapshot, &intent, id)?;
                    pending.push(Pending::Character(id.clone(), handle));
                }
                Addressee::Environment => pending.push(Pending::Environment(intent)),
                Addressee::NoSuchTarget(name) => pending.push(Pending::Missing(name.clone())),
            }
        }

        // -- apply serially, in intent order -------------------------------
        let mut entries = Vec::with_capacity(pending.len());
        for item in pending {
            let entry = match item {
                Pending::Character(id, handle) => {
                    let reply = handle.await.unwrap_or_else(|e| {
                        Err(TurnFailure::ModelUnavailable {
                            reason: format!("reply task failed: {e}"),
                        })
                    });
                    self.resolve_reply(&snapshot.world, &id, reply)?
                }
                Pending::Environment(intent) => environment::resolve(&self.tracker, &intent),
                Pending::Missing(name) => TurnEntry::failed(None, TurnFailure::NoSuchTarget { name }),
            };
            entries.push(entry);
        }

        let next = self.tracker.advance_turn();
        if self.turn.minutes_per_turn > 0 {
            self.tracker.advance_clock(self.turn.minutes_per_turn);
        }
        info!(
            turn = turn.0,
            next = next.0,
            applied = entries.iter().filter(|e| e.is_applied()).count(),
            entries = entries.len(),
            "Turn resolved"
        );
        Ok(TurnReport::Resolved { turn, entries })
    }

    /// Mark `id` as processing and start its model call.
    fn spawn_reply(
        &self,
        snapshot: &SessionSnapshot,
        intent: &Intent,
        id: &CharacterId,
    ) -> Result<JoinHandle<std::result::Result<String, TurnFailure>>> {
        let character = snapshot
            .characters
            .get(id)
            .ok_or_else(|| ArenaError::Session(format!("routed to unknown character '{id}'")))?;
        let profile = self
            .profiles
            .get(id)
            .cloned()
            .unwrap_or_else(|| self.registry.resolve(id).clone());
        let memory = self
            .tracker
            .memory_manager()
            .retrieve_context(character.memory(), intent, snapshot.world.turn());
        let context = self
            .builder
            .build(character, &snapshot.world, intent, &memory, &snapshot.characters);
        self.tracker.begin(id)?;

        let model = Arc::clone(&self.model);
        let permits = Arc::clone(&self.permits);
        let deadline = Duration::from_millis(self.turn.timeout_ms);
        let retries = self.turn.max_timeout_retries;
        Ok(tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return Err(TurnFailure::ModelUnavailable {
                    reason: "session is shutting down".into(),
                });
            };
            call_with_deadline(model.as_ref(), &context, &profile, deadline, retries).await
        }))
    }

    /// Parse and apply one reply, closing the character's phase either way.
    fn resolve_reply(
        &self,
        world: &WorldState,
        id: &CharacterId,
        reply: std::result::Result<String, TurnFailure>,
    ) -> Result<TurnEntry> {
        let outcome = reply.and_then(|text| {
            let delta = self
                .parser
                .parse(&text, id, world)
                .map_err(|e| TurnFailure::from_core(&e))?;
            let applied = self
                .tracker
                .apply_with_outcome(&delta)
                .map_err(|e| TurnFailure::from_core(&e))?;
            Ok((delta, applied))
        });

        let entry = match outcome {
            Ok((delta, applied)) => TurnEntry {
                character_id: Some(id.clone()),
                narrative_text: delta.narrative_text.clone(),
                outcome: EntryOutcome::Applied(DeltaSummary::new(&delta, &applied)),
            },
            Err(failure) => {
                warn!(character = %id, %failure, "Character turn failed");
                self.tracker.reject(id)?;
                TurnEntry::failed(Some(id.clone()), failure)
            }
        };
        self.tracker.settle(id)?;
        Ok(entry)
    }
}
