//! Terminal front end for EchoArena: the sample scene as a line-based REPL.
//!
//! Usage: `echo-arena [config.toml]`. The config path may also come from
//! `ECHO_CONFIG`; without one, defaults apply. `ECHO_PROMPTS_DIR` points at
//! a directory of prompt templates to use instead of the built-in ones.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use echo_arena::environment::describe_here;
use echo_arena::{ArenaSession, EntryOutcome, LlmCharacterModel, TurnReport, logging, sample};
use echo_core::{CharacterId, EchoConfig};
use echo_llm::{LlmClient, LlmProvider, PromptEngine};

const HELP: &str = "\
Commands:
  /look            describe where you are
  /focus <id>      send unaddressed dialogue to a character (/focus none to clear)
  /event <text>    announce something every character will know about
  /save <file>     write the session to a JSON file
  /load <file>     replace the session with a saved one
  /help            show this help
  /quit            leave
Anything else is said or done by the player.";

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    logging::init(&config.general);

    let api_key = std::env::var(&config.llm.api_key_env).ok();
    let provider = LlmProvider::from_settings(&config.llm.provider, &config.llm.base_url, api_key)?;
    let client = LlmClient::new(provider, config.llm.http_retries);
    let prompts = match std::env::var_os("ECHO_PROMPTS_DIR") {
        Some(dir) => PromptEngine::from_directory(&dir)
            .with_context(|| format!("loading prompts from {}", Path::new(&dir).display()))?,
        None => PromptEngine::builtin(),
    };
    let model = LlmCharacterModel::new(client, prompts).with_http_timeout(config.turn.timeout_ms);

    let tracker = sample::tracker(&config).context("building the sample scene")?;
    let mut session = ArenaSession::with_tracker(tracker, &config, Arc::new(model));
    session.set_focus(Some(CharacterId::new(sample::SAMPLE_CHARACTER)))?;
    info!(characters = session.tracker().character_ids().len(), "Session started");

    println!("{}\n", describe_here(&session.tracker().snapshot()));
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_once(' ').map_or((line, ""), |(c, a)| (c, a.trim())) {
            ("/quit" | "/exit", _) => break,
            ("/help", _) => println!("{HELP}"),
            ("/look", _) => println!("{}", describe_here(&session.tracker().snapshot())),
            ("/focus", arg) => {
                let target = (!arg.is_empty() && arg != "none").then(|| CharacterId::new(arg));
                match session.set_focus(target) {
                    Ok(()) => println!("Focus: {}", session.focus().map_or("none".to_string(), ToString::to_string)),
                    Err(e) => println!("! {e}"),
                }
            }
            ("/event", text) => {
                if session.tracker().add_global_event(text) {
                    println!("Event recorded.");
                } else {
                    println!("! usage: /event <text>");
                }
            }
            ("/save", path) => match save(&session, path) {
                Ok(path) => println!("Saved to {}", path.display()),
                Err(e) => println!("! {e:#}"),
            },
            ("/load", path) => match load(&mut session, path) {
                Ok(()) => println!("Loaded {path}"),
                Err(e) => println!("! {e:#}"),
            },
            _ => {
                let report = session.process_turn(line).await?;
                print_report(&session, &report);
            }
        }
    }
    Ok(())
}

fn load_config() -> Result<EchoConfig> {
    let path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("ECHO_CONFIG"))
        .map(PathBuf::from);
    let mut config = match path {
        Some(path) => EchoConfig::from_file(&path).with_context(|| format!("reading {}", path.display()))?,
        None => EchoConfig::default(),
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn save(session: &ArenaSession, path: &str) -> Result<PathBuf> {
    anyhow::ensure!(!path.is_empty(), "usage: /save <file>");
    let path = PathBuf::from(path);
    std::fs::write(&path, session.save_json()?).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn load(session: &mut ArenaSession, path: &str) -> Result<()> {
    anyhow::ensure!(!path.is_empty(), "usage: /load <file>");
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    session.load_json(&json)?;
    Ok(())
}

fn print_report(session: &ArenaSession, report: &TurnReport) {
    match report {
        TurnReport::Disambiguation { name, candidates } => {
            let ids: Vec<String> = candidates.iter().map(ToString::to_string).collect();
            println!("? '{name}' could mean: {}. Please be more specific.", ids.join(", "));
        }
        TurnReport::Resolved { entries, .. } => {
            for entry in entries {
                let speaker = entry
                    .character_id
                    .as_ref()
                    .and_then(|id| session.tracker().character(id))
                    .map(|c| c.persona().name.clone());
                match (&entry.outcome, speaker) {
                    (EntryOutcome::Failed(failure), Some(name)) => println!("! {name}: {failure}"),
                    (EntryOutcome::Failed(failure), None) => println!("! {failure}"),
                    (EntryOutcome::Applied(summary), Some(name)) => {
                        println!("{name}: {}", entry.narrative_text);
                        println!("  (affinity {:+.2})", summary.affinity_after);
                    }
                    (_, Some(name)) => println!("{name}: {}", entry.narrative_text),
                    (_, None) => println!("{}", entry.narrative_text),
                }
            }
        }
    }
}
