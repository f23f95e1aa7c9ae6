//! Scripted skirmish runner.
//!
//! Plays a 2v2 battle through the combat engine with a simple scripted
//! policy and prints every action result as one JSON line on stdout.
//! Logs go to stderr; set `RUST_LOG` to adjust them.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use skirmish_core::maintenance::MaintenanceReport;
use skirmish_core::{
    ActionRequest, ActionResult, Catalog, Clock, CombatEngine, CombatSession, CombatStats, EngineConfig,
    Maintenance, ManualClock, MemoryStore, Participant, ParticipantId, SessionId, SessionSettings,
    SessionStatus, TeamId,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Milliseconds between scripted submissions.
const ACTION_SPACING_MS: u64 = 1_500;

/// Scripted skirmish runner
#[derive(Parser, Debug)]
#[command(name = "skirmish-sim")]
#[command(about = "Run a scripted 2v2 skirmish and print results as JSON lines", long_about = None)]
#[command(version)]
struct Cli {
    /// Master seed (overrides the config file)
    #[arg(long)]
    seed: Option<u64>,

    /// Engine config JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skill and item catalog JSON
    #[arg(long, default_value = concat!(env!("CARGO_MANIFEST_DIR"), "/content/catalog.json"))]
    catalog: PathBuf,

    /// Stop after this many turns even if nobody has won
    #[arg(long, default_value_t = 50)]
    turns: u32,
}

/// One line of output.
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Line<'a> {
    Action {
        turn: u32,
        result: &'a ActionResult,
    },
    Sweep {
        turn: u32,
        report: MaintenanceReport,
    },
    Finished {
        turns: u32,
        status: SessionStatus,
        winner: Option<TeamId>,
        survivors: Vec<&'a Participant>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    let catalog = Catalog::from_path(&cli.catalog)
        .with_context(|| format!("loading catalog from {}", cli.catalog.display()))?;

    info!(seed = config.seed, skills = catalog.skills().count(), items = catalog.items().count(), "starting skirmish");

    let clock = Arc::new(ManualClock::new(0));
    let engine = Arc::new(CombatEngine::new(
        config,
        catalog,
        Arc::new(MemoryStore::new()),
        clock.clone(),
    ));
    let session = setup(&engine)?;
    let maintenance = Maintenance::new(Arc::clone(&engine));

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    loop {
        let snapshot = engine.snapshot(session)?;
        if snapshot.status() != SessionStatus::Active || snapshot.turn() > cli.turns {
            break;
        }
        let turn = snapshot.turn();

        let Some(actor) = snapshot.next_actor() else {
            engine.advance_turn(session)?;
            continue;
        };

        clock.advance(ACTION_SPACING_MS);
        let result = act(&engine, session, &snapshot, actor, clock.now_ms())?;
        emit(&mut out, &Line::Action { turn, result: &result })?;
        if !result.success {
            // Nothing this actor tries is accepted; move the turn on without it.
            engine.advance_turn(session)?;
        }

        if engine.snapshot(session)?.turn() != turn {
            let report = maintenance.run_once(clock.now_ms());
            if !report.is_idle() {
                emit(&mut out, &Line::Sweep { turn, report })?;
            }
        }
    }

    let last = engine.snapshot(session)?;
    emit(
        &mut out,
        &Line::Finished {
            turns: last.turn(),
            status: last.status(),
            winner: last.winner(),
            survivors: last.participants().filter(|p| p.in_play()).collect(),
        },
    )?;
    out.flush()?;

    info!(status = ?last.status(), winner = ?last.winner(), turns = last.turn(), "skirmish over");
    Ok(())
}

fn setup(engine: &CombatEngine) -> Result<SessionId> {
    let session = engine.create_session(SessionSettings::default());
    let roster = [
        (1, 1, CombatStats { physical_damage: 14.0, ..CombatStats::default() }),
        (2, 1, CombatStats { magical_damage: 16.0, max_mana: 80.0, mana: 80.0, ..CombatStats::default() }),
        (3, 2, CombatStats { physical_defense: 12.0, max_health: 130.0, health: 130.0, ..CombatStats::default() }),
        (4, 2, CombatStats { attack_speed: 14.0, ..CombatStats::default() }),
    ];
    for (id, team, stats) in roster {
        let id = ParticipantId::new(id);
        engine.join(session, Participant::new(id, TeamId::new(team), stats))?;
        engine.set_ready(session, id, true)?;
    }
    engine.start(session)?;
    Ok(session)
}

/// Picks and submits an action for `actor`, falling back to a plain attack
/// and then a wait if the preferred choice is refused.
fn act(
    engine: &CombatEngine,
    session: SessionId,
    snapshot: &CombatSession,
    actor: ParticipantId,
    now_ms: u64,
) -> Result<ActionResult> {
    let Some(me) = snapshot.participant(actor) else {
        anyhow::bail!("{actor} is not in session {session}");
    };
    let Some(target) = snapshot
        .participants()
        .filter(|p| p.in_play() && p.team != me.team)
        .min_by(|a, b| a.stats.health.total_cmp(&b.stats.health))
        .map(|p| p.id)
    else {
        return Ok(engine.submit(session, &ActionRequest::wait(actor).at(now_ms))?);
    };

    let preferred = if me.stats.health_fraction() < 0.35 {
        ActionRequest::item(actor, "potion", None)
    } else if me.stats.mana >= 15.0 && me.stats.magical_damage > me.stats.physical_damage {
        ActionRequest::skill(actor, "fireball", Some(target))
    } else if me.stats.mana >= 5.0 {
        ActionRequest::skill(actor, "venom_strike", Some(target))
    } else {
        ActionRequest::attack(actor, target)
    };

    let mut result = engine.submit(session, &preferred.at(now_ms))?;
    for fallback in [ActionRequest::attack(actor, target), ActionRequest::wait(actor)] {
        if result.success {
            break;
        }
        warn!(%actor, code = ?result.code, "scripted action refused, falling back");
        result = engine.submit(session, &fallback.at(now_ms))?;
    }
    Ok(result)
}

fn emit(out: &mut impl Write, line: &Line<'_>) -> Result<()> {
    serde_json::to_writer(&mut *out, line)?;
    writeln!(out)?;
    Ok(())
}
