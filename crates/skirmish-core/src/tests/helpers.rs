//! Test factories for engines, sessions and participants.

use std::sync::Arc;

use crate::action::ActionRequest;
use crate::anticheat::AntiCheatGate;
use crate::catalog::{Catalog, DamageKind, EffectTarget, Item, ItemEffect, Skill, TargetType};
use crate::clock::ManualClock;
use crate::config::{AntiCheatConfig, CombatConfig, EffectConfig, EngineConfig};
use crate::cooldown::CooldownStore;
use crate::effects::{DispelCategory, DispelType, EffectKind, EffectTemplate};
use crate::engine::CombatEngine;
use crate::participant::{CombatStats, Participant, ParticipantId, TeamId};
use crate::persistence::MemoryStore;
use crate::pipeline::{ActionPipeline, Resolution};
use crate::rng::RandomSource;
use crate::session::{CombatSession, SessionId, SessionSettings};

/// Clock origin used by every helper.
pub const START_MS: u64 = 100_000;

/// Engine plus the handles a test needs to drive it.
pub struct TestRig {
    /// Engine under test
    pub engine: CombatEngine,
    /// Backing store
    pub store: Arc<MemoryStore>,
    /// Engine clock
    pub clock: Arc<ManualClock>,
}

/// A small catalog covering every target type and item effect.
pub fn test_catalog() -> Catalog {
    let poison = EffectTemplate::new("poison", EffectKind::DamageOverTime, 3)
        .with_magnitude(5.0)
        .with_max_stacks(3)
        .with_category(DispelCategory::Poison);
    let mut catalog = Catalog::new();
    catalog.insert_skill(
        Skill::new("fireball", TargetType::SingleEnemy, DamageKind::Magical)
            .with_damage(20.0)
            .with_mana_cost(15.0)
            .with_cooldown(1),
    );
    catalog.insert_skill(
        Skill::new("venom", TargetType::SingleEnemy, DamageKind::Physical)
            .with_damage(4.0)
            .with_effect(poison, 1.0, EffectTarget::Target),
    );
    catalog.insert_skill(
        Skill::new("concuss", TargetType::SingleEnemy, DamageKind::Physical).with_effect(
            EffectTemplate::new("stun", EffectKind::Stun, 1),
            1.0,
            EffectTarget::Target,
        ),
    );
    catalog.insert_skill(
        Skill::new("mend", TargetType::SingleAlly, DamageKind::Magical)
            .with_healing(25.0)
            .with_mana_cost(10.0),
    );
    catalog.insert_item(Item::new("potion", ItemEffect::RestoreHealth { amount: 30.0 }));
    catalog.insert_item(Item::new(
        "antidote",
        ItemEffect::Cleanse {
            dispel: DispelType::Poison,
            max_count: 1,
        },
    ));
    catalog
}

/// Engine over [`test_catalog`] with a manual clock at [`START_MS`].
pub fn rig(config: EngineConfig) -> TestRig {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(START_MS));
    let engine = CombatEngine::new(config, test_catalog(), store.clone(), clock.clone());
    TestRig { engine, store, clock }
}

/// Participant with default stats.
pub fn fighter(id: u64, team: u32) -> Participant {
    Participant::new(ParticipantId::new(id), TeamId::new(team), CombatStats::default())
}

/// Participant with overridden stats.
pub fn fighter_with(id: u64, team: u32, stats: CombatStats) -> Participant {
    Participant::new(ParticipantId::new(id), TeamId::new(team), stats)
}

/// Starts a session in `rig` with the given roster.
pub fn start_session(rig: &TestRig, roster: Vec<Participant>) -> SessionId {
    let session = rig.engine.create_session(SessionSettings::default());
    for participant in roster {
        let id = participant.id;
        rig.engine.join(session, participant).unwrap();
        rig.engine.set_ready(session, id, true).unwrap();
    }
    rig.engine.start(session).unwrap();
    session
}

/// Active standalone session with the given roster, for pipeline-level tests.
pub fn active_session(roster: Vec<Participant>) -> CombatSession {
    let mut session = CombatSession::new(
        SessionId::new(1),
        SessionSettings::default(),
        &EffectConfig::default(),
        START_MS,
    );
    for mut participant in roster {
        participant.ready = true;
        session.add_participant(participant).unwrap();
    }
    session.start(START_MS).unwrap();
    session
}

/// Shared state for driving the pipeline directly with scripted draws.
pub struct PipelineRig {
    /// Formula constants
    pub config: CombatConfig,
    /// Content
    pub catalog: Catalog,
    /// Suspicion gate
    pub gate: AntiCheatGate,
    /// Cooldowns
    pub cooldowns: CooldownStore,
    /// Store
    pub store: MemoryStore,
}

impl PipelineRig {
    /// Rig over [`test_catalog`] with default configuration.
    pub fn new() -> Self {
        Self {
            config: CombatConfig::default(),
            catalog: test_catalog(),
            gate: AntiCheatGate::new(AntiCheatConfig::default()),
            cooldowns: CooldownStore::new(),
            store: MemoryStore::new(),
        }
    }

    /// Resolves `request` at `now_ms`.
    pub fn resolve(
        &self,
        session: &mut CombatSession,
        request: &ActionRequest,
        now_ms: u64,
        rng: &mut dyn RandomSource,
    ) -> Resolution {
        ActionPipeline::new(&self.config, &self.catalog, &self.gate, &self.cooldowns, &self.store)
            .resolve(session, request, now_ms, rng)
    }
}
