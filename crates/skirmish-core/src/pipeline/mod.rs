//! Action resolution pipeline.
//!
//! Resolves one submitted action against one session:
//!
//! ```text
//! Received ──► structure ──► anti-cheat ──► actor/rules ──► order ──► plan ──► commit
//!                 │               │               │                              │
//!                 └───────────────┴───── Rejected ┘                      Resolved
//! ```
//!
//! Every rejection happens before the first random draw and before the session
//! is touched, so a rejected action leaves no trace beyond its anti-cheat
//! bookkeeping. Accepted actions are planned into a
//! [`ChangeSet`](crate::action::ChangeSet) and committed by the session in one
//! step.
//!
//! # Example
//!
//! ```
//! use skirmish_core::action::ActionRequest;
//! use skirmish_core::anticheat::AntiCheatGate;
//! use skirmish_core::catalog::Catalog;
//! use skirmish_core::config::{AntiCheatConfig, CombatConfig, EffectConfig};
//! use skirmish_core::cooldown::CooldownStore;
//! use skirmish_core::participant::{CombatStats, Participant, ParticipantId, TeamId};
//! use skirmish_core::persistence::MemoryStore;
//! use skirmish_core::pipeline::ActionPipeline;
//! use skirmish_core::rng::SeededRandom;
//! use skirmish_core::session::{CombatSession, SessionId, SessionSettings};
//!
//! let mut session = CombatSession::new(SessionId::new(1), SessionSettings::default(), &EffectConfig::default(), 0);
//! for (id, team) in [(1, 1), (2, 2)] {
//!     let mut p = Participant::new(ParticipantId::new(id), TeamId::new(team), CombatStats::default());
//!     p.ready = true;
//!     session.add_participant(p).unwrap();
//! }
//! session.start(0).unwrap();
//!
//! let config = CombatConfig::default();
//! let catalog = Catalog::new();
//! let gate = AntiCheatGate::new(AntiCheatConfig::default());
//! let cooldowns = CooldownStore::new();
//! let store = MemoryStore::new();
//! let pipeline = ActionPipeline::new(&config, &catalog, &gate, &cooldowns, &store);
//!
//! let request = ActionRequest::wait(ParticipantId::new(1)).at(1_000);
//! let resolution = pipeline.resolve(&mut session, &request, 1_000, &mut SeededRandom::new(7));
//! assert!(resolution.result.success);
//! ```

pub mod handlers;
pub mod validate;

use tracing::{debug, info};

use crate::action::{ActionRecord, ActionRequest, ActionResult, ActionType, AntiCheatReport, StateChange};
use crate::anticheat::{ActionSignals, AntiCheatGate, SuspicionFlags, Verdict};
use crate::calculator;
use crate::catalog::{Catalog, Item, Skill};
use crate::config::CombatConfig;
use crate::cooldown::CooldownStore;
use crate::error::ActionRejection;
use crate::participant::{Participant, ParticipantId};
use crate::persistence::CombatStore;
use crate::rng::RandomSource;
use crate::session::{CombatSession, CommitReport, SessionStatus};

use handlers::{Plan, PlanContext};
use validate::Resolved;

/// Outcome of [`ActionPipeline::resolve`].
#[derive(Debug, Clone)]
pub struct Resolution {
    /// What the caller sees
    pub result: ActionResult,
    /// What the session committed (empty when rejected)
    pub commit: CommitReport,
}

/// Validated, rule-checked action ready to plan.
enum Ready<'c> {
    Attack(ParticipantId),
    Skill(&'c Skill, Vec<ParticipantId>),
    Item(&'c Item, ParticipantId),
    Defend,
    Flee,
    Wait,
}

/// Resolves actions against sessions using shared process-wide state.
pub struct ActionPipeline<'a> {
    config: &'a CombatConfig,
    catalog: &'a Catalog,
    gate: &'a AntiCheatGate,
    cooldowns: &'a CooldownStore,
    store: &'a dyn CombatStore,
}

impl<'a> ActionPipeline<'a> {
    /// Creates a pipeline over borrowed shared state.
    #[must_use]
    pub fn new(
        config: &'a CombatConfig,
        catalog: &'a Catalog,
        gate: &'a AntiCheatGate,
        cooldowns: &'a CooldownStore,
        store: &'a dyn CombatStore,
    ) -> Self {
        Self {
            config,
            catalog,
            gate,
            cooldowns,
            store,
        }
    }

    /// Resolves one action.
    ///
    /// Never fails: every problem becomes a rejected [`ActionResult`] and the
    /// session is left untouched.
    pub fn resolve(
        &self,
        session: &mut CombatSession,
        request: &ActionRequest,
        now_ms: u64,
        rng: &mut dyn RandomSource,
    ) -> Resolution {
        let mut record = ActionRecord::for_request(session.id(), request, session.turn(), now_ms);

        if session.status() != SessionStatus::Active {
            return self.reject(session, record, &ActionRejection::SessionNotActive(session.status()), None);
        }

        let resolved = match validate::check_structure(request, self.catalog) {
            Ok(resolved) => resolved,
            Err(rejection) => return self.reject(session, record, &rejection, None),
        };
        let actor = match validate::check_membership(session, request) {
            Ok(actor) => actor,
            Err(rejection) => return self.reject(session, record, &rejection, None),
        };

        let verdict = self.gate.evaluate(&self.signals(session, request, actor, resolved, now_ms), self.store);
        record.processing_time_ms = verdict.processing_time_ms;
        if !verdict.decision.permits() {
            let rejection = match verdict.banned_until {
                Some(until_ms) if verdict.flags == SuspicionFlags::BANNED => ActionRejection::Banned {
                    actor: request.actor,
                    until_ms,
                },
                _ => ActionRejection::Blocked {
                    score: verdict.score,
                    flags: verdict.flags,
                },
            };
            return self.reject(session, record, &rejection, Some(&verdict));
        }

        let ready = match self.check_rules(session, request, actor, resolved) {
            Ok(ready) => ready,
            Err(rejection) => return self.reject(session, record, &rejection, Some(&verdict)),
        };

        let Some(actor_stats) = session.effective_stats(request.actor) else {
            return self.reject(
                session,
                record,
                &ActionRejection::UnknownParticipant(request.actor),
                Some(&verdict),
            );
        };
        record.action_order = actor_stats.attack_speed + rng.next_unit() * self.config.order_tiebreak;

        let ctx = PlanContext {
            config: self.config,
            session,
            actor,
            actor_stats,
        };
        let mut plan = plan_action(&ctx, &ready, &mut record, rng);

        if let Some(position) = request.position {
            plan.changes.push(StateChange::Reposition {
                target: request.actor,
                position,
            });
        }

        let commit = session.apply_changes(&plan.changes);

        if let Ready::Skill(skill, _) = &ready {
            self.cooldowns.start(
                request.actor,
                &skill.id,
                session.id(),
                session.turn(),
                skill.cooldown_turns,
                now_ms,
                session.settings().turn_time_limit_ms,
            );
        }
        for hit in &plan.hits {
            self.gate.record_outcome(request.actor, now_ms, hit.damage, hit.critical);
        }
        session.mark_acted(request.actor);
        session.check_victory(now_ms);

        info!(
            target: "skirmish::pipeline",
            session = %session.id(),
            actor = %request.actor,
            action = %request.action_type,
            damage = record.damage_dealt,
            healing = record.healing_done,
            critical = record.critical,
            "action resolved"
        );

        let result = ActionResult {
            success: true,
            code: None,
            reason: None,
            action: record,
            effects_applied: commit.effects_applied.clone(),
            changes: commit.changes.clone(),
            logs: plan.changes.logs,
            anti_cheat: AntiCheatReport::from(&verdict),
            session_status: session.status(),
            winner: session.winner(),
        };
        Resolution { result, commit }
    }

    fn signals(
        &self,
        session: &CombatSession,
        request: &ActionRequest,
        actor: &Participant,
        resolved: Resolved<'_>,
        now_ms: u64,
    ) -> ActionSignals {
        let actor_stats = session.effective_stats(actor.id);
        let max_damage = request
            .reported_damage
            .map(|_| self.max_damage(session, request, actor, resolved));
        ActionSignals {
            actor: request.actor,
            now_ms,
            client_timestamp: request.client_timestamp,
            turn_started_ms: Some(session.turn_started_ms()),
            reported_damage: request.reported_damage,
            max_damage,
            position: request.position,
            movement_speed: actor_stats.map_or(actor.stats.movement_speed, |s| s.movement_speed),
        }
    }

    /// Highest damage the request can legitimately produce, summed over the
    /// targets it could reach.
    fn max_damage(
        &self,
        session: &CombatSession,
        request: &ActionRequest,
        actor: &Participant,
        resolved: Resolved<'_>,
    ) -> f32 {
        let Some(attacker) = session.effective_stats(actor.id) else {
            return 0.0;
        };
        let against = |target: ParticipantId, skill: Option<&Skill>| {
            session
                .effective_stats(target)
                .map_or(0.0, |defender| calculator::max_damage(self.config, &attacker, &defender, skill))
        };
        match (request.action_type, resolved.skill) {
            (ActionType::Attack, _) => request.target.map_or(0.0, |t| against(t, None)),
            (ActionType::Skill, Some(skill)) if skill.is_damaging() => {
                validate::skill_targets(session, actor, skill, request.target)
                    .map_or(0.0, |targets| targets.into_iter().map(|t| against(t, Some(skill))).sum())
            }
            _ => 0.0,
        }
    }

    fn check_rules<'c>(
        &self,
        session: &CombatSession,
        request: &ActionRequest,
        actor: &Participant,
        resolved: Resolved<'c>,
    ) -> Result<Ready<'c>, ActionRejection> {
        validate::check_actor(session, actor)?;
        match request.action_type {
            ActionType::Attack => {
                let target = request
                    .target
                    .ok_or(ActionRejection::TargetMissing { action: "attack" })?;
                Ok(Ready::Attack(validate::attack_target(session, actor, target)?))
            }
            ActionType::Skill => {
                let skill = resolved.skill.ok_or(ActionRejection::SkillMissing)?;
                validate::check_skill_resources(session, actor, skill, self.cooldowns)?;
                let targets = validate::skill_targets(session, actor, skill, request.target)?;
                validate::check_requirements(session, actor, skill, &targets)?;
                Ok(Ready::Skill(skill, targets))
            }
            ActionType::Item => {
                if !session.settings().allow_items {
                    return Err(ActionRejection::ItemsDisabled);
                }
                let item = resolved.item.ok_or(ActionRejection::ItemMissing)?;
                Ok(Ready::Item(item, validate::item_target(session, actor, request.target)?))
            }
            ActionType::Defend => Ok(Ready::Defend),
            ActionType::Flee => {
                if session.settings().allow_flee {
                    Ok(Ready::Flee)
                } else {
                    Err(ActionRejection::FleeDisabled)
                }
            }
            ActionType::Wait => Ok(Ready::Wait),
        }
    }

    fn reject(
        &self,
        session: &CombatSession,
        record: ActionRecord,
        rejection: &ActionRejection,
        verdict: Option<&Verdict>,
    ) -> Resolution {
        debug!(
            target: "skirmish::pipeline",
            session = %session.id(),
            actor = %record.actor,
            action = %record.action_type,
            code = rejection.code(),
            category = ?rejection.category(),
            reason = %rejection,
            "action rejected"
        );
        let report = verdict.map(AntiCheatReport::from).unwrap_or_default();
        Resolution {
            result: ActionResult::rejected(record, rejection, report, session.status()),
            commit: CommitReport::default(),
        }
    }
}

fn plan_action(
    ctx: &PlanContext<'_>,
    ready: &Ready<'_>,
    record: &mut ActionRecord,
    rng: &mut dyn RandomSource,
) -> Plan {
    match ready {
        Ready::Attack(target) => handlers::plan_attack(ctx, *target, record, rng),
        Ready::Skill(skill, targets) => handlers::plan_skill(ctx, skill, targets, record, rng),
        Ready::Item(item, target) => handlers::plan_item(ctx, item, *target, record),
        Ready::Defend => handlers::plan_defend(ctx),
        Ready::Flee => handlers::plan_flee(ctx, rng),
        Ready::Wait => handlers::plan_wait(ctx),
    }
}
