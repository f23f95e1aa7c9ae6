//! Per-action-type planners.
//!
//! A planner reads the session and draws from the random source, then
//! proposes a [`ChangeSet`]. It never mutates the session; the pipeline commits
//! the plan only after every planner step succeeded.

use crate::action::{ActionRecord, ChangeSet, StateChange};
use crate::calculator::{self, HitOutcome};
use crate::catalog::{EffectTarget, Item, ItemEffect, Skill};
use crate::config::CombatConfig;
use crate::effects::{EffectKind, EffectTemplate, StatModifier};
use crate::participant::{EffectiveStats, Participant, ParticipantId, StatKind};
use crate::rng::RandomSource;
use crate::session::CombatSession;

/// Name of the buff applied by the defend action.
pub const DEFEND_EFFECT: &str = "defend";

/// Read-only inputs shared by every planner.
pub struct PlanContext<'a> {
    /// Formula constants
    pub config: &'a CombatConfig,
    /// Session being acted in
    pub session: &'a CombatSession,
    /// Acting participant
    pub actor: &'a Participant,
    /// Actor stats after effect modifiers
    pub actor_stats: EffectiveStats,
}

/// A proposed resolution.
#[derive(Debug, Default)]
pub struct Plan {
    /// Deltas to commit
    pub changes: ChangeSet,
    /// Connected damaging hits, for the statistical anti-cheat checks
    pub hits: Vec<HitOutcome>,
}

impl PlanContext<'_> {
    fn stats_of(&self, id: ParticipantId) -> Option<EffectiveStats> {
        self.session.effective_stats(id)
    }
}

/// Basic attack on one target.
pub fn plan_attack(
    ctx: &PlanContext<'_>,
    target: ParticipantId,
    record: &mut ActionRecord,
    rng: &mut dyn RandomSource,
) -> Plan {
    let mut plan = Plan::default();
    let Some(defender) = ctx.stats_of(target) else {
        return plan;
    };
    let outcome = calculator::resolve_hit(ctx.config, &ctx.actor_stats, &defender, None, rng);
    record.missed = !outcome.hit;
    record_hit(ctx, target, outcome, record, &mut plan);
    plan
}

/// Skill cast on already validated targets.
///
/// Damaging skills roll a hit per enemy target; healing skills roll a heal per
/// ally target. Per-target effects roll once per target and only land on
/// targets that were hit; caster effects roll once after all targets.
pub fn plan_skill(
    ctx: &PlanContext<'_>,
    skill: &Skill,
    targets: &[ParticipantId],
    record: &mut ActionRecord,
    rng: &mut dyn RandomSource,
) -> Plan {
    let mut plan = Plan::default();
    let caster = ctx.actor.id;

    if skill.mana_cost > 0.0 {
        plan.changes.push(StateChange::SpendMana {
            target: caster,
            amount: skill.mana_cost,
        });
        record.mana_used = skill.mana_cost;
    }
    plan.changes.log(format!("{caster} casts {}", skill.name));

    let offensive = !skill.target_type.is_friendly();
    let mut attempted = false;
    let mut connected_any = false;

    for &target in targets {
        let connected = if offensive && skill.is_damaging() {
            attempted = true;
            let Some(defender) = ctx.stats_of(target) else {
                continue;
            };
            let outcome =
                calculator::resolve_hit(ctx.config, &ctx.actor_stats, &defender, Some(skill), rng);
            record_hit(ctx, target, outcome, record, &mut plan);
            outcome.hit
        } else if !offensive && skill.is_healing() {
            let Some(ally) = ctx.session.participant(target) else {
                continue;
            };
            let heal = calculator::resolve_heal(
                ctx.config,
                &ctx.actor_stats,
                skill,
                ally.stats.health,
                ally.stats.max_health,
                rng,
            );
            plan.changes.push(StateChange::Heal {
                target,
                amount: heal.amount,
            });
            record.healing_done += heal.effective;
            record.critical |= heal.critical;
            plan.changes.log(format!(
                "{caster} heals {target} for {}{}",
                heal.effective,
                if heal.critical { " (critical)" } else { "" }
            ));
            true
        } else {
            true
        };
        connected_any |= connected;

        for effect in skill.effects.iter().filter(|e| e.target == EffectTarget::Target) {
            if rng.roll(effect.chance) && connected {
                plan.changes.push(StateChange::ApplyEffect {
                    target,
                    caster: Some(caster),
                    template: effect.template.clone(),
                });
            }
        }
    }

    record.missed = attempted && !connected_any;

    for effect in skill.effects.iter().filter(|e| e.target == EffectTarget::Caster) {
        if rng.roll(effect.chance) {
            plan.changes.push(StateChange::ApplyEffect {
                target: caster,
                caster: Some(caster),
                template: effect.template.clone(),
            });
        }
    }
    plan
}

/// Item use on the actor or an ally.
pub fn plan_item(ctx: &PlanContext<'_>, item: &Item, target: ParticipantId, record: &mut ActionRecord) -> Plan {
    let mut plan = Plan::default();
    let actor = ctx.actor.id;
    match &item.effect {
        ItemEffect::RestoreHealth { amount } => {
            if let Some(ally) = ctx.session.participant(target) {
                let (effective, _) =
                    calculator::split_overheal(amount.max(0.0), ally.stats.health, ally.stats.max_health);
                record.healing_done = effective;
            }
            plan.changes.push(StateChange::Heal {
                target,
                amount: *amount,
            });
        }
        ItemEffect::RestoreMana { amount } => {
            plan.changes.push(StateChange::RestoreMana {
                target,
                amount: *amount,
            });
        }
        ItemEffect::ApplyEffect { template } => {
            plan.changes.push(StateChange::ApplyEffect {
                target,
                caster: Some(actor),
                template: template.clone(),
            });
        }
        ItemEffect::Cleanse { dispel, max_count } => {
            plan.changes.push(StateChange::Dispel {
                target,
                dispel: *dispel,
                max_count: *max_count,
            });
        }
    }
    plan.changes.log(format!("{actor} uses {} on {target}", item.name));
    plan
}

/// Defend: a damage-taken reduction on the actor through the following turn.
pub fn plan_defend(ctx: &PlanContext<'_>) -> Plan {
    let mut plan = Plan::default();
    let actor = ctx.actor.id;
    let template = EffectTemplate::new(DEFEND_EFFECT, EffectKind::Buff, ctx.config.defend_duration)
        .with_modifier(StatModifier::percentage(
            StatKind::DamageTaken,
            -ctx.config.defend_damage_reduction,
        ));
    plan.changes.push(StateChange::ApplyEffect {
        target: actor,
        caster: Some(actor),
        template,
    });
    plan.changes.log(format!("{actor} defends"));
    plan
}

/// Flee attempt, scaled by speed against the living enemies' average.
pub fn plan_flee(ctx: &PlanContext<'_>, rng: &mut dyn RandomSource) -> Plan {
    let mut plan = Plan::default();
    let actor = ctx.actor.id;

    let enemy_speeds: Vec<f32> = ctx
        .session
        .participants()
        .filter(|p| p.in_play() && !p.is_ally_of(ctx.actor))
        .filter_map(|p| ctx.stats_of(p.id))
        .map(|s| s.movement_speed)
        .collect();
    let enemy_speed = if enemy_speeds.is_empty() {
        ctx.actor_stats.movement_speed
    } else {
        #[allow(clippy::cast_precision_loss)]
        let count = enemy_speeds.len() as f32;
        enemy_speeds.iter().sum::<f32>() / count
    };

    let chance = calculator::flee_chance(ctx.config, ctx.actor_stats.movement_speed, enemy_speed);
    if rng.roll(chance) {
        plan.changes.push(StateChange::Flee { target: actor });
        plan.changes.log(format!("{actor} fled the battle"));
    } else {
        plan.changes.log(format!("{actor} failed to flee"));
    }
    plan
}

/// Wait: regenerate a fraction of max mana.
pub fn plan_wait(ctx: &PlanContext<'_>) -> Plan {
    let mut plan = Plan::default();
    let actor = ctx.actor.id;
    let amount = (ctx.actor.stats.max_mana * ctx.config.wait_mana_regen).floor();
    plan.changes.push(StateChange::RestoreMana { target: actor, amount });
    plan.changes.log(format!("{actor} waits and recovers {amount} mana"));
    plan
}

fn record_hit(
    ctx: &PlanContext<'_>,
    target: ParticipantId,
    outcome: HitOutcome,
    record: &mut ActionRecord,
    plan: &mut Plan,
) {
    let actor = ctx.actor.id;
    if !outcome.hit {
        plan.changes.log(format!("{actor} misses {target}"));
        return;
    }
    record.damage_dealt += outcome.damage;
    record.critical |= outcome.critical;
    record.blocked |= outcome.blocked;
    plan.hits.push(outcome);
    plan.changes.push(StateChange::Damage {
        source: Some(actor),
        target,
        amount: outcome.damage,
    });
    let suffix = if outcome.critical {
        " (critical)"
    } else if outcome.blocked {
        " (blocked)"
    } else {
        ""
    };
    plan.changes
        .log(format!("{actor} hits {target} for {}{suffix}", outcome.damage));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionRequest;
    use crate::catalog::{DamageKind, TargetType};
    use crate::config::EffectConfig;
    use crate::participant::{CombatStats, TeamId};
    use crate::rng::ScriptedRandom;
    use crate::session::{SessionId, SessionSettings};

    const HIT: f32 = 0.0;
    const FAIL: f32 = 0.999;

    fn session() -> CombatSession {
        let mut session = CombatSession::new(
            SessionId::new(1),
            SessionSettings::default(),
            &EffectConfig::default(),
            0,
        );
        for (id, team) in [(1, 1), (2, 2), (3, 2)] {
            let mut p = Participant::new(ParticipantId::new(id), TeamId::new(team), CombatStats::default());
            p.ready = true;
            session.add_participant(p).unwrap();
        }
        session.start(0).unwrap();
        session
    }

    fn with_ctx<R>(session: &CombatSession, f: impl FnOnce(&PlanContext<'_>) -> R) -> R {
        let config = CombatConfig::default();
        let actor = session.participant(ParticipantId::new(1)).unwrap();
        let ctx = PlanContext {
            config: &config,
            session,
            actor,
            actor_stats: session.effective_stats(actor.id).unwrap(),
        };
        f(&ctx)
    }

    fn record(request: &ActionRequest) -> ActionRecord {
        ActionRecord::for_request(SessionId::new(1), request, 1, 0)
    }

    #[test]
    fn missed_attack_proposes_nothing() {
        let s = session();
        let request = ActionRequest::attack(ParticipantId::new(1), ParticipantId::new(2));
        let mut rec = record(&request);
        let mut rng = ScriptedRandom::new([FAIL]);
        let plan = with_ctx(&s, |ctx| plan_attack(ctx, ParticipantId::new(2), &mut rec, &mut rng));
        assert!(plan.changes.is_empty());
        assert!(rec.missed);
        assert_eq!(rng.remaining(), 0);
    }

    #[test]
    fn area_skill_applies_effect_only_to_hit_targets() {
        let s = session();
        let burn = EffectTemplate::new("burn", EffectKind::DamageOverTime, 2).with_magnitude(3.0);
        let nova = Skill::new("nova", TargetType::AllEnemies, DamageKind::Magical)
            .with_damage(10.0)
            .with_mana_cost(10.0)
            .with_effect(burn, 1.0, EffectTarget::Target);
        let request = ActionRequest::skill(ParticipantId::new(1), "nova", None);
        let mut rec = record(&request);
        // target 2: hit, no block, no crit, variance, effect roll
        // target 3: miss, effect roll
        let mut rng = ScriptedRandom::new([HIT, FAIL, FAIL, 0.5, HIT, FAIL, HIT]);

        let targets = [ParticipantId::new(2), ParticipantId::new(3)];
        let plan = with_ctx(&s, |ctx| plan_skill(ctx, &nova, &targets, &mut rec, &mut rng));

        let applied: Vec<ParticipantId> = plan
            .changes
            .changes
            .iter()
            .filter_map(|c| match c {
                StateChange::ApplyEffect { target, .. } => Some(*target),
                _ => None,
            })
            .collect();
        assert_eq!(applied, vec![ParticipantId::new(2)]);
        assert_eq!(rec.mana_used, 10.0);
        assert!(!rec.missed);
        assert_eq!(plan.hits.len(), 1);
        assert_eq!(rng.remaining(), 0);
    }

    #[test]
    fn healing_skill_reports_effective_healing() {
        let mut s = session();
        let mut wound = ChangeSet::new();
        wound.push(StateChange::Damage {
            source: None,
            target: ParticipantId::new(1),
            amount: 10.0,
        });
        s.apply_changes(&wound);

        let mend = Skill::new("mend", TargetType::SelfOnly, DamageKind::Magical).with_healing(20.0);
        let request = ActionRequest::skill(ParticipantId::new(1), "mend", None);
        let mut rec = record(&request);
        let mut rng = ScriptedRandom::new([FAIL]);
        let plan = with_ctx(&s, |ctx| plan_skill(ctx, &mend, &[ParticipantId::new(1)], &mut rec, &mut rng));

        // 20 + 0.8 × 10 = 28 rolled, 10 fits
        assert!(plan.changes.changes.contains(&StateChange::Heal {
            target: ParticipantId::new(1),
            amount: 28.0
        }));
        assert_eq!(rec.healing_done, 10.0);
    }

    #[test]
    fn defend_proposes_damage_taken_buff() {
        let s = session();
        let plan = with_ctx(&s, plan_defend);
        let StateChange::ApplyEffect { template, .. } = &plan.changes.changes[0] else {
            panic!("expected an effect");
        };
        assert_eq!(template.name, DEFEND_EFFECT);
        assert_eq!(
            template.modifier,
            Some(StatModifier::percentage(StatKind::DamageTaken, -50.0))
        );
    }

    #[test]
    fn wait_restores_tenth_of_max_mana() {
        let s = session();
        let plan = with_ctx(&s, plan_wait);
        assert_eq!(
            plan.changes.changes,
            vec![StateChange::RestoreMana {
                target: ParticipantId::new(1),
                amount: 5.0
            }]
        );
    }

    #[test]
    fn failed_flee_still_logs() {
        let s = session();
        let mut rng = ScriptedRandom::new([FAIL]);
        let plan = with_ctx(&s, |ctx| plan_flee(ctx, &mut rng));
        assert!(plan.changes.is_empty());
        assert_eq!(plan.changes.logs.len(), 1);
    }
}
