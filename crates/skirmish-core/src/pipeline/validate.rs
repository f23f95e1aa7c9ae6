//! Request validation.
//!
//! Everything here is a pure read of the request, the catalog and the session.
//! No random draws, no mutation: a request that fails any check leaves the
//! session exactly as it was.

use crate::action::{ActionRequest, ActionType};
use crate::catalog::{Catalog, Item, Skill, SkillRequirement, TargetType};
use crate::cooldown::CooldownStore;
use crate::error::ActionRejection;
use crate::participant::{Participant, ParticipantId};
use crate::session::CombatSession;

/// Catalog entries a request refers to.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolved<'c> {
    /// Skill being cast
    pub skill: Option<&'c Skill>,
    /// Item being used
    pub item: Option<&'c Item>,
}

/// Required fields are present and catalog ids exist.
///
/// # Errors
///
/// [`ActionRejection::TargetMissing`], [`ActionRejection::SkillMissing`],
/// [`ActionRejection::ItemMissing`], [`ActionRejection::UnknownSkill`] or
/// [`ActionRejection::UnknownItem`].
pub fn check_structure<'c>(
    request: &ActionRequest,
    catalog: &'c Catalog,
) -> Result<Resolved<'c>, ActionRejection> {
    match request.action_type {
        ActionType::Attack => {
            if request.target.is_none() {
                return Err(ActionRejection::TargetMissing { action: "attack" });
            }
            Ok(Resolved::default())
        }
        ActionType::Skill => {
            let id = request.skill.as_ref().ok_or(ActionRejection::SkillMissing)?;
            let skill = catalog
                .skill(id)
                .ok_or_else(|| ActionRejection::UnknownSkill(id.clone()))?;
            if skill.target_type.requires_target() && request.target.is_none() {
                return Err(ActionRejection::TargetMissing { action: "skill" });
            }
            Ok(Resolved {
                skill: Some(skill),
                item: None,
            })
        }
        ActionType::Item => {
            let id = request.item.as_ref().ok_or(ActionRejection::ItemMissing)?;
            let item = catalog
                .item(id)
                .ok_or_else(|| ActionRejection::UnknownItem(id.clone()))?;
            Ok(Resolved {
                skill: None,
                item: Some(item),
            })
        }
        ActionType::Defend | ActionType::Flee | ActionType::Wait => Ok(Resolved::default()),
    }
}

/// Actor and target belong to the session.
///
/// # Errors
///
/// [`ActionRejection::UnknownParticipant`] naming the missing id.
pub fn check_membership<'s>(
    session: &'s CombatSession,
    request: &ActionRequest,
) -> Result<&'s Participant, ActionRejection> {
    let actor = session
        .participant(request.actor)
        .ok_or(ActionRejection::UnknownParticipant(request.actor))?;
    if let Some(target) = request.target {
        if session.participant(target).is_none() {
            return Err(ActionRejection::UnknownParticipant(target));
        }
    }
    Ok(actor)
}

/// The actor is able to act this turn.
///
/// # Errors
///
/// [`ActionRejection::ActorDead`], [`ActionRejection::ActorFled`],
/// [`ActionRejection::ActorStunned`], [`ActionRejection::AlreadyActed`] or,
/// under strict turn order, [`ActionRejection::OutOfTurn`].
pub fn check_actor(session: &CombatSession, actor: &Participant) -> Result<(), ActionRejection> {
    if !actor.is_alive() {
        return Err(ActionRejection::ActorDead(actor.id));
    }
    if actor.fled {
        return Err(ActionRejection::ActorFled(actor.id));
    }
    if session.effects().is_stunned(actor.id) {
        return Err(ActionRejection::ActorStunned(actor.id));
    }
    if session.has_acted(actor.id) {
        return Err(ActionRejection::AlreadyActed {
            actor: actor.id,
            turn: session.turn(),
        });
    }
    if session.settings().strict_turn_order {
        if let Some(next) = session.next_actor().filter(|next| *next != actor.id) {
            return Err(ActionRejection::OutOfTurn { actor: actor.id, next });
        }
    }
    Ok(())
}

/// Silence, mana and cooldown checks for a skill cast.
///
/// # Errors
///
/// [`ActionRejection::Silenced`], [`ActionRejection::InsufficientMana`] or
/// [`ActionRejection::OnCooldown`].
pub fn check_skill_resources(
    session: &CombatSession,
    actor: &Participant,
    skill: &Skill,
    cooldowns: &CooldownStore,
) -> Result<(), ActionRejection> {
    if session.effects().is_silenced(actor.id) {
        return Err(ActionRejection::Silenced(actor.id));
    }
    if skill.mana_cost > actor.stats.mana {
        return Err(ActionRejection::InsufficientMana {
            required: skill.mana_cost,
            available: actor.stats.mana,
        });
    }
    if let Some(turns_remaining) = cooldowns.remaining(actor.id, &skill.id, session.id(), session.turn()) {
        return Err(ActionRejection::OnCooldown {
            skill: skill.id.clone(),
            turns_remaining,
        });
    }
    Ok(())
}

/// Target of a basic attack.
///
/// # Errors
///
/// [`ActionRejection::InvalidTarget`] for self or out-of-play targets,
/// [`ActionRejection::AllyFire`] for allies while team damage is off.
pub fn attack_target(
    session: &CombatSession,
    actor: &Participant,
    target: ParticipantId,
) -> Result<ParticipantId, ActionRejection> {
    hostile_target(session, actor, target)
}

/// Targets of a skill cast, in participant-id order.
///
/// # Errors
///
/// [`ActionRejection::InvalidTarget`], [`ActionRejection::AllyFire`] or
/// [`ActionRejection::TargetMissing`].
pub fn skill_targets(
    session: &CombatSession,
    actor: &Participant,
    skill: &Skill,
    requested: Option<ParticipantId>,
) -> Result<Vec<ParticipantId>, ActionRejection> {
    match skill.target_type {
        TargetType::SingleEnemy => {
            let target = requested.ok_or(ActionRejection::TargetMissing { action: "skill" })?;
            Ok(vec![hostile_target(session, actor, target)?])
        }
        TargetType::SingleAlly => Ok(vec![friendly_target(session, actor, requested)?]),
        TargetType::SelfOnly => Ok(vec![actor.id]),
        TargetType::AllEnemies => Ok(session
            .participants()
            .filter(|p| p.in_play() && !p.is_ally_of(actor))
            .map(|p| p.id)
            .collect()),
        TargetType::AllAllies => Ok(session
            .participants()
            .filter(|p| p.in_play() && p.is_ally_of(actor))
            .map(|p| p.id)
            .collect()),
    }
}

/// Target of an item: the actor or a living ally.
///
/// # Errors
///
/// [`ActionRejection::InvalidTarget`].
pub fn item_target(
    session: &CombatSession,
    actor: &Participant,
    requested: Option<ParticipantId>,
) -> Result<ParticipantId, ActionRejection> {
    friendly_target(session, actor, requested)
}

/// Skill requirements hold for the caster and every target.
///
/// # Errors
///
/// [`ActionRejection::RequirementNotMet`] describing the first failure.
pub fn check_requirements(
    session: &CombatSession,
    actor: &Participant,
    skill: &Skill,
    targets: &[ParticipantId],
) -> Result<(), ActionRejection> {
    for requirement in &skill.requirements {
        match *requirement {
            SkillRequirement::CasterHealthBelow(threshold) => {
                if actor.stats.health_fraction() >= threshold {
                    return Err(ActionRejection::RequirementNotMet(format!(
                        "caster health must be below {:.0}%",
                        threshold * 100.0
                    )));
                }
            }
            SkillRequirement::TargetHealthBelow(threshold) => {
                let failing = targets.iter().find(|&&id| {
                    session
                        .participant(id)
                        .map_or(true, |p| p.stats.health_fraction() >= threshold)
                });
                if let Some(target) = failing {
                    return Err(ActionRejection::RequirementNotMet(format!(
                        "target {target} health must be below {:.0}%",
                        threshold * 100.0
                    )));
                }
            }
        }
    }
    Ok(())
}

fn hostile_target(
    session: &CombatSession,
    actor: &Participant,
    target: ParticipantId,
) -> Result<ParticipantId, ActionRejection> {
    if target == actor.id {
        return Err(ActionRejection::InvalidTarget {
            target,
            reason: "cannot target self",
        });
    }
    let defender = in_play(session, target)?;
    if defender.is_ally_of(actor) && !session.settings().team_damage {
        return Err(ActionRejection::AllyFire { target });
    }
    Ok(target)
}

fn friendly_target(
    session: &CombatSession,
    actor: &Participant,
    requested: Option<ParticipantId>,
) -> Result<ParticipantId, ActionRejection> {
    let target = requested.unwrap_or(actor.id);
    let ally = in_play(session, target)?;
    if !ally.is_ally_of(actor) {
        return Err(ActionRejection::InvalidTarget {
            target,
            reason: "target is not an ally",
        });
    }
    Ok(target)
}

fn in_play(session: &CombatSession, target: ParticipantId) -> Result<&Participant, ActionRejection> {
    let participant = session
        .participant(target)
        .ok_or(ActionRejection::UnknownParticipant(target))?;
    if !participant.is_alive() {
        return Err(ActionRejection::InvalidTarget {
            target,
            reason: "target is dead",
        });
    }
    if participant.fled {
        return Err(ActionRejection::InvalidTarget {
            target,
            reason: "target has fled",
        });
    }
    Ok(participant)
}
