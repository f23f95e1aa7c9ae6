//! Per-session effect storage and the apply/tick/dispel/absorb operations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::{
    ApplyOutcome, DispelType, EffectId, EffectKind, EffectState, EffectTemplate, StatModifiers,
    StatusEffect, TickOutcome,
};
use crate::config::EffectConfig;
use crate::participant::ParticipantId;

/// Result of [`EffectEngine::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct Application {
    /// What happened to the incoming effect
    pub outcome: ApplyOutcome,
    /// Effects taken off the target as a consequence (replaced or displaced)
    pub removed: Vec<StatusEffect>,
}

/// Result of [`EffectEngine::absorb_damage`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShieldAbsorption {
    /// Damage soaked by shields
    pub absorbed: f32,
    /// Damage left for health
    pub remaining: f32,
    /// Shields consumed down to zero
    pub depleted: Vec<StatusEffect>,
}

/// Owner of all live effects in one session.
///
/// Effects are stored per target in a `BTreeMap` so that ticking and
/// aggregation iterate in participant-id order, which keeps replays
/// reproducible.
///
/// The engine tracks the session's current turn. Effects applied during a
/// turn are skipped by that turn's closing [`tick_all`](Self::tick_all), so a
/// one-turn effect always covers the following turn in full.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EffectEngine {
    effects: BTreeMap<ParticipantId, Vec<StatusEffect>>,
    incompatible: Vec<(String, String)>,
    next_id: u64,
    #[serde(default)]
    turn: u32,
}

impl EffectEngine {
    /// Creates an empty engine with the configured incompatibility rules.
    #[must_use]
    pub fn new(config: &EffectConfig) -> Self {
        Self {
            effects: BTreeMap::new(),
            incompatible: config
                .incompatible
                .iter()
                .map(|[a, b]| (a.clone(), b.clone()))
                .collect(),
            next_id: 0,
            turn: 0,
        }
    }

    /// Opens `turn`. Effects applied from now on are stamped with it.
    pub fn begin_turn(&mut self, turn: u32) {
        self.turn = turn;
    }

    /// Turn currently open.
    #[must_use]
    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// Applies `template` to `target`.
    ///
    /// Never fails: a rejected application is reported as
    /// [`ApplyOutcome::Resisted`] and leaves the target untouched.
    pub fn apply(
        &mut self,
        template: &EffectTemplate,
        target: ParticipantId,
        caster: Option<ParticipantId>,
    ) -> Application {
        let turn = self.turn;
        let incompatible = &self.incompatible;
        let list = self.effects.entry(target).or_default();

        let existing = list
            .iter()
            .position(|e| e.active && e.name == template.name);

        if let Some(pos) = existing {
            if list[pos].kind == EffectKind::Immunity {
                debug!(target: "skirmish::effects", effect = %template.name, %target, "resisted by immunity");
                return Application {
                    outcome: ApplyOutcome::Resisted {
                        reason: format!("{} is immune to {}", target, template.name),
                    },
                    removed: Vec::new(),
                };
            }
        }

        let conflicts: Vec<usize> = list
            .iter()
            .enumerate()
            .filter(|(_, e)| e.active && are_incompatible(incompatible, &e.name, &template.name))
            .map(|(i, _)| i)
            .collect();

        if let Some(stronger) = conflicts
            .iter()
            .map(|&i| &list[i])
            .find(|e| e.priority > template.priority)
        {
            return Application {
                outcome: ApplyOutcome::Resisted {
                    reason: format!("{} is suppressed by {}", template.name, stronger.name),
                },
                removed: Vec::new(),
            };
        }

        let mut removed = Vec::new();
        for &i in &conflicts {
            list[i].deactivate(EffectState::Replaced);
            removed.push(list[i].clone());
        }

        let outcome = match existing {
            Some(pos) if template.max_stacks > 1 => {
                let effect = &mut list[pos];
                effect.max_stacks = template.max_stacks;
                effect.current_stacks = (effect.current_stacks + 1).min(effect.max_stacks);
                effect.remaining_turns = template.duration;
                effect.applied_turn = turn;
                effect.state = EffectState::Stacked;
                ApplyOutcome::Stacked {
                    id: effect.id,
                    stacks: effect.current_stacks,
                }
            }
            Some(pos)
                if matches!(
                    template.kind,
                    EffectKind::DamageOverTime | EffectKind::HealOverTime | EffectKind::Shield
                ) =>
            {
                list[pos].deactivate(EffectState::Replaced);
                removed.push(list[pos].clone());
                let old = list[pos].id;
                self.next_id += 1;
                let new = EffectId::new(self.next_id);
                list.push(stamped(new, template, target, caster, turn));
                ApplyOutcome::Replaced { old, new }
            }
            Some(pos) => {
                let effect = &mut list[pos];
                effect.remaining_turns = template.duration;
                effect.applied_turn = turn;
                effect.state = EffectState::Refreshed;
                ApplyOutcome::Refreshed { id: effect.id }
            }
            None => {
                self.next_id += 1;
                let id = EffectId::new(self.next_id);
                list.push(stamped(id, template, target, caster, turn));
                ApplyOutcome::Applied { id }
            }
        };

        list.retain(|e| e.active);
        debug!(target: "skirmish::effects", effect = %template.name, %target, ?outcome, "effect applied");
        Application { outcome, removed }
    }

    /// Advances every effect on `target` by one turn, however recently it
    /// was applied.
    ///
    /// Periodic effects report `magnitude × stacks` as damage or healing for
    /// the caller to apply. Effects reaching zero turns are removed.
    pub fn tick_target(&mut self, target: ParticipantId) -> Vec<TickOutcome> {
        self.tick(target, None)
    }

    /// Closes the open turn: ticks every target in participant-id order,
    /// skipping effects applied during this turn.
    pub fn tick_all(&mut self) -> Vec<TickOutcome> {
        let fresh = Some(self.turn);
        let targets: Vec<ParticipantId> = self.effects.keys().copied().collect();
        targets
            .into_iter()
            .flat_map(|target| self.tick(target, fresh))
            .collect()
    }

    fn tick(&mut self, target: ParticipantId, skip_turn: Option<u32>) -> Vec<TickOutcome> {
        let Some(list) = self.effects.get_mut(&target) else {
            return Vec::new();
        };

        let mut outcomes = Vec::with_capacity(list.len());
        for effect in list
            .iter_mut()
            .filter(|e| e.active && Some(e.applied_turn) != skip_turn)
        {
            let amount = effect.periodic_amount();
            effect.remaining_turns = effect.remaining_turns.saturating_sub(1);
            let expired = effect.remaining_turns == 0;
            if expired {
                effect.deactivate(EffectState::Expired);
            }
            outcomes.push(TickOutcome {
                effect_id: effect.id,
                name: effect.name.clone(),
                target,
                caster: effect.caster,
                damage: if effect.kind == EffectKind::DamageOverTime { amount } else { 0.0 },
                healing: if effect.kind == EffectKind::HealOverTime { amount } else { 0.0 },
                remaining_turns: effect.remaining_turns,
                expired,
            });
        }
        list.retain(|e| e.active);
        outcomes
    }

    /// Removes up to `max_count` dispellable effects matching `dispel`,
    /// highest priority first (oldest first among equal priority).
    pub fn dispel(
        &mut self,
        target: ParticipantId,
        dispel: DispelType,
        max_count: usize,
    ) -> Vec<StatusEffect> {
        let Some(list) = self.effects.get_mut(&target) else {
            return Vec::new();
        };

        let mut candidates: Vec<usize> = list
            .iter()
            .enumerate()
            .filter(|(_, e)| e.active && e.dispellable && dispel.matches(e.category))
            .map(|(i, _)| i)
            .collect();
        candidates.sort_by(|&a, &b| {
            list[b]
                .priority
                .cmp(&list[a].priority)
                .then(list[a].id.cmp(&list[b].id))
        });

        let mut removed = Vec::new();
        for i in candidates.into_iter().take(max_count) {
            list[i].deactivate(EffectState::Dispelled);
            removed.push(list[i].clone());
        }
        list.retain(|e| e.active);
        debug!(target: "skirmish::effects", %target, ?dispel, count = removed.len(), "dispelled");
        removed
    }

    /// Consumes shields on `target` (oldest first) against `amount` of damage.
    pub fn absorb_damage(&mut self, target: ParticipantId, amount: f32) -> ShieldAbsorption {
        let mut result = ShieldAbsorption {
            absorbed: 0.0,
            remaining: amount.max(0.0),
            depleted: Vec::new(),
        };
        let Some(list) = self.effects.get_mut(&target) else {
            return result;
        };

        for shield in list
            .iter_mut()
            .filter(|e| e.active && e.kind == EffectKind::Shield)
        {
            if result.remaining <= 0.0 {
                break;
            }
            let soaked = shield.magnitude.min(result.remaining);
            shield.magnitude -= soaked;
            result.absorbed += soaked;
            result.remaining -= soaked;
            if shield.magnitude <= 0.0 {
                shield.deactivate(EffectState::Expired);
                result.depleted.push(shield.clone());
            }
        }
        list.retain(|e| e.active);
        result
    }

    /// Total shield capacity currently on `target`.
    #[must_use]
    pub fn shield_capacity(&self, target: ParticipantId) -> f32 {
        self.effects_on(target)
            .iter()
            .filter(|e| e.kind == EffectKind::Shield)
            .map(|e| e.magnitude)
            .sum()
    }

    /// Aggregated stat modifiers for `target`.
    #[must_use]
    pub fn aggregate_modifiers(&self, target: ParticipantId) -> StatModifiers {
        let mut modifiers = StatModifiers::default();
        for effect in self.effects_on(target).iter().filter(|e| e.active) {
            if let Some(modifier) = &effect.modifier {
                modifiers.add(modifier, effect.current_stacks);
            }
        }
        modifiers
    }

    /// Live effects on `target`.
    #[must_use]
    pub fn effects_on(&self, target: ParticipantId) -> &[StatusEffect] {
        self.effects.get(&target).map_or(&[], Vec::as_slice)
    }

    /// Returns true if `target` carries an active effect of `kind`.
    #[must_use]
    pub fn has_kind(&self, target: ParticipantId, kind: EffectKind) -> bool {
        self.effects_on(target)
            .iter()
            .any(|e| e.active && e.kind == kind)
    }

    /// Returns true if `target` is stunned.
    #[must_use]
    pub fn is_stunned(&self, target: ParticipantId) -> bool {
        self.has_kind(target, EffectKind::Stun)
    }

    /// Returns true if `target` is silenced.
    #[must_use]
    pub fn is_silenced(&self, target: ParticipantId) -> bool {
        self.has_kind(target, EffectKind::Silence)
    }

    /// Removes every effect from `target` (death or leaving combat).
    pub fn clear_target(&mut self, target: ParticipantId) -> Vec<StatusEffect> {
        let mut removed = self.effects.remove(&target).unwrap_or_default();
        for effect in &mut removed {
            effect.deactivate(EffectState::Expired);
        }
        removed
    }

    /// Drops inactive effects and empty target entries. Returns how many
    /// effects were dropped.
    pub fn purge_inactive(&mut self) -> usize {
        let mut purged = 0;
        for list in self.effects.values_mut() {
            let before = list.len();
            list.retain(|e| e.active && e.remaining_turns > 0);
            purged += before - list.len();
        }
        self.effects.retain(|_, list| !list.is_empty());
        purged
    }

    /// Number of live effects across all targets.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.effects.values().map(Vec::len).sum()
    }
}

fn are_incompatible(rules: &[(String, String)], a: &str, b: &str) -> bool {
    rules
        .iter()
        .any(|(x, y)| (x == a && y == b) || (x == b && y == a))
}

fn stamped(
    id: EffectId,
    template: &EffectTemplate,
    target: ParticipantId,
    caster: Option<ParticipantId>,
    turn: u32,
) -> StatusEffect {
    let mut effect = StatusEffect::from_template(id, template, target, caster);
    effect.applied_turn = turn;
    effect
}
