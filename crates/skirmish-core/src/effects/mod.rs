//! Status-effect engine.
//!
//! Status effects are buffs, debuffs, periodic damage/healing, shields and
//! crowd control attached to a participant for a number of turns. This module
//! provides:
//! - [`EffectTemplate`]: The blueprint skills and items carry
//! - [`StatusEffect`]: A live instance on a target
//! - [`EffectEngine`]: Per-session owner of all live effects (apply, tick, dispel, absorb)
//! - [`StatModifiers`]: Aggregated flat/percentage stat modifiers for a target
//!
//! # Lifecycle
//!
//! ```text
//! Applied ──► (Stacked | Refreshed)* ──► Expired | Dispelled | Replaced
//!    ▲
//!    └── Resisted (never inserted)
//! ```
//!
//! When an effect with the same name already sits on the target, the strategy
//! is chosen by kind:
//!
//! | Existing / incoming                 | Strategy  |
//! |-------------------------------------|-----------|
//! | existing is `Immunity`              | resist    |
//! | incoming `max_stacks > 1`           | stack     |
//! | DoT, HoT, Shield                    | replace   |
//! | anything else                       | refresh   |
//!
//! The engine never touches participant health. Periodic ticks and shield
//! absorption return amounts; the session applies them.

mod engine;
mod modifiers;

pub use engine::{Application, EffectEngine, ShieldAbsorption};
pub use modifiers::StatModifiers;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::participant::{ParticipantId, StatKind};

/// Unique identifier for a live effect within a session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EffectId(u64);

impl EffectId {
    /// Creates a new effect id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect:{}", self.0)
    }
}

/// Category of a status effect.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// Beneficial stat modifier
    Buff,
    /// Harmful stat modifier
    Debuff,
    /// Damage each turn
    DamageOverTime,
    /// Healing each turn
    HealOverTime,
    /// Absorbs incoming damage before health
    Shield,
    /// Prevents acting
    Stun,
    /// Prevents skill use
    Silence,
    /// Blocks reapplication of the same named effect
    Immunity,
}

impl EffectKind {
    /// Returns true for kinds that tick an amount each turn.
    #[must_use]
    pub const fn is_periodic(self) -> bool {
        matches!(self, Self::DamageOverTime | Self::HealOverTime)
    }
}

/// Whether a stat modifier is an absolute or a relative change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierMode {
    /// Added to the base value
    Flat,
    /// Percent points applied after all flat modifiers
    Percentage,
}

/// A single stat change carried by an effect.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatModifier {
    /// Stat affected
    pub stat: StatKind,
    /// Amount per stack (percent points for `Percentage`)
    pub value: f32,
    /// Flat or percentage
    pub mode: ModifierMode,
}

impl StatModifier {
    /// Flat modifier.
    #[must_use]
    pub const fn flat(stat: StatKind, value: f32) -> Self {
        Self {
            stat,
            value,
            mode: ModifierMode::Flat,
        }
    }

    /// Percentage modifier (`value` in percent points, e.g. `20.0` = +20%).
    #[must_use]
    pub const fn percentage(stat: StatKind, value: f32) -> Self {
        Self {
            stat,
            value,
            mode: ModifierMode::Percentage,
        }
    }
}

/// Dispel school an effect belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispelCategory {
    /// Magic (default)
    #[default]
    Magic,
    /// Poison
    Poison,
    /// Disease
    Disease,
    /// Curse
    Curse,
}

/// Filter used by dispels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispelType {
    /// Magic effects only
    Magic,
    /// Poison effects only
    Poison,
    /// Disease effects only
    Disease,
    /// Curse effects only
    Curse,
    /// Any dispellable effect
    All,
}

impl DispelType {
    /// Returns true if this dispel removes effects of `category`.
    #[must_use]
    pub const fn matches(self, category: DispelCategory) -> bool {
        matches!(
            (self, category),
            (Self::All, _)
                | (Self::Magic, DispelCategory::Magic)
                | (Self::Poison, DispelCategory::Poison)
                | (Self::Disease, DispelCategory::Disease)
                | (Self::Curse, DispelCategory::Curse)
        )
    }
}

/// Lifecycle state of an effect.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectState {
    /// Freshly applied
    Applied,
    /// Gained a stack on reapplication
    Stacked,
    /// Duration reset on reapplication
    Refreshed,
    /// Duration ran out (or a shield was depleted)
    Expired,
    /// Removed by a dispel
    Dispelled,
    /// Removed by a newer application of the same effect or an incompatible one
    Replaced,
}

fn default_stacks() -> u32 {
    1
}

fn default_dispellable() -> bool {
    true
}

/// Blueprint for an effect, as carried by skills, items and the defend action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectTemplate {
    /// Effect name; effects with the same name on a target interact
    pub name: String,
    /// Effect kind
    pub kind: EffectKind,
    /// Stat modifier (buffs and debuffs)
    #[serde(default)]
    pub modifier: Option<StatModifier>,
    /// Per-stack periodic amount, or shield capacity
    #[serde(default)]
    pub magnitude: f32,
    /// Duration in turns
    pub duration: u32,
    /// Stack cap (1 = not stackable)
    #[serde(default = "default_stacks")]
    pub max_stacks: u32,
    /// Whether dispels may remove it
    #[serde(default = "default_dispellable")]
    pub dispellable: bool,
    /// Dispel school
    #[serde(default)]
    pub category: DispelCategory,
    /// Priority for dispel order and incompatibility resolution
    #[serde(default)]
    pub priority: u8,
}

impl EffectTemplate {
    /// Creates a template with default stacking/dispel settings.
    #[must_use]
    pub fn new(name: &str, kind: EffectKind, duration: u32) -> Self {
        Self {
            name: name.to_string(),
            kind,
            modifier: None,
            magnitude: 0.0,
            duration,
            max_stacks: 1,
            dispellable: true,
            category: DispelCategory::Magic,
            priority: 0,
        }
    }

    /// Sets the stat modifier.
    #[must_use]
    pub fn with_modifier(mut self, modifier: StatModifier) -> Self {
        self.modifier = Some(modifier);
        self
    }

    /// Sets the periodic amount or shield capacity.
    #[must_use]
    pub fn with_magnitude(mut self, magnitude: f32) -> Self {
        self.magnitude = magnitude;
        self
    }

    /// Sets the stack cap.
    #[must_use]
    pub fn with_max_stacks(mut self, max_stacks: u32) -> Self {
        self.max_stacks = max_stacks.max(1);
        self
    }

    /// Sets the dispel school.
    #[must_use]
    pub fn with_category(mut self, category: DispelCategory) -> Self {
        self.category = category;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Marks the effect as not dispellable.
    #[must_use]
    pub fn undispellable(mut self) -> Self {
        self.dispellable = false;
        self
    }
}

/// A live effect on a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEffect {
    /// Effect id
    pub id: EffectId,
    /// Effect name
    pub name: String,
    /// Effect kind
    pub kind: EffectKind,
    /// Participant carrying the effect
    pub target: ParticipantId,
    /// Participant that applied it, if any
    pub caster: Option<ParticipantId>,
    /// Stat modifier, per stack
    pub modifier: Option<StatModifier>,
    /// Per-stack periodic amount, or remaining shield capacity
    pub magnitude: f32,
    /// Turns left before expiry
    pub remaining_turns: u32,
    /// Current stacks (always `1..=max_stacks`)
    pub current_stacks: u32,
    /// Stack cap
    pub max_stacks: u32,
    /// Whether dispels may remove it
    pub dispellable: bool,
    /// Dispel school
    pub category: DispelCategory,
    /// Priority for dispels and incompatibility
    pub priority: u8,
    /// Lifecycle state
    pub state: EffectState,
    /// False once expired, dispelled or replaced
    pub active: bool,
    /// Turn the effect was last applied, stacked or refreshed on
    #[serde(default)]
    pub applied_turn: u32,
}

impl StatusEffect {
    /// Instantiates a template on a target.
    #[must_use]
    pub fn from_template(
        id: EffectId,
        template: &EffectTemplate,
        target: ParticipantId,
        caster: Option<ParticipantId>,
    ) -> Self {
        Self {
            id,
            name: template.name.clone(),
            kind: template.kind,
            target,
            caster,
            modifier: template.modifier,
            magnitude: template.magnitude,
            remaining_turns: template.duration,
            current_stacks: 1,
            max_stacks: template.max_stacks.max(1),
            dispellable: template.dispellable,
            category: template.category,
            priority: template.priority,
            state: EffectState::Applied,
            active: true,
            applied_turn: 0,
        }
    }

    /// Periodic amount this effect produces on its next tick.
    #[must_use]
    pub fn periodic_amount(&self) -> f32 {
        if self.kind.is_periodic() {
            #[allow(clippy::cast_precision_loss)]
            let stacks = self.current_stacks as f32;
            self.magnitude * stacks
        } else {
            0.0
        }
    }

    fn deactivate(&mut self, state: EffectState) {
        self.state = state;
        self.active = false;
    }
}

/// Outcome of an effect application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// New effect inserted
    Applied {
        /// New effect id
        id: EffectId,
    },
    /// Existing effect gained a stack (capped) and had its duration re-rolled
    Stacked {
        /// Existing effect id
        id: EffectId,
        /// Stacks after application
        stacks: u32,
    },
    /// Existing effect had its duration reset
    Refreshed {
        /// Existing effect id
        id: EffectId,
    },
    /// Existing effect deleted and a new one inserted
    Replaced {
        /// Deleted effect id
        old: EffectId,
        /// Inserted effect id
        new: EffectId,
    },
    /// Application rejected
    Resisted {
        /// Why it was rejected
        reason: String,
    },
}

impl ApplyOutcome {
    /// Id of the effect now live on the target, if any.
    #[must_use]
    pub fn live_id(&self) -> Option<EffectId> {
        match self {
            Self::Applied { id } | Self::Stacked { id, .. } | Self::Refreshed { id } => Some(*id),
            Self::Replaced { new, .. } => Some(*new),
            Self::Resisted { .. } => None,
        }
    }

    /// Returns true if a new effect instance was inserted.
    #[must_use]
    pub fn inserted(&self) -> bool {
        matches!(self, Self::Applied { .. } | Self::Replaced { .. })
    }
}

/// Result of ticking one effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickOutcome {
    /// Effect ticked
    pub effect_id: EffectId,
    /// Effect name
    pub name: String,
    /// Target
    pub target: ParticipantId,
    /// Caster, if known
    pub caster: Option<ParticipantId>,
    /// Damage produced (DoT)
    pub damage: f32,
    /// Healing produced (HoT)
    pub healing: f32,
    /// Turns left after this tick
    pub remaining_turns: u32,
    /// Whether the effect expired on this tick
    pub expired: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispel_type_matching() {
        assert!(DispelType::All.matches(DispelCategory::Curse));
        assert!(DispelType::Poison.matches(DispelCategory::Poison));
        assert!(!DispelType::Poison.matches(DispelCategory::Magic));
    }

    #[test]
    fn periodic_amount_scales_with_stacks() {
        let template = EffectTemplate::new("poison", EffectKind::DamageOverTime, 3)
            .with_magnitude(5.0)
            .with_max_stacks(5);
        let mut effect =
            StatusEffect::from_template(EffectId::new(1), &template, ParticipantId::new(1), None);
        effect.current_stacks = 2;
        assert_eq!(effect.periodic_amount(), 10.0);
    }

    #[test]
    fn non_periodic_effects_produce_nothing() {
        let template = EffectTemplate::new("shield", EffectKind::Shield, 3).with_magnitude(40.0);
        let effect =
            StatusEffect::from_template(EffectId::new(1), &template, ParticipantId::new(1), None);
        assert_eq!(effect.periodic_amount(), 0.0);
    }

    #[test]
    fn template_parses_with_defaults() {
        let json = r#"{"name":"slow","kind":"debuff","duration":2,
            "modifier":{"stat":"attack_speed","value":-30.0,"mode":"percentage"}}"#;
        let template: EffectTemplate = serde_json::from_str(json).unwrap();
        assert_eq!(template.max_stacks, 1);
        assert!(template.dispellable);
        assert_eq!(template.category, DispelCategory::Magic);
        assert_eq!(
            template.modifier,
            Some(StatModifier::percentage(StatKind::AttackSpeed, -30.0))
        );
    }

    #[test]
    fn outcome_live_id() {
        let replaced = ApplyOutcome::Replaced {
            old: EffectId::new(1),
            new: EffectId::new(2),
        };
        assert_eq!(replaced.live_id(), Some(EffectId::new(2)));
        assert!(replaced.inserted());
        let resisted = ApplyOutcome::Resisted {
            reason: "immune".into(),
        };
        assert_eq!(resisted.live_id(), None);
    }
}
