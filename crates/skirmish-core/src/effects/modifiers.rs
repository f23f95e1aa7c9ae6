//! Stat modifier aggregation.
//!
//! Flat modifiers are summed per stat, percentage modifiers are summed per stat
//! separately, and effective values are computed as
//!
//! ```text
//! effective = (base + flat_sum) × (1 + percent_sum / 100)
//! ```
//!
//! Flat always comes first. Changing the order changes results, so every
//! consumer goes through [`StatModifiers::apply`].

use serde::{Deserialize, Serialize};

use super::{ModifierMode, StatModifier};
use crate::participant::{CombatStats, EffectiveStats, StatKind};

/// Aggregated modifiers for one target.
///
/// # Example
///
/// ```
/// use skirmish_core::effects::{StatModifier, StatModifiers};
/// use skirmish_core::participant::StatKind;
///
/// let mut mods = StatModifiers::default();
/// mods.add(&StatModifier::flat(StatKind::PhysicalDamage, 5.0), 1);
/// mods.add(&StatModifier::percentage(StatKind::PhysicalDamage, 20.0), 1);
///
/// // (10 + 5) × 1.2
/// assert!((mods.apply(StatKind::PhysicalDamage, 10.0) - 18.0).abs() < 1e-4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatModifiers {
    flat: [f32; StatKind::COUNT],
    percent: [f32; StatKind::COUNT],
}

impl StatModifiers {
    /// Adds a modifier scaled by `stacks`.
    pub fn add(&mut self, modifier: &StatModifier, stacks: u32) {
        #[allow(clippy::cast_precision_loss)]
        let amount = modifier.value * stacks as f32;
        let idx = modifier.stat.index();
        match modifier.mode {
            ModifierMode::Flat => self.flat[idx] += amount,
            ModifierMode::Percentage => self.percent[idx] += amount,
        }
    }

    /// Summed flat modifiers for a stat.
    #[must_use]
    pub fn flat(&self, stat: StatKind) -> f32 {
        self.flat[stat.index()]
    }

    /// Summed percentage modifiers for a stat, in percent points.
    #[must_use]
    pub fn percent(&self, stat: StatKind) -> f32 {
        self.percent[stat.index()]
    }

    /// Returns true if no modifier touches any stat.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flat.iter().chain(self.percent.iter()).all(|v| *v == 0.0)
    }

    /// Applies flat then percentage modifiers to `base`. Never negative.
    #[must_use]
    pub fn apply(&self, stat: StatKind, base: f32) -> f32 {
        let idx = stat.index();
        let after_flat = base + self.flat[idx];
        (after_flat * (1.0 + self.percent[idx] / 100.0)).max(0.0)
    }

    /// Effective combat stats for a participant carrying these modifiers.
    #[must_use]
    pub fn effective(&self, stats: &CombatStats) -> EffectiveStats {
        let value = |stat: StatKind| self.apply(stat, stats.base(stat));
        EffectiveStats {
            physical_damage: value(StatKind::PhysicalDamage),
            magical_damage: value(StatKind::MagicalDamage),
            physical_defense: value(StatKind::PhysicalDefense),
            magical_defense: value(StatKind::MagicalDefense),
            crit_chance: value(StatKind::CritChance),
            attack_speed: value(StatKind::AttackSpeed),
            movement_speed: value(StatKind::MovementSpeed),
            damage_taken: value(StatKind::DamageTaken),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_modifiers_sum() {
        let mut mods = StatModifiers::default();
        mods.add(&StatModifier::flat(StatKind::PhysicalDefense, 4.0), 1);
        mods.add(&StatModifier::flat(StatKind::PhysicalDefense, 6.0), 1);
        assert_eq!(mods.flat(StatKind::PhysicalDefense), 10.0);
        assert_eq!(mods.apply(StatKind::PhysicalDefense, 5.0), 15.0);
    }

    #[test]
    fn flat_is_applied_before_percentage() {
        let mut mods = StatModifiers::default();
        mods.add(&StatModifier::percentage(StatKind::AttackSpeed, 50.0), 1);
        mods.add(&StatModifier::flat(StatKind::AttackSpeed, 10.0), 1);
        // (10 + 10) × 1.5, not 10 × 1.5 + 10
        assert!((mods.apply(StatKind::AttackSpeed, 10.0) - 30.0).abs() < 1e-4);
    }

    #[test]
    fn stacks_scale_modifier() {
        let mut mods = StatModifiers::default();
        mods.add(&StatModifier::flat(StatKind::MagicalDamage, 3.0), 4);
        assert_eq!(mods.flat(StatKind::MagicalDamage), 12.0);
    }

    #[test]
    fn result_never_negative() {
        let mut mods = StatModifiers::default();
        mods.add(&StatModifier::flat(StatKind::PhysicalDefense, -50.0), 1);
        assert_eq!(mods.apply(StatKind::PhysicalDefense, 5.0), 0.0);
    }

    #[test]
    fn damage_taken_defaults_to_one() {
        let mods = StatModifiers::default();
        let eff = mods.effective(&CombatStats::default());
        assert_eq!(eff.damage_taken, 1.0);
        assert!(mods.is_empty());
    }

    #[test]
    fn defend_halves_damage_taken() {
        let mut mods = StatModifiers::default();
        mods.add(&StatModifier::percentage(StatKind::DamageTaken, -50.0), 1);
        let eff = mods.effective(&CombatStats::default());
        assert!((eff.damage_taken - 0.5).abs() < 1e-6);
    }
}
