//! Damage and healing formulas.
//!
//! Pure functions over effective stats. Nothing here mutates a participant or
//! fails: degenerate inputs produce zero or clamped results. Randomness comes
//! from the injected [`RandomSource`] in a fixed order:
//!
//! ```text
//! hit ──miss──► done
//!  │
//!  ▼
//! block ──blocked──► floor(base × block_factor)       (true damage skips the block draw)
//!  │
//!  ▼
//! crit ──► variance ──► base × (1 − armor) × crit × damage_taken × variance, floored
//! ```
//!
//! # Example
//!
//! ```
//! use skirmish_core::calculator::{damage_reduction, resolve_hit};
//! use skirmish_core::config::CombatConfig;
//! use skirmish_core::participant::{CombatStats, EffectiveStats};
//! use skirmish_core::rng::ScriptedRandom;
//!
//! let config = CombatConfig::default();
//! let attacker = EffectiveStats::from(&CombatStats { physical_damage: 20.0, ..CombatStats::default() });
//! let defender = EffectiveStats::from(&CombatStats { physical_defense: 10.0, ..CombatStats::default() });
//!
//! // hit, no block, no crit, neutral variance
//! let mut rng = ScriptedRandom::new([0.0, 0.999, 0.999, 0.5]);
//! let outcome = resolve_hit(&config, &attacker, &defender, None, &mut rng);
//!
//! assert!(outcome.hit && !outcome.critical && !outcome.blocked);
//! assert!((damage_reduction(&config, 10.0) - 10.0 / 110.0).abs() < 1e-6);
//! assert_eq!(outcome.damage, 32.0); // floor(36 × (1 − 10/110))
//! ```

use serde::{Deserialize, Serialize};

use crate::catalog::{DamageKind, Skill};
use crate::config::CombatConfig;
use crate::participant::EffectiveStats;
use crate::rng::RandomSource;

/// Outcome of one attack against one defender.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HitOutcome {
    /// The attack connected
    pub hit: bool,
    /// The attack was a critical hit
    pub critical: bool,
    /// The defender blocked
    pub blocked: bool,
    /// Final damage before shields (whole points, never negative)
    pub damage: f32,
}

impl HitOutcome {
    const MISS: Self = Self {
        hit: false,
        critical: false,
        blocked: false,
        damage: 0.0,
    };
}

/// Outcome of one heal on one target.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HealOutcome {
    /// The heal was a critical
    pub critical: bool,
    /// Healing rolled (whole points)
    pub amount: f32,
    /// Healing that fits under the target's max health
    pub effective: f32,
    /// Healing wasted above max health
    pub overheal: f32,
}

/// Armor damage reduction `d / (d + k)`, capped at the configured maximum.
///
/// Non-decreasing in `defense`; negative defense counts as zero.
#[must_use]
pub fn damage_reduction(config: &CombatConfig, defense: f32) -> f32 {
    let d = defense.max(0.0);
    (d / (d + config.armor_constant)).clamp(0.0, config.max_damage_reduction)
}

/// Hit chance from the attacker's offense and the defender's defense.
#[must_use]
pub fn hit_chance(config: &CombatConfig, offense: f32, defense: f32) -> f32 {
    let chance = config.base_hit_chance + (offense - defense) / config.hit_stat_divisor;
    clamp_finite(chance, config.min_hit_chance, config.max_hit_chance)
}

/// Block chance from the defender's physical defense.
#[must_use]
pub fn block_chance(config: &CombatConfig, physical_defense: f32) -> f32 {
    let chance = config.base_block_chance + physical_defense / config.block_defense_divisor;
    clamp_finite(chance, 0.0, config.max_block_chance)
}

/// Crit chance from the base stat and a skill bonus.
#[must_use]
pub fn crit_chance(config: &CombatConfig, base: f32, bonus: f32) -> f32 {
    clamp_finite(base + bonus, 0.0, config.max_crit_chance)
}

/// Crit multiplier for a skill. A skill-specific value replaces the default.
#[must_use]
pub fn crit_multiplier(config: &CombatConfig, skill: Option<&Skill>) -> f32 {
    skill
        .and_then(|s| s.modifiers.critical_multiplier)
        .unwrap_or(config.crit_multiplier)
}

/// Mitigation school of an attack.
#[must_use]
pub fn damage_kind(skill: Option<&Skill>) -> DamageKind {
    skill.map_or(DamageKind::Physical, |s| s.damage_kind)
}

/// Offense stat matching a damage kind.
#[must_use]
pub fn offense(stats: &EffectiveStats, kind: DamageKind) -> f32 {
    match kind {
        DamageKind::Physical | DamageKind::True => stats.physical_damage,
        DamageKind::Magical => stats.magical_damage,
    }
}

/// Defense stat matching a damage kind.
#[must_use]
pub fn defense(stats: &EffectiveStats, kind: DamageKind) -> f32 {
    match kind {
        DamageKind::Physical | DamageKind::True => stats.physical_defense,
        DamageKind::Magical => stats.magical_defense,
    }
}

/// Damage before mitigation: the skill's base damage (or the attacker's
/// physical damage for a plain attack) plus scaled offense.
#[must_use]
pub fn base_damage(config: &CombatConfig, attacker: &EffectiveStats, skill: Option<&Skill>) -> f32 {
    let kind = damage_kind(skill);
    let flat = skill.map_or(attacker.physical_damage, |s| s.base_damage);
    (flat + config.offense_scaling * offense(attacker, kind)).max(0.0)
}

/// Damage remaining after armor for a damage kind. True damage ignores armor.
fn mitigated(config: &CombatConfig, base: f32, defender: &EffectiveStats, kind: DamageKind) -> f32 {
    match kind {
        DamageKind::True => base,
        DamageKind::Physical | DamageKind::Magical => {
            base * (1.0 - damage_reduction(config, defense(defender, kind)))
        }
    }
}

/// Largest damage this attack can legitimately produce against `defender`:
/// a critical hit with the highest variance roll.
#[must_use]
pub fn max_damage(
    config: &CombatConfig,
    attacker: &EffectiveStats,
    defender: &EffectiveStats,
    skill: Option<&Skill>,
) -> f32 {
    let kind = damage_kind(skill);
    let base = base_damage(config, attacker, skill);
    let full = mitigated(config, base, defender, kind)
        * crit_multiplier(config, skill)
        * defender.damage_taken.max(0.0)
        * (1.0 + config.damage_variance);
    let blocked = base * config.block_damage_factor;
    full.max(blocked).floor().max(0.0)
}

/// Resolves one attack.
///
/// `skill` is `None` for a plain attack.
pub fn resolve_hit(
    config: &CombatConfig,
    attacker: &EffectiveStats,
    defender: &EffectiveStats,
    skill: Option<&Skill>,
    rng: &mut dyn RandomSource,
) -> HitOutcome {
    let kind = damage_kind(skill);
    let chance = hit_chance(config, offense(attacker, kind), defense(defender, kind));
    if !rng.roll(chance) {
        return HitOutcome::MISS;
    }

    let base = base_damage(config, attacker, skill);

    if kind != DamageKind::True && rng.roll(block_chance(config, defender.physical_defense)) {
        return HitOutcome {
            hit: true,
            critical: false,
            blocked: true,
            damage: (base * config.block_damage_factor).floor().max(0.0),
        };
    }

    let bonus = skill.map_or(0.0, |s| s.modifiers.crit_chance_bonus);
    let critical = rng.roll(crit_chance(config, attacker.crit_chance, bonus));
    let variance = rng.range(1.0 - config.damage_variance, 1.0 + config.damage_variance);

    let mut damage = mitigated(config, base, defender, kind);
    if critical {
        damage *= crit_multiplier(config, skill);
    }
    damage *= defender.damage_taken.max(0.0);
    damage *= variance;

    HitOutcome {
        hit: true,
        critical,
        blocked: false,
        damage: finite_or_zero(damage.floor()).max(0.0),
    }
}

/// Resolves one heal from `caster` onto a target at `health` / `max_health`.
pub fn resolve_heal(
    config: &CombatConfig,
    caster: &EffectiveStats,
    skill: &Skill,
    health: f32,
    max_health: f32,
    rng: &mut dyn RandomSource,
) -> HealOutcome {
    let chance = crit_chance(config, caster.crit_chance, skill.modifiers.crit_chance_bonus);
    let critical = rng.roll(chance);

    let mut amount = skill.base_healing + config.offense_scaling * caster.magical_damage;
    if critical {
        amount *= crit_multiplier(config, Some(skill));
    }
    let amount = finite_or_zero(amount.floor()).max(0.0);
    let (effective, overheal) = split_overheal(amount, health, max_health);

    HealOutcome {
        critical,
        amount,
        effective,
        overheal,
    }
}

/// Splits `amount` into the part that fits under `max_health` and the excess.
#[must_use]
pub fn split_overheal(amount: f32, health: f32, max_health: f32) -> (f32, f32) {
    let room = (max_health - health).max(0.0);
    let effective = amount.min(room);
    (effective, amount - effective)
}

/// Chance that `speed` escapes enemies averaging `enemy_speed`.
#[must_use]
pub fn flee_chance(config: &CombatConfig, speed: f32, enemy_speed: f32) -> f32 {
    let chance = config.flee_base_chance + (speed - enemy_speed) * config.flee_speed_factor;
    clamp_finite(chance, config.min_flee_chance, config.max_flee_chance)
}

fn clamp_finite(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{SkillModifiers, TargetType};
    use crate::participant::CombatStats;
    use crate::rng::ScriptedRandom;

    const HIT: f32 = 0.0;
    const FAIL: f32 = 0.999;
    const NEUTRAL: f32 = 0.5;

    fn stats(f: impl FnOnce(&mut CombatStats)) -> EffectiveStats {
        let mut s = CombatStats::default();
        f(&mut s);
        EffectiveStats::from(&s)
    }

    mod chance_tests {
        use super::*;

        #[test]
        fn hit_chance_is_base_at_parity() {
            let config = CombatConfig::default();
            assert!((hit_chance(&config, 20.0, 20.0) - 0.85).abs() < 1e-6);
        }

        #[test]
        fn hit_chance_clamped_at_extremes() {
            let config = CombatConfig::default();
            assert_eq!(hit_chance(&config, 1e6, 0.0), 0.95);
            assert_eq!(hit_chance(&config, 0.0, 1e6), 0.05);
            assert_eq!(hit_chance(&config, f32::NAN, 0.0), 0.05);
        }

        #[test]
        fn block_chance_scales_with_defense_and_caps() {
            let config = CombatConfig::default();
            assert!((block_chance(&config, 100.0) - 0.15).abs() < 1e-6);
            assert_eq!(block_chance(&config, 10_000.0), 0.75);
            assert_eq!(block_chance(&config, -500.0), 0.0);
        }

        #[test]
        fn crit_chance_caps() {
            let config = CombatConfig::default();
            assert_eq!(crit_chance(&config, 0.9, 0.5), 0.95);
            assert_eq!(crit_chance(&config, 0.05, -1.0), 0.0);
        }

        #[test]
        fn flee_chance_scales_with_speed() {
            let config = CombatConfig::default();
            assert!((flee_chance(&config, 10.0, 10.0) - 0.5).abs() < 1e-6);
            assert!((flee_chance(&config, 14.0, 10.0) - 0.7).abs() < 1e-6);
            assert_eq!(flee_chance(&config, 100.0, 0.0), 0.9);
            assert_eq!(flee_chance(&config, 0.0, 100.0), 0.1);
        }
    }

    mod damage_tests {
        use super::*;

        #[test]
        fn reduction_follows_armor_curve() {
            let config = CombatConfig::default();
            assert_eq!(damage_reduction(&config, 0.0), 0.0);
            assert!((damage_reduction(&config, 100.0) - 0.5).abs() < 1e-6);
            assert_eq!(damage_reduction(&config, 1e9), 0.9);
        }

        #[test]
        fn plain_attack_matches_reference_numbers() {
            let config = CombatConfig::default();
            let attacker = stats(|s| s.physical_damage = 20.0);
            let defender = stats(|s| s.physical_defense = 10.0);
            let mut rng = ScriptedRandom::new([HIT, FAIL, FAIL, NEUTRAL]);

            let outcome = resolve_hit(&config, &attacker, &defender, None, &mut rng);

            assert!(outcome.hit);
            assert!(!outcome.critical);
            assert!(!outcome.blocked);
            // 36 × (1 − 10/110) = 32.73
            assert!((outcome.damage - 32.73).abs() < 1.0);
            assert_eq!(rng.remaining(), 0);
        }

        #[test]
        fn miss_consumes_only_hit_draw() {
            let config = CombatConfig::default();
            let a = stats(|_| {});
            let mut rng = ScriptedRandom::new([FAIL, HIT, HIT]);
            let outcome = resolve_hit(&config, &a, &a, None, &mut rng);
            assert_eq!(outcome, HitOutcome::MISS);
            assert_eq!(rng.remaining(), 2);
        }

        #[test]
        fn block_is_thirty_percent_of_base() {
            let config = CombatConfig::default();
            let attacker = stats(|s| s.physical_damage = 20.0);
            let defender = stats(|s| s.physical_defense = 10.0);
            let mut rng = ScriptedRandom::new([HIT, HIT, HIT, HIT]);

            let outcome = resolve_hit(&config, &attacker, &defender, None, &mut rng);

            assert!(outcome.blocked);
            assert!(!outcome.critical);
            assert_eq!(outcome.damage, (36.0_f32 * 0.3).floor());
            assert_eq!(rng.remaining(), 2);
        }

        #[test]
        fn crit_uses_default_multiplier() {
            let config = CombatConfig::default();
            let attacker = stats(|s| s.physical_damage = 20.0);
            let defender = stats(|s| s.physical_defense = 0.0);
            let mut rng = ScriptedRandom::new([HIT, FAIL, HIT, NEUTRAL]);

            let outcome = resolve_hit(&config, &attacker, &defender, None, &mut rng);

            assert!(outcome.critical);
            assert_eq!(outcome.damage, 54.0);
        }

        #[test]
        fn skill_multiplier_replaces_default() {
            let config = CombatConfig::default();
            let attacker = stats(|s| s.physical_damage = 20.0);
            let defender = stats(|s| s.physical_defense = 0.0);
            let skill = Skill::new("backstab", TargetType::SingleEnemy, DamageKind::Physical)
                .with_damage(20.0)
                .with_modifiers(SkillModifiers {
                    crit_chance_bonus: 0.0,
                    critical_multiplier: Some(3.0),
                });
            let mut rng = ScriptedRandom::new([HIT, FAIL, HIT, NEUTRAL]);

            let outcome = resolve_hit(&config, &attacker, &defender, Some(&skill), &mut rng);

            // (20 + 16) × 3, not × 4.5
            assert_eq!(outcome.damage, 108.0);
        }

        #[test]
        fn true_damage_ignores_armor_and_block() {
            let config = CombatConfig::default();
            let attacker = stats(|s| s.physical_damage = 20.0);
            let defender = stats(|s| s.physical_defense = 1000.0);
            let skill = Skill::new("smite", TargetType::SingleEnemy, DamageKind::True).with_damage(10.0);
            // hit, crit (fail), variance; true damage skips the block draw
            let mut rng = ScriptedRandom::new([HIT, FAIL, NEUTRAL]);

            let outcome = resolve_hit(&config, &attacker, &defender, Some(&skill), &mut rng);

            assert!(!outcome.blocked);
            assert_eq!(outcome.damage, 26.0);
            assert_eq!(rng.remaining(), 0);
        }

        #[test]
        fn magical_damage_uses_magical_stats() {
            let config = CombatConfig::default();
            let attacker = stats(|s| {
                s.physical_damage = 0.0;
                s.magical_damage = 25.0;
            });
            let defender = stats(|s| s.magical_defense = 100.0);
            let skill = Skill::new("bolt", TargetType::SingleEnemy, DamageKind::Magical).with_damage(30.0);
            let mut rng = ScriptedRandom::new([HIT, FAIL, FAIL, NEUTRAL]);

            let outcome = resolve_hit(&config, &attacker, &defender, Some(&skill), &mut rng);

            // (30 + 20) × 0.5
            assert_eq!(outcome.damage, 25.0);
        }

        #[test]
        fn damage_taken_multiplier_applies() {
            let config = CombatConfig::default();
            let attacker = stats(|s| s.physical_damage = 20.0);
            let mut defender = stats(|s| s.physical_defense = 0.0);
            defender.damage_taken = 0.5;
            let mut rng = ScriptedRandom::new([HIT, FAIL, FAIL, NEUTRAL]);

            let outcome = resolve_hit(&config, &attacker, &defender, None, &mut rng);

            assert_eq!(outcome.damage, 18.0);
        }

        #[test]
        fn variance_stays_within_band() {
            let config = CombatConfig::default();
            let attacker = stats(|s| s.physical_damage = 50.0);
            let defender = stats(|s| s.physical_defense = 0.0);

            let mut low = ScriptedRandom::new([HIT, FAIL, FAIL, 0.0]);
            let mut high = ScriptedRandom::new([HIT, FAIL, FAIL, 0.999_999]);
            let lo = resolve_hit(&config, &attacker, &defender, None, &mut low).damage;
            let hi = resolve_hit(&config, &attacker, &defender, None, &mut high).damage;

            // base 90
            assert_eq!(lo, 81.0);
            assert!(hi <= 99.0 && hi >= 98.0);
        }

        #[test]
        fn max_damage_bounds_every_roll() {
            let config = CombatConfig::default();
            let attacker = stats(|s| s.physical_damage = 30.0);
            let defender = stats(|s| s.physical_defense = 20.0);
            let ceiling = max_damage(&config, &attacker, &defender, None);
            for draws in [
                [HIT, FAIL, HIT, 0.999_999],
                [HIT, HIT, HIT, 0.999_999],
                [HIT, FAIL, FAIL, 0.0],
            ] {
                let mut rng = ScriptedRandom::new(draws);
                let outcome = resolve_hit(&config, &attacker, &defender, None, &mut rng);
                assert!(outcome.damage <= ceiling);
            }
        }
    }

    mod heal_tests {
        use super::*;

        fn mend() -> Skill {
            Skill::new("mend", TargetType::SingleAlly, DamageKind::Magical).with_healing(20.0)
        }

        #[test]
        fn heal_scales_with_magical_damage() {
            let config = CombatConfig::default();
            let caster = stats(|s| s.magical_damage = 10.0);
            let mut rng = ScriptedRandom::new([FAIL]);

            let outcome = resolve_heal(&config, &caster, &mend(), 50.0, 100.0, &mut rng);

            assert!(!outcome.critical);
            assert_eq!(outcome.amount, 28.0);
            assert_eq!(outcome.effective, 28.0);
            assert_eq!(outcome.overheal, 0.0);
        }

        #[test]
        fn overheal_is_reported_separately() {
            let config = CombatConfig::default();
            let caster = stats(|s| s.magical_damage = 10.0);
            let mut rng = ScriptedRandom::new([FAIL]);

            let outcome = resolve_heal(&config, &caster, &mend(), 90.0, 100.0, &mut rng);

            assert_eq!(outcome.effective, 10.0);
            assert_eq!(outcome.overheal, 18.0);
        }

        #[test]
        fn heal_can_crit() {
            let config = CombatConfig::default();
            let caster = stats(|s| s.magical_damage = 10.0);
            let mut rng = ScriptedRandom::new([HIT]);

            let outcome = resolve_heal(&config, &caster, &mend(), 0.0, 100.0, &mut rng);

            assert!(outcome.critical);
            assert_eq!(outcome.amount, 42.0);
        }
    }
}
