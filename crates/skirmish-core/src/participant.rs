//! Participant model for combat sessions.
//!
//! This module provides the leaf data types every other component reads or
//! mutates:
//! - [`ParticipantId`]: Unique identifier for a combatant (also the anti-cheat actor key)
//! - [`TeamId`]: Team membership used for ally/enemy checks and win evaluation
//! - [`StatKind`]: Closed set of stats that effects may modify
//! - [`CombatStats`]: Live health/mana and derived combat stats
//! - [`Participant`]: A combatant inside one session
//!
//! # Ownership
//!
//! A participant is owned by exactly one [`CombatSession`](crate::session::CombatSession).
//! The calculator and the effect engine never touch it directly; they propose
//! deltas which the session applies in its change-set step.
//!
//! # Example
//!
//! ```
//! use skirmish_core::participant::{CombatStats, Participant, ParticipantId, TeamId};
//!
//! let mut hero = Participant::new(ParticipantId::new(7), TeamId::new(1), CombatStats::default());
//! hero.apply_health_delta(-250.0);
//!
//! assert_eq!(hero.stats.health, 0.0);
//! assert!(!hero.is_alive());
//! ```

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a combat participant.
///
/// The same identifier keys the process-wide anti-cheat and cooldown caches, so
/// it is expected to be stable for a player across sessions.
///
/// # Example
///
/// ```
/// use skirmish_core::participant::ParticipantId;
///
/// let a = ParticipantId::new(1);
/// let b = ParticipantId::new(2);
/// assert!(a < b);
/// assert_eq!(a.as_u64(), 1);
/// ```
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantId(u64);

impl ParticipantId {
    /// Creates a new `ParticipantId` from a raw `u64` value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` value of this identifier.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParticipantId({})", self.0)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ParticipantId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

/// Team a participant fights for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(u32);

impl TeamId {
    /// Creates a new `TeamId`.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw value of this team id.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "team:{}", self.0)
    }
}

/// Stats that status effects are allowed to modify.
///
/// Using a closed enum instead of string keys keeps modifier aggregation a
/// fixed-size array lookup and makes every match exhaustive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    /// Physical offense
    PhysicalDamage,
    /// Magical offense
    MagicalDamage,
    /// Physical mitigation (also drives block chance)
    PhysicalDefense,
    /// Magical mitigation
    MagicalDefense,
    /// Critical hit chance (0.0 - 1.0)
    CritChance,
    /// Turn-order speed
    AttackSpeed,
    /// Units per second, used by movement validation
    MovementSpeed,
    /// Multiplier on incoming damage (percentage modifiers only make sense here)
    DamageTaken,
}

impl StatKind {
    /// Number of stat kinds.
    pub const COUNT: usize = 8;

    /// All stat kinds in index order.
    #[must_use]
    pub const fn all() -> [StatKind; Self::COUNT] {
        [
            Self::PhysicalDamage,
            Self::MagicalDamage,
            Self::PhysicalDefense,
            Self::MagicalDefense,
            Self::CritChance,
            Self::AttackSpeed,
            Self::MovementSpeed,
            Self::DamageTaken,
        ]
    }

    /// Dense index used by modifier arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::PhysicalDamage => 0,
            Self::MagicalDamage => 1,
            Self::PhysicalDefense => 2,
            Self::MagicalDefense => 3,
            Self::CritChance => 4,
            Self::AttackSpeed => 5,
            Self::MovementSpeed => 6,
            Self::DamageTaken => 7,
        }
    }
}

impl fmt::Display for StatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PhysicalDamage => "physical_damage",
            Self::MagicalDamage => "magical_damage",
            Self::PhysicalDefense => "physical_defense",
            Self::MagicalDefense => "magical_defense",
            Self::CritChance => "crit_chance",
            Self::AttackSpeed => "attack_speed",
            Self::MovementSpeed => "movement_speed",
            Self::DamageTaken => "damage_taken",
        };
        f.write_str(name)
    }
}

/// Live combat stats for a participant.
///
/// Health and mana are always kept in `[0, max]` by the mutators on
/// [`Participant`]. Initial values are hydrated by an external player/world
/// lookup; the core only consumes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatStats {
    /// Current health
    pub health: f32,
    /// Maximum health
    pub max_health: f32,
    /// Current mana
    pub mana: f32,
    /// Maximum mana
    pub max_mana: f32,
    /// Physical offense
    pub physical_damage: f32,
    /// Magical offense
    pub magical_damage: f32,
    /// Physical mitigation
    pub physical_defense: f32,
    /// Magical mitigation
    pub magical_defense: f32,
    /// Base critical hit chance (0.0 - 1.0)
    pub crit_chance: f32,
    /// Turn-order speed
    pub attack_speed: f32,
    /// Maximum legitimate movement speed (units per second)
    pub movement_speed: f32,
}

impl Default for CombatStats {
    fn default() -> Self {
        Self {
            health: 100.0,
            max_health: 100.0,
            mana: 50.0,
            max_mana: 50.0,
            physical_damage: 10.0,
            magical_damage: 10.0,
            physical_defense: 5.0,
            magical_defense: 5.0,
            crit_chance: 0.05,
            attack_speed: 10.0,
            movement_speed: 5.0,
        }
    }
}

impl CombatStats {
    /// Returns the base value of a modifiable stat.
    ///
    /// `DamageTaken` has an implicit base of 1.0 (unmodified incoming damage).
    #[must_use]
    pub fn base(&self, stat: StatKind) -> f32 {
        match stat {
            StatKind::PhysicalDamage => self.physical_damage,
            StatKind::MagicalDamage => self.magical_damage,
            StatKind::PhysicalDefense => self.physical_defense,
            StatKind::MagicalDefense => self.magical_defense,
            StatKind::CritChance => self.crit_chance,
            StatKind::AttackSpeed => self.attack_speed,
            StatKind::MovementSpeed => self.movement_speed,
            StatKind::DamageTaken => 1.0,
        }
    }

    /// Health as a fraction of max health (0.0 when max health is zero).
    #[must_use]
    pub fn health_fraction(&self) -> f32 {
        if self.max_health <= 0.0 {
            0.0
        } else {
            self.health / self.max_health
        }
    }
}

/// Combat stats after status-effect modifiers, as consumed by the calculator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectiveStats {
    /// Physical offense
    pub physical_damage: f32,
    /// Magical offense
    pub magical_damage: f32,
    /// Physical mitigation
    pub physical_defense: f32,
    /// Magical mitigation
    pub magical_defense: f32,
    /// Critical hit chance
    pub crit_chance: f32,
    /// Turn-order speed
    pub attack_speed: f32,
    /// Movement speed
    pub movement_speed: f32,
    /// Incoming damage multiplier (1.0 = unmodified)
    pub damage_taken: f32,
}

impl From<&CombatStats> for EffectiveStats {
    fn from(stats: &CombatStats) -> Self {
        Self {
            physical_damage: stats.physical_damage,
            magical_damage: stats.magical_damage,
            physical_defense: stats.physical_defense,
            magical_defense: stats.magical_defense,
            crit_chance: stats.crit_chance,
            attack_speed: stats.attack_speed,
            movement_speed: stats.movement_speed,
            damage_taken: 1.0,
        }
    }
}

/// A combatant inside one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// Participant identifier
    pub id: ParticipantId,
    /// Team membership
    pub team: TeamId,
    /// Live stats
    pub stats: CombatStats,
    /// Whether the participant confirmed readiness (required to start)
    pub ready: bool,
    /// Whether the participant left combat through a successful flee
    pub fled: bool,
    /// Last server-accepted position, if the game reports positions
    pub position: Option<Vec2>,
    alive: bool,
}

impl Participant {
    /// Creates a new participant. Stats are clamped on entry.
    #[must_use]
    pub fn new(id: ParticipantId, team: TeamId, stats: CombatStats) -> Self {
        let mut participant = Self {
            id,
            team,
            stats,
            ready: false,
            fled: false,
            position: None,
            alive: true,
        };
        participant.clamp_resources();
        participant.alive = participant.stats.health > 0.0;
        participant
    }

    /// Returns true if the participant is alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Returns true if the participant can still take part in combat.
    #[must_use]
    pub fn in_play(&self) -> bool {
        self.alive && !self.fled
    }

    /// Returns true if `other` fights on the same team.
    #[must_use]
    pub fn is_ally_of(&self, other: &Participant) -> bool {
        self.team == other.team
    }

    /// Adds `delta` to health, clamped to `[0, max_health]`.
    ///
    /// Returns the delta actually applied. Reaching zero health marks the
    /// participant dead; dead participants ignore further deltas.
    pub fn apply_health_delta(&mut self, delta: f32) -> f32 {
        if !self.alive {
            return 0.0;
        }
        let before = self.stats.health;
        self.stats.health = (before + delta).clamp(0.0, self.stats.max_health);
        if self.stats.health <= 0.0 {
            self.alive = false;
        }
        self.stats.health - before
    }

    /// Adds `delta` to mana, clamped to `[0, max_mana]`.
    ///
    /// Returns the delta actually applied.
    pub fn apply_mana_delta(&mut self, delta: f32) -> f32 {
        let before = self.stats.mana;
        self.stats.mana = (before + delta).clamp(0.0, self.stats.max_mana);
        self.stats.mana - before
    }

    /// Removes the participant from play after a successful flee.
    pub fn mark_fled(&mut self) {
        self.fled = true;
    }

    fn clamp_resources(&mut self) {
        self.stats.max_health = self.stats.max_health.max(0.0);
        self.stats.max_mana = self.stats.max_mana.max(0.0);
        self.stats.health = self.stats.health.clamp(0.0, self.stats.max_health);
        self.stats.mana = self.stats.mana.clamp(0.0, self.stats.max_mana);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant() -> Participant {
        Participant::new(ParticipantId::new(1), TeamId::new(1), CombatStats::default())
    }

    #[test]
    fn new_clamps_overfull_resources() {
        let stats = CombatStats {
            health: 500.0,
            mana: -3.0,
            ..CombatStats::default()
        };
        let p = Participant::new(ParticipantId::new(1), TeamId::new(1), stats);
        assert_eq!(p.stats.health, 100.0);
        assert_eq!(p.stats.mana, 0.0);
        assert!(p.is_alive());
    }

    #[test]
    fn zero_health_on_entry_is_dead() {
        let stats = CombatStats {
            health: 0.0,
            ..CombatStats::default()
        };
        let p = Participant::new(ParticipantId::new(1), TeamId::new(1), stats);
        assert!(!p.is_alive());
    }

    #[test]
    fn health_delta_is_clamped_and_reported() {
        let mut p = participant();
        assert_eq!(p.apply_health_delta(-30.0), -30.0);
        assert_eq!(p.apply_health_delta(80.0), 30.0);
        assert_eq!(p.stats.health, 100.0);
    }

    #[test]
    fn lethal_damage_kills() {
        let mut p = participant();
        let applied = p.apply_health_delta(-1000.0);
        assert_eq!(applied, -100.0);
        assert!(!p.is_alive());
        assert!(!p.in_play());
    }

    #[test]
    fn dead_participants_stay_dead_when_healed() {
        let mut p = participant();
        p.apply_health_delta(-100.0);
        assert_eq!(p.apply_health_delta(50.0), 0.0);
        assert_eq!(p.stats.health, 0.0);
        assert!(!p.is_alive());
    }

    #[test]
    fn mana_delta_is_clamped() {
        let mut p = participant();
        assert_eq!(p.apply_mana_delta(-80.0), -50.0);
        assert_eq!(p.stats.mana, 0.0);
    }

    #[test]
    fn fled_participant_is_out_of_play() {
        let mut p = participant();
        p.mark_fled();
        assert!(p.is_alive());
        assert!(!p.in_play());
    }

    #[test]
    fn stat_kind_indices_are_dense() {
        for (i, stat) in StatKind::all().iter().enumerate() {
            assert_eq!(stat.index(), i);
        }
    }

    #[test]
    fn stats_are_serializable() {
        let stats = CombatStats::default();
        let json = serde_json::to_string(&stats).unwrap();
        let back: CombatStats = serde_json::from_str(&json).unwrap();
        assert_eq!(stats, back);
    }
}
