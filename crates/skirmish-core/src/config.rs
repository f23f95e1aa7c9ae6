//! Engine configuration.
//!
//! Every section deserializes with `#[serde(default)]`, so a config file only
//! needs to name the values it overrides:
//!
//! ```
//! use skirmish_core::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{
//!     "combat": { "damage_variance": 0.15 },
//!     "anti_cheat": { "max_actions_per_second": 2 }
//! }"#).unwrap();
//!
//! assert_eq!(config.combat.damage_variance, 0.15);
//! assert_eq!(config.combat.crit_multiplier, 1.5);
//! assert_eq!(config.anti_cheat.max_actions_per_second, 2);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Top-level configuration for a [`CombatEngine`](crate::engine::CombatEngine).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Master seed; each session derives its random stream from it
    pub seed: u64,
    /// Formula constants and action tuning
    pub combat: CombatConfig,
    /// Suspicion scoring
    pub anti_cheat: AntiCheatConfig,
    /// Effect interaction rules
    pub effects: EffectConfig,
    /// Background sweeps
    pub maintenance: MaintenanceConfig,
}

impl EngineConfig {
    /// Parses and validates a JSON config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed JSON and
    /// [`ConfigError::Invalid`] if [`EngineConfig::validate`] fails.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`EngineConfig::from_json_str`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.combat.validate()?;
        self.anti_cheat.validate()?;
        self.maintenance.validate()
    }
}

fn unit_interval(name: &str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

fn positive(name: &str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

// ============================================================================
// Combat
// ============================================================================

/// Formula constants for the calculator and per-action tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Hit chance with equal offense and defense
    pub base_hit_chance: f32,
    /// Lower hit-chance clamp
    pub min_hit_chance: f32,
    /// Upper hit-chance clamp
    pub max_hit_chance: f32,
    /// Offense-minus-defense is divided by this before adding to hit chance
    pub hit_stat_divisor: f32,
    /// Block chance with zero physical defense
    pub base_block_chance: f32,
    /// Physical defense is divided by this before adding to block chance
    pub block_defense_divisor: f32,
    /// Upper block-chance clamp
    pub max_block_chance: f32,
    /// Fraction of base damage that gets through a block
    pub block_damage_factor: f32,
    /// Upper crit-chance clamp
    pub max_crit_chance: f32,
    /// Crit multiplier unless a skill overrides it
    pub crit_multiplier: f32,
    /// Share of the matching offense stat added to base damage and healing
    pub offense_scaling: f32,
    /// Armor constant `k` in `d / (d + k)`
    pub armor_constant: f32,
    /// Maximum damage reduction from armor
    pub max_damage_reduction: f32,
    /// Half-width of the final variance band (0.10 = ±10%)
    pub damage_variance: f32,
    /// Share of max mana restored by waiting
    pub wait_mana_regen: f32,
    /// Incoming-damage reduction from defending, in percent points
    pub defend_damage_reduction: f32,
    /// Turns the defend buff lasts
    pub defend_duration: u32,
    /// Flee chance at equal speed
    pub flee_base_chance: f32,
    /// Flee chance gained per point of speed above the enemy average
    pub flee_speed_factor: f32,
    /// Lower flee-chance clamp
    pub min_flee_chance: f32,
    /// Upper flee-chance clamp
    pub max_flee_chance: f32,
    /// Scale applied to the attack-speed tie-break draw
    pub order_tiebreak: f32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            base_hit_chance: 0.85,
            min_hit_chance: 0.05,
            max_hit_chance: 0.95,
            hit_stat_divisor: 200.0,
            base_block_chance: 0.05,
            block_defense_divisor: 1000.0,
            max_block_chance: 0.75,
            block_damage_factor: 0.3,
            max_crit_chance: 0.95,
            crit_multiplier: 1.5,
            offense_scaling: 0.8,
            armor_constant: 100.0,
            max_damage_reduction: 0.9,
            damage_variance: 0.10,
            wait_mana_regen: 0.10,
            defend_damage_reduction: 50.0,
            defend_duration: 1,
            flee_base_chance: 0.5,
            flee_speed_factor: 0.05,
            min_flee_chance: 0.1,
            max_flee_chance: 0.9,
            order_tiebreak: 1.0,
        }
    }
}

impl CombatConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        unit_interval("combat.base_hit_chance", self.base_hit_chance)?;
        unit_interval("combat.min_hit_chance", self.min_hit_chance)?;
        unit_interval("combat.max_hit_chance", self.max_hit_chance)?;
        if self.min_hit_chance > self.max_hit_chance {
            return Err(ConfigError::Invalid(
                "combat.min_hit_chance exceeds combat.max_hit_chance".into(),
            ));
        }
        unit_interval("combat.max_block_chance", self.max_block_chance)?;
        unit_interval("combat.block_damage_factor", self.block_damage_factor)?;
        unit_interval("combat.max_crit_chance", self.max_crit_chance)?;
        unit_interval("combat.max_damage_reduction", self.max_damage_reduction)?;
        unit_interval("combat.wait_mana_regen", self.wait_mana_regen)?;
        unit_interval("combat.min_flee_chance", self.min_flee_chance)?;
        unit_interval("combat.max_flee_chance", self.max_flee_chance)?;
        if self.min_flee_chance > self.max_flee_chance {
            return Err(ConfigError::Invalid(
                "combat.min_flee_chance exceeds combat.max_flee_chance".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.damage_variance) {
            return Err(ConfigError::Invalid(format!(
                "combat.damage_variance must be within [0, 1), got {}",
                self.damage_variance
            )));
        }
        if self.crit_multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "combat.crit_multiplier must be at least 1.0, got {}",
                self.crit_multiplier
            )));
        }
        positive("combat.hit_stat_divisor", self.hit_stat_divisor)?;
        positive("combat.block_defense_divisor", self.block_defense_divisor)?;
        positive("combat.armor_constant", self.armor_constant)
    }
}

// ============================================================================
// Anti-cheat
// ============================================================================

/// Score added per raised flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagWeights {
    /// Too many actions in the rate windows
    pub high_action_frequency: f32,
    /// Client clock absent, ahead, stale or drifting
    pub timestamp_anomaly: f32,
    /// Reported damage beyond what the actor can deal
    pub impossible_damage: f32,
    /// Movement faster than the actor's speed allows
    pub impossible_movement: f32,
    /// Sustained crit rate above threshold
    pub abnormal_crit_rate: f32,
    /// Average reaction time below threshold
    pub superhuman_reflexes: f32,
}

impl Default for FlagWeights {
    fn default() -> Self {
        Self {
            high_action_frequency: 25.0,
            timestamp_anomaly: 15.0,
            impossible_damage: 40.0,
            impossible_movement: 35.0,
            abnormal_crit_rate: 15.0,
            superhuman_reflexes: 20.0,
        }
    }
}

/// Suspicion scoring configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiCheatConfig {
    /// Length of the long rate window (ms)
    pub rate_window_ms: u64,
    /// Actions allowed inside the long window, current one included
    pub max_actions_per_window: usize,
    /// Actions allowed inside any trailing second, current one included
    pub max_actions_per_second: usize,
    /// Allowed client clock lead (ms)
    pub future_tolerance_ms: u64,
    /// Oldest acceptable client timestamp (ms)
    pub stale_tolerance_ms: u64,
    /// Allowed absolute client/server drift (ms)
    pub drift_tolerance_ms: u64,
    /// Relative margin on top of the maximum achievable damage
    pub damage_tolerance: f32,
    /// Multiplier on movement speed before movement is impossible
    pub movement_tolerance: f32,
    /// Distance that is a teleport when covered in under a second
    pub teleport_distance: f32,
    /// Crit rate above which crit luck is suspicious
    pub crit_rate_threshold: f32,
    /// Samples needed before crit rate and reflex checks apply
    pub min_samples: usize,
    /// Average processing time below which reflexes are superhuman (ms)
    pub reflex_threshold_ms: u64,
    /// Per-flag score weights
    pub weights: FlagWeights,
    /// Score at which actions are allowed with a warning
    pub warn_threshold: f32,
    /// Score at which actions are monitored
    pub monitor_threshold: f32,
    /// Score at which actions are blocked and a ban is issued
    pub block_threshold: f32,
    /// Score removed per elapsed minute of good behavior
    pub score_decay_per_minute: f32,
    /// Ban length at exactly the block threshold (ms)
    pub base_ban_ms: u64,
    /// Longest ban the gate will issue (ms)
    pub max_ban_ms: u64,
    /// Suspicion state untouched this long is evicted (ms)
    pub inactivity_eviction_ms: u64,
    /// Outcome samples kept for the statistical checks
    pub history_len: usize,
}

impl Default for AntiCheatConfig {
    fn default() -> Self {
        Self {
            rate_window_ms: 60_000,
            max_actions_per_window: 60,
            max_actions_per_second: 3,
            future_tolerance_ms: 1_000,
            stale_tolerance_ms: 30_000,
            drift_tolerance_ms: 5_000,
            damage_tolerance: 0.2,
            movement_tolerance: 1.5,
            teleport_distance: 50.0,
            crit_rate_threshold: 0.5,
            min_samples: 10,
            reflex_threshold_ms: 50,
            weights: FlagWeights::default(),
            warn_threshold: 50.0,
            monitor_threshold: 65.0,
            block_threshold: 80.0,
            score_decay_per_minute: 5.0,
            base_ban_ms: 5 * 60_000,
            max_ban_ms: 24 * 60 * 60_000,
            inactivity_eviction_ms: 30 * 60_000,
            history_len: 50,
        }
    }
}

impl AntiCheatConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.warn_threshold < self.monitor_threshold
            && self.monitor_threshold < self.block_threshold
            && self.block_threshold <= 100.0)
        {
            return Err(ConfigError::Invalid(format!(
                "anti_cheat thresholds must satisfy warn < monitor < block <= 100, got {}/{}/{}",
                self.warn_threshold, self.monitor_threshold, self.block_threshold
            )));
        }
        if self.rate_window_ms == 0 {
            return Err(ConfigError::Invalid(
                "anti_cheat.rate_window_ms must be non-zero".into(),
            ));
        }
        if self.max_actions_per_second == 0 || self.max_actions_per_window == 0 {
            return Err(ConfigError::Invalid(
                "anti_cheat action limits must be non-zero".into(),
            ));
        }
        if self.base_ban_ms > self.max_ban_ms {
            return Err(ConfigError::Invalid(
                "anti_cheat.base_ban_ms exceeds anti_cheat.max_ban_ms".into(),
            ));
        }
        unit_interval("anti_cheat.crit_rate_threshold", self.crit_rate_threshold)?;
        positive("anti_cheat.movement_tolerance", self.movement_tolerance)?;
        if self.damage_tolerance < 0.0 {
            return Err(ConfigError::Invalid(
                "anti_cheat.damage_tolerance must not be negative".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Effects and maintenance
// ============================================================================

/// Effect interaction rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    /// Pairs of effect names that cannot coexist on one target
    pub incompatible: Vec<[String; 2]>,
}

impl Default for EffectConfig {
    fn default() -> Self {
        let pair = |a: &str, b: &str| [a.to_string(), b.to_string()];
        Self {
            incompatible: vec![
                pair("haste", "slow"),
                pair("strength", "weakness"),
                pair("blessed", "cursed"),
            ],
        }
    }
}

/// Background sweep configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Time between sweeps (ms)
    pub sweep_interval_ms: u64,
    /// How long finished and cancelled sessions stay queryable (ms)
    pub session_retention_ms: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 60_000,
            session_retention_ms: 10 * 60_000,
        }
    }
}

impl MaintenanceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "maintenance.sweep_interval_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
