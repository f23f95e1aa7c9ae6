//! Individual detection rules. Each returns true when its flag should be raised.

use glam::Vec2;
use std::collections::VecDeque;

use super::SuspicionFlags;
use crate::config::AntiCheatConfig;

/// Too many actions in the trailing second or in the rate window.
///
/// `times` already contains the current action.
#[must_use]
pub fn high_action_frequency(times: &VecDeque<u64>, now_ms: u64, config: &AntiCheatConfig) -> bool {
    let second_ago = now_ms.saturating_sub(1_000);
    let window_start = now_ms.saturating_sub(config.rate_window_ms);
    let last_second = times.iter().filter(|&&t| t > second_ago).count();
    let in_window = times.iter().filter(|&&t| t >= window_start).count();
    last_second > config.max_actions_per_second || in_window > config.max_actions_per_window
}

/// Client timestamp absent, ahead of the server, stale or drifting.
#[must_use]
pub fn timestamp_anomaly(client_ms: Option<u64>, now_ms: u64, config: &AntiCheatConfig) -> bool {
    let Some(client) = client_ms else {
        return true;
    };
    if client > now_ms {
        let lead = client - now_ms;
        return lead > config.future_tolerance_ms || lead > config.drift_tolerance_ms;
    }
    let lag = now_ms - client;
    lag > config.stale_tolerance_ms || lag > config.drift_tolerance_ms
}

/// Reported damage above what the actor can deal, plus tolerance. Only
/// over-reporting counts.
#[must_use]
pub fn impossible_damage(reported: f32, max_achievable: f32, config: &AntiCheatConfig) -> bool {
    reported > max_achievable.max(0.0) * (1.0 + config.damage_tolerance)
}

/// Movement faster than `movement_speed` allows, or a teleport.
///
/// A displacement longer than the teleport distance in under a second is a
/// teleport regardless of the speed check.
#[must_use]
pub fn impossible_movement(
    from: Vec2,
    from_ms: u64,
    to: Vec2,
    now_ms: u64,
    movement_speed: f32,
    config: &AntiCheatConfig,
) -> bool {
    let distance = from.distance(to);
    if distance <= f32::EPSILON {
        return false;
    }
    let elapsed_ms = now_ms.saturating_sub(from_ms);
    if elapsed_ms < 1_000 && distance > config.teleport_distance {
        return true;
    }
    #[allow(clippy::cast_precision_loss)]
    let seconds = (elapsed_ms as f32 / 1_000.0).max(0.001);
    distance / seconds > movement_speed.max(0.0) * config.movement_tolerance
}

/// Crit rate over recent damaging hits above threshold, once enough samples exist.
#[must_use]
pub fn abnormal_crit_rate(samples: &VecDeque<bool>, config: &AntiCheatConfig) -> bool {
    if samples.is_empty() || samples.len() < config.min_samples {
        return false;
    }
    let crits = samples.iter().filter(|&&c| c).count();
    #[allow(clippy::cast_precision_loss)]
    let rate = crits as f32 / samples.len() as f32;
    rate > config.crit_rate_threshold
}

/// Average processing time below the reflex threshold, once enough samples exist.
#[must_use]
pub fn superhuman_reflexes(samples: &VecDeque<u64>, config: &AntiCheatConfig) -> bool {
    if samples.is_empty() || samples.len() < config.min_samples {
        return false;
    }
    let total: u64 = samples.iter().sum();
    let average = total / samples.len() as u64;
    average < config.reflex_threshold_ms
}

/// Ban length for a blocking score.
///
/// Scales linearly with `score / block_threshold`, doubles when a critical
/// flag is present and never exceeds `max_ban_ms`.
#[must_use]
pub fn ban_duration(score: f32, flags: SuspicionFlags, config: &AntiCheatConfig) -> u64 {
    let ratio = (score / config.block_threshold).max(1.0);
    #[allow(clippy::cast_precision_loss)]
    let mut duration = config.base_ban_ms as f32 * ratio;
    if flags.intersects(SuspicionFlags::CRITICAL) {
        duration *= 2.0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let duration = duration as u64;
    duration.min(config.max_ban_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AntiCheatConfig {
        AntiCheatConfig::default()
    }

    #[test]
    fn three_actions_in_200ms_exceed_one_per_second() {
        let config = AntiCheatConfig {
            max_actions_per_second: 1,
            ..config()
        };
        let times = VecDeque::from([10_000, 10_100, 10_200]);
        assert!(high_action_frequency(&times, 10_200, &config));
    }

    #[test]
    fn spaced_actions_pass_rate_limit() {
        let config = AntiCheatConfig {
            max_actions_per_second: 1,
            ..config()
        };
        let times = VecDeque::from([10_000, 11_500, 13_000]);
        assert!(!high_action_frequency(&times, 13_000, &config));
    }

    #[test]
    fn window_limit_applies() {
        let config = AntiCheatConfig {
            max_actions_per_window: 3,
            ..config()
        };
        let times = VecDeque::from([0, 5_000, 10_000, 15_000]);
        assert!(high_action_frequency(&times, 15_000, &config));
    }

    #[test]
    fn timestamp_rules() {
        let config = config();
        let now = 100_000;
        assert!(timestamp_anomaly(None, now, &config));
        assert!(!timestamp_anomaly(Some(now), now, &config));
        assert!(!timestamp_anomaly(Some(now + 900), now, &config));
        assert!(timestamp_anomaly(Some(now + 1_500), now, &config));
        assert!(!timestamp_anomaly(Some(now - 4_000), now, &config));
        assert!(timestamp_anomaly(Some(now - 6_000), now, &config));
        assert!(timestamp_anomaly(Some(now - 31_000), now, &config));
    }

    #[test]
    fn damage_tolerance_is_twenty_percent() {
        let config = config();
        assert!(!impossible_damage(119.0, 100.0, &config));
        assert!(impossible_damage(121.0, 100.0, &config));
        assert!(!impossible_damage(0.0, 100.0, &config));
    }

    #[test]
    fn under_reporting_is_never_flagged() {
        let config = config();
        assert!(!impossible_damage(1.0, 500.0, &config));
        assert!(!impossible_damage(0.0, 0.0, &config));
    }

    #[test]
    fn teleport_detected_inside_one_second() {
        let config = config();
        let from = Vec2::ZERO;
        assert!(impossible_movement(from, 0, Vec2::new(60.0, 0.0), 500, 1_000.0, &config));
    }

    #[test]
    fn speed_checked_against_stat() {
        let config = config();
        let from = Vec2::ZERO;
        // 5 units/s × 1.5 tolerance = 7.5 allowed
        assert!(!impossible_movement(from, 0, Vec2::new(7.0, 0.0), 1_000, 5.0, &config));
        assert!(impossible_movement(from, 0, Vec2::new(8.0, 0.0), 1_000, 5.0, &config));
    }

    #[test]
    fn standing_still_is_fine() {
        let config = config();
        assert!(!impossible_movement(Vec2::ONE, 0, Vec2::ONE, 0, 0.0, &config));
    }

    #[test]
    fn crit_rate_needs_samples() {
        let config = config();
        let few = VecDeque::from([true; 5]);
        assert!(!abnormal_crit_rate(&few, &config));
        let many: VecDeque<bool> = (0..10).map(|i| i % 4 != 0).collect();
        assert!(abnormal_crit_rate(&many, &config));
        let fair: VecDeque<bool> = (0..10).map(|i| i % 5 == 0).collect();
        assert!(!abnormal_crit_rate(&fair, &config));
    }

    #[test]
    fn reflexes_average_below_threshold() {
        let config = config();
        let fast = VecDeque::from([20; 10]);
        let human = VecDeque::from([400; 10]);
        assert!(superhuman_reflexes(&fast, &config));
        assert!(!superhuman_reflexes(&human, &config));
    }

    #[test]
    fn ban_scales_and_doubles_for_critical_flags() {
        let config = config();
        let base = ban_duration(80.0, SuspicionFlags::HIGH_ACTION_FREQUENCY, &config);
        assert_eq!(base, config.base_ban_ms);
        let scaled = ban_duration(100.0, SuspicionFlags::HIGH_ACTION_FREQUENCY, &config);
        assert_eq!(scaled, config.base_ban_ms * 5 / 4);
        let doubled = ban_duration(80.0, SuspicionFlags::IMPOSSIBLE_DAMAGE, &config);
        assert_eq!(doubled, config.base_ban_ms * 2);
    }

    #[test]
    fn ban_is_capped() {
        let config = AntiCheatConfig {
            base_ban_ms: 1_000,
            max_ban_ms: 1_500,
            ..config()
        };
        assert_eq!(ban_duration(100.0, SuspicionFlags::IMPOSSIBLE_MOVEMENT, &config), 1_500);
    }
}
