//! # Anti-Cheat Gate
//!
//! Turns raw behavioral signals into an allow/warn/monitor/block decision for
//! every action before it resolves.
//!
//! ## Detection Rules
//!
//! - **Rate limiting**: too many actions per trailing second or per rate window
//! - **Timestamps**: client clock absent, ahead, stale or drifting
//! - **Damage integrity**: reported damage more than 20% over the attacker's
//!   ceiling (`damage_tolerance`); under-reporting is never flagged
//! - **Movement**: speed above the actor's movement stat, or teleports
//! - **Statistics**: sustained crit rate, superhuman reaction times
//!
//! Each raised flag adds its weight to a cumulative score (0 - 100) that decays
//! linearly over time. The score maps to a [`Decision`]:
//!
//! | Score      | Decision  | Effect                                   |
//! |------------|-----------|------------------------------------------|
//! | `< 50`     | Allow     | proceeds                                 |
//! | `< 65`     | Warn      | proceeds, logged                         |
//! | `< 80`     | Monitor   | proceeds, logged with evidence           |
//! | `>= 80`    | Block     | rejected, temporary ban issued           |
//!
//! ## Failure Policy
//!
//! The gate never fails. If the ban lookup in the [`CombatStore`] errors, the
//! lookup is treated as "no ban" and a warning is logged.

mod checks;
mod store;

pub use checks::{
    abnormal_crit_rate, ban_duration, high_action_frequency, impossible_damage,
    impossible_movement, superhuman_reflexes, timestamp_anomaly,
};
pub use store::{PruneReport, SuspicionState, SuspicionStore};

use bitflags::bitflags;
use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, warn};

use crate::action::ActionRecord;
use crate::config::AntiCheatConfig;
use crate::participant::ParticipantId;
use crate::persistence::{CombatStore, Violation};

bitflags! {
    /// Suspicion flags raised by the detection rules.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SuspicionFlags: u8 {
        /// Too many actions in the rate windows
        const HIGH_ACTION_FREQUENCY = 1 << 0;
        /// Client clock absent, ahead, stale or drifting
        const TIMESTAMP_ANOMALY     = 1 << 1;
        /// Reported damage above the attacker's ceiling
        const IMPOSSIBLE_DAMAGE     = 1 << 2;
        /// Speed or teleport violation
        const IMPOSSIBLE_MOVEMENT   = 1 << 3;
        /// Sustained crit rate above threshold
        const ABNORMAL_CRIT_RATE    = 1 << 4;
        /// Average processing time below threshold
        const SUPERHUMAN_REFLEXES   = 1 << 5;
        /// Actor is serving a ban
        const BANNED                = 1 << 6;
    }
}

impl SuspicionFlags {
    /// Flags that double a ban.
    pub const CRITICAL: Self = Self::IMPOSSIBLE_DAMAGE
        .union(Self::IMPOSSIBLE_MOVEMENT)
        .union(Self::SUPERHUMAN_REFLEXES);

    const LABELS: [(Self, &'static str); 7] = [
        (Self::HIGH_ACTION_FREQUENCY, "high_action_frequency"),
        (Self::TIMESTAMP_ANOMALY, "timestamp_anomaly"),
        (Self::IMPOSSIBLE_DAMAGE, "impossible_damage"),
        (Self::IMPOSSIBLE_MOVEMENT, "impossible_movement"),
        (Self::ABNORMAL_CRIT_RATE, "abnormal_crit_rate"),
        (Self::SUPERHUMAN_REFLEXES, "superhuman_reflexes"),
        (Self::BANNED, "banned"),
    ];

    /// Snake-case labels of the set flags.
    #[must_use]
    pub fn labels(self) -> Vec<&'static str> {
        Self::LABELS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, label)| *label)
            .collect()
    }

    /// Summed score weight of the set flags.
    #[must_use]
    pub fn weight(self, config: &AntiCheatConfig) -> f32 {
        let w = &config.weights;
        [
            (Self::HIGH_ACTION_FREQUENCY, w.high_action_frequency),
            (Self::TIMESTAMP_ANOMALY, w.timestamp_anomaly),
            (Self::IMPOSSIBLE_DAMAGE, w.impossible_damage),
            (Self::IMPOSSIBLE_MOVEMENT, w.impossible_movement),
            (Self::ABNORMAL_CRIT_RATE, w.abnormal_crit_rate),
            (Self::SUPERHUMAN_REFLEXES, w.superhuman_reflexes),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, weight)| weight)
        .sum()
    }
}

impl fmt::Display for SuspicionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&self.labels().join(", "))
    }
}

/// Graduated response to a suspicion score.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Proceed
    Allow,
    /// Proceed, logged
    Warn,
    /// Proceed, logged with evidence
    Monitor,
    /// Reject and ban
    Block,
}

impl Decision {
    /// Maps a score onto the configured thresholds.
    #[must_use]
    pub fn from_score(score: f32, config: &AntiCheatConfig) -> Self {
        if score >= config.block_threshold {
            Self::Block
        } else if score >= config.monitor_threshold {
            Self::Monitor
        } else if score >= config.warn_threshold {
            Self::Warn
        } else {
            Self::Allow
        }
    }

    /// Returns true if the action may proceed.
    #[must_use]
    pub const fn permits(self) -> bool {
        !matches!(self, Self::Block)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Allow => "allow",
            Self::Warn => "warn",
            Self::Monitor => "monitor",
            Self::Block => "block",
        };
        f.write_str(s)
    }
}

/// Signals observed for one submitted action.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionSignals {
    /// Acting participant
    pub actor: ParticipantId,
    /// Server receive time
    pub now_ms: u64,
    /// Client-reported send time
    pub client_timestamp: Option<u64>,
    /// When the current turn opened (for processing-time sampling)
    pub turn_started_ms: Option<u64>,
    /// Damage the client claims the action deals
    pub reported_damage: Option<f32>,
    /// Highest damage the action can legitimately deal
    pub max_damage: Option<f32>,
    /// Position the client reports
    pub position: Option<Vec2>,
    /// Actor's effective movement speed
    pub movement_speed: f32,
}

/// Result of one gate evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Decision for this action
    pub decision: Decision,
    /// Score after this action
    pub score: f32,
    /// Flags raised by this action
    pub flags: SuspicionFlags,
    /// Processing time sampled for this action (ms)
    pub processing_time_ms: Option<u64>,
    /// Ban expiry, if the actor is banned
    pub banned_until: Option<u64>,
}

impl Verdict {
    /// Returns true if the action was flagged or scored above "allow".
    #[must_use]
    pub fn suspicious(&self) -> bool {
        !self.flags.is_empty() || self.decision != Decision::Allow
    }
}

/// Suspicion gate shared by every session in the process.
#[derive(Debug)]
pub struct AntiCheatGate {
    config: AntiCheatConfig,
    states: SuspicionStore,
}

impl AntiCheatGate {
    /// Creates a gate with an empty suspicion store.
    #[must_use]
    pub fn new(config: AntiCheatConfig) -> Self {
        Self {
            config,
            states: SuspicionStore::new(),
        }
    }

    /// Gate configuration.
    #[must_use]
    pub fn config(&self) -> &AntiCheatConfig {
        &self.config
    }

    /// Per-actor suspicion states.
    #[must_use]
    pub fn states(&self) -> &SuspicionStore {
        &self.states
    }

    /// Scores one action and renders a decision.
    ///
    /// Updates the actor's rolling state (action times, samples, position,
    /// score). A blocking decision issues a ban and records a violation in
    /// `store`; store failures are logged and ignored.
    pub fn evaluate(&self, signals: &ActionSignals, store: &dyn CombatStore) -> Verdict {
        let actor = signals.actor;
        let now = signals.now_ms;

        let stored_ban = match store.active_ban(actor, now) {
            Ok(ban) => ban,
            Err(err) => {
                warn!(target: "skirmish::anticheat", %actor, error = %err, "ban lookup failed, treating as no ban");
                None
            }
        };

        let config = &self.config;
        let verdict = self.states.update(actor, now, |state| {
            state.last_seen_ms = now;
            state.decay(now, config.score_decay_per_minute);

            if let Some(until) = stored_ban.filter(|&until| until > now) {
                state.banned_until = Some(state.banned_until.map_or(until, |u| u.max(until)));
            }
            if state.is_banned(now) {
                return Verdict {
                    decision: Decision::Block,
                    score: state.score,
                    flags: SuspicionFlags::BANNED,
                    processing_time_ms: None,
                    banned_until: state.banned_until,
                };
            }

            let mut flags = SuspicionFlags::empty();

            state.action_times.push_back(now);
            state.trim(now, config);
            if high_action_frequency(&state.action_times, now, config) {
                flags |= SuspicionFlags::HIGH_ACTION_FREQUENCY;
            }

            if timestamp_anomaly(signals.client_timestamp, now, config) {
                flags |= SuspicionFlags::TIMESTAMP_ANOMALY;
            }

            if let (Some(reported), Some(max)) = (signals.reported_damage, signals.max_damage) {
                if impossible_damage(reported, max, config) {
                    flags |= SuspicionFlags::IMPOSSIBLE_DAMAGE;
                }
            }

            if let Some(position) = signals.position {
                if let Some((previous, at)) = state.last_position {
                    if impossible_movement(previous, at, position, now, signals.movement_speed, config) {
                        flags |= SuspicionFlags::IMPOSSIBLE_MOVEMENT;
                    }
                }
                state.last_position = Some((position, now));
            }

            if abnormal_crit_rate(&state.crit_samples, config) {
                flags |= SuspicionFlags::ABNORMAL_CRIT_RATE;
            }

            let processing_time_ms = match (signals.client_timestamp, signals.turn_started_ms) {
                (Some(client), Some(started)) if client >= started => Some(client - started),
                _ => None,
            };
            if let Some(sample) = processing_time_ms {
                state.reaction_samples.push_back(sample);
                state.trim(now, config);
            }
            if superhuman_reflexes(&state.reaction_samples, config) {
                flags |= SuspicionFlags::SUPERHUMAN_REFLEXES;
            }

            state.score = (state.score + flags.weight(config)).min(100.0);
            state.flags |= flags;

            let decision = Decision::from_score(state.score, config);
            if decision == Decision::Block {
                let until = now + ban_duration(state.score, state.flags, config);
                state.banned_until = Some(until);
                flags |= SuspicionFlags::BANNED;
            }

            Verdict {
                decision,
                score: state.score,
                flags,
                processing_time_ms,
                banned_until: state.banned_until.filter(|&u| u > now),
            }
        });

        self.report(actor, now, &verdict, store);
        verdict
    }

    /// Feeds a resolved damaging hit back into the statistical checks.
    pub fn record_outcome(&self, actor: ParticipantId, now_ms: u64, damage: f32, critical: bool) {
        let config = &self.config;
        self.states.update(actor, now_ms, |state| {
            state.last_seen_ms = now_ms;
            state.crit_samples.push_back(critical);
            state.max_damage_seen = state.max_damage_seen.max(damage);
            state.trim(now_ms, config);
        });
    }

    /// Seeds a fresh actor's history from persisted records.
    ///
    /// Only applies when the process has no action times for `actor` yet, so
    /// a restart does not reset rate limits or crit statistics. Returns the
    /// number of records replayed.
    pub fn hydrate(&self, actor: ParticipantId, now_ms: u64, records: &[ActionRecord]) -> usize {
        let config = &self.config;
        self.states.update(actor, now_ms, |state| {
            if !state.action_times.is_empty() {
                return 0;
            }
            let mut replayed = 0;
            for record in records.iter().filter(|r| r.actor == actor && r.accepted()) {
                state.action_times.push_back(record.received_at_ms);
                if record.damage_dealt > 0.0 {
                    state.crit_samples.push_back(record.critical);
                    state.max_damage_seen = state.max_damage_seen.max(record.damage_dealt);
                }
                if let Some(sample) = record.processing_time_ms {
                    state.reaction_samples.push_back(sample);
                }
                replayed += 1;
            }
            state.trim(now_ms, config);
            replayed
        })
    }

    /// Evicts inactive actors and trims histories.
    pub fn prune(&self, now_ms: u64) -> PruneReport {
        self.states.prune(now_ms, &self.config)
    }

    fn report(&self, actor: ParticipantId, now: u64, verdict: &Verdict, store: &dyn CombatStore) {
        match verdict.decision {
            Decision::Allow => {}
            Decision::Warn => {
                warn!(target: "skirmish::anticheat", %actor, score = verdict.score, flags = %verdict.flags, "suspicious action allowed");
            }
            Decision::Monitor => {
                warn!(
                    target: "skirmish::anticheat",
                    %actor,
                    score = verdict.score,
                    flags = %verdict.flags,
                    processing_time_ms = ?verdict.processing_time_ms,
                    monitored = true,
                    "suspicious action under monitoring"
                );
            }
            Decision::Block => {
                error!(
                    target: "skirmish::anticheat",
                    %actor,
                    score = verdict.score,
                    flags = %verdict.flags,
                    banned_until = ?verdict.banned_until,
                    "action blocked"
                );
                if verdict.flags == SuspicionFlags::BANNED {
                    return;
                }
                let violation = Violation {
                    actor,
                    at_ms: now,
                    score: verdict.score,
                    flags: verdict.flags,
                    banned_until: verdict.banned_until,
                };
                if let Err(err) = store.record_violation(&violation) {
                    warn!(target: "skirmish::anticheat", %actor, error = %err, "failed to record violation");
                }
            }
        }
    }
}
