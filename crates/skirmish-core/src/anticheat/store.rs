//! Process-wide per-actor suspicion state.

use glam::Vec2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use super::SuspicionFlags;
use crate::config::AntiCheatConfig;
use crate::participant::ParticipantId;

/// Rolling behavioral state for one actor.
///
/// Created lazily on the actor's first action and evicted after
/// `inactivity_eviction_ms` without activity (unless a ban is still running).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SuspicionState {
    /// Server receive times inside the rate window (oldest first)
    pub action_times: VecDeque<u64>,
    /// Crit flag of recent damaging hits (oldest first)
    pub crit_samples: VecDeque<bool>,
    /// Recent processing times in ms (oldest first)
    pub reaction_samples: VecDeque<u64>,
    /// Highest damage the actor has dealt
    pub max_damage_seen: f32,
    /// Last accepted position and when it was reported
    pub last_position: Option<(Vec2, u64)>,
    /// Cumulative score (0 - 100)
    pub score: f32,
    /// Every flag raised since the state was created
    pub flags: SuspicionFlags,
    /// Ban expiry, if banned
    pub banned_until: Option<u64>,
    /// Last time the score was decayed
    pub last_decay_ms: u64,
    /// Last action or outcome seen
    pub last_seen_ms: u64,
}

impl SuspicionState {
    fn new(now_ms: u64) -> Self {
        Self {
            last_decay_ms: now_ms,
            last_seen_ms: now_ms,
            ..Self::default()
        }
    }

    /// Returns true if a ban is running at `now_ms`.
    #[must_use]
    pub fn is_banned(&self, now_ms: u64) -> bool {
        self.banned_until.is_some_and(|until| until > now_ms)
    }

    /// Linear score decay for the time since the last decay.
    pub fn decay(&mut self, now_ms: u64, per_minute: f32) {
        let elapsed = now_ms.saturating_sub(self.last_decay_ms);
        #[allow(clippy::cast_precision_loss)]
        let minutes = elapsed as f32 / 60_000.0;
        self.score = (self.score - minutes * per_minute).max(0.0);
        self.last_decay_ms = now_ms;
    }

    /// Drops action times older than the rate window.
    pub fn trim(&mut self, now_ms: u64, config: &AntiCheatConfig) {
        let cutoff = now_ms.saturating_sub(config.rate_window_ms);
        while self.action_times.front().is_some_and(|&t| t < cutoff) {
            self.action_times.pop_front();
        }
        truncate_front(&mut self.crit_samples, config.history_len);
        truncate_front(&mut self.reaction_samples, config.history_len);
    }
}

fn truncate_front<T>(queue: &mut VecDeque<T>, len: usize) {
    while queue.len() > len {
        queue.pop_front();
    }
}

/// Counts from [`SuspicionStore::prune`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PruneReport {
    /// States removed for inactivity
    pub evicted: usize,
    /// States kept and trimmed
    pub retained: usize,
}

/// Actor-keyed suspicion states behind a read/write lock.
///
/// Every read-modify-write goes through [`SuspicionStore::update`], which holds
/// the write lock for the whole closure.
#[derive(Debug, Default)]
pub struct SuspicionStore {
    states: RwLock<HashMap<ParticipantId, SuspicionState>>,
}

impl SuspicionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` on the actor's state, creating it if needed.
    pub fn update<R>(
        &self,
        actor: ParticipantId,
        now_ms: u64,
        f: impl FnOnce(&mut SuspicionState) -> R,
    ) -> R {
        let mut states = self.states.write();
        let state = states
            .entry(actor)
            .or_insert_with(|| SuspicionState::new(now_ms));
        f(state)
    }

    /// Copy of the actor's state.
    #[must_use]
    pub fn snapshot(&self, actor: ParticipantId) -> Option<SuspicionState> {
        self.states.read().get(&actor).cloned()
    }

    /// Number of tracked actors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    /// Returns true if no actor is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }

    /// Evicts inactive states and trims the histories of the rest.
    pub fn prune(&self, now_ms: u64, config: &AntiCheatConfig) -> PruneReport {
        let mut states = self.states.write();
        let before = states.len();
        states.retain(|_, state| {
            let idle = now_ms.saturating_sub(state.last_seen_ms);
            idle < config.inactivity_eviction_ms || state.is_banned(now_ms)
        });
        for state in states.values_mut() {
            state.trim(now_ms, config);
        }
        PruneReport {
            evicted: before - states.len(),
            retained: states.len(),
        }
    }
}
