//! Skill cooldowns shared across sessions.
//!
//! Cooldowns are keyed by `(participant, skill)` in one process-wide map, the
//! same way suspicion state is. An entry only applies inside the session that
//! created it; entries also carry a wall-clock expiry so that maintenance can
//! drop them once they can no longer matter.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::catalog::SkillId;
use crate::participant::ParticipantId;
use crate::session::SessionId;

/// One running cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownEntry {
    /// Session the skill was cast in
    pub session: SessionId,
    /// First turn on which the skill is usable again
    pub ready_turn: u32,
    /// Wall-clock time after which the entry can be discarded
    pub expires_at_ms: u64,
}

/// Process-wide cooldown map.
#[derive(Debug, Default)]
pub struct CooldownStore {
    entries: RwLock<HashMap<(ParticipantId, SkillId), CooldownEntry>>,
}

impl CooldownStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a cooldown for a cast on `turn`.
    ///
    /// A cooldown of `n` turns blocks the skill for the next `n` turns.
    /// `turn_ms` is the session's turn length, used to derive the expiry.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &self,
        actor: ParticipantId,
        skill: &SkillId,
        session: SessionId,
        turn: u32,
        cooldown_turns: u32,
        now_ms: u64,
        turn_ms: u64,
    ) {
        if cooldown_turns == 0 {
            return;
        }
        let entry = CooldownEntry {
            session,
            ready_turn: turn + cooldown_turns + 1,
            expires_at_ms: now_ms + u64::from(cooldown_turns + 1) * turn_ms,
        };
        self.entries.write().insert((actor, skill.clone()), entry);
    }

    /// Turns left before `skill` is usable by `actor` in `session`, if any.
    #[must_use]
    pub fn remaining(
        &self,
        actor: ParticipantId,
        skill: &SkillId,
        session: SessionId,
        turn: u32,
    ) -> Option<u32> {
        let entries = self.entries.read();
        let entry = entries.get(&(actor, skill.clone()))?;
        (entry.session == session && turn < entry.ready_turn).then(|| entry.ready_turn - turn)
    }

    /// Drops entries past their expiry. Returns how many were dropped.
    pub fn expire(&self, now_ms: u64) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at_ms > now_ms);
        before - entries.len()
    }

    /// Drops every entry created in `session`.
    pub fn clear_session(&self, session: SessionId) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.session != session);
        before - entries.len()
    }

    /// Number of tracked cooldowns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no cooldown is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HERO: ParticipantId = ParticipantId::new(1);
    const S1: SessionId = SessionId::new(1);
    const S2: SessionId = SessionId::new(2);

    fn fireball() -> SkillId {
        SkillId::new("fireball")
    }

    #[test]
    fn cooldown_blocks_following_turns() {
        let store = CooldownStore::new();
        store.start(HERO, &fireball(), S1, 1, 2, 0, 30_000);

        assert_eq!(store.remaining(HERO, &fireball(), S1, 2), Some(2));
        assert_eq!(store.remaining(HERO, &fireball(), S1, 3), Some(1));
        assert_eq!(store.remaining(HERO, &fireball(), S1, 4), None);
    }

    #[test]
    fn zero_cooldown_is_not_tracked() {
        let store = CooldownStore::new();
        store.start(HERO, &fireball(), S1, 1, 0, 0, 30_000);
        assert!(store.is_empty());
    }

    #[test]
    fn cooldowns_do_not_leak_across_sessions() {
        let store = CooldownStore::new();
        store.start(HERO, &fireball(), S1, 5, 3, 0, 30_000);
        assert_eq!(store.remaining(HERO, &fireball(), S2, 1), None);
    }

    #[test]
    fn expire_drops_old_entries() {
        let store = CooldownStore::new();
        store.start(HERO, &fireball(), S1, 1, 1, 0, 1_000);
        store.start(HERO, &SkillId::new("heal"), S1, 1, 5, 0, 1_000);

        assert_eq!(store.expire(2_000), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_session_drops_its_entries() {
        let store = CooldownStore::new();
        store.start(HERO, &fireball(), S1, 1, 1, 0, 1_000);
        store.start(ParticipantId::new(2), &fireball(), S2, 1, 1, 0, 1_000);
        assert_eq!(store.clear_session(S1), 1);
        assert_eq!(store.len(), 1);
    }
}
