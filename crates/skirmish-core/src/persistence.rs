//! Persistence boundary.
//!
//! The core never talks to a database directly. Everything it wants to keep
//! beyond a session's lifetime goes through [`CombatStore`]. Every method has a
//! no-op default so an embedding only implements what it persists, and every
//! failure is soft: callers log it and carry on.
//!
//! [`MemoryStore`] is a complete in-process implementation used by the
//! simulator and the tests.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::action::ActionRecord;
use crate::anticheat::SuspicionFlags;
use crate::effects::{EffectId, StatusEffect};
use crate::error::StoreError;
use crate::participant::{CombatStats, Participant, ParticipantId};
use crate::session::SessionId;

/// A blocking anti-cheat decision, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Offending actor
    pub actor: ParticipantId,
    /// When it was recorded
    pub at_ms: u64,
    /// Score at the time
    pub score: f32,
    /// Flags raised by the blocked action
    pub flags: SuspicionFlags,
    /// Ban expiry issued with it
    pub banned_until: Option<u64>,
}

/// Durable storage for records, effects, participant snapshots and bans.
pub trait CombatStore: Send + Sync {
    /// Persists an action record, accepted or rejected.
    fn save_action(&self, _record: &ActionRecord) -> Result<(), StoreError> {
        Ok(())
    }

    /// Records for `actor` received at or after `since_ms`, oldest first.
    fn load_recent_actions(
        &self,
        _actor: ParticipantId,
        _since_ms: u64,
    ) -> Result<Vec<ActionRecord>, StoreError> {
        Ok(Vec::new())
    }

    /// Persists a newly created effect.
    fn save_effect(&self, _session: SessionId, _effect: &StatusEffect) -> Result<(), StoreError> {
        Ok(())
    }

    /// Persists a changed effect.
    fn update_effect(&self, _session: SessionId, _effect: &StatusEffect) -> Result<(), StoreError> {
        Ok(())
    }

    /// Deletes a removed effect.
    fn delete_effect(&self, _session: SessionId, _effect: EffectId) -> Result<(), StoreError> {
        Ok(())
    }

    /// Starting stats for a participant, if the world knows them.
    fn get_participant(&self, _id: ParticipantId) -> Result<Option<CombatStats>, StoreError> {
        Ok(None)
    }

    /// Persists a participant's live state.
    fn update_participant(
        &self,
        _session: SessionId,
        _participant: &Participant,
    ) -> Result<(), StoreError> {
        Ok(())
    }

    /// Ban expiry for `actor` if one is running at `now_ms`.
    fn active_ban(&self, _actor: ParticipantId, _now_ms: u64) -> Result<Option<u64>, StoreError> {
        Ok(None)
    }

    /// Persists a violation.
    fn record_violation(&self, _violation: &Violation) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    actions: Vec<ActionRecord>,
    effects: BTreeMap<(SessionId, EffectId), StatusEffect>,
    participants: BTreeMap<(SessionId, ParticipantId), Participant>,
    stats: HashMap<ParticipantId, CombatStats>,
    bans: HashMap<ParticipantId, u64>,
    violations: Vec<Violation>,
    unavailable: bool,
}

/// In-memory [`CombatStore`].
///
/// # Example
///
/// ```
/// use skirmish_core::participant::ParticipantId;
/// use skirmish_core::persistence::{CombatStore, MemoryStore};
///
/// let store = MemoryStore::new();
/// store.insert_ban(ParticipantId::new(1), 5_000);
/// assert_eq!(store.active_ban(ParticipantId::new(1), 1_000).unwrap(), Some(5_000));
/// assert_eq!(store.active_ban(ParticipantId::new(1), 6_000).unwrap(), None);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with [`StoreError::Unavailable`] (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Registers starting stats returned by [`CombatStore::get_participant`].
    pub fn insert_stats(&self, id: ParticipantId, stats: CombatStats) {
        self.state.lock().stats.insert(id, stats);
    }

    /// Registers a ban.
    pub fn insert_ban(&self, actor: ParticipantId, until_ms: u64) {
        self.state.lock().bans.insert(actor, until_ms);
    }

    /// Every saved action record, in save order.
    #[must_use]
    pub fn actions(&self) -> Vec<ActionRecord> {
        self.state.lock().actions.clone()
    }

    /// Violations recorded for `actor`.
    #[must_use]
    pub fn violations(&self, actor: ParticipantId) -> Vec<Violation> {
        self.state
            .lock()
            .violations
            .iter()
            .filter(|v| v.actor == actor)
            .cloned()
            .collect()
    }

    /// Stored effect, if still persisted.
    #[must_use]
    pub fn effect(&self, session: SessionId, id: EffectId) -> Option<StatusEffect> {
        self.state.lock().effects.get(&(session, id)).cloned()
    }

    /// Number of persisted effects.
    #[must_use]
    pub fn effect_count(&self) -> usize {
        self.state.lock().effects.len()
    }

    /// Last persisted snapshot of a participant.
    #[must_use]
    pub fn participant(&self, session: SessionId, id: ParticipantId) -> Option<Participant> {
        self.state.lock().participants.get(&(session, id)).cloned()
    }

    fn with<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> Result<R, StoreError> {
        let mut state = self.state.lock();
        if state.unavailable {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(f(&mut state))
    }
}

impl CombatStore for MemoryStore {
    fn save_action(&self, record: &ActionRecord) -> Result<(), StoreError> {
        self.with(|s| s.actions.push(record.clone()))
    }

    fn load_recent_actions(
        &self,
        actor: ParticipantId,
        since_ms: u64,
    ) -> Result<Vec<ActionRecord>, StoreError> {
        self.with(|s| {
            s.actions
                .iter()
                .filter(|r| r.actor == actor && r.received_at_ms >= since_ms)
                .cloned()
                .collect()
        })
    }

    fn save_effect(&self, session: SessionId, effect: &StatusEffect) -> Result<(), StoreError> {
        self.with(|s| {
            s.effects.insert((session, effect.id), effect.clone());
        })
    }

    fn update_effect(&self, session: SessionId, effect: &StatusEffect) -> Result<(), StoreError> {
        self.with(|s| match s.effects.get_mut(&(session, effect.id)) {
            Some(stored) => {
                *stored = effect.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(effect.id.to_string())),
        })?
    }

    fn delete_effect(&self, session: SessionId, effect: EffectId) -> Result<(), StoreError> {
        self.with(|s| {
            s.effects.remove(&(session, effect));
        })
    }

    fn get_participant(&self, id: ParticipantId) -> Result<Option<CombatStats>, StoreError> {
        self.with(|s| s.stats.get(&id).cloned())
    }

    fn update_participant(
        &self,
        session: SessionId,
        participant: &Participant,
    ) -> Result<(), StoreError> {
        self.with(|s| {
            s.participants
                .insert((session, participant.id), participant.clone());
        })
    }

    fn active_ban(&self, actor: ParticipantId, now_ms: u64) -> Result<Option<u64>, StoreError> {
        self.with(|s| s.bans.get(&actor).copied().filter(|&until| until > now_ms))
    }

    fn record_violation(&self, violation: &Violation) -> Result<(), StoreError> {
        self.with(|s| {
            if let Some(until) = violation.banned_until {
                let entry = s.bans.entry(violation.actor).or_insert(until);
                *entry = (*entry).max(until);
            }
            s.violations.push(violation.clone());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionRequest;
    use crate::effects::{EffectKind, EffectTemplate};

    const HERO: ParticipantId = ParticipantId::new(1);
    const S1: SessionId = SessionId::new(1);

    fn effect(id: u64) -> StatusEffect {
        let template = EffectTemplate::new("ward", EffectKind::Shield, 2).with_magnitude(10.0);
        StatusEffect::from_template(EffectId::new(id), &template, HERO, None)
    }

    #[test]
    fn default_methods_are_noops() {
        struct Nothing;
        impl CombatStore for Nothing {}

        let store = Nothing;
        assert_eq!(store.get_participant(HERO), Ok(None));
        assert_eq!(store.active_ban(HERO, 0), Ok(None));
        assert!(store.load_recent_actions(HERO, 0).unwrap().is_empty());
    }

    #[test]
    fn recent_actions_filter_by_actor_and_time() {
        let store = MemoryStore::new();
        for (actor, at) in [(1, 100), (2, 200), (1, 300)] {
            let request = ActionRequest::wait(ParticipantId::new(actor));
            let record = ActionRecord::for_request(S1, &request, 1, at);
            store.save_action(&record).unwrap();
        }
        let recent = store.load_recent_actions(HERO, 200).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].received_at_ms, 300);
    }

    #[test]
    fn effect_lifecycle() {
        let store = MemoryStore::new();
        let mut shield = effect(1);
        store.save_effect(S1, &shield).unwrap();
        shield.magnitude = 4.0;
        store.update_effect(S1, &shield).unwrap();
        assert_eq!(store.effect(S1, shield.id).unwrap().magnitude, 4.0);
        store.delete_effect(S1, shield.id).unwrap();
        assert_eq!(store.effect_count(), 0);
    }

    #[test]
    fn updating_unknown_effect_fails() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.update_effect(S1, &effect(7)),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn violations_extend_bans() {
        let store = MemoryStore::new();
        store
            .record_violation(&Violation {
                actor: HERO,
                at_ms: 1_000,
                score: 85.0,
                flags: SuspicionFlags::IMPOSSIBLE_DAMAGE,
                banned_until: Some(10_000),
            })
            .unwrap();
        assert_eq!(store.active_ban(HERO, 5_000).unwrap(), Some(10_000));
        assert_eq!(store.violations(HERO).len(), 1);
    }

    #[test]
    fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.active_ban(HERO, 0),
            Err(StoreError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.active_ban(HERO, 0).is_ok());
    }
}
