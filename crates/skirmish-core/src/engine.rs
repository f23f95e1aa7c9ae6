//! Engine facade.
//!
//! [`CombatEngine`] owns every live session together with the process-wide
//! state shared between them: the anti-cheat gate, the cooldown store, the
//! content catalog and the persistence boundary.
//!
//! # Locking
//!
//! Sessions live in a `RwLock<BTreeMap<SessionId, Arc<Mutex<_>>>>`. The
//! registry lock is held only long enough to clone a session handle, so actions
//! in different sessions never contend. The gate and cooldown store carry
//! their own locks.
//!
//! # Persistence
//!
//! After every submitted action the engine saves the action record, then (for
//! accepted actions) every touched participant and every created, changed or
//! removed effect. Store failures are logged at `warn!` and ignored: the
//! in-memory session stays authoritative.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use skirmish_core::action::ActionRequest;
//! use skirmish_core::catalog::Catalog;
//! use skirmish_core::clock::ManualClock;
//! use skirmish_core::config::EngineConfig;
//! use skirmish_core::engine::CombatEngine;
//! use skirmish_core::participant::{CombatStats, Participant, ParticipantId, TeamId};
//! use skirmish_core::persistence::MemoryStore;
//! use skirmish_core::session::{SessionSettings, SessionStatus};
//!
//! let clock = Arc::new(ManualClock::new(1_000));
//! let engine = CombatEngine::new(
//!     EngineConfig::default(),
//!     Catalog::new(),
//!     Arc::new(MemoryStore::new()),
//!     clock.clone(),
//! );
//!
//! let session = engine.create_session(SessionSettings::default());
//! for (id, team) in [(1, 1), (2, 2)] {
//!     let p = Participant::new(ParticipantId::new(id), TeamId::new(team), CombatStats::default());
//!     engine.join(session, p).unwrap();
//!     engine.set_ready(session, ParticipantId::new(id), true).unwrap();
//! }
//! engine.start(session).unwrap();
//!
//! clock.advance(1_500);
//! let result = engine.submit(session, &ActionRequest::defend(ParticipantId::new(1)).at(2_500)).unwrap();
//! assert!(result.success);
//! assert_eq!(engine.snapshot(session).unwrap().status(), SessionStatus::Active);
//! ```

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::action::{ActionRequest, ActionResult};
use crate::anticheat::AntiCheatGate;
use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::cooldown::CooldownStore;
use crate::error::{EngineError, StoreError};
use crate::participant::{CombatStats, Participant, ParticipantId, TeamId};
use crate::persistence::CombatStore;
use crate::pipeline::ActionPipeline;
use crate::rng::SeededRandom;
use crate::session::{CombatSession, CommitReport, SessionId, SessionSettings, TurnReport};

/// A session and its private random stream.
#[derive(Debug)]
struct SessionSlot {
    session: CombatSession,
    rng: SeededRandom,
}

type SharedSlot = Arc<Mutex<SessionSlot>>;

/// Owns sessions and the state shared across them.
pub struct CombatEngine {
    config: EngineConfig,
    catalog: Arc<Catalog>,
    gate: AntiCheatGate,
    cooldowns: CooldownStore,
    store: Arc<dyn CombatStore>,
    clock: Arc<dyn Clock>,
    sessions: RwLock<BTreeMap<SessionId, SharedSlot>>,
    next_session: AtomicU64,
}

impl fmt::Debug for CombatEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombatEngine")
            .field("seed", &self.config.seed)
            .field("sessions", &self.sessions.read().len())
            .field("cooldowns", &self.cooldowns.len())
            .field("tracked_actors", &self.gate.states().len())
            .finish_non_exhaustive()
    }
}

impl CombatEngine {
    /// Creates an engine with no sessions.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        catalog: Catalog,
        store: Arc<dyn CombatStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let gate = AntiCheatGate::new(config.anti_cheat.clone());
        Self {
            config,
            catalog: Arc::new(catalog),
            gate,
            cooldowns: CooldownStore::new(),
            store,
            clock,
            sessions: RwLock::new(BTreeMap::new()),
            next_session: AtomicU64::new(1),
        }
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Content catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Shared anti-cheat gate.
    #[must_use]
    pub fn gate(&self) -> &AntiCheatGate {
        &self.gate
    }

    /// Shared cooldown store.
    #[must_use]
    pub fn cooldowns(&self) -> &CooldownStore {
        &self.cooldowns
    }

    /// Current time according to the engine clock.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Opens a new session in `Waiting`.
    pub fn create_session(&self, settings: SessionSettings) -> SessionId {
        let id = SessionId::new(self.next_session.fetch_add(1, Ordering::Relaxed));
        let slot = SessionSlot {
            session: CombatSession::new(id, settings, &self.config.effects, self.now_ms()),
            rng: SeededRandom::new(self.session_seed(id)),
        };
        self.sessions.write().insert(id, Arc::new(Mutex::new(slot)));
        info!(target: "skirmish::engine", session = %id, "session created");
        id
    }

    /// Adds a participant with known stats.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSession`] or a wrapped [`SessionError`](crate::error::SessionError).
    pub fn join(&self, session: SessionId, participant: Participant) -> Result<(), EngineError> {
        self.with_session(session, |s| s.add_participant(participant))?
            .map_err(EngineError::from)
    }

    /// Adds a participant whose starting stats come from the store.
    ///
    /// Missing or failed lookups fall back to default stats. The anti-cheat
    /// gate is seeded with the participant's recent persisted actions so rate
    /// limits survive a restart.
    ///
    /// # Errors
    ///
    /// As [`join`](Self::join).
    pub fn join_from_store(
        &self,
        session: SessionId,
        id: ParticipantId,
        team: TeamId,
    ) -> Result<(), EngineError> {
        let stats = match self.store.get_participant(id) {
            Ok(Some(stats)) => stats,
            Ok(None) => {
                debug!(target: "skirmish::engine", participant = %id, "no stored stats, using defaults");
                CombatStats::default()
            }
            Err(err) => {
                warn!(target: "skirmish::engine", participant = %id, error = %err, "stat lookup failed, using defaults");
                CombatStats::default()
            }
        };

        let now = self.now_ms();
        let since = now.saturating_sub(self.config.anti_cheat.rate_window_ms);
        match self.store.load_recent_actions(id, since) {
            Ok(records) => {
                let replayed = self.gate.hydrate(id, now, &records);
                if replayed > 0 {
                    debug!(target: "skirmish::engine", participant = %id, replayed, "anti-cheat history restored");
                }
            }
            Err(err) => soft_fail("load_recent_actions", &err),
        }

        self.join(session, Participant::new(id, team, stats))
    }

    /// Marks a participant ready (or not).
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSession`] or a wrapped session error.
    pub fn set_ready(&self, session: SessionId, id: ParticipantId, ready: bool) -> Result<(), EngineError> {
        self.with_session(session, |s| s.set_ready(id, ready))?
            .map_err(EngineError::from)
    }

    /// Starts combat.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSession`] or a wrapped session error.
    pub fn start(&self, session: SessionId) -> Result<(), EngineError> {
        let now = self.now_ms();
        self.with_session(session, |s| s.start(now))?
            .map_err(EngineError::from)
    }

    /// Pauses combat.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSession`] or a wrapped session error.
    pub fn pause(&self, session: SessionId) -> Result<(), EngineError> {
        self.with_session(session, CombatSession::pause)?
            .map_err(EngineError::from)
    }

    /// Resumes a paused session.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSession`] or a wrapped session error.
    pub fn resume(&self, session: SessionId) -> Result<(), EngineError> {
        let now = self.now_ms();
        self.with_session(session, |s| s.resume(now))?
            .map_err(EngineError::from)
    }

    /// Cancels a session.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSession`] or a wrapped session error.
    pub fn cancel(&self, session: SessionId) -> Result<(), EngineError> {
        let now = self.now_ms();
        self.with_session(session, |s| s.cancel(now))?
            .map_err(EngineError::from)
    }

    // ========================================================================
    // Actions and turns
    // ========================================================================

    /// Resolves one action.
    ///
    /// Rejections are reported in the returned result, not as errors. When the
    /// action was the last one owed this turn, the turn advances before the
    /// result is returned and the result's status reflects it.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSession`].
    pub fn submit(&self, session: SessionId, request: &ActionRequest) -> Result<ActionResult, EngineError> {
        let slot = self.slot(session)?;
        let now = self.now_ms();
        let mut guard = slot.lock();
        let SessionSlot { session: state, rng } = &mut *guard;

        let pipeline = ActionPipeline::new(
            &self.config.combat,
            &self.catalog,
            &self.gate,
            &self.cooldowns,
            self.store.as_ref(),
        );
        let resolution = pipeline.resolve(state, request, now, rng);
        let mut result = resolution.result;

        if let Err(err) = self.store.save_action(&result.action) {
            soft_fail("save_action", &err);
        }
        if !result.success {
            return Ok(result);
        }
        self.persist(state, &resolution.commit);

        if state.status() == crate::session::SessionStatus::Active && state.all_acted() {
            match state.advance_turn(now) {
                Ok(report) => {
                    self.persist(state, &report.commit);
                    result.session_status = report.status;
                    result.winner = report.winner;
                }
                Err(err) => {
                    warn!(target: "skirmish::engine", session = %session, error = %err, "automatic turn advance failed");
                }
            }
        }
        Ok(result)
    }

    /// Closes the current turn.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSession`] or a wrapped session error.
    pub fn advance_turn(&self, session: SessionId) -> Result<TurnReport, EngineError> {
        let slot = self.slot(session)?;
        let now = self.now_ms();
        let mut guard = slot.lock();
        let report = guard.session.advance_turn(now)?;
        self.persist(&guard.session, &report.commit);
        Ok(report)
    }

    /// Advances every active session whose turn ran out. Returns the reports
    /// keyed by session.
    pub fn advance_expired_turns(&self, now_ms: u64) -> BTreeMap<SessionId, TurnReport> {
        let mut reports = BTreeMap::new();
        for (id, slot) in self.slots() {
            let mut guard = slot.lock();
            if !guard.session.turn_expired(now_ms) {
                continue;
            }
            match guard.session.advance_turn(now_ms) {
                Ok(report) => {
                    debug!(target: "skirmish::engine", session = %id, turn = report.turn, "turn timed out");
                    self.persist(&guard.session, &report.commit);
                    reports.insert(id, report);
                }
                Err(err) => {
                    warn!(target: "skirmish::engine", session = %id, error = %err, "timed-out turn could not advance");
                }
            }
        }
        reports
    }

    // ========================================================================
    // Queries and housekeeping
    // ========================================================================

    /// Point-in-time copy of a session.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSession`].
    pub fn snapshot(&self, session: SessionId) -> Result<CombatSession, EngineError> {
        self.with_session(session, |s| s.clone())
    }

    /// Ids of every held session, ascending.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().copied().collect()
    }

    /// Drops finished and cancelled sessions that ended at least `retention_ms`
    /// ago, along with their cooldowns. Returns the dropped ids.
    pub fn sweep_sessions(&self, now_ms: u64, retention_ms: u64) -> Vec<SessionId> {
        let expired: Vec<SessionId> = self
            .slots()
            .into_iter()
            .filter(|(_, slot)| {
                let guard = slot.lock();
                guard.session.status().is_terminal()
                    && guard
                        .session
                        .ended_at_ms()
                        .is_some_and(|ended| now_ms.saturating_sub(ended) >= retention_ms)
            })
            .map(|(id, _)| id)
            .collect();

        if !expired.is_empty() {
            let mut sessions = self.sessions.write();
            for id in &expired {
                sessions.remove(id);
            }
        }
        for id in &expired {
            let cleared = self.cooldowns.clear_session(*id);
            debug!(target: "skirmish::engine", session = %id, cooldowns = cleared, "session dropped");
        }
        expired
    }

    /// Drops inactive effects from every live session, in parallel. Returns
    /// how many were dropped.
    pub fn purge_effects(&self) -> usize {
        self.slots()
            .par_iter()
            .map(|(_, slot)| slot.lock().session.purge_inactive_effects())
            .sum()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn session_seed(&self, id: SessionId) -> u64 {
        splitmix64(self.config.seed ^ id.as_u64())
    }

    fn slot(&self, session: SessionId) -> Result<SharedSlot, EngineError> {
        self.sessions
            .read()
            .get(&session)
            .cloned()
            .ok_or(EngineError::UnknownSession(session))
    }

    fn slots(&self) -> Vec<(SessionId, SharedSlot)> {
        self.sessions
            .read()
            .iter()
            .map(|(id, slot)| (*id, Arc::clone(slot)))
            .collect()
    }

    fn with_session<R>(
        &self,
        session: SessionId,
        f: impl FnOnce(&mut CombatSession) -> R,
    ) -> Result<R, EngineError> {
        let slot = self.slot(session)?;
        let mut guard = slot.lock();
        Ok(f(&mut guard.session))
    }

    fn persist(&self, session: &CombatSession, commit: &CommitReport) {
        let id = session.id();
        for participant in commit.changes.keys().filter_map(|p| session.participant(*p)) {
            if let Err(err) = self.store.update_participant(id, participant) {
                soft_fail("update_participant", &err);
            }
        }
        for effect in &commit.effects_created {
            if let Err(err) = self.store.save_effect(id, effect) {
                soft_fail("save_effect", &err);
            }
        }
        for effect in &commit.effects_updated {
            if let Err(err) = self.store.update_effect(id, effect) {
                soft_fail("update_effect", &err);
            }
        }
        let removed: BTreeSet<_> = commit
            .changes
            .values()
            .flat_map(|change| change.effects_removed.iter().copied())
            .collect();
        for effect in removed {
            if let Err(err) = self.store.delete_effect(id, effect) {
                soft_fail("delete_effect", &err);
            }
        }
    }
}

fn soft_fail(operation: &'static str, err: &StoreError) {
    warn!(target: "skirmish::engine", operation, error = %err, "store call failed, continuing");
}

/// One splitmix64 step; fixed across platforms and toolchains.
fn splitmix64(state: u64) -> u64 {
    let mut z = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
