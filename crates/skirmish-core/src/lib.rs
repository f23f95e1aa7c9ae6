//! # Skirmish Core
//!
//! Authoritative combat resolution for turn-based multiplayer skirmishes.
//!
//! Given a combat session, this crate validates and resolves submitted
//! actions, computes their numeric outcomes, applies and ticks status effects,
//! and gates every action through an anti-cheat suspicion score before
//! anything is committed.
//!
//! ## Architecture
//!
//! - **Participants** ([`participant`]): live stats and flags
//! - **Calculator** ([`calculator`]): pure hit, crit, block, damage and heal formulas
//! - **Effects** ([`effects`]): application strategies, ticking, dispel, modifiers
//! - **Anti-cheat** ([`anticheat`]): rolling behavior checks and graduated response
//! - **Pipeline** ([`pipeline`]): validate, gate, order, plan, commit
//! - **Sessions** ([`session`]): lifecycle, turns, win condition
//!
//! [`engine::CombatEngine`] ties these together behind one facade, with
//! persistence through [`persistence::CombatStore`] and background sweeps in
//! [`maintenance`].
//!
//! ## Determinism
//!
//! Every random decision draws from a [`rng::RandomSource`] and every
//! timestamp comes from a [`clock::Clock`]. With the same seed, clock and
//! inputs a session replays identically.
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use skirmish_core::{
//!     ActionRequest, Catalog, CombatEngine, CombatStats, EngineConfig, ManualClock, MemoryStore,
//!     Participant, ParticipantId, SessionSettings, TeamId,
//! };
//!
//! let engine = CombatEngine::new(
//!     EngineConfig::default(),
//!     Catalog::new(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(ManualClock::new(0)),
//! );
//! let session = engine.create_session(SessionSettings::default());
//! for (id, team) in [(1, 1), (2, 2)] {
//!     let p = Participant::new(ParticipantId::new(id), TeamId::new(team), CombatStats::default());
//!     engine.join(session, p).unwrap();
//!     engine.set_ready(session, ParticipantId::new(id), true).unwrap();
//! }
//! engine.start(session).unwrap();
//!
//! let result = engine
//!     .submit(session, &ActionRequest::attack(ParticipantId::new(1), ParticipantId::new(2)).at(0))
//!     .unwrap();
//! assert!(result.success);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod action;
pub mod anticheat;
pub mod calculator;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod cooldown;
pub mod effects;
pub mod engine;
pub mod error;
pub mod maintenance;
pub mod participant;
pub mod persistence;
pub mod pipeline;
pub mod rng;
pub mod session;

// Re-export commonly used types
pub use action::{ActionRecord, ActionRequest, ActionResult, ActionType};
pub use anticheat::{AntiCheatGate, Decision, SuspicionFlags, Verdict};
pub use catalog::{Catalog, Item, Skill};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use effects::{EffectEngine, EffectKind, StatusEffect};
pub use engine::CombatEngine;
pub use error::{ActionRejection, EngineError, SessionError};
pub use maintenance::Maintenance;
pub use participant::{CombatStats, Participant, ParticipantId, TeamId};
pub use persistence::{CombatStore, MemoryStore};
pub use rng::{RandomSource, ScriptedRandom, SeededRandom};
pub use session::{CombatSession, SessionId, SessionSettings, SessionStatus};

#[cfg(test)]
mod tests;
