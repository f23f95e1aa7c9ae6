//! Background housekeeping.
//!
//! A sweep expires stale cooldowns, prunes suspicion histories, purges
//! inactive effects, force-advances timed-out turns and drops ended sessions
//! past retention. Sweeps never touch the request path beyond the per-session
//! locks they briefly take, and nothing they do can fail an action.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use serde::Serialize;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::engine::CombatEngine;

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// Cooldowns past their expiry
    pub cooldowns_expired: usize,
    /// Suspicion states evicted for inactivity
    pub actors_evicted: usize,
    /// Inactive effects dropped
    pub effects_purged: usize,
    /// Turns force-advanced on timeout
    pub turns_advanced: usize,
    /// Ended sessions dropped
    pub sessions_dropped: usize,
}

impl MaintenanceReport {
    /// Returns true if the sweep changed nothing.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// Runs sweeps against one engine.
#[derive(Debug, Clone)]
pub struct Maintenance {
    engine: Arc<CombatEngine>,
}

impl Maintenance {
    /// Creates a sweeper for `engine`.
    #[must_use]
    pub fn new(engine: Arc<CombatEngine>) -> Self {
        Self { engine }
    }

    /// Runs one sweep at `now_ms`.
    pub fn run_once(&self, now_ms: u64) -> MaintenanceReport {
        let engine = &self.engine;
        let pruned = engine.gate().prune(now_ms);
        let retention = engine.config().maintenance.session_retention_ms;

        let report = MaintenanceReport {
            cooldowns_expired: engine.cooldowns().expire(now_ms),
            actors_evicted: pruned.evicted,
            turns_advanced: engine.advance_expired_turns(now_ms).len(),
            effects_purged: engine.purge_effects(),
            sessions_dropped: engine.sweep_sessions(now_ms, retention).len(),
        };

        if report.is_idle() {
            debug!(target: "skirmish::maintenance", "sweep found nothing to do");
        } else {
            info!(
                target: "skirmish::maintenance",
                cooldowns = report.cooldowns_expired,
                evicted = report.actors_evicted,
                effects = report.effects_purged,
                turns = report.turns_advanced,
                sessions = report.sessions_dropped,
                "sweep complete"
            );
        }
        report
    }

    /// Runs sweeps every `interval` on a background thread until the returned
    /// handle is stopped or dropped.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(self, interval: Duration) -> io::Result<SweeperHandle> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("skirmish-maintenance".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let now = self.engine.now_ms();
                        self.run_once(now);
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        debug!(target: "skirmish::maintenance", "sweeper stopping");
                        break;
                    }
                }
            })?;
        Ok(SweeperHandle {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

/// Handle to a running background sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signals the sweeper and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            // A full channel or a gone receiver both mean the loop is exiting.
            let _ = stop.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(target: "skirmish::maintenance", "sweeper thread panicked");
            }
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
