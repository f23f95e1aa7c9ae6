//! Combat session state machine.
//!
//! A [`CombatSession`] owns its participants, its [`EffectEngine`] and its turn
//! counter. It is the only place participant health, mana and effects change:
//! the pipeline plans a [`ChangeSet`] and the session commits it in one step.
//!
//! # Lifecycle
//!
//! ```text
//! Waiting ──start──► Active ◄──resume── Paused
//!    │                 │  └────pause────►  │
//!    │                 ▼                   │
//!    └──cancel──► Cancelled ◄──cancel──────┘
//!                      Active ──win──► Finished
//! ```
//!
//! `Finished` and `Cancelled` are terminal and accept no actions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

use crate::action::{AppliedEffect, ChangeSet, ParticipantChange, StateChange};
use crate::config::EffectConfig;
use crate::effects::{
    ApplyOutcome, EffectEngine, EffectKind, StatusEffect, TickOutcome,
};
use crate::error::SessionError;
use crate::participant::{EffectiveStats, Participant, ParticipantId, TeamId};

/// Unique identifier for a combat session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    /// Creates a new `SessionId`.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Gathering participants
    Waiting,
    /// Accepting actions
    Active,
    /// Temporarily halted
    Paused,
    /// Ended by the win condition
    Finished,
    /// Ended without a result
    Cancelled,
}

impl SessionStatus {
    /// Returns true for `Finished` and `Cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Finished => "finished",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Per-session rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Whether flee actions are allowed
    pub allow_flee: bool,
    /// Whether item actions are allowed
    pub allow_items: bool,
    /// Whether participants may damage allies
    pub team_damage: bool,
    /// Turn length before the turn is force-advanced (ms)
    pub turn_time_limit_ms: u64,
    /// Refuse actions from anyone but the fastest actor still owed a turn
    pub strict_turn_order: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            allow_flee: true,
            allow_items: true,
            team_damage: false,
            turn_time_limit_ms: 30_000,
            strict_turn_order: false,
        }
    }
}

/// What a commit did, for the caller and for persistence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommitReport {
    /// Net change per touched participant
    pub changes: BTreeMap<ParticipantId, ParticipantChange>,
    /// Effect application attempts in order
    pub effects_applied: Vec<AppliedEffect>,
    /// Effect instances created
    pub effects_created: Vec<StatusEffect>,
    /// Existing effect instances that changed (stacked, refreshed, shield drained)
    pub effects_updated: Vec<StatusEffect>,
    /// Effect instances removed
    pub effects_removed: Vec<StatusEffect>,
    /// Participants who died
    pub deaths: Vec<ParticipantId>,
}

impl CommitReport {
    fn entry(&mut self, id: ParticipantId) -> &mut ParticipantChange {
        self.changes.entry(id).or_default()
    }

    fn removed(&mut self, effects: Vec<StatusEffect>) {
        for effect in effects {
            self.entry(effect.target).effects_removed.push(effect.id);
            self.effects_removed.push(effect);
        }
    }
}

/// What a turn advance did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnReport {
    /// Turn that just ended
    pub ended_turn: u32,
    /// Turn now open (unchanged if the session finished)
    pub turn: u32,
    /// Effect ticks in target order
    pub ticks: Vec<TickOutcome>,
    /// Net change per touched participant
    pub changes: BTreeMap<ParticipantId, ParticipantChange>,
    /// Status after the advance
    pub status: SessionStatus,
    /// Winning team, if the session finished
    pub winner: Option<TeamId>,
    #[serde(skip)]
    pub(crate) commit: CommitReport,
}

/// One combat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatSession {
    id: SessionId,
    status: SessionStatus,
    settings: SessionSettings,
    participants: BTreeMap<ParticipantId, Participant>,
    effects: EffectEngine,
    turn: u32,
    turn_started_ms: u64,
    acted: BTreeSet<ParticipantId>,
    winner: Option<TeamId>,
    created_at_ms: u64,
    ended_at_ms: Option<u64>,
}

impl CombatSession {
    /// Creates a session in `Waiting`.
    #[must_use]
    pub fn new(id: SessionId, settings: SessionSettings, effects: &EffectConfig, now_ms: u64) -> Self {
        Self {
            id,
            status: SessionStatus::Waiting,
            settings,
            participants: BTreeMap::new(),
            effects: EffectEngine::new(effects),
            turn: 0,
            turn_started_ms: now_ms,
            acted: BTreeSet::new(),
            winner: None,
            created_at_ms: now_ms,
            ended_at_ms: None,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Session id.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Session rules.
    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Current turn (0 before start).
    #[must_use]
    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// When the current turn opened.
    #[must_use]
    pub fn turn_started_ms(&self) -> u64 {
        self.turn_started_ms
    }

    /// Winning team once finished (`None` on a draw).
    #[must_use]
    pub fn winner(&self) -> Option<TeamId> {
        self.winner
    }

    /// Creation time.
    #[must_use]
    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    /// When the session reached a terminal status.
    #[must_use]
    pub fn ended_at_ms(&self) -> Option<u64> {
        self.ended_at_ms
    }

    /// Looks up a participant.
    #[must_use]
    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    /// All participants in id order.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Live effects.
    #[must_use]
    pub fn effects(&self) -> &EffectEngine {
        &self.effects
    }

    /// Stats after effect modifiers.
    #[must_use]
    pub fn effective_stats(&self, id: ParticipantId) -> Option<EffectiveStats> {
        let participant = self.participants.get(&id)?;
        Some(self.effects.aggregate_modifiers(id).effective(&participant.stats))
    }

    /// Returns true if `id` already acted this turn.
    #[must_use]
    pub fn has_acted(&self, id: ParticipantId) -> bool {
        self.acted.contains(&id)
    }

    /// Participants expected to act this turn: in play and not stunned.
    #[must_use]
    pub fn eligible_actors(&self) -> Vec<ParticipantId> {
        self.participants
            .values()
            .filter(|p| p.in_play() && !self.effects.is_stunned(p.id))
            .map(|p| p.id)
            .collect()
    }

    /// Eligible actors fastest first, by effective attack speed, ties by id.
    #[must_use]
    pub fn turn_order(&self) -> Vec<ParticipantId> {
        let mut order: Vec<(ParticipantId, f32)> = self
            .eligible_actors()
            .into_iter()
            .map(|id| (id, self.effective_stats(id).map_or(0.0, |s| s.attack_speed)))
            .collect();
        order.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        order.into_iter().map(|(id, _)| id).collect()
    }

    /// The fastest eligible actor that has not acted yet.
    #[must_use]
    pub fn next_actor(&self) -> Option<ParticipantId> {
        self.turn_order().into_iter().find(|id| !self.acted.contains(id))
    }

    /// Returns true once every eligible actor acted this turn.
    #[must_use]
    pub fn all_acted(&self) -> bool {
        self.eligible_actors().iter().all(|id| self.acted.contains(id))
    }

    /// Returns true if the current turn ran past its time limit.
    #[must_use]
    pub fn turn_expired(&self, now_ms: u64) -> bool {
        self.status == SessionStatus::Active
            && now_ms.saturating_sub(self.turn_started_ms) >= self.settings.turn_time_limit_ms
    }

    /// Teams with at least one participant still in play.
    #[must_use]
    pub fn teams_in_play(&self) -> BTreeSet<TeamId> {
        self.participants
            .values()
            .filter(|p| p.in_play())
            .map(|p| p.team)
            .collect()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Adds a participant while waiting.
    ///
    /// # Errors
    ///
    /// [`SessionError::JoinClosed`] unless waiting,
    /// [`SessionError::DuplicateParticipant`] if the id already joined.
    pub fn add_participant(&mut self, participant: Participant) -> Result<(), SessionError> {
        if self.status != SessionStatus::Waiting {
            return Err(SessionError::JoinClosed(self.status));
        }
        if self.participants.contains_key(&participant.id) {
            return Err(SessionError::DuplicateParticipant(participant.id));
        }
        debug!(target: "skirmish::session", session = %self.id, participant = %participant.id, team = %participant.team, "participant joined");
        self.participants.insert(participant.id, participant);
        Ok(())
    }

    /// Marks a participant ready (or not).
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownParticipant`] if `id` is not in the session.
    pub fn set_ready(&mut self, id: ParticipantId, ready: bool) -> Result<(), SessionError> {
        let participant = self
            .participants
            .get_mut(&id)
            .ok_or(SessionError::UnknownParticipant(id))?;
        participant.ready = ready;
        Ok(())
    }

    /// `Waiting → Active`. Opens turn 1.
    ///
    /// # Errors
    ///
    /// Fails unless waiting with at least two participants across at least
    /// two teams, all ready.
    pub fn start(&mut self, now_ms: u64) -> Result<(), SessionError> {
        self.expect(SessionStatus::Waiting, SessionStatus::Active)?;
        if self.participants.len() < 2 {
            return Err(SessionError::NotEnoughParticipants(self.participants.len()));
        }
        let teams: BTreeSet<TeamId> = self.participants.values().map(|p| p.team).collect();
        if teams.len() < 2 {
            return Err(SessionError::NotEnoughTeams);
        }
        if let Some(p) = self.participants.values().find(|p| !p.ready) {
            return Err(SessionError::NotReady(p.id));
        }
        self.status = SessionStatus::Active;
        self.turn = 1;
        self.turn_started_ms = now_ms;
        self.effects.begin_turn(self.turn);
        self.acted.clear();
        info!(target: "skirmish::session", session = %self.id, participants = self.participants.len(), "combat started");
        Ok(())
    }

    /// `Active → Paused`.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidTransition`] unless active.
    pub fn pause(&mut self) -> Result<(), SessionError> {
        self.expect(SessionStatus::Active, SessionStatus::Paused)?;
        self.status = SessionStatus::Paused;
        Ok(())
    }

    /// `Paused → Active`. The turn timer restarts.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidTransition`] unless paused.
    pub fn resume(&mut self, now_ms: u64) -> Result<(), SessionError> {
        self.expect(SessionStatus::Paused, SessionStatus::Active)?;
        self.status = SessionStatus::Active;
        self.turn_started_ms = now_ms;
        Ok(())
    }

    /// Any non-terminal status `→ Cancelled`.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidTransition`] if already terminal.
    pub fn cancel(&mut self, now_ms: u64) -> Result<(), SessionError> {
        if self.status.is_terminal() {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to: SessionStatus::Cancelled,
            });
        }
        self.status = SessionStatus::Cancelled;
        self.ended_at_ms = Some(now_ms);
        info!(target: "skirmish::session", session = %self.id, "combat cancelled");
        Ok(())
    }

    fn expect(&self, from: SessionStatus, to: SessionStatus) -> Result<(), SessionError> {
        if self.status == from {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                from: self.status,
                to,
            })
        }
    }

    /// Records that `id` used its action this turn.
    pub fn mark_acted(&mut self, id: ParticipantId) {
        self.acted.insert(id);
    }

    /// Finishes the session if at most one team is still in play.
    ///
    /// Returns true if the session is finished after the check.
    pub fn check_victory(&mut self, now_ms: u64) -> bool {
        if !matches!(self.status, SessionStatus::Active | SessionStatus::Paused) {
            return self.status == SessionStatus::Finished;
        }
        let teams = self.teams_in_play();
        if teams.len() > 1 {
            return false;
        }
        self.winner = teams.into_iter().next();
        self.status = SessionStatus::Finished;
        self.ended_at_ms = Some(now_ms);
        match self.winner {
            Some(team) => {
                info!(target: "skirmish::session", session = %self.id, winner = %team, turn = self.turn, "combat finished");
            }
            None => {
                info!(target: "skirmish::session", session = %self.id, turn = self.turn, "combat finished in a draw");
            }
        }
        true
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Commits a change set in order.
    ///
    /// Shields absorb damage before health, health and mana are clamped, and a
    /// participant reaching zero health dies and loses every effect. Changes
    /// aimed at dead participants are skipped.
    pub fn apply_changes(&mut self, changes: &ChangeSet) -> CommitReport {
        let mut report = CommitReport::default();
        for change in &changes.changes {
            self.apply_change(change, &mut report);
        }
        report
    }

    fn apply_change(&mut self, change: &StateChange, report: &mut CommitReport) {
        match change {
            StateChange::Damage { target, amount, .. } => self.apply_damage(*target, *amount, report),
            StateChange::Heal { target, amount } => {
                if let Some(p) = self.participants.get_mut(target) {
                    let applied = p.apply_health_delta(amount.max(0.0));
                    report.entry(*target).health_delta += applied;
                }
            }
            StateChange::SpendMana { target, amount } => {
                if let Some(p) = self.participants.get_mut(target) {
                    let applied = p.apply_mana_delta(-amount.max(0.0));
                    report.entry(*target).mana_delta += applied;
                }
            }
            StateChange::RestoreMana { target, amount } => {
                if let Some(p) = self.participants.get_mut(target) {
                    if p.is_alive() {
                        let applied = p.apply_mana_delta(amount.max(0.0));
                        report.entry(*target).mana_delta += applied;
                    }
                }
            }
            StateChange::ApplyEffect {
                target,
                caster,
                template,
            } => {
                if !self.participants.get(target).is_some_and(Participant::in_play) {
                    return;
                }
                let application = self.effects.apply(template, *target, *caster);
                match &application.outcome {
                    ApplyOutcome::Applied { id } | ApplyOutcome::Replaced { new: id, .. } => {
                        report.entry(*target).effects_added.push(*id);
                        if let Some(effect) = self.find_effect(*target, *id) {
                            report.effects_created.push(effect);
                        }
                    }
                    ApplyOutcome::Stacked { id, .. } | ApplyOutcome::Refreshed { id } => {
                        if let Some(effect) = self.find_effect(*target, *id) {
                            report.effects_updated.push(effect);
                        }
                    }
                    ApplyOutcome::Resisted { .. } => {}
                }
                report.removed(application.removed);
                report.effects_applied.push(AppliedEffect {
                    target: *target,
                    name: template.name.clone(),
                    outcome: application.outcome,
                });
            }
            StateChange::Dispel {
                target,
                dispel,
                max_count,
            } => {
                let removed = self.effects.dispel(*target, *dispel, *max_count);
                report.removed(removed);
            }
            StateChange::Flee { target } => {
                if let Some(p) = self.participants.get_mut(target) {
                    p.mark_fled();
                    report.entry(*target).fled = true;
                    let removed = self.effects.clear_target(*target);
                    report.removed(removed);
                }
            }
            StateChange::Reposition { target, position } => {
                if let Some(p) = self.participants.get_mut(target) {
                    p.position = Some(*position);
                }
            }
        }
    }

    fn apply_damage(&mut self, target: ParticipantId, amount: f32, report: &mut CommitReport) {
        if !self.participants.get(&target).is_some_and(Participant::is_alive) {
            return;
        }
        let absorption = self.effects.absorb_damage(target, amount);
        if absorption.absorbed > 0.0 {
            report.entry(target).shield_absorbed += absorption.absorbed;
            report.effects_updated.extend(
                self.effects
                    .effects_on(target)
                    .iter()
                    .filter(|e| e.kind == EffectKind::Shield)
                    .cloned(),
            );
        }
        report.removed(absorption.depleted);

        let Some(p) = self.participants.get_mut(&target) else {
            return;
        };
        let applied = p.apply_health_delta(-absorption.remaining);
        let died = !p.is_alive();
        report.entry(target).health_delta += applied;
        if died {
            report.entry(target).died = true;
            report.deaths.push(target);
            let removed = self.effects.clear_target(target);
            report.removed(removed);
            debug!(target: "skirmish::session", session = %self.id, participant = %target, "participant died");
        }
    }

    fn find_effect(&self, target: ParticipantId, id: crate::effects::EffectId) -> Option<StatusEffect> {
        self.effects
            .effects_on(target)
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    /// Closes the current turn.
    ///
    /// Checks the win condition, ticks every effect applied before this turn
    /// (periodic damage and healing are applied, shields still absorb), opens
    /// the next turn and checks the win condition again.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidTransition`] unless active.
    pub fn advance_turn(&mut self, now_ms: u64) -> Result<TurnReport, SessionError> {
        if self.status != SessionStatus::Active {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to: SessionStatus::Active,
            });
        }
        let ended_turn = self.turn;
        let mut commit = CommitReport::default();

        if self.check_victory(now_ms) {
            return Ok(self.turn_report(ended_turn, Vec::new(), commit));
        }

        let ticks = self.effects.tick_all();
        for tick in &ticks {
            if tick.damage > 0.0 {
                self.apply_damage(tick.target, tick.damage, &mut commit);
            }
            if tick.healing > 0.0 {
                if let Some(p) = self.participants.get_mut(&tick.target) {
                    let applied = p.apply_health_delta(tick.healing);
                    commit.entry(tick.target).health_delta += applied;
                }
            }
            if tick.expired {
                commit.entry(tick.target).effects_removed.push(tick.effect_id);
            } else if let Some(effect) = self.find_effect(tick.target, tick.effect_id) {
                commit.effects_updated.push(effect);
            }
        }

        self.turn += 1;
        self.turn_started_ms = now_ms;
        self.effects.begin_turn(self.turn);
        self.acted.clear();
        self.check_victory(now_ms);

        debug!(target: "skirmish::session", session = %self.id, turn = self.turn, ticks = ticks.len(), "turn advanced");
        Ok(self.turn_report(ended_turn, ticks, commit))
    }

    fn turn_report(&self, ended_turn: u32, ticks: Vec<TickOutcome>, commit: CommitReport) -> TurnReport {
        TurnReport {
            ended_turn,
            turn: self.turn,
            ticks,
            changes: commit.changes.clone(),
            status: self.status,
            winner: self.winner,
            commit,
        }
    }

    /// Drops inactive effects. Returns how many were dropped.
    pub fn purge_inactive_effects(&mut self) -> usize {
        self.effects.purge_inactive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{EffectTemplate, StatModifier};
    use crate::participant::{CombatStats, StatKind};

    fn p(id: u64, team: u32) -> Participant {
        let mut participant =
            Participant::new(ParticipantId::new(id), TeamId::new(team), CombatStats::default());
        participant.ready = true;
        participant
    }

    fn session_with(participants: Vec<Participant>) -> CombatSession {
        let mut session = CombatSession::new(
            SessionId::new(1),
            SessionSettings::default(),
            &EffectConfig::default(),
            0,
        );
        for participant in participants {
            session.add_participant(participant).unwrap();
        }
        session
    }

    fn active() -> CombatSession {
        let mut session = session_with(vec![p(1, 1), p(2, 2)]);
        session.start(1_000).unwrap();
        session
    }

    fn damage(target: u64, amount: f32) -> StateChange {
        StateChange::Damage {
            source: None,
            target: ParticipantId::new(target),
            amount,
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn start_requires_two_teams() {
            let mut session = session_with(vec![p(1, 1), p(2, 1)]);
            assert_eq!(session.start(0), Err(SessionError::NotEnoughTeams));
        }

        #[test]
        fn start_requires_two_participants() {
            let mut session = session_with(vec![p(1, 1)]);
            assert_eq!(session.start(0), Err(SessionError::NotEnoughParticipants(1)));
        }

        #[test]
        fn start_requires_everyone_ready() {
            let mut lazy = p(2, 2);
            lazy.ready = false;
            let mut session = session_with(vec![p(1, 1), lazy]);
            assert_eq!(session.start(0), Err(SessionError::NotReady(ParticipantId::new(2))));
            session.set_ready(ParticipantId::new(2), true).unwrap();
            assert!(session.start(0).is_ok());
            assert_eq!(session.turn(), 1);
        }

        #[test]
        fn pause_and_resume_round_trip() {
            let mut session = active();
            session.pause().unwrap();
            assert_eq!(session.status(), SessionStatus::Paused);
            assert!(session.pause().is_err());
            session.resume(5_000).unwrap();
            assert_eq!(session.status(), SessionStatus::Active);
            assert_eq!(session.turn_started_ms(), 5_000);
        }

        #[test]
        fn terminal_states_are_final() {
            let mut session = active();
            session.cancel(2_000).unwrap();
            assert!(session.cancel(3_000).is_err());
            assert!(session.resume(3_000).is_err());
            assert_eq!(session.ended_at_ms(), Some(2_000));
        }

        #[test]
        fn join_closes_after_start() {
            let mut session = active();
            assert_eq!(
                session.add_participant(p(3, 1)),
                Err(SessionError::JoinClosed(SessionStatus::Active))
            );
        }

        #[test]
        fn duplicate_join_rejected() {
            let mut session = session_with(vec![p(1, 1)]);
            assert_eq!(
                session.add_participant(p(1, 2)),
                Err(SessionError::DuplicateParticipant(ParticipantId::new(1)))
            );
        }
    }

    mod commit_tests {
        use super::*;

        #[test]
        fn shield_absorbs_before_health() {
            let mut session = active();
            let shield = EffectTemplate::new("ward", EffectKind::Shield, 3).with_magnitude(30.0);
            let mut set = ChangeSet::new();
            set.push(StateChange::ApplyEffect {
                target: ParticipantId::new(2),
                caster: None,
                template: shield,
            });
            set.push(damage(2, 50.0));

            let report = session.apply_changes(&set);

            let change = &report.changes[&ParticipantId::new(2)];
            assert_eq!(change.shield_absorbed, 30.0);
            assert_eq!(change.health_delta, -20.0);
            assert_eq!(session.participant(ParticipantId::new(2)).unwrap().stats.health, 80.0);
            assert_eq!(report.effects_created.len(), 1);
            assert_eq!(report.effects_removed.len(), 1);
        }

        #[test]
        fn lethal_damage_kills_and_clears_effects() {
            let mut session = active();
            let mut set = ChangeSet::new();
            set.push(StateChange::ApplyEffect {
                target: ParticipantId::new(2),
                caster: None,
                template: EffectTemplate::new("haste", EffectKind::Buff, 3)
                    .with_modifier(StatModifier::percentage(StatKind::AttackSpeed, 20.0)),
            });
            set.push(damage(2, 500.0));
            set.push(StateChange::Heal {
                target: ParticipantId::new(2),
                amount: 50.0,
            });

            let report = session.apply_changes(&set);

            let target = session.participant(ParticipantId::new(2)).unwrap();
            assert!(!target.is_alive());
            assert_eq!(target.stats.health, 0.0);
            assert_eq!(report.deaths, vec![ParticipantId::new(2)]);
            assert!(report.changes[&ParticipantId::new(2)].died);
            assert!(session.effects().effects_on(ParticipantId::new(2)).is_empty());
        }

        #[test]
        fn mana_is_clamped() {
            let mut session = active();
            let mut set = ChangeSet::new();
            set.push(StateChange::SpendMana {
                target: ParticipantId::new(1),
                amount: 80.0,
            });
            let report = session.apply_changes(&set);
            assert_eq!(report.changes[&ParticipantId::new(1)].mana_delta, -50.0);
        }

        #[test]
        fn flee_removes_from_play_and_ends_combat() {
            let mut session = active();
            let mut set = ChangeSet::new();
            set.push(StateChange::Flee {
                target: ParticipantId::new(2),
            });
            session.apply_changes(&set);
            assert!(session.check_victory(2_000));
            assert_eq!(session.winner(), Some(TeamId::new(1)));
        }
    }

    mod turn_tests {
        use super::*;

        #[test]
        fn advance_ticks_periodic_effects() {
            let mut session = active();
            let poison = EffectTemplate::new("poison", EffectKind::DamageOverTime, 3)
                .with_magnitude(5.0)
                .with_max_stacks(5);
            let mut set = ChangeSet::new();
            for _ in 0..2 {
                set.push(StateChange::ApplyEffect {
                    target: ParticipantId::new(2),
                    caster: Some(ParticipantId::new(1)),
                    template: poison.clone(),
                });
            }
            session.apply_changes(&set);

            let first = session.advance_turn(2_000).unwrap();
            assert!(first.ticks.is_empty());
            assert_eq!(first.turn, 2);

            let report = session.advance_turn(3_000).unwrap();
            assert_eq!(report.ticks.len(), 1);
            assert_eq!(report.ticks[0].damage, 10.0);
            assert_eq!(report.ticks[0].remaining_turns, 2);
            assert_eq!(report.changes[&ParticipantId::new(2)].health_delta, -10.0);
            assert_eq!(report.turn, 3);
            assert_eq!(session.turn_started_ms(), 3_000);
        }

        #[test]
        fn advance_clears_acted_set() {
            let mut session = active();
            session.mark_acted(ParticipantId::new(1));
            session.mark_acted(ParticipantId::new(2));
            assert!(session.all_acted());
            session.advance_turn(2_000).unwrap();
            assert!(!session.has_acted(ParticipantId::new(1)));
        }

        #[test]
        fn dot_death_finishes_session() {
            let mut session = active();
            let mut set = ChangeSet::new();
            set.push(damage(2, 95.0));
            set.push(StateChange::ApplyEffect {
                target: ParticipantId::new(2),
                caster: Some(ParticipantId::new(1)),
                template: EffectTemplate::new("bleed", EffectKind::DamageOverTime, 2).with_magnitude(10.0),
            });
            session.apply_changes(&set);

            assert_eq!(session.advance_turn(2_000).unwrap().status, SessionStatus::Active);
            let report = session.advance_turn(3_000).unwrap();

            assert_eq!(report.status, SessionStatus::Finished);
            assert_eq!(report.winner, Some(TeamId::new(1)));
        }

        #[test]
        fn advance_rejected_when_not_active() {
            let mut session = active();
            session.pause().unwrap();
            assert!(session.advance_turn(2_000).is_err());
        }

        #[test]
        fn turn_expiry_uses_time_limit() {
            let session = active();
            assert!(!session.turn_expired(1_000 + 29_999));
            assert!(session.turn_expired(1_000 + 30_000));
        }

        #[test]
        fn turn_order_follows_effective_speed() {
            let mut fast = p(3, 2);
            fast.stats.attack_speed = 14.0;
            let mut session = session_with(vec![p(1, 1), p(2, 2), fast]);
            session.start(1_000).unwrap();
            let one = ParticipantId::new(1);
            let two = ParticipantId::new(2);
            let three = ParticipantId::new(3);
            assert_eq!(session.turn_order(), vec![three, one, two]);

            let mut set = ChangeSet::new();
            set.push(StateChange::ApplyEffect {
                target: two,
                caster: None,
                template: EffectTemplate::new("haste", EffectKind::Buff, 2)
                    .with_modifier(StatModifier::percentage(StatKind::AttackSpeed, 50.0)),
            });
            session.apply_changes(&set);
            assert_eq!(session.turn_order(), vec![two, three, one]);

            session.mark_acted(two);
            assert_eq!(session.next_actor(), Some(three));
        }

        #[test]
        fn stunned_participants_are_not_eligible() {
            let mut session = active();
            let mut set = ChangeSet::new();
            set.push(StateChange::ApplyEffect {
                target: ParticipantId::new(2),
                caster: None,
                template: EffectTemplate::new("stun", EffectKind::Stun, 1),
            });
            session.apply_changes(&set);
            assert_eq!(session.eligible_actors(), vec![ParticipantId::new(1)]);

            // A one-turn stun still holds for the whole next turn
            session.advance_turn(2_000).unwrap();
            assert_eq!(session.eligible_actors(), vec![ParticipantId::new(1)]);
            session.advance_turn(3_000).unwrap();
            assert_eq!(session.eligible_actors().len(), 2);
        }
    }

    #[test]
    fn everyone_dead_is_a_draw() {
        let mut session = active();
        let mut set = ChangeSet::new();
        set.push(damage(1, 500.0));
        set.push(damage(2, 500.0));
        session.apply_changes(&set);
        assert!(session.check_victory(3_000));
        assert_eq!(session.status(), SessionStatus::Finished);
        assert_eq!(session.winner(), None);
    }
}
