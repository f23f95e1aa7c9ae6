//! Error types.
//!
//! Rejected actions carry an [`ActionRejection`]; the result's reason string is
//! its `Display` output and its [`code`](ActionRejection::code) is stable for
//! clients. Store failures ([`StoreError`]) never reach callers of the engine,
//! they are logged and swallowed.

use thiserror::Error;

use crate::anticheat::SuspicionFlags;
use crate::catalog::{ItemId, SkillId};
use crate::participant::ParticipantId;
use crate::session::{SessionId, SessionStatus};

/// Broad class of a rejection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCategory {
    /// Malformed or incomplete request
    Validation,
    /// Request is well-formed but breaks a combat rule
    GameRule,
    /// Blocked by the suspicion gate
    AntiCheat,
    /// Session does not accept actions
    Session,
}

/// Why an action was not resolved.
///
/// Every variant leaves the session untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionRejection {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("unknown action type '{0}'")]
    UnknownActionType(String),

    #[error("{action} requires a target")]
    TargetMissing { action: &'static str },

    #[error("skill action requires a skill id")]
    SkillMissing,

    #[error("item action requires an item id")]
    ItemMissing,

    #[error("unknown skill '{0}'")]
    UnknownSkill(SkillId),

    #[error("unknown item '{0}'")]
    UnknownItem(ItemId),

    #[error("participant {0} is not in this session")]
    UnknownParticipant(ParticipantId),

    #[error("session is {0} and accepts no actions")]
    SessionNotActive(SessionStatus),

    #[error("participant {0} is dead")]
    ActorDead(ParticipantId),

    #[error("participant {0} has fled")]
    ActorFled(ParticipantId),

    #[error("participant {0} is stunned")]
    ActorStunned(ParticipantId),

    #[error("participant {actor} already acted on turn {turn}")]
    AlreadyActed { actor: ParticipantId, turn: u32 },

    #[error("participant {actor} must wait for {next} to act")]
    OutOfTurn { actor: ParticipantId, next: ParticipantId },

    #[error("participant {0} is silenced")]
    Silenced(ParticipantId),

    #[error("invalid target {target}: {reason}")]
    InvalidTarget {
        target: ParticipantId,
        reason: &'static str,
    },

    #[error("team damage is disabled; {target} is an ally")]
    AllyFire { target: ParticipantId },

    #[error("insufficient mana: {required} required, {available} available")]
    InsufficientMana { required: f32, available: f32 },

    #[error("skill '{skill}' is on cooldown for {turns_remaining} more turn(s)")]
    OnCooldown { skill: SkillId, turns_remaining: u32 },

    #[error("requirement not met: {0}")]
    RequirementNotMet(String),

    #[error("items are disabled in this session")]
    ItemsDisabled,

    #[error("fleeing is disabled in this session")]
    FleeDisabled,

    #[error("action blocked by anti-cheat (score {score:.0}, flags: {flags})")]
    Blocked { score: f32, flags: SuspicionFlags },

    #[error("participant {actor} is banned until {until_ms}")]
    Banned { actor: ParticipantId, until_ms: u64 },
}

impl ActionRejection {
    /// Broad category of the rejection.
    #[must_use]
    pub fn category(&self) -> RejectionCategory {
        match self {
            Self::Malformed(_)
            | Self::UnknownActionType(_)
            | Self::TargetMissing { .. }
            | Self::SkillMissing
            | Self::ItemMissing
            | Self::UnknownSkill(_)
            | Self::UnknownItem(_)
            | Self::UnknownParticipant(_) => RejectionCategory::Validation,
            Self::SessionNotActive(_) => RejectionCategory::Session,
            Self::Blocked { .. } | Self::Banned { .. } => RejectionCategory::AntiCheat,
            Self::ActorDead(_)
            | Self::ActorFled(_)
            | Self::ActorStunned(_)
            | Self::AlreadyActed { .. }
            | Self::OutOfTurn { .. }
            | Self::Silenced(_)
            | Self::InvalidTarget { .. }
            | Self::AllyFire { .. }
            | Self::InsufficientMana { .. }
            | Self::OnCooldown { .. }
            | Self::RequirementNotMet(_)
            | Self::ItemsDisabled
            | Self::FleeDisabled => RejectionCategory::GameRule,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "ACTION_MALFORMED",
            Self::UnknownActionType(_) => "ACTION_UNKNOWN_TYPE",
            Self::TargetMissing { .. } => "ACTION_TARGET_MISSING",
            Self::SkillMissing => "ACTION_SKILL_MISSING",
            Self::ItemMissing => "ACTION_ITEM_MISSING",
            Self::UnknownSkill(_) => "ACTION_UNKNOWN_SKILL",
            Self::UnknownItem(_) => "ACTION_UNKNOWN_ITEM",
            Self::UnknownParticipant(_) => "ACTION_UNKNOWN_PARTICIPANT",
            Self::SessionNotActive(_) => "SESSION_NOT_ACTIVE",
            Self::ActorDead(_) => "ACTOR_DEAD",
            Self::ActorFled(_) => "ACTOR_FLED",
            Self::ActorStunned(_) => "ACTOR_STUNNED",
            Self::AlreadyActed { .. } => "ACTOR_ALREADY_ACTED",
            Self::OutOfTurn { .. } => "ACTOR_OUT_OF_TURN",
            Self::Silenced(_) => "ACTOR_SILENCED",
            Self::InvalidTarget { .. } => "TARGET_INVALID",
            Self::AllyFire { .. } => "TARGET_ALLY_FIRE",
            Self::InsufficientMana { .. } => "RESOURCE_INSUFFICIENT_MANA",
            Self::OnCooldown { .. } => "SKILL_ON_COOLDOWN",
            Self::RequirementNotMet(_) => "SKILL_REQUIREMENT_NOT_MET",
            Self::ItemsDisabled => "RULE_ITEMS_DISABLED",
            Self::FleeDisabled => "RULE_FLEE_DISABLED",
            Self::Blocked { .. } => "ANTICHEAT_BLOCKED",
            Self::Banned { .. } => "ANTICHEAT_BANNED",
        }
    }
}

/// Lifecycle violations on a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot move session from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("at least 2 participants are required, found {0}")]
    NotEnoughParticipants(usize),

    #[error("participants must span at least 2 teams")]
    NotEnoughTeams,

    #[error("participant {0} is not ready")]
    NotReady(ParticipantId),

    #[error("participant {0} already joined")]
    DuplicateParticipant(ParticipantId),

    #[error("participant {0} is not in this session")]
    UnknownParticipant(ParticipantId),

    #[error("participants can only join a waiting session (session is {0})")]
    JoinClosed(SessionStatus),
}

/// Failures reported by a [`CombatStore`](crate::persistence::CombatStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Failures loading configuration or content.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failures returned by [`CombatEngine`](crate::engine::CombatEngine) calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error(transparent)]
    Session(#[from] SessionError),
}
