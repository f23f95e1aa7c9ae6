//! Action requests, records and results.
//!
//! - [`ActionRequest`]: What a client submits
//! - [`StateChange`] / [`ChangeSet`]: Deltas the pipeline plans and the session commits
//! - [`ActionRecord`]: The persisted, immutable account of one submitted action
//! - [`ActionResult`]: Everything returned to the caller after resolution

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::anticheat::{Decision, Verdict};
use crate::catalog::{ItemId, SkillId};
use crate::effects::{ApplyOutcome, DispelType, EffectId, EffectTemplate};
use crate::error::ActionRejection;
use crate::participant::{ParticipantId, TeamId};
use crate::session::{SessionId, SessionStatus};

// ============================================================================
// Requests
// ============================================================================

/// Kind of action a participant can take on their turn.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Single-target basic attack
    Attack,
    /// Cast a catalog skill
    Skill,
    /// Use a catalog item
    Item,
    /// Halve incoming damage until the turn ends
    Defend,
    /// Try to leave combat
    Flee,
    /// Skip the turn and regenerate mana
    Wait,
}

impl ActionType {
    /// Snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Attack => "attack",
            Self::Skill => "skill",
            Self::Item => "item",
            Self::Defend => "defend",
            Self::Flee => "flee",
            Self::Wait => "wait",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = ActionRejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "attack" => Ok(Self::Attack),
            "skill" => Ok(Self::Skill),
            "item" => Ok(Self::Item),
            "defend" => Ok(Self::Defend),
            "flee" => Ok(Self::Flee),
            "wait" => Ok(Self::Wait),
            other => Err(ActionRejection::UnknownActionType(other.to_string())),
        }
    }
}

/// A submitted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Acting participant
    pub actor: ParticipantId,
    /// Action kind
    pub action_type: ActionType,
    /// Target participant, where the action takes one
    #[serde(default)]
    pub target: Option<ParticipantId>,
    /// Skill to cast
    #[serde(default)]
    pub skill: Option<SkillId>,
    /// Item to use
    #[serde(default)]
    pub item: Option<ItemId>,
    /// Client send time (ms)
    #[serde(default)]
    pub client_timestamp: Option<u64>,
    /// Client-reported position
    #[serde(default)]
    pub position: Option<Vec2>,
    /// Damage the client claims the action deals
    #[serde(default)]
    pub reported_damage: Option<f32>,
}

/// Wire shape with the action type still a string.
#[derive(Deserialize)]
struct RawActionRequest {
    actor: ParticipantId,
    action_type: String,
    #[serde(default)]
    target: Option<ParticipantId>,
    #[serde(default)]
    skill: Option<SkillId>,
    #[serde(default)]
    item: Option<ItemId>,
    #[serde(default)]
    client_timestamp: Option<u64>,
    #[serde(default)]
    position: Option<Vec2>,
    #[serde(default)]
    reported_damage: Option<f32>,
}

impl ActionRequest {
    fn new(actor: ParticipantId, action_type: ActionType) -> Self {
        Self {
            actor,
            action_type,
            target: None,
            skill: None,
            item: None,
            client_timestamp: None,
            position: None,
            reported_damage: None,
        }
    }

    /// Parses a request from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ActionRejection::UnknownActionType`] for an unrecognized
    /// `action_type` and [`ActionRejection::Malformed`] for anything else that
    /// fails to parse.
    pub fn from_json(json: &str) -> Result<Self, ActionRejection> {
        let raw: RawActionRequest =
            serde_json::from_str(json).map_err(|e| ActionRejection::Malformed(e.to_string()))?;
        Ok(Self {
            actor: raw.actor,
            action_type: raw.action_type.parse()?,
            target: raw.target,
            skill: raw.skill,
            item: raw.item,
            client_timestamp: raw.client_timestamp,
            position: raw.position,
            reported_damage: raw.reported_damage,
        })
    }

    /// Basic attack on `target`.
    #[must_use]
    pub fn attack(actor: ParticipantId, target: ParticipantId) -> Self {
        Self {
            target: Some(target),
            ..Self::new(actor, ActionType::Attack)
        }
    }

    /// Skill cast, optionally aimed at `target`.
    #[must_use]
    pub fn skill(actor: ParticipantId, skill: &str, target: Option<ParticipantId>) -> Self {
        Self {
            target,
            skill: Some(SkillId::new(skill)),
            ..Self::new(actor, ActionType::Skill)
        }
    }

    /// Item use, optionally on an ally.
    #[must_use]
    pub fn item(actor: ParticipantId, item: &str, target: Option<ParticipantId>) -> Self {
        Self {
            target,
            item: Some(ItemId::new(item)),
            ..Self::new(actor, ActionType::Item)
        }
    }

    /// Defend.
    #[must_use]
    pub fn defend(actor: ParticipantId) -> Self {
        Self::new(actor, ActionType::Defend)
    }

    /// Flee attempt.
    #[must_use]
    pub fn flee(actor: ParticipantId) -> Self {
        Self::new(actor, ActionType::Flee)
    }

    /// Wait.
    #[must_use]
    pub fn wait(actor: ParticipantId) -> Self {
        Self::new(actor, ActionType::Wait)
    }

    /// Sets the client timestamp.
    #[must_use]
    pub fn at(mut self, client_timestamp: u64) -> Self {
        self.client_timestamp = Some(client_timestamp);
        self
    }

    /// Sets the reported position.
    #[must_use]
    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = Some(position);
        self
    }

    /// Sets the reported damage.
    #[must_use]
    pub fn with_reported_damage(mut self, damage: f32) -> Self {
        self.reported_damage = Some(damage);
        self
    }
}

// ============================================================================
// Planned changes
// ============================================================================

/// A single delta proposed by the pipeline.
///
/// Nothing is mutated until the whole [`ChangeSet`] is committed by the
/// session, so a rejected action leaves no trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum StateChange {
    /// Damage, absorbed by shields before health
    Damage {
        /// Dealer, if any
        source: Option<ParticipantId>,
        /// Receiver
        target: ParticipantId,
        /// Amount before shields
        amount: f32,
    },
    /// Healing, clamped at max health
    Heal {
        /// Receiver
        target: ParticipantId,
        /// Amount before clamping
        amount: f32,
    },
    /// Mana paid for a skill
    SpendMana {
        /// Payer
        target: ParticipantId,
        /// Amount
        amount: f32,
    },
    /// Mana restored
    RestoreMana {
        /// Receiver
        target: ParticipantId,
        /// Amount before clamping
        amount: f32,
    },
    /// Status effect application
    ApplyEffect {
        /// Receiver
        target: ParticipantId,
        /// Applier
        caster: Option<ParticipantId>,
        /// Blueprint
        template: EffectTemplate,
    },
    /// Dispel on a target
    Dispel {
        /// Target
        target: ParticipantId,
        /// Filter
        dispel: DispelType,
        /// Maximum removed
        max_count: usize,
    },
    /// Successful flee
    Flee {
        /// Participant leaving combat
        target: ParticipantId,
    },
    /// Accepted client position
    Reposition {
        /// Participant
        target: ParticipantId,
        /// New position
        position: Vec2,
    },
}

/// Ordered list of deltas plus the log lines describing them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Deltas in application order
    pub changes: Vec<StateChange>,
    /// Human-readable log
    pub logs: Vec<String>,
}

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a delta.
    pub fn push(&mut self, change: StateChange) {
        self.changes.push(change);
    }

    /// Appends a log line.
    pub fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    /// Returns true if there are no deltas.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Net effect of one commit (or turn advance) on one participant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParticipantChange {
    /// Health gained (positive) or lost (negative)
    pub health_delta: f32,
    /// Mana gained (positive) or lost (negative)
    pub mana_delta: f32,
    /// Damage soaked by shields
    pub shield_absorbed: f32,
    /// Effect instances added
    pub effects_added: Vec<EffectId>,
    /// Effect instances removed
    pub effects_removed: Vec<EffectId>,
    /// Died during this change
    pub died: bool,
    /// Fled during this change
    pub fled: bool,
}

/// One effect application attempt and how it went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedEffect {
    /// Receiver
    pub target: ParticipantId,
    /// Effect name
    pub name: String,
    /// Outcome
    pub outcome: ApplyOutcome,
}

// ============================================================================
// Records and results
// ============================================================================

/// Whether an action passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Validation {
    /// Resolved
    Accepted,
    /// Rejected before any mutation
    Rejected {
        /// Stable code
        code: String,
        /// Human-readable reason
        reason: String,
    },
}

/// Persisted account of one submitted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Session
    pub session: SessionId,
    /// Actor
    pub actor: ParticipantId,
    /// Target, if any
    pub target: Option<ParticipantId>,
    /// Action kind
    pub action_type: ActionType,
    /// Skill cast
    pub skill: Option<SkillId>,
    /// Item used
    pub item: Option<ItemId>,
    /// Damage rolled across all targets (before shields)
    pub damage_dealt: f32,
    /// Effective healing across all targets
    pub healing_done: f32,
    /// Any hit or heal was critical
    pub critical: bool,
    /// Every attack roll missed
    pub missed: bool,
    /// Any hit was blocked
    pub blocked: bool,
    /// Mana spent
    pub mana_used: f32,
    /// Turn the action resolved on
    pub turn: u32,
    /// Turn-order value (higher acts first)
    pub action_order: f32,
    /// Client-side processing time (ms)
    pub processing_time_ms: Option<u64>,
    /// Server receive time (ms)
    pub received_at_ms: u64,
    /// Validation outcome
    pub validation: Validation,
}

impl ActionRecord {
    /// Blank record for a request, filled in as resolution proceeds.
    #[must_use]
    pub fn for_request(session: SessionId, request: &ActionRequest, turn: u32, now_ms: u64) -> Self {
        Self {
            session,
            actor: request.actor,
            target: request.target,
            action_type: request.action_type,
            skill: request.skill.clone(),
            item: request.item.clone(),
            damage_dealt: 0.0,
            healing_done: 0.0,
            critical: false,
            missed: false,
            blocked: false,
            mana_used: 0.0,
            turn,
            action_order: 0.0,
            processing_time_ms: None,
            received_at_ms: now_ms,
            validation: Validation::Accepted,
        }
    }

    /// Returns true if the action was resolved.
    #[must_use]
    pub fn accepted(&self) -> bool {
        self.validation == Validation::Accepted
    }
}

/// Anti-cheat summary attached to a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiCheatReport {
    /// Whether anything looked off
    pub suspicious: bool,
    /// Score after this action
    pub score: f32,
    /// Flags raised by this action
    pub flags: Vec<String>,
    /// Decision
    pub action: Decision,
}

impl Default for AntiCheatReport {
    fn default() -> Self {
        Self {
            suspicious: false,
            score: 0.0,
            flags: Vec::new(),
            action: Decision::Allow,
        }
    }
}

impl From<&Verdict> for AntiCheatReport {
    fn from(verdict: &Verdict) -> Self {
        Self {
            suspicious: verdict.suspicious(),
            score: verdict.score,
            flags: verdict
                .flags
                .labels()
                .into_iter()
                .map(str::to_string)
                .collect(),
            action: verdict.decision,
        }
    }
}

/// Everything the caller learns about one submitted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Whether the action resolved
    pub success: bool,
    /// Stable rejection code, when rejected
    pub code: Option<String>,
    /// Rejection reason, when rejected
    pub reason: Option<String>,
    /// The action record
    pub action: ActionRecord,
    /// Effect application attempts
    pub effects_applied: Vec<AppliedEffect>,
    /// Net change per touched participant
    pub changes: BTreeMap<ParticipantId, ParticipantChange>,
    /// Human-readable log
    pub logs: Vec<String>,
    /// Anti-cheat summary
    pub anti_cheat: AntiCheatReport,
    /// Session status after the action
    pub session_status: SessionStatus,
    /// Winning team, if the action ended the session
    pub winner: Option<TeamId>,
}

impl ActionResult {
    /// Result for a rejected action.
    #[must_use]
    pub fn rejected(
        mut action: ActionRecord,
        rejection: &ActionRejection,
        anti_cheat: AntiCheatReport,
        session_status: SessionStatus,
    ) -> Self {
        action.validation = Validation::Rejected {
            code: rejection.code().to_string(),
            reason: rejection.to_string(),
        };
        Self {
            success: false,
            code: Some(rejection.code().to_string()),
            reason: Some(rejection.to_string()),
            action,
            effects_applied: Vec::new(),
            changes: BTreeMap::new(),
            logs: Vec::new(),
            anti_cheat,
            session_status,
            winner: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_type_parses_known_names() {
        assert_eq!("defend".parse::<ActionType>().unwrap(), ActionType::Defend);
        assert_eq!(
            "dance".parse::<ActionType>(),
            Err(ActionRejection::UnknownActionType("dance".into()))
        );
    }

    #[test]
    fn request_from_json() {
        let json = r#"{"actor": 3, "action_type": "skill", "skill": "fireball",
                       "target": 4, "client_timestamp": 1000, "position": [1.0, 2.0]}"#;
        let request = ActionRequest::from_json(json).unwrap();
        assert_eq!(request.actor, ParticipantId::new(3));
        assert_eq!(request.action_type, ActionType::Skill);
        assert_eq!(request.skill, Some(SkillId::new("fireball")));
        assert_eq!(request.position, Some(Vec2::new(1.0, 2.0)));
    }

    #[test]
    fn unknown_action_type_in_json_is_rejected() {
        let json = r#"{"actor": 3, "action_type": "teleport"}"#;
        assert_eq!(
            ActionRequest::from_json(json),
            Err(ActionRejection::UnknownActionType("teleport".into()))
        );
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            ActionRequest::from_json("{\"actor\": \"x\"}"),
            Err(ActionRejection::Malformed(_))
        ));
    }

    #[test]
    fn rejected_result_carries_reason() {
        let request = ActionRequest::wait(ParticipantId::new(1));
        let record = ActionRecord::for_request(SessionId::new(1), &request, 2, 500);
        let result = ActionResult::rejected(
            record,
            &ActionRejection::ItemsDisabled,
            AntiCheatReport::default(),
            SessionStatus::Active,
        );
        assert!(!result.success);
        assert_eq!(result.code.as_deref(), Some("RULE_ITEMS_DISABLED"));
        assert!(!result.action.accepted());
        assert!(result.changes.is_empty());
    }
}
