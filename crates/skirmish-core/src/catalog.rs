//! Skill and item definitions.
//!
//! The catalog is static content: what each skill costs, whom it targets, how
//! hard it hits and which effects it carries. It is loaded once (usually from
//! JSON) and shared read-only by every session.
//!
//! # Example
//!
//! ```
//! use skirmish_core::catalog::{Catalog, DamageKind, Skill, SkillId, TargetType};
//!
//! let mut catalog = Catalog::new();
//! catalog.insert_skill(
//!     Skill::new("fireball", TargetType::SingleEnemy, DamageKind::Magical)
//!         .with_damage(30.0)
//!         .with_mana_cost(15.0),
//! );
//!
//! let fireball = catalog.skill(&SkillId::new("fireball")).unwrap();
//! assert_eq!(fireball.mana_cost, 15.0);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::effects::{DispelType, EffectTemplate};
use crate::error::ConfigError;

/// Identifier of a skill.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillId(String);

impl SkillId {
    /// Creates a new `SkillId`.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SkillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SkillId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of an item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Creates a new `ItemId`.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Who a skill may be aimed at.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// One living enemy (explicit target required)
    SingleEnemy,
    /// One living ally or self (defaults to self)
    SingleAlly,
    /// The caster only
    SelfOnly,
    /// Every living enemy
    AllEnemies,
    /// Every living ally including the caster
    AllAllies,
}

impl TargetType {
    /// Returns true if the request must name a target.
    #[must_use]
    pub const fn requires_target(self) -> bool {
        matches!(self, Self::SingleEnemy)
    }

    /// Returns true if the skill is aimed at the caster's side.
    #[must_use]
    pub const fn is_friendly(self) -> bool {
        matches!(self, Self::SingleAlly | Self::SelfOnly | Self::AllAllies)
    }
}

/// Mitigation school of a damaging skill.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageKind {
    /// Scales with physical damage, mitigated by physical defense
    #[default]
    Physical,
    /// Scales with magical damage, mitigated by magical defense
    Magical,
    /// Scales with physical damage, ignores mitigation and blocks
    True,
}

/// Per-skill tuning of the crit roll.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillModifiers {
    /// Added to the caster's crit chance before clamping
    pub crit_chance_bonus: f32,
    /// Replaces the default crit multiplier outright when set
    pub critical_multiplier: Option<f32>,
}

/// Who receives a skill's effect.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectTarget {
    /// Each resolved target of the skill
    #[default]
    Target,
    /// The caster
    Caster,
}

fn certain() -> f32 {
    1.0
}

/// An effect a skill may apply, with its proc chance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillEffect {
    /// Blueprint
    pub template: EffectTemplate,
    /// Probability of applying (0.0 - 1.0)
    #[serde(default = "certain")]
    pub chance: f32,
    /// Recipient
    #[serde(default)]
    pub target: EffectTarget,
}

/// Extra conditions a skill imposes.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "threshold", rename_all = "snake_case")]
pub enum SkillRequirement {
    /// Caster health fraction must be strictly below the threshold
    CasterHealthBelow(f32),
    /// Target health fraction must be strictly below the threshold
    TargetHealthBelow(f32),
}

/// A castable skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    /// Skill id
    pub id: SkillId,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Mana spent on cast
    #[serde(default)]
    pub mana_cost: f32,
    /// Turns before the skill can be cast again (0 = no cooldown)
    #[serde(default)]
    pub cooldown_turns: u32,
    /// Targeting rule
    pub target_type: TargetType,
    /// Mitigation school
    #[serde(default)]
    pub damage_kind: DamageKind,
    /// Base damage before stat scaling (0 = non-damaging)
    #[serde(default)]
    pub base_damage: f32,
    /// Base healing before stat scaling (0 = non-healing)
    #[serde(default)]
    pub base_healing: f32,
    /// Crit tuning
    #[serde(default)]
    pub modifiers: SkillModifiers,
    /// Effects applied on resolution
    #[serde(default)]
    pub effects: Vec<SkillEffect>,
    /// Extra conditions
    #[serde(default)]
    pub requirements: Vec<SkillRequirement>,
}

impl Skill {
    /// Creates a skill with no cost, damage, healing or effects.
    #[must_use]
    pub fn new(id: &str, target_type: TargetType, damage_kind: DamageKind) -> Self {
        Self {
            id: SkillId::new(id),
            name: id.to_string(),
            mana_cost: 0.0,
            cooldown_turns: 0,
            target_type,
            damage_kind,
            base_damage: 0.0,
            base_healing: 0.0,
            modifiers: SkillModifiers::default(),
            effects: Vec::new(),
            requirements: Vec::new(),
        }
    }

    /// Sets base damage.
    #[must_use]
    pub fn with_damage(mut self, base_damage: f32) -> Self {
        self.base_damage = base_damage;
        self
    }

    /// Sets base healing.
    #[must_use]
    pub fn with_healing(mut self, base_healing: f32) -> Self {
        self.base_healing = base_healing;
        self
    }

    /// Sets the mana cost.
    #[must_use]
    pub fn with_mana_cost(mut self, mana_cost: f32) -> Self {
        self.mana_cost = mana_cost;
        self
    }

    /// Sets the cooldown in turns.
    #[must_use]
    pub fn with_cooldown(mut self, turns: u32) -> Self {
        self.cooldown_turns = turns;
        self
    }

    /// Sets crit tuning.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: SkillModifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Adds an effect.
    #[must_use]
    pub fn with_effect(mut self, template: EffectTemplate, chance: f32, target: EffectTarget) -> Self {
        self.effects.push(SkillEffect {
            template,
            chance,
            target,
        });
        self
    }

    /// Adds a requirement.
    #[must_use]
    pub fn with_requirement(mut self, requirement: SkillRequirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Returns true if the skill deals damage.
    #[must_use]
    pub fn is_damaging(&self) -> bool {
        self.base_damage > 0.0
    }

    /// Returns true if the skill heals.
    #[must_use]
    pub fn is_healing(&self) -> bool {
        self.base_healing > 0.0
    }
}

/// What using an item does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemEffect {
    /// Restore a fixed amount of health
    RestoreHealth {
        /// Amount restored
        amount: f32,
    },
    /// Restore a fixed amount of mana
    RestoreMana {
        /// Amount restored
        amount: f32,
    },
    /// Apply a status effect
    ApplyEffect {
        /// Blueprint
        template: EffectTemplate,
    },
    /// Remove harmful effects
    Cleanse {
        /// Dispel filter
        dispel: DispelType,
        /// Maximum number of effects removed
        max_count: usize,
    },
}

/// A usable item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Item id
    pub id: ItemId,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Effect on use
    pub effect: ItemEffect,
}

impl Item {
    /// Creates an item.
    #[must_use]
    pub fn new(id: &str, effect: ItemEffect) -> Self {
        Self {
            id: ItemId::new(id),
            name: id.to_string(),
            effect,
        }
    }
}

/// Skills and items available to every session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, with = "keyed_skills")]
    skills: BTreeMap<SkillId, Skill>,
    #[serde(default, with = "keyed_items")]
    items: BTreeMap<ItemId, Item>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a catalog from JSON of the form `{"skills": [...], "items": [...]}`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed JSON and
    /// [`ConfigError::Invalid`] if a definition is out of range.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Loads a catalog from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`Catalog::from_json_str`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Adds or replaces a skill.
    pub fn insert_skill(&mut self, skill: Skill) {
        self.skills.insert(skill.id.clone(), skill);
    }

    /// Adds or replaces an item.
    pub fn insert_item(&mut self, item: Item) {
        self.items.insert(item.id.clone(), item);
    }

    /// Looks up a skill.
    #[must_use]
    pub fn skill(&self, id: &SkillId) -> Option<&Skill> {
        self.skills.get(id)
    }

    /// Looks up an item.
    #[must_use]
    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    /// All skills in id order.
    pub fn skills(&self) -> impl Iterator<Item = &Skill> {
        self.skills.values()
    }

    /// All items in id order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    /// Checks that costs, chances and multipliers are in range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending definition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for skill in self.skills.values() {
            if skill.mana_cost < 0.0 || skill.base_damage < 0.0 || skill.base_healing < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "skill {} has a negative cost, damage or healing",
                    skill.id
                )));
            }
            if skill.modifiers.critical_multiplier.is_some_and(|m| m < 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "skill {} has a critical multiplier below 1.0",
                    skill.id
                )));
            }
            if let Some(effect) = skill
                .effects
                .iter()
                .find(|e| !(0.0..=1.0).contains(&e.chance))
            {
                return Err(ConfigError::Invalid(format!(
                    "skill {} effect {} has chance {} outside [0, 1]",
                    skill.id, effect.template.name, effect.chance
                )));
            }
        }
        Ok(())
    }
}

mod keyed_skills {
    use super::{Skill, SkillId};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(map: &BTreeMap<SkillId, Skill>, s: S) -> Result<S::Ok, S::Error> {
        let list: Vec<&Skill> = map.values().collect();
        list.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<SkillId, Skill>, D::Error> {
        let list = Vec::<Skill>::deserialize(d)?;
        Ok(list.into_iter().map(|s| (s.id.clone(), s)).collect())
    }
}

mod keyed_items {
    use super::{Item, ItemId};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(map: &BTreeMap<ItemId, Item>, s: S) -> Result<S::Ok, S::Error> {
        let list: Vec<&Item> = map.values().collect();
        list.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<ItemId, Item>, D::Error> {
        let list = Vec::<Item>::deserialize(d)?;
        Ok(list.into_iter().map(|i| (i.id.clone(), i)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::EffectKind;

    const CATALOG_JSON: &str = r#"{
        "skills": [
            {
                "id": "fireball",
                "name": "Fireball",
                "mana_cost": 15,
                "cooldown_turns": 2,
                "target_type": "single_enemy",
                "damage_kind": "magical",
                "base_damage": 30,
                "modifiers": { "critical_multiplier": 2.5 },
                "effects": [
                    { "template": { "name": "burn", "kind": "damage_over_time", "magnitude": 4, "duration": 2 },
                      "chance": 0.3 }
                ]
            },
            {
                "id": "execute",
                "target_type": "single_enemy",
                "base_damage": 50,
                "requirements": [ { "kind": "target_health_below", "threshold": 0.25 } ]
            }
        ],
        "items": [
            { "id": "potion", "effect": { "kind": "restore_health", "amount": 40 } },
            { "id": "antidote", "effect": { "kind": "cleanse", "dispel": "poison", "max_count": 2 } }
        ]
    }"#;

    #[test]
    fn parses_catalog_json() {
        let catalog = Catalog::from_json_str(CATALOG_JSON).unwrap();
        let fireball = catalog.skill(&SkillId::new("fireball")).unwrap();
        assert_eq!(fireball.damage_kind, DamageKind::Magical);
        assert_eq!(fireball.modifiers.critical_multiplier, Some(2.5));
        assert_eq!(fireball.effects[0].template.kind, EffectKind::DamageOverTime);
        assert_eq!(fireball.effects[0].target, EffectTarget::Target);

        let execute = catalog.skill(&SkillId::new("execute")).unwrap();
        assert_eq!(execute.damage_kind, DamageKind::Physical);
        assert_eq!(
            execute.requirements,
            vec![SkillRequirement::TargetHealthBelow(0.25)]
        );

        let antidote = catalog.item(&ItemId::new("antidote")).unwrap();
        assert_eq!(
            antidote.effect,
            ItemEffect::Cleanse {
                dispel: DispelType::Poison,
                max_count: 2
            }
        );
    }

    #[test]
    fn rejects_out_of_range_effect_chance() {
        let json = r#"{"skills":[{"id":"bad","target_type":"self_only",
            "effects":[{"template":{"name":"x","kind":"buff","duration":1},"chance":1.5}]}]}"#;
        assert!(matches!(
            Catalog::from_json_str(json),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            Catalog::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn target_type_rules() {
        assert!(TargetType::SingleEnemy.requires_target());
        assert!(!TargetType::SingleAlly.requires_target());
        assert!(TargetType::AllAllies.is_friendly());
        assert!(!TargetType::AllEnemies.is_friendly());
    }

    #[test]
    fn round_trips_through_json() {
        let catalog = Catalog::from_json_str(CATALOG_JSON).unwrap();
        let json = serde_json::to_string(&catalog).unwrap();
        assert_eq!(Catalog::from_json_str(&json).unwrap(), catalog);
    }
}
