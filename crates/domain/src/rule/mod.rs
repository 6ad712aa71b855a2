//! Trigger rules: a condition tree plus an action chain and firing gates.
//!
//! A [`Rule`] fires when its root group (`logic` over `conditions`) holds
//! and every gate (cooldown, max count, probability) lets it through. Gates
//! are applied by the scheduler in the app crate; this module only carries
//! the data and its invariants.

mod action;
mod condition;

pub use action::{
    Action, Delay, FadeOut, InvalidAction, LockInteraction, MoveTo, PluginAction, QueryLlm,
    RandomBranch, RandomGroup, Speak,
};
pub use condition::{
    ClickWindow, ConditionGroup, ConditionNode, ConditionPath, DateMatch, EvalContext,
    InvalidCondition, KeywordMatch, Leaf, Logic, PluginCheck, ProcessMatch, Seconds, Threshold,
    TimeRange, UnknownLogic,
};

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NudgeError, ValidationError};
use crate::id::RuleId;

/// Cooldown applied when a rule does not set one.
pub const DEFAULT_COOLDOWN_SECS: f64 = 5.0;
/// Fire limit applied when a rule does not set one.
pub const DEFAULT_MAX_TRIGGERS: u32 = 9999;

fn default_rule_id() -> RuleId {
    RuleId::new("default")
}

fn default_true() -> bool {
    true
}

fn default_probability() -> f64 {
    1.0
}

fn default_cooldown() -> f64 {
    DEFAULT_COOLDOWN_SECS
}

fn default_max_triggers() -> u32 {
    DEFAULT_MAX_TRIGGERS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default = "default_rule_id")]
    pub id: RuleId,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub logic: Logic,
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default = "default_probability")]
    pub probability: f64,
    #[serde(default = "default_cooldown", alias = "cooldown")]
    pub cooldown_seconds: f64,
    #[serde(default = "default_max_triggers", alias = "max_triggers")]
    pub max_triggers_per_run: u32,
    /// Rules sharing a group share cooldown and fire counters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_group_id: Option<String>,
    /// Only considered during the first sampling cycle.
    #[serde(default)]
    pub startup_only: bool,
}

impl Rule {
    /// Create a builder for constructing a [`Rule`].
    #[must_use]
    pub fn builder() -> RuleBuilder {
        RuleBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`NudgeError::Validation`] when:
    /// - `id` is blank ([`ValidationError::EmptyId`])
    /// - `probability` is outside `[0, 1]` ([`ValidationError::ProbabilityOutOfRange`])
    /// - `cooldown_seconds` is negative ([`ValidationError::NegativeCooldown`])
    pub fn validate(&self) -> Result<(), NudgeError> {
        if self.id.is_empty() {
            return Err(ValidationError::EmptyId.into());
        }
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(ValidationError::ProbabilityOutOfRange(self.probability).into());
        }
        if self.cooldown_seconds.is_nan() || self.cooldown_seconds < 0.0 {
            return Err(ValidationError::NegativeCooldown(self.cooldown_seconds).into());
        }
        Ok(())
    }

    /// Key shared by rules that cool down together.
    #[must_use]
    pub fn group_key(&self) -> &str {
        self.trigger_group_id
            .as_deref()
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| self.id.as_str())
    }

    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.cooldown_seconds.max(0.0)).unwrap_or_default()
    }

    /// Plugins whose status this rule reads.
    #[must_use]
    pub fn plugin_ids(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        for node in &self.conditions {
            node.collect_plugin_ids(&mut ids);
        }
        ids
    }
}

/// Step-by-step builder for [`Rule`].
#[derive(Debug, Default)]
pub struct RuleBuilder {
    id: Option<RuleId>,
    enabled: Option<bool>,
    description: Option<String>,
    logic: Logic,
    conditions: Vec<ConditionNode>,
    actions: Vec<Action>,
    probability: Option<f64>,
    cooldown_seconds: Option<f64>,
    max_triggers_per_run: Option<u32>,
    trigger_group_id: Option<String>,
    startup_only: bool,
}

impl RuleBuilder {
    #[must_use]
    pub fn id(mut self, id: impl Into<RuleId>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn logic(mut self, logic: Logic) -> Self {
        self.logic = logic;
        self
    }

    #[must_use]
    pub fn condition(mut self, condition: ConditionNode) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn leaf(self, leaf: Leaf) -> Self {
        self.condition(ConditionNode::Leaf(leaf))
    }

    #[must_use]
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    #[must_use]
    pub fn probability(mut self, probability: f64) -> Self {
        self.probability = Some(probability);
        self
    }

    #[must_use]
    pub fn cooldown_seconds(mut self, secs: f64) -> Self {
        self.cooldown_seconds = Some(secs);
        self
    }

    #[must_use]
    pub fn max_triggers(mut self, max: u32) -> Self {
        self.max_triggers_per_run = Some(max);
        self
    }

    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.trigger_group_id = Some(group.into());
        self
    }

    #[must_use]
    pub fn startup_only(mut self, startup_only: bool) -> Self {
        self.startup_only = startup_only;
        self
    }

    /// Consume the builder, validate, and return a [`Rule`].
    ///
    /// # Errors
    ///
    /// Returns [`NudgeError::Validation`] if an invariant does not hold.
    pub fn build(self) -> Result<Rule, NudgeError> {
        let rule = Rule {
            id: self.id.unwrap_or_else(default_rule_id),
            enabled: self.enabled.unwrap_or(true),
            description: self.description.unwrap_or_default(),
            logic: self.logic,
            conditions: self.conditions,
            actions: self.actions,
            probability: self.probability.unwrap_or_else(default_probability),
            cooldown_seconds: self.cooldown_seconds.unwrap_or(DEFAULT_COOLDOWN_SECS),
            max_triggers_per_run: self.max_triggers_per_run.unwrap_or(DEFAULT_MAX_TRIGGERS),
            trigger_group_id: self.trigger_group_id,
            startup_only: self.startup_only,
        };
        rule.validate()?;
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn speak(text: &str) -> Action {
        Action::Speak(Speak::text(text))
    }

    #[test]
    fn should_build_rule_with_defaults() {
        let rule = Rule::builder().id("hot").action(speak("hot")).build().unwrap();
        assert!(rule.enabled);
        assert!((rule.probability - 1.0).abs() < f64::EPSILON);
        assert_eq!(rule.cooldown(), Duration::from_secs(5));
        assert_eq!(rule.max_triggers_per_run, DEFAULT_MAX_TRIGGERS);
        assert_eq!(rule.group_key(), "hot");
    }

    #[test]
    fn should_fail_validation_when_id_is_empty() {
        let result = Rule::builder().id(" ").action(speak("x")).build();
        assert!(matches!(
            result,
            Err(NudgeError::Validation(ValidationError::EmptyId))
        ));
    }

    #[test]
    fn should_fail_validation_when_probability_out_of_range() {
        let result = Rule::builder().id("r").probability(1.5).build();
        assert!(matches!(
            result,
            Err(NudgeError::Validation(ValidationError::ProbabilityOutOfRange(_)))
        ));
    }

    #[test]
    fn should_fail_validation_when_cooldown_negative() {
        let result = Rule::builder().id("r").cooldown_seconds(-1.0).build();
        assert!(matches!(
            result,
            Err(NudgeError::Validation(ValidationError::NegativeCooldown(_)))
        ));
    }

    #[test]
    fn should_accept_field_aliases_from_pack_files() {
        let rule: Rule = serde_json::from_value(json!({
            "id": 7,
            "logic": "or",
            "cooldown": 60,
            "max_triggers": 2,
            "trigger_group_id": "greetings",
            "conditions": [{"type": "fullscreen"}],
            "actions": [{"type": "speak", "text": "hello"}]
        }))
        .unwrap();
        assert_eq!(rule.id.as_str(), "7");
        assert_eq!(rule.logic, Logic::Or);
        assert_eq!(rule.cooldown(), Duration::from_secs(60));
        assert_eq!(rule.max_triggers_per_run, 2);
        assert_eq!(rule.group_key(), "greetings");
    }

    #[test]
    fn should_fall_back_to_rule_id_when_group_is_blank() {
        let rule = Rule::builder().id("r").group("").build().unwrap();
        assert_eq!(rule.group_key(), "r");
    }

    #[test]
    fn should_list_plugins_referenced_by_conditions() {
        let rule: Rule = serde_json::from_value(json!({
            "id": "p",
            "conditions": [{"type": "plugin_status", "plugin_id": "sys_ext_v1"}]
        }))
        .unwrap();
        assert!(rule.plugin_ids().contains("sys_ext_v1"));
    }
}
