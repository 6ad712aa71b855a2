//! Condition evaluator: walks a rule's condition tree.
//!
//! Children of a `CUMULATIVE` group latch: once a child has matched it stays
//! satisfied for the rest of the process, keyed by rule id and the child's
//! [`ConditionPath`]. Latches are only cleared through the explicit reset
//! hooks on [`RuleRuntimeState`].

use std::collections::{HashMap, HashSet};

use nudge_domain::id::RuleId;
use nudge_domain::rule::{ConditionNode, ConditionPath, EvalContext, Logic, Rule};

/// Per-rule memory that outlives a single cycle.
#[derive(Debug, Default)]
pub struct RuleRuntimeState {
    latches: HashMap<RuleId, HashSet<ConditionPath>>,
}

impl RuleRuntimeState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_latched(&self, rule_id: &RuleId, path: &ConditionPath) -> bool {
        self.latches
            .get(rule_id)
            .is_some_and(|paths| paths.contains(path))
    }

    fn latch(&mut self, rule_id: &RuleId, path: ConditionPath) {
        self.latches.entry(rule_id.clone()).or_default().insert(path);
    }

    #[must_use]
    pub fn latched_count(&self, rule_id: &RuleId) -> usize {
        self.latches.get(rule_id).map_or(0, HashSet::len)
    }

    /// Forget every latch of one rule.
    pub fn reset_rule(&mut self, rule_id: &RuleId) {
        self.latches.remove(rule_id);
    }

    pub fn reset_all(&mut self) {
        self.latches.clear();
    }
}

/// Evaluate a rule's root group.
pub fn evaluate_rule(rule: &Rule, ctx: &EvalContext<'_>, state: &mut RuleRuntimeState) -> bool {
    evaluate_group(
        rule.logic,
        &rule.conditions,
        ctx,
        &rule.id,
        &ConditionPath::root(),
        state,
    )
}

fn evaluate_node(
    node: &ConditionNode,
    ctx: &EvalContext<'_>,
    rule_id: &RuleId,
    path: &ConditionPath,
    state: &mut RuleRuntimeState,
) -> bool {
    match node {
        ConditionNode::Leaf(leaf) => leaf.matches(ctx),
        ConditionNode::Group(group) => {
            evaluate_group(group.logic, &group.conditions, ctx, rule_id, path, state)
        }
        ConditionNode::Invalid(invalid) => {
            tracing::trace!(rule_id = %rule_id, %path, reason = %invalid.reason, "invalid condition");
            false
        }
    }
}

/// Every child is evaluated so nested latches keep accumulating even when
/// a sibling already decided the outcome.
fn evaluate_group(
    logic: Logic,
    children: &[ConditionNode],
    ctx: &EvalContext<'_>,
    rule_id: &RuleId,
    path: &ConditionPath,
    state: &mut RuleRuntimeState,
) -> bool {
    if children.is_empty() {
        return false;
    }
    let mut all = true;
    let mut any = false;
    for (index, child) in children.iter().enumerate() {
        let child_path = path.child(index);
        let mut hit = evaluate_node(child, ctx, rule_id, &child_path, state);
        if logic == Logic::Cumulative {
            if hit {
                state.latch(rule_id, child_path.clone());
            }
            hit = state.is_latched(rule_id, &child_path);
        }
        all &= hit;
        any |= hit;
    }
    match logic {
        Logic::And | Logic::Cumulative => all,
        Logic::Or => any,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use nudge_domain::interaction::InteractionStats;
    use nudge_domain::rule::Leaf;
    use nudge_domain::snapshot::SensorSnapshot;
    use serde_json::json;

    use super::*;

    fn rule(value: serde_json::Value) -> Rule {
        serde_json::from_value(value).unwrap()
    }

    fn eval(rule: &Rule, snapshot: &SensorSnapshot, state: &mut RuleRuntimeState) -> bool {
        let now = Instant::now();
        let stats = InteractionStats::new(now);
        let ctx = EvalContext {
            snapshot,
            interaction: &stats,
            now,
        };
        evaluate_rule(rule, &ctx, state)
    }

    fn snapshot(cpu_temp: f64, fullscreen: bool) -> SensorSnapshot {
        let mut snapshot = SensorSnapshot::default();
        snapshot.hardware.cpu_temp = cpu_temp;
        snapshot.fullscreen = fullscreen;
        snapshot
    }

    #[test]
    fn should_not_match_when_root_is_empty() {
        let r = rule(json!({"id": "empty", "logic": "OR", "conditions": []}));
        assert!(!eval(&r, &SensorSnapshot::default(), &mut RuleRuntimeState::new()));
    }

    #[test]
    fn should_require_all_children_when_and() {
        let r = rule(json!({
            "id": "and",
            "conditions": [{"type": "cpu_temp", "gt": 70}, {"type": "fullscreen"}]
        }));
        let mut state = RuleRuntimeState::new();
        assert!(!eval(&r, &snapshot(80.0, false), &mut state));
        assert!(eval(&r, &snapshot(80.0, true), &mut state));
    }

    #[test]
    fn should_accept_any_child_when_or() {
        let r = rule(json!({
            "id": "or",
            "logic": "OR",
            "conditions": [{"type": "cpu_temp", "gt": 70}, {"type": "fullscreen"}]
        }));
        let mut state = RuleRuntimeState::new();
        assert!(eval(&r, &snapshot(20.0, true), &mut state));
        assert!(!eval(&r, &snapshot(20.0, false), &mut state));
    }

    #[test]
    fn should_latch_children_when_cumulative() {
        let r = rule(json!({
            "id": "cum",
            "logic": "CUMULATIVE",
            "conditions": [{"type": "cpu_temp", "gt": 70}, {"type": "fullscreen"}]
        }));
        let mut state = RuleRuntimeState::new();
        assert!(!eval(&r, &snapshot(80.0, false), &mut state));
        assert_eq!(state.latched_count(&r.id), 1);
        assert!(eval(&r, &snapshot(20.0, true), &mut state));
        assert!(eval(&r, &SensorSnapshot::default(), &mut state));
    }

    #[test]
    fn should_latch_nested_groups_by_path() {
        let r = rule(json!({
            "id": "nested",
            "logic": "CUMULATIVE",
            "conditions": [
                {"logic": "AND", "conditions": [{"type": "cpu_temp", "gt": 70}]},
                {"type": "fullscreen"}
            ]
        }));
        let mut state = RuleRuntimeState::new();
        assert!(!eval(&r, &snapshot(80.0, false), &mut state));
        assert!(state.is_latched(&r.id, &ConditionPath::root().child(0)));
        assert!(!state.is_latched(&r.id, &ConditionPath::root().child(1)));
        assert!(eval(&r, &snapshot(0.0, true), &mut state));
    }

    #[test]
    fn should_not_latch_children_of_plain_groups_inside_cumulative() {
        let r = rule(json!({
            "id": "inner",
            "logic": "CUMULATIVE",
            "conditions": [
                {"logic": "AND", "conditions": [{"type": "cpu_temp", "gt": 70}, {"type": "fullscreen"}]}
            ]
        }));
        let mut state = RuleRuntimeState::new();
        assert!(!eval(&r, &snapshot(80.0, false), &mut state));
        assert!(!eval(&r, &snapshot(0.0, true), &mut state));
        assert_eq!(state.latched_count(&r.id), 0);
    }

    #[test]
    fn should_keep_latches_separate_per_rule() {
        let a = rule(json!({"id": "a", "logic": "CUMULATIVE", "conditions": [{"type": "fullscreen"}, {"type": "cpu_temp", "gt": 70}]}));
        let b = rule(json!({"id": "b", "logic": "CUMULATIVE", "conditions": [{"type": "fullscreen"}, {"type": "cpu_temp", "gt": 70}]}));
        let mut state = RuleRuntimeState::new();
        eval(&a, &snapshot(0.0, true), &mut state);
        assert!(!eval(&b, &snapshot(80.0, false), &mut state));
        assert!(eval(&a, &snapshot(80.0, false), &mut state));
    }

    #[test]
    fn should_forget_latches_after_reset() {
        let r = rule(json!({"id": "r", "logic": "CUMULATIVE", "conditions": [{"type": "fullscreen"}, {"type": "cpu_temp", "gt": 70}]}));
        let mut state = RuleRuntimeState::new();
        eval(&r, &snapshot(0.0, true), &mut state);
        state.reset_rule(&r.id);
        assert!(!eval(&r, &snapshot(80.0, false), &mut state));
        state.reset_all();
        assert_eq!(state.latched_count(&r.id), 0);
    }

    #[test]
    fn should_treat_invalid_node_as_false() {
        let r = Rule::builder()
            .id("bad")
            .logic(Logic::Or)
            .condition(ConditionNode::from_value(json!({"type": "telepathy"})))
            .leaf(Leaf::Fullscreen)
            .build()
            .unwrap();
        let mut state = RuleRuntimeState::new();
        assert!(!eval(&r, &snapshot(0.0, false), &mut state));
        assert!(eval(&r, &snapshot(0.0, true), &mut state));
    }
}
