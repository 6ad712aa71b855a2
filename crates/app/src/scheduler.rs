//! Rule scheduler: picks at most one rule to fire per sampling cycle.
//!
//! Rules are visited in authored order. For each enabled rule the gates run
//! in a fixed order: startup-only, per-group cooldown, per-group max count,
//! global inter-trigger cooldown, condition evaluation, probability. The
//! first rule that passes every gate is recorded and returned; later rules
//! are not evaluated that cycle, so their cumulative children do not latch.
//!
//! Debug mode bypasses the cooldown, max count and probability gates.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;

use nudge_domain::id::RuleId;
use nudge_domain::rule::{Action, EvalContext, Rule};

use crate::evaluator::{RuleRuntimeState, evaluate_rule};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Minimum spacing between any two fires.
    pub global_cooldown: Duration,
    pub debug: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            global_cooldown: Duration::from_secs(30),
            debug: false,
        }
    }
}

/// Payload handed to the director when a rule fires.
#[derive(Debug, Clone, PartialEq)]
pub struct FiredRule {
    pub rule_id: RuleId,
    pub group: String,
    pub actions: Vec<Action>,
}

/// Fire bookkeeping, keyed by trigger group.
#[derive(Debug, Default)]
pub struct SchedulerState {
    last_fire: HashMap<String, Instant>,
    fire_counts: HashMap<String, u32>,
    last_any_fire: Option<Instant>,
    cycles: u64,
    pub runtime: RuleRuntimeState,
}

impl SchedulerState {
    #[must_use]
    pub fn fire_count(&self, group: &str) -> u32 {
        self.fire_counts.get(group).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn last_fire(&self, group: &str) -> Option<Instant> {
        self.last_fire.get(group).copied()
    }

    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn record(&mut self, group: &str, now: Instant) {
        self.last_fire.insert(group.to_string(), now);
        *self.fire_counts.entry(group.to_string()).or_default() += 1;
        self.last_any_fire = Some(now);
    }
}

pub struct RuleScheduler<R> {
    rules: Vec<Rule>,
    config: SchedulerConfig,
    state: SchedulerState,
    rng: R,
}

impl<R: Rng> RuleScheduler<R> {
    pub fn new(config: SchedulerConfig, rng: R) -> Self {
        Self {
            rules: Vec::new(),
            config,
            state: SchedulerState::default(),
            rng,
        }
    }

    /// Swap the rule set. Fire bookkeeping and latches are kept.
    pub fn replace_rules(&mut self, rules: Vec<Rule>) {
        self.rules = rules;
    }

    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    #[must_use]
    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn reset_rule_state(&mut self, rule_id: &RuleId) {
        self.state.runtime.reset_rule(rule_id);
    }

    pub fn reset_all(&mut self) {
        self.state.runtime.reset_all();
    }

    /// Run one cycle against `ctx`.
    pub fn poll(&mut self, ctx: &EvalContext<'_>) -> Option<FiredRule> {
        let startup = self.state.cycles == 0;
        self.state.cycles += 1;
        let now = ctx.now;
        let debug = self.config.debug;

        for rule in &self.rules {
            if !rule.enabled {
                continue;
            }
            if rule.startup_only && !startup {
                continue;
            }
            let group = rule.group_key();
            if !debug {
                if self
                    .state
                    .last_fire(group)
                    .is_some_and(|at| now.saturating_duration_since(at) < rule.cooldown())
                {
                    continue;
                }
                if self.state.fire_count(group) >= rule.max_triggers_per_run {
                    continue;
                }
                if self
                    .state
                    .last_any_fire
                    .is_some_and(|at| now.saturating_duration_since(at) < self.config.global_cooldown)
                {
                    continue;
                }
            }
            if !evaluate_rule(rule, ctx, &mut self.state.runtime) {
                continue;
            }
            if !debug {
                let draw: f64 = self.rng.gen_range(0.0..1.0);
                if draw >= rule.probability {
                    tracing::debug!(rule_id = %rule.id, draw, probability = rule.probability, "rule matched but lost the probability draw");
                    continue;
                }
            }

            let group = group.to_string();
            self.state.record(&group, now);
            tracing::info!(rule_id = %rule.id, %group, "rule fired");
            return Some(FiredRule {
                rule_id: rule.id.clone(),
                group,
                actions: rule.actions.clone(),
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use nudge_domain::interaction::InteractionStats;
    use nudge_domain::rule::{Leaf, Logic, Speak};
    use nudge_domain::snapshot::SensorSnapshot;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;

    use super::*;

    fn always(id: &str) -> Rule {
        Rule::builder()
            .id(id)
            .logic(Logic::Or)
            .leaf(Leaf::Fullscreen)
            .condition(nudge_domain::rule::ConditionNode::from_value(
                json!({"type": "idle_duration", "sec": -1}),
            ))
            .action(Action::Speak(Speak::text(id)))
            .cooldown_seconds(0.0)
            .build()
            .unwrap()
    }

    fn scheduler(rules: Vec<Rule>, global: Duration) -> RuleScheduler<StdRng> {
        let mut scheduler = RuleScheduler::new(
            SchedulerConfig {
                global_cooldown: global,
                debug: false,
            },
            StdRng::seed_from_u64(7),
        );
        scheduler.replace_rules(rules);
        scheduler
    }

    fn poll_at<R: Rng>(scheduler: &mut RuleScheduler<R>, now: Instant) -> Option<FiredRule> {
        let snapshot = SensorSnapshot::default();
        let stats = InteractionStats::new(now);
        scheduler.poll(&EvalContext {
            snapshot: &snapshot,
            interaction: &stats,
            now,
        })
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn should_fire_first_matching_rule_in_authored_order() {
        let mut s = scheduler(vec![always("a"), always("b")], Duration::ZERO);
        let fired = poll_at(&mut s, Instant::now()).unwrap();
        assert_eq!(fired.rule_id.as_str(), "a");
    }

    #[test]
    fn should_not_fire_twice_within_group_cooldown() {
        let mut rule = always("a");
        rule.cooldown_seconds = 10.0;
        let mut s = scheduler(vec![rule], Duration::ZERO);
        let t0 = Instant::now();
        let mut fires = 0;
        for step in 0..10 {
            if poll_at(&mut s, t0 + secs(step)).is_some() {
                fires += 1;
            }
        }
        assert_eq!(fires, 1);
        assert!(poll_at(&mut s, t0 + secs(10)).is_some());
    }

    #[test]
    fn should_share_cooldown_across_trigger_group() {
        let mut a = always("a");
        a.trigger_group_id = Some("greet".to_string());
        a.cooldown_seconds = 60.0;
        let mut b = always("b");
        b.trigger_group_id = Some("greet".to_string());
        b.cooldown_seconds = 60.0;
        let mut s = scheduler(vec![a, b], Duration::ZERO);
        let t0 = Instant::now();
        assert!(poll_at(&mut s, t0).is_some());
        assert!(poll_at(&mut s, t0 + secs(1)).is_none());
        assert_eq!(s.state().fire_count("greet"), 1);
    }

    #[test]
    fn should_stop_firing_after_max_count() {
        let mut rule = always("a");
        rule.max_triggers_per_run = 2;
        let mut s = scheduler(vec![rule], Duration::ZERO);
        let t0 = Instant::now();
        let fires = (0..5)
            .filter(|i| poll_at(&mut s, t0 + secs(*i)).is_some())
            .count();
        assert_eq!(fires, 2);
    }

    #[test]
    fn should_space_fires_by_global_cooldown() {
        let mut s = scheduler(vec![always("a"), always("b")], secs(30));
        let t0 = Instant::now();
        assert_eq!(poll_at(&mut s, t0).unwrap().rule_id.as_str(), "a");
        assert!(poll_at(&mut s, t0 + secs(29)).is_none());
        assert!(poll_at(&mut s, t0 + secs(30)).is_some());
    }

    #[test]
    fn should_never_fire_with_zero_probability() {
        let mut rule = always("a");
        rule.probability = 0.0;
        let mut s = scheduler(vec![rule], Duration::ZERO);
        let t0 = Instant::now();
        assert!((0..200).all(|i| poll_at(&mut s, t0 + secs(i)).is_none()));
    }

    #[test]
    fn should_fire_every_eligible_cycle_with_full_probability() {
        let mut s = scheduler(vec![always("a")], Duration::ZERO);
        let t0 = Instant::now();
        assert!((0..200).all(|i| poll_at(&mut s, t0 + secs(i)).is_some()));
    }

    #[test]
    fn should_only_consider_startup_rule_on_first_cycle() {
        let mut rule = always("hello");
        rule.startup_only = true;
        let mut s = scheduler(vec![rule], Duration::ZERO);
        let t0 = Instant::now();
        assert!(poll_at(&mut s, t0).is_some());
        assert!(poll_at(&mut s, t0 + secs(100)).is_none());
    }

    #[test]
    fn should_skip_disabled_rules() {
        let mut rule = always("a");
        rule.enabled = false;
        let mut s = scheduler(vec![rule, always("b")], Duration::ZERO);
        assert_eq!(poll_at(&mut s, Instant::now()).unwrap().rule_id.as_str(), "b");
    }

    #[test]
    fn should_bypass_gates_in_debug_mode() {
        let mut rule = always("a");
        rule.cooldown_seconds = 600.0;
        rule.max_triggers_per_run = 1;
        rule.probability = 0.0;
        let mut s = RuleScheduler::new(
            SchedulerConfig {
                global_cooldown: secs(30),
                debug: true,
            },
            StdRng::seed_from_u64(1),
        );
        s.replace_rules(vec![rule]);
        let t0 = Instant::now();
        assert!(poll_at(&mut s, t0).is_some());
        assert!(poll_at(&mut s, t0 + secs(1)).is_some());
    }

    #[test]
    fn should_not_evaluate_rules_after_first_fire() {
        let cumulative = Rule::builder()
            .id("later")
            .logic(Logic::Cumulative)
            .leaf(Leaf::Fullscreen)
            .condition(nudge_domain::rule::ConditionNode::from_value(
                json!({"type": "idle_duration", "sec": -1}),
            ))
            .build()
            .unwrap();
        let mut s = scheduler(vec![always("first"), cumulative], Duration::ZERO);
        poll_at(&mut s, Instant::now());
        assert_eq!(s.state().runtime.latched_count(&RuleId::new("later")), 0);
    }
}
