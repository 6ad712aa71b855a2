//! Sampler task: the fixed-interval background loop.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use rand::rngs::StdRng;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use nudge_domain::id::RuleId;
use nudge_domain::interaction::InteractionStats;
use nudge_domain::plugin::PluginStatus;
use nudge_domain::rule::{EvalContext, Rule};
use nudge_domain::signal::Signal;
use nudge_domain::snapshot::{SensorSnapshot, SnapshotSource, Weather};
use nudge_domain::time::ClockReading;

use crate::plugin_registry::PluginRegistry;
use crate::ports::{RawReading, SensorProbe, SignalPublisher};
use crate::scheduler::{FiredRule, RuleScheduler};
use crate::snapshot_builder::{BuildInputs, SnapshotBuilder};

use super::{EngineConfig, instant_now, plugin_ids_of, publish};

#[derive(Debug)]
pub enum SamplerCommand {
    ReplaceRules(Vec<Rule>),
    ResetRule(RuleId),
    ResetAll,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerView {
    pub rule_count: usize,
    pub cycles: u64,
}

pub(super) struct Channels {
    pub commands: mpsc::Receiver<SamplerCommand>,
    pub fired: mpsc::Sender<FiredRule>,
    pub weather: watch::Receiver<Weather>,
    pub interaction: watch::Receiver<InteractionStats>,
    pub snapshot: watch::Sender<Option<SensorSnapshot>>,
    pub view: watch::Sender<SamplerView>,
}

pub(super) struct Sampler<P, S> {
    enabled: bool,
    interval: Duration,
    probe: P,
    plugins: PluginRegistry,
    publisher: S,
    scheduler: RuleScheduler<StdRng>,
    builder: SnapshotBuilder,
    plugin_ids: BTreeSet<String>,
    channels: Channels,
}

impl<P, S> Sampler<P, S>
where
    P: SensorProbe,
    S: SignalPublisher + Send + Sync,
{
    pub(super) fn new(
        config: &EngineConfig,
        probe: P,
        plugins: PluginRegistry,
        publisher: S,
        channels: Channels,
    ) -> Self {
        Self {
            enabled: config.enabled,
            interval: config.sample_interval,
            probe,
            plugins,
            publisher,
            scheduler: RuleScheduler::new(config.scheduler, config.rng(0)),
            builder: SnapshotBuilder::new(),
            plugin_ids: BTreeSet::new(),
            channels,
        }
    }

    pub(super) async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_ms = self.interval.as_millis(), enabled = self.enabled, "sampler started");

        loop {
            tokio::select! {
                command = self.channels.commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
                _ = ticker.tick(), if self.enabled => self.cycle().await,
            }
        }
        tracing::debug!("sampler stopped");
    }

    fn apply(&mut self, command: SamplerCommand) {
        match command {
            SamplerCommand::ReplaceRules(rules) => {
                self.plugin_ids = plugin_ids_of(&rules);
                tracing::info!(rules = rules.len(), plugins = self.plugin_ids.len(), "rules replaced");
                self.scheduler.replace_rules(rules);
            }
            SamplerCommand::ResetRule(rule_id) => {
                tracing::info!(%rule_id, "rule state reset");
                self.scheduler.reset_rule_state(&rule_id);
            }
            SamplerCommand::ResetAll => {
                tracing::info!("all rule state reset");
                self.scheduler.reset_all();
            }
        }
        self.publish_view();
    }

    fn publish_view(&self) {
        self.channels.view.send_replace(SamplerView {
            rule_count: self.scheduler.rules().len(),
            cycles: self.scheduler.state().cycles(),
        });
    }

    /// Check the referenced plugins the reading left out. Plugins are
    /// synchronous, so the checks run on the blocking pool.
    async fn check_plugins(&self, raw: &RawReading) -> HashMap<String, PluginStatus> {
        if raw.source == SnapshotSource::Mock {
            return HashMap::new();
        }
        let wanted: Vec<String> = self
            .plugin_ids
            .iter()
            .filter(|id| !raw.plugins.contains_key(*id))
            .cloned()
            .collect();
        if wanted.is_empty() {
            return HashMap::new();
        }
        let plugins = self.plugins.clone();
        tokio::task::spawn_blocking(move || plugins.check_many(wanted.iter().map(String::as_str)))
            .await
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "plugin status checks did not complete");
                HashMap::new()
            })
    }

    async fn cycle(&mut self) {
        let raw = self.probe.sample().await.unwrap_or_default();
        let plugin_statuses = self.check_plugins(&raw).await;
        let weather = self.channels.weather.borrow().clone();
        let clock = ClockReading::local_now();
        let built = self.builder.build(
            raw,
            &BuildInputs {
                weather: &weather,
                plugin_statuses: &plugin_statuses,
                plugin_ids: &self.plugin_ids,
                clock: &clock,
            },
        );

        if let Some(fullscreen) = built.fullscreen_changed {
            publish(&self.publisher, Signal::FullscreenChanged { fullscreen }).await;
        }

        let interaction = self.channels.interaction.borrow().clone();
        let fired = self.scheduler.poll(&EvalContext {
            snapshot: &built.snapshot,
            interaction: &interaction,
            now: instant_now(),
        });
        self.channels.snapshot.send_replace(Some(built.snapshot));
        self.publish_view();

        if let Some(fired) = fired {
            publish(&self.publisher, Signal::RuleMatched {
                rule_id: fired.rule_id.clone(),
                actions: fired.actions.clone(),
            })
            .await;
            if self.channels.fired.send(fired).await.is_err() {
                tracing::warn!("director gone, dropping fired rule");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::{Arc, Mutex};

    use nudge_domain::error::{NudgeError, PluginError};
    use nudge_domain::plugin::PluginDescriptor;
    use serde_json::json;

    use super::*;
    use crate::ports::Plugin;

    #[derive(Clone, Default)]
    struct Spy(Arc<Mutex<Vec<Signal>>>);

    impl SignalPublisher for Spy {
        fn publish(&self, signal: Signal) -> impl Future<Output = Result<(), NudgeError>> + Send {
            self.0.lock().unwrap().push(signal);
            async { Ok(()) }
        }
    }

    struct Hot;

    impl SensorProbe for Hot {
        fn sample(&mut self) -> impl Future<Output = Option<RawReading>> + Send {
            let mut reading = RawReading::default();
            reading.hardware.cpu_temp = 80.0;
            reading.fullscreen = true;
            async move { Some(reading) }
        }
    }

    type Parts = (Sampler<Hot, Spy>, mpsc::Receiver<FiredRule>, watch::Receiver<Option<SensorSnapshot>>);

    fn sampler(spy: Spy) -> Parts {
        sampler_with(spy, PluginRegistry::new())
    }

    fn sampler_with(spy: Spy, plugins: PluginRegistry) -> Parts {
        let (_commands_tx, commands) = mpsc::channel(4);
        let (fired_tx, fired_rx) = mpsc::channel(4);
        let (_weather_tx, weather) = watch::channel(Weather::default());
        let (_interaction_tx, interaction) =
            watch::channel(InteractionStats::new(instant_now()));
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let (view, _) = watch::channel(SamplerView::default());
        let config = EngineConfig {
            seed: Some(3),
            scheduler: crate::scheduler::SchedulerConfig {
                global_cooldown: Duration::ZERO,
                debug: false,
            },
            ..EngineConfig::default()
        };
        let sampler = Sampler::new(
            &config,
            Hot,
            plugins,
            spy,
            Channels {
                commands,
                fired: fired_tx,
                weather,
                interaction,
                snapshot: snapshot_tx,
                view,
            },
        );
        (sampler, fired_rx, snapshot_rx)
    }

    struct HalfHour;

    impl Plugin for HalfHour {
        fn descriptor(&self) -> &PluginDescriptor {
            static DESCRIPTOR: std::sync::OnceLock<PluginDescriptor> = std::sync::OnceLock::new();
            DESCRIPTOR.get_or_init(|| PluginDescriptor {
                id: "half_hour".to_string(),
                ..PluginDescriptor::default()
            })
        }

        fn check_status(&self) -> Result<PluginStatus, PluginError> {
            Ok(PluginStatus::new(true, "Time: 10:30", 30.0))
        }

        fn execute_action(&self, _: &str, _: &[serde_json::Value]) -> Result<(), PluginError> {
            Ok(())
        }
    }

    fn hot_rule(probability: f64) -> Rule {
        serde_json::from_value(json!({
            "id": "hot",
            "conditions": [{"type": "cpu_temp", "gt": 75}],
            "actions": [{"type": "speak", "text": "too hot"}],
            "probability": probability,
            "cooldown": 0
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn should_fire_matching_rule_and_publish_snapshot() {
        let spy = Spy::default();
        let (mut sampler, mut fired, snapshot) = sampler(spy.clone());
        sampler.apply(SamplerCommand::ReplaceRules(vec![hot_rule(1.0)]));

        sampler.cycle().await;

        assert_eq!(fired.recv().await.unwrap().rule_id.as_str(), "hot");
        let signals = spy.0.lock().unwrap().clone();
        assert!(signals.contains(&Signal::FullscreenChanged { fullscreen: true }));
        assert!(signals.iter().any(|s| matches!(s, Signal::RuleMatched { rule_id, .. } if rule_id.as_str() == "hot")));
        assert!((snapshot.borrow().as_ref().unwrap().hardware.cpu_temp - 80.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn should_check_referenced_plugins_each_cycle() {
        let plugins = PluginRegistry::new().with(Arc::new(HalfHour));
        let (mut sampler, mut fired, snapshot) = sampler_with(Spy::default(), plugins);
        let rule = serde_json::from_value(json!({
            "id": "chime",
            "conditions": [{"type": "plugin_check", "plugin_id": "half_hour", "gt": 10}],
            "actions": [{"type": "move_to"}],
            "cooldown": 0
        }))
        .unwrap();
        sampler.apply(SamplerCommand::ReplaceRules(vec![rule]));

        sampler.cycle().await;

        assert_eq!(fired.recv().await.unwrap().rule_id.as_str(), "chime");
        let status = snapshot.borrow().as_ref().unwrap().plugins["half_hour"].clone();
        assert_eq!(status.text, "Time: 10:30");
    }

    #[tokio::test]
    async fn should_never_fire_with_zero_probability() {
        let (mut sampler, mut fired, _snapshot) = sampler(Spy::default());
        sampler.apply(SamplerCommand::ReplaceRules(vec![hot_rule(0.0)]));
        for _ in 0..1000 {
            sampler.cycle().await;
        }
        assert!(fired.try_recv().is_err());
        assert_eq!(sampler.scheduler.state().cycles(), 1000);
    }
}
