//! Trigger engine: wires the sampler and the director together.
//!
//! Two tasks run for the life of the engine:
//!
//! - the **sampler** reads sensors on a fixed interval, builds a snapshot,
//!   evaluates rules and hands at most one fired rule per cycle over;
//! - the **director** owns the action chain, the pending slot release, the
//!   busy coordinator with its watchdog and the interaction state.
//!
//! They only talk through channels. [`EngineHandle`] is the cloneable front
//! door used by services and the HTTP adapter.

pub mod director;
pub mod sampler;

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use nudge_domain::error::NudgeError;
use nudge_domain::id::{ChainId, RuleId};
use nudge_domain::interaction::InteractionStats;
use nudge_domain::rule::Rule;
use nudge_domain::signal::{Inbound, Signal};
use nudge_domain::snapshot::{SensorSnapshot, Weather};

use crate::coordinator::{BusyFlags, BusyView, CoordinatorConfig};
use crate::executor::SpeechRouter;
use crate::pending::PendingSlot;
use crate::plugin_registry::PluginRegistry;
use crate::ports::{CounterStore, RulePack, SensorProbe, SignalPublisher};
use crate::scheduler::SchedulerConfig;

use self::director::{Director, DirectorInput, DirectorView};
use self::sampler::{Sampler, SamplerCommand, SamplerView};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// When `false` the sampler idles and no rule ever fires.
    pub enabled: bool,
    pub sample_interval: Duration,
    pub pending_check_interval: Duration,
    pub scheduler: SchedulerConfig,
    pub coordinator: CoordinatorConfig,
    pub speech: SpeechRouter,
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_interval: Duration::from_secs(1),
            pending_check_interval: Duration::from_secs(1),
            scheduler: SchedulerConfig::default(),
            coordinator: CoordinatorConfig::default(),
            speech: SpeechRouter::default(),
            seed: None,
        }
    }
}

impl EngineConfig {
    fn rng(&self, stream: u64) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
            None => StdRng::from_entropy(),
        }
    }
}

/// Engine state as reported to collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    #[serde(flatten)]
    pub busy: BusyView,
    pub pending_rule: Option<RuleId>,
    pub active_chain: Option<ChainId>,
    pub active_rule: Option<RuleId>,
    pub pack_id: Option<String>,
    pub rule_count: usize,
    pub cycles: u64,
}

/// Cloneable handle onto a running engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    sampler: mpsc::Sender<SamplerCommand>,
    director: mpsc::Sender<DirectorInput>,
    flags: Arc<BusyFlags>,
    pending: Arc<PendingSlot>,
    director_view: watch::Receiver<DirectorView>,
    sampler_view: watch::Receiver<SamplerView>,
    snapshot: watch::Receiver<Option<SensorSnapshot>>,
    exit: watch::Receiver<bool>,
}

impl EngineHandle {
    /// Forward a collaborator notification to the director.
    ///
    /// # Errors
    ///
    /// Returns [`NudgeError::ChannelClosed`] once the engine has stopped.
    pub async fn send(&self, inbound: Inbound) -> Result<(), NudgeError> {
        self.director
            .send(DirectorInput::Inbound(inbound))
            .await
            .map_err(|_| NudgeError::ChannelClosed("director"))
    }

    /// Swap in a pack's rules and audio directory.
    ///
    /// # Errors
    ///
    /// Returns [`NudgeError::ChannelClosed`] once the engine has stopped.
    pub async fn load_pack(&self, pack: RulePack) -> Result<(), NudgeError> {
        self.director
            .send(DirectorInput::PackChanged {
                pack_id: pack.pack_id,
                audio_dir: pack.audio_dir,
            })
            .await
            .map_err(|_| NudgeError::ChannelClosed("director"))?;
        self.command(SamplerCommand::ReplaceRules(pack.rules)).await
    }

    /// Clear the cumulative latches of one rule.
    ///
    /// # Errors
    ///
    /// Returns [`NudgeError::ChannelClosed`] once the engine has stopped.
    pub async fn reset_rule(&self, rule_id: RuleId) -> Result<(), NudgeError> {
        self.command(SamplerCommand::ResetRule(rule_id)).await
    }

    /// Clear every cumulative latch.
    ///
    /// # Errors
    ///
    /// Returns [`NudgeError::ChannelClosed`] once the engine has stopped.
    pub async fn reset_all(&self) -> Result<(), NudgeError> {
        self.command(SamplerCommand::ResetAll).await
    }

    async fn command(&self, command: SamplerCommand) -> Result<(), NudgeError> {
        self.sampler
            .send(command)
            .await
            .map_err(|_| NudgeError::ChannelClosed("sampler"))
    }

    #[must_use]
    pub fn status(&self) -> EngineStatus {
        let director = self.director_view.borrow().clone();
        let sampler = *self.sampler_view.borrow();
        EngineStatus {
            busy: self.flags.view(),
            pending_rule: self.pending.peek_rule(),
            active_chain: director.active_chain,
            active_rule: director.active_rule,
            pack_id: director.pack_id,
            rule_count: sampler.rule_count,
            cycles: sampler.cycles,
        }
    }

    #[must_use]
    pub fn latest_snapshot(&self) -> Option<SensorSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Flips to `true` once a chain ran `exit_app`.
    #[must_use]
    pub fn exit_requested(&self) -> watch::Receiver<bool> {
        self.exit.clone()
    }
}

/// A running engine: its handle and the two tasks.
#[derive(Debug)]
pub struct Engine {
    handle: EngineHandle,
    sampler: JoinHandle<()>,
    director: JoinHandle<()>,
}

impl Engine {
    /// Spawn both tasks on the current tokio runtime.
    pub fn spawn<P, S, C>(
        config: EngineConfig,
        probe: P,
        plugins: PluginRegistry,
        publisher: S,
        counters: C,
    ) -> Self
    where
        P: SensorProbe + Sync + 'static,
        S: SignalPublisher + Clone + Send + Sync + 'static,
        C: CounterStore + Send + Sync + 'static,
    {
        let flags = Arc::new(BusyFlags::new());
        let pending = Arc::new(PendingSlot::new());

        let (sampler_tx, sampler_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (director_tx, director_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (fired_tx, fired_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let (weather_tx, weather_rx) = watch::channel(Weather::default());
        let (interaction_tx, interaction_rx) = watch::channel(InteractionStats::new(
            tokio::time::Instant::now().into_std(),
        ));
        let (exit_tx, exit_rx) = watch::channel(false);
        let (director_view_tx, director_view_rx) = watch::channel(DirectorView::default());
        let (sampler_view_tx, sampler_view_rx) = watch::channel(SamplerView::default());

        let sampler = Sampler::new(
            &config,
            probe,
            plugins.clone(),
            publisher.clone(),
            sampler::Channels {
                commands: sampler_rx,
                fired: fired_tx,
                weather: weather_rx,
                interaction: interaction_rx,
                snapshot: snapshot_tx,
                view: sampler_view_tx,
            },
        );

        let director = Director::new(
            &config,
            director::Channels {
                inputs: director_rx,
                fired: fired_rx,
                weather: weather_tx,
                interaction: interaction_tx,
                snapshot: snapshot_rx.clone(),
                exit: exit_tx,
                view: director_view_tx,
            },
            director::Collaborators {
                flags: Arc::clone(&flags),
                pending: Arc::clone(&pending),
                plugins,
                publisher,
                counters,
                rng: config.rng(1),
            },
        );

        let handle = EngineHandle {
            sampler: sampler_tx,
            director: director_tx,
            flags,
            pending,
            director_view: director_view_rx,
            sampler_view: sampler_view_rx,
            snapshot: snapshot_rx,
            exit: exit_rx,
        };

        Self {
            handle,
            sampler: tokio::spawn(sampler.run()),
            director: tokio::spawn(director.run()),
        }
    }

    #[must_use]
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Stop both tasks.
    pub async fn shutdown(self) {
        self.sampler.abort();
        self.director.abort();
        let _ = self.sampler.await;
        let _ = self.director.await;
        tracing::info!("engine stopped");
    }
}

/// Every plugin id referenced by a rule set.
pub(crate) fn plugin_ids_of(rules: &[Rule]) -> std::collections::BTreeSet<String> {
    rules.iter().flat_map(Rule::plugin_ids).collect()
}

/// Publish and log failures. Signals are best effort.
pub(crate) async fn publish<S: SignalPublisher>(publisher: &S, signal: Signal) {
    if let Err(err) = publisher.publish(signal).await {
        tracing::warn!(error = %err, "failed to publish signal");
    }
}

/// Wait for `deadline`, or forever when there is none.
pub(crate) async fn sleep_until_opt(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

/// Monotonic time on tokio's clock, so paused-time tests drive it.
pub(crate) fn instant_now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}
