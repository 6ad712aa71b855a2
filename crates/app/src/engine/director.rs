//! Director task: the single context that plays action chains.
//!
//! Everything with a deadline lives here: the chain's delay or speech wait,
//! the pending trigger check, the watchdog and deferred unlock or restore
//! callbacks. One `select!` loop drives them all, so at most one chain step
//! ever runs at a time.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use nudge_domain::id::{ChainId, RequestId, RuleId};
use nudge_domain::interaction::{InteractionStats, PersistedCounters, PointerEvent};
use nudge_domain::rule::{Action, PluginAction};
use nudge_domain::signal::{Inbound, Signal};
use nudge_domain::snapshot::{SensorSnapshot, Weather};

use crate::coordinator::{Admission, BusyCoordinator, BusyFlags};
use crate::executor::{ActionChain, Effect, SpeechRouter, Step, Wait};
use crate::pending::{Offer, PendingSlot, PendingTrigger};
use crate::plugin_registry::PluginRegistry;
use crate::ports::{CounterStore, SignalPublisher};
use crate::scheduler::FiredRule;

use super::{EngineConfig, instant_now, publish, sleep_until_opt};

#[derive(Debug)]
pub enum DirectorInput {
    Inbound(Inbound),
    PackChanged {
        pack_id: String,
        audio_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorView {
    pub active_chain: Option<ChainId>,
    pub active_rule: Option<RuleId>,
    pub pack_id: Option<String>,
}

pub(super) struct Channels {
    pub inputs: mpsc::Receiver<DirectorInput>,
    pub fired: mpsc::Receiver<FiredRule>,
    pub weather: watch::Sender<Weather>,
    pub interaction: watch::Sender<InteractionStats>,
    pub snapshot: watch::Receiver<Option<SensorSnapshot>>,
    pub exit: watch::Sender<bool>,
    pub view: watch::Sender<DirectorView>,
}

pub(super) struct Collaborators<S, C> {
    pub flags: Arc<BusyFlags>,
    pub pending: Arc<PendingSlot>,
    pub plugins: PluginRegistry,
    pub publisher: S,
    pub counters: C,
    pub rng: StdRng,
}

/// Callbacks scheduled by instant actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    Unlock(u64),
    RestoreOpacity(u64),
}

pub(super) struct Director<S, C> {
    coordinator: BusyCoordinator,
    pending: Arc<PendingSlot>,
    plugins: PluginRegistry,
    publisher: S,
    counters: C,
    rng: StdRng,
    speech: SpeechRouter,
    pending_check: Duration,
    chain: Option<ActionChain>,
    chain_deadline: Option<Instant>,
    timers: Vec<(Instant, Deferred)>,
    fade_generation: u64,
    /// Playback wait of the last chain the watchdog abandoned.
    abandoned_playback: Option<RequestId>,
    interaction: InteractionStats,
    pack_id: Option<String>,
    channels: Channels,
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or_default()
}

impl<S, C> Director<S, C>
where
    S: SignalPublisher + Send + Sync,
    C: CounterStore + Send + Sync,
{
    pub(super) fn new(config: &EngineConfig, channels: Channels, collaborators: Collaborators<S, C>) -> Self {
        let interaction = channels.interaction.borrow().clone();
        Self {
            coordinator: BusyCoordinator::new(config.coordinator, collaborators.flags),
            pending: collaborators.pending,
            plugins: collaborators.plugins,
            publisher: collaborators.publisher,
            counters: collaborators.counters,
            rng: collaborators.rng,
            speech: config.speech.clone(),
            pending_check: config.pending_check_interval,
            chain: None,
            chain_deadline: None,
            timers: Vec::new(),
            fade_generation: 0,
            abandoned_playback: None,
            interaction,
            pack_id: None,
            channels,
        }
    }

    pub(super) async fn run(mut self) {
        let mut pending_tick = tokio::time::interval(self.pending_check);
        pending_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("director started");

        loop {
            let chain_deadline = self.chain_deadline;
            let timer_deadline = self.timers.iter().map(|(at, _)| *at).min();
            let watchdog = self.coordinator.watchdog_deadline();

            tokio::select! {
                input = self.channels.inputs.recv() => match input {
                    Some(input) => self.on_input(input).await,
                    None => break,
                },
                Some(fired) = self.channels.fired.recv() => self.on_fired(fired).await,
                () = sleep_until_opt(chain_deadline) => self.on_chain_timer().await,
                () = sleep_until_opt(timer_deadline) => self.run_due_timers().await,
                () = sleep_until_opt(watchdog) => self.on_watchdog().await,
                _ = pending_tick.tick() => self.release_pending().await,
            }
        }
        tracing::debug!("director stopped");
    }

    fn update_view(&self) {
        self.channels.view.send_replace(DirectorView {
            active_chain: self.chain.as_ref().map(ActionChain::id),
            active_rule: self.chain.as_ref().map(|c| c.rule_id().clone()),
            pack_id: self.pack_id.clone(),
        });
    }

    async fn on_fired(&mut self, fired: FiredRule) {
        match self.coordinator.admit(instant_now()) {
            Admission::Start => self.start_chain(fired.rule_id, fired.actions).await,
            Admission::Queue => {
                let rule_id = fired.rule_id.clone();
                match self.pending.offer(PendingTrigger::from(fired)) {
                    Offer::Queued => tracing::info!(%rule_id, "engine busy, trigger queued"),
                    Offer::Dropped => tracing::info!(%rule_id, "engine busy and slot taken, trigger dropped"),
                }
            }
            Admission::Drop => tracing::debug!(rule_id = %fired.rule_id, "character hidden, trigger dropped"),
        }
    }

    async fn release_pending(&mut self) {
        if self.chain.is_some()
            || !self.pending.is_occupied()
            || !self.coordinator.can_release(instant_now())
        {
            return;
        }
        if let Some(trigger) = self.pending.take() {
            tracing::info!(rule_id = %trigger.rule_id, queued_at = %trigger.queued_at, "releasing pending trigger");
            self.start_chain(trigger.rule_id, trigger.actions).await;
        }
    }

    async fn start_chain(&mut self, rule_id: RuleId, actions: Vec<Action>) {
        let chain = ActionChain::new(rule_id.clone(), actions);
        let chain_id = chain.id();
        tracing::info!(%chain_id, %rule_id, "chain started");
        self.coordinator.chain_started(instant_now());
        self.chain = Some(chain);
        self.update_view();
        publish(&self.publisher, Signal::ChainStarted { chain_id, rule_id }).await;
        self.drive().await;
    }

    /// Advance the active chain up to its next wait.
    async fn drive(&mut self) {
        let Some(chain) = self.chain.as_mut() else {
            return;
        };
        let advance = chain.advance(&mut self.rng, &self.speech);
        for effect in advance.effects {
            self.perform(effect).await;
        }
        match advance.step {
            Step::Wait(Wait::Timer(delay)) => self.chain_deadline = Some(instant_now() + delay),
            Step::Wait(Wait::Playback(_)) => self.chain_deadline = None,
            Step::Done => self.finish_chain().await,
        }
    }

    async fn finish_chain(&mut self) {
        self.chain_deadline = None;
        if let Some(chain) = self.chain.take() {
            tracing::info!(chain_id = %chain.id(), rule_id = %chain.rule_id(), "chain finished");
            publish(&self.publisher, Signal::ChainFinished { chain_id: chain.id() }).await;
        }
        self.coordinator.chain_finished(instant_now());
        self.update_view();
    }

    async fn on_chain_timer(&mut self) {
        self.chain_deadline = None;
        let resumed = self.chain.as_mut().is_some_and(|chain| match chain.waiting_on() {
            Some(wait @ Wait::Timer(_)) => chain.resume(wait),
            _ => false,
        });
        if resumed {
            self.drive().await;
        }
    }

    async fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::Speak(signal) => {
                if let Signal::PlayAudio { request_id, .. } | Signal::Synthesize { request_id, .. } = &signal {
                    self.coordinator.arm_watchdog(*request_id, instant_now());
                }
                publish(&self.publisher, signal).await;
            }
            Effect::Perform(action) => self.perform_action(action).await,
        }
    }

    async fn perform_action(&mut self, action: Action) {
        let now = instant_now();
        match action {
            Action::MoveTo(move_to) => publish(&self.publisher, Signal::MoveTo { pos: move_to.pos }).await,
            Action::FadeOut(fade) => {
                self.fade_generation += 1;
                if let Some(after) = fade.restore_after() {
                    self.timers
                        .push((now + after, Deferred::RestoreOpacity(self.fade_generation)));
                }
                publish(&self.publisher, Signal::FadeOut {
                    opacity: fade.opacity,
                    hover_recovery: fade.hover_recovery,
                })
                .await;
            }
            Action::LockInteraction(lock) => {
                let generation = self.coordinator.lock();
                self.timers
                    .push((now + secs(lock.sec), Deferred::Unlock(generation)));
                publish(&self.publisher, Signal::LockInteraction { secs: lock.sec }).await;
            }
            Action::ExitApp => {
                tracing::info!("exit requested by chain");
                publish(&self.publisher, Signal::ExitApp).await;
                self.channels.exit.send_replace(true);
            }
            Action::QueryLlm(query) => {
                let clipboard = self
                    .channels
                    .snapshot
                    .borrow()
                    .as_ref()
                    .map(|s| s.clipboard.text.clone())
                    .unwrap_or_default();
                let prompt = if clipboard.trim().is_empty() {
                    query.text
                } else {
                    format!("{}\n{clipboard}", query.text)
                };
                self.start_request(prompt).await;
            }
            Action::Plugin(plugin) => self.run_plugin(plugin),
            other => tracing::debug!(action = %other, "not an instant action, ignored"),
        }
    }

    /// Plugins are synchronous and untrusted, so they run on the blocking
    /// pool and nobody waits for them.
    fn run_plugin(&self, action: PluginAction) {
        let plugins = self.plugins.clone();
        drop(tokio::task::spawn_blocking(move || {
            if let Err(err) = plugins.execute(&action) {
                tracing::warn!(action_id = %action.action_id, error = %err, "plugin action failed");
            }
        }));
    }

    async fn start_request(&mut self, prompt: String) {
        let request_id = RequestId::new();
        self.coordinator.arm_watchdog(request_id, instant_now());
        tracing::debug!(%request_id, "language model request started");
        publish(&self.publisher, Signal::QueryLlm { request_id, prompt }).await;
    }

    async fn run_due_timers(&mut self) {
        let now = instant_now();
        let (due, later): (Vec<_>, Vec<_>) = self.timers.drain(..).partition(|(at, _)| *at <= now);
        self.timers = later;
        for (_, deferred) in due {
            match deferred {
                Deferred::Unlock(generation) => {
                    if self.coordinator.unlock(generation) {
                        publish(&self.publisher, Signal::UnlockInteraction).await;
                    }
                }
                Deferred::RestoreOpacity(generation) => {
                    if generation == self.fade_generation {
                        publish(&self.publisher, Signal::RestoreOpacity).await;
                    }
                }
            }
        }
    }

    async fn on_watchdog(&mut self) {
        let Some(recovery) = self.coordinator.fire_watchdog(instant_now()) else {
            return;
        };
        self.chain_deadline = None;
        if let Some(chain) = self.chain.take() {
            tracing::warn!(chain_id = %chain.id(), remaining = chain.remaining().len(), "abandoning stuck chain");
            if let Some(Wait::Playback(request_id)) = chain.waiting_on() {
                self.abandoned_playback = Some(request_id);
            }
            publish(&self.publisher, Signal::ChainFinished { chain_id: chain.id() }).await;
        }
        self.update_view();
        if recovery.unlocked {
            publish(&self.publisher, Signal::UnlockInteraction).await;
        }
        publish(&self.publisher, Signal::ForceRecover).await;
    }

    /// Completions without a request id belong to whatever playback the
    /// active chain waits on, except the first one after the watchdog gave
    /// up on a playback: that one is the late completion of the abandoned
    /// chain.
    async fn on_playback_finished(&mut self, request_id: Option<RequestId>) {
        let request_id = match request_id {
            Some(request_id) => {
                if self.abandoned_playback == Some(request_id) {
                    self.abandoned_playback = None;
                }
                request_id
            }
            None if self.abandoned_playback.take().is_some() => {
                tracing::debug!("late completion of an abandoned playback ignored");
                return;
            }
            None => match self.chain.as_ref().and_then(ActionChain::waiting_on) {
                Some(Wait::Playback(request_id)) => request_id,
                _ => {
                    tracing::debug!("playback completion matched no waiting chain");
                    return;
                }
            },
        };
        self.coordinator.disarm_watchdog(request_id);
        let resumed = self
            .chain
            .as_mut()
            .is_some_and(|chain| chain.resume(Wait::Playback(request_id)));
        if resumed {
            self.drive().await;
        } else {
            tracing::debug!(%request_id, "playback completion matched no waiting chain");
        }
    }

    async fn on_input(&mut self, input: DirectorInput) {
        match input {
            DirectorInput::Inbound(inbound) => self.on_inbound(inbound).await,
            DirectorInput::PackChanged { pack_id, audio_dir } => {
                self.speech.audio_dir = audio_dir;
                if self.pack_id.as_deref() != Some(pack_id.as_str()) {
                    match self.counters.load(&pack_id).await {
                        Ok(counters) => self.interaction.total_clicks = counters.total_clicks,
                        Err(err) => tracing::warn!(%pack_id, error = %err, "failed to load counters"),
                    }
                    self.channels.interaction.send_replace(self.interaction.clone());
                    self.pack_id = Some(pack_id);
                }
                self.update_view();
            }
        }
    }

    async fn on_inbound(&mut self, inbound: Inbound) {
        let now = instant_now();
        match inbound {
            Inbound::PlaybackFinished { request_id } => self.on_playback_finished(request_id).await,
            Inbound::RequestFinished { request_id } => {
                let disarmed = self.coordinator.disarm_watchdog(request_id);
                let resumed = self
                    .chain
                    .as_mut()
                    .is_some_and(|chain| chain.resume(Wait::Playback(request_id)));
                if resumed {
                    self.drive().await;
                } else if !disarmed {
                    tracing::debug!(%request_id, "stale request completion ignored");
                }
            }
            Inbound::UiStatus(status) => self.coordinator.observe_ui(status, now),
            Inbound::Pointer { action } => {
                self.interaction.apply(action, now);
                self.channels.interaction.send_replace(self.interaction.clone());
                if action == PointerEvent::Click {
                    self.save_counters().await;
                }
            }
            Inbound::Weather(weather) => {
                self.channels.weather.send_replace(weather);
            }
            Inbound::UserQuery { text } => self.start_request(text).await,
        }
    }

    async fn save_counters(&mut self) {
        let Some(pack_id) = self.pack_id.as_deref() else {
            return;
        };
        let counters = PersistedCounters {
            total_clicks: self.interaction.total_clicks,
        };
        if let Err(err) = self.counters.save(pack_id, counters).await {
            tracing::warn!(%pack_id, error = %err, "failed to save counters");
        }
    }
}
