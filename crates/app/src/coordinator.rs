//! Busy coordinator: decides whether a trigger may start a chain right now.
//!
//! [`BusyFlags`] are shared atomics so the HTTP surface can read them while
//! the director writes. [`BusyCoordinator`] is owned by the director and adds
//! the timing state: post-busy grace, trigger cooldown, interaction lock
//! generations and the watchdog.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use nudge_domain::id::RequestId;
use nudge_domain::signal::UiStatus;

#[derive(Debug, Default)]
pub struct BusyFlags {
    chain_executing: AtomicBool,
    ui_processing: AtomicBool,
    ui_speaking: AtomicBool,
    ui_listening: AtomicBool,
    interaction_locked: AtomicBool,
    hidden: AtomicBool,
}

/// Point-in-time copy of [`BusyFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct BusyView {
    pub chain_executing: bool,
    pub ui_processing: bool,
    pub ui_speaking: bool,
    pub ui_listening: bool,
    pub interaction_locked: bool,
    pub hidden: bool,
    pub busy: bool,
}

impl BusyFlags {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.chain_executing.load(Ordering::Acquire)
            || self.ui_busy()
            || self.interaction_locked.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn ui_busy(&self) -> bool {
        self.ui_processing.load(Ordering::Acquire)
            || self.ui_speaking.load(Ordering::Acquire)
            || self.ui_listening.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.hidden.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.interaction_locked.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn view(&self) -> BusyView {
        BusyView {
            chain_executing: self.chain_executing.load(Ordering::Acquire),
            ui_processing: self.ui_processing.load(Ordering::Acquire),
            ui_speaking: self.ui_speaking.load(Ordering::Acquire),
            ui_listening: self.ui_listening.load(Ordering::Acquire),
            interaction_locked: self.interaction_locked.load(Ordering::Acquire),
            hidden: self.hidden.load(Ordering::Acquire),
            busy: self.is_busy(),
        }
    }

    fn set_ui(&self, status: UiStatus) {
        self.ui_processing.store(status.processing, Ordering::Release);
        self.ui_speaking.store(status.speaking, Ordering::Release);
        self.ui_listening.store(status.listening, Ordering::Release);
        self.hidden.store(status.hidden, Ordering::Release);
    }

    fn clear_ui_busy(&self) {
        self.ui_processing.store(false, Ordering::Release);
        self.ui_speaking.store(false, Ordering::Release);
        self.ui_listening.store(false, Ordering::Release);
    }
}

/// What to do with a trigger that just arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Start,
    Queue,
    Drop,
}

/// What an expired watchdog cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recovery {
    pub request_id: RequestId,
    /// An interaction lock was still held.
    pub unlocked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Quiet period after the engine stops being busy.
    pub post_busy_delay: Duration,
    /// Minimum spacing between chain starts for released pending triggers.
    pub trigger_cooldown: Duration,
    pub watchdog_timeout: Duration,
    pub debug: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            post_busy_delay: Duration::from_secs(5),
            trigger_cooldown: Duration::from_secs(30),
            watchdog_timeout: Duration::from_secs(130),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Watchdog {
    request_id: RequestId,
    deadline: Instant,
}

#[derive(Debug)]
pub struct BusyCoordinator {
    flags: Arc<BusyFlags>,
    config: CoordinatorConfig,
    grace_until: Option<Instant>,
    last_chain_start: Option<Instant>,
    lock_generation: u64,
    watchdog: Option<Watchdog>,
}

impl BusyCoordinator {
    #[must_use]
    pub fn new(config: CoordinatorConfig, flags: Arc<BusyFlags>) -> Self {
        Self {
            flags,
            config,
            grace_until: None,
            last_chain_start: None,
            lock_generation: 0,
            watchdog: None,
        }
    }

    #[must_use]
    pub fn flags(&self) -> &Arc<BusyFlags> {
        &self.flags
    }

    #[must_use]
    pub fn in_grace(&self, now: Instant) -> bool {
        !self.config.debug && self.grace_until.is_some_and(|until| now < until)
    }

    /// Apply a status report from the UI. A busy to idle edge starts the
    /// post-busy grace period.
    pub fn observe_ui(&mut self, status: UiStatus, now: Instant) {
        let was_busy = self.flags.ui_busy();
        self.flags.set_ui(status);
        if was_busy && !status.is_busy() {
            self.start_grace(now);
        }
    }

    pub fn chain_started(&mut self, now: Instant) {
        self.flags.chain_executing.store(true, Ordering::Release);
        self.last_chain_start = Some(now);
    }

    pub fn chain_finished(&mut self, now: Instant) {
        self.flags.chain_executing.store(false, Ordering::Release);
        self.start_grace(now);
    }

    fn start_grace(&mut self, now: Instant) {
        self.grace_until = Some(now + self.config.post_busy_delay);
    }

    /// Decide what happens to a freshly fired rule.
    #[must_use]
    pub fn admit(&self, now: Instant) -> Admission {
        if self.flags.is_hidden() {
            Admission::Drop
        } else if self.flags.is_busy() || self.in_grace(now) {
            Admission::Queue
        } else {
            Admission::Start
        }
    }

    /// Whether a queued trigger may start. Adds the trigger cooldown to the
    /// checks of [`admit`](Self::admit).
    #[must_use]
    pub fn can_release(&self, now: Instant) -> bool {
        if self.admit(now) != Admission::Start {
            return false;
        }
        self.config.debug
            || self
                .last_chain_start
                .is_none_or(|at| now.saturating_duration_since(at) >= self.config.trigger_cooldown)
    }

    /// Lock interaction and return the generation the unlock must present.
    pub fn lock(&mut self) -> u64 {
        self.lock_generation += 1;
        self.flags.interaction_locked.store(true, Ordering::Release);
        self.lock_generation
    }

    /// Release the lock taken with `generation`. A newer lock keeps holding.
    pub fn unlock(&mut self, generation: u64) -> bool {
        if generation != self.lock_generation || !self.flags.is_locked() {
            return false;
        }
        self.flags.interaction_locked.store(false, Ordering::Release);
        true
    }

    pub fn arm_watchdog(&mut self, request_id: RequestId, now: Instant) {
        self.watchdog = Some(Watchdog {
            request_id,
            deadline: now + self.config.watchdog_timeout,
        });
    }

    /// Disarm when `request_id` is the request being watched. Stale or
    /// unknown completions return `false` and change nothing.
    pub fn disarm_watchdog(&mut self, request_id: RequestId) -> bool {
        if self.watchdog.is_some_and(|w| w.request_id == request_id) {
            self.watchdog = None;
            return true;
        }
        false
    }

    #[must_use]
    pub fn watchdog_deadline(&self) -> Option<Instant> {
        self.watchdog.map(|w| w.deadline)
    }

    /// Force every busy flag off once the watchdog deadline has passed.
    pub fn fire_watchdog(&mut self, now: Instant) -> Option<Recovery> {
        match self.watchdog {
            Some(w) if now >= w.deadline => {
                tracing::warn!(request_id = %w.request_id, "watchdog expired, forcing recovery");
                self.watchdog = None;
                self.flags.clear_ui_busy();
                self.flags.chain_executing.store(false, Ordering::Release);
                let unlocked = self.flags.interaction_locked.swap(false, Ordering::AcqRel);
                self.grace_until = None;
                Some(Recovery {
                    request_id: w.request_id,
                    unlocked,
                })
            }
            _ => None,
        }
    }
}
