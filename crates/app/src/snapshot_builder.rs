//! Snapshot builder: turns raw probe readings into [`SensorSnapshot`]s.
//!
//! The builder is the only place that remembers the previous cycle: change
//! tracking for clipboard and music, idle recovery and fullscreen edges.

use std::collections::{BTreeSet, HashMap};

use nudge_domain::plugin::PluginStatus;
use nudge_domain::snapshot::{ChangeTracked, SensorSnapshot, SnapshotSource, Weather};
use nudge_domain::time::ClockReading;

use crate::ports::RawReading;

/// Idle below this means the user is active again.
const ACTIVE_IDLE_SECS: f64 = 1.0;

/// Values the builder needs from outside the probe.
#[derive(Debug, Clone, Copy)]
pub struct BuildInputs<'a> {
    /// Last weather pushed by the host.
    pub weather: &'a Weather,
    /// Statuses checked this cycle for plugins the reading did not supply.
    pub plugin_statuses: &'a HashMap<String, PluginStatus>,
    /// Plugin ids referenced by the loaded rules.
    pub plugin_ids: &'a BTreeSet<String>,
    pub clock: &'a ClockReading,
}

#[derive(Debug, Clone)]
pub struct Built {
    pub snapshot: SensorSnapshot,
    /// `Some(state)` when fullscreen flipped this cycle.
    pub fullscreen_changed: Option<bool>,
}

#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    last_clipboard: Option<String>,
    last_music: String,
    last_idle_secs: f64,
    last_fullscreen: bool,
}

impl SnapshotBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(&mut self, raw: RawReading, inputs: &BuildInputs<'_>) -> Built {
        let mock = raw.source == SnapshotSource::Mock;

        // Mock text is used as is; live text is compared with the last cycle.
        let clipboard = if mock {
            ChangeTracked::new(raw.clipboard.clone(), true)
        } else {
            let changed = self
                .last_clipboard
                .as_ref()
                .is_some_and(|last| *last != raw.clipboard);
            ChangeTracked::new(raw.clipboard.clone(), changed)
        };
        let music = ChangeTracked::new(
            raw.music_title.clone(),
            mock || raw.music_title != self.last_music,
        );
        self.last_clipboard = Some(raw.clipboard);
        self.last_music = raw.music_title;

        let idle_recovery_secs =
            if raw.idle_secs < ACTIVE_IDLE_SECS && self.last_idle_secs > ACTIVE_IDLE_SECS {
                self.last_idle_secs
            } else {
                0.0
            };
        self.last_idle_secs = raw.idle_secs;

        let fullscreen_changed = (raw.fullscreen != self.last_fullscreen).then_some(raw.fullscreen);
        self.last_fullscreen = raw.fullscreen;

        let mut plugins = raw.plugins;
        for id in inputs.plugin_ids {
            if plugins.contains_key(id) {
                continue;
            }
            let status = if mock {
                PluginStatus::default()
            } else {
                inputs.plugin_statuses.get(id).cloned().unwrap_or_default()
            };
            plugins.insert(id.clone(), status);
        }

        let mut clock = inputs.clock.clone();
        if let Some(month_day) = raw.clock.month_day {
            clock.month_day = month_day;
        }
        if let Some(time) = raw.clock.time {
            clock.time = time;
        }

        Built {
            snapshot: SensorSnapshot {
                source: raw.source,
                hardware: raw.hardware,
                window: raw.window,
                processes: raw.processes,
                clipboard,
                music,
                idle_secs: raw.idle_secs,
                idle_recovery_secs,
                fullscreen: raw.fullscreen,
                weather: raw.weather.unwrap_or_else(|| inputs.weather.clone()),
                clock,
                plugins,
            },
            fullscreen_changed,
        }
    }
}
