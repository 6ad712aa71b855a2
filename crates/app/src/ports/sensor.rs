//! Sensor probe port: raw environment readings for one sampling cycle.
//!
//! Probes never fail: a field that cannot be read keeps its neutral default.
//! Returning `None` means the probe has nothing at all this cycle, which lets
//! [`Fallback`] move on to the next source.

use std::collections::HashMap;
use std::future::Future;

use chrono::NaiveTime;
use nudge_domain::plugin::PluginStatus;
use nudge_domain::snapshot::{HardwareStats, ProcessInfo, SnapshotSource, Weather, WindowInfo};

/// Parts of the local clock a probe wants to pin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClockOverride {
    /// `MM-DD`.
    pub month_day: Option<String>,
    pub time: Option<NaiveTime>,
}

/// Unprocessed values read from one source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReading {
    pub source: SnapshotSource,
    pub hardware: HardwareStats,
    pub window: Option<WindowInfo>,
    pub processes: Vec<ProcessInfo>,
    pub clipboard: String,
    pub music_title: String,
    pub idle_secs: f64,
    pub fullscreen: bool,
    pub clock: ClockOverride,
    /// Replaces the weather pushed by the host when set.
    pub weather: Option<Weather>,
    /// Plugin statuses supplied by the source. They win over live checks.
    pub plugins: HashMap<String, PluginStatus>,
}

/// A source of [`RawReading`]s.
pub trait SensorProbe: Send {
    fn sample(&mut self) -> impl Future<Output = Option<RawReading>> + Send;
}

impl<P: SensorProbe> SensorProbe for Option<P> {
    fn sample(&mut self) -> impl Future<Output = Option<RawReading>> + Send {
        async move {
            match self {
                Some(probe) => probe.sample().await,
                None => None,
            }
        }
    }
}

/// Try `primary`, use `secondary` when it has nothing.
#[derive(Debug)]
pub struct Fallback<A, B> {
    primary: A,
    secondary: B,
}

impl<A, B> Fallback<A, B> {
    pub fn new(primary: A, secondary: B) -> Self {
        Self { primary, secondary }
    }
}

impl<A: SensorProbe, B: SensorProbe> SensorProbe for Fallback<A, B> {
    fn sample(&mut self) -> impl Future<Output = Option<RawReading>> + Send {
        async move {
            if let Some(reading) = self.primary.sample().await {
                return Some(reading);
            }
            self.secondary.sample().await
        }
    }
}
