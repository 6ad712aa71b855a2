//! Sensor snapshot: one immutable view of the environment per tick.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::plugin::PluginStatus;
use crate::time::ClockReading;

/// Where a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    #[default]
    Live,
    /// Read from the developer override file.
    Mock,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareStats {
    pub cpu_temp: f64,
    pub gpu_temp: f64,
    pub cpu_usage: f64,
    pub gpu_usage: f64,
}

/// The window that currently has focus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub pid: u32,
    pub process_name: String,
    pub title: String,
    pub url: Option<String>,
    /// Whether the owning process started after the engine did.
    pub new_since_launch: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub new_since_launch: bool,
}

/// A text reading together with whether it differs from the previous tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeTracked {
    pub text: String,
    pub changed: bool,
}

impl ChangeTracked {
    #[must_use]
    pub fn new(text: impl Into<String>, changed: bool) -> Self {
        Self {
            text: text.into(),
            changed,
        }
    }
}

/// Last weather report pushed by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub temp_c: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub source: SnapshotSource,
    pub hardware: HardwareStats,
    pub window: Option<WindowInfo>,
    pub processes: Vec<ProcessInfo>,
    pub clipboard: ChangeTracked,
    pub music: ChangeTracked,
    pub idle_secs: f64,
    /// Length of the idle period that just ended, or `0` when the user is
    /// not coming back this tick.
    pub idle_recovery_secs: f64,
    pub fullscreen: bool,
    pub weather: Weather,
    pub clock: ClockReading,
    pub plugins: HashMap<String, PluginStatus>,
}

impl SensorSnapshot {
    #[must_use]
    pub fn foreground_process(&self) -> Option<&str> {
        self.window.as_ref().map(|w| w.process_name.as_str())
    }
}
