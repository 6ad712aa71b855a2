//! # nudge-adapter-mock
//!
//! A [`SensorProbe`] that reads every value from a JSON file, typically
//! written by a sensor mocking tool while authoring rules.
//!
//! ```json
//! {
//!   "cpu_temp": 85, "gpu_temp": 40, "cpu_usage": 10, "gpu_usage": 5,
//!   "idle_sec": 0, "is_fullscreen": false,
//!   "clip_text": "", "music_title": "",
//!   "win_pname": "code.exe", "win_title": "main.rs", "win_url": "",
//!   "weather": {"condition": "Rain"},
//!   "date": "12-25", "time": "08:30",
//!   "plugins": {"time_sensor_v1": [true, "Time: 08:30", 30]},
//!   "processes": ["steam.exe"]
//! }
//! ```
//!
//! A missing or unparseable file yields no reading, so a [`Fallback`]
//! moves on to the live probe.
//!
//! ## Dependency rule
//!
//! Depends on `nudge-app` (port traits) and `nudge-domain` only.
//!
//! [`Fallback`]: nudge_app::ports::Fallback

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;

use chrono::NaiveTime;
use serde::Deserialize;

use nudge_app::ports::{ClockOverride, RawReading, SensorProbe};
use nudge_domain::plugin::PluginStatus;
use nudge_domain::snapshot::{HardwareStats, ProcessInfo, SnapshotSource, Weather, WindowInfo};

/// File layout. Every field is optional and `null` reads as absent.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MockFile {
    cpu_temp: Option<f64>,
    gpu_temp: Option<f64>,
    cpu_usage: Option<f64>,
    gpu_usage: Option<f64>,
    idle_sec: Option<f64>,
    is_fullscreen: Option<bool>,
    clip_text: Option<String>,
    music_title: Option<String>,
    win_pname: Option<String>,
    win_title: Option<String>,
    win_url: Option<String>,
    weather: Option<Weather>,
    date: Option<String>,
    time: Option<String>,
    plugins: HashMap<String, PluginStatus>,
    processes: Vec<String>,
}

impl MockFile {
    fn into_reading(self) -> RawReading {
        let window = self.win_pname.filter(|name| !name.is_empty()).map(|name| WindowInfo {
            pid: 0,
            process_name: name.to_lowercase(),
            title: self.win_title.unwrap_or_default(),
            url: self.win_url.filter(|url| !url.is_empty()),
            new_since_launch: true,
        });
        let processes = self
            .processes
            .into_iter()
            .map(|name| ProcessInfo {
                pid: 0,
                name: name.to_lowercase(),
                new_since_launch: true,
            })
            .collect();

        RawReading {
            source: SnapshotSource::Mock,
            hardware: HardwareStats {
                cpu_temp: self.cpu_temp.unwrap_or_default(),
                gpu_temp: self.gpu_temp.unwrap_or_default(),
                cpu_usage: self.cpu_usage.unwrap_or_default(),
                gpu_usage: self.gpu_usage.unwrap_or_default(),
            },
            window,
            processes,
            clipboard: self.clip_text.unwrap_or_default(),
            music_title: self.music_title.unwrap_or_default(),
            idle_secs: self.idle_sec.unwrap_or_default(),
            fullscreen: self.is_fullscreen.unwrap_or_default(),
            clock: ClockOverride {
                month_day: self.date.filter(|date| !date.trim().is_empty()),
                time: self.time.as_deref().and_then(parse_time),
            },
            weather: self.weather,
            plugins: self.plugins,
        }
    }
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match NaiveTime::parse_from_str(text, "%H:%M") {
        Ok(time) => Some(time),
        Err(err) => {
            tracing::debug!(text, error = %err, "ignoring unparseable mock time");
            None
        }
    }
}

/// Reads the mock file on every cycle so edits apply immediately.
#[derive(Debug, Clone)]
pub struct MockSensorProbe {
    path: PathBuf,
}

impl MockSensorProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SensorProbe for MockSensorProbe {
    fn sample(&mut self) -> impl Future<Output = Option<RawReading>> + Send {
        let path = self.path.clone();
        async move {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::trace!(path = %path.display(), error = %err, "no mock file");
                    return None;
                }
            };
            match serde_json::from_slice::<MockFile>(&bytes) {
                Ok(file) => Some(file.into_reading()),
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "mock file unparseable");
                    None
                }
            }
        }
    }
}
