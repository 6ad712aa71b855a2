//! Live [`SensorProbe`] for X11 desktops.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sysinfo::{Components, Pid, System};

use nudge_app::ports::{RawReading, SensorProbe};
use nudge_domain::snapshot::{HardwareStats, ProcessInfo, SnapshotSource, WindowInfo};

use crate::command::{self, parse_display_geometry, parse_gpu, parse_shell_geometry};

/// Which optional readings to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveOptions {
    pub monitor_clipboard: bool,
    pub monitor_music: bool,
    pub gpu_monitoring: bool,
    pub idle_probe: bool,
    /// Upper bound for each external tool invocation.
    pub command_timeout: Duration,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            monitor_clipboard: true,
            monitor_music: true,
            gpu_monitoring: true,
            idle_probe: true,
            command_timeout: Duration::from_millis(500),
        }
    }
}

/// Component labels that carry the CPU package temperature.
const CPU_LABELS: &[&str] = &["coretemp", "package", "tctl", "k10temp", "cpu"];

/// `sysinfo` state. Refreshing walks `/proc`, so it runs on the blocking pool.
struct Sensors {
    system: System,
    components: Components,
}

impl Sensors {
    fn refresh(&mut self, started_at: u64) -> (HardwareStats, Vec<ProcessInfo>) {
        self.system.refresh_cpu();
        self.system.refresh_processes();
        self.components.refresh();

        let cpu_temp = self
            .components
            .iter()
            .find(|c| {
                let label = c.label().to_lowercase();
                CPU_LABELS.iter().any(|wanted| label.contains(wanted))
            })
            .map_or(0.0, |c| f64::from(c.temperature()));

        let processes = self
            .system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessInfo {
                pid: pid.as_u32(),
                name: process.name().to_lowercase(),
                new_since_launch: process.start_time() > started_at,
            })
            .collect();

        let hardware = HardwareStats {
            cpu_temp,
            cpu_usage: f64::from(self.system.global_cpu_info().cpu_usage()),
            ..HardwareStats::default()
        };
        (hardware, processes)
    }
}

pub struct LiveSensorProbe {
    options: LiveOptions,
    sensors: Arc<Mutex<Sensors>>,
    /// Unix seconds at construction. Processes started later count as new.
    started_at: u64,
}

impl std::fmt::Debug for LiveSensorProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSensorProbe")
            .field("options", &self.options)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl LiveSensorProbe {
    #[must_use]
    pub fn new(options: LiveOptions) -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_processes();
        let started_at = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        Self {
            options,
            sensors: Arc::new(Mutex::new(Sensors {
                system,
                components: Components::new_with_refreshed_list(),
            })),
            started_at,
        }
    }

    async fn refresh(&self) -> (HardwareStats, Vec<ProcessInfo>) {
        let sensors = Arc::clone(&self.sensors);
        let started_at = self.started_at;
        let refreshed = tokio::task::spawn_blocking(move || {
            sensors
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .refresh(started_at)
        })
        .await;
        refreshed.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "hardware refresh failed");
            (HardwareStats::default(), Vec::new())
        })
    }

    fn process_name(&self, pid: u32) -> Option<(String, bool)> {
        self.sensors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .system
            .process(Pid::from_u32(pid))
            .map(|p| (p.name().to_lowercase(), p.start_time() > self.started_at))
    }

    async fn window(&self) -> (Option<WindowInfo>, bool) {
        let timeout = self.options.command_timeout;
        let Some(pid) = command::output("xdotool", &["getactivewindow", "getwindowpid"], timeout)
            .await
            .and_then(|pid| pid.parse::<u32>().ok())
        else {
            return (None, false);
        };
        let title = command::output("xdotool", &["getactivewindow", "getwindowname"], timeout)
            .await
            .unwrap_or_default();
        let (process_name, new_since_launch) = self.process_name(pid).unwrap_or_default();

        let window = command::output("xdotool", &["getactivewindow", "getwindowgeometry", "--shell"], timeout)
            .await
            .as_deref()
            .and_then(parse_shell_geometry);
        let display = command::output("xdotool", &["getdisplaygeometry"], timeout)
            .await
            .as_deref()
            .and_then(parse_display_geometry);
        let fullscreen = matches!((window, display), (Some(w), Some(d)) if w.0 >= d.0 && w.1 >= d.1);

        let info = WindowInfo {
            pid,
            process_name,
            title,
            url: None,
            new_since_launch,
        };
        (Some(info), fullscreen)
    }

    async fn idle_secs(&self) -> f64 {
        if !self.options.idle_probe {
            return 0.0;
        }
        command::output("xprintidle", &[], self.options.command_timeout)
            .await
            .and_then(|ms| ms.parse::<f64>().ok())
            .map_or(0.0, |ms| ms / 1000.0)
    }

    async fn gpu(&self) -> Option<(f64, f64)> {
        if !self.options.gpu_monitoring {
            return None;
        }
        command::output(
            "nvidia-smi",
            &[
                "--query-gpu=temperature.gpu,utilization.gpu",
                "--format=csv,noheader,nounits",
            ],
            self.options.command_timeout,
        )
        .await
        .as_deref()
        .and_then(parse_gpu)
    }

    async fn clipboard(&self) -> String {
        if !self.options.monitor_clipboard {
            return String::new();
        }
        command::output("xclip", &["-selection", "clipboard", "-o"], self.options.command_timeout)
            .await
            .unwrap_or_default()
    }

    async fn music_title(&self) -> String {
        if !self.options.monitor_music {
            return String::new();
        }
        command::output(
            "playerctl",
            &["metadata", "--format", "{{artist}} - {{title}}"],
            self.options.command_timeout,
        )
        .await
        .unwrap_or_default()
    }
}

impl SensorProbe for LiveSensorProbe {
    fn sample(&mut self) -> impl Future<Output = Option<RawReading>> + Send {
        async move {
            let (mut hardware, processes) = self.refresh().await;
            if let Some((temp, usage)) = self.gpu().await {
                hardware.gpu_temp = temp;
                hardware.gpu_usage = usage;
            }
            let (window, fullscreen) = self.window().await;

            Some(RawReading {
                source: SnapshotSource::Live,
                hardware,
                window,
                processes,
                clipboard: self.clipboard().await,
                music_title: self.music_title().await,
                idle_secs: self.idle_secs().await,
                fullscreen,
                ..RawReading::default()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> LiveOptions {
        LiveOptions {
            monitor_clipboard: false,
            monitor_music: false,
            gpu_monitoring: false,
            idle_probe: false,
            command_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn should_always_produce_a_live_reading() {
        let mut probe = LiveSensorProbe::new(quiet());

        let reading = probe.sample().await.unwrap();

        assert_eq!(reading.source, SnapshotSource::Live);
        assert!(reading.clipboard.is_empty());
        assert!(reading.idle_secs.abs() < f64::EPSILON);
        assert!(reading.hardware.cpu_usage >= 0.0);
        assert!(!reading.processes.is_empty());
    }
}
