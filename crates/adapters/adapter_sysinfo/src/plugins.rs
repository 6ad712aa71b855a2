//! Built-in plugins.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{NaiveTime, Timelike};
use serde_json::Value;
use sysinfo::System;

use nudge_app::ports::Plugin;
use nudge_domain::error::PluginError;
use nudge_domain::plugin::{ActionDescriptor, PluginDescriptor, PluginStatus, TriggerDescriptor};

/// Every built-in plugin, ready to register.
#[must_use]
pub fn builtin() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(TimeSensorPlugin::new()),
        Arc::new(SystemExtensionPlugin::new()),
    ]
}

fn status_trigger(label: &str) -> TriggerDescriptor {
    TriggerDescriptor {
        trigger_type: "plugin_status".to_string(),
        label: label.to_string(),
    }
}

/// Active on the hour and on the half hour.
///
/// Status is `(hit, "Time: HH:MM", minute)`.
#[derive(Debug)]
pub struct TimeSensorPlugin {
    descriptor: PluginDescriptor,
}

impl Default for TimeSensorPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSensorPlugin {
    pub const ID: &'static str = "time_sensor_v1";

    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor {
                id: Self::ID.to_string(),
                name: "Hour and half-hour detector".to_string(),
                triggers: vec![status_trigger("On the hour or half hour")],
                actions: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn status_at(time: NaiveTime) -> PluginStatus {
        let minute = time.minute();
        PluginStatus::new(
            minute == 0 || minute == 30,
            format!("Time: {}", time.format("%H:%M")),
            f64::from(minute),
        )
    }
}

impl Plugin for TimeSensorPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn check_status(&self) -> Result<PluginStatus, PluginError> {
        Ok(Self::status_at(chrono::Local::now().time()))
    }

    fn execute_action(&self, action_id: &str, _params: &[Value]) -> Result<(), PluginError> {
        Err(PluginError::UnknownAction(action_id.to_string()))
    }
}

/// Watches for a notepad process and can kill processes by name.
///
/// Status is `(running, text, instances)`.
pub struct SystemExtensionPlugin {
    descriptor: PluginDescriptor,
    system: Mutex<System>,
}

impl std::fmt::Debug for SystemExtensionPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemExtensionPlugin")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl Default for SystemExtensionPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemExtensionPlugin {
    pub const ID: &'static str = "sys_ext_v1";
    pub const KILL_ACTION: &'static str = "force_kill_task";
    const WATCHED: &'static str = "notepad.exe";

    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor {
                id: Self::ID.to_string(),
                name: "System extension".to_string(),
                triggers: vec![status_trigger("Notepad running")],
                actions: vec![ActionDescriptor {
                    action_type: Self::KILL_ACTION.to_string(),
                    label: "Force kill process".to_string(),
                    params: vec!["process_name".to_string()],
                }],
            },
            system: Mutex::new(System::new()),
        }
    }

    fn with_processes<T>(&self, f: impl FnOnce(&System) -> T) -> T {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes();
        f(&system)
    }

    fn count_named(system: &System, name: &str) -> usize {
        system
            .processes()
            .values()
            .filter(|p| p.name().eq_ignore_ascii_case(name))
            .count()
    }
}

impl Plugin for SystemExtensionPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn check_status(&self) -> Result<PluginStatus, PluginError> {
        let count = self.with_processes(|system| Self::count_named(system, Self::WATCHED));
        let running = count > 0;
        let text = if running { "Notepad is active" } else { "Idle" };
        #[allow(clippy::cast_precision_loss)]
        let instances = count as f64;
        Ok(PluginStatus::new(running, text, instances))
    }

    fn execute_action(&self, action_id: &str, params: &[Value]) -> Result<(), PluginError> {
        if action_id != Self::KILL_ACTION {
            return Err(PluginError::UnknownAction(action_id.to_string()));
        }
        let name = params
            .first()
            .and_then(Value::as_str)
            .unwrap_or(Self::WATCHED)
            .to_string();
        let killed = self.with_processes(|system| {
            system
                .processes()
                .values()
                .filter(|p| p.name().eq_ignore_ascii_case(&name))
                .filter(|p| p.kill())
                .count()
        });
        tracing::info!(plugin_id = Self::ID, process = %name, killed, "processes killed");
        Ok(())
    }
}
