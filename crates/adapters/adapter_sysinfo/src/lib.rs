//! # nudge-adapter-sysinfo
//!
//! Live environment readings for the trigger engine.
//!
//! ## Sources
//!
//! | Reading | Source |
//! |---------|--------|
//! | CPU usage, temperature, processes | [`sysinfo`](https://docs.rs/sysinfo) |
//! | GPU temperature and usage | `nvidia-smi` |
//! | Foreground window, fullscreen | `xdotool` |
//! | Idle time | `xprintidle` |
//! | Clipboard | `xclip` |
//! | Music title | `playerctl` |
//!
//! Every external tool is optional. A tool that is missing, fails or times
//! out leaves its fields at their neutral default.
//!
//! ## Built-in plugins
//!
//! - `time_sensor_v1` is active on the hour and half hour
//! - `sys_ext_v1` reports running notepad instances and can kill them
//!
//! ## Dependency rule
//!
//! Depends on `nudge-app` (port traits) and `nudge-domain` only.

mod command;
pub mod plugins;
pub mod probe;

pub use plugins::{SystemExtensionPlugin, TimeSensorPlugin, builtin};
pub use probe::{LiveOptions, LiveSensorProbe};
