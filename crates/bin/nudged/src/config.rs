//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `nudge.toml` in the working directory. Every field has a
//! default so the file is optional. Environment variables take precedence
//! over file values.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use nudge_adapter_sysinfo::LiveOptions;
use nudge_app::coordinator::CoordinatorConfig;
use nudge_app::engine::EngineConfig;
use nudge_app::executor::SpeechRouter;
use nudge_app::scheduler::SchedulerConfig;

/// Extra time the watchdog allows on top of the synthesis timeout.
const WATCHDOG_MARGIN_SECS: f64 = 10.0;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub packs: PacksConfig,
    pub behavior: BehaviorConfig,
    pub sensors: SensorsConfig,
    pub voice: VoiceConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PacksConfig {
    pub dir: PathBuf,
    /// Manifest id or folder name of the pack to start with.
    pub active: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub enabled: bool,
    pub interval_secs: f64,
    pub trigger_cooldown_secs: f64,
    pub post_busy_delay_secs: f64,
    pub pending_check_secs: f64,
    /// Read the mock sensor file and bypass cooldowns and probability.
    pub debug_trigger: bool,
    pub text_read_secs_per_char: f64,
    pub text_read_multiplier: f64,
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    pub mock_file: PathBuf,
    pub monitor_clipboard: bool,
    pub monitor_music: bool,
    pub gpu_monitoring: bool,
    pub idle_probe: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub synthesis_enabled: bool,
    pub synthesis_timeout_secs: f64,
}

impl Config {
    /// Load configuration from `nudge.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("NUDGE_CONFIG").unwrap_or_else(|_| "nudge.toml".to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("NUDGE_HOST") {
            self.server.host = val;
        }
        if let Some(port) = env_parse("NUDGE_PORT") {
            self.server.port = port;
        }
        if let Ok(val) = std::env::var("NUDGE_BIND") {
            if let Some((host, port)) = val.rsplit_once(':') {
                self.server.host = host.to_string();
                if let Ok(port) = port.parse() {
                    self.server.port = port;
                }
            }
        }
        if let Ok(val) = std::env::var("NUDGE_PACKS_DIR") {
            self.packs.dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("NUDGE_PACK") {
            self.packs.active = val;
        }
        if let Some(debug) = env_parse("NUDGE_DEBUG_TRIGGER") {
            self.behavior.debug_trigger = debug;
        }
        if let Ok(val) = std::env::var("NUDGE_MOCK_FILE") {
            self.sensors.mock_file = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("NUDGE_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.packs.active.trim().is_empty() {
            return Err(ConfigError::Validation("active pack must be set".to_string()));
        }
        positive("behavior.interval_secs", self.behavior.interval_secs)?;
        positive("behavior.pending_check_secs", self.behavior.pending_check_secs)?;
        positive("voice.synthesis_timeout_secs", self.voice.synthesis_timeout_secs)?;
        for (name, value) in [
            ("behavior.trigger_cooldown_secs", self.behavior.trigger_cooldown_secs),
            ("behavior.post_busy_delay_secs", self.behavior.post_busy_delay_secs),
            ("behavior.text_read_secs_per_char", self.behavior.text_read_secs_per_char),
            ("behavior.text_read_multiplier", self.behavior.text_read_multiplier),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Validation(format!("{name} must not be negative")));
            }
        }
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Engine settings. Call after [`load`](Self::load) validated the values.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        let behavior = &self.behavior;
        EngineConfig {
            enabled: behavior.enabled,
            sample_interval: Duration::from_secs_f64(behavior.interval_secs),
            pending_check_interval: Duration::from_secs_f64(behavior.pending_check_secs),
            scheduler: SchedulerConfig {
                global_cooldown: Duration::from_secs_f64(behavior.trigger_cooldown_secs),
                debug: behavior.debug_trigger,
            },
            coordinator: CoordinatorConfig {
                post_busy_delay: Duration::from_secs_f64(behavior.post_busy_delay_secs),
                trigger_cooldown: Duration::from_secs_f64(behavior.trigger_cooldown_secs),
                watchdog_timeout: Duration::from_secs_f64(
                    self.voice.synthesis_timeout_secs + WATCHDOG_MARGIN_SECS,
                ),
                debug: behavior.debug_trigger,
            },
            speech: SpeechRouter {
                audio_dir: None,
                synthesis_enabled: self.voice.synthesis_enabled,
                secs_per_char: behavior.text_read_secs_per_char,
                read_multiplier: behavior.text_read_multiplier,
            },
            seed: behavior.seed,
        }
    }

    #[must_use]
    pub fn live_options(&self) -> LiveOptions {
        LiveOptions {
            monitor_clipboard: self.sensors.monitor_clipboard,
            monitor_music: self.sensors.monitor_music,
            gpu_monitoring: self.sensors.gpu_monitoring,
            idle_probe: self.sensors.idle_probe,
            ..LiveOptions::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|val| val.parse().ok())
}

fn positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{name} must be positive")))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7878,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "nudged=info,nudge=info,tower_http=info".to_string(),
        }
    }
}

impl Default for PacksConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("packs"),
            active: "default".to_string(),
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 1.0,
            trigger_cooldown_secs: 30.0,
            post_busy_delay_secs: 5.0,
            pending_check_secs: 1.0,
            debug_trigger: false,
            text_read_secs_per_char: 0.2,
            text_read_multiplier: 1.5,
            seed: None,
        }
    }
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            mock_file: PathBuf::from("TEMP/mock_data.json"),
            monitor_clipboard: true,
            monitor_music: true,
            gpu_monitoring: true,
            idle_probe: true,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            synthesis_enabled: true,
            synthesis_timeout_secs: 120.0,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Validation(String),
}
