//! Actions: the steps of a chain run when a rule fires.
//!
//! Any `type` that is not built in is a plugin action, resolved at run time
//! by the plugin registry.

use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Speak {
    #[serde(default)]
    pub text: String,
    #[serde(default = "Speak::default_emotion")]
    pub emotion: String,
    /// Pre-recorded clip, relative to the pack's audio directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_file: Option<String>,
}

impl Speak {
    fn default_emotion() -> String {
        "<E:smile>".to_string()
    }

    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            emotion: Self::default_emotion(),
            voice_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delay {
    #[serde(default = "Delay::default_sec")]
    pub sec: f64,
}

impl Delay {
    fn default_sec() -> f64 {
        1.0
    }

    /// Negative or non-finite delays collapse to zero.
    #[must_use]
    pub fn duration(&self) -> Duration {
        secs(self.sec)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveTo {
    #[serde(default = "MoveTo::default_pos")]
    pub pos: String,
}

impl MoveTo {
    fn default_pos() -> String {
        "bottom_right".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FadeOut {
    #[serde(default = "FadeOut::default_opacity")]
    pub opacity: f64,
    /// Restore full opacity after this many seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sec: Option<f64>,
    #[serde(default)]
    pub hover_recovery: f64,
}

impl FadeOut {
    fn default_opacity() -> f64 {
        0.3
    }

    #[must_use]
    pub fn restore_after(&self) -> Option<Duration> {
        self.sec.filter(|s| *s > 0.0).map(secs)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LockInteraction {
    #[serde(default)]
    pub sec: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryLlm {
    /// Prompt prefix; the clipboard text is appended on its own line.
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RandomGroup {
    #[serde(default)]
    pub branches: Vec<RandomBranch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomBranch {
    #[serde(default = "RandomBranch::default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl RandomBranch {
    fn default_weight() -> f64 {
        1.0
    }

    /// Weight clamped to a usable, non-negative value.
    #[must_use]
    pub fn effective_weight(&self) -> f64 {
        if self.weight.is_finite() && self.weight > 0.0 {
            self.weight
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginAction {
    #[serde(skip)]
    pub action_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// An action whose parameters could not be understood. Skipped at run time.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidAction {
    pub raw: Value,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Speak(Speak),
    Delay(Delay),
    MoveTo(MoveTo),
    FadeOut(FadeOut),
    LockInteraction(LockInteraction),
    ExitApp,
    QueryLlm(QueryLlm),
    RandomGroup(RandomGroup),
    Plugin(PluginAction),
    Invalid(InvalidAction),
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or_default()
}

fn params<T: DeserializeOwned>(raw: &Value) -> Result<T, String> {
    T::deserialize(raw).map_err(|err| err.to_string())
}

impl Action {
    #[must_use]
    pub fn from_value(raw: Value) -> Self {
        let Some(kind) = raw.get("type").and_then(Value::as_str).map(str::to_string) else {
            return Self::Invalid(InvalidAction {
                raw,
                reason: "action has no type".to_string(),
            });
        };
        let parsed = match kind.as_str() {
            "speak" => params(&raw).map(Self::Speak),
            "delay" => params(&raw).map(Self::Delay),
            "move_to" => params(&raw).map(Self::MoveTo),
            "fade_out" => params(&raw).map(Self::FadeOut),
            "lock_interaction" => params(&raw).map(Self::LockInteraction),
            "exit_app" => Ok(Self::ExitApp),
            "query_llm" => params(&raw).map(Self::QueryLlm),
            "random_group" => params(&raw).map(Self::RandomGroup),
            _ => params::<PluginAction>(&raw).map(|plugin| {
                Self::Plugin(PluginAction {
                    action_id: kind.clone(),
                    ..plugin
                })
            }),
        };
        parsed.unwrap_or_else(|reason| Self::Invalid(InvalidAction { raw, reason }))
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Speak(_) => "speak",
            Self::Delay(_) => "delay",
            Self::MoveTo(_) => "move_to",
            Self::FadeOut(_) => "fade_out",
            Self::LockInteraction(_) => "lock_interaction",
            Self::ExitApp => "exit_app",
            Self::QueryLlm(_) => "query_llm",
            Self::RandomGroup(_) => "random_group",
            Self::Plugin(plugin) => &plugin.action_id,
            Self::Invalid(_) => "invalid",
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        let params = match self {
            Self::Speak(p) => serde_json::to_value(p),
            Self::Delay(p) => serde_json::to_value(p),
            Self::MoveTo(p) => serde_json::to_value(p),
            Self::FadeOut(p) => serde_json::to_value(p),
            Self::LockInteraction(p) => serde_json::to_value(p),
            Self::ExitApp => Ok(Value::Object(Map::new())),
            Self::QueryLlm(p) => serde_json::to_value(p),
            Self::RandomGroup(p) => serde_json::to_value(p),
            Self::Plugin(p) => serde_json::to_value(p),
            Self::Invalid(invalid) => return invalid.raw.clone(),
        };
        let mut object = match params {
            Ok(Value::Object(object)) => object,
            _ => Map::new(),
        };
        object.insert("type".to_string(), Value::String(self.type_name().to_string()));
        Value::Object(object)
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Speak(speak) => write!(f, "speak({:?})", speak.text),
            Self::Delay(delay) => write!(f, "delay({}s)", delay.sec),
            Self::MoveTo(m) => write!(f, "move_to({})", m.pos),
            Self::FadeOut(fade) => write!(f, "fade_out({})", fade.opacity),
            Self::LockInteraction(lock) => write!(f, "lock_interaction({}s)", lock.sec),
            Self::ExitApp => f.write_str("exit_app"),
            Self::QueryLlm(_) => f.write_str("query_llm"),
            Self::RandomGroup(group) => write!(f, "random_group({} branches)", group.branches.len()),
            Self::Plugin(plugin) => write!(f, "plugin({})", plugin.action_id),
            Self::Invalid(invalid) => write!(f, "invalid({})", invalid.reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn should_apply_defaults_for_missing_fields() {
        let speak = Action::from_value(json!({"type": "speak", "text": "hi"}));
        assert!(matches!(&speak, Action::Speak(s) if s.emotion == "<E:smile>" && s.voice_file.is_none()));

        let delay = Action::from_value(json!({"type": "delay"}));
        assert!(matches!(&delay, Action::Delay(d) if d.duration() == Duration::from_secs(1)));

        let fade = Action::from_value(json!({"type": "fade_out"}));
        assert!(matches!(&fade, Action::FadeOut(f) if (f.opacity - 0.3).abs() < f64::EPSILON && f.restore_after().is_none()));
    }

    #[test]
    fn should_parse_unknown_type_as_plugin_action() {
        let action = Action::from_value(json!({
            "type": "force_kill_task",
            "params": ["notepad.exe"]
        }));
        let Action::Plugin(plugin) = &action else {
            panic!("expected plugin action, got {action:?}");
        };
        assert_eq!(plugin.action_id, "force_kill_task");
        assert_eq!(plugin.params, vec![json!("notepad.exe")]);
        assert_eq!(action.to_value()["type"], "force_kill_task");
    }

    #[test]
    fn should_keep_malformed_builtin_as_invalid() {
        let raw = json!({"type": "delay", "sec": "soon"});
        let action = Action::from_value(raw.clone());
        assert!(matches!(action, Action::Invalid(_)));
        assert_eq!(action.to_value(), raw);
    }

    #[test]
    fn should_parse_nested_random_group() {
        let action = Action::from_value(json!({
            "type": "random_group",
            "branches": [
                {"weight": 3, "actions": [{"type": "speak", "text": "a"}]},
                {"actions": [{"type": "exit_app"}]}
            ]
        }));
        let Action::RandomGroup(group) = action else {
            panic!("expected random group");
        };
        assert_eq!(group.branches.len(), 2);
        assert!((group.branches[1].weight - 1.0).abs() < f64::EPSILON);
        assert_eq!(group.branches[1].actions, vec![Action::ExitApp]);
    }

    #[test]
    fn should_clamp_negative_weight_and_delay() {
        let branch = RandomBranch {
            weight: -2.0,
            actions: Vec::new(),
        };
        assert!(branch.effective_weight().abs() < f64::EPSILON);
        assert_eq!(Delay { sec: -5.0 }.duration(), Duration::ZERO);
    }

    #[test]
    fn should_display_actions() {
        assert_eq!(Action::Delay(Delay { sec: 2.5 }).to_string(), "delay(2.5s)");
        assert_eq!(Action::ExitApp.to_string(), "exit_app");
    }
}
