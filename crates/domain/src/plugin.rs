//! Plugin descriptors and status triples.

use serde::{Deserialize, Serialize};

/// Static description a plugin advertises when it is registered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub triggers: Vec<TriggerDescriptor>,
    #[serde(default)]
    pub actions: Vec<ActionDescriptor>,
}

impl PluginDescriptor {
    /// Whether this plugin advertises an action of the given type.
    #[must_use]
    pub fn exposes_action(&self, action_type: &str) -> bool {
        self.actions.iter().any(|a| a.action_type == action_type)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerDescriptor {
    #[serde(rename = "type")]
    pub trigger_type: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub label: String,
    /// Names of the positional parameters the action expects.
    #[serde(default)]
    pub params: Vec<String>,
}

/// Result of a plugin status check: `(active, text, value)`.
///
/// Serialized as a three element array, which is also how mock files
/// describe plugin readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "(bool, String, f64)", into = "(bool, String, f64)")]
pub struct PluginStatus {
    pub active: bool,
    pub text: String,
    pub value: f64,
}

impl PluginStatus {
    #[must_use]
    pub fn new(active: bool, text: impl Into<String>, value: f64) -> Self {
        Self {
            active,
            text: text.into(),
            value,
        }
    }

    /// Reading recorded when a plugin fails or panics.
    #[must_use]
    pub fn error() -> Self {
        Self::new(false, "error", 0.0)
    }
}

impl From<(bool, String, f64)> for PluginStatus {
    fn from((active, text, value): (bool, String, f64)) -> Self {
        Self {
            active,
            text,
            value,
        }
    }
}

impl From<PluginStatus> for (bool, String, f64) {
    fn from(status: PluginStatus) -> Self {
        (status.active, status.text, status.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_deserialize_status_from_triple() {
        let status: PluginStatus = serde_json::from_str(r#"[true, "half hour", 30]"#).unwrap();
        assert_eq!(status, PluginStatus::new(true, "half hour", 30.0));
    }

    #[test]
    fn should_find_advertised_action() {
        let descriptor: PluginDescriptor = serde_json::from_value(serde_json::json!({
            "id": "sys_ext_v1",
            "name": "System extension",
            "actions": [{"type": "force_kill_task", "label": "Kill", "params": ["pname"]}]
        }))
        .unwrap();
        assert!(descriptor.exposes_action("force_kill_task"));
        assert!(!descriptor.exposes_action("reboot"));
    }
}
