//! Condition trees: groups of leaf predicates combined by a [`Logic`] mode.
//!
//! Pack files are hand-written, so parsing never rejects a tree. A node that
//! cannot be understood becomes [`ConditionNode::Invalid`] and evaluates to
//! `false`, keeping the raw JSON so it serializes back unchanged.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::interaction::InteractionStats;
use crate::snapshot::{ChangeTracked, SensorSnapshot};
use crate::time::in_time_range;

/// How the children of a group combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Logic {
    #[default]
    And,
    Or,
    /// Like `And`, but each child stays satisfied once it has matched.
    Cumulative,
}

impl Logic {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Cumulative => "CUMULATIVE",
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown logic mode {0:?}")]
pub struct UnknownLogic(pub String);

impl FromStr for Logic {
    type Err = UnknownLogic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            "CUMULATIVE" => Ok(Self::Cumulative),
            _ => Err(UnknownLogic(s.to_string())),
        }
    }
}

impl Serialize for Logic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Logic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Position of a node inside a rule's condition tree, used to key latches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ConditionPath(Vec<usize>);

impl ConditionPath {
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn child(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(index);
        Self(segments)
    }
}

impl fmt::Display for ConditionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("root")?;
        for segment in &self.0 {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}

/// Everything a leaf may look at.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub snapshot: &'a SensorSnapshot,
    pub interaction: &'a InteractionStats,
    pub now: Instant,
}

/// A node of a condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    Group(ConditionGroup),
    Leaf(Leaf),
    Invalid(InvalidCondition),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ConditionGroup {
    pub logic: Logic,
    pub conditions: Vec<ConditionNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidCondition {
    pub raw: Value,
    pub reason: String,
}

impl ConditionNode {
    #[must_use]
    pub fn group(logic: Logic, conditions: Vec<ConditionNode>) -> Self {
        Self::Group(ConditionGroup { logic, conditions })
    }

    /// Interpret a JSON value as a node. Anything carrying `logic` is a group.
    #[must_use]
    pub fn from_value(raw: Value) -> Self {
        let Some(object) = raw.as_object() else {
            return Self::invalid(raw, "condition must be an object");
        };

        if let Some(logic) = object.get("logic") {
            let Some(logic) = logic.as_str().and_then(|l| l.parse::<Logic>().ok()) else {
                return Self::invalid(raw, "unknown logic mode");
            };
            let conditions = match object.get("conditions") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items.iter().cloned().map(Self::from_value).collect(),
                Some(_) => return Self::invalid(raw, "conditions must be an array"),
            };
            return Self::group(logic, conditions);
        }

        match Leaf::from_value(&raw) {
            Ok(leaf) => Self::Leaf(leaf),
            Err(reason) => Self::invalid(raw, reason),
        }
    }

    fn invalid(raw: Value, reason: impl Into<String>) -> Self {
        Self::Invalid(InvalidCondition {
            raw,
            reason: reason.into(),
        })
    }

    /// Collect every plugin id referenced anywhere below this node.
    pub fn collect_plugin_ids(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Group(group) => {
                for child in &group.conditions {
                    child.collect_plugin_ids(out);
                }
            }
            Self::Leaf(Leaf::Plugin { check, .. }) => {
                out.insert(check.plugin_id.clone());
            }
            Self::Leaf(_) | Self::Invalid(_) => {}
        }
    }
}

impl Serialize for ConditionNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Group(group) => group.serialize(serializer),
            Self::Leaf(leaf) => leaf.serialize(serializer),
            Self::Invalid(invalid) => invalid.raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ConditionNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

impl fmt::Display for ConditionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(group) => {
                write!(f, "{}(", group.logic)?;
                for (index, child) in group.conditions.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
            Self::Leaf(leaf) => write!(f, "{leaf}"),
            Self::Invalid(invalid) => write!(f, "invalid({})", invalid.reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Threshold {
    #[serde(default)]
    pub gt: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessMatch {
    #[serde(default)]
    pub pnames: Vec<String>,
    /// Single-name shorthand, merged with `pnames`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pname: Option<String>,
    #[serde(default)]
    pub only_new: bool,
}

impl ProcessMatch {
    fn names(&self) -> impl Iterator<Item = &str> {
        self.pnames
            .iter()
            .chain(self.pname.iter())
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    fn matches_name(&self, name: &str) -> bool {
        self.names().any(|wanted| wanted.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeywordMatch {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only_on_change: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Seconds {
    #[serde(default)]
    pub sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickWindow {
    #[serde(default = "ClickWindow::default_count")]
    pub count: u32,
    /// Window length in seconds.
    #[serde(default = "ClickWindow::default_duration")]
    pub duration: f64,
}

impl ClickWindow {
    fn default_count() -> u32 {
        1
    }

    fn default_duration() -> f64 {
        5.0
    }
}

impl Default for ClickWindow {
    fn default() -> Self {
        Self {
            count: Self::default_count(),
            duration: Self::default_duration(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DateMatch {
    /// `MM-DD`.
    #[serde(default)]
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    /// `HH:MM-HH:MM`, inclusive.
    #[serde(default)]
    pub range: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PluginCheck {
    pub plugin_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

/// A single predicate over the snapshot and interaction stats.
#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    CpuTemp(Threshold),
    GpuTemp(Threshold),
    CpuUsage(Threshold),
    GpuUsage(Threshold),
    ProcessActive(ProcessMatch),
    ProcessBackground(ProcessMatch),
    ClipMatch(KeywordMatch),
    MusicMatch(KeywordMatch),
    UrlMatch(KeywordMatch),
    TitleMatch(KeywordMatch),
    WeatherMatch(KeywordMatch),
    HoverDuration(Seconds),
    LeaveDuration(Seconds),
    LongPress(Seconds),
    IdleDuration(Seconds),
    IdleRecovery(Seconds),
    ClickCount(ClickWindow),
    Fullscreen,
    DateMatch(DateMatch),
    TimeRange(TimeRange),
    /// A plugin-provided status. `kind` keeps the authored type name.
    Plugin { kind: String, check: PluginCheck },
}

fn params<T: DeserializeOwned>(raw: &Value) -> Result<T, String> {
    T::deserialize(raw).map_err(|err| err.to_string())
}

impl Leaf {
    /// Parse a leaf from its JSON form.
    ///
    /// Unknown types carrying a `plugin_id` are treated as plugin checks.
    ///
    /// # Errors
    ///
    /// Returns a human readable reason when the type is missing or unknown,
    /// or when the parameters have the wrong shape.
    pub fn from_value(raw: &Value) -> Result<Self, String> {
        let Some(kind) = raw.get("type").and_then(Value::as_str) else {
            return Err("condition has no type".to_string());
        };
        let leaf = match kind {
            "cpu_temp" => Self::CpuTemp(params(raw)?),
            "gpu_temp" => Self::GpuTemp(params(raw)?),
            "cpu_usage" => Self::CpuUsage(params(raw)?),
            "gpu_usage" => Self::GpuUsage(params(raw)?),
            "process_active" => Self::ProcessActive(params(raw)?),
            "process_background" => Self::ProcessBackground(params(raw)?),
            "clip_match" => Self::ClipMatch(params(raw)?),
            "music_match" => Self::MusicMatch(params(raw)?),
            "url_match" => Self::UrlMatch(params(raw)?),
            "title_match" => Self::TitleMatch(params(raw)?),
            "weather_match" => Self::WeatherMatch(params(raw)?),
            "hover_duration" => Self::HoverDuration(params(raw)?),
            "leave_duration" => Self::LeaveDuration(params(raw)?),
            "long_press" => Self::LongPress(params(raw)?),
            "idle_duration" => Self::IdleDuration(params(raw)?),
            "idle_recovery" => Self::IdleRecovery(params(raw)?),
            "click_count" => Self::ClickCount(params(raw)?),
            "fullscreen" => Self::Fullscreen,
            "date_match" => Self::DateMatch(params(raw)?),
            "time_range" => Self::TimeRange(params(raw)?),
            other if other == "plugin_check"
                || other == "plugin_status"
                || raw.get("plugin_id").is_some() =>
            {
                Self::Plugin {
                    kind: other.to_string(),
                    check: params(raw)?,
                }
            }
            other => return Err(format!("unknown condition type {other}")),
        };
        Ok(leaf)
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::CpuTemp(_) => "cpu_temp",
            Self::GpuTemp(_) => "gpu_temp",
            Self::CpuUsage(_) => "cpu_usage",
            Self::GpuUsage(_) => "gpu_usage",
            Self::ProcessActive(_) => "process_active",
            Self::ProcessBackground(_) => "process_background",
            Self::ClipMatch(_) => "clip_match",
            Self::MusicMatch(_) => "music_match",
            Self::UrlMatch(_) => "url_match",
            Self::TitleMatch(_) => "title_match",
            Self::WeatherMatch(_) => "weather_match",
            Self::HoverDuration(_) => "hover_duration",
            Self::LeaveDuration(_) => "leave_duration",
            Self::LongPress(_) => "long_press",
            Self::IdleDuration(_) => "idle_duration",
            Self::IdleRecovery(_) => "idle_recovery",
            Self::ClickCount(_) => "click_count",
            Self::Fullscreen => "fullscreen",
            Self::DateMatch(_) => "date_match",
            Self::TimeRange(_) => "time_range",
            Self::Plugin { kind, .. } => kind,
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        let params = match self {
            Self::CpuTemp(p) | Self::GpuTemp(p) | Self::CpuUsage(p) | Self::GpuUsage(p) => {
                serde_json::to_value(p)
            }
            Self::ProcessActive(p) | Self::ProcessBackground(p) => serde_json::to_value(p),
            Self::ClipMatch(p)
            | Self::MusicMatch(p)
            | Self::UrlMatch(p)
            | Self::TitleMatch(p)
            | Self::WeatherMatch(p) => serde_json::to_value(p),
            Self::HoverDuration(p)
            | Self::LeaveDuration(p)
            | Self::LongPress(p)
            | Self::IdleDuration(p)
            | Self::IdleRecovery(p) => serde_json::to_value(p),
            Self::ClickCount(p) => serde_json::to_value(p),
            Self::Fullscreen => Ok(Value::Object(Map::new())),
            Self::DateMatch(p) => serde_json::to_value(p),
            Self::TimeRange(p) => serde_json::to_value(p),
            Self::Plugin { check, .. } => serde_json::to_value(check),
        };
        let mut object = match params {
            Ok(Value::Object(object)) => object,
            _ => Map::new(),
        };
        object.insert("type".to_string(), Value::String(self.type_name().to_string()));
        Value::Object(object)
    }

    /// Evaluate the predicate. Pure: no state is read beyond `ctx`.
    #[must_use]
    pub fn matches(&self, ctx: &EvalContext<'_>) -> bool {
        let snapshot = ctx.snapshot;
        let interaction = ctx.interaction;
        match self {
            Self::CpuTemp(t) => snapshot.hardware.cpu_temp > t.gt,
            Self::GpuTemp(t) => snapshot.hardware.gpu_temp > t.gt,
            Self::CpuUsage(t) => snapshot.hardware.cpu_usage > t.gt,
            Self::GpuUsage(t) => snapshot.hardware.gpu_usage > t.gt,
            Self::ProcessActive(p) => snapshot
                .window
                .as_ref()
                .is_some_and(|w| p.matches_name(&w.process_name) && (!p.only_new || w.new_since_launch)),
            Self::ProcessBackground(p) => snapshot
                .processes
                .iter()
                .any(|proc| p.matches_name(&proc.name) && (!p.only_new || proc.new_since_launch)),
            Self::ClipMatch(k) => tracked_keywords(&snapshot.clipboard, k, true),
            Self::MusicMatch(k) => tracked_keywords(&snapshot.music, k, true),
            Self::UrlMatch(k) => snapshot
                .window
                .as_ref()
                .and_then(|w| w.url.as_deref())
                .is_some_and(|url| contains_any(url, &k.keywords)),
            Self::TitleMatch(k) => snapshot
                .window
                .as_ref()
                .is_some_and(|w| contains_any(&w.title, &k.keywords)),
            Self::WeatherMatch(k) => contains_any(&snapshot.weather.condition, &k.keywords),
            Self::HoverDuration(s) => exceeds(interaction.hover_duration(ctx.now), s.sec),
            Self::LeaveDuration(s) => exceeds(interaction.leave_duration(ctx.now), s.sec),
            Self::LongPress(s) => exceeds(interaction.press_duration(ctx.now), s.sec),
            Self::IdleDuration(s) => snapshot.idle_secs > s.sec,
            Self::IdleRecovery(s) => snapshot.idle_recovery_secs > s.sec,
            Self::ClickCount(c) => {
                let window = Duration::try_from_secs_f64(c.duration.max(0.0)).unwrap_or_default();
                let wanted = usize::try_from(c.count).unwrap_or(usize::MAX);
                interaction.clicks_within(ctx.now, window) >= wanted
            }
            Self::Fullscreen => snapshot.fullscreen,
            Self::DateMatch(d) => {
                let date = d.date.trim();
                !date.is_empty() && snapshot.clock.month_day == date
            }
            Self::TimeRange(r) => in_time_range(&r.range, snapshot.clock.time),
            Self::Plugin { check, .. } => snapshot.plugins.get(&check.plugin_id).is_some_and(|status| {
                status.active
                    && check.gt.is_none_or(|gt| status.value > gt)
                    && (check.keywords.is_empty() || contains_any(&status.text, &check.keywords))
            }),
        }
    }
}

fn exceeds(elapsed: Option<Duration>, secs: f64) -> bool {
    elapsed.is_some_and(|d| d.as_secs_f64() > secs)
}

fn tracked_keywords(field: &ChangeTracked, spec: &KeywordMatch, default_on_change: bool) -> bool {
    if spec.only_on_change.unwrap_or(default_on_change) && !field.changed {
        return false;
    }
    contains_any(&field.text, &spec.keywords)
}

/// Case-insensitive substring search. Blank keywords never match.
fn contains_any(text: &str, keywords: &[String]) -> bool {
    if text.is_empty() {
        return false;
    }
    let haystack = text.to_lowercase();
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .any(|k| haystack.contains(&k.to_lowercase()))
}

impl Serialize for Leaf {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Leaf {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Self::from_value(&raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.type_name();
        match self {
            Self::CpuTemp(t) | Self::GpuTemp(t) | Self::CpuUsage(t) | Self::GpuUsage(t) => {
                write!(f, "{name}(>{})", t.gt)
            }
            Self::ProcessActive(p) | Self::ProcessBackground(p) => {
                let names: Vec<&str> = p.names().collect();
                write!(f, "{name}({})", names.join("|"))
            }
            Self::ClipMatch(k)
            | Self::MusicMatch(k)
            | Self::UrlMatch(k)
            | Self::TitleMatch(k)
            | Self::WeatherMatch(k) => write!(f, "{name}({})", k.keywords.join("|")),
            Self::HoverDuration(s)
            | Self::LeaveDuration(s)
            | Self::LongPress(s)
            | Self::IdleDuration(s)
            | Self::IdleRecovery(s) => write!(f, "{name}(>{}s)", s.sec),
            Self::ClickCount(c) => write!(f, "{name}({} in {}s)", c.count, c.duration),
            Self::Fullscreen => f.write_str(name),
            Self::DateMatch(d) => write!(f, "{name}({})", d.date),
            Self::TimeRange(r) => write!(f, "{name}({})", r.range),
            Self::Plugin { check, .. } => write!(f, "{name}({})", check.plugin_id),
        }
    }
}
