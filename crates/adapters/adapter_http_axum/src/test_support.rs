//! In-memory collaborators shared by the handler tests.

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::json;

use nudge_app::engine::{Engine, EngineConfig};
use nudge_app::event_bus::InProcessSignalBus;
use nudge_app::plugin_registry::PluginRegistry;
use nudge_app::ports::{CounterStore, PackSummary, RawReading, RulePack, RuleRepository, SensorProbe};
use nudge_app::services::rule_service::RuleService;
use nudge_domain::error::{NotFoundError, NudgeError};
use nudge_domain::interaction::PersistedCounters;
use nudge_domain::rule::Rule;

use crate::state::AppState;

/// Two packs: `cat` with one rule, `dog` with two.
pub struct StubPacks;

impl RuleRepository for StubPacks {
    fn load_pack(&self, pack_id: &str) -> impl Future<Output = Result<RulePack, NudgeError>> + Send {
        let ids: &[&str] = match pack_id {
            "cat" => &["meow"],
            "dog" => &["woof", "bark"],
            _ => &[],
        };
        let result: Result<RulePack, NudgeError> = if ids.is_empty() {
            Err(NotFoundError {
                entity: "Pack",
                id: pack_id.to_string(),
            }
            .into())
        } else {
            Ok(RulePack {
                pack_id: pack_id.to_string(),
                rules: ids.iter().copied().map(rule).collect(),
                audio_dir: None,
                skipped: 0,
            })
        };
        async move { result }
    }

    fn list_packs(&self) -> impl Future<Output = Result<Vec<PackSummary>, NudgeError>> + Send {
        let packs = ["cat", "dog"]
            .into_iter()
            .map(|id| PackSummary {
                id: id.to_string(),
                name: id.to_uppercase(),
            })
            .collect();
        async move { Ok(packs) }
    }
}

fn rule(id: &str) -> Rule {
    serde_json::from_value(json!({"id": id})).unwrap()
}

struct Quiet;

impl SensorProbe for Quiet {
    fn sample(&mut self) -> impl Future<Output = Option<RawReading>> + Send {
        async { Some(RawReading::default()) }
    }
}

struct NoCounters;

impl CounterStore for NoCounters {
    fn load(&self, _: &str) -> impl Future<Output = Result<PersistedCounters, NudgeError>> + Send {
        async { Ok(PersistedCounters::default()) }
    }

    fn save(&self, _: &str, _: PersistedCounters) -> impl Future<Output = Result<(), NudgeError>> + Send {
        async { Ok(()) }
    }
}

/// App state over an idle engine. Keep the [`Engine`] alive for the test.
pub fn state() -> (AppState<StubPacks>, Engine) {
    let bus = InProcessSignalBus::new(16);
    let engine = Engine::spawn(
        EngineConfig {
            enabled: false,
            ..EngineConfig::default()
        },
        Quiet,
        PluginRegistry::new(),
        bus.clone(),
        NoCounters,
    );
    let rules = Arc::new(RuleService::new(StubPacks, engine.handle(), "cat"));
    (AppState::new(engine.handle(), rules, bus), engine)
}

pub async fn json_body(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}
