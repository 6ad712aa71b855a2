//! Rule service: loads character packs and feeds their rules to the engine.

use std::sync::{PoisonError, RwLock};

use serde::Serialize;

use nudge_domain::error::{NudgeError, NotFoundError};
use nudge_domain::id::RuleId;

use crate::engine::EngineHandle;
use crate::ports::{PackSummary, RulePack, RuleRepository};

/// Outcome of a (re)load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadReport {
    pub pack_id: String,
    pub loaded: usize,
    pub skipped: usize,
}

pub struct RuleService<R> {
    repo: R,
    engine: EngineHandle,
    active: RwLock<String>,
}

impl<R: RuleRepository> RuleService<R> {
    pub fn new(repo: R, engine: EngineHandle, active_pack: impl Into<String>) -> Self {
        Self {
            repo,
            engine,
            active: RwLock::new(active_pack.into()),
        }
    }

    #[must_use]
    pub fn active_pack(&self) -> String {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reload the active pack and push its rules to the engine.
    ///
    /// Rules failing validation are skipped. When the pack cannot be read
    /// the engine gets an empty rule list until the next successful load.
    ///
    /// # Errors
    ///
    /// Returns the repository error after clearing the engine's rules, or
    /// [`NudgeError::ChannelClosed`] when the engine has stopped.
    #[tracing::instrument(skip(self), fields(pack_id = %self.active_pack()))]
    pub async fn reload(&self) -> Result<ReloadReport, NudgeError> {
        let pack_id = self.active_pack();
        let mut pack = match self.repo.load_pack(&pack_id).await {
            Ok(pack) => pack,
            Err(err) => {
                tracing::error!(error = %err, "failed to load rules, running with none");
                self.engine
                    .load_pack(RulePack {
                        pack_id,
                        ..RulePack::default()
                    })
                    .await?;
                return Err(err);
            }
        };

        let before = pack.rules.len();
        pack.rules.retain(|rule| match rule.validate() {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(rule_id = %rule.id, error = %err, "skipping invalid rule");
                false
            }
        });
        let report = ReloadReport {
            pack_id: pack.pack_id.clone(),
            loaded: pack.rules.len(),
            skipped: pack.skipped + (before - pack.rules.len()),
        };
        tracing::info!(loaded = report.loaded, skipped = report.skipped, "rules loaded");
        self.engine.load_pack(pack).await?;
        Ok(report)
    }

    /// Make `pack_id` the active pack and load it.
    ///
    /// # Errors
    ///
    /// Returns [`NudgeError::NotFound`] when no such pack exists, otherwise
    /// whatever [`reload`](Self::reload) returns.
    #[tracing::instrument(skip(self))]
    pub async fn switch_pack(&self, pack_id: &str) -> Result<ReloadReport, NudgeError> {
        let packs = self.repo.list_packs().await?;
        if !packs.iter().any(|pack| pack.id == pack_id) {
            return Err(NotFoundError {
                entity: "Pack",
                id: pack_id.to_string(),
            }
            .into());
        }
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = pack_id.to_string();
        self.reload().await
    }

    /// List the packs available.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_packs(&self) -> Result<Vec<PackSummary>, NudgeError> {
        self.repo.list_packs().await
    }

    /// Clear the cumulative state of one rule.
    ///
    /// # Errors
    ///
    /// Returns [`NudgeError::ChannelClosed`] when the engine has stopped.
    #[tracing::instrument(skip(self))]
    pub async fn reset_rule(&self, rule_id: RuleId) -> Result<(), NudgeError> {
        self.engine.reset_rule(rule_id).await
    }

    /// Clear the cumulative state of every rule.
    ///
    /// # Errors
    ///
    /// Returns [`NudgeError::ChannelClosed`] when the engine has stopped.
    #[tracing::instrument(skip(self))]
    pub async fn reset_all(&self) -> Result<(), NudgeError> {
        self.engine.reset_all().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::Mutex;
    use std::time::Duration;

    use nudge_domain::rule::Rule;
    use serde_json::json;

    use super::*;
    use crate::engine::{Engine, EngineConfig};
    use crate::event_bus::InProcessSignalBus;
    use crate::plugin_registry::PluginRegistry;
    use crate::ports::{CounterStore, RawReading, SensorProbe};
    use nudge_domain::interaction::PersistedCounters;

    #[derive(Default)]
    struct InMemoryPacks {
        packs: Mutex<HashMap<String, Vec<Rule>>>,
    }

    impl InMemoryPacks {
        fn with(self, id: &str, rules: Vec<Rule>) -> Self {
            self.packs.lock().unwrap().insert(id.to_string(), rules);
            self
        }
    }

    impl RuleRepository for InMemoryPacks {
        fn load_pack(&self, pack_id: &str) -> impl Future<Output = Result<RulePack, NudgeError>> + Send {
            let result: Result<RulePack, NudgeError> = self
                .packs
                .lock()
                .unwrap()
                .get(pack_id)
                .cloned()
                .map(|rules| RulePack {
                    pack_id: pack_id.to_string(),
                    rules,
                    audio_dir: None,
                    skipped: 0,
                })
                .ok_or_else(|| {
                    NotFoundError {
                        entity: "Pack",
                        id: pack_id.to_string(),
                    }
                    .into()
                });
            async move { result }
        }

        fn list_packs(&self) -> impl Future<Output = Result<Vec<PackSummary>, NudgeError>> + Send {
            let mut packs: Vec<PackSummary> = self
                .packs
                .lock()
                .unwrap()
                .keys()
                .map(|id| PackSummary {
                    id: id.clone(),
                    name: id.clone(),
                })
                .collect();
            packs.sort_by(|a, b| a.id.cmp(&b.id));
            async move { Ok(packs) }
        }
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

    fn rule(value: serde_json::Value) -> Rule {
        serde_json::from_value(value).unwrap()
    }

    fn engine() -> Engine {
        Engine::spawn(
            EngineConfig {
                enabled: false,
                ..EngineConfig::default()
            },
            Quiet,
            PluginRegistry::new(),
            InProcessSignalBus::new(8),
            NoCounters,
        )
    }

    async fn wait_for_rule_count(engine: &Engine, expected: usize) {
        for _ in 0..100 {
            if engine.handle().status().rule_count == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("rule count never reached {expected}");
    }

    #[tokio::test]
    async fn should_skip_invalid_rules_when_reloading() {
        let engine = engine();
        let repo = InMemoryPacks::default().with(
            "cat",
            vec![
                rule(json!({"id": "ok"})),
                rule(json!({"id": "bad", "probability": 3.0})),
            ],
        );
        let service = RuleService::new(repo, engine.handle(), "cat");

        let report = service.reload().await.unwrap();

        assert_eq!(report.loaded, 1);
        assert_eq!(report.skipped, 1);
        wait_for_rule_count(&engine, 1).await;
    }

    #[tokio::test]
    async fn should_clear_rules_when_pack_cannot_load() {
        let engine = engine();
        let repo = InMemoryPacks::default().with("cat", vec![rule(json!({"id": "ok"}))]);
        let service = RuleService::new(repo, engine.handle(), "cat");
        service.reload().await.unwrap();
        wait_for_rule_count(&engine, 1).await;

        *service.active.write().unwrap() = "gone".to_string();
        let err = service.reload().await.unwrap_err();

        assert!(matches!(err, NudgeError::NotFound(_)));
        wait_for_rule_count(&engine, 0).await;
    }

    #[tokio::test]
    async fn should_switch_to_existing_pack() {
        let engine = engine();
        let repo = InMemoryPacks::default()
            .with("cat", vec![rule(json!({"id": "a"}))])
            .with("dog", vec![rule(json!({"id": "b"})), rule(json!({"id": "c"}))]);
        let service = RuleService::new(repo, engine.handle(), "cat");

        let report = service.switch_pack("dog").await.unwrap();

        assert_eq!(report.pack_id, "dog");
        assert_eq!(service.active_pack(), "dog");
        wait_for_rule_count(&engine, 2).await;
    }

    #[tokio::test]
    async fn should_reject_unknown_pack() {
        let engine = engine();
        let repo = InMemoryPacks::default().with("cat", Vec::new());
        let service = RuleService::new(repo, engine.handle(), "cat");

        let err = service.switch_pack("ghost").await.unwrap_err();

        assert!(matches!(err, NudgeError::NotFound(_)));
        assert_eq!(service.active_pack(), "cat");
    }
}
