//! Shared application state for axum handlers.

use std::sync::Arc;

use nudge_app::engine::EngineHandle;
use nudge_app::event_bus::InProcessSignalBus;
use nudge_app::ports::RuleRepository;
use nudge_app::services::rule_service::RuleService;

/// Application state shared across all axum handlers.
///
/// Generic over the rule repository to avoid dynamic dispatch. `Clone` is
/// implemented by hand so `R` itself need not be `Clone`.
pub struct AppState<R> {
    pub engine: EngineHandle,
    pub rules: Arc<RuleService<R>>,
    /// Bus the SSE stream subscribes to.
    pub signals: InProcessSignalBus,
}

impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            rules: Arc::clone(&self.rules),
            signals: self.signals.clone(),
        }
    }
}

impl<R> AppState<R>
where
    R: RuleRepository + Send + Sync + 'static,
{
    pub fn new(engine: EngineHandle, rules: Arc<RuleService<R>>, signals: InProcessSignalBus) -> Self {
        Self {
            engine,
            rules,
            signals,
        }
    }
}
