//! Plugin registry: looks plugins up by id and isolates their failures.
//!
//! A plugin that returns an error or panics degrades to
//! [`PluginStatus::error`] for status checks and to a logged no-op for
//! actions. Nothing a plugin does can take the engine down.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use nudge_domain::error::PluginError;
use nudge_domain::plugin::{PluginDescriptor, PluginStatus};
use nudge_domain::rule::PluginAction;

use crate::ports::Plugin;

#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|p| &p.descriptor().id))
            .finish()
    }
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, replacing any earlier one with the same id.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        let id = plugin.descriptor().id.clone();
        if let Some(slot) = self.plugins.iter_mut().find(|p| p.descriptor().id == id) {
            tracing::warn!(plugin_id = %id, "replacing already registered plugin");
            *slot = plugin;
        } else {
            tracing::info!(plugin_id = %id, "plugin registered");
            self.plugins.push(plugin);
        }
    }

    #[must_use]
    pub fn with(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.register(plugin);
        self
    }

    #[must_use]
    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.plugins.iter().map(|p| p.descriptor().clone()).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    fn get(&self, id: &str) -> Option<&Arc<dyn Plugin>> {
        self.plugins.iter().find(|p| p.descriptor().id == id)
    }

    /// Ask one plugin for its status.
    #[must_use]
    pub fn check(&self, plugin_id: &str) -> PluginStatus {
        let Some(plugin) = self.get(plugin_id) else {
            tracing::debug!(plugin_id, "status requested for unknown plugin");
            return PluginStatus::default();
        };
        match catch_unwind(AssertUnwindSafe(|| plugin.check_status())) {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => {
                tracing::warn!(plugin_id, error = %err, "plugin status check failed");
                PluginStatus::error()
            }
            Err(_) => {
                tracing::warn!(plugin_id, "plugin panicked during status check");
                PluginStatus::error()
            }
        }
    }

    /// Check every listed plugin.
    pub fn check_many<'a>(
        &self,
        plugin_ids: impl IntoIterator<Item = &'a str>,
    ) -> HashMap<String, PluginStatus> {
        plugin_ids
            .into_iter()
            .map(|id| (id.to_string(), self.check(id)))
            .collect()
    }

    /// Find the plugin an action belongs to: the named plugin when given,
    /// otherwise the first one advertising the action type.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Unknown`] when the named plugin is missing and
    /// [`PluginError::UnknownAction`] when nothing advertises the action.
    pub fn resolve(&self, action: &PluginAction) -> Result<Arc<dyn Plugin>, PluginError> {
        if let Some(plugin_id) = action.plugin_id.as_deref() {
            return self
                .get(plugin_id)
                .cloned()
                .ok_or_else(|| PluginError::Unknown(plugin_id.to_string()));
        }
        self.plugins
            .iter()
            .find(|p| p.descriptor().exposes_action(&action.action_id))
            .cloned()
            .ok_or_else(|| PluginError::UnknownAction(action.action_id.clone()))
    }

    /// Run a plugin action, isolating panics.
    ///
    /// # Errors
    ///
    /// Returns the resolution error, the plugin's own error, or
    /// [`PluginError::Panicked`].
    pub fn execute(&self, action: &PluginAction) -> Result<(), PluginError> {
        let plugin = self.resolve(action)?;
        let plugin_id = plugin.descriptor().id.clone();
        match catch_unwind(AssertUnwindSafe(|| {
            plugin.execute_action(&action.action_id, &action.params)
        })) {
            Ok(result) => result,
            Err(_) => Err(PluginError::Panicked { plugin_id }),
        }
    }
}
