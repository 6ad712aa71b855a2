//! Plugin port: third-party status sensors and custom actions.
//!
//! Plugins are synchronous and may be slow or misbehave; the
//! [`PluginRegistry`](crate::plugin_registry::PluginRegistry) isolates them.

use serde_json::Value;

use nudge_domain::error::PluginError;
use nudge_domain::plugin::{PluginDescriptor, PluginStatus};

/// A loaded plugin.
pub trait Plugin: Send + Sync {
    fn descriptor(&self) -> &PluginDescriptor;

    /// Report `(active, text, value)` for the current moment.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Failed`] when the status cannot be computed.
    fn check_status(&self) -> Result<PluginStatus, PluginError>;

    /// Run a custom action. Called fire-and-forget from the action chain.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] when the action is unknown or fails.
    fn execute_action(&self, action_id: &str, params: &[Value]) -> Result<(), PluginError>;
}
