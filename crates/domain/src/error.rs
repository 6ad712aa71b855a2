//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`NudgeError`]
//! via `#[from]` or an explicit `From` impl. Adapters box their errors into
//! [`NudgeError::Storage`].

/// Top-level error for the trigger engine.
#[derive(Debug, thiserror::Error)]
pub enum NudgeError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("plugin error")]
    Plugin(#[from] PluginError),

    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A background task of the engine is gone.
    #[error("engine channel closed: {0}")]
    ChannelClosed(&'static str),
}

/// A rule or pack violates a domain invariant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("rule id must not be empty")]
    EmptyId,

    #[error("probability {0} is outside of [0, 1]")]
    ProbabilityOutOfRange(f64),

    #[error("cooldown {0} must not be negative")]
    NegativeCooldown(f64),

    #[error("pack id must not be empty")]
    EmptyPackId,
}

/// A lookup by identifier found nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// A plugin could not answer a status check or run an action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    #[error("plugin {0} is not registered")]
    Unknown(String),

    #[error("no plugin exposes action {0}")]
    UnknownAction(String),

    #[error("plugin {plugin_id} panicked")]
    Panicked { plugin_id: String },

    #[error("plugin {plugin_id} failed: {message}")]
    Failed { plugin_id: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_not_found_with_entity_and_id() {
        let err = NotFoundError {
            entity: "pack",
            id: "kurisu".to_string(),
        };
        assert_eq!(err.to_string(), "pack kurisu not found");
    }

    #[test]
    fn should_wrap_validation_error_when_converted() {
        let err: NudgeError = ValidationError::ProbabilityOutOfRange(1.5).into();
        assert!(matches!(
            err,
            NudgeError::Validation(ValidationError::ProbabilityOutOfRange(_))
        ));
    }

    #[test]
    fn should_expose_source_when_storage_error() {
        let io = std::io::Error::other("disk gone");
        let err = NudgeError::Storage(Box::new(io));
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("disk gone"));
    }
}
