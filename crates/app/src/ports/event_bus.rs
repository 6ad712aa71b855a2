//! Signal bus port: publishes outbound signals to collaborators.

use std::future::Future;

use nudge_domain::error::NudgeError;
use nudge_domain::signal::Signal;

/// Publishes engine signals to interested subscribers.
pub trait SignalPublisher {
    /// Publish a signal to all current subscribers.
    fn publish(&self, signal: Signal) -> impl Future<Output = Result<(), NudgeError>> + Send;
}

impl<T: SignalPublisher + Send + Sync> SignalPublisher for std::sync::Arc<T> {
    fn publish(&self, signal: Signal) -> impl Future<Output = Result<(), NudgeError>> + Send {
        (**self).publish(signal)
    }
}
