//! In-process signal bus backed by a tokio broadcast channel.

use std::future::Future;

use tokio::sync::broadcast;

use nudge_domain::error::NudgeError;
use nudge_domain::signal::Signal;

use crate::ports::SignalPublisher;

/// Fans outbound [`Signal`]s out to every connected collaborator.
///
/// Publishing with no subscriber drops the signal and still succeeds.
#[derive(Debug, Clone)]
pub struct InProcessSignalBus {
    sender: broadcast::Sender<Signal>,
}

impl InProcessSignalBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive every signal published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl SignalPublisher for InProcessSignalBus {
    fn publish(&self, signal: Signal) -> impl Future<Output = Result<(), NudgeError>> + Send {
        if self.sender.send(signal).is_err() {
            tracing::trace!("signal published with no subscriber");
        }
        async { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_deliver_signal_to_every_subscriber() {
        let bus = InProcessSignalBus::new(16);
        let mut ui = bus.subscribe();
        let mut voice = bus.subscribe();

        bus.publish(Signal::ExitApp).await.unwrap();

        assert_eq!(ui.recv().await.unwrap(), Signal::ExitApp);
        assert_eq!(voice.recv().await.unwrap(), Signal::ExitApp);
    }

    #[tokio::test]
    async fn should_succeed_when_no_subscribers() {
        let bus = InProcessSignalBus::new(4);
        assert!(bus.publish(Signal::ForceRecover).await.is_ok());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn should_not_replay_signals_sent_before_subscribing() {
        let bus = InProcessSignalBus::new(16);
        bus.publish(Signal::RestoreOpacity).await.unwrap();
        let mut rx = bus.subscribe();
        bus.publish(Signal::UnlockInteraction).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Signal::UnlockInteraction);
    }
}
