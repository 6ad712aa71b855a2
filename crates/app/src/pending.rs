//! Pending trigger slot: holds one deferred rule while the engine is busy.
//!
//! The slot never queues a second trigger: an offer arriving while it is
//! occupied is dropped and the slot keeps its original content.

use std::sync::{Mutex, PoisonError};

use nudge_domain::id::RuleId;
use nudge_domain::rule::Action;
use nudge_domain::time::Timestamp;

use crate::scheduler::FiredRule;

#[derive(Debug, Clone, PartialEq)]
pub struct PendingTrigger {
    pub rule_id: RuleId,
    pub actions: Vec<Action>,
    pub queued_at: Timestamp,
}

impl From<FiredRule> for PendingTrigger {
    fn from(fired: FiredRule) -> Self {
        Self {
            rule_id: fired.rule_id,
            actions: fired.actions,
            queued_at: nudge_domain::time::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    Dropped,
}

#[derive(Debug, Default)]
pub struct PendingSlot {
    slot: Mutex<Option<PendingTrigger>>,
}

impl PendingSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&self, trigger: PendingTrigger) -> Offer {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            tracing::debug!(rule_id = %trigger.rule_id, "pending slot occupied, dropping trigger");
            return Offer::Dropped;
        }
        tracing::debug!(rule_id = %trigger.rule_id, "trigger queued");
        *slot = Some(trigger);
        Offer::Queued
    }

    pub fn take(&self) -> Option<PendingTrigger> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    #[must_use]
    pub fn peek_rule(&self) -> Option<RuleId> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|t| t.rule_id.clone())
    }

    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn clear(&self) {
        self.take();
    }
}
