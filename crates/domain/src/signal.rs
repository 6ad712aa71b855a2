//! Signals exchanged with the UI and voice collaborators.
//!
//! [`Signal`] flows out of the engine. [`Inbound`] flows back in.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::id::{ChainId, RequestId, RuleId};
use crate::interaction::PointerEvent;
use crate::rule::Action;
use crate::snapshot::Weather;

/// Something the engine asks a collaborator to do, or announces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    RuleMatched {
        rule_id: RuleId,
        actions: Vec<Action>,
    },
    ChainStarted {
        chain_id: ChainId,
        rule_id: RuleId,
    },
    ChainFinished {
        chain_id: ChainId,
    },
    /// Play a pre-recorded clip. Completes with `playback_finished`.
    PlayAudio {
        request_id: RequestId,
        path: PathBuf,
        text: String,
        emotion: String,
    },
    /// Synthesize and play speech. Completes with `playback_finished`.
    Synthesize {
        request_id: RequestId,
        text: String,
        emotion: String,
    },
    ShowText {
        text: String,
        emotion: String,
        duration_secs: f64,
    },
    MoveTo {
        pos: String,
    },
    FadeOut {
        opacity: f64,
        hover_recovery: f64,
    },
    RestoreOpacity,
    LockInteraction {
        secs: f64,
    },
    UnlockInteraction,
    ExitApp,
    /// Ask the language model. Completes with `request_finished`.
    QueryLlm {
        request_id: RequestId,
        prompt: String,
    },
    FullscreenChanged {
        fullscreen: bool,
    },
    /// The watchdog cleared a stuck busy state.
    ForceRecover,
}

/// Busy flags reported by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UiStatus {
    #[serde(default)]
    pub processing: bool,
    #[serde(default)]
    pub speaking: bool,
    #[serde(default)]
    pub listening: bool,
    #[serde(default)]
    pub hidden: bool,
}

impl UiStatus {
    #[must_use]
    pub fn is_busy(self) -> bool {
        self.processing || self.speaking || self.listening
    }
}

/// A notification from a collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Inbound {
    /// Audio playback ended. Without a request id any pending playback wait
    /// is satisfied.
    PlaybackFinished {
        #[serde(default)]
        request_id: Option<RequestId>,
    },
    /// A synthesis or language model request completed or failed.
    RequestFinished { request_id: RequestId },
    UiStatus(UiStatus),
    Pointer { action: PointerEvent },
    Weather(Weather),
    UserQuery { text: String },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn should_tag_signals_by_name() {
        let json = serde_json::to_value(Signal::MoveTo {
            pos: "top_left".to_string(),
        })
        .unwrap();
        assert_eq!(json, json!({"signal": "move_to", "pos": "top_left"}));
    }

    #[test]
    fn should_parse_ui_status_with_missing_flags() {
        let event: Inbound =
            serde_json::from_value(json!({"event": "ui_status", "speaking": true})).unwrap();
        let Inbound::UiStatus(status) = event else {
            panic!("expected ui status");
        };
        assert!(status.is_busy());
        assert!(!status.hidden);
    }

    #[test]
    fn should_parse_playback_finished_without_request() {
        let event: Inbound =
            serde_json::from_value(json!({"event": "playback_finished"})).unwrap();
        assert_eq!(event, Inbound::PlaybackFinished { request_id: None });
    }

    #[test]
    fn should_parse_pointer_event() {
        let event: Inbound =
            serde_json::from_value(json!({"event": "pointer", "action": "hover_start"})).unwrap();
        assert_eq!(
            event,
            Inbound::Pointer {
                action: PointerEvent::HoverStart
            }
        );
    }
}
