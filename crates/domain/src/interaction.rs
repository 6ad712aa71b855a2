//! Pointer interaction statistics fed by the UI.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Number of recent click timestamps retained.
pub const CLICK_HISTORY: usize = 20;

/// A pointer gesture reported by the collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerEvent {
    HoverStart,
    HoverEnd,
    PressStart,
    PressEnd,
    Click,
}

/// Counters kept across restarts, one set per character pack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCounters {
    #[serde(default)]
    pub total_clicks: u64,
}

/// Rolling hover, press and click state.
#[derive(Debug, Clone)]
pub struct InteractionStats {
    /// When tracking began. Stands in for the last leave before any hover.
    pub started_at: Instant,
    pub hovering: bool,
    pub hover_started_at: Option<Instant>,
    pub hover_left_at: Option<Instant>,
    pub pressing: bool,
    pub press_started_at: Option<Instant>,
    pub recent_clicks: VecDeque<Instant>,
    pub total_clicks: u64,
}

impl InteractionStats {
    #[must_use]
    pub fn new(started_at: Instant) -> Self {
        Self {
            started_at,
            hovering: false,
            hover_started_at: None,
            hover_left_at: None,
            pressing: false,
            press_started_at: None,
            recent_clicks: VecDeque::with_capacity(CLICK_HISTORY),
            total_clicks: 0,
        }
    }

    pub fn apply(&mut self, event: PointerEvent, at: Instant) {
        match event {
            PointerEvent::HoverStart => {
                if !self.hovering {
                    self.hovering = true;
                    self.hover_started_at = Some(at);
                }
            }
            PointerEvent::HoverEnd => {
                if self.hovering {
                    self.hovering = false;
                    self.hover_started_at = None;
                    self.hover_left_at = Some(at);
                }
            }
            PointerEvent::PressStart => {
                self.pressing = true;
                self.press_started_at = Some(at);
            }
            PointerEvent::PressEnd => {
                self.pressing = false;
                self.press_started_at = None;
            }
            PointerEvent::Click => {
                if self.recent_clicks.len() == CLICK_HISTORY {
                    self.recent_clicks.pop_front();
                }
                self.recent_clicks.push_back(at);
                self.total_clicks += 1;
            }
        }
    }

    /// How long the pointer has been over the character.
    #[must_use]
    pub fn hover_duration(&self, now: Instant) -> Option<Duration> {
        if !self.hovering {
            return None;
        }
        self.hover_started_at
            .map(|since| now.saturating_duration_since(since))
    }

    /// How long since the pointer last left. Counts from tracking start if it
    /// never hovered.
    #[must_use]
    pub fn leave_duration(&self, now: Instant) -> Option<Duration> {
        if self.hovering {
            return None;
        }
        let since = self.hover_left_at.unwrap_or(self.started_at);
        Some(now.saturating_duration_since(since))
    }

    #[must_use]
    pub fn press_duration(&self, now: Instant) -> Option<Duration> {
        if !self.pressing {
            return None;
        }
        self.press_started_at
            .map(|since| now.saturating_duration_since(since))
    }

    /// Clicks recorded within `window` before `now`.
    #[must_use]
    pub fn clicks_within(&self, now: Instant, window: Duration) -> usize {
        self.recent_clicks
            .iter()
            .filter(|at| now.saturating_duration_since(**at) <= window)
            .count()
    }
}
