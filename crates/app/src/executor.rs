//! Action chain executor: plays a fired rule's actions out over time.
//!
//! An [`ActionChain`] is an explicit state machine. [`ActionChain::advance`]
//! runs instant actions until it reaches one that has to wait (a delay or
//! speech) and returns what to wait for. The owner resumes the chain when
//! that wait completes. Nothing here blocks or sleeps.

use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};

use nudge_domain::id::{ChainId, RequestId, RuleId};
use nudge_domain::rule::{Action, RandomGroup, Speak};
use nudge_domain::signal::Signal;

/// Something the chain is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Timer(Duration),
    Playback(RequestId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Running,
    Suspended(Wait),
    Done,
}

/// What a call to [`ActionChain::advance`] ended on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Wait(Wait),
    Done,
}

/// Side effect produced while advancing.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Speech, already routed to a collaborator.
    Speak(Signal),
    /// An instant action for the director to carry out.
    Perform(Action),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Advance {
    pub effects: Vec<Effect>,
    pub step: Step,
}

/// Settings that decide how a `speak` step is voiced.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRouter {
    /// Pack directory pre-recorded clips are resolved against.
    pub audio_dir: Option<PathBuf>,
    pub synthesis_enabled: bool,
    pub secs_per_char: f64,
    pub read_multiplier: f64,
}

/// Shortest time a text-only line stays on screen.
pub const MIN_TEXT_SECS: f64 = 2.0;

impl Default for SpeechRouter {
    fn default() -> Self {
        Self {
            audio_dir: None,
            synthesis_enabled: true,
            secs_per_char: 0.2,
            read_multiplier: 1.5,
        }
    }
}

impl SpeechRouter {
    /// How long a line of text stays up when nothing is spoken.
    #[must_use]
    pub fn display_secs(&self, text: &str) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let chars = text.chars().count() as f64;
        (chars * self.secs_per_char * self.read_multiplier).max(MIN_TEXT_SECS)
    }

    fn voice_path(&self, voice_file: &str) -> PathBuf {
        match &self.audio_dir {
            Some(dir) => dir.join(voice_file),
            None => PathBuf::from(voice_file),
        }
    }

    /// Pick a route for one line: a pre-recorded clip if it exists, then
    /// synthesis, then text alone.
    #[must_use]
    pub fn route(&self, speak: &Speak) -> (Signal, Wait) {
        if let Some(voice_file) = speak.voice_file.as_deref().filter(|f| !f.is_empty()) {
            let path = self.voice_path(voice_file);
            if path.is_file() {
                let request_id = RequestId::new();
                return (
                    Signal::PlayAudio {
                        request_id,
                        path,
                        text: speak.text.clone(),
                        emotion: speak.emotion.clone(),
                    },
                    Wait::Playback(request_id),
                );
            }
            tracing::debug!(path = %path.display(), "voice file missing, falling back");
        }
        if self.synthesis_enabled {
            let request_id = RequestId::new();
            return (
                Signal::Synthesize {
                    request_id,
                    text: speak.text.clone(),
                    emotion: speak.emotion.clone(),
                },
                Wait::Playback(request_id),
            );
        }
        let secs = self.display_secs(&speak.text);
        (
            Signal::ShowText {
                text: speak.text.clone(),
                emotion: speak.emotion.clone(),
                duration_secs: secs,
            },
            Wait::Timer(Duration::try_from_secs_f64(secs).unwrap_or_default()),
        )
    }
}

#[derive(Debug, Clone)]
pub struct ActionChain {
    id: ChainId,
    rule_id: RuleId,
    actions: Vec<Action>,
    cursor: usize,
    state: ChainState,
}

impl ActionChain {
    #[must_use]
    pub fn new(rule_id: RuleId, actions: Vec<Action>) -> Self {
        Self {
            id: ChainId::new(),
            rule_id,
            actions,
            cursor: 0,
            state: ChainState::Running,
        }
    }

    #[must_use]
    pub fn id(&self) -> ChainId {
        self.id
    }

    #[must_use]
    pub fn rule_id(&self) -> &RuleId {
        &self.rule_id
    }

    #[must_use]
    pub fn state(&self) -> ChainState {
        self.state
    }

    #[must_use]
    pub fn remaining(&self) -> &[Action] {
        self.actions.get(self.cursor..).unwrap_or_default()
    }

    /// Run until the chain has to wait or runs out of actions.
    ///
    /// Calling this while suspended or done does nothing.
    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R, speech: &SpeechRouter) -> Advance {
        let mut effects = Vec::new();
        match self.state {
            ChainState::Suspended(wait) => {
                return Advance {
                    effects,
                    step: Step::Wait(wait),
                };
            }
            ChainState::Done => {
                return Advance {
                    effects,
                    step: Step::Done,
                };
            }
            ChainState::Running => {}
        }

        while let Some(action) = self.actions.get(self.cursor).cloned() {
            self.cursor += 1;
            let wait = match action {
                Action::RandomGroup(group) => {
                    self.splice(&group, rng);
                    continue;
                }
                Action::Delay(delay) => Wait::Timer(delay.duration()),
                Action::Speak(speak) => {
                    let (signal, wait) = speech.route(&speak);
                    effects.push(Effect::Speak(signal));
                    wait
                }
                Action::Invalid(invalid) => {
                    tracing::warn!(chain_id = %self.id, reason = %invalid.reason, "skipping invalid action");
                    continue;
                }
                other => {
                    effects.push(Effect::Perform(other));
                    continue;
                }
            };
            self.state = ChainState::Suspended(wait);
            return Advance {
                effects,
                step: Step::Wait(wait),
            };
        }

        self.state = ChainState::Done;
        Advance {
            effects,
            step: Step::Done,
        }
    }

    /// Mark a wait as finished. Returns `false` when the chain was not
    /// waiting on exactly this, which leaves it untouched.
    pub fn resume(&mut self, completed: Wait) -> bool {
        match self.state {
            ChainState::Suspended(wait) if wait == completed => {
                self.state = ChainState::Running;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn waiting_on(&self) -> Option<Wait> {
        match self.state {
            ChainState::Suspended(wait) => Some(wait),
            ChainState::Running | ChainState::Done => None,
        }
    }

    /// Insert the chosen branch's actions at the cursor, ahead of the tail.
    fn splice<R: Rng + ?Sized>(&mut self, group: &RandomGroup, rng: &mut R) {
        let weights: Vec<f64> = group.branches.iter().map(|b| b.effective_weight()).collect();
        let Ok(index) = WeightedIndex::new(&weights) else {
            tracing::debug!(chain_id = %self.id, "random group has no selectable branch");
            return;
        };
        let chosen = index.sample(rng);
        if let Some(branch) = group.branches.get(chosen) {
            self.actions
                .splice(self.cursor..self.cursor, branch.actions.iter().cloned());
        }
    }
}
