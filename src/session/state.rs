//! Turn state machine: states, events and the per-task status record.
//!
//! Every mutation of a task's state goes through [`transition`], so an
//! out-of-order update surfaces as an [`VivaError::IllegalTransition`] instead
//! of silently corrupting the turn table.

use crate::error::{Result, VivaError};
use crate::session::task::Task;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Where a single question-answer exchange currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Dequeued, not yet picked up by the agent.
    WaitingForAgent,
    /// Agent is synthesizing the question audio.
    GeneratingAudio,
    /// Question audio is ready.
    GeneratingAudioDone,
    /// Question audio is playing.
    Speaking,
    /// Playback finished; the user may answer.
    SpeakingDone,
    /// User actor is capturing the answer.
    WaitingAnswer,
    /// Answer recorded.
    Completed,
    /// Turn abandoned (per-task timeout or a failed collaborator).
    TimedOut,
}

impl TurnState {
    /// Returns true for `Completed` and `TimedOut`.
    pub fn is_terminal(self) -> bool {
        matches!(self, TurnState::Completed | TurnState::TimedOut)
    }

    /// Position along the forward path. Both terminal states share the last rank.
    pub fn rank(self) -> u8 {
        match self {
            TurnState::WaitingForAgent => 0,
            TurnState::GeneratingAudio => 1,
            TurnState::GeneratingAudioDone => 2,
            TurnState::Speaking => 3,
            TurnState::SpeakingDone => 4,
            TurnState::WaitingAnswer => 5,
            TurnState::Completed | TurnState::TimedOut => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TurnState::WaitingForAgent => "waiting_for_agent",
            TurnState::GeneratingAudio => "generating_audio",
            TurnState::GeneratingAudioDone => "generating_audio_done",
            TurnState::Speaking => "speaking",
            TurnState::SpeakingDone => "speaking_done",
            TurnState::WaitingAnswer => "waiting_answer",
            TurnState::Completed => "completed",
            TurnState::TimedOut => "timed_out",
        }
    }

    /// All states, in traversal order.
    pub const ALL: [TurnState; 8] = [
        TurnState::WaitingForAgent,
        TurnState::GeneratingAudio,
        TurnState::GeneratingAudioDone,
        TurnState::Speaking,
        TurnState::SpeakingDone,
        TurnState::WaitingAnswer,
        TurnState::Completed,
        TurnState::TimedOut,
    ];
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs that move a turn forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnEvent {
    SynthesisStarted,
    SynthesisFinished,
    PlaybackStarted,
    PlaybackFinished,
    ListeningStarted,
    AnswerRecorded,
    TimedOut,
}

impl TurnEvent {
    pub const ALL: [TurnEvent; 7] = [
        TurnEvent::SynthesisStarted,
        TurnEvent::SynthesisFinished,
        TurnEvent::PlaybackStarted,
        TurnEvent::PlaybackFinished,
        TurnEvent::ListeningStarted,
        TurnEvent::AnswerRecorded,
        TurnEvent::TimedOut,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TurnEvent::SynthesisStarted => "synthesis_started",
            TurnEvent::SynthesisFinished => "synthesis_finished",
            TurnEvent::PlaybackStarted => "playback_started",
            TurnEvent::PlaybackFinished => "playback_finished",
            TurnEvent::ListeningStarted => "listening_started",
            TurnEvent::AnswerRecorded => "answer_recorded",
            TurnEvent::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for TurnEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computes the state that follows `state` on `event`.
///
/// # Errors
/// Returns `VivaError::IllegalTransition` for any pair outside the allowed
/// edge set: the forward chain plus `TimedOut` from any non-terminal state.
pub fn transition(state: TurnState, event: TurnEvent) -> Result<TurnState> {
    use TurnEvent as E;
    use TurnState as S;

    let next = match (state, event) {
        (S::WaitingForAgent, E::SynthesisStarted) => S::GeneratingAudio,
        (S::GeneratingAudio, E::SynthesisFinished) => S::GeneratingAudioDone,
        (S::GeneratingAudioDone, E::PlaybackStarted) => S::Speaking,
        (S::Speaking, E::PlaybackFinished) => S::SpeakingDone,
        (S::SpeakingDone, E::ListeningStarted) => S::WaitingAnswer,
        (S::WaitingAnswer, E::AnswerRecorded) => S::Completed,
        (from, E::TimedOut) if !from.is_terminal() => S::TimedOut,
        (from, event) => return Err(VivaError::IllegalTransition { from, event }),
    };
    Ok(next)
}

/// Message published on the interaction bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnSignal {
    /// The agent finished speaking; the user may answer `task_id`.
    UserTurn { task_id: String },
}

impl TurnSignal {
    pub fn task_id(&self) -> &str {
        match self {
            TurnSignal::UserTurn { task_id } => task_id,
        }
    }
}

/// Mutable per-task record kept in the turn table.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatus {
    pub id: String,
    pub question: String,
    pub state: TurnState,
    pub answer: Option<String>,
    pub timeout: Duration,
    pub order: u32,
}

impl TaskStatus {
    /// Creates the status for a freshly dequeued task.
    pub fn new(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            question: task.prompt.clone(),
            state: TurnState::WaitingForAgent,
            answer: None,
            timeout: task.timeout,
            order: task.order,
        }
    }

    /// Applies `event`, updating the state in place.
    pub fn apply(&mut self, event: TurnEvent) -> Result<TurnState> {
        self.state = transition(self.state, event)?;
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> TaskStatus {
        TaskStatus::new(&Task::new("q1", "What is ownership?", Duration::from_secs(5), 0))
    }

    #[test]
    fn test_happy_path_reaches_completed() {
        let mut status = status();
        for event in [
            TurnEvent::SynthesisStarted,
            TurnEvent::SynthesisFinished,
            TurnEvent::PlaybackStarted,
            TurnEvent::PlaybackFinished,
            TurnEvent::ListeningStarted,
            TurnEvent::AnswerRecorded,
        ] {
            status.apply(event).unwrap();
        }
        assert_eq!(status.state, TurnState::Completed);
    }

    #[test]
    fn test_timeout_allowed_from_every_non_terminal_state() {
        for state in TurnState::ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert_eq!(
                transition(state, TurnEvent::TimedOut).unwrap(),
                TurnState::TimedOut,
                "from {state}"
            );
        }
    }

    #[test]
    fn test_terminal_states_accept_no_events() {
        for state in [TurnState::Completed, TurnState::TimedOut] {
            for event in TurnEvent::ALL {
                assert!(transition(state, event).is_err(), "{state} on {event}");
            }
        }
    }

    #[test]
    fn test_transitions_never_move_backward() {
        for state in TurnState::ALL {
            for event in TurnEvent::ALL {
                if let Ok(next) = transition(state, event) {
                    assert!(
                        next.rank() > state.rank(),
                        "{state} -> {next} on {event} is not forward"
                    );
                }
            }
        }
    }

    #[test]
    fn test_skipping_a_step_is_rejected() {
        match transition(TurnState::WaitingForAgent, TurnEvent::PlaybackStarted) {
            Err(VivaError::IllegalTransition { from, event }) => {
                assert_eq!(from, TurnState::WaitingForAgent);
                assert_eq!(event, TurnEvent::PlaybackStarted);
            }
            other => panic!("Expected IllegalTransition, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_apply_leaves_state_untouched() {
        let mut status = status();
        assert!(status.apply(TurnEvent::AnswerRecorded).is_err());
        assert_eq!(status.state, TurnState::WaitingForAgent);
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&TurnState::GeneratingAudioDone).unwrap();
        assert_eq!(json, "\"generating_audio_done\"");
        let back: TurnState = serde_json::from_str("\"timed_out\"").unwrap();
        assert_eq!(back, TurnState::TimedOut);
    }

    #[test]
    fn test_signal_task_id() {
        let signal = TurnSignal::UserTurn {
            task_id: "abc".to_string(),
        };
        assert_eq!(signal.task_id(), "abc");
    }
}
