//! Agent actor: asks questions.
//!
//! For each task received on the question bridge the agent claims the turn,
//! synthesizes and plays the question, hands the turn to the user actor and
//! then waits for the answer window to close.
//!
//! An answer already being captured when the window closes keeps the turn.
//! The agent then waits up to the answer grace (capture ceiling plus
//! transcription bound) for the user actor to finish it.

use crate::audio::buffer::AudioBuffer;
use crate::audio::playback::{Playback, PlaybackGuard};
use crate::defaults;
use crate::error::Result;
use crate::session::bridge::{BridgeReceiver, BridgeSender};
use crate::session::state::{TurnEvent, TurnSignal, TurnState};
use crate::session::table::{SharedTable, TurnTable};
use crate::session::task::Task;
use crate::tts::synthesizer::Synthesizer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

pub struct AgentActor {
    table: SharedTable,
    questions: BridgeReceiver<Task>,
    signals: BridgeSender<TurnSignal>,
    synthesizer: Arc<dyn Synthesizer>,
    playback: Arc<dyn Playback>,
    question_wait: Duration,
    turn_poll: Duration,
    answer_grace: Duration,
}

impl AgentActor {
    pub fn new(
        table: SharedTable,
        questions: BridgeReceiver<Task>,
        signals: BridgeSender<TurnSignal>,
        synthesizer: Arc<dyn Synthesizer>,
        playback: Arc<dyn Playback>,
    ) -> Self {
        Self {
            table,
            questions,
            signals,
            synthesizer,
            playback,
            question_wait: Duration::from_millis(defaults::QUESTION_WAIT_MS),
            turn_poll: Duration::from_millis(defaults::TURN_POLL_MS),
            answer_grace: Duration::from_secs(
                defaults::MAX_UTTERANCE_SECS + defaults::TRANSCRIBE_TIMEOUT_SECS,
            ),
        }
    }

    /// How long one wait on the question bridge lasts.
    pub fn with_question_wait(mut self, wait: Duration) -> Self {
        self.question_wait = wait;
        self
    }

    /// Poll interval while the user answers.
    pub fn with_turn_poll(mut self, poll: Duration) -> Self {
        self.turn_poll = poll;
        self
    }

    /// Extra time given to an answer still in progress when its window closes.
    pub fn with_answer_grace(mut self, grace: Duration) -> Self {
        self.answer_grace = grace;
        self
    }

    /// Serves questions until `shutdown` becomes true.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        tracing::info!(synthesizer = self.synthesizer.name(), "Agent started");
        while !*shutdown.borrow() {
            let Some(task) = self.questions.recv(self.question_wait).await else {
                continue;
            };
            if let Err(e) = self.take_turn(&task).await {
                tracing::error!(task_id = %task.id, error = %e, "Turn failed");
                self.abandon(&task.id).await;
            }
        }
        tracing::info!("Agent stopped");
    }

    async fn take_turn(&self, task: &Task) -> Result<()> {
        {
            let mut table = self.table.lock().await;
            table.activate(&task.id)?;
            table.apply(&task.id, TurnEvent::SynthesisStarted)?;
        }
        tracing::info!(task_id = %task.id, order = task.order, "Asking question");

        let audio = match self.synthesizer.synthesize(&task.prompt).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(
                    task_id = %task.id,
                    error = %e,
                    "Synthesis failed, skipping question"
                );
                self.abandon(&task.id).await;
                return Ok(());
            }
        };

        {
            let mut table = self.table.lock().await;
            table.apply(&task.id, TurnEvent::SynthesisFinished)?;
            table.apply(&task.id, TurnEvent::PlaybackStarted)?;
        }
        self.speak(&audio).await?;
        {
            let mut table = self.table.lock().await;
            table.apply(&task.id, TurnEvent::PlaybackFinished)?;
            self.signals.send(TurnSignal::UserTurn {
                task_id: task.id.clone(),
            })?;
        }

        self.await_answer(task).await;
        Ok(())
    }

    /// Plays `audio` and waits for it to finish. Cancelling the future stops
    /// playback through the guard.
    async fn speak(&self, audio: &AudioBuffer) -> Result<()> {
        let guard = PlaybackGuard::start(self.playback.as_ref(), audio)?;
        tokio::time::sleep(audio.duration()).await;
        guard.finish()
    }

    /// Waits until the task is terminal or its answer window closed.
    ///
    /// The deadline check and the forced timeout happen under one lock, so
    /// the user actor cannot start listening in between.
    async fn await_answer(&self, task: &Task) {
        let mut deadline = Instant::now() + task.timeout;
        let mut extended = false;
        loop {
            {
                let mut table = self.table.lock().await;
                let state = match table.state(&task.id) {
                    Some(state) if state.is_terminal() => {
                        tracing::debug!(task_id = %task.id, %state, "Turn finished");
                        return;
                    }
                    None => return,
                    Some(state) => state,
                };
                if Instant::now() >= deadline {
                    if state == TurnState::WaitingAnswer && !extended {
                        tracing::info!(
                            task_id = %task.id,
                            grace = ?self.answer_grace,
                            "Answer still in progress, waiting for it"
                        );
                        deadline = Instant::now() + self.answer_grace;
                        extended = true;
                    } else {
                        tracing::info!(
                            task_id = %task.id,
                            timeout = ?task.timeout,
                            %state,
                            "No answer in time"
                        );
                        time_out(&mut table, &task.id);
                        return;
                    }
                }
            }
            let wake = (Instant::now() + self.turn_poll).min(deadline);
            tokio::time::sleep_until(wake).await;
        }
    }

    /// Forces the task to `TimedOut` unless it already finished.
    async fn abandon(&self, task_id: &str) {
        time_out(&mut *self.table.lock().await, task_id);
    }
}

fn time_out(table: &mut TurnTable, task_id: &str) {
    if table.is_open(task_id)
        && let Err(e) = table.apply(task_id, TurnEvent::TimedOut)
    {
        tracing::error!(task_id, error = %e, "Failed to time out task");
    }
}
