//! User actor: listens for answers.

use crate::audio::recorder::AudioSource;
use crate::defaults;
use crate::error::{Result, VivaError};
use crate::session::bridge::BridgeReceiver;
use crate::session::capture::PauseCapture;
use crate::session::pool::PoolHandle;
use crate::session::state::{TurnEvent, TurnSignal, TurnState};
use crate::session::table::SharedTable;
use crate::stt::transcriber::Transcriber;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct UserActor {
    table: SharedTable,
    signals: BridgeReceiver<TurnSignal>,
    source: Box<dyn AudioSource>,
    capture: PauseCapture,
    transcriber: Arc<dyn Transcriber>,
    pool: PoolHandle,
    signal_wait: Duration,
    transcribe_timeout: Duration,
}

impl UserActor {
    pub fn new(
        table: SharedTable,
        signals: BridgeReceiver<TurnSignal>,
        source: Box<dyn AudioSource>,
        capture: PauseCapture,
        transcriber: Arc<dyn Transcriber>,
        pool: PoolHandle,
    ) -> Self {
        Self {
            table,
            signals,
            source,
            capture,
            transcriber,
            pool,
            signal_wait: Duration::from_millis(defaults::SIGNAL_WAIT_MS),
            transcribe_timeout: Duration::from_secs(defaults::TRANSCRIBE_TIMEOUT_SECS),
        }
    }

    /// How long one wait on the interaction bridge lasts.
    pub fn with_signal_wait(mut self, wait: Duration) -> Self {
        self.signal_wait = wait;
        self
    }

    /// Upper bound on one transcription. A slower transcriber times the turn out.
    pub fn with_transcribe_timeout(mut self, timeout: Duration) -> Self {
        self.transcribe_timeout = timeout;
        self
    }

    /// Answers turns until `shutdown` becomes true.
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) {
        tracing::info!(transcriber = self.transcriber.name(), "User actor started");
        while !*shutdown.borrow() {
            let Some(signal) = self.signals.recv(self.signal_wait).await else {
                continue;
            };
            if let Err(e) = self.answer(&signal).await {
                tracing::error!(task_id = signal.task_id(), error = %e, "Answer handling failed");
            }
        }
        tracing::info!("User actor stopped");
    }

    async fn answer(&mut self, signal: &TurnSignal) -> Result<()> {
        let task_id = signal.task_id();
        {
            let mut table = self.table.lock().await;
            if !table.is_active(task_id) {
                tracing::debug!(task_id, active = ?table.active(), "Discarding stale turn signal");
                return Ok(());
            }
            match table.state(task_id) {
                Some(TurnState::SpeakingDone) => {
                    table.apply(task_id, TurnEvent::ListeningStarted)?;
                }
                state => {
                    tracing::debug!(task_id, ?state, "Turn not open for an answer");
                    return Ok(());
                }
            }
        }
        tracing::info!(task_id, "Listening");

        let heard = self.listen().await;

        let mut table = self.table.lock().await;
        match heard {
            Ok(text) => {
                if table.is_active(task_id)
                    && table.state(task_id) == Some(TurnState::WaitingAnswer)
                {
                    tracing::info!(task_id, chars = text.len(), "Answer recorded");
                    table.record_answer(task_id, text)?;
                } else {
                    tracing::info!(task_id, "Answer arrived after the turn closed, discarding");
                }
            }
            Err(e) => {
                tracing::warn!(task_id, error = %e, "Could not capture answer");
                if table.is_open(task_id) {
                    table.apply(task_id, TurnEvent::TimedOut)?;
                }
            }
        }
        Ok(())
    }

    /// Captures one utterance and transcribes it on the worker pool.
    async fn listen(&mut self) -> Result<String> {
        let utterance = self.capture.capture(self.source.as_mut()).await?;
        if utterance.audio.is_empty() {
            return Ok(String::new());
        }
        tracing::debug!(
            outcome = ?utterance.outcome,
            duration = ?utterance.audio.duration(),
            "Transcribing answer"
        );
        let transcriber = Arc::clone(&self.transcriber);
        let audio = utterance.audio;
        let job = self.pool.run(move || transcriber.transcribe(&audio));
        let text = tokio::time::timeout(self.transcribe_timeout, job)
            .await
            .map_err(|_| VivaError::Transcription {
                message: format!("no transcript within {:?}", self.transcribe_timeout),
            })???;
        Ok(text.trim().to_string())
    }
}
