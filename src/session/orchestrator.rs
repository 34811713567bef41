//! Session orchestrator: wires the actors together and runs the clock.
//!
//! Coordinates:
//! - Question bridge (orchestrator → agent)
//! - Interaction bridge (agent → user)
//! - Turn table and its exclusion lock
//! - Worker pool for transcription
//! - Session timeout and shutdown

use crate::audio::playback::Playback;
use crate::audio::recorder::AudioSource;
use crate::audio::vad::FrameClassifier;
use crate::defaults;
use crate::error::Result;
use crate::session::actor::{ActorMode, spawn_actor};
use crate::session::agent::AgentActor;
use crate::session::bridge::{BridgeSender, signal_bridge};
use crate::session::capture::{CaptureConfig, PauseCapture};
use crate::session::pool::WorkerPool;
use crate::session::record::SessionRecord;
use crate::session::state::{TaskStatus, TurnSignal, TurnState};
use crate::session::table::{SharedTable, TurnTable};
use crate::session::task::{Task, TaskQueue};
use crate::session::user::UserActor;
use crate::stt::transcriber::Transcriber;
use crate::tts::synthesizer::Synthesizer;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Timing and scheduling knobs for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub session_timeout: Duration,
    pub poll_interval: Duration,
    pub question_wait: Duration,
    pub signal_wait: Duration,
    pub turn_poll: Duration,
    pub cancel_grace: Duration,
    /// Bound on one transcription call.
    pub transcribe_timeout: Duration,
    pub workers: usize,
    pub actor_mode: ActorMode,
    pub capture: CaptureConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(defaults::SESSION_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
            question_wait: Duration::from_millis(defaults::QUESTION_WAIT_MS),
            signal_wait: Duration::from_millis(defaults::SIGNAL_WAIT_MS),
            turn_poll: Duration::from_millis(defaults::TURN_POLL_MS),
            cancel_grace: Duration::from_millis(defaults::CANCEL_GRACE_MS),
            transcribe_timeout: Duration::from_secs(defaults::TRANSCRIBE_TIMEOUT_SECS),
            workers: defaults::WORKERS,
            actor_mode: ActorMode::default(),
            capture: CaptureConfig::default(),
        }
    }
}

/// External collaborators the actors talk to.
pub struct Collaborators {
    pub synthesizer: Arc<dyn Synthesizer>,
    pub playback: Arc<dyn Playback>,
    pub transcriber: Arc<dyn Transcriber>,
    pub classifier: Arc<dyn FrameClassifier>,
    pub source: Box<dyn AudioSource>,
}

/// Receives the finished record at the end of a session.
pub trait SessionSink: Send + Sync {
    fn deliver(&self, record: SessionRecord) -> Result<()>;
}

/// Why the orchestrator loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Every question reached a terminal state.
    AllAnswered,
    /// The session clock ran out first.
    SessionTimeout,
    /// The agent stopped accepting questions.
    AgentLost,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionEnd::AllAnswered => "all questions answered",
            SessionEnd::SessionTimeout => "session timeout",
            SessionEnd::AgentLost => "agent stopped",
        })
    }
}

/// Result of [`SessionOrchestrator::run`].
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// The record with final states and answers applied.
    pub record: SessionRecord,
    /// Per-task statuses sorted by order. Tasks never dequeued are absent.
    pub statuses: Vec<TaskStatus>,
    pub ended_by: SessionEnd,
    pub elapsed: Duration,
    /// Both actors stopped within the grace period.
    pub actors_acknowledged: bool,
    pub detached_workers: usize,
}

impl SessionOutcome {
    pub fn count(&self, state: TurnState) -> usize {
        self.statuses.iter().filter(|s| s.state == state).count()
    }
}

pub struct SessionOrchestrator {
    record: SessionRecord,
    queue: TaskQueue,
    config: SessionConfig,
    collaborators: Collaborators,
    sink: Option<Arc<dyn SessionSink>>,
}

impl SessionOrchestrator {
    /// Prepares a session for `record`.
    ///
    /// # Errors
    /// Malformed question data fails here, before any actor starts.
    pub fn new(
        record: SessionRecord,
        config: SessionConfig,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let queue = TaskQueue::from_questions(&record.questions)?;
        Ok(Self {
            record,
            queue,
            config,
            collaborators,
            sink: None,
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn SessionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs the interview to completion or timeout.
    ///
    /// # Errors
    /// Fails only when the worker pool or an actor cannot be started.
    pub async fn run(self) -> Result<SessionOutcome> {
        let Self {
            mut record,
            mut queue,
            config,
            collaborators,
            sink,
        } = self;

        let started = Instant::now();
        record.started_at = Some(Utc::now());
        record.session_timeout_secs = Some(config.session_timeout.as_secs());
        tracing::info!(
            interview = %record.interview_name,
            questions = queue.remaining(),
            timeout = ?config.session_timeout,
            mode = ?config.actor_mode,
            "Session starting"
        );

        let table = TurnTable::new().shared();
        let (question_tx, question_rx) = signal_bridge::<Task>();
        let (signal_tx, signal_rx) = signal_bridge::<TurnSignal>();
        let pool = WorkerPool::new(config.workers)?;
        let (stop_tx, stop_rx) = watch::channel(false);

        let agent = AgentActor::new(
            Arc::clone(&table),
            question_rx,
            signal_tx.clone(),
            collaborators.synthesizer,
            collaborators.playback,
        )
        .with_question_wait(config.question_wait)
        .with_turn_poll(config.turn_poll)
        .with_answer_grace(
            config.capture.max_utterance + config.transcribe_timeout + config.turn_poll,
        );
        let user = UserActor::new(
            Arc::clone(&table),
            signal_rx,
            collaborators.source,
            PauseCapture::new(config.capture.clone(), collaborators.classifier),
            collaborators.transcriber,
            pool.handle(),
        )
        .with_signal_wait(config.signal_wait)
        .with_transcribe_timeout(config.transcribe_timeout);

        let agent = match spawn_actor(
            "agent",
            config.actor_mode,
            stop_rx.clone(),
            agent.run(stop_rx.clone()),
        ) {
            Ok(handle) => handle,
            Err(e) => {
                pool.shutdown(config.cancel_grace).await;
                return Err(e);
            }
        };
        let user = match spawn_actor(
            "user",
            config.actor_mode,
            stop_rx.clone(),
            user.run(stop_rx),
        ) {
            Ok(handle) => handle,
            Err(e) => {
                stop_tx.send_replace(true);
                agent.join(config.cancel_grace).await;
                pool.shutdown(config.cancel_grace).await;
                return Err(e);
            }
        };

        let ended_by = drive(
            &mut queue,
            &table,
            &question_tx,
            &signal_tx,
            &config,
            started,
        )
        .await;

        // Shutdown: cancel actors, then drain the pool.
        stop_tx.send_replace(true);
        let (agent_ack, user_ack) = tokio::join!(
            agent.join(config.cancel_grace),
            user.join(config.cancel_grace)
        );
        let detached_workers = pool.shutdown(config.cancel_grace).await;

        let statuses = table.lock().await.ordered();
        record.apply_statuses(&statuses);
        let elapsed = started.elapsed();

        tracing::info!(
            %ended_by,
            elapsed = ?elapsed,
            unasked = queue.remaining(),
            "Session finished"
        );
        for status in &statuses {
            tracing::info!(
                order = status.order,
                task_id = %status.id,
                state = %status.state,
                answer = status.answer.as_deref().unwrap_or(""),
                "Summary"
            );
        }

        if let Some(sink) = &sink
            && let Err(e) = sink.deliver(record.clone())
        {
            tracing::error!(error = %e, "Failed to hand off session record");
        }

        Ok(SessionOutcome {
            record,
            statuses,
            ended_by,
            elapsed,
            actors_acknowledged: agent_ack && user_ack,
            detached_workers,
        })
    }
}

/// Poll loop: advances through the queue until it is exhausted or the clock runs out.
async fn drive(
    queue: &mut TaskQueue,
    table: &SharedTable,
    questions: &BridgeSender<Task>,
    signals: &BridgeSender<TurnSignal>,
    config: &SessionConfig,
    started: Instant,
) -> SessionEnd {
    let deadline = started + config.session_timeout;

    let mut current = match publish_next(queue, table, questions).await {
        Ok(current) => current,
        Err(e) => {
            tracing::error!(error = %e, "Could not publish first question");
            return SessionEnd::AgentLost;
        }
    };

    loop {
        let current_done = {
            let table = table.lock().await;
            let in_flight = table.in_flight();
            if in_flight > 1 {
                tracing::error!(in_flight, "More than one turn in flight");
            }
            let done = current
                .as_deref()
                .is_none_or(|id| table.state(id).is_some_and(TurnState::is_terminal));
            if done
                && queue.is_empty()
                && questions.is_empty()
                && signals.is_empty()
                && table.all_terminal()
            {
                return SessionEnd::AllAnswered;
            }
            done
        };

        if Instant::now() >= deadline {
            tracing::warn!(active = ?current, "Session timeout reached");
            return SessionEnd::SessionTimeout;
        }

        if current_done && !queue.is_empty() {
            match publish_next(queue, table, questions).await {
                Ok(next) => current = next,
                Err(e) => {
                    tracing::error!(error = %e, "Could not publish question");
                    return SessionEnd::AgentLost;
                }
            }
            continue;
        }

        let wake = (Instant::now() + config.poll_interval).min(deadline);
        tokio::time::sleep_until(wake).await;
    }
}

/// Dequeues the next task, registers it and sends it to the agent.
async fn publish_next(
    queue: &mut TaskQueue,
    table: &SharedTable,
    questions: &BridgeSender<Task>,
) -> Result<Option<String>> {
    let Some(task) = queue.next() else {
        return Ok(None);
    };
    table.lock().await.insert(&task);
    let id = task.id.clone();
    tracing::debug!(task_id = %id, order = task.order, "Publishing question");
    questions.send(task)?;
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::playback::MockPlayback;
    use crate::audio::recorder::{FramePhase, ScriptedAudioSource};
    use crate::audio::vad::RmsClassifier;
    use crate::session::record::QuestionRecord;
    use crate::stt::transcriber::MockTranscriber;
    use crate::tts::synthesizer::MockSynthesizer;
    use std::sync::Mutex;

    fn record(questions: Vec<QuestionRecord>) -> SessionRecord {
        SessionRecord {
            interview_name: "Unit".to_string(),
            role: "Tester".to_string(),
            date: "2026-01-01".to_string(),
            user_email: "t@example.com".to_string(),
            recording: String::new(),
            started_at: None,
            session_timeout_secs: None,
            questions,
        }
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            session_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(10),
            question_wait: Duration::from_millis(20),
            signal_wait: Duration::from_millis(20),
            turn_poll: Duration::from_millis(10),
            cancel_grace: Duration::from_secs(1),
            transcribe_timeout: Duration::from_secs(5),
            workers: 1,
            actor_mode: ActorMode::SharedRuntime,
            capture: CaptureConfig::default(),
        }
    }

    fn collaborators() -> Collaborators {
        Collaborators {
            synthesizer: Arc::new(MockSynthesizer::new(Duration::from_millis(10))),
            playback: Arc::new(MockPlayback::new()),
            transcriber: Arc::new(MockTranscriber::new("mock").with_response("an answer")),
            classifier: Arc::new(RmsClassifier::default()),
            source: Box::new(ScriptedAudioSource::new(
                16000,
                &[
                    FramePhase::Speech { ms: 900 },
                    FramePhase::Silence { ms: 1200 },
                ],
            )),
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        records: Mutex<Vec<SessionRecord>>,
    }

    impl SessionSink for CollectingSink {
        fn deliver(&self, record: SessionRecord) -> Result<()> {
            if let Ok(mut records) = self.records.lock() {
                records.push(record);
            }
            Ok(())
        }
    }

    #[test]
    fn test_malformed_questions_fail_before_start() {
        let questions = vec![QuestionRecord::new("q1", "", 5.0, 0)];
        let result = SessionOrchestrator::new(record(questions), fast_config(), collaborators());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_single_question_completes_and_reaches_sink() {
        let sink = Arc::new(CollectingSink::default());
        let orchestrator = SessionOrchestrator::new(
            record(vec![QuestionRecord::new("q1", "Hello?", 5.0, 0)]),
            fast_config(),
            collaborators(),
        )
        .unwrap()
        .with_sink(sink.clone());

        let outcome = orchestrator.run().await.unwrap();
        assert_eq!(outcome.ended_by, SessionEnd::AllAnswered);
        assert_eq!(outcome.count(TurnState::Completed), 1);
        assert!(outcome.actors_acknowledged);
        assert_eq!(outcome.detached_workers, 0);
        assert_eq!(outcome.record.questions[0].user_answer, "an answer");
        assert!(outcome.record.started_at.is_some());

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].questions[0].status, Some(TurnState::Completed));
    }

    #[tokio::test]
    async fn test_empty_interview_ends_immediately() {
        let outcome = SessionOrchestrator::new(record(Vec::new()), fast_config(), collaborators())
            .unwrap()
            .run()
            .await
            .unwrap();
        assert_eq!(outcome.ended_by, SessionEnd::AllAnswered);
        assert!(outcome.statuses.is_empty());
    }
}
