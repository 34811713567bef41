//! Post-session processing: scoring, persistence and the report.
//!
//! Finished records are queued to a dedicated thread that owns its own
//! current-thread runtime, so slow evaluators never hold up the session.

use crate::error::{Result, VivaError};
use crate::eval::evaluator::{Evaluation, Evaluator};
use crate::report::{render_report, report_path};
use crate::session::orchestrator::SessionSink;
use crate::session::record::{SessionRecord, SessionStore};
use crossbeam_channel::{Sender, unbounded};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::time::Instant;

/// A finished session waiting to be scored.
#[derive(Debug, Clone)]
pub struct Notification {
    pub session_file: PathBuf,
    pub record: SessionRecord,
}

/// Scores every asked question of `record` in place and writes one score
/// file per question next to `session_file`.
///
/// Evaluation failures never abort the run; the question is marked for
/// manual review instead. A score file that cannot be written is logged and
/// the score is still kept on the record.
pub async fn evaluate_session(
    record: &mut SessionRecord,
    session_file: &Path,
    evaluator: &dyn Evaluator,
) {
    let dir = session_file.parent().unwrap_or_else(|| Path::new("."));
    let role = record.role.clone();

    for question in record.questions.iter_mut() {
        if question.status.is_none() {
            tracing::debug!(task_id = %question.id, "Question never asked, not scoring");
            continue;
        }
        let evaluation = match evaluator
            .evaluate(&role, &question.question, &question.user_answer)
            .await
        {
            Ok(evaluation) => evaluation,
            Err(e) => {
                tracing::warn!(task_id = %question.id, error = %e, "Evaluation failed");
                Evaluation::manual_review(e.to_string())
            }
        };

        let path = dir.join(score_file_name(evaluator.name(), &question.id));
        if let Err(e) = write_score_file(&path, &evaluation) {
            tracing::warn!(task_id = %question.id, error = %e, "Could not write score file");
        }

        question.score = evaluation.score.unwrap_or(0.0);
        question.rationale = evaluation.rationale;
        question.next_action = evaluation.next_action;
        tracing::info!(
            task_id = %question.id,
            score = question.score,
            "Question scored"
        );
    }
}

fn write_score_file(path: &Path, evaluation: &Evaluation) -> Result<()> {
    let json = serde_json::to_string_pretty(evaluation)?;
    std::fs::write(path, json).map_err(|e| VivaError::Persistence {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// `<evaluator>_<last 4 of id>output.json`, with dots in the evaluator name
/// replaced by underscores.
pub fn score_file_name(evaluator: &str, task_id: &str) -> String {
    let model = evaluator.replace('.', "_");
    let tail: String = {
        let chars: Vec<char> = task_id.chars().collect();
        chars[chars.len().saturating_sub(4)..].iter().collect()
    };
    format!("{model}_{tail}output.json")
}

/// Scores (when an evaluator is given), persists and reports one finished
/// session.
pub async fn process(
    notification: Notification,
    evaluator: Option<&dyn Evaluator>,
    store: &dyn SessionStore,
) -> Result<SessionRecord> {
    let Notification {
        session_file,
        mut record,
    } = notification;
    tracing::info!(
        interview = %record.interview_name,
        file = %session_file.display(),
        "Processing finished session"
    );

    match evaluator {
        Some(evaluator) => evaluate_session(&mut record, &session_file, evaluator).await,
        None => tracing::info!("No evaluator configured, skipping scoring"),
    }
    store.persist(&session_file, &record)?;

    let report = report_path(&session_file);
    std::fs::write(&report, render_report(&record)).map_err(|e| VivaError::Persistence {
        path: report.display().to_string(),
        message: e.to_string(),
    })?;
    tracing::info!(report = %report.display(), "Report written");
    Ok(record)
}

/// Background thread that runs [`process`] for every queued session.
pub struct NotificationWorker {
    tx: Option<Sender<Notification>>,
    thread: Option<JoinHandle<()>>,
}

impl NotificationWorker {
    pub fn spawn(
        evaluator: Option<Arc<dyn Evaluator>>,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        let (tx, rx) = unbounded::<Notification>();
        let thread = thread::Builder::new()
            .name("viva-notify".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        tracing::error!(error = %e, "Notification runtime failed to start");
                        return;
                    }
                };
                while let Ok(notification) = rx.recv() {
                    let file = notification.session_file.clone();
                    let result = runtime.block_on(process(
                        notification,
                        evaluator.as_deref(),
                        store.as_ref(),
                    ));
                    if let Err(e) = result {
                        tracing::error!(
                            file = %file.display(),
                            error = %e,
                            "Session processing failed"
                        );
                    }
                }
            })
            .map_err(|e| VivaError::ActorStart {
                actor: "notification".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    /// Queues a finished session.
    pub fn submit(&self, notification: Notification) -> Result<()> {
        self.tx
            .as_ref()
            .ok_or(VivaError::BridgeClosed)?
            .send(notification)
            .map_err(|_| VivaError::BridgeClosed)
    }

    /// A [`SessionSink`] that queues records under `session_file`.
    pub fn sink(&self, session_file: PathBuf) -> Option<NotificationSink> {
        self.tx.as_ref().map(|tx| NotificationSink {
            tx: tx.clone(),
            session_file,
        })
    }

    /// Stops accepting work and waits up to `grace` for the queue to drain.
    /// Returns false if the thread was still busy and got detached.
    pub async fn finish(mut self, grace: Duration) -> bool {
        self.tx.take();
        let Some(thread) = self.thread.take() else {
            return true;
        };
        let deadline = Instant::now() + grace;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!("Notification worker still busy, detaching");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        if thread.join().is_err() {
            tracing::error!("Notification worker panicked");
            return false;
        }
        true
    }
}

/// Hands records to a [`NotificationWorker`].
#[derive(Clone)]
pub struct NotificationSink {
    tx: Sender<Notification>,
    session_file: PathBuf,
}

impl SessionSink for NotificationSink {
    fn deliver(&self, record: SessionRecord) -> Result<()> {
        self.tx
            .send(Notification {
                session_file: self.session_file.clone(),
                record,
            })
            .map_err(|_| VivaError::BridgeClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::evaluator::MockEvaluator;
    use crate::session::record::{JsonSessionStore, QuestionRecord};
    use crate::session::state::TurnState;

    fn finished_record() -> SessionRecord {
        let mut answered = QuestionRecord::new("task-0a1b", "What is Drop?", 10.0, 0);
        answered.status = Some(TurnState::Completed);
        answered.user_answer = "A destructor hook.".to_string();
        let mut silent = QuestionRecord::new("task-9z8y", "What is Copy?", 10.0, 1);
        silent.status = Some(TurnState::TimedOut);
        let never = QuestionRecord::new("task-7777", "What is Clone?", 10.0, 2);
        SessionRecord {
            interview_name: "Rust".to_string(),
            role: "Engineer".to_string(),
            date: "2026-02-02".to_string(),
            user_email: "ada@example.com".to_string(),
            recording: String::new(),
            started_at: None,
            session_timeout_secs: None,
            questions: vec![answered, silent, never],
        }
    }

    #[test]
    fn test_score_file_name() {
        assert_eq!(
            score_file_name("gemini-2.0-flash", "3f2a-91c4"),
            "gemini-2_0-flash_91c4output.json"
        );
        assert_eq!(score_file_name("mock", "ab"), "mock_aboutput.json");
    }

    #[tokio::test]
    async fn test_process_scores_persists_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let session_file = dir.path().join("Engineer_20260202101010.json");
        let evaluator = MockEvaluator::new().with_score("What is Drop?", 0.9);

        let record = process(
            Notification {
                session_file: session_file.clone(),
                record: finished_record(),
            },
            Some(&evaluator),
            &JsonSessionStore,
        )
        .await
        .unwrap();

        assert_eq!(evaluator.calls(), 2);
        assert_eq!(record.questions[0].score, 0.9);
        assert_eq!(record.questions[1].score, 0.0);
        assert_eq!(record.questions[2].rationale, "");
        assert!(dir.path().join("mock_0a1boutput.json").exists());
        assert!(dir.path().join("mock_9z8youtput.json").exists());
        assert!(!dir.path().join("mock_7777output.json").exists());

        let stored = JsonSessionStore.load(&session_file).unwrap();
        assert_eq!(stored, record);
        let report = std::fs::read_to_string(report_path(&session_file)).unwrap();
        assert!(report.contains("Overall Score: 0.90"));
    }

    #[tokio::test]
    async fn test_process_without_evaluator_keeps_scores() {
        let dir = tempfile::tempdir().unwrap();
        let session_file = dir.path().join("session.json");
        let record = process(
            Notification {
                session_file: session_file.clone(),
                record: finished_record(),
            },
            None,
            &JsonSessionStore,
        )
        .await
        .unwrap();

        assert_eq!(record.questions[0].score, 0.0);
        assert!(session_file.exists());
        assert!(report_path(&session_file).exists());
        assert!(!dir.path().join("mock_0a1boutput.json").exists());
    }

    #[tokio::test]
    async fn test_failing_evaluator_falls_back_to_manual_review() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = finished_record();
        evaluate_session(
            &mut record,
            &dir.path().join("s.json"),
            &MockEvaluator::new().with_failure(),
        )
        .await;
        assert_eq!(record.questions[0].score, 0.0);
        assert_eq!(
            record.questions[0].next_action,
            crate::eval::evaluator::MANUAL_REVIEW
        );
    }

    #[tokio::test]
    async fn test_unwritable_score_file_still_persists_session() {
        let dir = tempfile::tempdir().unwrap();
        let session_file = dir.path().join("session.json");
        // A directory squatting on the score file name makes the write fail.
        std::fs::create_dir(dir.path().join("mock_0a1boutput.json")).unwrap();

        let record = process(
            Notification {
                session_file: session_file.clone(),
                record: finished_record(),
            },
            Some(&MockEvaluator::new().with_score("What is Drop?", 0.8)),
            &JsonSessionStore,
        )
        .await
        .unwrap();

        assert_eq!(record.questions[0].score, 0.8);
        assert!(dir.path().join("mock_9z8youtput.json").is_file());
        let stored = JsonSessionStore.load(&session_file).unwrap();
        assert_eq!(stored.questions[0].user_answer, "A destructor hook.");
        assert_eq!(stored.questions[0].status, Some(TurnState::Completed));
        assert_eq!(stored.questions[0].score, 0.8);
        assert_eq!(stored.questions[1].status, Some(TurnState::TimedOut));
        assert!(report_path(&session_file).exists());
    }

    #[tokio::test]
    async fn test_worker_processes_sink_deliveries() {
        let dir = tempfile::tempdir().unwrap();
        let session_file = dir.path().join("session.json");
        let worker = NotificationWorker::spawn(
            Some(Arc::new(MockEvaluator::new())),
            Arc::new(JsonSessionStore),
        )
        .unwrap();

        let sink = worker.sink(session_file.clone()).unwrap();
        sink.deliver(finished_record()).unwrap();
        drop(sink);
        assert!(worker.finish(Duration::from_secs(5)).await);

        let stored = JsonSessionStore.load(&session_file).unwrap();
        assert_eq!(stored.questions[0].score, 0.5);
        assert!(report_path(&session_file).exists());
    }
}
