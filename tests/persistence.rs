//! Session files, score files and reports produced by a finished interview.

use chrono::{Local, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use viva::audio::playback::MockPlayback;
use viva::audio::recorder::{FramePhase, ScriptedAudioSource};
use viva::audio::vad::RmsClassifier;
use viva::eval::evaluator::MockEvaluator;
use viva::notify::NotificationWorker;
use viva::report::report_path;
use viva::session::actor::ActorMode;
use viva::session::orchestrator::{Collaborators, SessionConfig, SessionOrchestrator};
use viva::session::record::{
    InterviewFile, JsonSessionStore, SessionRecord, SessionStore, session_path,
};
use viva::session::state::TurnState;
use viva::stt::transcriber::MockTranscriber;
use viva::tts::synthesizer::MockSynthesizer;

const INTERVIEW: &str = r#"{
    "interview_name": "Rust Screening",
    "role": "Systems Engineer",
    "questions": [
        {"id": "3f2a-0b1c", "question": "What does Drop do?", "timeout": 5, "order": 1, "weight": 2.0},
        {"id": "9e8d-7c6b", "question": "What is ownership?", "timeout": 5, "order": 0},
        {"id": "1a2b-3c4d", "question": "What is Pin for?", "timeout": 5, "order": 2}
    ]
}"#;

fn interview(dir: &std::path::Path) -> InterviewFile {
    let path = dir.join("interview.json");
    std::fs::write(&path, INTERVIEW).unwrap();
    InterviewFile::load(&path).unwrap()
}

fn fast_config() -> SessionConfig {
    SessionConfig {
        session_timeout: Duration::from_secs(60),
        poll_interval: Duration::from_millis(20),
        question_wait: Duration::from_millis(20),
        signal_wait: Duration::from_millis(20),
        turn_poll: Duration::from_millis(10),
        cancel_grace: Duration::from_secs(2),
        workers: 1,
        actor_mode: ActorMode::SharedRuntime,
        ..SessionConfig::default()
    }
}

fn collaborators(synthesizer: MockSynthesizer) -> Collaborators {
    Collaborators {
        synthesizer: Arc::new(synthesizer),
        playback: Arc::new(MockPlayback::new()),
        transcriber: Arc::new(
            MockTranscriber::new("mock").with_responses(&["Single owner.", "Runs cleanup."]),
        ),
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

#[test]
fn test_session_file_lands_under_interview_and_email() {
    let dir = tempfile::tempdir().unwrap();
    let record = SessionRecord::new(&interview(dir.path()), "ada@example.com", Utc::now());
    let now = Local.with_ymd_and_hms(2026, 10, 16, 14, 3, 7).unwrap();

    let path = session_path(&dir.path().join("sessions"), &record, now);
    JsonSessionStore.persist(&path, &record).unwrap();

    assert_eq!(
        path,
        dir.path()
            .join("sessions/Rust_Screening/ada@example.com/Systems_Engineer_20261016140307.json")
    );
    let stored = JsonSessionStore.load(&path).unwrap();
    assert_eq!(stored, record);
    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(
        !raw.contains("\"status\""),
        "unasked questions carry no status"
    );
}

#[tokio::test]
async fn test_finished_session_is_scored_persisted_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let record = SessionRecord::new(&interview(dir.path()), "ada@example.com", Utc::now());
    let session_file = session_path(&dir.path().join("sessions"), &record, Local::now());
    let store = Arc::new(JsonSessionStore);
    store.persist(&session_file, &record).unwrap();

    let worker = NotificationWorker::spawn(
        Some(Arc::new(MockEvaluator::new().with_score("What is ownership?", 0.9))),
        store.clone(),
    )
    .unwrap();
    let sink = worker.sink(session_file.clone()).unwrap();

    // "What is Pin for?" cannot be spoken, so its turn times out.
    let delay = Duration::from_millis(20);
    let synthesizer = MockSynthesizer::new(delay).failing_on("What is Pin for?");
    let outcome = SessionOrchestrator::new(record, fast_config(), collaborators(synthesizer))
        .unwrap()
        .with_sink(Arc::new(sink))
        .run()
        .await
        .unwrap();
    assert!(worker.finish(Duration::from_secs(10)).await);
    assert_eq!(outcome.count(TurnState::Completed), 2);

    let stored = store.load(&session_file).unwrap();
    let by_order: Vec<_> = stored.ordered_questions();
    assert_eq!(by_order[0].user_answer, "Single owner.");
    assert_eq!(by_order[0].score, 0.9);
    assert_eq!(by_order[1].user_answer, "Runs cleanup.");
    assert_eq!(by_order[1].score, 0.5);
    assert_eq!(by_order[2].status, Some(TurnState::TimedOut));
    assert_eq!(by_order[2].score, 0.0);
    assert!(stored.started_at.is_some());
    assert_eq!(stored.session_timeout_secs, Some(60));

    let session_dir = session_file.parent().unwrap();
    for tail in ["0b1c", "7c6b", "3c4d"] {
        assert!(
            session_dir.join(format!("mock_{tail}output.json")).exists(),
            "missing score file for {tail}"
        );
    }

    let report = std::fs::read_to_string(report_path(&session_file)).unwrap();
    assert!(report.contains("Interview Report: Rust Screening"));
    assert!(report.contains("Overall Score: 1.90"));
    assert!(report.contains("Status:    timed_out"));
}
