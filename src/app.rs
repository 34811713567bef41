//! Interview application entry point.
//!
//! Wires configuration, collaborators and the notification worker around a
//! [`SessionOrchestrator`]: load interview → persist → run → score → report.

use crate::audio::playback::Playback;
use crate::audio::recorder::AudioSource;
use crate::audio::vad::RmsClassifier;
use crate::audio::wav::WavAudioSource;
use crate::config::Config;
use crate::defaults;
use crate::error::{Result, VivaError};
use crate::eval::command::CommandEvaluator;
use crate::eval::evaluator::Evaluator;
use crate::notify::NotificationWorker;
use crate::report::render_report;
use crate::session::orchestrator::{Collaborators, SessionOrchestrator, SessionOutcome};
use crate::session::record::{
    InterviewFile, JsonSessionStore, SessionRecord, SessionStore, session_path,
};
use crate::stt::command::CommandTranscriber;
use crate::tts::command::CommandSynthesizer;
use crate::tts::synthesizer::Synthesizer;
use crate::tts::wav_file::WavFileSynthesizer;
use chrono::{Local, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Per-run overrides from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub interview: PathBuf,
    pub email: String,
    pub session_timeout: Option<Duration>,
    pub device: Option<String>,
    pub replay: Option<PathBuf>,
    pub sessions_dir: Option<PathBuf>,
    pub no_eval: bool,
}

/// What `run` reports back to the terminal.
#[derive(Debug)]
pub struct RunSummary {
    pub session_file: PathBuf,
    pub outcome: SessionOutcome,
    /// Scoring and the report finished before exit.
    pub notified: bool,
}

/// Run one interview end to end.
///
/// The session file is written before the first question so a crashed run
/// still leaves a record behind.
pub async fn run_interview(mut config: Config, options: RunOptions) -> Result<RunSummary> {
    apply_overrides(&mut config, &options);
    config.validate()?;

    let interview = InterviewFile::load(&options.interview)?;
    let record = SessionRecord::new(&interview, &options.email, Utc::now());
    let session_file = session_path(&config.sessions_dir(), &record, Local::now());

    let store: Arc<dyn SessionStore> = Arc::new(JsonSessionStore);
    store.persist(&session_file, &record)?;
    tracing::info!(
        interview = %record.interview_name,
        candidate = %record.user_email,
        file = %session_file.display(),
        "Session created"
    );

    let base_dir = options
        .interview
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let collaborators = build_collaborators(
        &config,
        &interview,
        &base_dir,
        options.replay.as_deref(),
    )?;
    let evaluator = build_evaluator(&config, options.no_eval);

    let worker = NotificationWorker::spawn(evaluator, store)?;
    let mut orchestrator =
        SessionOrchestrator::new(record, config.session_config(), collaborators)?;
    if let Some(sink) = worker.sink(session_file.clone()) {
        orchestrator = orchestrator.with_sink(Arc::new(sink));
    }

    let outcome = orchestrator.run().await?;
    let notified = worker
        .finish(Duration::from_secs(defaults::NOTIFY_GRACE_SECS))
        .await;

    Ok(RunSummary {
        session_file,
        outcome,
        notified,
    })
}

/// Load a persisted session and render its report.
pub fn show_session(path: &Path) -> Result<String> {
    let record = JsonSessionStore.load(path)?;
    Ok(render_report(&record))
}

fn apply_overrides(config: &mut Config, options: &RunOptions) {
    if let Some(timeout) = options.session_timeout {
        config.session.session_timeout = timeout;
    }
    if let Some(device) = &options.device {
        config.audio.device = Some(device.clone());
    }
    if let Some(dir) = &options.sessions_dir {
        config.paths.sessions_dir = Some(dir.clone());
    }
}

/// Build the synthesizer, transcriber, playback and input source.
///
/// `replay` replaces the microphone with a recording; answers are read from
/// consecutive stretches of it.
pub fn build_collaborators(
    config: &Config,
    interview: &InterviewFile,
    base_dir: &Path,
    replay: Option<&Path>,
) -> Result<Collaborators> {
    let stt = config
        .commands
        .stt
        .clone()
        .ok_or_else(|| VivaError::ConfigInvalidValue {
            key: "commands.stt".to_string(),
            message: "a speech-to-text command is required".to_string(),
        })?;
    let transcriber = Arc::new(CommandTranscriber::new(stt)?);

    Ok(Collaborators {
        synthesizer: build_synthesizer(config, interview, base_dir),
        playback: build_playback(config)?,
        transcriber,
        classifier: Arc::new(RmsClassifier::new(config.capture.vad_threshold)),
        source: build_source(config, replay)?,
    })
}

fn build_synthesizer(
    config: &Config,
    interview: &InterviewFile,
    base_dir: &Path,
) -> Arc<dyn Synthesizer> {
    let mut files = WavFileSynthesizer::new();
    for question in &interview.questions {
        if let Some(wav) = &question.wav_file {
            files.insert(&question.question, wav, base_dir);
        }
    }
    let missing = interview.questions.len() - files.len().min(interview.questions.len());

    match config.commands.tts.clone() {
        Some(spec) => Arc::new(files.with_fallback(Arc::new(CommandSynthesizer::new(spec)))),
        None => {
            if missing > 0 {
                tracing::warn!(
                    missing,
                    "Questions without wav_file and no TTS command; they will be skipped"
                );
            }
            Arc::new(files)
        }
    }
}

#[cfg(feature = "cpal-audio")]
fn build_playback(_config: &Config) -> Result<Arc<dyn Playback>> {
    Ok(Arc::new(crate::audio::playback::CpalPlayback::new(None)?))
}

#[cfg(not(feature = "cpal-audio"))]
fn build_playback(_config: &Config) -> Result<Arc<dyn Playback>> {
    tracing::warn!("Built without audio output; questions will not be heard");
    Ok(Arc::new(crate::audio::playback::NullPlayback))
}

fn build_source(config: &Config, replay: Option<&Path>) -> Result<Box<dyn AudioSource>> {
    if let Some(path) = replay {
        tracing::info!(file = %path.display(), "Replaying answers from recording");
        return Ok(Box::new(WavAudioSource::open(path, config.capture.sample_rate)?));
    }
    microphone(config)
}

#[cfg(feature = "cpal-audio")]
fn microphone(config: &Config) -> Result<Box<dyn AudioSource>> {
    Ok(Box::new(crate::audio::capture::CpalAudioSource::new(
        config.audio.device.as_deref(),
        config.capture.sample_rate,
    )?))
}

#[cfg(not(feature = "cpal-audio"))]
fn microphone(_config: &Config) -> Result<Box<dyn AudioSource>> {
    Err(VivaError::AudioCapture {
        message: "built without microphone support; use --replay <file.wav>".to_string(),
    })
}

fn build_evaluator(config: &Config, no_eval: bool) -> Option<Arc<dyn Evaluator>> {
    if no_eval {
        return None;
    }
    config
        .commands
        .evaluator
        .clone()
        .map(|spec| Arc::new(CommandEvaluator::new(spec)) as Arc<dyn Evaluator>)
}
