//! Default configuration constants for viva.
//!
//! Shared by the TOML config, the session orchestrator and the capture loop so
//! the three never disagree about a default.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and what frame-based voice
/// activity classifiers expect.
pub const SAMPLE_RATE: u32 = 16000;

/// Sample rates accepted for capture.
pub const SUPPORTED_SAMPLE_RATES: [u32; 4] = [8000, 16000, 32000, 48000];

/// Default RMS threshold (0.0 to 1.0) above which a frame counts as speech.
pub const VAD_THRESHOLD: f32 = 0.02;

/// Length of one classified audio frame in milliseconds.
pub const FRAME_MS: u32 = 30;

/// Consecutive silence, after speech began, that ends an utterance.
pub const PAUSE_MS: u32 = 1000;

/// Consecutive speech needed before the speaker is considered to be talking.
///
/// Filters out coughs and clicks that would otherwise arm the pause detector.
pub const SPEECH_HOLD_MS: u32 = 600;

/// Hard ceiling on a single captured answer.
pub const MAX_UTTERANCE_SECS: u64 = 30;

/// Upper bound on transcribing one captured answer.
pub const TRANSCRIBE_TIMEOUT_SECS: u64 = 30;

/// Default wall-clock budget for a whole interview session.
pub const SESSION_TIMEOUT_SECS: u64 = 600;

/// Orchestrator poll interval.
pub const POLL_INTERVAL_MS: u64 = 500;

/// How long the agent waits on the question bridge before re-checking shutdown.
pub const QUESTION_WAIT_MS: u64 = 5000;

/// How long the user actor waits on the interaction bridge before re-checking shutdown.
pub const SIGNAL_WAIT_MS: u64 = 5000;

/// Agent poll interval while waiting for an answer.
pub const TURN_POLL_MS: u64 = 500;

/// Upper bound on waiting for actors and workers to acknowledge shutdown.
pub const CANCEL_GRACE_MS: u64 = 5000;

/// Worker threads available for blocking collaborator calls.
pub const WORKERS: usize = 5;

/// Scoring weight for questions that do not specify one.
pub const QUESTION_WEIGHT: f32 = 1.0;

/// Application directory name under the XDG config/data roots.
pub const APP_DIR: &str = "viva";

/// How long `viva run` waits for scoring and the report before exiting.
pub const NOTIFY_GRACE_SECS: u64 = 300;
