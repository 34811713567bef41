//! viva - Spoken interview sessions
//!
//! An agent asks questions aloud, the candidate answers, and a session
//! orchestrator keeps the two in strict turn order under a session clock.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod app;
pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod command;
pub mod config;
pub mod defaults;
pub mod error;
pub mod eval;
pub mod notify;
pub mod report;
pub mod session;
pub mod stt;
pub mod tts;

// Collaborator traits
pub use audio::playback::Playback;
pub use audio::recorder::AudioSource;
pub use audio::vad::FrameClassifier;
pub use eval::evaluator::Evaluator;
pub use stt::transcriber::Transcriber;
pub use tts::synthesizer::Synthesizer;

// Session
pub use session::orchestrator::{
    Collaborators, SessionConfig, SessionEnd, SessionOrchestrator, SessionOutcome, SessionSink,
};
pub use session::record::{InterviewFile, SessionRecord, SessionStore};
pub use session::state::{TurnEvent, TurnState};

// Error handling
pub use error::{Result, VivaError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }
}
