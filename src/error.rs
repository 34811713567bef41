//! Error types for viva.

use crate::session::state::{TurnEvent, TurnState};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VivaError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Question data errors (fatal before a session starts)
    #[error("Invalid question {id:?}: {message}")]
    InvalidQuestion { id: String, message: String },

    #[error("Duplicate question id: {id}")]
    DuplicateQuestion { id: String },

    // Audio errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("Audio playback failed: {message}")]
    AudioPlayback { message: String },

    #[error("WAV error: {message}")]
    Wav { message: String },

    // Collaborator errors (recoverable per turn)
    #[error("Synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    #[error("Evaluation failed: {message}")]
    Evaluation { message: String },

    // Turn machinery
    #[error("Illegal turn transition from {from} on {event}")]
    IllegalTransition { from: TurnState, event: TurnEvent },

    #[error("Unknown task: {id}")]
    UnknownTask { id: String },

    #[error("Task {requested} cannot start while {active} is in progress")]
    TurnBusy { requested: String, active: String },

    #[error("Signal bridge closed")]
    BridgeClosed,

    #[error("Worker pool is shut down")]
    PoolClosed,

    #[error("Failed to start {actor} actor: {message}")]
    ActorStart { actor: String, message: String },

    // Persistence errors
    #[error("Session file error at {path}: {message}")]
    Persistence { path: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, VivaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_invalid_value_display() {
        let error = VivaError::ConfigInvalidValue {
            key: "capture.frame_ms".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for capture.frame_ms: must be positive"
        );
    }

    #[test]
    fn test_invalid_question_display() {
        let error = VivaError::InvalidQuestion {
            id: "q1".to_string(),
            message: "timeout must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid question \"q1\": timeout must be positive"
        );
    }

    #[test]
    fn test_illegal_transition_display() {
        let error = VivaError::IllegalTransition {
            from: TurnState::Completed,
            event: TurnEvent::PlaybackStarted,
        };
        assert_eq!(
            error.to_string(),
            "Illegal turn transition from completed on playback_started"
        );
    }

    #[test]
    fn test_turn_busy_display() {
        let error = VivaError::TurnBusy {
            requested: "q2".to_string(),
            active: "q1".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Task q2 cannot start while q1 is in progress"
        );
    }

    #[test]
    fn test_synthesis_display() {
        let error = VivaError::Synthesis {
            message: "no audio data received".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Synthesis failed: no audio data received"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: VivaError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: VivaError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error: VivaError = json_error.into();
        assert!(error.to_string().starts_with("JSON error"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let error: VivaError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<VivaError>();
        assert_sync::<VivaError>();
    }
}
