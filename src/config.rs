use crate::command::CommandSpec;
use crate::defaults;
use crate::error::{Result, VivaError};
use crate::session::actor::ActorMode;
use crate::session::capture::CaptureConfig;
use crate::session::orchestrator::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub session: SessionSection,
    pub capture: CaptureSection,
    pub audio: AudioSection,
    pub paths: PathsSection,
    pub commands: CommandsSection,
}

/// Session clock and actor scheduling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSection {
    /// Whole-session budget, e.g. "10m" or "90s".
    #[serde(with = "duration_str")]
    pub session_timeout: Duration,
    pub poll_interval_ms: u64,
    pub question_wait_ms: u64,
    pub signal_wait_ms: u64,
    pub turn_poll_ms: u64,
    pub cancel_grace_ms: u64,
    pub workers: usize,
    /// Run each actor on its own thread and runtime.
    pub actor_threads: bool,
}

/// Capture-until-pause tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureSection {
    pub sample_rate: u32,
    pub frame_ms: u32,
    pub pause_ms: u32,
    pub speech_hold_ms: u32,
    pub max_utterance_secs: u64,
    /// Transcriptions running longer than this end the turn as timed out.
    pub transcribe_timeout_secs: u64,
    pub vad_threshold: f32,
}

/// Audio device selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AudioSection {
    pub device: Option<String>,
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PathsSection {
    /// Root of the session tree. Defaults to the XDG data directory.
    pub sessions_dir: Option<PathBuf>,
}

/// External collaborator programs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CommandsSection {
    /// Text-to-speech command; `{text}` is the question, WAV on stdout.
    pub tts: Option<CommandSpec>,
    /// Speech-to-text command; `{input}` is a WAV file, text on stdout.
    pub stt: Option<CommandSpec>,
    /// Grading command; prompt on stdin, JSON on stdout.
    pub evaluator: Option<CommandSpec>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(defaults::SESSION_TIMEOUT_SECS),
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            question_wait_ms: defaults::QUESTION_WAIT_MS,
            signal_wait_ms: defaults::SIGNAL_WAIT_MS,
            turn_poll_ms: defaults::TURN_POLL_MS,
            cancel_grace_ms: defaults::CANCEL_GRACE_MS,
            workers: defaults::WORKERS,
            actor_threads: true,
        }
    }
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            frame_ms: defaults::FRAME_MS,
            pause_ms: defaults::PAUSE_MS,
            speech_hold_ms: defaults::SPEECH_HOLD_MS,
            max_utterance_secs: defaults::MAX_UTTERANCE_SECS,
            transcribe_timeout_secs: defaults::TRANSCRIBE_TIMEOUT_SECS,
            vad_threshold: defaults::VAD_THRESHOLD,
        }
    }
}

/// `session_timeout` is written as a humantime string ("10m").
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing or contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VivaError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                VivaError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(VivaError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VIVA_SESSIONS_DIR → paths.sessions_dir
    /// - VIVA_AUDIO_DEVICE → audio.device
    /// - VIVA_SESSION_TIMEOUT → session.session_timeout (e.g. "15m")
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(dir) = std::env::var("VIVA_SESSIONS_DIR")
            && !dir.is_empty()
        {
            self.paths.sessions_dir = Some(PathBuf::from(dir));
        }

        if let Ok(device) = std::env::var("VIVA_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(timeout) = std::env::var("VIVA_SESSION_TIMEOUT")
            && !timeout.is_empty()
        {
            self.session.session_timeout =
                humantime::parse_duration(&timeout).map_err(|e| VivaError::ConfigInvalidValue {
                    key: "VIVA_SESSION_TIMEOUT".to_string(),
                    message: e.to_string(),
                })?;
        }

        Ok(self)
    }

    /// Rejects values the session machinery cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: String| {
            Err(VivaError::ConfigInvalidValue {
                key: key.to_string(),
                message,
            })
        };
        if self.capture.frame_ms == 0 {
            return invalid("capture.frame_ms", "must be positive".to_string());
        }
        if !defaults::SUPPORTED_SAMPLE_RATES.contains(&self.capture.sample_rate) {
            return invalid(
                "capture.sample_rate",
                format!(
                    "{} Hz is not supported (use one of {:?})",
                    self.capture.sample_rate,
                    defaults::SUPPORTED_SAMPLE_RATES
                ),
            );
        }
        if !(0.0..=1.0).contains(&self.capture.vad_threshold) {
            return invalid(
                "capture.vad_threshold",
                "must be between 0.0 and 1.0".to_string(),
            );
        }
        if self.capture.max_utterance_secs == 0 {
            return invalid("capture.max_utterance_secs", "must be positive".to_string());
        }
        if self.capture.transcribe_timeout_secs == 0 {
            return invalid(
                "capture.transcribe_timeout_secs",
                "must be positive".to_string(),
            );
        }
        if self.session.poll_interval_ms == 0 {
            return invalid("session.poll_interval_ms", "must be positive".to_string());
        }
        if self.session.turn_poll_ms == 0 {
            return invalid("session.turn_poll_ms", "must be positive".to_string());
        }
        if self.session.workers == 0 {
            return invalid("session.workers", "must be at least 1".to_string());
        }
        if self.session.session_timeout.is_zero() {
            return invalid("session.session_timeout", "must be positive".to_string());
        }
        Ok(())
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.capture.sample_rate,
            frame_ms: self.capture.frame_ms,
            pause_ms: self.capture.pause_ms,
            speech_hold_ms: self.capture.speech_hold_ms,
            max_utterance: Duration::from_secs(self.capture.max_utterance_secs),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let s = &self.session;
        SessionConfig {
            session_timeout: s.session_timeout,
            poll_interval: Duration::from_millis(s.poll_interval_ms),
            question_wait: Duration::from_millis(s.question_wait_ms),
            signal_wait: Duration::from_millis(s.signal_wait_ms),
            turn_poll: Duration::from_millis(s.turn_poll_ms),
            cancel_grace: Duration::from_millis(s.cancel_grace_ms),
            transcribe_timeout: Duration::from_secs(self.capture.transcribe_timeout_secs),
            workers: s.workers,
            actor_mode: if s.actor_threads {
                ActorMode::DedicatedThreads
            } else {
                ActorMode::SharedRuntime
            },
            capture: self.capture_config(),
        }
    }

    /// Where session files go: `paths.sessions_dir`, else `~/.local/share/viva/sessions`.
    pub fn sessions_dir(&self) -> PathBuf {
        self.paths.sessions_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(defaults::APP_DIR)
                .join("sessions")
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/viva/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(defaults::APP_DIR)
            .join("config.toml")
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VivaError::Other(e.to_string()))
    }
}
