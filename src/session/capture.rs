//! Capture-until-pause: records one spoken answer.
//!
//! Audio is cut into fixed frames and classified. Once the speaker has talked
//! for `speech_hold_ms`, a run of `pause_ms` silence ends the answer. A hard
//! ceiling bounds the capture independently of any turn timeout.

use crate::audio::buffer::AudioBuffer;
use crate::audio::recorder::{ActiveStream, AudioSource};
use crate::audio::vad::{FrameClassifier, FrameKind, frame_len};
use crate::defaults;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Consecutive read failures tolerated before the capture gives up.
const MAX_READ_ERRORS: u32 = 10;

/// Timing parameters for one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub frame_ms: u32,
    pub pause_ms: u32,
    pub speech_hold_ms: u32,
    pub max_utterance: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            frame_ms: defaults::FRAME_MS,
            pause_ms: defaults::PAUSE_MS,
            speech_hold_ms: defaults::SPEECH_HOLD_MS,
            max_utterance: Duration::from_secs(defaults::MAX_UTTERANCE_SECS),
        }
    }
}

impl CaptureConfig {
    fn frame_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.frame_ms.max(1)))
    }
}

/// Why a capture ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Speech followed by a qualifying pause.
    Paused,
    /// The ceiling was hit; the audio is whatever was captured until then.
    Truncated,
    /// A finite source ran out of samples.
    SourceExhausted,
}

/// A captured answer.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub audio: AudioBuffer,
    pub outcome: CaptureOutcome,
    /// Whether the speech hold was ever reached.
    pub had_speech: bool,
}

/// Frame-by-frame pause logic, independent of any audio source.
#[derive(Debug, Clone)]
pub struct PauseDetector {
    hold_frames: u32,
    pause_frames: u32,
    speech_run: u32,
    silence_run: u32,
    speaking: bool,
}

impl PauseDetector {
    pub fn new(config: &CaptureConfig) -> Self {
        let frame_ms = config.frame_ms.max(1);
        Self {
            hold_frames: (config.speech_hold_ms / frame_ms).max(1),
            pause_frames: (config.pause_ms / frame_ms).max(1),
            speech_run: 0,
            silence_run: 0,
            speaking: false,
        }
    }

    /// Feeds one classified frame. Returns true when the utterance is over.
    pub fn push(&mut self, kind: FrameKind) -> bool {
        match kind {
            FrameKind::Speech => {
                self.speech_run += 1;
                if !self.speaking && self.speech_run >= self.hold_frames {
                    self.speaking = true;
                }
                if self.speaking {
                    self.silence_run = 0;
                }
            }
            FrameKind::Silence => {
                self.speech_run = 0;
                self.silence_run += 1;
            }
        }
        self.speaking && self.silence_run >= self.pause_frames
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }
}

/// Runs capture-until-pause against an [`AudioSource`].
pub struct PauseCapture {
    config: CaptureConfig,
    classifier: Arc<dyn FrameClassifier>,
}

impl PauseCapture {
    pub fn new(config: CaptureConfig, classifier: Arc<dyn FrameClassifier>) -> Self {
        Self { config, classifier }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Captures one answer from `source`.
    ///
    /// The source is started on entry and stopped on every exit path,
    /// including cancellation of the returned future.
    ///
    /// # Errors
    /// Fails when the source cannot be started or keeps failing to read.
    pub async fn capture(&self, source: &mut dyn AudioSource) -> Result<Utterance> {
        let rate = self.config.sample_rate;
        let frame = frame_len(rate, self.config.frame_ms).max(1);
        let max_samples =
            (self.config.max_utterance.as_secs_f64() * f64::from(rate)).round() as usize;
        let frame_wait = self.config.frame_duration();

        let mut detector = PauseDetector::new(&self.config);
        let mut captured: Vec<i16> = Vec::new();
        let mut pending: Vec<i16> = Vec::new();
        let mut read_errors = 0u32;

        let started = Instant::now();
        let mut stream = ActiveStream::open(source)?;

        let outcome = loop {
            if captured.len() >= max_samples || started.elapsed() >= self.config.max_utterance {
                break CaptureOutcome::Truncated;
            }

            let samples = match stream.read_samples() {
                Ok(samples) => {
                    read_errors = 0;
                    samples
                }
                Err(e) => {
                    read_errors += 1;
                    if read_errors >= MAX_READ_ERRORS {
                        return Err(e);
                    }
                    tracing::warn!(error = %e, attempt = read_errors, "Audio read failed");
                    tokio::time::sleep(frame_wait).await;
                    continue;
                }
            };

            if samples.is_empty() {
                if stream.is_finite() {
                    captured.append(&mut pending);
                    break CaptureOutcome::SourceExhausted;
                }
                tokio::time::sleep(frame_wait).await;
                continue;
            }

            pending.extend_from_slice(&samples);
            let mut paused = false;
            let mut consumed = 0;
            while pending.len() - consumed >= frame && captured.len() < max_samples {
                let chunk = &pending[consumed..consumed + frame];
                let kind = self.classifier.classify(chunk, rate);
                captured.extend_from_slice(chunk);
                consumed += frame;
                if detector.push(kind) {
                    paused = true;
                    break;
                }
            }
            pending.drain(..consumed);

            if paused {
                break CaptureOutcome::Paused;
            }
            tokio::task::yield_now().await;
        };
        drop(stream);

        captured.truncate(max_samples);
        let had_speech = detector.is_speaking();
        tracing::debug!(
            ?outcome,
            had_speech,
            samples = captured.len(),
            "Capture finished"
        );
        Ok(Utterance {
            audio: AudioBuffer::new(captured, rate),
            outcome,
            had_speech,
        })
    }
}
