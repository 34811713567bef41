use crate::audio::buffer::AudioBuffer;
use crate::error::{Result, VivaError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Trait for speech-to-text transcription.
///
/// Calls are blocking; the session runs them on its worker pool.
pub trait Transcriber: Send + Sync {
    /// Transcribe a captured answer to text.
    fn transcribe(&self, audio: &AudioBuffer) -> Result<String>;

    /// Name used in logs and score file names.
    fn name(&self) -> &str;
}

/// Implement Transcriber for Arc<T> to allow sharing across threads.
impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    fn transcribe(&self, audio: &AudioBuffer) -> Result<String> {
        (**self).transcribe(audio)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Mock transcriber for testing.
///
/// Returns the configured responses in turn, repeating the last one.
#[derive(Debug)]
pub struct MockTranscriber {
    name: String,
    responses: Vec<String>,
    should_fail: bool,
    delay: Duration,
    calls: AtomicUsize,
    last_len: Mutex<Option<usize>>,
}

impl MockTranscriber {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            responses: vec!["mock transcription".to_string()],
            should_fail: false,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_len: Mutex::new(None),
        }
    }

    /// Configure the mock to return a specific response
    pub fn with_response(mut self, response: &str) -> Self {
        self.responses = vec![response.to_string()];
        self
    }

    /// One response per call, in order.
    pub fn with_responses(mut self, responses: &[&str]) -> Self {
        self.responses = responses.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Configure the mock to fail on transcribe
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Blocks each call for `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Sample count of the most recent buffer.
    pub fn last_len(&self) -> Option<usize> {
        self.last_len.lock().ok().and_then(|guard| *guard)
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, audio: &AudioBuffer) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_len.lock() {
            *last = Some(audio.len());
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.should_fail {
            return Err(VivaError::Transcription {
                message: "mock transcription failure".to_string(),
            });
        }
        let index = call.min(self.responses.len().saturating_sub(1));
        Ok(self.responses.get(index).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
