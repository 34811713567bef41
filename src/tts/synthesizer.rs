use crate::audio::buffer::AudioBuffer;
use crate::defaults;
use crate::error::{Result, VivaError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Turns question text into audio.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioBuffer>;

    /// Name used in logs.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: Synthesizer + ?Sized> Synthesizer for Arc<T> {
    async fn synthesize(&self, text: &str) -> Result<AudioBuffer> {
        (**self).synthesize(text).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Mock synthesizer producing a fixed-length tone.
#[derive(Debug)]
pub struct MockSynthesizer {
    duration: Duration,
    sample_rate: u32,
    delay: Duration,
    fail_on: HashSet<String>,
    calls: AtomicUsize,
    spoken: Mutex<Vec<String>>,
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl MockSynthesizer {
    /// Every question renders as `duration` of audio.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            sample_rate: defaults::SAMPLE_RATE,
            delay: Duration::ZERO,
            fail_on: HashSet::new(),
            calls: AtomicUsize::new(0),
            spoken: Mutex::new(Vec::new()),
        }
    }

    /// Fail whenever asked to speak `text`.
    pub fn failing_on(mut self, text: &str) -> Self {
        self.fail_on.insert(text.to_string());
        self
    }

    /// Simulated synthesis latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Texts successfully synthesized, in call order.
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioBuffer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_on.contains(text) {
            return Err(VivaError::Synthesis {
                message: format!("mock synthesis failure for {text:?}"),
            });
        }
        if let Ok(mut spoken) = self.spoken.lock() {
            spoken.push(text.to_string());
        }
        let len = (self.duration.as_secs_f64() * f64::from(self.sample_rate)) as usize;
        Ok(AudioBuffer::new(vec![0; len], self.sample_rate))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_produces_requested_duration() {
        let synth = MockSynthesizer::new(Duration::from_millis(250));
        let audio = synth.synthesize("Tell me about lifetimes.").await.unwrap();
        assert_eq!(audio.duration(), Duration::from_millis(250));
        assert_eq!(synth.spoken(), ["Tell me about lifetimes."]);
    }

    #[tokio::test]
    async fn test_mock_fails_on_configured_text() {
        let synth = MockSynthesizer::default().failing_on("bad");
        assert!(matches!(
            synth.synthesize("bad").await,
            Err(VivaError::Synthesis { .. })
        ));
        assert!(synth.synthesize("good").await.is_ok());
        assert_eq!(synth.calls(), 2);
        assert_eq!(synth.spoken(), ["good"]);
    }

    #[tokio::test]
    async fn test_arc_dyn_dispatch() {
        let synth: Arc<dyn Synthesizer> = Arc::new(MockSynthesizer::default());
        assert_eq!(synth.name(), "mock");
        assert!(!synth.synthesize("hi").await.unwrap().is_empty());
    }
}
