//! Voice Activity Detection (VAD) frame classification.
//!
//! Classifies fixed-length audio frames as speech or silence using
//! RMS-based thresholding. The pause logic built on top lives in
//! `session::capture`.

use crate::defaults;

/// Result of classifying one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Speech,
    Silence,
}

/// Decides whether a frame of PCM contains speech.
pub trait FrameClassifier: Send + Sync {
    fn classify(&self, frame: &[i16], sample_rate: u32) -> FrameKind;
}

impl<T: FrameClassifier + ?Sized> FrameClassifier for std::sync::Arc<T> {
    fn classify(&self, frame: &[i16], sample_rate: u32) -> FrameKind {
        (**self).classify(frame, sample_rate)
    }
}

/// Energy classifier: speech when the frame RMS exceeds `threshold`.
#[derive(Debug, Clone, Copy)]
pub struct RmsClassifier {
    /// RMS threshold for detecting speech (0.0 to 1.0).
    pub threshold: f32,
}

impl RmsClassifier {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for RmsClassifier {
    fn default() -> Self {
        Self::new(defaults::VAD_THRESHOLD)
    }
}

impl FrameClassifier for RmsClassifier {
    fn classify(&self, frame: &[i16], _sample_rate: u32) -> FrameKind {
        if calculate_rms(frame) > self.threshold {
            FrameKind::Speech
        } else {
            FrameKind::Silence
        }
    }
}

/// Calculates the Root Mean Square (RMS) of audio samples.
///
/// RMS is a measure of the average power of the signal.
/// Returns a value between 0.0 (silence) and 1.0 (maximum amplitude).
pub fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = f64::from(sample) / f64::from(i16::MAX);
            normalized * normalized
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    mean_square.sqrt() as f32
}

/// Number of samples in a frame of `frame_ms` at `sample_rate`.
pub fn frame_len(sample_rate: u32, frame_ms: u32) -> usize {
    (u64::from(sample_rate) * u64::from(frame_ms) / 1000) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_of_silence_is_zero() {
        assert_eq!(calculate_rms(&[0; 480]), 0.0);
        assert_eq!(calculate_rms(&[]), 0.0);
    }

    #[test]
    fn test_rms_of_full_scale_is_one() {
        let rms = calculate_rms(&[i16::MAX; 100]);
        assert!((rms - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rms_classifier_threshold() {
        let classifier = RmsClassifier::new(0.1);
        assert_eq!(classifier.classify(&[0; 480], 16000), FrameKind::Silence);
        assert_eq!(
            classifier.classify(&[10_000; 480], 16000),
            FrameKind::Speech
        );
        // 0.05 of full scale stays below 0.1.
        assert_eq!(classifier.classify(&[1638; 480], 16000), FrameKind::Silence);
    }

    #[test]
    fn test_frame_len_for_supported_rates() {
        assert_eq!(frame_len(16000, 30), 480);
        assert_eq!(frame_len(8000, 30), 240);
        assert_eq!(frame_len(48000, 30), 1440);
    }
}
