use std::time::Duration;

/// Mono 16-bit PCM audio with its sample rate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioBuffer {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Playback length. Zero for an empty buffer or a zero sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Converts to `target_rate` with linear interpolation.
    pub fn resampled(&self, target_rate: u32) -> AudioBuffer {
        AudioBuffer {
            samples: crate::audio::wav::resample(&self.samples, self.sample_rate, target_rate),
            sample_rate: target_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_of_one_second() {
        let buffer = AudioBuffer::new(vec![0; 16000], 16000);
        assert_eq!(buffer.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_duration_zero_rate() {
        let buffer = AudioBuffer::new(vec![0; 10], 0);
        assert_eq!(buffer.duration(), Duration::ZERO);
    }

    #[test]
    fn test_resampled_halves_length() {
        let buffer = AudioBuffer::new(vec![500; 3200], 16000).resampled(8000);
        assert_eq!(buffer.sample_rate, 8000);
        assert_eq!(buffer.len(), 1600);
    }
}
