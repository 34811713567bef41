use crate::error::{Result, VivaError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Trait for audio source devices.
///
/// This trait allows swapping implementations (real audio device vs mock).
pub trait AudioSource: Send + Sync {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source.
    fn stop(&mut self) -> Result<()>;

    /// Read the 16-bit PCM samples captured since the last call.
    ///
    /// An empty vector means "nothing yet" for live sources and "exhausted"
    /// for finite ones.
    fn read_samples(&mut self) -> Result<Vec<i16>>;

    /// True for sources that end (files), false for live devices.
    fn is_finite(&self) -> bool {
        false
    }
}

/// Scoped capture: starts the source on open and stops it on drop.
///
/// Dropping happens on normal return, on error, and when the owning future
/// is cancelled, so the device is never left running.
pub struct ActiveStream<'a> {
    source: &'a mut dyn AudioSource,
}

impl<'a> ActiveStream<'a> {
    pub fn open(source: &'a mut dyn AudioSource) -> Result<Self> {
        source.start()?;
        Ok(Self { source })
    }

    pub fn read_samples(&mut self) -> Result<Vec<i16>> {
        self.source.read_samples()
    }

    pub fn is_finite(&self) -> bool {
        self.source.is_finite()
    }
}

impl Drop for ActiveStream<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.source.stop() {
            tracing::warn!(error = %e, "Failed to stop audio source");
        }
    }
}

/// One stretch of scripted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// `ms` of loud tone.
    Speech { ms: u32 },
    /// `ms` of digital silence.
    Silence { ms: u32 },
}

/// Counters shared with a [`ScriptedAudioSource`] after it is boxed.
#[derive(Debug, Clone, Default)]
pub struct SourceMonitor {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl SourceMonitor {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// True when every start has been matched by a stop.
    pub fn is_idle(&self) -> bool {
        self.starts() == self.stops()
    }
}

/// Mock audio source that plays a fixed script of speech and silence.
///
/// Every `start` rewinds to the beginning of the script, so each captured
/// answer hears the same utterance. In live mode the source keeps producing
/// silence after the script ends; otherwise it reports exhaustion. A paced
/// source is live and hands out samples no faster than real time.
#[derive(Debug, Clone)]
pub struct ScriptedAudioSource {
    samples: Vec<i16>,
    sample_rate: u32,
    cursor: usize,
    chunk_size: usize,
    live: bool,
    paced_from: Option<Instant>,
    paced: bool,
    delivered: usize,
    fail_start: bool,
    fail_read: bool,
    monitor: SourceMonitor,
}

/// Amplitude of scripted speech frames.
const SPEECH_AMPLITUDE: i16 = 8000;

impl ScriptedAudioSource {
    pub fn new(sample_rate: u32, phases: &[FramePhase]) -> Self {
        let per_ms = sample_rate as usize / 1000;
        let mut samples = Vec::new();
        for phase in phases {
            match *phase {
                FramePhase::Speech { ms } => {
                    let len = per_ms * ms as usize;
                    // Square wave keeps the RMS well above any sane threshold.
                    samples.extend((0..len).map(|i| {
                        if (i / 8) % 2 == 0 {
                            SPEECH_AMPLITUDE
                        } else {
                            -SPEECH_AMPLITUDE
                        }
                    }));
                }
                FramePhase::Silence { ms } => {
                    samples.extend(std::iter::repeat_n(0i16, per_ms * ms as usize));
                }
            }
        }
        Self {
            samples,
            sample_rate,
            cursor: 0,
            chunk_size: (per_ms * 10).max(1),
            live: false,
            paced_from: None,
            paced: false,
            delivered: 0,
            fail_start: false,
            fail_read: false,
            monitor: SourceMonitor::default(),
        }
    }

    /// Keep producing silence after the script instead of ending.
    pub fn live(mut self) -> Self {
        self.live = true;
        self
    }

    /// Live, and delivering audio at the rate a microphone would.
    pub fn paced(mut self) -> Self {
        self.live = true;
        self.paced = true;
        self
    }

    /// Samples returned per read (defaults to 10 ms).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_start_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn with_read_failure(mut self) -> Self {
        self.fail_read = true;
        self
    }

    pub fn monitor(&self) -> SourceMonitor {
        self.monitor.clone()
    }
}

impl AudioSource for ScriptedAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(VivaError::AudioCapture {
                message: "scripted start failure".to_string(),
            });
        }
        self.cursor = 0;
        self.delivered = 0;
        self.paced_from = self.paced.then(Instant::now);
        self.monitor.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.monitor.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.fail_read {
            return Err(VivaError::AudioCapture {
                message: "scripted read failure".to_string(),
            });
        }
        let budget = match self.paced_from {
            Some(from) => {
                let due = (from.elapsed().as_secs_f64() * f64::from(self.sample_rate)) as usize;
                due.saturating_sub(self.delivered).min(self.chunk_size)
            }
            None => self.chunk_size,
        };
        if budget == 0 {
            return Ok(Vec::new());
        }
        let end = (self.cursor + budget).min(self.samples.len());
        if let Some(chunk) = self.samples.get(self.cursor..end)
            && !chunk.is_empty()
        {
            self.cursor = end;
            self.delivered += chunk.len();
            return Ok(chunk.to_vec());
        }
        if self.live {
            self.delivered += budget;
            Ok(vec![0; budget])
        } else {
            Ok(Vec::new())
        }
    }

    fn is_finite(&self) -> bool {
        !self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_length_matches_phases() {
        let mut source = ScriptedAudioSource::new(
            16000,
            &[
                FramePhase::Speech { ms: 20 },
                FramePhase::Silence { ms: 10 },
            ],
        )
        .with_chunk_size(10_000);
        source.start().unwrap();
        let samples = source.read_samples().unwrap();
        assert_eq!(samples.len(), 480);
        assert!(samples[..320].iter().all(|&s| s.abs() == SPEECH_AMPLITUDE));
        assert!(samples[320..].iter().all(|&s| s == 0));
        assert!(source.read_samples().unwrap().is_empty());
    }

    #[test]
    fn test_restart_rewinds_script() {
        let mut source = ScriptedAudioSource::new(16000, &[FramePhase::Speech { ms: 10 }]);
        source.start().unwrap();
        assert_eq!(source.read_samples().unwrap().len(), 160);
        source.stop().unwrap();
        source.start().unwrap();
        assert_eq!(source.read_samples().unwrap().len(), 160);
    }

    #[test]
    fn test_live_source_pads_with_silence() {
        let mut source = ScriptedAudioSource::new(16000, &[]).live();
        assert!(!source.is_finite());
        source.start().unwrap();
        assert_eq!(source.read_samples().unwrap(), vec![0; 160]);
    }

    #[test]
    fn test_paced_source_delivers_in_real_time() {
        let mut source = ScriptedAudioSource::new(16000, &[FramePhase::Speech { ms: 1000 }])
            .paced()
            .with_chunk_size(100_000);
        assert!(!source.is_finite());
        source.start().unwrap();
        let started = Instant::now();
        std::thread::sleep(std::time::Duration::from_millis(50));

        let heard = source.read_samples().unwrap().len();
        let due = (started.elapsed().as_millis() as usize + 1) * 16;
        assert!(heard >= 800, "only {heard} samples after 50 ms");
        assert!(heard <= due, "{heard} samples is ahead of real time");
    }

    #[test]
    fn test_active_stream_stops_on_drop() {
        let mut source = ScriptedAudioSource::new(16000, &[FramePhase::Silence { ms: 10 }]);
        let monitor = source.monitor();
        {
            let mut stream = ActiveStream::open(&mut source).unwrap();
            assert_eq!(monitor.starts(), 1);
            assert!(!monitor.is_idle());
            stream.read_samples().unwrap();
        }
        assert_eq!(monitor.stops(), 1);
        assert!(monitor.is_idle());
    }

    #[test]
    fn test_active_stream_open_failure_does_not_stop() {
        let mut source = ScriptedAudioSource::new(16000, &[]).with_start_failure();
        let monitor = source.monitor();
        assert!(ActiveStream::open(&mut source).is_err());
        assert_eq!(monitor.stops(), 0);
    }

    #[test]
    fn test_read_failure() {
        let mut source = ScriptedAudioSource::new(16000, &[]).with_read_failure();
        match source.read_samples() {
            Err(VivaError::AudioCapture { message }) => assert!(message.contains("scripted")),
            other => panic!("Expected AudioCapture error, got {other:?}"),
        }
    }
}
