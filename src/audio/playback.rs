//! Audio output.

use crate::audio::buffer::AudioBuffer;
use crate::error::Result;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Plays audio buffers. `play` starts output and returns immediately.
pub trait Playback: Send + Sync {
    fn play(&self, audio: &AudioBuffer) -> Result<()>;

    /// Stops whatever is playing. A no-op when idle.
    fn stop(&self) -> Result<()>;
}

impl<T: Playback + ?Sized> Playback for std::sync::Arc<T> {
    fn play(&self, audio: &AudioBuffer) -> Result<()> {
        (**self).play(audio)
    }

    fn stop(&self) -> Result<()> {
        (**self).stop()
    }
}

/// Scoped playback: stopped on drop unless already finished.
pub struct PlaybackGuard<'a> {
    playback: &'a dyn Playback,
    finished: bool,
}

impl<'a> PlaybackGuard<'a> {
    pub fn start(playback: &'a dyn Playback, audio: &AudioBuffer) -> Result<Self> {
        playback.play(audio)?;
        Ok(Self {
            playback,
            finished: false,
        })
    }

    /// Stops playback and reports the stop result.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.playback.stop()
    }
}

impl Drop for PlaybackGuard<'_> {
    fn drop(&mut self) {
        if !self.finished
            && let Err(e) = self.playback.stop()
        {
            tracing::warn!(error = %e, "Failed to stop playback");
        }
    }
}

/// Discards audio. Used when the build has no output backend; the agent
/// still waits out each question's duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPlayback;

impl Playback for NullPlayback {
    fn play(&self, audio: &AudioBuffer) -> Result<()> {
        tracing::debug!(duration = ?audio.duration(), "No audio output, discarding question audio");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// Mock playback that records what it was asked to play.
#[derive(Debug, Default)]
pub struct MockPlayback {
    plays: AtomicUsize,
    stops: AtomicUsize,
    played_micros: AtomicU64,
    playing: AtomicBool,
    fail: bool,
    last: Mutex<Option<AudioBuffer>>,
}

impl MockPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Sum of the durations of every buffer played.
    pub fn played(&self) -> Duration {
        Duration::from_micros(self.played_micros.load(Ordering::SeqCst))
    }

    pub fn last_played(&self) -> Option<AudioBuffer> {
        self.last.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Playback for MockPlayback {
    fn play(&self, audio: &AudioBuffer) -> Result<()> {
        if self.fail {
            return Err(crate::error::VivaError::AudioPlayback {
                message: "mock playback failure".to_string(),
            });
        }
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.played_micros
            .fetch_add(audio.duration().as_micros() as u64, Ordering::SeqCst);
        self.playing.store(true, Ordering::SeqCst);
        if let Ok(mut last) = self.last.lock() {
            *last = Some(audio.clone());
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(feature = "cpal-audio")]
pub use cpal_output::CpalPlayback;

#[cfg(feature = "cpal-audio")]
mod cpal_output {
    use super::Playback;
    use crate::audio::buffer::AudioBuffer;
    use crate::error::{Result, VivaError};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Wrapper for cpal::Stream to make it Send.
    ///
    /// SAFETY: the stream is only touched while holding the `CpalPlayback`
    /// mutex, so it is never used from two threads at once.
    struct SendableStream(#[allow(dead_code)] cpal::Stream);

    unsafe impl Send for SendableStream {}

    /// Speaker output through the default (or named) output device.
    pub struct CpalPlayback {
        device: cpal::Device,
        stream: Mutex<Option<SendableStream>>,
    }

    impl CpalPlayback {
        pub fn new(device_name: Option<&str>) -> Result<Self> {
            let host = cpal::default_host();
            let device = match device_name {
                Some(name) => host
                    .output_devices()
                    .map_err(|e| VivaError::AudioPlayback {
                        message: format!("Failed to enumerate output devices: {e}"),
                    })?
                    .find(|d| d.name().is_ok_and(|n| n == name))
                    .ok_or_else(|| VivaError::AudioDeviceNotFound {
                        device: name.to_string(),
                    })?,
                None => host
                    .default_output_device()
                    .ok_or_else(|| VivaError::AudioDeviceNotFound {
                        device: "default output".to_string(),
                    })?,
            };
            Ok(Self {
                device,
                stream: Mutex::new(None),
            })
        }
    }

    impl Playback for CpalPlayback {
        fn play(&self, audio: &AudioBuffer) -> Result<()> {
            let supported =
                self.device
                    .default_output_config()
                    .map_err(|e| VivaError::AudioPlayback {
                        message: format!("Failed to query default output config: {e}"),
                    })?;
            let config = supported.config();
            let channels = usize::from(config.channels);
            let device_rate: u32 = config.sample_rate;

            let queue: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(
                audio
                    .resampled(device_rate)
                    .samples
                    .iter()
                    .map(|&s| f32::from(s) / f32::from(i16::MAX))
                    .collect(),
            ));

            let stream = self
                .device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let Ok(mut queue) = queue.lock() else {
                            data.fill(0.0);
                            return;
                        };
                        for frame in data.chunks_mut(channels.max(1)) {
                            let sample = queue.pop_front().unwrap_or(0.0);
                            frame.fill(sample);
                        }
                    },
                    |err| tracing::error!(error = %err, "Audio output stream error"),
                    None,
                )
                .map_err(|e| VivaError::AudioPlayback {
                    message: format!("Failed to build output stream: {e}"),
                })?;
            stream.play().map_err(|e| VivaError::AudioPlayback {
                message: format!("Failed to start output stream: {e}"),
            })?;

            let mut guard = self.stream.lock().map_err(|e| VivaError::AudioPlayback {
                message: format!("Failed to lock output stream: {e}"),
            })?;
            *guard = Some(SendableStream(stream));
            Ok(())
        }

        fn stop(&self) -> Result<()> {
            let mut guard = self.stream.lock().map_err(|e| VivaError::AudioPlayback {
                message: format!("Failed to lock output stream: {e}"),
            })?;
            // Dropping the stream closes the device.
            guard.take();
            Ok(())
        }
    }
}
