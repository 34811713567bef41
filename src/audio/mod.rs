//! Audio input, output and frame classification.

pub mod buffer;
#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod playback;
pub mod recorder;
pub mod vad;
pub mod wav;

pub use buffer::AudioBuffer;
pub use playback::{MockPlayback, NullPlayback, Playback, PlaybackGuard};
pub use recorder::{ActiveStream, AudioSource, FramePhase, ScriptedAudioSource, SourceMonitor};
pub use vad::{FrameClassifier, FrameKind, RmsClassifier};
pub use wav::WavAudioSource;
