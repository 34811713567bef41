//! Microphone input through cpal.

use crate::audio::recorder::AudioSource;
use crate::audio::wav::resample;
use crate::error::{Result, VivaError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample};
use std::sync::{Arc, Mutex};

/// Redirects fd 2 to /dev/null until dropped.
///
/// cpal's backend probing makes ALSA and JACK print to stderr, which would
/// land in the middle of the interview transcript on the terminal.
struct QuietStderr {
    saved: libc::c_int,
}

impl QuietStderr {
    fn new() -> Self {
        // SAFETY: plain fd juggling on fd 2; nothing else in viva touches it.
        unsafe {
            let saved = libc::dup(2);
            let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
            if saved >= 0 && devnull >= 0 {
                libc::dup2(devnull, 2);
            }
            if devnull >= 0 {
                libc::close(devnull);
            }
            Self { saved }
        }
    }
}

impl Drop for QuietStderr {
    fn drop(&mut self) {
        if self.saved >= 0 {
            // SAFETY: `saved` is the fd duplicated in `new`.
            unsafe {
                libc::dup2(self.saved, 2);
                libc::close(self.saved);
            }
        }
    }
}

/// How an input device name looks to the interview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceClass {
    /// Desktop sound servers that route to whatever mic the user picked.
    SoundServer,
    Hardware,
    /// Output-only or multichannel ALSA aliases.
    NotAMicrophone,
}

fn classify(name: &str) -> DeviceClass {
    const SERVERS: [&str; 2] = ["pipewire", "pulse"];
    const NOT_INPUTS: [&str; 8] = [
        "surround",
        "front:",
        "rear:",
        "center:",
        "side:",
        "digital output",
        "hdmi",
        "s/pdif",
    ];
    let lower = name.to_lowercase();
    if NOT_INPUTS.iter().any(|p| lower.contains(p)) {
        DeviceClass::NotAMicrophone
    } else if SERVERS.iter().any(|p| lower.contains(p)) {
        DeviceClass::SoundServer
    } else {
        DeviceClass::Hardware
    }
}

/// Input devices usable for answers. Sound servers are tagged "\[recommended\]".
pub fn list_devices() -> Result<Vec<String>> {
    let devices = {
        let _quiet = QuietStderr::new();
        cpal::default_host().input_devices()
    }
    .map_err(|e| VivaError::AudioCapture {
        message: format!("Failed to enumerate input devices: {e}"),
    })?;

    let mut names = Vec::new();
    for name in devices.filter_map(|device| device.name().ok()) {
        match classify(&name) {
            DeviceClass::NotAMicrophone => {}
            DeviceClass::SoundServer => names.push(format!("{name} [recommended]")),
            DeviceClass::Hardware => names.push(name),
        }
    }
    Ok(names)
}

/// Named device, else the first sound server, else the host default.
fn open_device(device_name: Option<&str>) -> Result<cpal::Device> {
    let _quiet = QuietStderr::new();
    let host = cpal::default_host();
    let mut devices = host.input_devices().map_err(|e| VivaError::AudioCapture {
        message: format!("Failed to enumerate input devices: {e}"),
    })?;

    let found = match device_name {
        Some(wanted) => devices.find(|d| d.name().is_ok_and(|n| n == wanted)),
        None => devices
            .find(is_sound_server)
            .or_else(|| host.default_input_device()),
    };
    found.ok_or_else(|| VivaError::AudioDeviceNotFound {
        device: device_name.unwrap_or("default input").to_string(),
    })
}

fn is_sound_server(device: &cpal::Device) -> bool {
    let class = device.name().map(|name| classify(&name));
    class.is_ok_and(|class| class == DeviceClass::SoundServer)
}

/// Native sample types the microphone may deliver.
trait NativeSample: SizedSample + Send + 'static {
    fn to_pcm(self) -> i16;
}

impl NativeSample for i16 {
    fn to_pcm(self) -> i16 {
        self
    }
}

impl NativeSample for f32 {
    fn to_pcm(self) -> i16 {
        (self.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
    }
}

/// Averages interleaved frames down to one channel.
fn downmix(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().copied().map(i32::from).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Format of the open stream and the rate answers are delivered at.
#[derive(Debug, Clone, Copy)]
struct Conversion {
    channels: usize,
    native_rate: u32,
    target_rate: u32,
}

impl Conversion {
    fn apply<T: NativeSample>(&self, data: &[T]) -> Vec<i16> {
        let pcm: Vec<i16> = data.iter().map(|&s| s.to_pcm()).collect();
        let mono = downmix(&pcm, self.channels);
        resample(&mono, self.native_rate, self.target_rate)
    }
}

/// cpal streams are not `Send`; this one is only touched under the
/// `CpalAudioSource` mutex.
struct LiveStream(cpal::Stream);

// SAFETY: see `LiveStream`.
unsafe impl Send for LiveStream {}

/// Live microphone.
///
/// The stream exists only between `start` and `stop`, so the device is
/// closed whenever the candidate is not answering.
pub struct CpalAudioSource {
    device: cpal::Device,
    stream: Mutex<Option<LiveStream>>,
    captured: Arc<Mutex<Vec<i16>>>,
    sample_rate: u32,
}

impl CpalAudioSource {
    pub fn new(device_name: Option<&str>, sample_rate: u32) -> Result<Self> {
        let device = open_device(device_name)?;
        if let Ok(name) = device.name() {
            tracing::info!(device = %name, sample_rate, "Microphone selected");
        }
        Ok(Self {
            device,
            stream: Mutex::new(None),
            captured: Arc::new(Mutex::new(Vec::new())),
            sample_rate,
        })
    }

    fn open_stream(&self) -> Result<cpal::Stream> {
        let supported = self
            .device
            .default_input_config()
            .map_err(|e| VivaError::AudioCapture {
                message: format!("Failed to query default input config: {e}"),
            })?;
        let config = supported.config();
        let conversion = Conversion {
            channels: usize::from(config.channels),
            native_rate: config.sample_rate,
            target_rate: self.sample_rate,
        };
        tracing::debug!(
            ?conversion,
            format = ?supported.sample_format(),
            "Opening microphone stream"
        );

        match supported.sample_format() {
            SampleFormat::I16 => self.build::<i16>(&config, conversion),
            SampleFormat::F32 => self.build::<f32>(&config, conversion),
            other => Err(VivaError::AudioCapture {
                message: format!("Unsupported sample format {other:?}; pick another --device"),
            }),
        }
    }

    fn build<T: NativeSample>(
        &self,
        config: &cpal::StreamConfig,
        conversion: Conversion,
    ) -> Result<cpal::Stream> {
        let captured = Arc::clone(&self.captured);
        self.device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    let pcm = conversion.apply(data);
                    if let Ok(mut captured) = captured.lock() {
                        captured.extend_from_slice(&pcm);
                    }
                },
                |err| tracing::error!(error = %err, "Microphone stream error"),
                None,
            )
            .map_err(|e| VivaError::AudioCapture {
                message: format!("Failed to open microphone stream: {e}"),
            })
    }

    fn lock_stream(&self) -> Result<std::sync::MutexGuard<'_, Option<LiveStream>>> {
        self.stream.lock().map_err(|e| VivaError::AudioCapture {
            message: format!("Microphone state poisoned: {e}"),
        })
    }
}

impl AudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<()> {
        let mut stream = self.lock_stream()?;
        if stream.is_some() {
            return Ok(());
        }
        // Anything heard before the turn opened is not part of the answer.
        if let Ok(mut captured) = self.captured.lock() {
            captured.clear();
        }
        let live = self.open_stream()?;
        live.play().map_err(|e| VivaError::AudioCapture {
            message: format!("Failed to start microphone: {e}"),
        })?;
        *stream = Some(LiveStream(live));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        // Dropping the stream closes the device.
        let closed = self.lock_stream()?.take();
        if let Some(LiveStream(stream)) = closed {
            stream.pause().map_err(|e| VivaError::AudioCapture {
                message: format!("Failed to stop microphone: {e}"),
            })?;
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        let mut captured = self.captured.lock().map_err(|e| VivaError::AudioCapture {
            message: format!("Microphone buffer poisoned: {e}"),
        })?;
        Ok(std::mem::take(&mut *captured))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_devices() {
        assert_eq!(classify("surround51"), DeviceClass::NotAMicrophone);
        assert_eq!(classify("front:CARD=PCH"), DeviceClass::NotAMicrophone);
        assert_eq!(classify("HDMI Output"), DeviceClass::NotAMicrophone);
        assert_eq!(classify("PipeWire"), DeviceClass::SoundServer);
        assert_eq!(classify("pulse"), DeviceClass::SoundServer);
        assert_eq!(classify("hw:0,0"), DeviceClass::Hardware);
    }

    #[test]
    fn test_downmix_averages_channels() {
        assert_eq!(downmix(&[100, 300, -200, 200], 2), [200, 0]);
        assert_eq!(downmix(&[5, 6], 1), [5, 6]);
    }

    #[test]
    fn test_conversion_resamples_float_input() {
        let conversion = Conversion {
            channels: 1,
            native_rate: 48000,
            target_rate: 16000,
        };
        let pcm = conversion.apply(&vec![0.5f32; 4800]);
        assert_eq!(pcm.len(), 1600);
        assert!(pcm.iter().all(|&s| s == i16::MAX / 2));
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_list_devices_finds_a_microphone() {
        assert!(!list_devices().unwrap().is_empty());
    }
}
