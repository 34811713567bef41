//! WAV decoding and encoding, plus a file-backed audio source.

use crate::audio::buffer::AudioBuffer;
use crate::audio::recorder::AudioSource;
use crate::error::{Result, VivaError};
use std::io::{Cursor, Read, Seek};
use std::path::Path;

/// Decodes 16-bit integer WAV data into a mono buffer at its native rate.
///
/// Multi-channel input is downmixed by averaging.
pub fn read_wav<R: Read>(reader: R) -> Result<AudioBuffer> {
    let mut wav_reader = hound::WavReader::new(reader).map_err(|e| VivaError::Wav {
        message: format!("Failed to parse WAV data: {e}"),
    })?;

    let spec = wav_reader.spec();
    if spec.channels == 0 {
        return Err(VivaError::Wav {
            message: "WAV header declares zero channels".to_string(),
        });
    }

    let raw_samples: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int => wav_reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>(),
        hound::SampleFormat::Float => wav_reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16))
            .collect::<std::result::Result<Vec<_>, _>>(),
    }
    .map_err(|e| VivaError::Wav {
        message: format!("Failed to read WAV samples: {e}"),
    })?;

    let channels = usize::from(spec.channels);
    let samples = if channels == 1 {
        raw_samples
    } else {
        raw_samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };

    Ok(AudioBuffer::new(samples, spec.sample_rate))
}

/// Reads a WAV file from disk.
pub fn read_wav_file(path: &Path) -> Result<AudioBuffer> {
    let file = std::fs::File::open(path).map_err(|e| VivaError::Wav {
        message: format!("Failed to open {}: {e}", path.display()),
    })?;
    read_wav(std::io::BufReader::new(file))
}

/// Encodes a buffer as mono 16-bit WAV bytes.
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    write_wav_to(&mut cursor, buffer)?;
    Ok(cursor.into_inner())
}

/// Writes a buffer as a mono 16-bit WAV file.
pub fn write_wav(path: &Path, buffer: &AudioBuffer) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| VivaError::Wav {
        message: format!("Failed to create {}: {e}", path.display()),
    })?;
    write_wav_to(&mut std::io::BufWriter::new(file), buffer)
}

fn write_wav_to<W: std::io::Write + Seek>(writer: &mut W, buffer: &AudioBuffer) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let wav_error = |e: hound::Error| VivaError::Wav {
        message: format!("Failed to write WAV data: {e}"),
    };
    let mut wav_writer = hound::WavWriter::new(writer, spec).map_err(wav_error)?;
    for &sample in &buffer.samples {
        wav_writer.write_sample(sample).map_err(wav_error)?;
    }
    wav_writer.finalize().map_err(wav_error)
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            match (samples.get(source_idx), samples.get(source_idx + 1)) {
                (Some(&left), Some(&right)) => {
                    let left = f64::from(left);
                    (left + (f64::from(right) - left) * fraction) as i16
                }
                (Some(&last), None) => last,
                _ => samples.last().copied().unwrap_or_default(),
            }
        })
        .collect()
}

/// Finite audio source that replays a recording in 100 ms chunks.
///
/// Starting and stopping do not rewind, so consecutive captures consume
/// consecutive stretches of the recording.
pub struct WavAudioSource {
    samples: Vec<i16>,
    position: usize,
    chunk_size: usize,
}

impl WavAudioSource {
    /// Decodes `reader` and converts it to `sample_rate`.
    pub fn from_reader<R: Read>(reader: R, sample_rate: u32) -> Result<Self> {
        let buffer = read_wav(reader)?.resampled(sample_rate);
        Ok(Self {
            samples: buffer.samples,
            position: 0,
            chunk_size: (sample_rate as usize / 10).max(1),
        })
    }

    pub fn open(path: &Path, sample_rate: u32) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| VivaError::Wav {
            message: format!("Failed to open {}: {e}", path.display()),
        })?;
        Self::from_reader(std::io::BufReader::new(file), sample_rate)
    }

    /// Samples not yet read.
    pub fn remaining(&self) -> usize {
        self.samples.len().saturating_sub(self.position)
    }
}

impl AudioSource for WavAudioSource {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        let end = (self.position + self.chunk_size).min(self.samples.len());
        let chunk = self
            .samples
            .get(self.position..end)
            .map(<[i16]>::to_vec)
            .unwrap_or_default();
        self.position = end.max(self.position);
        Ok(chunk)
    }

    fn is_finite(&self) -> bool {
        true
    }
}
