//! Pre-rendered question audio.

use crate::audio::buffer::AudioBuffer;
use crate::audio::wav::read_wav_file;
use crate::error::{Result, VivaError};
use crate::tts::synthesizer::Synthesizer;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Serves question audio from WAV files listed in the interview.
///
/// Questions without a file go to the fallback synthesizer, if any.
pub struct WavFileSynthesizer {
    files: HashMap<String, PathBuf>,
    fallback: Option<Arc<dyn Synthesizer>>,
}

impl WavFileSynthesizer {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            fallback: None,
        }
    }

    /// Registers `path` for the question text `prompt`. Relative paths resolve
    /// against `base_dir`.
    pub fn insert(&mut self, prompt: &str, path: &Path, base_dir: &Path) {
        let path = if path.is_relative() {
            base_dir.join(path)
        } else {
            path.to_path_buf()
        };
        self.files.insert(prompt.to_string(), path);
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn Synthesizer>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Default for WavFileSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Synthesizer for WavFileSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioBuffer> {
        if let Some(path) = self.files.get(text) {
            let path = path.clone();
            return tokio::task::spawn_blocking(move || read_wav_file(&path))
                .await
                .map_err(|e| VivaError::Synthesis {
                    message: format!("WAV loader task failed: {e}"),
                })?;
        }
        match &self.fallback {
            Some(fallback) => fallback.synthesize(text).await,
            None => Err(VivaError::Synthesis {
                message: format!("no audio file for question {text:?}"),
            }),
        }
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}
