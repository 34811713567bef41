//! Synthesis through an external text-to-speech program.

use crate::audio::buffer::AudioBuffer;
use crate::audio::wav::read_wav;
use crate::command::CommandSpec;
use crate::error::{Result, VivaError};
use crate::tts::synthesizer::Synthesizer;
use async_trait::async_trait;
use std::io::Cursor;
use tokio::io::AsyncWriteExt;

/// Runs a TTS command that writes WAV to stdout.
///
/// The question text is substituted for `{text}` when the command mentions
/// it, and written to stdin otherwise. The child is killed if the turn is
/// cancelled while it runs.
pub struct CommandSynthesizer {
    spec: CommandSpec,
}

impl CommandSynthesizer {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Synthesizer for CommandSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioBuffer> {
        let text_in_args = self.spec.uses("text");
        let mut command = self.spec.to_tokio_command(&[("text", text)]);
        let mut child = command.spawn().map_err(|e| VivaError::Synthesis {
            message: format!("Failed to start {}: {e}", self.spec.program()),
        })?;

        if let Some(mut stdin) = child.stdin.take()
            && !text_in_args
        {
            match stdin.write_all(text.as_bytes()).await {
                Ok(()) => {}
                // The program may not read stdin at all; its exit status decides.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => {
                    return Err(VivaError::Synthesis {
                        message: format!("Failed to write text to {}: {e}", self.spec.program()),
                    });
                }
            }
        }
        // Dropping stdin (in either branch) closes it.

        let stdout = self
            .spec
            .check_output(child.wait_with_output().await)
            .map_err(|message| VivaError::Synthesis { message })?;
        if stdout.is_empty() {
            return Err(VivaError::Synthesis {
                message: "no audio data received".to_string(),
            });
        }
        read_wav(Cursor::new(stdout)).map_err(|e| VivaError::Synthesis {
            message: e.to_string(),
        })
    }

    fn name(&self) -> &str {
        self.spec.program()
    }
}
