//! Transcription through an external speech-to-text program.

use crate::audio::buffer::AudioBuffer;
use crate::audio::wav::write_wav;
use crate::command::CommandSpec;
use crate::error::{Result, VivaError};
use crate::stt::transcriber::Transcriber;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_INPUT: AtomicU64 = AtomicU64::new(0);

/// Runs a command such as `["whisper-cli", "-nt", "-f", "{input}"]`.
///
/// The answer is written to a temporary WAV file substituted for `{input}`;
/// the command's stdout, trimmed, is the transcript.
pub struct CommandTranscriber {
    spec: CommandSpec,
    scratch_dir: PathBuf,
}

/// Removes the scratch WAV when dropped.
struct ScratchFile(PathBuf);

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.0.display(), error = %e, "Failed to remove scratch audio");
        }
    }
}

impl CommandTranscriber {
    pub fn new(spec: CommandSpec) -> Result<Self> {
        if !spec.uses("input") {
            return Err(VivaError::ConfigInvalidValue {
                key: "commands.stt".to_string(),
                message: "command must reference {input}".to_string(),
            });
        }
        Ok(Self {
            spec,
            scratch_dir: std::env::temp_dir(),
        })
    }

    /// Directory for the temporary WAV files (defaults to the system temp dir).
    pub fn with_scratch_dir(mut self, dir: &Path) -> Self {
        self.scratch_dir = dir.to_path_buf();
        self
    }

    fn scratch_path(&self) -> PathBuf {
        let n = NEXT_INPUT.fetch_add(1, Ordering::Relaxed);
        self.scratch_dir
            .join(format!("viva-answer-{}-{n}.wav", std::process::id()))
    }
}

impl Transcriber for CommandTranscriber {
    fn transcribe(&self, audio: &AudioBuffer) -> Result<String> {
        let scratch = ScratchFile(self.scratch_path());
        write_wav(&scratch.0, audio)?;

        let input = scratch.0.to_string_lossy();
        let stdout = self
            .spec
            .check_output(self.spec.to_command(&[("input", &input)]).output())
            .map_err(|message| VivaError::Transcription { message })?;

        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    fn name(&self) -> &str {
        self.spec.program()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_input_placeholder() {
        let result = CommandTranscriber::new(CommandSpec::new("whisper-cli", &["-nt"]));
        assert!(matches!(result, Err(VivaError::ConfigInvalidValue { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_transcribes_from_stdout_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        // `sh -c 'test -s "$0" && echo ...' {input}` proves the WAV was written.
        let spec = CommandSpec::new(
            "sh",
            &[
                "-c",
                "test -s \"$0\" && echo '  a heap allocation  '",
                "{input}",
            ],
        );
        let transcriber = CommandTranscriber::new(spec)
            .unwrap()
            .with_scratch_dir(dir.path());

        let text = transcriber
            .transcribe(&AudioBuffer::new(vec![100; 1600], 16000))
            .unwrap();
        assert_eq!(text, "a heap allocation");
        assert_eq!(transcriber.name(), "sh");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_command_is_transcription_error() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("sh", &["-c", "exit 3", "{input}"]);
        let transcriber = CommandTranscriber::new(spec)
            .unwrap()
            .with_scratch_dir(dir.path());
        let err = transcriber
            .transcribe(&AudioBuffer::new(vec![0; 10], 16000))
            .unwrap_err();
        assert!(matches!(err, VivaError::Transcription { .. }));
    }
}
