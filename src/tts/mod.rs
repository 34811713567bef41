//! Text-to-speech for question prompts.

pub mod command;
pub mod synthesizer;
pub mod wav_file;

pub use command::CommandSynthesizer;
pub use synthesizer::{MockSynthesizer, Synthesizer};
pub use wav_file::WavFileSynthesizer;
