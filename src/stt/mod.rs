//! Speech-to-text.

pub mod command;
pub mod transcriber;

pub use command::CommandTranscriber;
pub use transcriber::{MockTranscriber, Transcriber};
