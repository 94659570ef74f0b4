//! Speech-to-text: the transcriber seam and the whisper.cpp process backend.

pub mod backend;
pub mod transcriber;

pub use backend::{WhisperCppBackend, WhisperCppConfig};
pub use transcriber::{MockTranscriber, Transcriber};
