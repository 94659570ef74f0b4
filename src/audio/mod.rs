//! Audio handling: chunk normalization and WAV containers.

pub mod format;
pub mod wav;

pub use format::{AudioFormat, normalize_chunk};
pub use wav::{WavAudio, encode_wav};
