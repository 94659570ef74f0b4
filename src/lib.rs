//! whisperd - Wyoming speech-to-text server backed by whisper.cpp
//!
//! Keeps one whisper.cpp process running and feeds it one utterance at a
//! time over its stdin/stdout framing.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod daemon;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod stt;
pub mod wyoming;

// Core trait (session -> backend)
pub use stt::transcriber::Transcriber;

// Error handling
pub use error::{Result, WhisperdError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.0.1+abc1234"` when git hash is available, `"0.0.1"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
