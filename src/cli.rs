//! Command-line interface for whisperd
//!
//! Provides argument parsing using clap derive macros.

use crate::config::Config;
use crate::logging::LogFormat;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Wyoming speech-to-text server backed by whisper.cpp
#[derive(Parser, Debug)]
#[command(
    name = "whisperd",
    version = env!("WHISPERD_VERSION"),
    about = "Wyoming speech-to-text server backed by whisper.cpp"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Style of log lines written to stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Full)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve Wyoming clients (tcp://, unix:// or stdio://)
    Serve(ServeArgs),

    /// Send a WAV file to a running server and print the transcript
    Transcribe {
        /// Server address
        #[arg(long, value_name = "URI", default_value = "tcp://127.0.0.1:10300")]
        uri: String,

        /// Language code for this request (default: server's language)
        #[arg(long, value_name = "LANG")]
        language: Option<String>,

        /// WAV file to transcribe
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Manage whisper.cpp models
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Flags of `whisperd serve`. Unset flags leave the configuration alone.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Listen address (default: tcp://0.0.0.0:10300). Also unix:///path or stdio://
    #[arg(long, value_name = "URI")]
    pub uri: Option<String>,

    /// Model name (e.g., tiny-q5_1, base.en, large-v3)
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Directory containing the whisper.cpp `main` executable
    #[arg(long, value_name = "DIR")]
    pub whisper_cpp_dir: Option<PathBuf>,

    /// Directory to search for models (repeatable, replaces configured dirs)
    #[arg(long = "data-dir", value_name = "DIR")]
    pub data_dirs: Vec<PathBuf>,

    /// Directory models are downloaded into (default: first data dir)
    #[arg(long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,

    /// Default language code (auto, en, de, ...)
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Beam-search width
    #[arg(long, value_name = "N")]
    pub beam_size: Option<u32>,

    /// Base length of the audio context
    #[arg(long, value_name = "N")]
    pub audio_context_base: Option<u32>,

    /// Extra argument passed to whisper.cpp (repeatable)
    #[arg(long = "whisper-cpp-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub whisper_cpp_args: Vec<String>,

    /// Give up on a backend response after this long (e.g., 30s, 2m)
    #[arg(long, value_name = "DURATION", value_parser = parse_timeout)]
    pub response_timeout: Option<String>,

    /// Fail instead of downloading a missing model
    #[arg(long)]
    pub no_download: bool,
}

impl ServeArgs {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(uri) = &self.uri {
            config.server.uri = uri.clone();
        }
        if let Some(model) = &self.model {
            config.model.name = model.clone();
        }
        if !self.data_dirs.is_empty() {
            config.model.data_dirs = self.data_dirs.clone();
        }
        if let Some(dir) = &self.download_dir {
            config.model.download_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.whisper_cpp_dir {
            config.whisper.cpp_dir = Some(dir.clone());
        }
        if let Some(language) = &self.language {
            config.whisper.language = language.clone();
        }
        if let Some(beam_size) = self.beam_size {
            config.whisper.beam_size = beam_size;
        }
        if let Some(base) = self.audio_context_base {
            config.whisper.audio_context_base = base;
        }
        if !self.whisper_cpp_args.is_empty() {
            config.whisper.extra_args = self.whisper_cpp_args.clone();
        }
        if let Some(timeout) = &self.response_timeout {
            config.whisper.response_timeout = Some(timeout.clone());
        }
    }
}

/// Model management actions
#[derive(Subcommand, Debug)]
pub enum ModelsAction {
    /// List known models and where they are installed
    List,
    /// Download a model
    Download {
        /// Model name (e.g., tiny-q5_1, base.en)
        name: String,
        /// Destination directory (default: configured download dir)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
}

/// Check a duration string with `humantime` (`30s`, `2m`, `1m30s`).
fn parse_timeout(s: &str) -> Result<String, String> {
    let s = s.trim();
    let duration = humantime::parse_duration(s).map_err(|e| e.to_string())?;
    if duration.is_zero() {
        return Err("timeout must be greater than zero".to_string());
    }
    Ok(s.to_string())
}
