//! Error types for whisperd.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WhisperdError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio errors
    #[error("Unsupported audio format: {message}")]
    AudioFormat { message: String },

    // Backend process errors
    #[error("Failed to start whisper.cpp backend: {message}")]
    BackendSpawn { message: String },

    #[error("Transcription backend unavailable: {message}")]
    BackendUnavailable { message: String },

    #[error("Transcription backend out of sync: {message}")]
    ProtocolDesync { message: String },

    // Model errors
    #[error("Model not found: {name}")]
    ModelNotFound { name: String },

    #[error("Model download failed: {message}")]
    ModelDownload { message: String },

    // Wyoming transport errors
    #[error("Event protocol error: {message}")]
    EventProtocol { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl WhisperdError {
    /// Stable machine-readable code, sent to clients in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigFileNotFound { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigInvalidValue { .. }
            | Self::Config(_) => "config",
            Self::AudioFormat { .. } => "audio_format",
            Self::BackendSpawn { .. } | Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::ProtocolDesync { .. } => "protocol_desync",
            Self::ModelNotFound { .. } | Self::ModelDownload { .. } => "model",
            Self::EventProtocol { .. } => "event_protocol",
            Self::Connection { .. } => "connection",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }

    /// True when the error means the backend process can no longer serve requests.
    pub fn is_backend_fatal(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable { .. } | Self::ProtocolDesync { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, WhisperdError>;
