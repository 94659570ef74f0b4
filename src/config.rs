use crate::defaults;
use crate::error::WhisperdError;
use crate::models::catalog;
use crate::models::download::default_data_dir;
use crate::wyoming::server::ServerUri;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub whisper: WhisperConfig,
}

/// Wyoming listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// `tcp://host:port`, `unix://path` or `stdio://`
    pub uri: String,
}

/// Model selection and storage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    /// Searched in order for `ggml-<name>.bin`
    pub data_dirs: Vec<PathBuf>,
    /// Where missing models are downloaded (default: first data dir)
    pub download_dir: Option<PathBuf>,
}

/// whisper.cpp process settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WhisperConfig {
    /// Directory holding the whisper.cpp `main` executable
    pub cpp_dir: Option<PathBuf>,
    pub language: String,
    pub beam_size: u32,
    pub audio_context_base: u32,
    pub extra_args: Vec<String>,
    /// Human-friendly duration such as "30s"; unset means no limit
    pub response_timeout: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            uri: defaults::DEFAULT_URI.to_string(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: defaults::DEFAULT_MODEL.to_string(),
            data_dirs: vec![default_data_dir()],
            download_dir: None,
        }
    }
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            cpp_dir: None,
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            beam_size: defaults::BEAM_SIZE,
            audio_context_base: defaults::AUDIO_CONTEXT_BASE,
            extra_args: Vec::new(),
            response_timeout: None,
        }
    }
}

impl WhisperConfig {
    /// Parsed response timeout.
    pub fn response_timeout(&self) -> Result<Option<Duration>, WhisperdError> {
        let Some(raw) = &self.response_timeout else {
            return Ok(None);
        };
        let timeout =
            humantime::parse_duration(raw).map_err(|e| WhisperdError::ConfigInvalidValue {
                key: "whisper.response_timeout".to_string(),
                message: format!("'{}': {}", raw, e),
            })?;
        if timeout.is_zero() {
            return Err(WhisperdError::ConfigInvalidValue {
                key: "whisper.response_timeout".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(Some(timeout))
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - WHISPERD_URI → server.uri
    /// - WHISPERD_MODEL → model.name
    /// - WHISPERD_LANGUAGE → whisper.language
    /// - WHISPERD_WHISPER_CPP_DIR → whisper.cpp_dir
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(uri) = std::env::var("WHISPERD_URI")
            && !uri.is_empty()
        {
            self.server.uri = uri;
        }

        if let Ok(model) = std::env::var("WHISPERD_MODEL")
            && !model.is_empty()
        {
            self.model.name = model;
        }

        if let Ok(language) = std::env::var("WHISPERD_LANGUAGE")
            && !language.is_empty()
        {
            self.whisper.language = language;
        }

        if let Ok(dir) = std::env::var("WHISPERD_WHISPER_CPP_DIR")
            && !dir.is_empty()
        {
            self.whisper.cpp_dir = Some(PathBuf::from(dir));
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/whisperd/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("whisperd")
            .join("config.toml")
    }

    /// Check values that TOML alone cannot.
    pub fn validate(&self) -> Result<(), WhisperdError> {
        self.server.uri.parse::<ServerUri>()?;

        if catalog::get_model(&self.model.name).is_none() {
            return Err(WhisperdError::ConfigInvalidValue {
                key: "model.name".to_string(),
                message: format!(
                    "unknown model '{}' (expected one of: {})",
                    self.model.name,
                    catalog::model_names().join(", ")
                ),
            });
        }

        if self.model.data_dirs.is_empty() {
            return Err(WhisperdError::ConfigInvalidValue {
                key: "model.data_dirs".to_string(),
                message: "at least one data directory is required".to_string(),
            });
        }

        let language = self.whisper.language.as_str();
        if language != defaults::AUTO_LANGUAGE && !catalog::is_whisper_language(language) {
            return Err(WhisperdError::ConfigInvalidValue {
                key: "whisper.language".to_string(),
                message: format!("'{}' is not 'auto' or a whisper language code", language),
            });
        }

        if self.whisper.beam_size == 0 {
            return Err(WhisperdError::ConfigInvalidValue {
                key: "whisper.beam_size".to_string(),
                message: "must be positive".to_string(),
            });
        }

        self.whisper.response_timeout()?;
        Ok(())
    }
}
