//! Service descriptor types returned for a `describe` request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who produced a program or model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub name: String,
    pub url: String,
}

/// One speech-recognition model offered by a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsrModel {
    pub name: String,
    pub attribution: Attribution,
    pub installed: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
}

/// A speech-recognition program and its models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsrProgram {
    pub name: String,
    pub attribution: Attribution,
    pub installed: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub models: Vec<AsrModel>,
}

/// Everything a server advertises about itself.
///
/// Only `asr` is populated by this server; the other service lists are kept
/// so descriptors from other Wyoming servers still parse.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub asr: Vec<AsrProgram>,
    #[serde(default)]
    pub tts: Vec<Value>,
    #[serde(default)]
    pub handle: Vec<Value>,
    #[serde(default)]
    pub intent: Vec<Value>,
    #[serde(default)]
    pub wake: Vec<Value>,
}

impl Info {
    /// Names of every installed ASR model.
    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.asr
            .iter()
            .flat_map(|program| program.models.iter())
            .map(|model| model.name.as_str())
    }
}
