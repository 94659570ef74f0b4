//! whisper.cpp model catalog and the languages whisper understands.

use crate::defaults::{ENGLISH_LANGUAGE, ENGLISH_ONLY_MARKER};

/// Where the ggml model files are published.
pub const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Metadata for a whisper.cpp model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    /// Model identifier (e.g., "tiny.en", "base-q5_1", "large-v3")
    pub name: &'static str,
    /// Approximate file size in megabytes
    pub size_mb: u32,
}

impl ModelInfo {
    /// Whether this model only transcribes English.
    pub fn english_only(&self) -> bool {
        is_english_only(self.name)
    }

    /// Download URL of the ggml file.
    pub fn url(&self) -> String {
        format!("{}/ggml-{}.bin", MODEL_BASE_URL, self.name)
    }
}

/// Every model the server can run.
///
/// `.en` models are English-only; `-q5_*` models are quantized.
pub const MODELS: &[ModelInfo] = &[
    ModelInfo { name: "tiny", size_mb: 75 },
    ModelInfo { name: "tiny.en", size_mb: 75 },
    ModelInfo { name: "tiny-q5_1", size_mb: 31 },
    ModelInfo { name: "tiny.en-q5_1", size_mb: 31 },
    ModelInfo { name: "base", size_mb: 142 },
    ModelInfo { name: "base.en", size_mb: 142 },
    ModelInfo { name: "base-q5_1", size_mb: 57 },
    ModelInfo { name: "base.en-q5_1", size_mb: 57 },
    ModelInfo { name: "small", size_mb: 466 },
    ModelInfo { name: "small.en", size_mb: 466 },
    ModelInfo { name: "small-q5_1", size_mb: 181 },
    ModelInfo { name: "small.en-q5_1", size_mb: 181 },
    ModelInfo { name: "medium", size_mb: 1533 },
    ModelInfo { name: "medium.en", size_mb: 1533 },
    ModelInfo { name: "medium-q5_0", size_mb: 514 },
    ModelInfo { name: "medium.en-q5_0", size_mb: 514 },
    ModelInfo { name: "large-v1", size_mb: 2950 },
    ModelInfo { name: "large-v2", size_mb: 2950 },
    ModelInfo { name: "large-v2-q5_0", size_mb: 1030 },
    ModelInfo { name: "large-v3", size_mb: 2950 },
    ModelInfo { name: "large-v3-q5_0", size_mb: 1030 },
];

/// Language codes whisper can transcribe, in whisper's own order.
pub const WHISPER_LANGUAGES: &[&str] = &[
    "en", "zh", "de", "es", "ru", "ko", "fr", "ja", "pt", "tr", "pl", "ca", "nl", "ar", "sv",
    "it", "id", "hi", "fi", "vi", "he", "uk", "el", "ms", "cs", "ro", "da", "hu", "ta", "no",
    "th", "ur", "hr", "bg", "lt", "la", "mi", "ml", "cy", "sk", "te", "fa", "lv", "bn", "sr",
    "az", "sl", "kn", "et", "mk", "br", "eu", "is", "hy", "ne", "mn", "bs", "kk", "sq", "sw",
    "gl", "mr", "pa", "si", "km", "sn", "yo", "so", "af", "oc", "ka", "be", "tg", "sd", "gu",
    "am", "yi", "lo", "uz", "fo", "ht", "ps", "tk", "nn", "mt", "sa", "lb", "my", "bo", "tl",
    "mg", "as", "tt", "haw", "ln", "ha", "ba", "jw", "su",
];

/// Find a model by name.
pub fn get_model(name: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.name == name)
}

pub fn list_models() -> &'static [ModelInfo] {
    MODELS
}

/// Names of all supported models, for CLI validation and help.
pub fn model_names() -> Vec<&'static str> {
    MODELS.iter().map(|m| m.name).collect()
}

/// English-only models carry `.en` in their name.
pub fn is_english_only(name: &str) -> bool {
    name.contains(ENGLISH_ONLY_MARKER)
}

/// Whether `code` is a whisper language code.
pub fn is_whisper_language(code: &str) -> bool {
    WHISPER_LANGUAGES.contains(&code)
}

/// Languages to advertise for a model.
pub fn model_languages(name: &str) -> Vec<String> {
    if is_english_only(name) {
        vec![ENGLISH_LANGUAGE.to_string()]
    } else {
        WHISPER_LANGUAGES.iter().map(|s| s.to_string()).collect()
    }
}
