//! Service descriptor advertised in reply to `describe`.

use crate::defaults::{
    MODEL_ATTRIBUTION_NAME, MODEL_ATTRIBUTION_URL, MODEL_VERSION, PROGRAM_ATTRIBUTION_NAME,
    PROGRAM_ATTRIBUTION_URL, PROGRAM_DESCRIPTION, PROGRAM_NAME,
};
use crate::models::catalog::model_languages;
use crate::wyoming::info::{AsrModel, AsrProgram, Attribution, Info};

/// Build the descriptor for a server running `model_name`.
///
/// English-only models advertise `["en"]`; all others advertise every
/// whisper language.
pub fn build_info(model_name: &str) -> Info {
    let model = AsrModel {
        name: model_name.to_string(),
        attribution: Attribution {
            name: MODEL_ATTRIBUTION_NAME.to_string(),
            url: MODEL_ATTRIBUTION_URL.to_string(),
        },
        installed: true,
        description: Some(model_name.to_string()),
        version: Some(MODEL_VERSION.to_string()),
        languages: model_languages(model_name),
    };

    Info {
        asr: vec![AsrProgram {
            name: PROGRAM_NAME.to_string(),
            attribution: Attribution {
                name: PROGRAM_ATTRIBUTION_NAME.to_string(),
                url: PROGRAM_ATTRIBUTION_URL.to_string(),
            },
            installed: true,
            description: Some(PROGRAM_DESCRIPTION.to_string()),
            version: Some(crate::version_string()),
            models: vec![model],
        }],
        ..Info::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::WHISPER_LANGUAGES;

    #[test]
    fn test_lists_exactly_one_program_and_model() {
        let info = build_info("tiny-q5_1");
        assert_eq!(info.asr.len(), 1);
        assert_eq!(info.model_names().collect::<Vec<_>>(), vec!["tiny-q5_1"]);

        let program = &info.asr[0];
        assert_eq!(program.name, "whisper.cpp");
        assert_eq!(program.attribution.name, "Georgi Gerganov");
        assert!(program.installed);
        assert_eq!(program.version.as_deref(), Some(crate::version_string().as_str()));

        let model = &program.models[0];
        assert_eq!(model.attribution.name, "rhasspy");
        assert_eq!(model.description.as_deref(), Some("tiny-q5_1"));
        assert_eq!(model.version.as_deref(), Some("1.0"));
        assert!(model.installed);
    }

    #[test]
    fn test_english_only_model_lists_english() {
        let info = build_info("base.en");
        assert_eq!(info.asr[0].models[0].languages, vec!["en".to_string()]);
    }

    #[test]
    fn test_multilingual_model_lists_every_language() {
        let info = build_info("large-v3");
        let languages = &info.asr[0].models[0].languages;
        assert_eq!(languages.len(), WHISPER_LANGUAGES.len());
        assert!(languages.iter().zip(WHISPER_LANGUAGES).all(|(a, b)| a == b));
    }

    #[test]
    fn test_other_services_are_empty() {
        let info = build_info("tiny");
        assert!(info.tts.is_empty());
        assert!(info.handle.is_empty());
        assert!(info.intent.is_empty());
        assert!(info.wake.is_empty());
    }
}
