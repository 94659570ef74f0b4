use crate::error::{Result, WhisperdError};
use std::sync::{Arc, Mutex, PoisonError};

/// Trait for speech-to-text transcription.
///
/// This trait allows swapping implementations (real whisper.cpp backend vs mock).
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one utterance.
    ///
    /// # Arguments
    /// * `wav` - A complete 16 kHz, 16-bit, mono RIFF/WAVE file
    /// * `language` - Language code, or "auto" to detect
    ///
    /// # Returns
    /// Cleaned transcript text (possibly empty) or error
    async fn transcribe(&self, wav: Vec<u8>, language: String) -> Result<String>;

    /// Get the name of the loaded model
    fn model_name(&self) -> &str;

    /// Check if the transcriber can still accept requests
    fn is_ready(&self) -> bool;
}

/// Implement Transcriber for Arc<T> to allow sharing across sessions.
#[async_trait::async_trait]
impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    async fn transcribe(&self, wav: Vec<u8>, language: String) -> Result<String> {
        (**self).transcribe(wav, language).await
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// One request seen by [`MockTranscriber`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRequest {
    pub wav: Vec<u8>,
    pub language: String,
}

/// Mock transcriber for testing
#[derive(Debug, Clone)]
pub struct MockTranscriber {
    model_name: String,
    response: String,
    should_fail: bool,
    requests: Arc<Mutex<Vec<MockRequest>>>,
}

impl MockTranscriber {
    /// Create a new mock transcriber with default settings
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            response: "mock transcription".to_string(),
            should_fail: false,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure the mock to return a specific response
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the mock to fail on transcribe
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Every request received so far, oldest first. Clones share the log.
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait::async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, wav: Vec<u8>, language: String) -> Result<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockRequest { wav, language });

        if self.should_fail {
            Err(WhisperdError::BackendUnavailable {
                message: "mock transcription failure".to_string(),
            })
        } else {
            Ok(self.response.clone())
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        !self.should_fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transcriber_returns_response() {
        let transcriber = MockTranscriber::new("test-model").with_response("Hello, this is a test");

        let result = transcriber.transcribe(vec![0u8; 44], "en".to_string()).await;

        assert_eq!(result.unwrap(), "Hello, this is a test");
    }

    #[tokio::test]
    async fn test_mock_transcriber_returns_error_when_configured() {
        let transcriber = MockTranscriber::new("test-model").with_failure();

        let result = transcriber.transcribe(Vec::new(), "auto".to_string()).await;

        match result {
            Err(WhisperdError::BackendUnavailable { message }) => {
                assert_eq!(message, "mock transcription failure");
            }
            other => panic!("Expected BackendUnavailable error, got {other:?}"),
        }
    }

    #[test]
    fn test_mock_transcriber_model_name() {
        let transcriber = MockTranscriber::new("tiny-q5_1");
        assert_eq!(transcriber.model_name(), "tiny-q5_1");
    }

    #[test]
    fn test_mock_transcriber_is_ready() {
        assert!(MockTranscriber::new("test-model").is_ready());
        assert!(!MockTranscriber::new("test-model").with_failure().is_ready());
    }

    #[tokio::test]
    async fn test_mock_transcriber_records_requests() {
        let transcriber = MockTranscriber::new("test-model");
        let shared = transcriber.clone();

        transcriber
            .transcribe(vec![1, 2, 3], "de".to_string())
            .await
            .unwrap();
        transcriber
            .transcribe(vec![4], "auto".to_string())
            .await
            .unwrap();

        let requests = shared.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].wav, vec![1, 2, 3]);
        assert_eq!(requests[0].language, "de");
        assert_eq!(requests[1].language, "auto");
    }

    #[tokio::test]
    async fn test_transcriber_trait_is_object_safe() {
        let transcriber: Arc<dyn Transcriber> =
            Arc::new(MockTranscriber::new("test-model").with_response("boxed test"));

        assert_eq!(transcriber.model_name(), "test-model");
        assert!(transcriber.is_ready());

        let result = transcriber.transcribe(Vec::new(), "en".to_string()).await;
        assert_eq!(result.unwrap(), "boxed test");
    }
}
