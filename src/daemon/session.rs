//! Per-connection session: accumulates audio and drives the backend.

use crate::audio::{AudioFormat, encode_wav, normalize_chunk};
use crate::defaults::MAX_UTTERANCE_BYTES;
use crate::error::{Result, WhisperdError};
use crate::stt::transcriber::Transcriber;
use crate::wyoming::event::Event;
use crate::wyoming::info::Info;
use crate::wyoming::messages::{AudioChunk, Message, Transcript};
use crate::wyoming::server::EventHandler;
use std::sync::Arc;

/// Where a session is in the utterance lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Receiving audio; `format` is the one announced by `audio-start`, if any
    Streaming { format: Option<AudioFormat> },
    /// Waiting for the backend's transcript
    Finalizing,
}

/// State for one client connection.
pub struct Session {
    transcriber: Arc<dyn Transcriber>,
    info: Arc<Info>,
    default_language: String,
    language: String,
    /// Normalized 16 kHz, 16-bit, mono PCM
    audio: Vec<u8>,
    max_audio_bytes: usize,
    state: SessionState,
}

impl Session {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        info: Arc<Info>,
        default_language: impl Into<String>,
    ) -> Self {
        let default_language = default_language.into();
        Self {
            transcriber,
            info,
            language: default_language.clone(),
            default_language,
            audio: Vec::new(),
            max_audio_bytes: MAX_UTTERANCE_BYTES,
            state: SessionState::Idle,
        }
    }

    /// Cap on buffered normalized audio per utterance.
    pub fn with_max_utterance_bytes(mut self, max_bytes: usize) -> Self {
        self.max_audio_bytes = max_bytes;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Language the next utterance will be transcribed in.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Bytes of normalized audio buffered for the current utterance.
    pub fn buffered_bytes(&self) -> usize {
        self.audio.len()
    }

    fn start_stream(&mut self, format: AudioFormat) -> Result<()> {
        format.validate()?;
        if self.state == SessionState::Idle {
            tracing::debug!(%format, "Audio started");
        }
        self.state = SessionState::Streaming {
            format: Some(format),
        };
        Ok(())
    }

    fn add_chunk(&mut self, chunk: AudioChunk) -> Result<()> {
        let announced = match self.state {
            SessionState::Streaming { format } => format,
            _ => None,
        };
        let format = chunk
            .format
            .or(announced)
            .ok_or_else(|| WhisperdError::AudioFormat {
                message: "audio-chunk has no format and no audio-start preceded it".to_string(),
            })?;

        // Checked before normalizing, which may upsample
        format.validate()?;
        let buffered = self
            .audio
            .len()
            .saturating_add(format.normalized_len(chunk.audio.len()));
        if buffered > self.max_audio_bytes {
            tracing::warn!(
                buffered = self.audio.len(),
                limit = self.max_audio_bytes,
                "Rejecting chunk past utterance limit"
            );
            return Err(WhisperdError::AudioFormat {
                message: format!(
                    "utterance exceeds {} bytes of 16 kHz audio",
                    self.max_audio_bytes
                ),
            });
        }

        let pcm = normalize_chunk(format, &chunk.audio)?;

        if self.state == SessionState::Idle {
            tracing::debug!("Receiving audio");
            self.state = SessionState::Streaming {
                format: Some(format),
            };
        }
        self.audio.extend_from_slice(&pcm);
        Ok(())
    }

    async fn finish_utterance(&mut self) -> Result<Vec<Event>> {
        tracing::debug!(bytes = self.audio.len(), "Audio stopped");

        let language = std::mem::replace(&mut self.language, self.default_language.clone());
        let audio = std::mem::take(&mut self.audio);
        self.state = SessionState::Finalizing;

        let result = match encode_wav(&audio) {
            Ok(wav) => self.transcriber.transcribe(wav, language).await,
            Err(e) => Err(e),
        };
        self.state = SessionState::Idle;

        let text = result?;
        tracing::info!(%text, "Transcript");
        Ok(vec![Message::Transcript(Transcript { text }).into_event()?])
    }
}

#[async_trait::async_trait]
impl EventHandler for Session {
    async fn handle_event(&mut self, event: Event) -> Result<Vec<Event>> {
        match Message::from_event(event)? {
            Message::Describe => {
                tracing::debug!("Sent info");
                Ok(vec![Message::Info(self.info.as_ref().clone()).into_event()?])
            }
            Message::Transcribe(transcribe) => {
                if let Some(language) = transcribe.language.filter(|l| !l.is_empty()) {
                    tracing::debug!(%language, "Language set");
                    self.language = language;
                }
                Ok(Vec::new())
            }
            Message::AudioStart(start) => {
                self.start_stream(start.format())?;
                Ok(Vec::new())
            }
            Message::AudioChunk(chunk) => {
                self.add_chunk(chunk)?;
                Ok(Vec::new())
            }
            Message::AudioStop => self.finish_utterance().await,
            Message::Unknown(event_type) => {
                tracing::debug!(%event_type, "Ignoring unknown event");
                Ok(Vec::new())
            }
            other => {
                tracing::debug!(?other, "Ignoring unexpected event");
                Ok(Vec::new())
            }
        }
    }
}
