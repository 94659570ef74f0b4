//! Typed Wyoming messages used by the speech-to-text service.

use crate::audio::AudioFormat;
use crate::error::{Result, WhisperdError};
use crate::wyoming::event::Event;
use crate::wyoming::info::Info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DESCRIBE: &str = "describe";
pub const INFO: &str = "info";
pub const TRANSCRIBE: &str = "transcribe";
pub const AUDIO_START: &str = "audio-start";
pub const AUDIO_CHUNK: &str = "audio-chunk";
pub const AUDIO_STOP: &str = "audio-stop";
pub const TRANSCRIPT: &str = "transcript";
pub const ERROR: &str = "error";

/// Request to transcribe the next utterance, optionally with a language.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transcribe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Start of an audio stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioStart {
    pub rate: u32,
    pub width: u16,
    pub channels: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl AudioStart {
    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(self.rate, self.width, self.channels)
    }
}

/// A block of raw PCM audio.
///
/// `format` is `None` when the sender left the rate/width/channels out; the
/// receiver then falls back to the format announced by `audio-start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub format: Option<AudioFormat>,
    pub timestamp: Option<u64>,
    pub audio: Vec<u8>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AudioChunkData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    width: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channels: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<u64>,
}

/// Final recognized text of an utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
}

/// Error reported to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<&WhisperdError> for ErrorMessage {
    fn from(error: &WhisperdError) -> Self {
        Self {
            text: error.to_string(),
            code: Some(error.code().to_string()),
        }
    }
}

/// Every event type this service understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Describe,
    Info(Info),
    Transcribe(Transcribe),
    AudioStart(AudioStart),
    AudioChunk(AudioChunk),
    AudioStop,
    Transcript(Transcript),
    Error(ErrorMessage),
    /// Any other event type; carried so handlers can ignore it.
    Unknown(String),
}

impl Message {
    /// Interpret an untyped event.
    pub fn from_event(event: Event) -> Result<Self> {
        let message = match event.event_type.as_str() {
            DESCRIBE => Self::Describe,
            INFO => Self::Info(from_data(event.data, INFO)?),
            TRANSCRIBE => Self::Transcribe(from_data(event.data, TRANSCRIBE)?),
            AUDIO_START => Self::AudioStart(from_data(event.data, AUDIO_START)?),
            AUDIO_CHUNK => {
                let data: AudioChunkData = from_data(event.data, AUDIO_CHUNK)?;
                let format = match (data.rate, data.width, data.channels) {
                    (Some(rate), Some(width), Some(channels)) => {
                        Some(AudioFormat::new(rate, width, channels))
                    }
                    _ => None,
                };
                Self::AudioChunk(AudioChunk {
                    format,
                    timestamp: data.timestamp,
                    audio: event.payload.unwrap_or_default(),
                })
            }
            AUDIO_STOP => Self::AudioStop,
            TRANSCRIPT => Self::Transcript(from_data(event.data, TRANSCRIPT)?),
            ERROR => Self::Error(from_data(event.data, ERROR)?),
            _ => Self::Unknown(event.event_type),
        };
        Ok(message)
    }

    /// Build the untyped event for this message.
    pub fn into_event(self) -> Result<Event> {
        let event = match self {
            Self::Describe => Event::new(DESCRIBE),
            Self::Info(info) => Event::new(INFO).with_data(to_data(&info)?),
            Self::Transcribe(transcribe) => Event::new(TRANSCRIBE).with_data(to_data(&transcribe)?),
            Self::AudioStart(start) => Event::new(AUDIO_START).with_data(to_data(&start)?),
            Self::AudioChunk(chunk) => {
                let data = AudioChunkData {
                    rate: chunk.format.map(|f| f.rate),
                    width: chunk.format.map(|f| f.width),
                    channels: chunk.format.map(|f| f.channels),
                    timestamp: chunk.timestamp,
                };
                Event::new(AUDIO_CHUNK)
                    .with_data(to_data(&data)?)
                    .with_payload(chunk.audio)
            }
            Self::AudioStop => Event::new(AUDIO_STOP),
            Self::Transcript(transcript) => Event::new(TRANSCRIPT).with_data(to_data(&transcript)?),
            Self::Error(error) => Event::new(ERROR).with_data(to_data(&error)?),
            Self::Unknown(event_type) => Event::new(event_type),
        };
        Ok(event)
    }
}

fn from_data<T: DeserializeOwned>(data: Map<String, Value>, event_type: &str) -> Result<T> {
    serde_json::from_value(Value::Object(data)).map_err(|e| WhisperdError::EventProtocol {
        message: format!("Invalid {} event: {}", event_type, e),
    })
}

fn to_data<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(WhisperdError::EventProtocol {
            message: format!("Event data must be an object, got {}", other),
        }),
        Err(e) => Err(WhisperdError::EventProtocol {
            message: format!("Failed to serialize event data: {}", e),
        }),
    }
}
