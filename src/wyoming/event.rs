//! Wyoming event framing.
//!
//! Each event is a single JSON header line, optionally followed by a block
//! of JSON data (`data_length` bytes) and a binary payload
//! (`payload_length` bytes).

use crate::error::{Result, WhisperdError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version written into every outgoing header.
pub const PROTOCOL_VERSION: &str = "1.5.4";

/// Longest header line accepted, including the newline.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Largest data block accepted.
pub const MAX_DATA_BYTES: usize = 1024 * 1024;

/// Largest binary payload accepted.
pub const MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

/// A single untyped Wyoming event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Event {
    pub event_type: String,
    pub data: Map<String, Value>,
    pub payload: Option<Vec<u8>>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: Map::new(),
            payload: None,
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload_length: Option<usize>,
}

/// Read the next event.
///
/// Returns `Ok(None)` when the stream ends cleanly before a header.
pub async fn read_event<R>(reader: &mut R) -> Result<Option<Event>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = (&mut *reader)
            .take(MAX_HEADER_BYTES as u64)
            .read_until(b'\n', &mut line)
            .await
            .map_err(|e| WhisperdError::Connection {
                message: format!("Failed to read event header: {}", e),
            })?;

        if read == 0 {
            return Ok(None);
        }
        if line.last() != Some(&b'\n') && read >= MAX_HEADER_BYTES {
            return Err(WhisperdError::EventProtocol {
                message: format!("Event header exceeds {} bytes", MAX_HEADER_BYTES),
            });
        }
        if !line.iter().all(u8::is_ascii_whitespace) {
            break;
        }
    }

    let header: Header =
        serde_json::from_slice(&line).map_err(|e| WhisperdError::EventProtocol {
            message: format!("Failed to parse event header: {}", e),
        })?;

    let mut data = header.data.unwrap_or_default();

    if let Some(length) = header.data_length.filter(|&n| n > 0) {
        if length > MAX_DATA_BYTES {
            return Err(WhisperdError::EventProtocol {
                message: format!("Event data of {} bytes exceeds limit", length),
            });
        }
        let bytes = read_block(reader, length, "data").await?;
        let extra: Map<String, Value> =
            serde_json::from_slice(&bytes).map_err(|e| WhisperdError::EventProtocol {
                message: format!("Failed to parse event data: {}", e),
            })?;
        data.extend(extra);
    }

    let payload = match header.payload_length {
        Some(length) if length > MAX_PAYLOAD_BYTES => {
            return Err(WhisperdError::EventProtocol {
                message: format!("Event payload of {} bytes exceeds limit", length),
            });
        }
        Some(length) => Some(read_block(reader, length, "payload").await?),
        None => None,
    };

    Ok(Some(Event {
        event_type: header.event_type,
        data,
        payload,
    }))
}

async fn read_block<R>(reader: &mut R, length: usize, what: &str) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut bytes = vec![0u8; length];
    reader
        .read_exact(&mut bytes)
        .await
        .map_err(|e| WhisperdError::EventProtocol {
            message: format!("Event {} truncated: {}", what, e),
        })?;
    Ok(bytes)
}

/// Write one event and flush.
pub async fn write_event<W>(writer: &mut W, event: &Event) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let data = if event.data.is_empty() {
        None
    } else {
        Some(
            serde_json::to_vec(&event.data).map_err(|e| WhisperdError::EventProtocol {
                message: format!("Failed to serialize event data: {}", e),
            })?,
        )
    };

    let header = Header {
        event_type: event.event_type.clone(),
        version: Some(PROTOCOL_VERSION.to_string()),
        data: None,
        data_length: data.as_ref().map(Vec::len),
        payload_length: event.payload.as_ref().map(Vec::len),
    };

    let mut frame =
        serde_json::to_vec(&header).map_err(|e| WhisperdError::EventProtocol {
            message: format!("Failed to serialize event header: {}", e),
        })?;
    frame.push(b'\n');
    if let Some(data) = data {
        frame.extend_from_slice(&data);
    }
    if let Some(payload) = &event.payload {
        frame.extend_from_slice(payload);
    }

    writer
        .write_all(&frame)
        .await
        .map_err(|e| WhisperdError::Connection {
            message: format!("Failed to write event: {}", e),
        })?;
    writer.flush().await.map_err(|e| WhisperdError::Connection {
        message: format!("Failed to flush event: {}", e),
    })?;

    Ok(())
}
