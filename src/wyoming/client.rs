//! Wyoming client used by the `transcribe` command.

use crate::audio::WavAudio;
use crate::error::{Result, WhisperdError};
use crate::wyoming::event::{Event, read_event, write_event};
use crate::wyoming::info::Info;
use crate::wyoming::messages::{AudioChunk, AudioStart, Message, Transcribe};
use crate::wyoming::server::ServerUri;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpStream, UnixStream};

type BoxedReader = Box<dyn AsyncBufRead + Unpin + Send>;
type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// A connection to a Wyoming server.
pub struct WyomingClient {
    reader: BoxedReader,
    writer: BoxedWriter,
}

impl WyomingClient {
    /// Connect to a server at a `tcp://` or `unix://` URI.
    pub async fn connect(uri: &ServerUri) -> Result<Self> {
        match uri {
            ServerUri::Tcp(address) => {
                let stream =
                    TcpStream::connect(address)
                        .await
                        .map_err(|e| WhisperdError::Connection {
                            message: format!("Failed to connect to {}: {}", uri, e),
                        })?;
                let (reader, writer) = stream.into_split();
                Ok(Self::from_streams(reader, writer))
            }
            ServerUri::Unix(path) => {
                let stream =
                    UnixStream::connect(path)
                        .await
                        .map_err(|e| WhisperdError::Connection {
                            message: format!("Failed to connect to {}: {}", uri, e),
                        })?;
                let (reader, writer) = stream.into_split();
                Ok(Self::from_streams(reader, writer))
            }
            ServerUri::Stdio => Err(WhisperdError::ConfigInvalidValue {
                key: "uri".to_string(),
                message: "cannot connect to stdio://".to_string(),
            }),
        }
    }

    /// Wrap an already-open pair of streams.
    pub fn from_streams<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            reader: Box::new(BufReader::new(reader)),
            writer: Box::new(writer),
        }
    }

    pub async fn send(&mut self, message: Message) -> Result<()> {
        let event = message.into_event()?;
        write_event(&mut self.writer, &event).await
    }

    /// Receive the next message, or `None` if the server closed the connection.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        match read_event(&mut self.reader).await? {
            Some(event) => Message::from_event(event).map(Some),
            None => Ok(None),
        }
    }

    /// Ask the server what it offers.
    pub async fn describe(&mut self) -> Result<Info> {
        self.send(Message::Describe).await?;
        loop {
            match self.recv().await? {
                Some(Message::Info(info)) => return Ok(info),
                Some(Message::Error(error)) => return Err(WhisperdError::Other(error.text)),
                Some(_) => continue,
                None => return Err(closed()),
            }
        }
    }

    /// Stream a WAV file and wait for its transcript.
    ///
    /// Audio is sent in its native format; the server normalizes it.
    pub async fn transcribe_wav(
        &mut self,
        audio: &WavAudio,
        language: Option<&str>,
        samples_per_chunk: usize,
    ) -> Result<String> {
        audio.format.validate()?;

        self.send(Message::Transcribe(Transcribe {
            name: None,
            language: language.map(str::to_string),
        }))
        .await?;

        let format = audio.format;
        self.send(Message::AudioStart(AudioStart {
            rate: format.rate,
            width: format.width,
            channels: format.channels,
            timestamp: Some(0),
        }))
        .await?;

        let chunk_bytes = samples_per_chunk.max(1) * format.frame_size();
        let mut frames_sent: u64 = 0;
        for block in audio.pcm.chunks(chunk_bytes) {
            let timestamp_ms = frames_sent * 1000 / u64::from(format.rate);
            self.send(Message::AudioChunk(AudioChunk {
                format: Some(format),
                timestamp: Some(timestamp_ms),
                audio: block.to_vec(),
            }))
            .await?;
            frames_sent += (block.len() / format.frame_size()) as u64;
        }

        self.send(Message::AudioStop).await?;

        loop {
            match self.recv().await? {
                Some(Message::Transcript(transcript)) => return Ok(transcript.text),
                Some(Message::Error(error)) => return Err(WhisperdError::Other(error.text)),
                Some(_) => continue,
                None => return Err(closed()),
            }
        }
    }

    /// Send a raw event, bypassing the typed messages.
    pub async fn send_event(&mut self, event: &Event) -> Result<()> {
        write_event(&mut self.writer, event).await
    }
}

fn closed() -> WhisperdError {
    WhisperdError::Connection {
        message: "server closed the connection".to_string(),
    }
}
