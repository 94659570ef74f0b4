//! PCM chunk normalization to the backend's fixed input format.
//!
//! Clients may stream audio at any sample rate, sample width and channel
//! count. The whisper.cpp backend only accepts 16 kHz, 16-bit signed, mono
//! PCM, so every chunk is converted here before it is buffered.

use crate::defaults::{CHANNELS, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE, SAMPLE_RATE, SAMPLE_WIDTH};
use crate::error::{Result, WhisperdError};

/// Largest sample width (in bytes) accepted from clients.
const MAX_SAMPLE_WIDTH: u16 = 4;

/// Format of a block of raw PCM audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Samples per second
    pub rate: u32,
    /// Bytes per sample
    pub width: u16,
    /// Interleaved channels per frame
    pub channels: u16,
}

impl AudioFormat {
    /// The format the transcription backend requires.
    pub const TARGET: AudioFormat = AudioFormat {
        rate: SAMPLE_RATE,
        width: SAMPLE_WIDTH,
        channels: CHANNELS,
    };

    pub fn new(rate: u32, width: u16, channels: u16) -> Self {
        Self {
            rate,
            width,
            channels,
        }
    }

    /// Bytes per frame (one sample for every channel).
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    /// Bytes `normalize_chunk` produces for `byte_len` bytes in this format.
    ///
    /// Lets callers enforce size limits before anything is allocated.
    pub fn normalized_len(&self, byte_len: usize) -> usize {
        let frame_size = self.frame_size();
        if frame_size == 0 || self.rate == 0 {
            return 0;
        }
        let frames = (byte_len / frame_size) as u64;
        let samples = if self.rate == SAMPLE_RATE {
            frames
        } else {
            (frames * u64::from(SAMPLE_RATE)).div_ceil(u64::from(self.rate))
        };
        usize::try_from(samples * u64::from(SAMPLE_WIDTH)).unwrap_or(usize::MAX)
    }

    /// Check that the metadata describes PCM we know how to convert.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.rate) {
            return Err(WhisperdError::AudioFormat {
                message: format!(
                    "sample rate {} Hz outside {}..={} Hz",
                    self.rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
                ),
            });
        }
        if self.width == 0 || self.width > MAX_SAMPLE_WIDTH {
            return Err(WhisperdError::AudioFormat {
                message: format!("sample width {} not supported", self.width),
            });
        }
        if self.channels == 0 {
            return Err(WhisperdError::AudioFormat {
                message: "channel count must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Hz/{}-bit/{}ch",
            self.rate,
            self.width * 8,
            self.channels
        )
    }
}

/// Convert one chunk of raw PCM into 16 kHz, 16-bit, mono little-endian bytes.
///
/// Chunks already in the target format are returned unchanged.
///
/// # Errors
/// Returns `WhisperdError::AudioFormat` if the metadata is invalid or the
/// payload is not a whole number of frames.
pub fn normalize_chunk(format: AudioFormat, audio: &[u8]) -> Result<Vec<u8>> {
    format.validate()?;

    if audio.len() % format.frame_size() != 0 {
        return Err(WhisperdError::AudioFormat {
            message: format!(
                "{} bytes is not a whole number of {}-byte frames",
                audio.len(),
                format.frame_size()
            ),
        });
    }

    if format == AudioFormat::TARGET {
        return Ok(audio.to_vec());
    }

    let samples = decode_samples(audio, format.width);
    let mono = mix_to_mono(&samples, format.channels);
    let resampled = resample(&mono, format.rate, SAMPLE_RATE);
    Ok(samples_to_bytes(&resampled))
}

/// Decode interleaved PCM of the given width into 16-bit samples.
///
/// 8-bit audio is unsigned (WAV convention); wider samples are signed
/// little-endian and keep their two most significant bytes.
fn decode_samples(audio: &[u8], width: u16) -> Vec<i16> {
    let width = width as usize;
    audio
        .chunks_exact(width)
        .map(|bytes| match width {
            1 => ((bytes[0] as i16) - 128) << 8,
            _ => i16::from_le_bytes([bytes[width - 2], bytes[width - 1]]),
        })
        .collect()
}

/// Average interleaved channels into a single channel.
fn mix_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels == 1 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len =
        (samples.len() as u64 * u64::from(to_rate)).div_ceil(u64::from(from_rate)) as usize;
    let last = samples.len() - 1;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(last);
            let fraction = source_pos - source_idx as f64;

            if source_idx >= last {
                samples[last]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

/// Encode samples as 16-bit little-endian bytes.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Decode 16-bit little-endian bytes into samples. A trailing odd byte is dropped.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
