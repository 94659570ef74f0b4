//! WAV container handling.
//!
//! The backend receives every utterance as a complete RIFF/WAVE file, and the
//! `transcribe` client reads WAV files to stream them to a server.

use crate::audio::format::AudioFormat;
use crate::defaults::{CHANNELS, SAMPLE_RATE, SAMPLE_WIDTH};
use crate::error::{Result, WhisperdError};
use std::io::{Cursor, Read};

/// Wrap normalized PCM (16 kHz, 16-bit, mono, little-endian) in a WAV file.
///
/// An empty buffer yields a valid 44-byte header-only file.
pub fn encode_wav(pcm: &[u8]) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: SAMPLE_WIDTH * 8,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    let mut writer =
        hound::WavWriter::new(&mut cursor, spec).map_err(|e| WhisperdError::AudioFormat {
            message: format!("Failed to start WAV container: {}", e),
        })?;

    for pair in pcm.chunks_exact(2) {
        writer
            .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
            .map_err(|e| WhisperdError::AudioFormat {
                message: format!("Failed to write WAV samples: {}", e),
            })?;
    }

    writer.finalize().map_err(|e| WhisperdError::AudioFormat {
        message: format!("Failed to finalize WAV container: {}", e),
    })?;

    Ok(cursor.into_inner())
}

/// Raw PCM read from a WAV file, still in the file's own format.
#[derive(Debug, Clone, PartialEq)]
pub struct WavAudio {
    pub format: AudioFormat,
    /// Interleaved little-endian frames; 8-bit audio stays unsigned
    pub pcm: Vec<u8>,
}

impl WavAudio {
    /// Parse a PCM WAV file from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut wav_reader =
            hound::WavReader::new(reader).map_err(|e| WhisperdError::AudioFormat {
                message: format!("Failed to parse WAV file: {}", e),
            })?;

        let spec = wav_reader.spec();
        if spec.sample_format != hound::SampleFormat::Int {
            return Err(WhisperdError::AudioFormat {
                message: "floating-point WAV files are not supported".to_string(),
            });
        }

        let format = AudioFormat::new(
            spec.sample_rate,
            spec.bits_per_sample.div_ceil(8),
            spec.channels,
        );
        format.validate()?;

        let width = format.width as usize;
        let mut pcm = Vec::with_capacity(wav_reader.len() as usize * width);
        for sample in wav_reader.samples::<i32>() {
            let sample = sample.map_err(|e| WhisperdError::AudioFormat {
                message: format!("Failed to read WAV samples: {}", e),
            })?;
            match width {
                1 => pcm.push((sample + 128) as u8),
                _ => pcm.extend_from_slice(&sample.to_le_bytes()[..width]),
            }
        }

        Ok(Self { format, pcm })
    }

    /// Open and parse a WAV file from disk.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::{bytes_to_samples, samples_to_bytes};

    fn make_wav_data(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_empty_buffer_encodes_header_only_wav() {
        let wav = encode_wav(&[]).unwrap();
        assert_eq!(wav.len(), 44);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 0);
    }

    #[test]
    fn test_encoded_wav_declares_backend_format() {
        let pcm = samples_to_bytes(&[1, 2, 3, 4]);
        let wav = encode_wav(&pcm).unwrap();

        let reader = hound::WavReader::new(Cursor::new(&wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);
    }

    #[test]
    fn test_encoded_wav_carries_pcm_verbatim_after_header() {
        let pcm = samples_to_bytes(&[-5, 32767, -32768, 0, 12]);
        let wav = encode_wav(&pcm).unwrap();
        assert_eq!(wav.len(), 44 + pcm.len());
        assert_eq!(&wav[44..], pcm.as_slice());
        let data_len = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_len as usize, pcm.len());
    }

    #[test]
    fn test_reads_16bit_stereo_without_conversion() {
        let samples = vec![100i16, -100, 200, -200];
        let wav = make_wav_data(44100, 2, &samples);

        let audio = WavAudio::from_reader(Cursor::new(wav)).unwrap();
        assert_eq!(audio.format, AudioFormat::new(44100, 2, 2));
        assert_eq!(bytes_to_samples(&audio.pcm), samples);
    }

    #[test]
    fn test_reads_8bit_as_unsigned_bytes() {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 8,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for s in [-128i8, 0, 127] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let audio = WavAudio::from_reader(Cursor::new(cursor.into_inner())).unwrap();
        assert_eq!(audio.format, AudioFormat::new(8000, 1, 1));
        assert_eq!(audio.pcm, vec![0u8, 128, 255]);
    }

    #[test]
    fn test_float_wav_is_rejected() {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        writer.write_sample(0.5f32).unwrap();
        writer.finalize().unwrap();

        let result = WavAudio::from_reader(Cursor::new(cursor.into_inner()));
        assert!(matches!(result, Err(WhisperdError::AudioFormat { .. })));
    }

    #[test]
    fn test_invalid_wav_data_returns_error() {
        let result = WavAudio::from_reader(Cursor::new(vec![0u8, 1, 2, 3, 4, 5]));
        match result {
            Err(WhisperdError::AudioFormat { message }) => {
                assert!(message.contains("Failed to parse WAV file"));
            }
            other => panic!("Expected AudioFormat error, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_then_read_round_trips_target_format() {
        let pcm = samples_to_bytes(&[10, 20, 30]);
        let wav = encode_wav(&pcm).unwrap();
        let audio = WavAudio::from_reader(Cursor::new(wav)).unwrap();
        assert_eq!(audio.format, AudioFormat::TARGET);
        assert_eq!(audio.pcm, pcm);
    }
}
