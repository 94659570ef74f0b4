//! Default configuration constants for whisperd.
//!
//! Shared constants for the audio format the backend expects, the backend
//! framing, and the values used when nothing is configured.

/// Sample rate required by the whisper.cpp backend, in Hz.
pub const SAMPLE_RATE: u32 = 16000;

/// Sample width required by the backend, in bytes (16-bit signed PCM).
pub const SAMPLE_WIDTH: u16 = 2;

/// Channel count required by the backend.
pub const CHANNELS: u16 = 1;

/// Lowest client sample rate accepted, in Hz.
pub const MIN_SAMPLE_RATE: u32 = 1000;

/// Highest client sample rate accepted, in Hz.
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Largest normalized utterance a session buffers (10 minutes at 16 kHz/16-bit/mono).
pub const MAX_UTTERANCE_BYTES: usize = 16_000 * 2 * 600;

/// Default Wyoming listen address.
pub const DEFAULT_URI: &str = "tcp://0.0.0.0:10300";

/// Default whisper.cpp model name.
pub const DEFAULT_MODEL: &str = "tiny-q5_1";

/// Default language code for transcription.
///
/// "auto" lets whisper.cpp detect the spoken language.
pub const DEFAULT_LANGUAGE: &str = "auto";

/// Language value that triggers automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";

/// English language code, forced for English-only models.
pub const ENGLISH_LANGUAGE: &str = "en";

/// Marker in a model name for English-only variants.
pub const ENGLISH_ONLY_MARKER: &str = ".en";

/// Default beam-search width passed to whisper.cpp.
pub const BEAM_SIZE: u32 = 5;

/// Default base length of whisper.cpp's audio context.
pub const AUDIO_CONTEXT_BASE: u32 = 300;

/// Name of the executable inside the whisper.cpp directory.
pub const WHISPER_CPP_EXECUTABLE: &str = "main";

/// Line the backend prints after the last line of a response.
pub const END_OF_TEXT: &str = "<|endoftext|>";

/// Token the backend emits for audio without speech.
pub const BLANK_AUDIO: &str = "[BLANK_AUDIO]";

/// Samples per audio-chunk event when streaming a file to a server.
pub const SAMPLES_PER_CHUNK: usize = 1024;

/// Program name reported in the service descriptor.
pub const PROGRAM_NAME: &str = "whisper.cpp";

/// Program description reported in the service descriptor.
pub const PROGRAM_DESCRIPTION: &str = "Port of OpenAI's Whisper model in C/C++";

/// Attribution for the backend program.
pub const PROGRAM_ATTRIBUTION_NAME: &str = "Georgi Gerganov";
pub const PROGRAM_ATTRIBUTION_URL: &str = "https://github.com/ggerganov/whisper.cpp";

/// Attribution for the packaged models.
pub const MODEL_ATTRIBUTION_NAME: &str = "rhasspy";
pub const MODEL_ATTRIBUTION_URL: &str = "https://github.com/rhasspy/models/";

/// Version reported for each installed model.
pub const MODEL_VERSION: &str = "1.0";
