//! Long-running whisper.cpp process speaking a framed stdin/stdout protocol.
//!
//! One request is a JSON header line `{"size":N,"language":"xx"}` followed by
//! exactly `N` bytes of WAV. The process answers with zero or more text lines
//! and then a line holding only `<|endoftext|>`.
//!
//! All sessions share one process. Requests are serialized by a FIFO lock, and
//! each exchange runs in its own task so a response is always drained even if
//! the requesting session goes away.

use crate::defaults::{
    AUDIO_CONTEXT_BASE, BEAM_SIZE, BLANK_AUDIO, DEFAULT_LANGUAGE, END_OF_TEXT,
    WHISPER_CPP_EXECUTABLE,
};
use crate::error::{Result, WhisperdError};
use crate::stt::transcriber::Transcriber;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

/// How long shutdown waits for the process to exit on its own.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Startup parameters for the whisper.cpp process.
#[derive(Debug, Clone, PartialEq)]
pub struct WhisperCppConfig {
    pub executable: PathBuf,
    pub model_path: PathBuf,
    /// Default language; requests carry their own language anyway
    pub language: String,
    pub beam_size: u32,
    pub audio_context_base: u32,
    /// Passed through verbatim after the standard arguments
    pub extra_args: Vec<String>,
    /// Bound on one whole request/response exchange; `None` waits forever
    pub response_timeout: Option<Duration>,
}

impl WhisperCppConfig {
    /// Configuration for `<whisper_cpp_dir>/main` with default tuning.
    pub fn new(whisper_cpp_dir: &Path, model_path: PathBuf) -> Self {
        Self {
            executable: whisper_cpp_dir.join(WHISPER_CPP_EXECUTABLE),
            model_path,
            language: DEFAULT_LANGUAGE.to_string(),
            beam_size: BEAM_SIZE,
            audio_context_base: AUDIO_CONTEXT_BASE,
            extra_args: Vec::new(),
            response_timeout: None,
        }
    }

    /// Command-line arguments, excluding the executable itself.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--model".to_string(),
            self.model_path.display().to_string(),
            "--language".to_string(),
            self.language.clone(),
            "--beam-size".to_string(),
            self.beam_size.to_string(),
            "--audio-context-base".to_string(),
            self.audio_context_base.to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

#[derive(Serialize)]
struct RequestHeader<'a> {
    size: usize,
    language: &'a str,
}

type BackendWriter = Box<dyn AsyncWrite + Unpin + Send>;
type BackendReader = Box<dyn AsyncBufRead + Unpin + Send>;

/// Streams of the process, guarded together by the backend lock.
struct BackendIo {
    stdin: BackendWriter,
    stdout: BackendReader,
    /// Set once the process can no longer be trusted
    failure: Option<String>,
}

/// Handle to the shared whisper.cpp process.
pub struct WhisperCppBackend {
    model_name: String,
    io: Arc<Mutex<BackendIo>>,
    child: Arc<StdMutex<Option<Child>>>,
    alive: Arc<AtomicBool>,
    response_timeout: Option<Duration>,
}

impl WhisperCppBackend {
    /// Start the process described by `config`.
    pub fn spawn(model_name: impl Into<String>, config: &WhisperCppConfig) -> Result<Self> {
        let args = config.args();
        tracing::debug!(executable = %config.executable.display(), ?args, "Starting whisper.cpp");

        let mut child = Command::new(&config.executable)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WhisperdError::BackendSpawn {
                message: format!("{}: {}", config.executable.display(), e),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| WhisperdError::BackendSpawn {
            message: "stdin was not captured".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| WhisperdError::BackendSpawn {
            message: "stdout was not captured".to_string(),
        })?;

        tracing::info!(pid = ?child.id(), "whisper.cpp started");

        let mut backend = Self::from_streams(model_name, stdout, stdin, config.response_timeout);
        backend.child = Arc::new(StdMutex::new(Some(child)));
        Ok(backend)
    }

    /// Use an existing pair of streams as the backend, with no process attached.
    pub fn from_streams<R, W>(
        model_name: impl Into<String>,
        stdout: R,
        stdin: W,
        response_timeout: Option<Duration>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            model_name: model_name.into(),
            io: Arc::new(Mutex::new(BackendIo {
                stdin: Box::new(stdin),
                stdout: Box::new(BufReader::new(stdout)),
                failure: None,
            })),
            child: Arc::new(StdMutex::new(None)),
            alive: Arc::new(AtomicBool::new(true)),
            response_timeout,
        }
    }

    /// Close stdin, give the process a moment to exit, then kill it.
    ///
    /// Later transcriptions fail with `BackendUnavailable`.
    pub async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);

        match tokio::time::timeout(SHUTDOWN_GRACE, self.io.lock()).await {
            Ok(mut io) => {
                io.failure = Some("backend shut down".to_string());
                // Dropping the real stdin is what signals EOF to the process
                io.stdin = Box::new(tokio::io::sink());
            }
            Err(_) => tracing::warn!("whisper.cpp busy during shutdown"),
        }

        let child = self
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut child) = child else {
            return;
        };

        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => tracing::info!(%status, "whisper.cpp exited"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to wait for whisper.cpp"),
            Err(_) => {
                tracing::warn!("whisper.cpp did not exit; killing it");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill whisper.cpp");
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Transcriber for WhisperCppBackend {
    async fn transcribe(&self, wav: Vec<u8>, language: String) -> Result<String> {
        // FIFO: the lock is taken here, before the exchange task exists
        let io = Arc::clone(&self.io).lock_owned().await;
        let child = Arc::clone(&self.child);
        let alive = Arc::clone(&self.alive);
        let response_timeout = self.response_timeout;

        let task = tokio::spawn(async move {
            let mut io = io;
            if let Some(reason) = &io.failure {
                return Err(WhisperdError::BackendUnavailable {
                    message: reason.clone(),
                });
            }

            let result = match response_timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, exchange(&mut io, &wav, &language)).await {
                        Ok(result) => result,
                        Err(_) => {
                            kill_child(&child);
                            Err(WhisperdError::BackendUnavailable {
                                message: format!(
                                    "no response within {}",
                                    humantime::format_duration(limit)
                                ),
                            })
                        }
                    }
                }
                None => exchange(&mut io, &wav, &language).await,
            };

            if let Err(e) = &result
                && e.is_backend_fatal()
            {
                tracing::error!(error = %e, "whisper.cpp backend is no longer usable");
                io.failure = Some(e.to_string());
                alive.store(false, Ordering::SeqCst);
            }
            result
        });

        task.await
            .map_err(|e| WhisperdError::BackendUnavailable {
                message: format!("transcription task failed: {}", e),
            })?
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

fn kill_child(child: &StdMutex<Option<Child>>) {
    let mut child = child.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(child) = child.as_mut()
        && let Err(e) = child.start_kill()
    {
        tracing::warn!(error = %e, "Failed to kill whisper.cpp");
    }
}

/// One request/response round trip. The caller holds the lock.
async fn exchange(io: &mut BackendIo, wav: &[u8], language: &str) -> Result<String> {
    let mut request = serde_json::to_vec(&RequestHeader {
        size: wav.len(),
        language,
    })
    .map_err(|e| WhisperdError::Other(format!("Failed to encode request: {}", e)))?;
    request.push(b'\n');

    tracing::debug!(size = wav.len(), language, "Sending request to whisper.cpp");

    let write_failed = |e: std::io::Error| WhisperdError::BackendUnavailable {
        message: format!("failed to write request: {}", e),
    };
    io.stdin.write_all(&request).await.map_err(write_failed)?;
    io.stdin.write_all(wav).await.map_err(write_failed)?;
    io.stdin.flush().await.map_err(write_failed)?;

    let raw = read_response(&mut io.stdout).await?;
    tracing::debug!(raw = %raw, "Received response from whisper.cpp");

    Ok(clean_transcript(&raw))
}

/// Read lines up to the end-of-text sentinel and join the non-empty ones.
///
/// # Errors
/// `ProtocolDesync` if the stream ends before the sentinel, and
/// `BackendUnavailable` if reading fails.
pub async fn read_response<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = Vec::new();
    let mut buffer = Vec::new();

    loop {
        buffer.clear();
        let read = reader.read_until(b'\n', &mut buffer).await.map_err(|e| {
            WhisperdError::BackendUnavailable {
                message: format!("failed to read response: {}", e),
            }
        })?;
        if read == 0 {
            return Err(WhisperdError::ProtocolDesync {
                message: format!("output closed before {}", END_OF_TEXT),
            });
        }

        let line = String::from_utf8_lossy(&buffer);
        let line = line.trim();
        if line == END_OF_TEXT {
            break;
        }
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }

    Ok(lines.join(" "))
}

/// Strip placeholder tokens and surrounding whitespace.
pub fn clean_transcript(text: &str) -> String {
    text.replace(BLANK_AUDIO, "")
        .replace(END_OF_TEXT, "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::Mutex as SyncMutex;
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio::task::JoinHandle;

    /// What the fake process does with one request.
    enum Reply {
        Text(String),
        TextThenClose(String),
        Delayed(Duration, String),
        Silent,
    }

    /// Raw header line (without newline) and WAV bytes of every request.
    type Seen = Arc<SyncMutex<Vec<(String, Vec<u8>)>>>;

    /// In-process stand-in for whisper.cpp on the far end of a duplex pipe.
    fn fake_backend<F>(
        timeout: Option<Duration>,
        mut respond: F,
    ) -> (WhisperCppBackend, Seen, JoinHandle<()>)
    where
        F: FnMut(&Value, &[u8]) -> Reply + Send + 'static,
    {
        let (ours, theirs) = tokio::io::duplex(256 * 1024);
        let (stdout, stdin) = tokio::io::split(ours);
        let backend = WhisperCppBackend::from_streams("tiny", stdout, stdin, timeout);

        let seen: Seen = Arc::new(SyncMutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let task = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split::<DuplexStream>(theirs);
            let mut read = BufReader::new(read);
            loop {
                let mut header = String::new();
                if read.read_line(&mut header).await.unwrap_or(0) == 0 {
                    return;
                }
                let header = header.trim_end_matches('\n').to_string();
                let parsed: Value = serde_json::from_str(&header).unwrap();
                let size = parsed["size"].as_u64().unwrap() as usize;
                let mut wav = vec![0u8; size];
                read.read_exact(&mut wav).await.unwrap();

                let reply = respond(&parsed, &wav);
                log.lock().unwrap().push((header, wav));
                match reply {
                    Reply::Text(text) => write.write_all(text.as_bytes()).await.unwrap(),
                    Reply::TextThenClose(text) => {
                        write.write_all(text.as_bytes()).await.unwrap();
                        return;
                    }
                    Reply::Delayed(delay, text) => {
                        tokio::time::sleep(delay).await;
                        write.write_all(text.as_bytes()).await.unwrap();
                    }
                    Reply::Silent => {}
                }
            }
        });

        (backend, seen, task)
    }

    fn sized_reply(_: &Value, wav: &[u8]) -> Reply {
        Reply::Text(format!("size {}\n{}\n", wav.len(), END_OF_TEXT))
    }

    #[test]
    fn test_args_follow_standard_order_then_extras() {
        let mut config = WhisperCppConfig::new(
            Path::new("/opt/whisper.cpp"),
            PathBuf::from("/data/ggml-tiny.bin"),
        );
        config.language = "en".to_string();
        config.extra_args = vec!["--threads".to_string(), "4".to_string()];

        assert_eq!(config.executable, PathBuf::from("/opt/whisper.cpp/main"));
        assert_eq!(
            config.args(),
            vec![
                "--model",
                "/data/ggml-tiny.bin",
                "--language",
                "en",
                "--beam-size",
                "5",
                "--audio-context-base",
                "300",
                "--threads",
                "4",
            ]
        );
    }

    #[test]
    fn test_clean_transcript_removes_placeholders() {
        assert_eq!(clean_transcript("[BLANK_AUDIO]"), "");
        assert_eq!(clean_transcript("  hello [BLANK_AUDIO]  "), "hello");
        assert_eq!(clean_transcript("what <|endoftext|>"), "what");
        assert_eq!(clean_transcript(""), "");
    }

    #[tokio::test]
    async fn test_read_response_joins_non_empty_lines() {
        let mut reader = BufReader::new(&b" Hello \n\n  world.\n<|endoftext|>\nnext"[..]);
        let text = read_response(&mut reader).await.unwrap();
        assert_eq!(text, "Hello world.");

        // Only the first response is consumed
        let mut rest = String::new();
        reader.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "next");
    }

    #[tokio::test]
    async fn test_read_response_accepts_padded_sentinel() {
        let mut reader = BufReader::new(&b"  <|endoftext|>  \r\n"[..]);
        assert_eq!(read_response(&mut reader).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_read_response_without_sentinel_is_desync() {
        let mut reader = BufReader::new(&b"half a transcript\n"[..]);
        let result = read_response(&mut reader).await;
        assert!(matches!(result, Err(WhisperdError::ProtocolDesync { .. })));
    }

    #[tokio::test]
    async fn test_request_is_header_line_then_exact_wav() {
        let (backend, seen, _task) = fake_backend(None, |_, _| {
            Reply::Text("turn on the lights\n<|endoftext|>\n".to_string())
        });

        let wav = crate::audio::encode_wav(&[1, 0, 2, 0]).unwrap();
        let text = backend
            .transcribe(wav.clone(), "auto".to_string())
            .await
            .unwrap();
        assert_eq!(text, "turn on the lights");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, r#"{"size":48,"language":"auto"}"#);
        assert_eq!(seen[0].1, wav);
    }

    #[tokio::test]
    async fn test_blank_audio_yields_empty_transcript() {
        let (backend, _seen, _task) = fake_backend(None, |_, _| {
            Reply::Text("[BLANK_AUDIO]\n<|endoftext|>\n".to_string())
        });

        let text = backend
            .transcribe(crate::audio::encode_wav(&[]).unwrap(), "en".to_string())
            .await
            .unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_serialized() {
        let (backend, seen, _task) = fake_backend(None, sized_reply);
        let backend = Arc::new(backend);

        let mut handles = Vec::new();
        for i in 0..8usize {
            let backend = Arc::clone(&backend);
            handles.push(tokio::spawn(async move {
                let wav = vec![i as u8; 100 + i * 1000];
                let text = backend.transcribe(wav, "auto".to_string()).await.unwrap();
                (i, text)
            }));
        }

        for handle in handles {
            let (i, text) = handle.await.unwrap();
            assert_eq!(text, format!("size {}", 100 + i * 1000));
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 8);
        for (header, wav) in seen.iter() {
            let header: Value = serde_json::from_str(header).unwrap();
            assert_eq!(header["size"].as_u64().unwrap() as usize, wav.len());
            assert!(wav.iter().all(|&b| b == wav[0]), "request bytes interleaved");
        }
    }

    #[tokio::test]
    async fn test_abandoned_request_is_drained_before_next() {
        let (backend, _seen, _task) = fake_backend(None, |_, wav| {
            Reply::Delayed(
                Duration::from_millis(100),
                format!("size {}\n{}\n", wav.len(), END_OF_TEXT),
            )
        });

        // The caller gives up long before the reply arrives
        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), backend.transcribe(vec![0; 10], "auto".to_string()))
                .await;
        assert!(abandoned.is_err());

        let text = backend
            .transcribe(vec![0; 20], "auto".to_string())
            .await
            .unwrap();
        assert_eq!(text, "size 20");
        assert!(backend.is_ready());
    }

    #[tokio::test]
    async fn test_closed_output_is_desync_and_fatal() {
        let (backend, seen, _task) =
            fake_backend(None, |_, _| Reply::TextThenClose("partial\n".to_string()));

        let first = backend.transcribe(vec![0; 4], "auto".to_string()).await;
        assert!(matches!(first, Err(WhisperdError::ProtocolDesync { .. })));
        assert!(!backend.is_ready());

        let second = backend.transcribe(vec![0; 4], "auto".to_string()).await;
        assert!(matches!(second, Err(WhisperdError::BackendUnavailable { .. })));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_marks_backend_dead() {
        let (backend, seen, _task) =
            fake_backend(Some(Duration::from_millis(50)), |_, _| Reply::Silent);

        let first = backend.transcribe(vec![0; 4], "auto".to_string()).await;
        match first {
            Err(WhisperdError::BackendUnavailable { message }) => {
                assert!(message.contains("no response within"), "got: {message}");
            }
            other => panic!("Expected BackendUnavailable, got {other:?}"),
        }
        assert!(!backend.is_ready());

        let second = backend.transcribe(vec![0; 4], "auto".to_string()).await;
        assert!(matches!(second, Err(WhisperdError::BackendUnavailable { .. })));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_does_not_affect_prompt_replies() {
        let (backend, _seen, _task) = fake_backend(Some(Duration::from_secs(5)), sized_reply);
        for _ in 0..3 {
            let text = backend.transcribe(vec![0; 8], "auto".to_string()).await.unwrap();
            assert_eq!(text, "size 8");
        }
        assert!(backend.is_ready());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_later_requests() {
        let (backend, _seen, _task) = fake_backend(None, sized_reply);
        backend.shutdown().await;
        assert!(!backend.is_ready());

        let result = backend.transcribe(vec![0; 8], "auto".to_string()).await;
        match result {
            Err(WhisperdError::BackendUnavailable { message }) => {
                assert!(message.contains("shut down"), "got: {message}");
            }
            other => panic!("Expected BackendUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = WhisperCppConfig::new(dir.path(), dir.path().join("ggml-tiny.bin"));
        let result = WhisperCppBackend::spawn("tiny", &config);
        assert!(matches!(result, Err(WhisperdError::BackendSpawn { .. })));
    }
}
