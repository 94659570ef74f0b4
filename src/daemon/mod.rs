//! Server mode: resolve the model, start whisper.cpp, serve Wyoming clients.

pub mod descriptor;
pub mod session;

use crate::config::Config;
use crate::defaults::ENGLISH_LANGUAGE;
use crate::error::{Result, WhisperdError};
use crate::models::catalog::is_english_only;
use crate::models::download::resolve_model;
use crate::stt::backend::{WhisperCppBackend, WhisperCppConfig};
use crate::stt::transcriber::Transcriber;
use crate::wyoming::server::{EventServer, ServerUri};
use session::Session;
use std::path::PathBuf;
use std::sync::Arc;

/// Language sessions fall back to.
///
/// English-only models can only transcribe English, whatever is configured.
pub fn effective_language(model_name: &str, configured: &str) -> String {
    if is_english_only(model_name) {
        ENGLISH_LANGUAGE.to_string()
    } else {
        configured.to_string()
    }
}

/// Startup parameters for whisper.cpp derived from the configuration.
pub fn backend_config(config: &Config, model_path: PathBuf) -> Result<WhisperCppConfig> {
    let cpp_dir = config
        .whisper
        .cpp_dir
        .as_deref()
        .ok_or_else(|| WhisperdError::ConfigInvalidValue {
            key: "whisper.cpp_dir".to_string(),
            message: "required (pass --whisper-cpp-dir)".to_string(),
        })?;

    let mut whisper = WhisperCppConfig::new(cpp_dir, model_path);
    whisper.language = effective_language(&config.model.name, &config.whisper.language);
    whisper.beam_size = config.whisper.beam_size;
    whisper.audio_context_base = config.whisper.audio_context_base;
    whisper.extra_args = config.whisper.extra_args.clone();
    whisper.response_timeout = config.whisper.response_timeout()?;
    Ok(whisper)
}

/// Run the server until SIGINT/SIGTERM, or until stdin closes in stdio mode.
///
/// # Arguments
/// * `config` - Merged file, environment and CLI configuration
/// * `allow_download` - Download the model if no data dir has it
pub async fn run_daemon(config: Config, allow_download: bool) -> Result<()> {
    config.validate()?;
    let uri: ServerUri = config.server.uri.parse()?;
    let model_name = config.model.name.clone();

    // Fail on a missing whisper.cpp dir before any download starts
    backend_config(&config, PathBuf::new())?;

    let model_path = resolve_model(
        &model_name,
        &config.model.data_dirs,
        config.model.download_dir.as_deref(),
        allow_download,
    )
    .await?;

    let whisper = backend_config(&config, model_path)?;
    if whisper.language != config.whisper.language {
        tracing::info!(model = %model_name, "English-only model; default language set to en");
    }
    let language = whisper.language.clone();

    let backend = Arc::new(WhisperCppBackend::spawn(model_name.clone(), &whisper)?);
    let info = Arc::new(descriptor::build_info(&model_name));

    let server = match EventServer::bind(&uri).await {
        Ok(server) => Arc::new(server),
        Err(e) => {
            backend.shutdown().await;
            return Err(e);
        }
    };
    tracing::info!(%uri, model = %model_name, %language, "Ready");

    let transcriber: Arc<dyn Transcriber> = backend.clone();
    let serving = Arc::clone(&server);
    let mut serve_task = tokio::spawn(async move {
        serving
            .serve(move || Session::new(Arc::clone(&transcriber), Arc::clone(&info), language.clone()))
            .await
    });

    let finished = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT, shutting down");
            None
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                tracing::error!(error = %e, "Error setting up signal handler");
            }
            tracing::info!("Received SIGTERM, shutting down");
            None
        }
        joined = &mut serve_task => Some(joined),
    };

    if let Err(e) = server.stop() {
        tracing::warn!(error = %e, "Failed to stop server cleanly");
    }
    let joined = match finished {
        Some(joined) => joined,
        None => serve_task.await,
    };

    backend.shutdown().await;
    tracing::info!("Server stopped");

    joined.map_err(|e| WhisperdError::Other(format!("Server task failed: {e}")))?
}

/// Wait for SIGTERM signal (used by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| WhisperdError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    // On non-Unix, just wait forever (Ctrl+C will still work)
    std::future::pending::<Result<()>>().await
}
