//! Model lookup and download.
//!
//! Models are plain `ggml-<name>.bin` files. They are looked up in every
//! configured data directory and, if missing, downloaded from HuggingFace
//! into the download directory.

use crate::error::{Result, WhisperdError};
use crate::models::catalog::get_model;
use std::path::{Path, PathBuf};

/// File name of a model inside a data directory.
pub fn model_file_name(name: &str) -> String {
    format!("ggml-{name}.bin")
}

/// Path a model would have inside `dir`. The file may not exist.
pub fn model_path(name: &str, dir: &Path) -> PathBuf {
    dir.join(model_file_name(name))
}

/// Default data directory: `~/.local/share/whisperd/models` on Linux.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("whisperd")
        .join("models")
}

/// First data directory that already holds the model.
pub fn find_model(name: &str, data_dirs: &[PathBuf]) -> Option<PathBuf> {
    data_dirs
        .iter()
        .map(|dir| model_path(name, dir))
        .find(|path| path.is_file())
}

/// Find the model in the data directories, downloading it if allowed.
///
/// Downloads go to `download_dir`, or the first data directory when unset.
pub async fn resolve_model(
    name: &str,
    data_dirs: &[PathBuf],
    download_dir: Option<&Path>,
    allow_download: bool,
) -> Result<PathBuf> {
    if let Some(path) = find_model(name, data_dirs) {
        tracing::debug!(path = %path.display(), "Found model");
        return Ok(path);
    }

    if !allow_download {
        return Err(WhisperdError::ModelNotFound {
            name: format!(
                "{} (looked for {} in {} data dir(s))",
                name,
                model_file_name(name),
                data_dirs.len()
            ),
        });
    }

    let dest = match download_dir {
        Some(dir) => dir.to_path_buf(),
        None => data_dirs.first().cloned().unwrap_or_else(default_data_dir),
    };
    tracing::info!(model = name, dir = %dest.display(), "Model not found locally; downloading");
    download_model(name, &dest, true).await
}

/// Download a catalog model into `dest_dir` and return its path.
///
/// The file is written with a `.part` suffix and renamed once complete, so an
/// interrupted download never looks installed.
#[cfg(feature = "model-download")]
pub async fn download_model(name: &str, dest_dir: &Path, progress: bool) -> Result<PathBuf> {
    use futures_util::StreamExt;
    use indicatif::{ProgressBar, ProgressStyle};
    use std::io::IsTerminal;
    use tokio::io::AsyncWriteExt;

    let info = get_model(name).ok_or_else(|| WhisperdError::ModelNotFound {
        name: format!("{name} (not a known whisper.cpp model)"),
    })?;

    let path = model_path(name, dest_dir);
    if path.is_file() {
        tracing::info!(path = %path.display(), "Model already installed");
        return Ok(path);
    }

    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| WhisperdError::ModelDownload {
            message: format!("Failed to create {}: {}", dest_dir.display(), e),
        })?;

    let url = info.url();
    tracing::info!(%url, size_mb = info.size_mb, "Downloading model");

    let response = reqwest::get(&url)
        .await
        .map_err(|e| WhisperdError::ModelDownload {
            message: format!("Failed to start download: {e}"),
        })?;
    if !response.status().is_success() {
        return Err(WhisperdError::ModelDownload {
            message: format!("Download failed with status: {}", response.status()),
        });
    }

    let total_size = response.content_length().unwrap_or(0);
    let pb = if progress && std::io::stderr().is_terminal() {
        let pb = ProgressBar::new(total_size);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        Some(pb)
    } else {
        None
    };

    let partial = path.with_extension("bin.part");
    let result = async {
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| WhisperdError::ModelDownload {
                message: format!("Failed to read download chunk: {e}"),
            })?;
            file.write_all(&chunk).await?;
            if let Some(pb) = &pb {
                pb.inc(chunk.len() as u64);
            }
        }
        file.flush().await?;
        Ok::<(), WhisperdError>(())
    }
    .await;

    if let Err(e) = result {
        if let Err(remove_err) = tokio::fs::remove_file(&partial).await {
            tracing::debug!(error = %remove_err, "Failed to remove partial download");
        }
        return Err(e);
    }

    if let Some(pb) = pb {
        pb.finish_with_message("Downloaded");
    }

    tokio::fs::rename(&partial, &path)
        .await
        .map_err(|e| WhisperdError::ModelDownload {
            message: format!("Failed to move model into place: {e}"),
        })?;

    tracing::info!(path = %path.display(), "Model installed");
    Ok(path)
}

#[cfg(not(feature = "model-download"))]
pub async fn download_model(name: &str, _dest_dir: &Path, _progress: bool) -> Result<PathBuf> {
    if get_model(name).is_none() {
        return Err(WhisperdError::ModelNotFound {
            name: format!("{name} (not a known whisper.cpp model)"),
        });
    }
    Err(WhisperdError::ModelDownload {
        message: "built without the model-download feature".to_string(),
    })
}
