use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::path::Path;
use whisperd::cli::{Cli, Commands, ModelsAction};
use whisperd::config::Config;
use whisperd::daemon::run_daemon;
use whisperd::defaults::SAMPLES_PER_CHUNK;
use whisperd::logging::init_logging;
use whisperd::models::catalog::{get_model, list_models};
use whisperd::models::download::{default_data_dir, download_model, find_model};
use whisperd::wyoming::{ServerUri, WyomingClient};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(
            shell,
            &mut Cli::command(),
            "whisperd",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    init_logging(cli.debug, cli.log_format)?;
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve(args) => {
            args.apply(&mut config);
            tracing::info!(version = %whisperd::version_string(), "Starting whisperd");
            run_daemon(config, !args.no_download).await?;
        }
        Commands::Transcribe {
            uri,
            language,
            file,
        } => {
            let text = transcribe_file(&uri, language.as_deref(), &file).await?;
            println!("{text}");
        }
        Commands::Models { action } => {
            handle_models_command(action, &config).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config), which must exist
/// 2. Default config path (~/.config/whisperd/config.toml)
/// 3. Built-in defaults
///
/// Environment variables are applied on top; CLI flags come last.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    Ok(config.with_env_overrides())
}

/// Stream a WAV file to a running server and return the transcript.
async fn transcribe_file(uri: &str, language: Option<&str>, file: &Path) -> Result<String> {
    let uri: ServerUri = uri.parse()?;
    let audio = whisperd::audio::WavAudio::open(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    tracing::debug!(
        rate = audio.format.rate,
        width = audio.format.width,
        channels = audio.format.channels,
        bytes = audio.pcm.len(),
        "Loaded WAV file"
    );

    let mut client = WyomingClient::connect(&uri).await?;
    let text = client
        .transcribe_wav(&audio, language, SAMPLES_PER_CHUNK)
        .await?;
    Ok(text)
}

/// Handle model management commands.
async fn handle_models_command(action: ModelsAction, config: &Config) -> Result<()> {
    match action {
        ModelsAction::List => {
            println!("Available models:");
            for model in list_models() {
                let marker = if model.english_only() { " (English only)" } else { "" };
                match find_model(model.name, &config.model.data_dirs) {
                    Some(path) => println!(
                        "  {:<18} {:>5} MB{}  [installed: {}]",
                        model.name,
                        model.size_mb,
                        marker,
                        path.display()
                    ),
                    None => println!("  {:<18} {:>5} MB{}", model.name, model.size_mb, marker),
                }
            }
        }
        ModelsAction::Download { name, dir } => {
            if get_model(&name).is_none() {
                anyhow::bail!(
                    "Unknown model: '{name}'. Run `whisperd models list` to see available models."
                );
            }
            let dest = dir
                .or_else(|| config.model.download_dir.clone())
                .or_else(|| config.model.data_dirs.first().cloned())
                .unwrap_or_else(default_data_dir);
            let path = download_model(&name, &dest, true).await?;
            println!("Model '{}' downloaded successfully", name);
            println!("Location: {}", path.display());
        }
    }
    Ok(())
}
