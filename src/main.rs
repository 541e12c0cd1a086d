use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use wyoming_client::{AudioFile, Config, Transcriber, Transcript, WyomingClient, WyomingError};

/// Speech-to-text client for Wyoming protocol servers
#[derive(Debug, Parser)]
#[command(name = "wyoming-client", version)]
struct Cli {
    /// Config file (defaults to config/wyoming-client.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Server host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Server port
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the server version and the models it offers
    Describe {
        /// Print the raw server info as JSON
        #[arg(long)]
        json: bool,
    },
    /// Transcribe a WAV file (16-bit PCM; converted to 16kHz mono when possible)
    Transcribe {
        file: PathBuf,

        /// Bytes of audio per chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Seconds to wait for the transcript
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        #[arg(long)]
        language: Option<String>,

        /// Model name as listed by `describe`
        #[arg(long)]
        model: Option<String>,

        /// Retries on a new connection after connection errors or timeouts
        #[arg(long, default_value_t = 0)]
        retries: u32,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries only results
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_default().context("Failed to load config")?,
    };
    if let Some(host) = cli.host {
        cfg.server.host = host;
    }
    if let Some(port) = cli.port {
        cfg.server.port = port;
    }

    match cli.command {
        Command::Describe { json } => {
            let client = WyomingClient::from_config(&cfg)?;
            let info = client
                .describe()
                .await
                .with_context(|| format!("describe failed against {}", client.address()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("version: {}", info.version.as_deref().unwrap_or("unknown"));
                for program in &info.asr {
                    println!("{} (installed: {})", program.name, program.installed);
                    for model in &program.models {
                        println!(
                            "  {} [{}] (installed: {})",
                            model.name,
                            model.languages.join(", "),
                            model.installed
                        );
                    }
                }
            }
        }
        Command::Transcribe {
            file,
            chunk_size,
            timeout,
            language,
            model,
            retries,
            json,
        } => {
            if let Some(chunk_size) = chunk_size {
                cfg.transcription.chunk_size = chunk_size;
            }
            if let Some(timeout) = timeout {
                cfg.transcription.response_timeout_secs = timeout;
            }
            if language.is_some() {
                cfg.transcription.language = language;
            }
            if model.is_some() {
                cfg.transcription.model = model;
            }

            let client = WyomingClient::from_config(&cfg)?;
            let transcript = transcribe_with_retries(&client, &file, retries)
                .await
                .with_context(|| format!("Failed to transcribe {}", file.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&transcript)?);
            } else {
                println!("{}", transcript.text);
            }
        }
    }

    Ok(())
}

/// Retry transport failures on a fresh connection, backing off between attempts
async fn transcribe_with_retries(
    client: &WyomingClient,
    file: &Path,
    retries: u32,
) -> std::result::Result<Transcript, WyomingError> {
    let pcm = AudioFile::open(file)?.to_pcm(client.audio_format())?;
    info!("Sending {} to {}", file.display(), client.address());

    let mut attempt = 0;
    loop {
        match client.transcribe(&pcm).await {
            Ok(transcript) => return Ok(transcript),
            Err(e) if e.is_retryable() && attempt < retries => {
                attempt += 1;
                let delay = Duration::from_secs(1 << attempt.min(5));
                warn!(
                    "Attempt {} failed: {}; retrying in {:?}",
                    attempt, e, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
