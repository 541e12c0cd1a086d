//! TCP client for Wyoming speech-to-text servers.

use crate::audio::AudioFile;
use crate::config::Config;
use crate::error::{Result, WyomingError};
use crate::protocol::{AudioFormat, ServiceInfo};
use crate::session::{SessionConfig, Transcript, WyomingSession};
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Speech-to-text engine turning PCM audio into a transcript
///
/// Implementations take raw PCM in the format they advertise through
/// [`Transcriber::audio_format`].
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    /// Format expected by `transcribe`
    fn audio_format(&self) -> AudioFormat;

    /// Transcribe one complete utterance
    async fn transcribe(&self, pcm: &[u8]) -> Result<Transcript>;
}

/// Connects to a Wyoming server, one connection per request.
///
/// Connections are never shared, so any number of transcriptions can run
/// concurrently from one client.
#[derive(Debug, Clone)]
pub struct WyomingClient {
    address: String,
    connect_timeout: Duration,
    session: SessionConfig,
}

impl WyomingClient {
    pub fn new(address: impl Into<String>, session: SessionConfig) -> Self {
        Self {
            address: address.into(),
            connect_timeout: Duration::from_secs(5),
            session,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.address(), config.session_config())
            .with_connect_timeout(config.connect_timeout()))
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session
    }

    /// Open a new connection and wrap it in a session
    pub async fn connect(&self) -> Result<WyomingSession<TcpStream>> {
        debug!("Connecting to Wyoming server at {}", self.address);

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| {
                WyomingError::connection(format!(
                    "Timed out after {:?} connecting to {}",
                    self.connect_timeout, self.address
                ))
            })?
            .map_err(|e| {
                WyomingError::connection(format!("Failed to connect to {}: {}", self.address, e))
            })?;

        // Headers are small and each one is followed by a wait; don't batch them
        stream
            .set_nodelay(true)
            .map_err(|e| WyomingError::connection(format!("Failed to configure socket: {}", e)))?;

        let session = WyomingSession::new(stream, self.session.clone());
        info!("Connected to {} (session {})", self.address, session.id());
        Ok(session)
    }

    /// Query server capabilities on a fresh connection
    pub async fn describe(&self) -> Result<ServiceInfo> {
        let mut session = self.connect().await?;
        let info = session.describe().await?;
        close_quietly(session).await;
        Ok(info)
    }

    /// Load a WAV file, convert it to the session format and transcribe it
    pub async fn transcribe_file(&self, path: impl AsRef<Path>) -> Result<Transcript> {
        let audio = AudioFile::open(path)?;
        let pcm = audio.to_pcm(self.session.audio_format)?;
        self.transcribe(&pcm).await
    }
}

#[async_trait::async_trait]
impl Transcriber for WyomingClient {
    fn audio_format(&self) -> AudioFormat {
        self.session.audio_format
    }

    async fn transcribe(&self, pcm: &[u8]) -> Result<Transcript> {
        let mut session = self.connect().await?;
        let transcript = session.transcribe(pcm).await?;
        close_quietly(session).await;
        Ok(transcript)
    }
}

/// The exchange already succeeded; a peer that hung up first is not an error
async fn close_quietly(session: WyomingSession<TcpStream>) {
    let id = session.id();
    if let Err(e) = session.close().await {
        debug!("Session {}: {}", id, e);
    }
}
