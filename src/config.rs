use crate::error::{Result, WyomingError};
use crate::protocol::{AudioFormat, TranscribeOptions};
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default config file, resolved relative to the working directory (extension optional)
pub const DEFAULT_CONFIG_PATH: &str = "config/wyoming-client";

/// Environment variables `WYOMING__<SECTION>__<KEY>` override file values
pub const ENV_PREFIX: &str = "WYOMING";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub chunk_size: usize,
    pub response_timeout_secs: u64,
    pub language: Option<String>,
    pub model: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 10300,
            connect_timeout_secs: 5,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            response_timeout_secs: 60,
            language: None,
            model: None,
        }
    }
}

impl Config {
    /// Load from a config file that must exist, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::build(path.as_ref(), true)
    }

    /// Load from `DEFAULT_CONFIG_PATH` if present, then apply environment overrides
    pub fn load_default() -> Result<Self> {
        Self::build(Path::new(DEFAULT_CONFIG_PATH), false)
    }

    fn build(path: &Path, required: bool) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path.to_string_lossy()).required(required))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(invalid("server.host", "must not be empty"));
        }
        if self.server.connect_timeout_secs == 0 {
            return Err(invalid("server.connect_timeout_secs", "must be greater than zero"));
        }
        if self.transcription.chunk_size == 0 {
            return Err(invalid("transcription.chunk_size", "must be greater than zero"));
        }
        if self.transcription.response_timeout_secs == 0 {
            return Err(invalid(
                "transcription.response_timeout_secs",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// `host:port` of the transcription server
    pub fn address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.server.connect_timeout_secs)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            chunk_size: self.transcription.chunk_size,
            response_timeout: Duration::from_secs(self.transcription.response_timeout_secs),
            audio_format: AudioFormat::default(),
            transcribe: TranscribeOptions {
                name: self.transcription.model.clone(),
                language: self.transcription.language.clone(),
            },
        }
    }
}

fn invalid(key: &str, message: &str) -> WyomingError {
    WyomingError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
