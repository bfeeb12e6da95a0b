//! # Configuration Management
//!
//! This module handles loading the relay configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Converts between the config structs and TOML/environment data
//! - **derive macros**: Generate Debug, Clone, Serialize, Deserialize
//! - **impl blocks**: Methods to load, validate and derive runtime values
//! - **Result<T, E>**: Loading and validation fail loudly at startup, never later
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Platform and credential variables (HOST, PORT, ASSEMBLYAI_API_KEY, GEMINI_API_KEY)
//! 2. Environment variables (APP_SERVER__PORT, APP_TRANSCRIPTION__POLL_INTERVAL_MS, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Each remote service gets its own section so base URLs, keys and timeouts
/// can be pointed at a different vendor (or a local fake) independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub transcription: TranscriptionConfig,
    pub inference: InferenceConfig,
    pub synthesis: SynthesisConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind to ("127.0.0.1", "0.0.0.0")
/// - `port`: TCP port to listen on
/// - `max_frame_bytes`: Largest WebSocket message accepted, full utterances and
///   image chunks arrive as single messages so this is large (50 MiB)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_frame_bytes: usize,
}

/// Per-connection behaviour.
///
/// ## Fields:
/// - `heartbeat_interval_secs`: How often the server pings the device
/// - `client_timeout_secs`: Silence after which the connection is dropped
/// - `max_image_bytes`: Upper bound for one reassembled image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
    pub max_image_bytes: usize,
}

/// Remote transcription service settings.
///
/// ## Polling:
/// Jobs are polled every `poll_interval_ms` and abandoned after
/// `max_poll_attempts` non-terminal answers (defaults: 3 s, 100 attempts = 5 minutes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub base_url: String,
    pub api_key: String,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub request_timeout_secs: u64,
}

/// Remote language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Style constraint sent with every request
    pub system_instruction: String,
    /// Instruction paired with the held image in the second turn
    pub image_prompt: String,
    pub image_mime_type: String,
    pub request_timeout_secs: u64,
}

/// Remote speech synthesis settings.
///
/// The audio format is not configurable: the speech model always returns
/// mono 24 kHz 16-bit PCM (`AudioFormat::SPEECH`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                max_frame_bytes: 50 * 1024 * 1024,
            },
            session: SessionConfig {
                heartbeat_interval_secs: 30,
                client_timeout_secs: 60,
                max_image_bytes: 20 * 1024 * 1024,
            },
            transcription: TranscriptionConfig {
                base_url: "https://api.assemblyai.com".to_string(),
                api_key: String::new(),
                poll_interval_ms: 3000,
                max_poll_attempts: 100,
                request_timeout_secs: 60,
            },
            inference: InferenceConfig {
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                api_key: String::new(),
                model: "gemini-2.0-flash".to_string(),
                system_instruction: "You are a helpful voice assistant. Answer concisely in plain \
                                     spoken sentences. Do not use markdown, lists or any markup."
                    .to_string(),
                image_prompt: "describe this image in detail".to_string(),
                image_mime_type: "image/jpeg".to_string(),
                request_timeout_secs: 60,
            },
            synthesis: SynthesisConfig {
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                api_key: String::new(),
                model: "gemini-2.5-flash-preview-tts".to_string(),
                voice: "Kore".to_string(),
                request_timeout_secs: 60,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_ (sections split by `__`)
    /// 4. Handle deployment variables (HOST, PORT) and vendor credentials
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_TRANSCRIPTION__MAX_POLL_ATTEMPTS=20`: Shorter transcription budget
    /// - `GEMINI_API_KEY=...`: Key for both inference and synthesis
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(key) = env::var("ASSEMBLYAI_API_KEY") {
            settings = settings.set_override("transcription.api_key", key)?;
        }

        if let Ok(key) = env::var("GEMINI_API_KEY") {
            settings = settings
                .set_override("inference.api_key", key.clone())?
                .set_override("synthesis.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0 and frames can carry a payload
    /// - The transcription poll loop has a non-zero interval and a finite budget
    /// - Model names are present
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.max_frame_bytes == 0 {
            return Err(anyhow::anyhow!("Max frame size must be greater than 0"));
        }

        if self.session.max_image_bytes == 0 {
            return Err(anyhow::anyhow!("Max image size must be greater than 0"));
        }

        if self.session.heartbeat_interval_secs == 0
            || self.session.client_timeout_secs <= self.session.heartbeat_interval_secs
        {
            return Err(anyhow::anyhow!(
                "Client timeout must be longer than a non-zero heartbeat interval"
            ));
        }

        if self.transcription.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("Transcription poll interval must be greater than 0"));
        }

        if self.transcription.max_poll_attempts == 0 {
            return Err(anyhow::anyhow!("Transcription poll attempts must be greater than 0"));
        }

        if self.inference.model.trim().is_empty() || self.synthesis.model.trim().is_empty() {
            return Err(anyhow::anyhow!("Inference and synthesis models must be named"));
        }

        Ok(())
    }

    /// Keys are optional at startup so the server can run for health checks
    /// alone, but a relay without them can only answer with errors.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.transcription.api_key.is_empty() {
            missing.push("transcription.api_key");
        }
        if self.inference.api_key.is_empty() {
            missing.push("inference.api_key");
        }
        if self.synthesis.api_key.is_empty() {
            missing.push("synthesis.api_key");
        }
        missing
    }
}

impl TranscriptionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl SessionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that the default configuration is valid and has expected values.
    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_frame_bytes, 50 * 1024 * 1024);
        assert_eq!(config.transcription.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.synthesis.voice, "Kore");
        assert!(config.validate().is_ok());
    }

    /// Test that validation catches invalid configurations.
    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.transcription.max_poll_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.synthesis.model = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.session.client_timeout_secs = config.session.heartbeat_interval_secs;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_credentials_reported() {
        let mut config = AppConfig::default();
        assert_eq!(config.missing_credentials().len(), 3);

        config.transcription.api_key = "aai".to_string();
        config.inference.api_key = "gm".to_string();
        config.synthesis.api_key = "gm".to_string();
        assert!(config.missing_credentials().is_empty());
    }
}
