//! # Remote Services
//!
//! Adapters for the three hosted models the relay depends on. Each adapter is
//! reached through a trait so the session logic can be exercised with scripted
//! stand-ins and a different vendor can be slotted in without touching it.
//!
//! ## Key Components:
//! - **Transcriber**: Audio bytes in, transcript out (upload, create job, poll)
//! - **LanguageModel**: Prompt text plus optional image in, reply text out
//! - **SpeechSynthesizer**: Reply text in, playable WAV out
//!
//! ## Vendors:
//! - `transcription`: AssemblyAI-style REST API
//! - `inference` / `synthesis`: Gemini `generateContent`, sharing the wire
//!   types and HTTP plumbing in `generative`

pub mod generative;
pub mod inference;
pub mod synthesis;
pub mod transcription;

pub use inference::GeminiModel;
pub use synthesis::GeminiSpeech;
pub use transcription::AssemblyAiTranscriber;

use crate::error::RelayResult;
use async_trait::async_trait;

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Turn one complete utterance into text. An empty transcript is valid.
    async fn transcribe(&self, audio: Vec<u8>) -> RelayResult<String>;
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Answer `text`, describing `image` as additional context when present.
    async fn infer(&self, image: Option<&[u8]>, text: &str) -> RelayResult<String>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak `text`. Returns a framed (WAV) buffer, never raw PCM.
    async fn synthesize(&self, text: &str) -> RelayResult<Vec<u8>>;
}

/// Build the shared reqwest client used by an adapter.
pub(crate) fn http_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .user_agent(concat!("vision-voice-relay/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Turn a non-2xx response into a message carrying status and body.
pub(crate) async fn describe_failure(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body)
    }
}

/// Fake vendor servers for adapter tests.
#[cfg(test)]
pub(crate) mod fake {
    use actix_web::{web, App, HttpServer};

    /// Start an actix server on an ephemeral port and return its base URL.
    ///
    /// Must be called from inside an actix system (`#[actix_web::test]`).
    pub fn serve<F>(configure: F) -> String
    where
        F: Fn(&mut web::ServiceConfig) + Send + Clone + 'static,
    {
        let server = HttpServer::new(move || App::new().configure(configure.clone()))
            .workers(1)
            .bind(("127.0.0.1", 0))
            .expect("bind fake vendor");
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        format!("http://{}", addr)
    }
}
