//! Text-to-speech through a Gemini TTS model.
//!
//! The model answers with base64 headerless PCM; this adapter decodes it and
//! frames it as WAV so nothing downstream ever handles raw samples.

use super::generative::{Content, GenerateContentRequest, GenerationConfig, GenerativeClient, Part};
use super::SpeechSynthesizer;
use crate::audio::{frame_pcm, AudioFormat};
use crate::config::SynthesisConfig;
use crate::error::{RelayError, RelayResult};
use async_trait::async_trait;
use base64::Engine;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone)]
pub struct GeminiSpeech {
    client: GenerativeClient,
    model: String,
    voice: String,
}

impl GeminiSpeech {
    pub fn new(config: &SynthesisConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: GenerativeClient::new(&config.base_url, &config.api_key, config.request_timeout_secs)?,
            model: config.model.clone(),
            voice: config.voice.clone(),
        })
    }

    fn build_request(&self, text: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: None,
            contents: vec![Content::user(vec![Part::text(text)])],
            generation_config: Some(GenerationConfig::speech(&self.voice)),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiSpeech {
    async fn synthesize(&self, text: &str) -> RelayResult<Vec<u8>> {
        let started = Instant::now();
        let response = self
            .client
            .generate(&self.model, &self.build_request(text))
            .await
            .map_err(RelayError::Synthesis)?;

        let encoded = response
            .parts()
            .and_then(|parts| parts.iter().find_map(|p| p.inline_data.as_ref()))
            .map(|inline| inline.data.as_str())
            .ok_or_else(|| RelayError::Synthesis("response contained no audio".to_string()))?;

        let pcm = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| RelayError::Synthesis(format!("audio payload is not base64: {}", e)))?;

        if pcm.is_empty() {
            return Err(RelayError::Synthesis("audio payload is empty".to_string()));
        }

        let wav = frame_pcm(&pcm, AudioFormat::SPEECH)?;
        info!(
            voice = %self.voice,
            pcm_bytes = pcm.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Speech synthesized"
        );
        Ok(wav)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::remote::fake;
    use actix_web::{web, HttpResponse};
    use serde_json::json;
    use std::io::Cursor;

    fn speech_at(base_url: &str) -> GeminiSpeech {
        let mut config = AppConfig::default().synthesis;
        config.base_url = base_url.to_string();
        config.api_key = "gm-key".to_string();
        GeminiSpeech::new(&config).unwrap()
    }

    fn vendor(reply: serde_json::Value) -> String {
        fake::serve(move |cfg| {
            let reply = reply.clone();
            cfg.route(
                "/v1beta/models/{call}",
                web::post().to(move |body: web::Json<serde_json::Value>| {
                    let reply = reply.clone();
                    async move {
                        assert_eq!(body["generationConfig"]["responseModalities"][0], "AUDIO");
                        assert_eq!(body["contents"][0]["parts"][0]["text"], "4.");
                        HttpResponse::Ok().json(reply)
                    }
                }),
            );
        })
    }

    #[actix_web::test]
    async fn test_pcm_is_returned_as_wav() {
        let pcm: Vec<u8> = (0..480u16).flat_map(|s| (s as i16 * 10).to_le_bytes()).collect();
        let encoded = base64::engine::general_purpose::STANDARD.encode(&pcm);
        let base = vendor(json!({ "candidates": [{ "content": { "parts": [
            { "inlineData": { "mimeType": "audio/L16;codec=pcm;rate=24000", "data": encoded } }
        ]}}]}));

        let wav = speech_at(&base).synthesize("4.").await.unwrap();

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 24000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.len(), 480);
    }

    #[actix_web::test]
    async fn test_missing_audio_is_synthesis_error() {
        let base = vendor(json!({ "candidates": [{ "content": { "parts": [{ "text": "no audio" }] }}]}));

        let err = speech_at(&base).synthesize("4.").await.unwrap_err();
        assert_eq!(err, RelayError::Synthesis("response contained no audio".to_string()));
    }

    #[actix_web::test]
    async fn test_odd_pcm_length_is_encoding_error() {
        let encoded = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3]);
        let base = vendor(json!({ "candidates": [{ "content": { "parts": [
            { "inlineData": { "mimeType": "audio/L16", "data": encoded } }
        ]}}]}));

        let err = speech_at(&base).synthesize("4.").await.unwrap_err();
        assert!(matches!(err, RelayError::Encoding(_)));
    }
}
