//! # Inference Adapter
//!
//! Sends the user's turn to a Gemini text model and returns plain reply text.
//!
//! ## Prompt layout:
//! - **System instruction**: Fixed style constraint (concise, no markup)
//! - **Turn 1**: The user's message as a text part
//! - **Turn 2** (only with a held image): The image prompt plus the image as
//!   base64 inline data
//!
//! Every text part of the reply is concatenated in the order it was emitted.

use super::generative::{Content, GenerateContentRequest, GenerativeClient, Part};
use super::LanguageModel;
use crate::config::InferenceConfig;
use crate::error::{RelayError, RelayResult};
use async_trait::async_trait;
use base64::Engine;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct GeminiModel {
    client: GenerativeClient,
    model: String,
    system_instruction: String,
    image_prompt: String,
    image_mime_type: String,
}

impl GeminiModel {
    pub fn new(config: &InferenceConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: GenerativeClient::new(&config.base_url, &config.api_key, config.request_timeout_secs)?,
            model: config.model.clone(),
            system_instruction: config.system_instruction.clone(),
            image_prompt: config.image_prompt.clone(),
            image_mime_type: config.image_mime_type.clone(),
        })
    }

    /// Compose the request for one user turn.
    pub fn build_request(&self, image: Option<&[u8]>, text: &str) -> GenerateContentRequest {
        let mut contents = vec![Content::user(vec![Part::text(text)])];

        if let Some(image) = image {
            let encoded = base64::engine::general_purpose::STANDARD.encode(image);
            contents.push(Content::user(vec![
                Part::text(&self.image_prompt),
                Part::inline(&self.image_mime_type, encoded),
            ]));
        }

        GenerateContentRequest {
            system_instruction: Some(Content::system(&self.system_instruction)),
            contents,
            generation_config: None,
        }
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    async fn infer(&self, image: Option<&[u8]>, text: &str) -> RelayResult<String> {
        let started = Instant::now();
        let request = self.build_request(image, text);
        debug!(
            model = %self.model,
            turns = request.contents.len(),
            image_bytes = image.map(|i| i.len()).unwrap_or(0),
            "Sending inference request"
        );

        let response = self
            .client
            .generate(&self.model, &request)
            .await
            .map_err(RelayError::Inference)?;

        let parts = response
            .parts()
            .ok_or_else(|| RelayError::Inference(response.empty_reason()))?;

        let mut texts = parts.iter().filter_map(|p| p.text.as_deref()).peekable();
        if texts.peek().is_none() {
            return Err(RelayError::Inference("response contained no text".to_string()));
        }
        let reply: String = texts.collect();

        info!(
            model = %self.model,
            chars = reply.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Inference completed"
        );
        Ok(reply)
    }
}
