//! # Response Pipeline
//!
//! One user turn becomes one reply: transcribe (audio turns only), infer with
//! the image captured when the turn was admitted, synthesize.
//!
//! The pipeline holds no per-connection state. One instance is shared by
//! every connection; what differs per turn is passed in.

use crate::error::{ErrorKind, RelayResult};
use crate::remote::{LanguageModel, SpeechSynthesizer, Transcriber};
use crate::session::events::OutboundEvent;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What the device asked.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    Audio(Vec<u8>),
    Text(String),
}

impl Turn {
    /// Error tag used when this turn fails.
    pub fn origin(&self) -> ErrorKind {
        match self {
            Turn::Audio(_) => ErrorKind::FullAudio,
            Turn::Text(_) => ErrorKind::TextProcessing,
        }
    }
}

/// A finished reply: the text and its spoken form as WAV.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub audio: Vec<u8>,
}

pub struct Pipeline {
    transcriber: Arc<dyn Transcriber>,
    model: Arc<dyn LanguageModel>,
    voice: Arc<dyn SpeechSynthesizer>,
}

impl Pipeline {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        model: Arc<dyn LanguageModel>,
        voice: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            transcriber,
            model,
            voice,
        }
    }

    /// Run every stage in order, stopping at the first failure.
    pub async fn run(&self, turn: Turn, image: Option<Arc<[u8]>>) -> RelayResult<Reply> {
        let prompt = match turn {
            Turn::Audio(audio) => self.transcriber.transcribe(audio).await?,
            Turn::Text(text) => text,
        };
        debug!(chars = prompt.len(), with_image = image.is_some(), "Prompt ready");

        let text = self.model.infer(image.as_deref(), &prompt).await?;
        let audio = self.voice.synthesize(&text).await?;

        Ok(Reply { text, audio })
    }

    /// Run the turn and turn the outcome into the event the device receives.
    pub async fn respond(&self, connection_id: Uuid, turn: Turn, image: Option<Arc<[u8]>>) -> OutboundEvent {
        let origin = turn.origin();
        let started = Instant::now();

        match self.run(turn, image).await {
            Ok(reply) => {
                info!(
                    connection_id = %connection_id,
                    chars = reply.text.len(),
                    audio_bytes = reply.audio.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Pipeline completed"
                );
                OutboundEvent::ai_response(reply.text, &reply.audio)
            }
            Err(err) => {
                let kind = err.kind_for(origin);
                warn!(
                    connection_id = %connection_id,
                    error_type = kind.as_str(),
                    error = %err,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Pipeline failed"
                );
                OutboundEvent::error(kind, err.to_string())
            }
        }
    }
}
