//! # Session Events
//!
//! Messages exchanged with a device over its WebSocket.
//!
//! ## Message Format:
//! Every JSON message is `{"event": <name>, "data": <payload>}`:
//! - **Device → Server**: `audio_full`, `image_chunk`, `text_message`, `clear_image`
//! - **Server → Device**: `ai_response`, `error`, `image_received`, `image_cleared`
//!
//! Binary payloads travel as base64 strings inside JSON. Devices that would
//! rather not pay for base64 can send a binary frame instead, whose first byte
//! names the event:
//! - `0x01`: `audio_full`, rest of the frame is the audio
//! - `0x02`: `image_chunk`, more chunks follow
//! - `0x03`: `image_chunk`, final chunk

use crate::error::ErrorKind;
use base64::Engine;
use serde::{Deserialize, Serialize};

pub const BINARY_AUDIO_FULL: u8 = 0x01;
pub const BINARY_IMAGE_CHUNK: u8 = 0x02;
pub const BINARY_IMAGE_LAST: u8 = 0x03;

/// Events a device sends. Disconnect is not an event, it is the end of the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    /// One complete utterance
    AudioFull(#[serde(with = "base64_bytes")] Vec<u8>),
    /// One fragment of an image
    ImageChunk(ImageChunk),
    /// A typed user turn
    TextMessage(String),
    /// Forget the held image
    ClearImage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageChunk {
    #[serde(with = "base64_bytes")]
    pub chunk: Vec<u8>,
    #[serde(rename = "isLast", default)]
    pub is_last: bool,
}

/// Events the relay sends back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    AiResponse {
        text: String,
        /// Base64 WAV
        audio: String,
        timestamp: i64,
    },
    Error {
        #[serde(rename = "type")]
        kind: ErrorKind,
        message: String,
    },
    ImageReceived {
        size: usize,
        timestamp: i64,
    },
    ImageCleared,
}

impl OutboundEvent {
    pub fn ai_response(text: String, wav: &[u8]) -> Self {
        OutboundEvent::AiResponse {
            text,
            audio: base64::engine::general_purpose::STANDARD.encode(wav),
            timestamp: now_millis(),
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        OutboundEvent::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn image_received(size: usize) -> Self {
        OutboundEvent::ImageReceived {
            size,
            timestamp: now_millis(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::AiResponse { .. } => "ai_response",
            OutboundEvent::Error { .. } => "error",
            OutboundEvent::ImageReceived { .. } => "image_received",
            OutboundEvent::ImageCleared => "image_cleared",
        }
    }
}

/// A frame that could not be turned into an [`InboundEvent`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    pub kind: ErrorKind,
    pub message: String,
    /// The frame claimed to be the terminal chunk of an image.
    pub last_chunk: bool,
}

impl DecodeError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            last_chunk: false,
        }
    }

    /// A broken `image_chunk` invalidates the upload it belongs to.
    pub fn aborts_upload(&self) -> bool {
        self.kind == ErrorKind::ImageUpload
    }

    pub fn into_event(self) -> OutboundEvent {
        OutboundEvent::error(self.kind, self.message)
    }
}

/// Tag a failure with the event the device was trying to send.
fn kind_for_event(name: Option<&str>) -> ErrorKind {
    match name {
        Some("audio_full") => ErrorKind::FullAudio,
        Some("image_chunk") => ErrorKind::ImageUpload,
        _ => ErrorKind::TextProcessing,
    }
}

impl InboundEvent {
    /// Parse a JSON text frame.
    pub fn from_text(text: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| DecodeError::new(ErrorKind::TextProcessing, format!("invalid JSON: {}", e)))?;

        let kind = kind_for_event(value.get("event").and_then(|v| v.as_str()));
        let last_chunk = value
            .pointer("/data/isLast")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        serde_json::from_value(value).map_err(|e| DecodeError {
            last_chunk,
            ..DecodeError::new(kind, format!("invalid message: {}", e))
        })
    }

    /// Parse a binary frame (kind byte + payload).
    pub fn from_binary(frame: &[u8]) -> Result<Self, DecodeError> {
        let (kind, payload) = frame
            .split_first()
            .ok_or_else(|| DecodeError::new(ErrorKind::TextProcessing, "empty binary frame"))?;

        match *kind {
            BINARY_AUDIO_FULL => Ok(InboundEvent::AudioFull(payload.to_vec())),
            BINARY_IMAGE_CHUNK | BINARY_IMAGE_LAST => Ok(InboundEvent::ImageChunk(ImageChunk {
                chunk: payload.to_vec(),
                is_last: *kind == BINARY_IMAGE_LAST,
            })),
            other => Err(DecodeError::new(
                ErrorKind::TextProcessing,
                format!("unknown binary frame kind 0x{:02x}", other),
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::AudioFull(_) => "audio_full",
            InboundEvent::ImageChunk(_) => "image_chunk",
            InboundEvent::TextMessage(_) => "text_message",
            InboundEvent::ClearImage => "clear_image",
        }
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Serde adapter for byte buffers carried as standard base64.
mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)
    }
}
