//! # Error Handling
//!
//! This module defines the failure taxonomy of the relay pipeline and how each
//! failure is turned into the `error` event a device receives.
//!
//! ## Key Rust Concepts for Error Handling:
//!
//! ### Result<T, E> Type
//! - **Purpose**: Every pipeline stage returns `Result<T, RelayError>`
//! - **`?` operator**: A failing stage ends the pipeline early, the caller decides what to report
//!
//! ### Enums for Error Types
//! - **Variants**: One variant per stage (upload, transcription, inference, synthesis, encoding)
//! - **Data**: Each variant carries the human-readable message that reaches the client
//!
//! ### thiserror
//! - **#[derive(Error)]**: Generates `Display` and `std::error::Error` from the `#[error(...)]` attributes
//!
//! ## Error tags:
//! The device never sees a Rust type name. It sees a stable `type` string
//! (`busy`, `full_audio`, `image_upload`, `text_processing`) chosen from the
//! event that triggered the work, plus the message of the failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures raised while serving one inbound event.
///
/// ## Error Categories:
/// - **Upload**: The audio could not be handed to the transcription store
/// - **Transcription**: The transcription job ended in the vendor's `error` state
/// - **TranscriptionTimeout**: The job never reached a terminal state within the poll budget
/// - **Inference**: The language model call failed or produced no text at all
/// - **Synthesis**: The speech model call failed or returned no audio payload
/// - **Encoding**: The WAV writer rejected the sample data
/// - **ImageUpload**: A chunk could not be decoded or the image grew past its cap
/// - **Busy**: Admission control signal, a pipeline is already running
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RelayError {
    #[error("audio upload failed: {0}")]
    Upload(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("transcription did not finish after {attempts} polls")]
    TranscriptionTimeout { attempts: u32 },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("audio encoding failed: {0}")]
    Encoding(String),

    #[error("image upload failed: {0}")]
    ImageUpload(String),

    #[error("a request is already being processed")]
    Busy,
}

/// Stable error tags sent to the device in the `error` event.
///
/// ## Serialization:
/// `#[serde(rename_all = "snake_case")]` turns `FullAudio` into `"full_audio"`,
/// which is the exact string the device firmware switches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Admission rejected, the session already has a pipeline in flight
    Busy,
    /// Something failed while handling an `audio_full` event
    FullAudio,
    /// Something failed while handling an `image_chunk` event
    ImageUpload,
    /// Something failed while handling a `text_message` event
    TextProcessing,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Busy => "busy",
            ErrorKind::FullAudio => "full_audio",
            ErrorKind::ImageUpload => "image_upload",
            ErrorKind::TextProcessing => "text_processing",
        }
    }
}

impl RelayError {
    /// Pick the tag reported to the device.
    ///
    /// `Busy` and `ImageUpload` always carry their own tag; every other failure
    /// is reported under the tag of the event that started the pipeline, so a
    /// failed inference after an audio turn is still a `full_audio` error.
    pub fn kind_for(&self, origin: ErrorKind) -> ErrorKind {
        match self {
            RelayError::Busy => ErrorKind::Busy,
            RelayError::ImageUpload(_) => ErrorKind::ImageUpload,
            _ => origin,
        }
    }
}

/// Results produced by the pipeline stages.
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_origin() {
        let err = RelayError::Inference("model unavailable".to_string());
        assert_eq!(err.kind_for(ErrorKind::FullAudio), ErrorKind::FullAudio);
        assert_eq!(err.kind_for(ErrorKind::TextProcessing), ErrorKind::TextProcessing);
    }

    #[test]
    fn test_busy_and_image_keep_their_tag() {
        assert_eq!(RelayError::Busy.kind_for(ErrorKind::FullAudio), ErrorKind::Busy);
        let err = RelayError::ImageUpload("bad base64".to_string());
        assert_eq!(err.kind_for(ErrorKind::TextProcessing), ErrorKind::ImageUpload);
    }

    #[test]
    fn test_error_tags_serialize_as_snake_case() {
        assert_eq!(serde_json::to_string(&ErrorKind::FullAudio).unwrap(), "\"full_audio\"");
        assert_eq!(serde_json::to_string(&ErrorKind::TextProcessing).unwrap(), "\"text_processing\"");
        assert_eq!(ErrorKind::ImageUpload.as_str(), "image_upload");
    }

    #[test]
    fn test_timeout_message_mentions_attempts() {
        let err = RelayError::TranscriptionTimeout { attempts: 5 };
        assert_eq!(err.to_string(), "transcription did not finish after 5 polls");
    }
}
