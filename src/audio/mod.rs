//! # Audio Module
//!
//! Audio handling on the outbound path. Speech arrives from the synthesis
//! service as headerless PCM and leaves the relay as a WAV file.
//!
//! ## Key Components:
//! - **Framer**: Wraps PCM with a RIFF/WAVE header (channels, rate, depth, length)
//!
//! Inbound audio (`audio_full`) is not touched here; it is forwarded to the
//! transcription service byte for byte.

pub mod framer;

pub use framer::{frame_pcm, AudioFormat};
