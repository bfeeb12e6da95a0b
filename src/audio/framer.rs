//! # WAV Framing
//!
//! Turns headerless PCM, as returned by the speech synthesis service, into a
//! self-describing WAV file a device can hand straight to its audio decoder.
//!
//! ## Format Requirements:
//! - **Encoding**: Little-endian signed integers (8-bit PCM is unsigned, as WAV defines it)
//! - **Bit depths**: 8, 16, 24 and 32
//! - **Layout**: Interleaved channels
//!
//! Everything happens in memory. The output buffer is only returned once the
//! writer has finalized the header, so a caller never sees a half-written file.

use crate::error::{RelayError, RelayResult};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use tracing::debug;

/// Describes headerless PCM that only the caller knows the shape of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_depth: u16,
}

impl AudioFormat {
    /// Mono, 24 kHz, 16-bit: what the speech model produces.
    pub const SPEECH: AudioFormat = AudioFormat {
        channels: 1,
        sample_rate: 24000,
        bit_depth: 16,
    };

    pub fn new(channels: u16, sample_rate: u32, bit_depth: u16) -> Self {
        Self {
            channels,
            sample_rate,
            bit_depth,
        }
    }

    /// Bytes occupied by one sample of one channel.
    pub fn bytes_per_sample(&self) -> usize {
        (self.bit_depth as usize).div_ceil(8)
    }

    fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bit_depth,
            sample_format: hound::SampleFormat::Int,
        }
    }
}

/// Wrap `pcm` in a WAV container described by `format`.
///
/// ## Errors:
/// - `Encoding` if the format is not writable (no channels, unsupported depth)
/// - `Encoding` if the byte count does not divide into whole samples
/// - `Encoding` if the writer refuses the data, e.g. the last frame is
///   missing samples for some channels
pub fn frame_pcm(pcm: &[u8], format: AudioFormat) -> RelayResult<Vec<u8>> {
    if format.channels == 0 || format.sample_rate == 0 {
        return Err(RelayError::Encoding(format!(
            "invalid audio format: {} channels at {} Hz",
            format.channels, format.sample_rate
        )));
    }

    let bytes_per_sample = format.bytes_per_sample();
    if pcm.len() % bytes_per_sample != 0 {
        return Err(RelayError::Encoding(format!(
            "{} bytes is not a whole number of {}-bit samples",
            pcm.len(),
            format.bit_depth
        )));
    }

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 64));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, format.wav_spec())
            .map_err(|e| RelayError::Encoding(e.to_string()))?;

        write_samples(&mut writer, pcm, format.bit_depth)?;

        // finalize() rewrites the RIFF and data sizes; only after it succeeds
        // does the buffer hold a complete file.
        writer
            .finalize()
            .map_err(|e| RelayError::Encoding(e.to_string()))?;
    }

    let framed = cursor.into_inner();
    debug!(
        pcm_bytes = pcm.len(),
        wav_bytes = framed.len(),
        channels = format.channels,
        sample_rate = format.sample_rate,
        bit_depth = format.bit_depth,
        "Framed PCM as WAV"
    );
    Ok(framed)
}

fn write_samples<W>(writer: &mut hound::WavWriter<W>, pcm: &[u8], bit_depth: u16) -> RelayResult<()>
where
    W: std::io::Write + std::io::Seek,
{
    let encoding = |e: hound::Error| RelayError::Encoding(e.to_string());
    let mut reader = Cursor::new(pcm);

    match bit_depth {
        8 => {
            // 8-bit WAV is unsigned; hound takes i8 and adds the offset back.
            for &byte in pcm {
                writer.write_sample((byte as i16 - 128) as i8).map_err(encoding)?;
            }
        }
        16 => {
            while let Ok(sample) = reader.read_i16::<LittleEndian>() {
                writer.write_sample(sample).map_err(encoding)?;
            }
        }
        24 => {
            while let Ok(sample) = reader.read_i24::<LittleEndian>() {
                writer.write_sample(sample).map_err(encoding)?;
            }
        }
        32 => {
            while let Ok(sample) = reader.read_i32::<LittleEndian>() {
                writer.write_sample(sample).map_err(encoding)?;
            }
        }
        other => {
            return Err(RelayError::Encoding(format!("unsupported bit depth {}", other)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_pcm(samples: usize) -> Vec<u8> {
        let mut pcm = Vec::with_capacity(samples * 2);
        for i in 0..samples {
            let sample = ((i as f32 * 0.05).sin() * 12000.0) as i16;
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
        pcm
    }

    /// Offset of the first payload byte, found by walking to the `data` chunk.
    fn data_offset(wav: &[u8]) -> usize {
        let pos = wav
            .windows(4)
            .position(|w| w == b"data")
            .expect("data chunk present");
        pos + 8
    }

    #[test]
    fn test_speech_format_round_trip() {
        let pcm = synthetic_pcm(2400);
        let wav = frame_pcm(&pcm, AudioFormat::SPEECH).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let reader = hound::WavReader::new(Cursor::new(wav.clone())).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 24000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len() as usize, pcm.len() / 2);

        let offset = data_offset(&wav);
        assert_eq!(&wav[offset..], pcm.as_slice());
    }

    #[test]
    fn test_empty_payload_produces_header_only() {
        let wav = frame_pcm(&[], AudioFormat::SPEECH).unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav.clone())).unwrap();
        assert_eq!(reader.len(), 0);
        assert_eq!(data_offset(&wav), wav.len());
    }

    #[test]
    fn test_odd_byte_count_is_rejected() {
        let result = frame_pcm(&[0u8; 7], AudioFormat::SPEECH);
        assert!(matches!(result, Err(RelayError::Encoding(_))));
    }

    #[test]
    fn test_incomplete_stereo_frame_is_rejected() {
        // Three 16-bit samples cannot fill whole stereo frames.
        let result = frame_pcm(&[0u8; 6], AudioFormat::new(2, 24000, 16));
        assert!(matches!(result, Err(RelayError::Encoding(_))));
    }

    #[test]
    fn test_unsupported_depth_is_rejected() {
        let result = frame_pcm(&[0u8; 4], AudioFormat::new(1, 24000, 12));
        assert!(matches!(result, Err(RelayError::Encoding(_))));
    }

    #[test]
    fn test_eight_bit_payload_is_preserved() {
        let pcm: Vec<u8> = (0..=255u8).collect();
        let wav = frame_pcm(&pcm, AudioFormat::new(1, 8000, 8)).unwrap();
        let offset = data_offset(&wav);
        assert_eq!(&wav[offset..], pcm.as_slice());
    }
}
