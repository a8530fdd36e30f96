//! PCM sample codec
//!
//! Pure conversion between normalized f32 samples and the wire format the
//! speech model speaks: base64-encoded little-endian 16-bit linear PCM.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::{Error, Result};

/// Sample rate for captured audio sent to the model (uplink)
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Sample rate of synthesized audio received from the model (downlink)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Format descriptor attached to outbound chunks
pub const CAPTURE_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// One fixed-duration frame of raw microphone samples.
///
/// Samples are normalized to [-1.0, 1.0] and tagged with the rate they
/// were captured at, which is not necessarily the uplink rate.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Normalized mono samples
    pub samples: Vec<f32>,
    /// Rate the samples were captured at
    pub sample_rate: u32,
}

impl AudioFrame {
    /// Playing time of this frame
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// An encoded outbound payload, consumed exactly once by the session
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// Base64 of little-endian 16-bit PCM
    pub data: String,
    /// MIME-like format descriptor (e.g. `audio/pcm;rate=16000`)
    pub mime_type: String,
}

/// A decoded inbound audio buffer, consumed exactly once by the scheduler
#[derive(Debug, Clone)]
pub struct InboundAudioPacket {
    /// Normalized mono samples
    pub samples: Vec<f32>,
    /// Rate the model synthesized at
    pub sample_rate: u32,
}

impl InboundAudioPacket {
    /// Playing time of this packet
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Encode a frame of normalized samples for transmission.
///
/// Each sample maps to a signed 16-bit integer via `round(s * 32768)`,
/// saturating at the i16 boundary so out-of-range input never wraps.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode_frame(frame: &AudioFrame) -> EncodedChunk {
    let mut bytes = Vec::with_capacity(frame.samples.len() * 2);
    for &sample in &frame.samples {
        let value = (sample * 32768.0)
            .round()
            .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }

    EncodedChunk {
        data: STANDARD.encode(&bytes),
        mime_type: CAPTURE_MIME_TYPE.to_string(),
    }
}

/// Decode a base64 PCM payload into normalized samples.
///
/// # Errors
///
/// Returns `Error::MalformedPayload` if the base64 is invalid or the
/// decoded byte length is not a multiple of two. Empty input decodes to
/// an empty packet.
pub fn decode_chunk(data: &str, sample_rate: u32) -> Result<InboundAudioPacket> {
    let bytes = STANDARD
        .decode(data)
        .map_err(|e| Error::MalformedPayload(format!("invalid base64: {e}")))?;

    if bytes.len() % 2 != 0 {
        return Err(Error::MalformedPayload(format!(
            "odd PCM byte length: {}",
            bytes.len()
        )));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();

    Ok(InboundAudioPacket {
        samples,
        sample_rate,
    })
}

/// Convert f32 samples to WAV bytes (debug capture dumps)
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: Vec<f32>) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate: CAPTURE_SAMPLE_RATE,
        }
    }

    #[test]
    fn test_roundtrip_within_quantization_step() {
        let samples = vec![0.0, 0.25, -0.25, 0.9999, -1.0, 0.5];
        let chunk = encode_frame(&frame(samples.clone()));
        let decoded = decode_chunk(&chunk.data, CAPTURE_SAMPLE_RATE).unwrap();

        assert_eq!(decoded.samples.len(), samples.len());
        for (orig, got) in samples.iter().zip(&decoded.samples) {
            assert!(
                (orig - got).abs() <= 1.0 / 32768.0,
                "sample {orig} decoded as {got}"
            );
        }
    }

    #[test]
    fn test_encode_saturates_out_of_range() {
        let chunk = encode_frame(&frame(vec![2.0, -2.0, 1.0]));
        let decoded = decode_chunk(&chunk.data, CAPTURE_SAMPLE_RATE).unwrap();

        // +2.0 clamps to i16::MAX, -2.0 to i16::MIN; no wraparound
        assert!((decoded.samples[0] - (32767.0 / 32768.0)).abs() < 1e-6);
        assert!((decoded.samples[1] - (-1.0)).abs() < 1e-6);
        assert!(decoded.samples[2] > 0.99);
    }

    #[test]
    fn test_empty_input_is_not_an_error() {
        let chunk = encode_frame(&frame(Vec::new()));
        let decoded = decode_chunk(&chunk.data, PLAYBACK_SAMPLE_RATE).unwrap();
        assert!(decoded.samples.is_empty());
    }

    #[test]
    fn test_odd_byte_length_is_malformed() {
        let data = STANDARD.encode([0u8, 1, 2]);
        let err = decode_chunk(&data, PLAYBACK_SAMPLE_RATE).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(_)));
    }

    #[test]
    fn test_invalid_base64_is_malformed() {
        let err = decode_chunk("not base64!!!", PLAYBACK_SAMPLE_RATE).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(_)));
    }

    #[test]
    fn test_encode_is_deterministic() {
        let f = frame(vec![0.1, -0.2, 0.3]);
        assert_eq!(encode_frame(&f).data, encode_frame(&f).data);
    }

    #[test]
    fn test_mime_tag_carries_uplink_rate() {
        let chunk = encode_frame(&frame(vec![0.0]));
        assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");
    }

    #[test]
    fn test_packet_duration() {
        let packet = InboundAudioPacket {
            samples: vec![0.0; 2400],
            sample_rate: PLAYBACK_SAMPLE_RATE,
        };
        assert_eq!(packet.duration(), Duration::from_millis(100));
    }
}
