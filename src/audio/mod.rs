//! Audio processing: capture, PCM codec, resampling, playback scheduling

pub mod capture;
pub mod codec;
pub mod playback;
pub mod resample;

pub use capture::CaptureFeed;
pub use codec::{
    AudioFrame, CAPTURE_MIME_TYPE, CAPTURE_SAMPLE_RATE, EncodedChunk, InboundAudioPacket,
    PLAYBACK_SAMPLE_RATE, decode_chunk, encode_frame, samples_to_wav,
};
pub use playback::{PlaybackHandle, PlaybackScheduler};
pub use resample::Resampler;
