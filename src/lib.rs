//! UniConnect Voice - realtime voice client for the student assistant
//!
//! This library implements the voice streaming session: microphone
//! capture, PCM transcoding, a duplex streaming connection to the remote
//! speech model, and gapless playback of synthesized audio.
//!
//! # Architecture
//!
//! ```text
//! microphone ──▶ CaptureFeed ──▶ Resampler ──▶ SampleCodec(encode)
//!                                                      │
//!                                                      ▼
//!                                        StreamingSession (duplex WS)
//!                                                      │
//!                                                      ▼
//! speaker ◀── PlaybackScheduler ◀── SampleCodec(decode)
//! ```
//!
//! The `VoiceSessionController` owns the session state machine and is
//! the only place the pieces meet.

pub mod assistant;
pub mod audio;
pub mod config;
pub mod controller;
pub mod error;
pub mod live;
pub mod queue;

pub use assistant::{AssistantClient, EventCategory, EventItem};
pub use audio::{
    AudioFrame, CAPTURE_SAMPLE_RATE, CaptureFeed, EncodedChunk, InboundAudioPacket,
    PLAYBACK_SAMPLE_RATE, PlaybackHandle, PlaybackScheduler, Resampler,
};
pub use config::Config;
pub use controller::{SessionState, VoiceSessionController};
pub use error::{Error, Result};
pub use live::{LiveConfig, SessionEvent, StreamingSession};
