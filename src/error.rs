//! Error types for the UniConnect voice client

use thiserror::Error;

/// Result type alias for voice client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone access was refused by the OS or backend
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// Capture or output hardware is missing or unusable
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Transport or protocol fault on the streaming connection
    #[error("connection error: {0}")]
    Connection(String),

    /// `send` was called before the session reported open
    #[error("session not ready for sends")]
    NotReady,

    /// `send` was called after the session closed
    #[error("session already closed")]
    SessionClosed,

    /// An inbound payload could not be decoded (dropped, non-fatal)
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Invalid session state transition
    #[error("invalid state transition: {0}")]
    State(String),

    /// Audio processing error
    #[error("audio error: {0}")]
    Audio(String),

    /// Assistant (chat/events) request error
    #[error("assistant error: {0}")]
    Assistant(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
