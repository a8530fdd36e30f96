//! TOML configuration file loading
//!
//! Supports `~/.config/uniconnect/config.toml` as a persistent config
//! source. All fields are optional; the file is a partial overlay on
//! top of defaults.

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct VoiceClientFile {
    /// API key for the speech/chat service
    #[serde(default)]
    pub api_key: Option<String>,

    /// Voice session configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Text chat configuration
    #[serde(default)]
    pub chat: ChatFileConfig,
}

/// Voice session configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Speech model identifier
    pub model: Option<String>,

    /// Synthesized voice identifier (e.g. "Kore")
    pub voice: Option<String>,

    /// System prompt for the voice session
    pub system_instruction: Option<String>,
}

/// Text chat configuration
#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    /// Chat model identifier
    pub model: Option<String>,

    /// System prompt for chat requests
    pub system_instruction: Option<String>,
}
