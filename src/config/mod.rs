//! Configuration management for the voice client

pub mod file;

use std::path::PathBuf;

use crate::live::LiveConfig;
use crate::{Error, Result};

/// Default streaming endpoint for the speech model
const DEFAULT_LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default REST endpoint for chat and event recommendations
const DEFAULT_REST_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default speech model for the live session
const DEFAULT_VOICE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default synthesized voice
const DEFAULT_VOICE: &str = "Kore";

/// Default chat model
const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

const DEFAULT_VOICE_INSTRUCTION: &str =
    "You are a helpful voice assistant for HS Pforzheim students. \
     Keep answers concise and friendly.";

const DEFAULT_CHAT_INSTRUCTION: &str = "\
You are an expert, friendly, and helpful onboarding assistant for \
international exchange students at HS Pforzheim (Hochschule Pforzheim). \
Your audience is young students, often in a new country for the first \
time. Your tone should be welcoming, clear, and encouraging. You answer \
questions about student life: visa, housing, transport, SIM cards, health \
insurance, university registration, city services, and making friends. \
Keep answers concise and easy to understand. Use simple language.";

/// Voice client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the speech/chat service
    pub api_key: Option<String>,

    /// WebSocket endpoint for the live session
    pub live_endpoint: String,

    /// REST endpoint for chat and events
    pub rest_endpoint: String,

    /// Voice session configuration
    pub voice: VoiceConfig,

    /// Text chat configuration
    pub chat: ChatConfig,
}

/// Voice session configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Speech model identifier
    pub model: String,

    /// Synthesized voice identifier
    pub voice: String,

    /// System prompt for the voice session
    pub system_instruction: String,
}

/// Text chat configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Chat model identifier
    pub model: String,

    /// System prompt for chat requests
    pub system_instruction: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            live_endpoint: DEFAULT_LIVE_ENDPOINT.to_string(),
            rest_endpoint: DEFAULT_REST_ENDPOINT.to_string(),
            voice: VoiceConfig {
                model: DEFAULT_VOICE_MODEL.to_string(),
                voice: DEFAULT_VOICE.to_string(),
                system_instruction: DEFAULT_VOICE_INSTRUCTION.to_string(),
            },
            chat: ChatConfig {
                model: DEFAULT_CHAT_MODEL.to_string(),
                system_instruction: DEFAULT_CHAT_INSTRUCTION.to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration: env > config file > defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let fc = Self::config_path()
            .filter(|p| p.exists())
            .map_or_else(
                || Ok(file::VoiceClientFile::default()),
                |path| -> Result<file::VoiceClientFile> {
                    let raw = std::fs::read_to_string(&path)?;
                    tracing::debug!(path = %path.display(), "loaded config file");
                    Ok(toml::from_str(&raw)?)
                },
            )?;

        let defaults = Self::default();

        Ok(Self {
            api_key: std::env::var("GEMINI_API_KEY").ok().or(fc.api_key),
            live_endpoint: std::env::var("UNICONNECT_LIVE_ENDPOINT")
                .unwrap_or(defaults.live_endpoint),
            rest_endpoint: std::env::var("UNICONNECT_REST_ENDPOINT")
                .unwrap_or(defaults.rest_endpoint),
            voice: VoiceConfig {
                model: std::env::var("UNICONNECT_VOICE_MODEL")
                    .ok()
                    .or(fc.voice.model)
                    .unwrap_or(defaults.voice.model),
                voice: std::env::var("UNICONNECT_VOICE")
                    .ok()
                    .or(fc.voice.voice)
                    .unwrap_or(defaults.voice.voice),
                system_instruction: fc
                    .voice
                    .system_instruction
                    .unwrap_or(defaults.voice.system_instruction),
            },
            chat: ChatConfig {
                model: std::env::var("UNICONNECT_CHAT_MODEL")
                    .ok()
                    .or(fc.chat.model)
                    .unwrap_or(defaults.chat.model),
                system_instruction: fc
                    .chat
                    .system_instruction
                    .unwrap_or(defaults.chat.system_instruction),
            },
        })
    }

    /// Config file location: `~/.config/uniconnect/config.toml`
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|d| d.config_dir().join("uniconnect").join("config.toml"))
    }

    /// The API key, or a configuration error naming the fix
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when no key is configured.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| Error::Config("GEMINI_API_KEY not set".to_string()))
    }

    /// Connection parameters for a live voice session
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when no API key is configured.
    pub fn live_config(&self) -> Result<LiveConfig> {
        Ok(LiveConfig {
            endpoint: self.live_endpoint.clone(),
            api_key: self.require_api_key()?.to_string(),
            model: self.voice.model.clone(),
            system_instruction: self.voice.system_instruction.clone(),
            voice: self.voice.voice.clone(),
            response_modality: "AUDIO".to_string(),
        })
    }
}
