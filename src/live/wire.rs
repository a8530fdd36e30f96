//! Wire messages for the bidirectional streaming protocol
//!
//! JSON shapes for the `BidiGenerateContent` duplex stream: a setup
//! message sent once after connect, realtime media chunks upstream, and
//! server content carrying synthesized audio downstream.

use serde::{Deserialize, Serialize};

use crate::audio::EncodedChunk;
use crate::live::LiveConfig;

/// Client -> server: session setup, sent once before any media
#[derive(Debug, Serialize)]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceSelection,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSelection {
    pub prebuilt_voice_config: PrebuiltVoice,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoice {
    pub voice_name: String,
}

/// Text content wrapper shared by setup and REST payloads
#[derive(Debug, Serialize, Deserialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

/// Client -> server: one realtime audio chunk
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaBlob>,
}

/// Binary-safe media payload with its format descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    pub mime_type: String,
    pub data: String,
}

/// Server -> client message; unknown fields are ignored
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub turn_complete: Option<bool>,
    #[serde(default)]
    pub interrupted: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<ServerPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPart {
    #[serde(default)]
    pub inline_data: Option<MediaBlob>,
    #[serde(default)]
    pub text: Option<String>,
}

impl ServerMessage {
    /// Whether this acknowledges session setup
    #[must_use]
    pub const fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Whether the model was interrupted and queued audio is stale
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.server_content
            .as_ref()
            .and_then(|c| c.interrupted)
            .unwrap_or(false)
    }

    /// Inbound audio payload at the known path, if any
    #[must_use]
    pub fn inline_audio(&self) -> Option<&MediaBlob> {
        self.server_content
            .as_ref()?
            .model_turn
            .as_ref()?
            .parts
            .iter()
            .find_map(|p| p.inline_data.as_ref())
    }
}

/// Build the setup message for a session config
#[must_use]
pub fn setup_message(config: &LiveConfig) -> SetupMessage {
    let model = if config.model.starts_with("models/") {
        config.model.clone()
    } else {
        format!("models/{}", config.model)
    };

    let system_instruction = if config.system_instruction.is_empty() {
        None
    } else {
        Some(Content {
            parts: vec![TextPart {
                text: config.system_instruction.clone(),
            }],
        })
    };

    SetupMessage {
        setup: Setup {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec![config.response_modality.clone()],
                speech_config: SpeechConfig {
                    voice_config: VoiceSelection {
                        prebuilt_voice_config: PrebuiltVoice {
                            voice_name: config.voice.clone(),
                        },
                    },
                },
            },
            system_instruction,
        },
    }
}

/// Wrap an encoded chunk as a realtime media message
#[must_use]
pub fn media_message(chunk: &EncodedChunk) -> RealtimeInputMessage {
    RealtimeInputMessage {
        realtime_input: RealtimeInput {
            media_chunks: vec![MediaBlob {
                mime_type: chunk.mime_type.clone(),
                data: chunk.data.clone(),
            }],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LiveConfig {
        LiveConfig {
            endpoint: "wss://example.invalid/stream".to_string(),
            api_key: "key".to_string(),
            model: "speech-model-1".to_string(),
            system_instruction: "Be brief.".to_string(),
            voice: "Kore".to_string(),
            response_modality: "AUDIO".to_string(),
        }
    }

    #[test]
    fn test_setup_message_shape() {
        let json = serde_json::to_value(setup_message(&test_config())).unwrap();

        assert_eq!(json["setup"]["model"], "models/speech-model-1");
        assert_eq!(
            json["setup"]["generationConfig"]["responseModalities"][0],
            "AUDIO"
        );
        assert_eq!(
            json["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]
                ["prebuiltVoiceConfig"]["voiceName"],
            "Kore"
        );
        assert_eq!(
            json["setup"]["systemInstruction"]["parts"][0]["text"],
            "Be brief."
        );
    }

    #[test]
    fn test_model_prefix_is_not_doubled() {
        let mut config = test_config();
        config.model = "models/speech-model-1".to_string();

        let json = serde_json::to_value(setup_message(&config)).unwrap();
        assert_eq!(json["setup"]["model"], "models/speech-model-1");
    }

    #[test]
    fn test_media_message_shape() {
        let chunk = EncodedChunk {
            data: "AAAA".to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        };
        let json = serde_json::to_value(media_message(&chunk)).unwrap();

        let blob = &json["realtimeInput"]["mediaChunks"][0];
        assert_eq!(blob["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(blob["data"], "AAAA");
    }

    #[test]
    fn test_inbound_audio_path() {
        let raw = r#"{
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        {"text": "spoken transcript"},
                        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "UENN"}}
                    ]
                }
            }
        }"#;

        let message: ServerMessage = serde_json::from_str(raw).unwrap();
        let audio = message.inline_audio().unwrap();
        assert_eq!(audio.data, "UENN");
        assert!(!message.is_setup_complete());
    }

    #[test]
    fn test_setup_complete_detection() {
        let message: ServerMessage = serde_json::from_str(r#"{"setupComplete": {}}"#).unwrap();
        assert!(message.is_setup_complete());
        assert!(message.inline_audio().is_none());
    }

    #[test]
    fn test_interrupted_detection() {
        let message: ServerMessage =
            serde_json::from_str(r#"{"serverContent": {"interrupted": true}}"#).unwrap();
        assert!(message.is_interrupted());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let message: ServerMessage =
            serde_json::from_str(r#"{"usageMetadata": {"totalTokens": 3}}"#).unwrap();
        assert!(!message.is_setup_complete());
        assert!(message.inline_audio().is_none());
    }
}
