//! Gemini Live WebSocket message types.
//!
//! # Protocol Overview
//!
//! Client messages (sent to server as JSON text frames):
//! - setup - Select the model and generation config; must be first
//! - clientContent - Append conversation turns
//! - realtimeInput - Stream microphone audio
//!
//! Server messages (received as JSON in binary frames):
//! - setupComplete - The setup was accepted
//! - serverContent.modelTurn - Model audio
//! - serverContent.interrupted - The user talked over the model
//!
//! Server messages carry no type tag. [`ServerMessage::classify`] tries each
//! known shape in a fixed order and takes the first that decodes.

use base64::prelude::*;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::audio::AudioChunk;

// =============================================================================
// Client Messages
// =============================================================================

/// Message sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Setup(SetupMessage),
    TextInput(TextInputMessage),
    AudioInput(AudioInputMessage),
}

impl ClientMessage {
    pub fn setup(model: impl Into<String>, generation_config: Option<Value>) -> Self {
        Self::Setup(SetupMessage {
            setup: Setup {
                model: model.into(),
                generation_config,
            },
        })
    }

    /// A single completed turn.
    pub fn text(role: TurnRole, text: impl Into<String>) -> Self {
        Self::TextInput(TextInputMessage {
            client_content: ClientContent {
                turns: vec![Turn {
                    role,
                    parts: vec![TextPart { text: text.into() }],
                }],
                turn_complete: true,
            },
        })
    }

    pub fn from_context(message: &ContextMessage) -> Self {
        Self::text(TurnRole::from_host_role(&message.role), message.content.clone())
    }

    /// Wrap a wire-format chunk as base64 realtime input.
    pub fn audio(chunk: &AudioChunk) -> Self {
        Self::AudioInput(AudioInputMessage {
            realtime_input: RealtimeInput {
                media_chunks: vec![MediaChunk {
                    mime_type: chunk.format().mime_type(),
                    data: BASE64_STANDARD.encode(chunk.data()),
                }],
            },
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Setup(_) => "setup",
            Self::TextInput(_) => "clientContent",
            Self::AudioInput(_) => "realtimeInput",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextInputMessage {
    pub client_content: ClientContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Turn>,
    pub turn_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub role: TurnRole,
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TurnRole {
    User,
    System,
}

impl TurnRole {
    /// `user` maps to [`TurnRole::User`]; every other role is sent as
    /// system context.
    pub fn from_host_role(role: &str) -> Self {
        if role == "user" {
            Self::User
        } else {
            Self::System
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

/// A conversation message as supplied by the host: `{"role", "content"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: String,
    pub content: String,
}

impl ContextMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Decode a JSON array of messages. Returns `None` unless every entry
    /// has string `role` and `content` fields.
    pub fn list_from_value(value: &Value) -> Option<Vec<Self>> {
        serde_json::from_value(value.clone()).ok()
    }
}

// =============================================================================
// Server Messages
// =============================================================================

/// Message received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    SetupComplete,
    AudioOutput(AudioOutputMessage),
    Interrupted,
    Unrecognized,
}

impl ServerMessage {
    /// Classify a frame payload by trial decoding, in order: setup
    /// complete, audio output, interrupted. The first shape that decodes
    /// wins even if a later one would also match.
    pub fn classify(payload: &[u8]) -> Self {
        if serde_json::from_slice::<SetupCompleteMessage>(payload).is_ok() {
            return Self::SetupComplete;
        }
        if let Ok(audio) = serde_json::from_slice::<AudioOutputMessage>(payload) {
            return Self::AudioOutput(audio);
        }
        if let Ok(interrupted) = serde_json::from_slice::<InterruptedMessage>(payload) {
            if interrupted.server_content.interrupted {
                return Self::Interrupted;
            }
        }
        Self::Unrecognized
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetupCompleteMessage {
    #[allow(dead_code)]
    setup_complete: SetupComplete,
}

#[derive(Debug, Clone, Deserialize)]
struct SetupComplete {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioOutputMessage {
    pub server_content: AudioServerContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioServerContent {
    pub model_turn: ModelTurn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTurn {
    pub parts: Vec<InlinePart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlinePart {
    pub inline_data: InlineData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub data: String,
}

impl AudioOutputMessage {
    /// Build a message carrying `audio` in a single part.
    pub fn with_audio(audio: &[u8]) -> Self {
        Self {
            server_content: AudioServerContent {
                model_turn: ModelTurn {
                    parts: vec![InlinePart {
                        inline_data: InlineData {
                            mime_type: Some(format!("audio/pcm;rate={}", super::config::GEMINI_LIVE_SAMPLE_RATE)),
                            data: BASE64_STANDARD.encode(audio),
                        },
                    }],
                },
            },
        }
    }

    /// Decoded audio of the first part. Later parts are ignored.
    pub fn audio_bytes(&self) -> Option<Bytes> {
        let part = self.server_content.model_turn.parts.first()?;
        match BASE64_STANDARD.decode(&part.inline_data.data) {
            Ok(bytes) => Some(Bytes::from(bytes)),
            Err(e) => {
                tracing::warn!("Failed to decode model audio: {}", e);
                None
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InterruptedMessage {
    server_content: InterruptedContent,
}

#[derive(Debug, Clone, Deserialize)]
struct InterruptedContent {
    interrupted: bool,
}
