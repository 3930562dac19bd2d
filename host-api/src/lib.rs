//! # Gemini Live Host API
//!
//! This crate defines the boundary between a voice-client host and a
//! transport implementation. The host drives the transport through the
//! [`Transport`] trait and observes it through an [`EventSink`].
//!
//! # Architecture
//!
//! The host owns the client lifecycle (`init_devices`, `connect`,
//! `disconnect`, `release`) and the application-level message protocol.
//! A transport owns the media devices and the network session, and reports
//! everything that happens back as [`TransportEvent`]s.
//!
//! # Example
//!
//! ```rust,ignore
//! use gemini_live_host_api::*;
//! use std::sync::Arc;
//!
//! let sink: SharedEventSink = Arc::new(|event: TransportEvent| {
//!     println!("transport event: {:?}", event);
//! });
//!
//! let options = ClientOptions::default()
//!     .with_llm_option("api_key", serde_json::json!("..."));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors surfaced to the host by transport operations.
#[derive(Debug, Error)]
pub enum HostError {
    /// The transport could not establish its session
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The operation requires an established session
    #[error("Not connected")]
    NotConnected,

    /// The operation was issued in a lifecycle state that does not allow it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A media device operation failed
    #[error("Device error: {0}")]
    DeviceError(String),

    /// A message could not be encoded or decoded
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type for host-facing transport operations.
pub type HostResult<T> = Result<T, HostError>;

// =============================================================================
// Transport State
// =============================================================================

/// Lifecycle state of a transport as observed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    #[default]
    Disconnected,
    Initializing,
    Initialized,
    Connecting,
    Connected,
    Ready,
}

impl TransportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Ready => "ready",
        }
    }

    /// Whether the host may exchange messages in this state.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Ready)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Devices, Participants and Tracks
// =============================================================================

/// Opaque identifier of a media device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaDeviceId(pub String);

impl MediaDeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A media device the host can present to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDeviceInfo {
    pub id: MediaDeviceId,
    pub name: String,
}

/// Opaque identifier of a media track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaTrackId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

/// A session participant. The remote model is represented as a non-local
/// participant whose id changes with every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: Option<String>,
    pub local: bool,
}

/// Track ids published by one participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantTracks {
    pub audio: Option<MediaTrackId>,
    pub video: Option<MediaTrackId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracks {
    pub local: ParticipantTracks,
    pub bot: Option<ParticipantTracks>,
}

// =============================================================================
// Client Options
// =============================================================================

/// A single named option inside a service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigOption {
    pub name: String,
    pub value: Value,
}

/// Options for one service, e.g. `llm`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub service: String,
    pub options: Vec<ConfigOption>,
}

impl ServiceConfig {
    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.iter().find(|o| o.name == name).map(|o| &o.value)
    }
}

/// Connection parameters supplied alongside the client options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientParams {
    pub base_url: Option<String>,
    pub headers: HashMap<String, String>,
    pub request_data: Option<Value>,
    pub config: Vec<ServiceConfig>,
}

/// Options the host passes to a transport at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    pub enable_mic: bool,
    pub enable_cam: bool,
    pub services: HashMap<String, String>,
    pub params: ClientParams,
    /// Overrides `params.config` when present.
    pub config: Option<Vec<ServiceConfig>>,
    pub custom_headers: Option<HashMap<String, String>>,
    pub custom_body_params: Option<Value>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            enable_mic: true,
            enable_cam: false,
            services: HashMap::new(),
            params: ClientParams::default(),
            config: None,
            custom_headers: None,
            custom_body_params: None,
        }
    }
}

impl ClientOptions {
    /// The service configuration in effect.
    pub fn effective_config(&self) -> &[ServiceConfig] {
        self.config.as_deref().unwrap_or(&self.params.config)
    }

    pub fn service_config(&self, service: &str) -> Option<&ServiceConfig> {
        self.effective_config().iter().find(|c| c.service == service)
    }

    pub fn llm_config(&self) -> Option<&ServiceConfig> {
        self.service_config("llm")
    }

    pub fn llm_option(&self, name: &str) -> Option<&Value> {
        self.llm_config().and_then(|c| c.option(name))
    }

    /// Add or replace an option on the `llm` service.
    pub fn with_llm_option(mut self, name: impl Into<String>, value: Value) -> Self {
        let name = name.into();
        let config = self.config.get_or_insert_with(|| self.params.config.clone());
        let llm = match config.iter().position(|c| c.service == "llm") {
            Some(index) => &mut config[index],
            None => {
                config.push(ServiceConfig {
                    service: "llm".to_string(),
                    options: Vec::new(),
                });
                let last = config.len() - 1;
                &mut config[last]
            }
        };
        llm.options.retain(|o| o.name != name);
        llm.options.push(ConfigOption { name, value });
        self
    }

    pub fn with_enable_mic(mut self, enable_mic: bool) -> Self {
        self.enable_mic = enable_mic;
        self
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Label carried by every application message.
pub const MESSAGE_LABEL: &str = "rtvi-ai";

/// Application message sent from the host to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: String,
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn default_label() -> String {
    MESSAGE_LABEL.to_string()
}

impl OutboundMessage {
    pub const ACTION: &'static str = "action";

    pub fn new(id: impl Into<String>, msg_type: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            id: id.into(),
            label: default_label(),
            msg_type: msg_type.into(),
            data,
        }
    }

    /// Build an `action` message.
    pub fn action(id: impl Into<String>, action: ActionData) -> Self {
        let data = serde_json::to_value(action).ok();
        Self::new(id, Self::ACTION, data)
    }

    /// Decode the payload of an `action` message. Returns `None` for any
    /// other message type or a malformed payload.
    pub fn decode_action_data(&self) -> Option<ActionData> {
        if self.msg_type != Self::ACTION {
            return None;
        }
        self.data
            .as_ref()
            .and_then(|data| serde_json::from_value(data.clone()).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionArgument {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionData {
    pub service: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<ActionArgument>>,
}

impl ActionData {
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments
            .as_ref()
            .and_then(|args| args.iter().find(|a| a.name == name))
            .map(|a| &a.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InboundMessageType {
    BotReady,
    ActionResponse,
    ErrorResponse,
}

/// Application message delivered from the transport to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub msg_type: InboundMessageType,
    /// JSON-encoded payload.
    pub data: String,
    pub id: String,
}

/// Payload of an `action-response` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub result: Value,
}

/// Payload of a `bot-ready` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotReadyData {
    pub version: String,
    pub config: Vec<ServiceConfig>,
}

// =============================================================================
// Events
// =============================================================================

/// Everything a transport reports back to its host.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    StateChanged(TransportState),
    Connected,
    Disconnected,
    ParticipantJoined(Participant),
    ParticipantLeft(Participant),
    BotConnected(Participant),
    BotDisconnected(Participant),
    UserStartedSpeaking,
    BotStartedSpeaking(Participant),
    BotStoppedSpeaking(Participant),
    UserAudioLevel(f32),
    RemoteAudioLevel { level: f32, participant: Participant },
    AvailableMicsUpdated(Vec<MediaDeviceInfo>),
    MicUpdated(Option<MediaDeviceInfo>),
    TracksUpdated(Tracks),
    Message(InboundMessage),
}

/// Receiver of transport events.
///
/// Events may be emitted from audio threads as well as async tasks, so
/// implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TransportEvent);
}

impl<F> EventSink for F
where
    F: Fn(TransportEvent) + Send + Sync,
{
    fn emit(&self, event: TransportEvent) {
        self(event)
    }
}

pub type SharedEventSink = Arc<dyn EventSink>;

// =============================================================================
// Transport Trait
// =============================================================================

/// Interface a transport exposes to its host.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Prepare media devices. Calling it again is a no-op.
    async fn init_devices(&self) -> HostResult<()>;

    /// Release every device resource held by the transport.
    fn release(&self);

    async fn connect(&self) -> HostResult<()>;

    async fn disconnect(&self) -> HostResult<()>;

    fn get_all_mics(&self) -> Vec<MediaDeviceInfo>;

    fn get_all_cams(&self) -> Vec<MediaDeviceInfo>;

    async fn update_mic(&self, mic_id: MediaDeviceId) -> HostResult<()>;

    async fn update_cam(&self, cam_id: MediaDeviceId) -> HostResult<()>;

    fn selected_mic(&self) -> Option<MediaDeviceInfo>;

    fn selected_cam(&self) -> Option<MediaDeviceInfo>;

    async fn enable_mic(&self, enable: bool) -> HostResult<()>;

    async fn enable_cam(&self, enable: bool) -> HostResult<()>;

    fn is_mic_enabled(&self) -> bool;

    fn is_cam_enabled(&self) -> bool;

    /// Send an application message. Responses arrive as
    /// [`TransportEvent::Message`].
    async fn send_message(&self, message: OutboundMessage) -> HostResult<()>;

    fn state(&self) -> TransportState;

    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    fn tracks(&self) -> Option<Tracks>;

    /// Session expiry as a unix timestamp, if the session has one.
    fn expiry(&self) -> Option<i64>;
}
