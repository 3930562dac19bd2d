//! Realtime audio-to-audio session module.
//!
//! Provides the Gemini Live session connection: the WebSocket handshake,
//! message framing and the receive loop that turns server frames into
//! [`ConnectionEvent`]s.
//!
//! # Audio Format
//!
//! PCM 16-bit signed little-endian at 24kHz mono in both directions.

mod base;
pub mod gemini;

pub use base::{
    ConnectionEvent, ConnectionEventReceiver, ConnectionEventSender, ConnectionState,
    ReceiveRetryConfig, RealtimeError, RealtimeResult, SessionEvent,
};
pub use gemini::{
    GEMINI_LIVE_DEFAULT_MODEL, GEMINI_LIVE_URL, ClientMessage, ContextMessage,
    GeminiLiveConfig, GeminiLiveConnection, ServerMessage,
};
