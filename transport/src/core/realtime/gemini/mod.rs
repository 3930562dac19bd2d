//! Gemini Multimodal Live module.
//!
//! Bidirectional audio streaming with Google's Gemini Live API.
//!
//! # Audio Format
//!
//! Input and output audio is PCM 16-bit signed little-endian at 24kHz mono,
//! base64 encoded inside JSON messages.
//!
//! # Example
//!
//! ```rust,ignore
//! use gemini_live_transport::core::realtime::gemini::{GeminiLiveConfig, GeminiLiveConnection};
//! use gemini_live_transport::core::realtime::ConnectionEvent;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     let connection = GeminiLiveConnection::new(GeminiLiveConfig::new("api-key"), tx);
//!     connection.connect().await.unwrap();
//!
//!     while let Some(stamped) = rx.recv().await {
//!         if stamped.generation != connection.generation() {
//!             continue;
//!         }
//!         if let ConnectionEvent::AudioReceived(bytes) = stamped.event {
//!             println!("{} bytes of model audio", bytes.len());
//!         }
//!     }
//! }
//! ```

mod client;
mod config;
mod messages;

pub use client::{GeminiLiveConnection, ReceiveExit, receive_loop};
pub use config::{
    GEMINI_LIVE_DEFAULT_MODEL, GEMINI_LIVE_SAMPLE_RATE, GEMINI_LIVE_URL, GeminiLiveConfig,
};
pub use messages::{
    AudioInputMessage, AudioOutputMessage, ClientMessage, ContextMessage, MediaChunk,
    RealtimeInput, ServerMessage, Setup, SetupMessage, TextInputMessage, Turn, TurnRole,
};
