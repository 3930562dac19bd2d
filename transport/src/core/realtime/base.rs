//! Base types for realtime audio-to-audio sessions.
//!
//! This module defines the error type, connection state and event type
//! shared by the session connection and the orchestrator above it.
//!
//! # Audio Format
//!
//! PCM 16-bit signed little-endian, mono, 24kHz in both directions.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the service failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// Operation not allowed in the current connection state
    #[error("Invalid state: {0}")]
    InvalidState(ConnectionState),

    /// The connect sequence was cancelled between steps
    #[error("Connect cancelled")]
    Cancelled,
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// How the receive loop treats transport read errors.
///
/// Read errors are retried after a fixed delay. With `max_retries` unset the
/// loop keeps retrying until the connection is closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveRetryConfig {
    /// Delay before retrying a failed read (milliseconds).
    /// Default: 250ms
    pub delay_ms: u64,

    /// Consecutive failed reads tolerated before the loop gives up.
    /// Default: unbounded
    pub max_retries: Option<u32>,
}

impl Default for ReceiveRetryConfig {
    fn default() -> Self {
        Self {
            delay_ms: 250,
            max_retries: None,
        }
    }
}

impl ReceiveRetryConfig {
    pub fn bounded(delay_ms: u64, max_retries: u32) -> Self {
        Self {
            delay_ms,
            max_retries: Some(max_retries),
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Whether to retry after `failures` consecutive failed reads.
    pub fn should_retry(&self, failures: u32) -> bool {
        match self.max_retries {
            None => true,
            Some(max) => failures <= max,
        }
    }
}

// =============================================================================
// State Types
// =============================================================================

/// Session connection state.
///
/// `Idle → Connecting → AwaitingSetupComplete → Established`, and `Closed`
/// from any state once the transport is gone. A closed connection can be
/// connected again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    AwaitingSetupComplete,
    Established,
    Closed,
}

impl ConnectionState {
    /// Whether `connect()` may be called.
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Idle | Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Idle"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::AwaitingSetupComplete => write!(f, "AwaitingSetupComplete"),
            ConnectionState::Established => write!(f, "Established"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Signals raised by the session connection, in frame arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The server accepted the setup message.
    SetupComplete,
    /// Decoded model audio in wire format.
    AudioReceived(Bytes),
    /// The user started talking over the model.
    UserInterrupted,
}

/// A [`ConnectionEvent`] stamped with the generation of the socket that
/// produced it. Every `connect()` and `disconnect()` starts a new generation.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub generation: u64,
    pub event: ConnectionEvent,
}

pub type ConnectionEventSender = mpsc::UnboundedSender<SessionEvent>;
pub type ConnectionEventReceiver = mpsc::UnboundedReceiver<SessionEvent>;
