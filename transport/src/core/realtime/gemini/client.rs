//! Gemini Live session connection.
//!
//! [`GeminiLiveConnection`] owns the WebSocket for one session at a time:
//! it opens the socket, sends `setup`, replays the initial context and then
//! runs a receive loop that turns server frames into [`ConnectionEvent`]s.
//!
//! # Example
//!
//! ```rust,ignore
//! use gemini_live_transport::core::realtime::gemini::{GeminiLiveConfig, GeminiLiveConnection};
//! use tokio::sync::mpsc;
//!
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let connection = GeminiLiveConnection::new(GeminiLiveConfig::new("api-key"), tx);
//! connection.connect().await?;
//! while let Some(event) = rx.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::stream::SplitSink;
use futures::{SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::config::GeminiLiveConfig;
use super::messages::{ClientMessage, ServerMessage};
use crate::core::audio::AudioChunk;
use crate::core::realtime::base::{
    ConnectionEvent, ConnectionEventSender, ConnectionState, ReceiveRetryConfig, RealtimeError,
    RealtimeResult, SessionEvent,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// The live socket. Present from `connect()` until the transport closes.
struct ConnectionHandle {
    sink: tokio::sync::Mutex<WsSink>,
    /// Cancelled when the handle is cleared.
    closed: CancellationToken,
}

struct Shared {
    state: Mutex<ConnectionState>,
    /// Set once the local connect sequence has finished.
    setup_sent: AtomicBool,
    handle: Mutex<Option<Arc<ConnectionHandle>>>,
    /// Bumped under the state lock by every connect and disconnect.
    generation: AtomicU64,
    events: ConnectionEventSender,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.lock();
        if *current != state {
            tracing::debug!("Gemini Live connection state: {} -> {}", *current, state);
            *current = state;
        }
    }

    fn current_handle(&self) -> Option<Arc<ConnectionHandle>> {
        self.handle.lock().clone()
    }

    /// Clear the handle, optionally only if it is still `expected`.
    fn clear_handle(&self, expected: Option<&Arc<ConnectionHandle>>) -> Option<Arc<ConnectionHandle>> {
        let taken = {
            let mut slot = self.handle.lock();
            match (slot.as_ref(), expected) {
                (Some(current), Some(expected)) if !Arc::ptr_eq(current, expected) => None,
                _ => slot.take(),
            }
        };
        if let Some(handle) = &taken {
            handle.closed.cancel();
            self.setup_sent.store(false, Ordering::SeqCst);
            self.set_state(ConnectionState::Closed);
        }
        taken
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Start a new generation. Callers must hold the state lock.
    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Turn a frame read by the socket of `generation` into an event.
    /// Frames from a socket that has since been replaced are dropped.
    fn dispatch(&self, generation: u64, message: ServerMessage) {
        let event = match message {
            ServerMessage::SetupComplete => {
                {
                    let mut state = self.state.lock();
                    if generation != self.current_generation() {
                        tracing::debug!("Dropping setup complete from a previous connection");
                        return;
                    }
                    tracing::info!("Gemini Live setup complete");
                    if matches!(
                        *state,
                        ConnectionState::Connecting | ConnectionState::AwaitingSetupComplete
                    ) {
                        *state = ConnectionState::Established;
                    }
                }
                ConnectionEvent::SetupComplete
            }
            ServerMessage::AudioOutput(audio) => match audio.audio_bytes() {
                Some(bytes) => ConnectionEvent::AudioReceived(bytes),
                None => return,
            },
            ServerMessage::Interrupted => {
                tracing::debug!("Model output interrupted by user");
                ConnectionEvent::UserInterrupted
            }
            ServerMessage::Unrecognized => {
                tracing::trace!("Ignoring unrecognized server message");
                return;
            }
        };
        if generation != self.current_generation() {
            tracing::debug!("Dropping event from a previous connection");
            return;
        }
        if self.events.send(SessionEvent { generation, event }).is_err() {
            tracing::trace!("Connection event receiver dropped");
        }
    }
}

/// Why the receive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveExit {
    /// The connection handle was cleared by `disconnect()`.
    HandleCleared,
    /// The server closed the socket or the stream ended.
    TransportClosed,
    /// The configured retry bound was reached.
    RetriesExhausted,
}

/// Read frames from `stream` until the handle is cleared or the transport
/// closes, classifying every data frame and handing it to `dispatch` in
/// arrival order.
pub async fn receive_loop<S, F>(
    mut stream: S,
    closed: CancellationToken,
    retry: ReceiveRetryConfig,
    mut dispatch: F,
) -> ReceiveExit
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    F: FnMut(ServerMessage),
{
    let mut failures: u32 = 0;

    loop {
        let frame = tokio::select! {
            biased;
            _ = closed.cancelled() => return ReceiveExit::HandleCleared,
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Binary(payload))) => {
                failures = 0;
                dispatch(ServerMessage::classify(&payload));
            }
            Some(Ok(Message::Text(text))) => {
                failures = 0;
                tracing::warn!("Unexpected text frame from server: {}", text.as_str());
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!("WebSocket closed by server: {:?}", frame);
                return ReceiveExit::TransportClosed;
            }
            Some(Ok(_)) => {
                failures = 0;
            }
            Some(Err(e)) => {
                if closed.is_cancelled() {
                    return ReceiveExit::HandleCleared;
                }
                failures = failures.saturating_add(1);
                if !retry.should_retry(failures) {
                    tracing::error!("WebSocket receive failed {} times, giving up: {}", failures, e);
                    return ReceiveExit::RetriesExhausted;
                }
                tracing::warn!("WebSocket receive error (attempt {}): {}", failures, e);
                tokio::select! {
                    biased;
                    _ = closed.cancelled() => return ReceiveExit::HandleCleared,
                    _ = tokio::time::sleep(retry.delay()) => {}
                }
            }
            None => {
                tracing::info!("WebSocket stream ended");
                return ReceiveExit::TransportClosed;
            }
        }
    }
}

// =============================================================================
// Gemini Live Connection
// =============================================================================

/// One Gemini Live session over a WebSocket.
///
/// Events are delivered on the channel given to [`GeminiLiveConnection::new`].
/// A closed connection can be connected again.
pub struct GeminiLiveConnection {
    config: GeminiLiveConfig,
    shared: Arc<Shared>,
}

impl GeminiLiveConnection {
    pub fn new(config: GeminiLiveConfig, events: ConnectionEventSender) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Idle),
                setup_sent: AtomicBool::new(false),
                handle: Mutex::new(None),
                generation: AtomicU64::new(0),
                events,
            }),
        }
    }

    pub fn config(&self) -> &GeminiLiveConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Generation of the current socket. Events stamped with any other
    /// generation belong to a connection that has been closed or replaced.
    pub fn generation(&self) -> u64 {
        self.shared.current_generation()
    }

    /// Whether the transport is open.
    pub fn is_connected(&self) -> bool {
        self.shared.handle.lock().is_some()
    }

    /// Whether user audio is currently forwarded to the server.
    pub fn accepts_audio(&self) -> bool {
        self.shared.setup_sent.load(Ordering::SeqCst) && self.state() == ConnectionState::Established
    }

    pub async fn connect(&self) -> RealtimeResult<()> {
        self.connect_with_cancellation(&CancellationToken::new()).await
    }

    /// Open the socket, send `setup` and the initial context, then start the
    /// receive loop.
    ///
    /// `cancel` is checked between steps. Cancelling after the socket opened
    /// returns [`RealtimeError::Cancelled`] and leaves the socket open; call
    /// [`disconnect`](Self::disconnect) to close it.
    pub async fn connect_with_cancellation(&self, cancel: &CancellationToken) -> RealtimeResult<()> {
        let generation = {
            let mut state = self.shared.state.lock();
            if !state.can_connect() {
                tracing::error!("connect() called while connection is {}", *state);
                debug_assert!(
                    state.can_connect(),
                    "connect() called while connection is {}",
                    *state
                );
                return Err(RealtimeError::InvalidState(*state));
            }
            *state = ConnectionState::Connecting;
            self.shared.next_generation()
        };
        self.shared.setup_sent.store(false, Ordering::SeqCst);

        let url = match self.config.ws_url() {
            Ok(url) => url,
            Err(e) => {
                self.shared.set_state(ConnectionState::Closed);
                return Err(e);
            }
        };
        if cancel.is_cancelled() {
            self.shared.set_state(ConnectionState::Closed);
            return Err(RealtimeError::Cancelled);
        }

        tracing::info!("Connecting to Gemini Live at {}", self.config.endpoint);
        let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                tracing::error!("Failed to connect to Gemini Live: {}", e);
                self.shared.set_state(ConnectionState::Closed);
                return Err(RealtimeError::ConnectionFailed(e.to_string()));
            }
        };
        tracing::info!("Connected to Gemini Live");

        let (ws_sink, ws_stream) = ws_stream.split();
        let handle = Arc::new(ConnectionHandle {
            sink: tokio::sync::Mutex::new(ws_sink),
            closed: CancellationToken::new(),
        });
        *self.shared.handle.lock() = Some(handle.clone());

        if cancel.is_cancelled() {
            return Err(RealtimeError::Cancelled);
        }

        let setup = ClientMessage::setup(&self.config.model, self.config.generation_config.clone());
        self.send_message(&setup).await?;
        self.shared.set_state(ConnectionState::AwaitingSetupComplete);

        for message in &self.config.initial_messages {
            if cancel.is_cancelled() {
                return Err(RealtimeError::Cancelled);
            }
            self.send_message(&ClientMessage::from_context(message)).await?;
        }
        if cancel.is_cancelled() {
            return Err(RealtimeError::Cancelled);
        }

        let shared = self.shared.clone();
        let retry = self.config.receive_retry.clone();
        let closed = handle.closed.clone();
        tokio::spawn(async move {
            let dispatcher = shared.clone();
            let exit = receive_loop(ws_stream, closed, retry, move |message| {
                dispatcher.dispatch(generation, message)
            })
            .await;
            tracing::info!("Gemini Live receive loop ended: {:?}", exit);
            if exit != ReceiveExit::HandleCleared {
                shared.clear_handle(Some(&handle));
            }
        });

        self.shared.setup_sent.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Serialize `message` and send it as one text frame.
    pub async fn send_message(&self, message: &ClientMessage) -> RealtimeResult<()> {
        let handle = self
            .shared
            .current_handle()
            .ok_or(RealtimeError::NotConnected)?;
        let json = serde_json::to_string(message)
            .map_err(|e| RealtimeError::SerializationError(e.to_string()))?;
        tracing::trace!("Sending {} message", message.kind());
        handle
            .sink
            .lock()
            .await
            .send(Message::text(json))
            .await
            .map_err(|e| RealtimeError::WebSocketError(e.to_string()))
    }

    /// Send a captured wire-format chunk. Dropped until the session is set up.
    pub async fn send_user_audio(&self, chunk: &AudioChunk) -> RealtimeResult<()> {
        if !self.accepts_audio() {
            tracing::trace!("Dropping {} bytes of user audio before setup", chunk.data().len());
            return Ok(());
        }
        self.send_message(&ClientMessage::audio(chunk)).await
    }

    /// Close the socket. The receive loop exits once the handle is cleared.
    pub async fn disconnect(&self) -> RealtimeResult<()> {
        {
            let _state = self.shared.state.lock();
            self.shared.next_generation();
        }
        let Some(handle) = self.shared.clear_handle(None) else {
            let mut state = self.shared.state.lock();
            if *state != ConnectionState::Idle {
                *state = ConnectionState::Closed;
            }
            return Ok(());
        };

        let mut sink = handle.sink.lock().await;
        if let Err(e) = sink.send(Message::Close(None)).await {
            tracing::debug!("Close frame not sent: {}", e);
        }
        if let Err(e) = sink.close().await {
            tracing::debug!("WebSocket close failed: {}", e);
        }
        tracing::info!("Disconnected from Gemini Live");
        Ok(())
    }
}

impl Drop for GeminiLiveConnection {
    fn drop(&mut self) {
        if let Some(handle) = self.shared.handle.lock().take() {
            handle.closed.cancel();
        }
    }
}
