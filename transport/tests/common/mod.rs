//! Shared helpers for integration tests
//!
//! - [`MockLiveServer`]: a local WebSocket server that records every text
//!   frame the client sends and pushes binary frames on demand
//! - [`TestBackend`]: an in-memory audio backend
//! - [`EventRecorder`]: a transport event sink that keeps everything it sees

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use gemini_live_host_api::{SharedEventSink, TransportEvent};
use gemini_live_transport::core::audio::{
    AudioBackend, AudioChunk, AudioDevice, AudioFormat, AudioResult, CompletionCallback,
    InputCallback, InputTap, OutputSink,
};
use gemini_live_transport::core::realtime::gemini::AudioOutputMessage;

pub const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Mock Gemini Live server
// =============================================================================

enum ServerCommand {
    Binary(Vec<u8>),
    Close,
}

/// Local stand-in for the Gemini Live endpoint.
///
/// Text frames from every connection are decoded as JSON and queued in
/// arrival order. Commands go to the most recent connection.
pub struct MockLiveServer {
    pub endpoint: String,
    frames: tokio::sync::Mutex<mpsc::UnboundedReceiver<Value>>,
    commands: Arc<Mutex<Option<mpsc::UnboundedSender<ServerCommand>>>>,
    connections: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
}

impl MockLiveServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let commands = Arc::new(Mutex::new(None));
        let connections = Arc::new(AtomicUsize::new(0));
        let disconnects = Arc::new(AtomicUsize::new(0));

        let accept_commands = commands.clone();
        let accept_connections = connections.clone();
        let accept_disconnects = disconnects.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws_stream) = accept_async(stream).await else {
                    continue;
                };
                accept_connections.fetch_add(1, Ordering::SeqCst);

                let (command_tx, mut command_rx) = mpsc::unbounded_channel();
                *accept_commands.lock() = Some(command_tx);

                let frame_tx = frame_tx.clone();
                let disconnects = accept_disconnects.clone();
                tokio::spawn(async move {
                    let (mut write, mut read) = ws_stream.split();
                    loop {
                        tokio::select! {
                            msg = read.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                                        let _ = frame_tx.send(value);
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                                Some(Ok(_)) => {}
                            },
                            command = command_rx.recv() => match command {
                                Some(ServerCommand::Binary(payload)) => {
                                    if write.send(Message::binary(Bytes::from(payload))).await.is_err() {
                                        break;
                                    }
                                }
                                Some(ServerCommand::Close) | None => {
                                    let _ = write.send(Message::Close(None)).await;
                                    break;
                                }
                            },
                        }
                    }
                    disconnects.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        Self {
            endpoint: format!("ws://{addr}/live"),
            frames: tokio::sync::Mutex::new(frame_rx),
            commands,
            connections,
            disconnects,
        }
    }

    /// Next JSON frame from the client, if one arrives within `timeout`.
    pub async fn next_frame_within(&self, timeout: Duration) -> Option<Value> {
        let mut frames = self.frames.lock().await;
        tokio::time::timeout(timeout, frames.recv()).await.ok().flatten()
    }

    pub async fn next_frame(&self) -> Value {
        self.next_frame_within(WAIT)
            .await
            .expect("client frame not received in time")
    }

    /// Next frame whose top-level key is `kind`, skipping others.
    pub async fn next_frame_of(&self, kind: &str) -> Value {
        loop {
            let frame = self.next_frame().await;
            if frame.get(kind).is_some() {
                return frame;
            }
        }
    }

    pub fn send_json(&self, value: Value) {
        self.send_binary(value.to_string().into_bytes());
    }

    pub fn send_binary(&self, payload: Vec<u8>) {
        if let Some(tx) = self.commands.lock().as_ref() {
            let _ = tx.send(ServerCommand::Binary(payload));
        }
    }

    pub fn send_setup_complete(&self) {
        self.send_json(json!({"setupComplete": {}}));
    }

    pub fn send_model_audio(&self, pcm: &[u8]) {
        let message = AudioOutputMessage::with_audio(pcm);
        self.send_json(serde_json::to_value(&message).unwrap());
    }

    pub fn send_interrupted(&self) {
        self.send_json(json!({"serverContent": {"interrupted": true}}));
    }

    /// Close the most recent connection from the server side.
    pub fn close(&self) {
        if let Some(tx) = self.commands.lock().as_ref() {
            let _ = tx.send(ServerCommand::Close);
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

/// 16-bit PCM bytes for `samples`.
pub fn pcm16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

// =============================================================================
// In-memory audio backend
// =============================================================================

#[derive(Default)]
struct BackendState {
    devices: Mutex<Vec<AudioDevice>>,
    on_block: Mutex<Option<InputCallback>>,
    input_playing: AtomicBool,
    scheduled: Mutex<VecDeque<(AudioChunk, CompletionCallback)>>,
    total_scheduled: AtomicUsize,
}

/// Audio backend with one microphone and a recording output route.
///
/// Input taps deliver wire-format audio; the output route accepts
/// float samples at 24kHz.
#[derive(Clone)]
pub struct TestBackend {
    state: Arc<BackendState>,
}

impl TestBackend {
    pub fn new() -> Self {
        let state = BackendState::default();
        *state.devices.lock() = vec![AudioDevice::new("mic-1", "Test Microphone")];
        Self {
            state: Arc::new(state),
        }
    }

    pub fn shared(&self) -> Arc<dyn AudioBackend> {
        Arc::new(self.clone())
    }

    /// Deliver a block as if the microphone captured it.
    pub fn capture(&self, chunk: AudioChunk) {
        if !self.state.input_playing.load(Ordering::SeqCst) {
            return;
        }
        if let Some(cb) = self.state.on_block.lock().as_mut() {
            cb(chunk);
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.state.input_playing.load(Ordering::SeqCst)
    }

    /// Finish playing the oldest scheduled buffer.
    pub fn complete_next(&self) -> bool {
        let next = self.state.scheduled.lock().pop_front();
        match next {
            Some((_, done)) => {
                done();
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.state.scheduled.lock().len()
    }

    pub fn total_scheduled(&self) -> usize {
        self.state.total_scheduled.load(Ordering::SeqCst)
    }
}

struct TestTap {
    state: Arc<BackendState>,
}

impl InputTap for TestTap {
    fn format(&self) -> AudioFormat {
        AudioFormat::wire()
    }

    fn play(&mut self) -> AudioResult<()> {
        self.state.input_playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&mut self) -> AudioResult<()> {
        self.state.input_playing.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for TestTap {
    fn drop(&mut self) {
        self.state.input_playing.store(false, Ordering::SeqCst);
        *self.state.on_block.lock() = None;
    }
}

struct TestSink {
    state: Arc<BackendState>,
}

impl OutputSink for TestSink {
    fn format(&self) -> AudioFormat {
        AudioFormat::float(24000, 1)
    }

    fn play(&mut self) -> AudioResult<()> {
        Ok(())
    }

    fn schedule(&mut self, chunk: AudioChunk, on_complete: CompletionCallback) -> AudioResult<()> {
        self.state.total_scheduled.fetch_add(1, Ordering::SeqCst);
        self.state.scheduled.lock().push_back((chunk, on_complete));
        Ok(())
    }

    fn flush(&mut self) {
        self.state.scheduled.lock().clear();
    }
}

impl Drop for TestSink {
    fn drop(&mut self) {
        self.state.scheduled.lock().clear();
    }
}

impl AudioBackend for TestBackend {
    fn name(&self) -> &str {
        "test"
    }

    fn input_devices(&self) -> AudioResult<Vec<AudioDevice>> {
        Ok(self.state.devices.lock().clone())
    }

    fn default_input_device(&self) -> Option<AudioDevice> {
        self.state.devices.lock().first().cloned()
    }

    fn open_input(
        &self,
        _device: Option<&AudioDevice>,
        on_block: InputCallback,
    ) -> AudioResult<Box<dyn InputTap>> {
        *self.state.on_block.lock() = Some(on_block);
        Ok(Box::new(TestTap {
            state: self.state.clone(),
        }))
    }

    fn open_output(&self) -> AudioResult<Box<dyn OutputSink>> {
        Ok(Box::new(TestSink {
            state: self.state.clone(),
        }))
    }
}

// =============================================================================
// Event recording
// =============================================================================

#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<TransportEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> SharedEventSink {
        let events = self.events.clone();
        Arc::new(move |event: TransportEvent| events.lock().push(event))
    }

    /// Events recorded so far, without audio level reports.
    pub fn events(&self) -> Vec<TransportEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| {
                !matches!(
                    e,
                    TransportEvent::UserAudioLevel(_) | TransportEvent::RemoteAudioLevel { .. }
                )
            })
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Wait until an event matching `predicate` has been recorded.
    pub async fn wait_for<F>(&self, predicate: F) -> TransportEvent
    where
        F: Fn(&TransportEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if let Some(event) = self.events.lock().iter().find(|e| predicate(e)).cloned() {
                return event;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "event not recorded in time; saw {:?}",
                self.events()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Poll `condition` until it holds or the wait times out.
pub async fn eventually<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
