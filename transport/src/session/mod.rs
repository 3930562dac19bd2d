//! Session orchestrator.
//!
//! [`GeminiLiveTransport`] implements the host [`Transport`] interface on
//! top of the audio pipelines and the Gemini Live connection:
//!
//! - captured microphone chunks are forwarded to the connection
//! - model audio from the connection is scheduled for playback
//! - interruptions flush playback and are reported as the user speaking
//! - setup completion moves the session to `ready` and is announced to the
//!   host with a synthesized `bot-ready` message
//!
//! Every state change goes through one serialized entry point, and
//! notifications fire only when the state actually changes.

mod actions;
mod options;

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::StreamExt;
use gemini_live_host_api::{
    ClientOptions, HostError, HostResult, MediaDeviceId, MediaDeviceInfo, MediaTrackId,
    OutboundMessage, Participant, ParticipantId, ParticipantTracks, SharedEventSink, Tracks,
    Transport, TransportEvent, TransportState,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::audio::{
    AudioBackend, AudioCapture, AudioDevice, AudioDeviceManager, AudioPlayback, PlaybackEvent,
};
use crate::core::realtime::gemini::{ClientMessage, GeminiLiveConnection};
use crate::core::realtime::{
    ConnectionEvent, ConnectionEventReceiver, ConnectionState, RealtimeError, SessionEvent,
};

pub use actions::{
    APPEND_TO_MESSAGES, HostAction, LLM_SERVICE, MESSAGES_ARGUMENT, action_response, bot_ready,
    error_response,
};
pub use options::{
    LLM_API_KEY, LLM_GENERATION_CONFIG, LLM_INITIAL_MESSAGES, LLM_MODEL, SUPPORTED_LLM_OPTIONS,
    TransportSettings, connection_config, log_unsupported_options, unsupported_options,
};

/// Display name of the remote model participant.
pub const BOT_NAME: &str = "Gemini Multimodal Live";

fn new_bot_participant() -> Participant {
    Participant {
        id: ParticipantId(uuid::Uuid::new_v4().to_string()),
        name: Some(BOT_NAME.to_string()),
        local: false,
    }
}

fn device_info(device: AudioDevice) -> MediaDeviceInfo {
    MediaDeviceInfo {
        id: MediaDeviceId::new(device.id),
        name: device.name,
    }
}

fn host_error(e: RealtimeError) -> HostError {
    match e {
        RealtimeError::NotConnected => HostError::NotConnected,
        RealtimeError::InvalidState(state) => HostError::InvalidState(state.to_string()),
        RealtimeError::SerializationError(msg) => HostError::SerializationError(msg),
        other => HostError::ConnectionFailed(other.to_string()),
    }
}

fn log_not_supported(operation: &str) {
    warn!("{} not supported", operation);
}

struct SessionState {
    state: TransportState,
    devices_initialized: bool,
    selected_mic: Option<MediaDeviceInfo>,
    local_audio_track: Option<MediaTrackId>,
    bot_audio_track: Option<MediaTrackId>,
}

#[derive(Default)]
struct SessionTasks {
    dispatcher: Option<JoinHandle<()>>,
    audio_forwarder: Option<JoinHandle<()>>,
    device_watcher: Option<JoinHandle<()>>,
}

struct Inner {
    options: ClientOptions,
    settings: TransportSettings,
    events: SharedEventSink,
    connection: GeminiLiveConnection,
    connection_events: Mutex<Option<ConnectionEventReceiver>>,
    devices: Arc<AudioDeviceManager>,
    capture: AudioCapture,
    playback: AudioPlayback,
    /// Current bot identity, shared with the playback callback.
    bot: Arc<Mutex<Participant>>,
    /// Held for the whole of every state change and its notifications.
    transitions: Mutex<()>,
    session: Mutex<SessionState>,
    tasks: Mutex<SessionTasks>,
}

impl Inner {
    fn emit(&self, event: TransportEvent) {
        self.events.emit(event);
    }

    fn state(&self) -> TransportState {
        self.session.lock().state
    }

    fn bot(&self) -> Participant {
        self.bot.lock().clone()
    }

    fn set_state(&self, next: TransportState) {
        let _transition = self.transitions.lock();
        self.apply_state(next);
    }

    /// Move from `from` to `to`. Returns false if the state was not `from`.
    fn transition_if(&self, from: TransportState, to: TransportState) -> bool {
        let _transition = self.transitions.lock();
        if self.state() != from {
            return false;
        }
        self.apply_state(to);
        true
    }

    /// Callers must hold `transitions`.
    fn apply_state(&self, next: TransportState) {
        let previous = std::mem::replace(&mut self.session.lock().state, next);
        if previous == next {
            return;
        }
        debug!("Transport state: {} -> {}", previous, next);
        self.emit(TransportEvent::StateChanged(next));

        match next {
            TransportState::Connected => {
                self.emit(TransportEvent::Connected);
                let bot = {
                    let mut bot = self.bot.lock();
                    *bot = new_bot_participant();
                    bot.clone()
                };
                self.emit(TransportEvent::ParticipantJoined(bot.clone()));
                self.emit(TransportEvent::BotConnected(bot));
            }
            TransportState::Disconnected if previous.is_connected() => {
                let bot = self.bot();
                self.emit(TransportEvent::ParticipantLeft(bot.clone()));
                self.emit(TransportEvent::BotDisconnected(bot));
                self.emit(TransportEvent::Disconnected);
            }
            _ => {}
        }
    }

    /// Events queued by a socket that has since been closed or replaced
    /// are dropped.
    fn handle_session_event(&self, stamped: SessionEvent) {
        if stamped.generation != self.connection.generation() {
            debug!(
                "Dropping event from connection generation {}",
                stamped.generation
            );
            return;
        }
        self.handle_connection_event(stamped.event);
    }

    fn handle_connection_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::SetupComplete => self.on_setup_complete(),
            ConnectionEvent::AudioReceived(bytes) => self.playback.enqueue_wire_bytes(bytes),
            ConnectionEvent::UserInterrupted => {
                self.playback.clear_enqueued_bytes();
                self.emit(TransportEvent::UserStartedSpeaking);
            }
        }
    }

    fn on_setup_complete(&self) {
        let _transition = self.transitions.lock();
        let state = self.state();
        if !matches!(state, TransportState::Connecting | TransportState::Connected) {
            warn!("Setup complete received while {}; bot-ready not sent", state);
            return;
        }

        // Setup can be acknowledged before connect() has returned.
        if state == TransportState::Connecting {
            self.apply_state(TransportState::Connected);
        }
        match bot_ready() {
            Ok(message) => self.emit(TransportEvent::Message(message)),
            Err(e) => error!("Failed to build bot-ready message: {}", e),
        }
        self.apply_state(TransportState::Ready);
    }

    fn ensure_dispatcher(self: &Arc<Self>) {
        let Some(mut rx) = self.connection_events.lock().take() else {
            return;
        };
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.handle_session_event(event);
            }
        });
        self.tasks.lock().dispatcher = Some(handle);
    }

    /// Forward a fresh capture stream to the connection.
    fn hook_up_audio_input(self: &Arc<Self>) {
        let mut stream = self.capture.stream_audio();
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(chunk) = stream.next().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = inner.connection.send_user_audio(&chunk).await {
                    warn!("Send user audio failed: {}", e);
                }
            }
        });
        if let Some(previous) = self.tasks.lock().audio_forwarder.replace(handle) {
            previous.abort();
        }
    }

    fn start_device_watcher(self: &Arc<Self>) {
        let Some(interval) = self.settings.device_poll_interval else {
            return;
        };
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.refresh_devices();
            }
        });
        if let Some(previous) = self.tasks.lock().device_watcher.replace(handle) {
            previous.abort();
        }
    }

    fn refresh_devices(&self) -> bool {
        if !self.devices.refresh() {
            return false;
        }
        self.emit(TransportEvent::AvailableMicsUpdated(self.all_mics()));
        // The device in use may have changed along with the list.
        self.update_selected_mic_if_needed();
        true
    }

    fn all_mics(&self) -> Vec<MediaDeviceInfo> {
        self.devices
            .available_devices()
            .into_iter()
            .map(device_info)
            .collect()
    }

    fn selected_mic(&self) -> Option<MediaDeviceInfo> {
        let current = self.devices.current_input_device()?;
        self.devices
            .available_devices()
            .into_iter()
            .find(|d| d.id == current.id)
            .map(device_info)
    }

    fn update_selected_mic_if_needed(&self) {
        let selected = self.selected_mic();
        {
            let mut session = self.session.lock();
            if session.selected_mic == selected {
                return;
            }
            session.selected_mic = selected.clone();
        }
        info!(
            "Selected mic changed to {}",
            selected.as_ref().map(|m| m.name.as_str()).unwrap_or("none")
        );
        self.emit(TransportEvent::MicUpdated(selected));

        if let Err(e) = self.playback.adapt_to_device_change() {
            error!("Audio playback failed to adapt to device change: {}", e);
        }
        if let Err(e) = self.capture.adapt_to_device_change() {
            error!("Audio capture failed to adapt to device change: {}", e);
        }
    }

    fn tracks(&self) -> Tracks {
        let session = self.session.lock();
        Tracks {
            local: ParticipantTracks {
                audio: session.local_audio_track.clone(),
                video: None,
            },
            bot: Some(ParticipantTracks {
                audio: session.bot_audio_track.clone(),
                video: None,
            }),
        }
    }

    fn update_tracks(&self, local_audio: Option<MediaTrackId>, bot_audio: Option<MediaTrackId>) {
        {
            let mut session = self.session.lock();
            if session.local_audio_track == local_audio && session.bot_audio_track == bot_audio {
                return;
            }
            session.local_audio_track = local_audio;
            session.bot_audio_track = bot_audio;
        }
        self.emit(TransportEvent::TracksUpdated(self.tracks()));
    }

    /// The server ended the session but the host state still reads as
    /// connected. Only `disconnect()` resets it.
    fn closed_by_server(&self) -> bool {
        self.state().is_connected() && self.connection.state() == ConnectionState::Closed
    }

    fn stop_tasks(&self) {
        let mut tasks = self.tasks.lock();
        for handle in [tasks.audio_forwarder.take(), tasks.device_watcher.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut();
        for handle in [
            tasks.dispatcher.take(),
            tasks.audio_forwarder.take(),
            tasks.device_watcher.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

// =============================================================================
// Gemini Live Transport
// =============================================================================

/// Host transport backed by a Gemini Live session.
///
/// # Example
///
/// ```rust,ignore
/// use gemini_live_host_api::{ClientOptions, SharedEventSink, Transport, TransportEvent};
/// use gemini_live_transport::session::{GeminiLiveTransport, TransportSettings};
/// use std::sync::Arc;
///
/// let options = ClientOptions::default().with_llm_option("api_key", "...".into());
/// let sink: SharedEventSink = Arc::new(|event: TransportEvent| println!("{:?}", event));
/// let transport = GeminiLiveTransport::new(options, TransportSettings::default(), backend, sink);
///
/// transport.init_devices().await?;
/// transport.connect().await?;
/// ```
pub struct GeminiLiveTransport {
    inner: Arc<Inner>,
}

impl GeminiLiveTransport {
    pub fn new(
        options: ClientOptions,
        settings: TransportSettings,
        backend: Arc<dyn AudioBackend>,
        events: SharedEventSink,
    ) -> Self {
        log_unsupported_options(&options);

        let (tx, rx) = mpsc::unbounded_channel();
        let connection =
            GeminiLiveConnection::new(connection_config(&options, &settings.connection), tx);
        let devices = Arc::new(AudioDeviceManager::new(backend));
        let bot = Arc::new(Mutex::new(new_bot_participant()));

        let level_events = events.clone();
        let capture = AudioCapture::new(
            devices.clone(),
            settings.capture_level_boost,
            Arc::new(move |level| level_events.emit(TransportEvent::UserAudioLevel(level))),
        );

        let playback_events = events.clone();
        let playback_bot = bot.clone();
        let playback = AudioPlayback::new(
            devices.clone(),
            Arc::new(move |event| {
                let participant = playback_bot.lock().clone();
                let event = match event {
                    PlaybackEvent::Started => TransportEvent::BotStartedSpeaking(participant),
                    PlaybackEvent::Stopped => TransportEvent::BotStoppedSpeaking(participant),
                    PlaybackEvent::AudioLevel(level) => {
                        TransportEvent::RemoteAudioLevel { level, participant }
                    }
                };
                playback_events.emit(event);
            }),
        );

        Self {
            inner: Arc::new(Inner {
                options,
                settings,
                events,
                connection,
                connection_events: Mutex::new(Some(rx)),
                devices,
                capture,
                playback,
                bot,
                transitions: Mutex::new(()),
                session: Mutex::new(SessionState {
                    state: TransportState::Disconnected,
                    devices_initialized: false,
                    selected_mic: None,
                    local_audio_track: None,
                    bot_audio_track: None,
                }),
                tasks: Mutex::new(SessionTasks::default()),
            }),
        }
    }

    pub fn connection(&self) -> &GeminiLiveConnection {
        &self.inner.connection
    }

    /// The remote model participant for the current connection.
    pub fn bot_participant(&self) -> Participant {
        self.inner.bot()
    }

    /// Whether the server closed the session while the transport still
    /// reports `connected` or `ready`. Call `disconnect()` to reset before
    /// connecting again.
    pub fn is_closed_by_server(&self) -> bool {
        self.inner.closed_by_server()
    }

    /// Re-enumerate input devices and report changes to the host. Returns
    /// whether the device list changed.
    pub fn refresh_devices(&self) -> bool {
        self.inner.refresh_devices()
    }
}

#[async_trait]
impl Transport for GeminiLiveTransport {
    async fn init_devices(&self) -> HostResult<()> {
        let inner = &self.inner;
        if inner.session.lock().devices_initialized {
            return Ok(());
        }

        inner.set_state(TransportState::Initializing);
        inner.devices.acquire();

        inner.emit(TransportEvent::AvailableMicsUpdated(inner.all_mics()));
        let selected = inner.selected_mic();
        inner.session.lock().selected_mic = selected.clone();
        inner.emit(TransportEvent::MicUpdated(selected));

        inner.start_device_watcher();

        inner.set_state(TransportState::Initialized);
        inner.session.lock().devices_initialized = true;
        Ok(())
    }

    fn release(&self) {
        let inner = &self.inner;
        inner.capture.stop();
        inner.playback.stop();
        inner.devices.release();
        inner.stop_tasks();

        let mut session = inner.session.lock();
        session.devices_initialized = false;
        session.selected_mic = None;
    }

    async fn connect(&self) -> HostResult<()> {
        let inner = &self.inner;
        {
            let _transition = inner.transitions.lock();
            let state = inner.state();
            if matches!(
                state,
                TransportState::Connecting | TransportState::Connected | TransportState::Ready
            ) {
                error!("connect() called while {}", state);
                return Err(HostError::InvalidState(format!(
                    "connect() called while {}",
                    state
                )));
            }
            inner.apply_state(TransportState::Connecting);
        }

        inner.ensure_dispatcher();

        if let Err(e) = inner.playback.start() {
            error!("Failed to start audio playback: {}", e);
        }
        inner.hook_up_audio_input();
        // Resume before connecting so is_mic_enabled() is accurate once connected.
        if inner.options.enable_mic
            && let Err(e) = inner.capture.resume()
        {
            error!("Failed to start audio capture: {}", e);
        }

        if let Err(e) = inner.connection.connect().await {
            error!("Failed to connect to Gemini Live: {}", e);
            if let Err(e) = inner.connection.disconnect().await {
                warn!("Failed to close connection: {}", e);
            }
            inner.capture.stop();
            inner.playback.stop();
            inner.set_state(TransportState::Disconnected);
            return Err(HostError::ConnectionFailed(e.to_string()));
        }

        inner.update_tracks(
            Some(MediaTrackId(uuid::Uuid::new_v4().to_string())),
            Some(MediaTrackId(uuid::Uuid::new_v4().to_string())),
        );

        // Unless setup completion already moved us on to ready.
        inner.transition_if(TransportState::Connecting, TransportState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> HostResult<()> {
        let inner = &self.inner;
        if inner.closed_by_server() {
            info!(
                "Gemini Live session was already closed by the server; transport state was still {}",
                inner.state()
            );
        }
        if let Err(e) = inner.connection.disconnect().await {
            warn!("Failed to close connection: {}", e);
        }
        inner.capture.stop();
        inner.playback.stop();
        inner.update_tracks(None, None);
        inner.set_state(TransportState::Disconnected);
        Ok(())
    }

    fn get_all_mics(&self) -> Vec<MediaDeviceInfo> {
        self.inner.all_mics()
    }

    fn get_all_cams(&self) -> Vec<MediaDeviceInfo> {
        log_not_supported("get_all_cams");
        Vec::new()
    }

    async fn update_mic(&self, mic_id: MediaDeviceId) -> HostResult<()> {
        self.inner.devices.set_preferred_device(Some(mic_id.0));
        self.inner.update_selected_mic_if_needed();
        Ok(())
    }

    async fn update_cam(&self, _cam_id: MediaDeviceId) -> HostResult<()> {
        log_not_supported("update_cam");
        Ok(())
    }

    fn selected_mic(&self) -> Option<MediaDeviceInfo> {
        self.inner.selected_mic()
    }

    fn selected_cam(&self) -> Option<MediaDeviceInfo> {
        log_not_supported("selected_cam");
        None
    }

    async fn enable_mic(&self, enable: bool) -> HostResult<()> {
        if enable {
            self.inner
                .capture
                .resume()
                .map_err(|e| HostError::DeviceError(e.to_string()))
        } else {
            self.inner.capture.pause();
            Ok(())
        }
    }

    async fn enable_cam(&self, _enable: bool) -> HostResult<()> {
        log_not_supported("enable_cam");
        Ok(())
    }

    fn is_mic_enabled(&self) -> bool {
        self.inner.capture.is_recording()
    }

    fn is_cam_enabled(&self) -> bool {
        log_not_supported("is_cam_enabled");
        false
    }

    async fn send_message(&self, message: OutboundMessage) -> HostResult<()> {
        let inner = &self.inner;
        match HostAction::from_message(&message) {
            HostAction::AppendToMessages(messages) => {
                for context in &messages {
                    let turn = ClientMessage::from_context(context);
                    if let Err(e) = inner.connection.send_message(&turn).await {
                        warn!("Failed to append messages: {}", e);
                        inner.emit(TransportEvent::Message(error_response(&message.id)));
                        return Err(host_error(e));
                    }
                }
                inner.emit(TransportEvent::Message(action_response(&message.id)?));
                Ok(())
            }
            HostAction::InvalidArguments => {
                warn!(
                    "'{}' action without a valid '{}' argument",
                    APPEND_TO_MESSAGES, MESSAGES_ARGUMENT
                );
                inner.emit(TransportEvent::Message(error_response(&message.id)));
                Ok(())
            }
            HostAction::Unsupported(operation) => {
                log_not_supported(&operation);
                inner.emit(TransportEvent::Message(error_response(&message.id)));
                Ok(())
            }
        }
    }

    fn state(&self) -> TransportState {
        self.inner.state()
    }

    fn tracks(&self) -> Option<Tracks> {
        Some(self.inner.tracks())
    }

    fn expiry(&self) -> Option<i64> {
        None
    }
}
