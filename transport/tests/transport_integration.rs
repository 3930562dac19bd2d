//! Session orchestration end to end: host transport on one side, mock
//! Gemini Live server and in-memory audio devices on the other.

mod common;

use bytes::Bytes;
use serde_json::{Value, json};

use common::{EventRecorder, MockLiveServer, TestBackend, eventually, pcm16};
use gemini_live_host_api::{
    ActionArgument, ActionData, ClientOptions, HostError, InboundMessageType, OutboundMessage,
    Transport, TransportEvent, TransportState,
};
use gemini_live_transport::core::audio::{AudioChunk, AudioFormat};
use gemini_live_transport::core::realtime::gemini::GeminiLiveConfig;
use gemini_live_transport::session::{
    APPEND_TO_MESSAGES, LLM_API_KEY, LLM_INITIAL_MESSAGES, LLM_SERVICE, MESSAGES_ARGUMENT,
};
use gemini_live_transport::{GeminiLiveTransport, TransportSettings};

struct Harness {
    server: MockLiveServer,
    backend: TestBackend,
    recorder: EventRecorder,
    transport: GeminiLiveTransport,
    /// Context turns replayed after `setup` on every connect.
    initial_turns: usize,
}

fn settings_for(endpoint: &str) -> TransportSettings {
    TransportSettings {
        connection: GeminiLiveConfig {
            endpoint: endpoint.to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn harness(options: ClientOptions) -> Harness {
    let initial_turns = options
        .llm_option(LLM_INITIAL_MESSAGES)
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    let server = MockLiveServer::start().await;
    let backend = TestBackend::new();
    let recorder = EventRecorder::new();
    let transport = GeminiLiveTransport::new(
        options,
        settings_for(&server.endpoint),
        backend.shared(),
        recorder.sink(),
    );
    Harness {
        server,
        backend,
        recorder,
        transport,
        initial_turns,
    }
}

fn default_options() -> ClientOptions {
    ClientOptions::default()
        .with_llm_option(LLM_API_KEY, json!("K"))
        .with_llm_option(
            LLM_INITIAL_MESSAGES,
            json!([{"role": "user", "content": "hi"}]),
        )
}

/// Connect and wait for the server to acknowledge the setup. The setup and
/// initial context frames are consumed.
async fn connect_ready(h: &Harness) {
    h.transport.init_devices().await.unwrap();
    h.transport.connect().await.unwrap();
    h.server.next_frame_of("setup").await;
    for _ in 0..h.initial_turns {
        h.server.next_frame_of("clientContent").await;
    }
    h.server.send_setup_complete();
    h.recorder
        .wait_for(|e| *e == TransportEvent::StateChanged(TransportState::Ready))
        .await;
}

fn append_action(id: &str, messages: Value) -> OutboundMessage {
    OutboundMessage::action(
        id,
        ActionData {
            service: LLM_SERVICE.to_string(),
            action: APPEND_TO_MESSAGES.to_string(),
            arguments: Some(vec![ActionArgument {
                name: MESSAGES_ARGUMENT.to_string(),
                value: messages,
            }]),
        },
    )
}

fn is_message(event: &TransportEvent, msg_type: InboundMessageType, id: &str) -> bool {
    matches!(event, TransportEvent::Message(m) if m.msg_type == msg_type && m.id == id)
}

#[tokio::test]
async fn test_session_lifecycle() {
    let h = harness(default_options()).await;

    h.transport.init_devices().await.unwrap();
    assert_eq!(h.transport.state(), TransportState::Initialized);
    assert_eq!(h.transport.get_all_mics().len(), 1);
    assert_eq!(
        h.transport.selected_mic().map(|m| m.name),
        Some("Test Microphone".to_string())
    );

    h.transport.connect().await.unwrap();
    assert_eq!(h.transport.state(), TransportState::Connected);
    assert!(h.transport.is_mic_enabled());

    let setup = h.server.next_frame().await;
    assert_eq!(setup["setup"]["model"], "models/gemini-2.0-flash-exp");
    let initial = h.server.next_frame().await;
    assert_eq!(initial["clientContent"]["turns"][0]["role"], "USER");
    assert_eq!(initial["clientContent"]["turns"][0]["parts"][0]["text"], "hi");

    let tracks = h.transport.tracks().unwrap();
    assert!(tracks.local.audio.is_some());
    assert!(tracks.bot.and_then(|b| b.audio).is_some());

    h.server.send_setup_complete();
    h.recorder
        .wait_for(|e| *e == TransportEvent::StateChanged(TransportState::Ready))
        .await;

    let events = h.recorder.events();
    let states: Vec<TransportState> = events
        .iter()
        .filter_map(|e| match e {
            TransportEvent::StateChanged(state) => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            TransportState::Initializing,
            TransportState::Initialized,
            TransportState::Connecting,
            TransportState::Connected,
            TransportState::Ready,
        ]
    );
    let bot_ready = events
        .iter()
        .position(|e| matches!(e, TransportEvent::Message(m) if m.msg_type == InboundMessageType::BotReady))
        .expect("bot-ready not sent");
    let ready = events
        .iter()
        .position(|e| *e == TransportEvent::StateChanged(TransportState::Ready))
        .unwrap();
    assert!(bot_ready < ready);
    assert!(events.contains(&TransportEvent::Connected));
    assert!(events.iter().any(|e| matches!(e, TransportEvent::BotConnected(p) if !p.local)));

    h.recorder.clear();
    h.transport.disconnect().await.unwrap();
    assert_eq!(h.transport.state(), TransportState::Disconnected);
    assert!(!h.transport.is_mic_enabled());

    let events = h.recorder.events();
    assert!(events.iter().any(|e| matches!(e, TransportEvent::ParticipantLeft(_))));
    assert!(events.iter().any(|e| matches!(e, TransportEvent::BotDisconnected(_))));
    assert!(events.contains(&TransportEvent::Disconnected));
    assert!(eventually(|| h.server.disconnects() == 1).await);

    h.transport.release();
}

#[tokio::test]
async fn test_microphone_audio_reaches_server_after_setup() {
    let h = harness(default_options()).await;
    connect_ready(&h).await;

    h.backend.capture(AudioChunk::new(
        AudioFormat::wire(),
        Bytes::from(pcm16(&[1, 2, 3, 4])),
    ));

    let frame = h.server.next_frame_of("realtimeInput").await;
    let media = &frame["realtimeInput"]["mediaChunks"][0];
    assert_eq!(media["mimeType"], "audio/pcm;rate=24000");
    assert_eq!(media["data"], "AQACAAMABAA=");

    h.transport.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_model_audio_drives_bot_speaking_events() {
    let h = harness(default_options()).await;
    connect_ready(&h).await;

    h.server.send_model_audio(&pcm16(&[1000; 240]));
    h.recorder
        .wait_for(|e| matches!(e, TransportEvent::BotStartedSpeaking(_)))
        .await;
    assert!(eventually(|| h.backend.pending() == 1).await);

    assert!(h.backend.complete_next());
    h.recorder
        .wait_for(|e| matches!(e, TransportEvent::BotStoppedSpeaking(_)))
        .await;

    h.transport.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_model_turn_speaks_once_across_chunks() {
    let h = harness(default_options()).await;
    connect_ready(&h).await;

    for _ in 0..3 {
        h.server.send_model_audio(&pcm16(&[1000; 240]));
    }
    assert!(eventually(|| h.backend.pending() == 3).await);

    assert!(h.backend.complete_next());
    assert!(h.backend.complete_next());
    let speaking = |recorder: &EventRecorder| {
        let events = recorder.events();
        let started = events
            .iter()
            .filter(|e| matches!(e, TransportEvent::BotStartedSpeaking(_)))
            .count();
        let stopped = events
            .iter()
            .filter(|e| matches!(e, TransportEvent::BotStoppedSpeaking(_)))
            .count();
        (started, stopped)
    };
    assert_eq!(speaking(&h.recorder), (1, 0));

    assert!(h.backend.complete_next());
    h.recorder
        .wait_for(|e| matches!(e, TransportEvent::BotStoppedSpeaking(_)))
        .await;
    assert_eq!(speaking(&h.recorder), (1, 1));
    assert_eq!(h.backend.total_scheduled(), 3);

    h.transport.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_server_close_leaves_state_until_disconnect() {
    let h = harness(default_options()).await;
    connect_ready(&h).await;
    assert!(!h.transport.is_closed_by_server());

    h.server.close();
    assert!(eventually(|| h.transport.is_closed_by_server()).await);
    assert_eq!(h.transport.state(), TransportState::Ready);

    h.transport.disconnect().await.unwrap();
    assert!(!h.transport.is_closed_by_server());
    assert_eq!(h.transport.state(), TransportState::Disconnected);

    h.transport.connect().await.unwrap();
    let setup = h.server.next_frame_of("setup").await;
    assert_eq!(setup["setup"]["model"], "models/gemini-2.0-flash-exp");
    assert_eq!(h.server.connections(), 2);

    h.transport.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_interruption_flushes_playback() {
    let h = harness(default_options()).await;
    connect_ready(&h).await;

    h.server.send_model_audio(&pcm16(&[1000; 240]));
    h.server.send_model_audio(&pcm16(&[1000; 240]));
    assert!(eventually(|| h.backend.pending() == 2).await);

    h.server.send_interrupted();
    h.recorder
        .wait_for(|e| *e == TransportEvent::UserStartedSpeaking)
        .await;
    assert_eq!(h.backend.pending(), 0);

    let events = h.recorder.events();
    let stopped = events
        .iter()
        .position(|e| matches!(e, TransportEvent::BotStoppedSpeaking(_)))
        .expect("bot should stop speaking on interruption");
    let interrupted = events
        .iter()
        .position(|e| *e == TransportEvent::UserStartedSpeaking)
        .unwrap();
    assert!(stopped < interrupted);

    h.transport.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_append_to_messages_is_acknowledged() {
    let h = harness(default_options()).await;
    connect_ready(&h).await;

    h.transport
        .send_message(append_action(
            "m1",
            json!([
                {"role": "user", "content": "one"},
                {"role": "assistant", "content": "two"}
            ]),
        ))
        .await
        .unwrap();

    let first = h.server.next_frame_of("clientContent").await;
    assert_eq!(first["clientContent"]["turns"][0]["parts"][0]["text"], "one");
    let second = h.server.next_frame_of("clientContent").await;
    assert_eq!(second["clientContent"]["turns"][0]["role"], "SYSTEM");
    assert_eq!(second["clientContent"]["turns"][0]["parts"][0]["text"], "two");

    let ack = h
        .recorder
        .wait_for(|e| is_message(e, InboundMessageType::ActionResponse, "m1"))
        .await;
    if let TransportEvent::Message(message) = ack {
        let data: Value = serde_json::from_str(&message.data).unwrap();
        assert_eq!(data, json!({"result": true}));
    }

    h.transport.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_unsupported_messages_get_error_responses() {
    let h = harness(default_options()).await;
    connect_ready(&h).await;

    h.transport
        .send_message(OutboundMessage::new("m2", "client-ready", None))
        .await
        .unwrap();
    h.recorder
        .wait_for(|e| is_message(e, InboundMessageType::ErrorResponse, "m2"))
        .await;

    h.transport
        .send_message(append_action("m3", json!("not a list")))
        .await
        .unwrap();
    h.recorder
        .wait_for(|e| is_message(e, InboundMessageType::ErrorResponse, "m3"))
        .await;

    h.transport.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_microphone_disabled_by_option() {
    let h = harness(default_options().with_enable_mic(false)).await;
    connect_ready(&h).await;
    assert!(!h.transport.is_mic_enabled());
    assert!(!h.backend.is_capturing());

    h.transport.enable_mic(true).await.unwrap();
    assert!(h.transport.is_mic_enabled());
    assert!(h.backend.is_capturing());

    h.transport.enable_mic(false).await.unwrap();
    assert!(!h.transport.is_mic_enabled());

    h.transport.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_connect_failure_returns_to_disconnected() {
    let backend = TestBackend::new();
    let recorder = EventRecorder::new();
    let transport = GeminiLiveTransport::new(
        default_options(),
        settings_for("ws://127.0.0.1:1/live"),
        backend.shared(),
        recorder.sink(),
    );

    let result = transport.connect().await;
    assert!(matches!(result, Err(HostError::ConnectionFailed(_))));
    assert_eq!(transport.state(), TransportState::Disconnected);
    assert!(!transport.is_mic_enabled());

    let events = recorder.events();
    assert!(events.contains(&TransportEvent::StateChanged(TransportState::Connecting)));
    assert!(events.contains(&TransportEvent::StateChanged(TransportState::Disconnected)));
    assert!(!events.contains(&TransportEvent::Connected));
}
