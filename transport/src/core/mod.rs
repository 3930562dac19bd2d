pub mod audio;
pub mod realtime;

// Re-export commonly used types for convenience
pub use audio::{
    AudioBackend, AudioCapture, AudioChunk, AudioConverter, AudioDeviceManager, AudioError,
    AudioFormat, AudioPlayback, AudioResult, PlaybackEvent,
};

pub use realtime::{
    ConnectionEvent, ConnectionState, GeminiLiveConfig, GeminiLiveConnection, RealtimeError,
    RealtimeResult, SessionEvent,
};
