//! Real-time audio pipeline.
//!
//! - [`AudioCapture`] taps the microphone and streams wire-format chunks.
//! - [`AudioPlayback`] schedules model audio and reports when the bot starts
//!   and stops being audible.
//! - [`AudioDeviceManager`] tracks available devices for a session.
//!
//! Device access goes through the [`AudioBackend`] trait. Enable the
//! `device-audio` feature for the cpal implementation.

pub mod backend;
pub mod base;
pub mod capture;
pub mod converter;
#[cfg(feature = "device-audio")]
pub mod cpal_backend;
pub mod devices;
pub mod level;
pub mod playback;

pub use backend::{
    AudioBackend, AudioDevice, CompletionCallback, InputCallback, InputTap, OutputSink,
};
pub use base::{
    AUDIO_LEVEL_REPORTS_PER_SECOND, AudioChunk, AudioError, AudioFormat, AudioResult,
    SampleFormat, WIRE_CHANNELS, WIRE_SAMPLE_RATE,
};
pub use capture::{AudioCapture, AudioLevelCallback, AudioStream, DEFAULT_CAPTURE_LEVEL_BOOST};
pub use converter::{AudioConverter, output_frame_count};
#[cfg(feature = "device-audio")]
pub use cpal_backend::CpalBackend;
pub use devices::AudioDeviceManager;
pub use playback::{AudioPlayback, PlaybackEvent, PlaybackEventCallback};
