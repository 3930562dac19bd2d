//! Device backend abstraction.
//!
//! The pipelines never talk to audio hardware directly. They open input taps
//! and output sinks through an [`AudioBackend`], so the real device layer
//! (`cpal`, behind the `device-audio` feature) can be swapped for an
//! in-memory backend.
//!
//! Callbacks registered with taps and sinks run on backend threads and must
//! not block.

use super::base::{AudioChunk, AudioFormat, AudioResult};

/// An audio device as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
}

impl AudioDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Receives each captured block in the device's native format.
pub type InputCallback = Box<dyn FnMut(AudioChunk) + Send + 'static>;

/// Invoked once when a scheduled buffer has finished playing.
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// Source of input taps and output sinks.
pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &str;

    fn input_devices(&self) -> AudioResult<Vec<AudioDevice>>;

    fn default_input_device(&self) -> Option<AudioDevice>;

    /// Open a tap on `device`, or on the default input when `None`.
    /// The tap starts paused.
    fn open_input(
        &self,
        device: Option<&AudioDevice>,
        on_block: InputCallback,
    ) -> AudioResult<Box<dyn InputTap>>;

    /// Open the default output route. The sink starts paused.
    fn open_output(&self) -> AudioResult<Box<dyn OutputSink>>;
}

/// A live capture tap. Dropping it releases the device.
pub trait InputTap: Send {
    fn format(&self) -> AudioFormat;

    fn play(&mut self) -> AudioResult<()>;

    fn pause(&mut self) -> AudioResult<()>;
}

/// A live output route. Dropping it releases the device and discards
/// anything still scheduled.
pub trait OutputSink: Send {
    /// Format that scheduled chunks must be in.
    fn format(&self) -> AudioFormat;

    fn play(&mut self) -> AudioResult<()>;

    /// Queue a chunk after everything already scheduled.
    fn schedule(&mut self, chunk: AudioChunk, on_complete: CompletionCallback)
    -> AudioResult<()>;

    /// Discard every scheduled buffer. Completions of discarded buffers may
    /// or may not run.
    fn flush(&mut self);
}
