//! Microphone capture pipeline.
//!
//! [`AudioCapture`] owns the input tap. Every captured block is metered,
//! converted to wire format and pushed into the current [`AudioStream`].
//! The stream ends when capture is stopped; call
//! [`AudioCapture::stream_audio`] again to start a new one.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::backend::InputTap;
use super::base::{AudioChunk, AudioResult};
use super::converter::AudioConverter;
use super::devices::AudioDeviceManager;
use super::level::normalized_level;

/// Boost applied to microphone RMS before clamping into `[0, 1]`.
pub const DEFAULT_CAPTURE_LEVEL_BOOST: f32 = 10.0;

/// Receives the normalized level of each captured block.
pub type AudioLevelCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// Wire-format chunks produced by capture, in capture order.
pub struct AudioStream {
    rx: mpsc::UnboundedReceiver<AudioChunk>,
}

impl Stream for AudioStream {
    type Item = AudioChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// State reached from the backend's audio thread.
struct CaptureShared {
    sender: Mutex<Option<mpsc::UnboundedSender<AudioChunk>>>,
    converter: AudioConverter,
    level_boost: f32,
    on_level: AudioLevelCallback,
}

impl CaptureShared {
    fn handle_block(&self, block: AudioChunk) {
        let samples = block.samples_f32();
        (self.on_level)(normalized_level(&samples, self.level_boost));

        let chunk = self.converter.convert_or_empty(&block);
        if chunk.is_empty() {
            return;
        }

        if let Some(tx) = self.sender.lock().as_ref() {
            if tx.send(chunk).is_err() {
                tracing::trace!("Audio stream receiver dropped; discarding captured chunk");
            }
        }
    }
}

pub struct AudioCapture {
    devices: Arc<AudioDeviceManager>,
    tap: Mutex<Option<Box<dyn InputTap>>>,
    recording: AtomicBool,
    shared: Arc<CaptureShared>,
}

impl AudioCapture {
    pub fn new(
        devices: Arc<AudioDeviceManager>,
        level_boost: f32,
        on_level: AudioLevelCallback,
    ) -> Self {
        Self {
            devices,
            tap: Mutex::new(None),
            recording: AtomicBool::new(false),
            shared: Arc::new(CaptureShared {
                sender: Mutex::new(None),
                converter: AudioConverter::to_wire(),
                level_boost,
                on_level,
            }),
        }
    }

    /// Start a new chunk stream, ending the previous one if any.
    pub fn stream_audio(&self) -> AudioStream {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.sender.lock() = Some(tx);
        AudioStream { rx }
    }

    /// Start or resume capturing. No-op if already recording.
    pub fn resume(&self) -> AudioResult<()> {
        let mut tap = self.tap.lock();
        if tap.is_some() && self.recording.load(Ordering::SeqCst) {
            return Ok(());
        }

        if tap.is_none() {
            let device = self.devices.current_input_device();
            let shared = self.shared.clone();
            let opened = self.devices.backend().open_input(
                device.as_ref(),
                Box::new(move |block| shared.handle_block(block)),
            )?;
            tracing::info!(
                "Opened input tap on {} ({})",
                device.as_ref().map(|d| d.name.as_str()).unwrap_or("default device"),
                opened.format()
            );
            *tap = Some(opened);
        }

        if let Some(tap) = tap.as_mut() {
            tap.play()?;
        }
        self.recording.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn start(&self) -> AudioResult<()> {
        self.resume()
    }

    /// Suspend delivery while keeping the tap open.
    pub fn pause(&self) {
        let mut tap = self.tap.lock();
        if let Some(tap) = tap.as_mut() {
            if let Err(e) = tap.pause() {
                tracing::warn!("Failed to pause input tap: {}", e);
            }
        }
        self.recording.store(false, Ordering::SeqCst);
    }

    /// Release the tap and end the current chunk stream.
    pub fn stop(&self) {
        self.release_tap();
        self.shared.sender.lock().take();
    }

    /// Rebuild the tap against the current device if recording.
    pub fn adapt_to_device_change(&self) -> AudioResult<()> {
        if !self.is_recording() {
            return Ok(());
        }
        self.release_tap();
        self.resume()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    fn release_tap(&self) {
        let released = self.tap.lock().take();
        self.recording.store(false, Ordering::SeqCst);
        if released.is_some() {
            tracing::debug!("Released input tap");
        }
    }
}
