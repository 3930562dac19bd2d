//! Model audio playback pipeline.
//!
//! [`AudioPlayback`] converts incoming chunks to the output route's format
//! and schedules them on the backend sink. Whether the bot is audibly
//! speaking is derived only from the number of scheduled buffers that have
//! not finished: the first buffer scheduled from idle reports
//! [`PlaybackEvent::Started`], the last completion reports
//! [`PlaybackEvent::Stopped`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

use super::backend::OutputSink;
use super::base::{AudioChunk, AudioFormat, AudioResult};
use super::converter::AudioConverter;
use super::devices::AudioDeviceManager;
use super::level::normalized_level;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackEvent {
    Started,
    Stopped,
    /// Level of a chunk as it is scheduled, in `[0, 1]`.
    AudioLevel(f32),
}

pub type PlaybackEventCallback = Arc<dyn Fn(PlaybackEvent) + Send + Sync>;

const COUNT_MASK: u64 = 0xFFFF_FFFF;

/// Scheduled-but-unfinished buffer count.
///
/// The low 32 bits hold the count and the high 32 bits a generation that
/// changes on every reset, so completions of discarded buffers are ignored.
/// Every threshold check is made on the value returned by the atomic update
/// itself.
#[derive(Debug, Default)]
struct BufferCounter(AtomicU64);

impl BufferCounter {
    fn generation(value: u64) -> u32 {
        (value >> 32) as u32
    }

    fn count(value: u64) -> u32 {
        (value & COUNT_MASK) as u32
    }

    /// Returns the generation the buffer belongs to and whether the count
    /// left zero.
    fn increment(&self) -> (u32, bool) {
        let previous = self.0.fetch_add(1, Ordering::SeqCst);
        (Self::generation(previous), Self::count(previous) == 0)
    }

    /// Returns whether the count reached zero. Stale generations and an
    /// empty count leave the value untouched.
    fn complete(&self, generation: u32) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |value| {
                if Self::generation(value) == generation && Self::count(value) > 0 {
                    Some(value - 1)
                } else {
                    None
                }
            })
            .map(|previous| Self::count(previous) == 1)
            .unwrap_or(false)
    }

    /// Zero the count and start a new generation. Returns whether the count
    /// was nonzero.
    fn reset(&self) -> bool {
        let previous = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |value| {
                let next = Self::generation(value).wrapping_add(1) as u64;
                Some(next << 32)
            })
            .unwrap_or_else(|value| value);
        Self::count(previous) > 0
    }

    fn current(&self) -> usize {
        Self::count(self.0.load(Ordering::SeqCst)) as usize
    }
}

struct PlaybackShared {
    counter: BufferCounter,
    on_event: PlaybackEventCallback,
}

impl PlaybackShared {
    fn buffer_finished(&self, generation: u32) {
        if self.counter.complete(generation) {
            (self.on_event)(PlaybackEvent::Stopped);
        }
    }
}

pub struct AudioPlayback {
    devices: Arc<AudioDeviceManager>,
    sink: Mutex<Option<Box<dyn OutputSink>>>,
    shared: Arc<PlaybackShared>,
}

impl AudioPlayback {
    pub fn new(devices: Arc<AudioDeviceManager>, on_event: PlaybackEventCallback) -> Self {
        Self {
            devices,
            sink: Mutex::new(None),
            shared: Arc::new(PlaybackShared {
                counter: BufferCounter::default(),
                on_event,
            }),
        }
    }

    /// Open the output route if needed and start it.
    pub fn start(&self) -> AudioResult<()> {
        let mut sink = self.sink.lock();
        if sink.is_none() {
            let opened = self.devices.backend().open_output()?;
            tracing::info!("Opened output route ({})", opened.format());
            *sink = Some(opened);
        }
        if let Some(sink) = sink.as_mut() {
            sink.play()?;
        }
        Ok(())
    }

    /// Tear down the output route. Resets the buffer count without
    /// reporting [`PlaybackEvent::Stopped`].
    pub fn stop(&self) {
        let released = self.sink.lock().take();
        self.shared.counter.reset();
        if released.is_some() {
            tracing::debug!("Released output route");
        }
    }

    pub fn is_started(&self) -> bool {
        self.sink.lock().is_some()
    }

    /// Whether any scheduled buffer has not finished playing.
    pub fn is_playing(&self) -> bool {
        self.shared.counter.current() > 0
    }

    pub fn enqueued_buffers(&self) -> usize {
        self.shared.counter.current()
    }

    /// Schedule raw wire-format audio.
    pub fn enqueue_wire_bytes(&self, bytes: Bytes) {
        self.enqueue_bytes(&AudioChunk::new(AudioFormat::wire(), bytes));
    }

    /// Convert and schedule a chunk. Ignored while playback is not started.
    pub fn enqueue_bytes(&self, chunk: &AudioChunk) {
        let mut sink = self.sink.lock();
        let Some(sink) = sink.as_mut() else {
            tracing::trace!("Playback not started; dropping {} bytes", chunk.data().len());
            return;
        };

        let converted = AudioConverter::new(sink.format()).convert_or_empty(chunk);
        if converted.is_empty() {
            return;
        }

        let level = normalized_level(&converted.samples_f32(), 1.0);
        (self.shared.on_event)(PlaybackEvent::AudioLevel(level));

        let (generation, started) = self.shared.counter.increment();
        if started {
            (self.shared.on_event)(PlaybackEvent::Started);
        }

        let shared = self.shared.clone();
        let scheduled = sink.schedule(
            converted,
            Box::new(move || shared.buffer_finished(generation)),
        );
        if let Err(e) = scheduled {
            tracing::error!("Failed to schedule playback buffer: {}", e);
            self.shared.buffer_finished(generation);
        }
    }

    /// Discard everything scheduled. Reports [`PlaybackEvent::Stopped`] if
    /// anything was still pending.
    pub fn clear_enqueued_bytes(&self) {
        let mut sink = self.sink.lock();
        if let Some(sink) = sink.as_mut() {
            sink.flush();
        }
        if self.shared.counter.reset() {
            (self.shared.on_event)(PlaybackEvent::Stopped);
        }
    }

    /// Rebind to the current output route if started.
    pub fn adapt_to_device_change(&self) -> AudioResult<()> {
        if !self.is_started() {
            return Ok(());
        }
        self.stop();
        self.start()
    }
}
