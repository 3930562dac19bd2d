//! Base types for the audio pipelines.
//!
//! Audio moves through the crate as [`AudioChunk`]s: immutable blocks of
//! interleaved little-endian PCM tagged with their [`AudioFormat`]. Chunks
//! are produced by capture (device format) or by the session connection
//! (wire format) and converted by [`super::converter`] on the way through.
//!
//! # Wire Format
//!
//! Both directions use PCM 16-bit signed little-endian, mono, 24kHz.

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// Sample rate of audio exchanged with the service, both directions.
pub const WIRE_SAMPLE_RATE: u32 = 24000;

/// Channel count of audio exchanged with the service.
pub const WIRE_CHANNELS: u16 = 1;

/// Audio-level reports per second.
pub const AUDIO_LEVEL_REPORTS_PER_SECOND: u32 = 10;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by the audio pipelines and device backends.
#[derive(Debug, Error)]
pub enum AudioError {
    /// A chunk could not be converted between formats
    #[error("Conversion failed: {0}")]
    Conversion(String),

    /// No usable device
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The device stream could not be built, started or paused
    #[error("Stream error: {0}")]
    Stream(String),

    /// Backend-specific failure
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;

// =============================================================================
// Formats
// =============================================================================

/// Encoding of a single sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// 16-bit signed integer, little-endian
    I16,
    /// 32-bit float in `[-1.0, 1.0]`, little-endian
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::I16 => 2,
            Self::F32 => 4,
        }
    }
}

/// Layout of interleaved PCM data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
        }
    }

    /// The format used on the wire.
    pub const fn wire() -> Self {
        Self::new(WIRE_SAMPLE_RATE, WIRE_CHANNELS, SampleFormat::I16)
    }

    /// Float format at the given rate and channel count, as delivered by
    /// most device backends.
    pub const fn float(sample_rate: u32, channels: u16) -> Self {
        Self::new(sample_rate, channels, SampleFormat::F32)
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.sample_format.bytes_per_sample() * self.channels as usize
    }

    /// Whether the format describes something that can carry audio.
    pub fn is_valid(&self) -> bool {
        self.sample_rate > 0 && self.channels > 0
    }

    /// MIME type announced for chunks in this format.
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/{:?}",
            self.sample_rate, self.channels, self.sample_format
        )
    }
}

// =============================================================================
// Chunks
// =============================================================================

/// A block of interleaved PCM audio in a known format.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    format: AudioFormat,
    data: Bytes,
}

impl AudioChunk {
    pub fn new(format: AudioFormat, data: impl Into<Bytes>) -> Self {
        Self {
            format,
            data: data.into(),
        }
    }

    /// Zero-length chunk in the given format.
    pub fn empty(format: AudioFormat) -> Self {
        Self::new(format, Bytes::new())
    }

    /// Encode float samples as an `F32` chunk.
    pub fn from_f32(sample_rate: u32, channels: u16, samples: &[f32]) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 4);
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        Self::new(AudioFormat::float(sample_rate, channels), data)
    }

    /// Encode 16-bit samples as an `I16` chunk.
    pub fn from_i16(sample_rate: u32, channels: u16, samples: &[i16]) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        Self::new(
            AudioFormat::new(sample_rate, channels, SampleFormat::I16),
            data,
        )
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of whole frames. Trailing bytes that do not make up a frame
    /// are not counted.
    pub fn frame_count(&self) -> usize {
        match self.format.bytes_per_frame() {
            0 => 0,
            n => self.data.len() / n,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        if self.format.sample_rate == 0 {
            return 0;
        }
        self.frame_count() as u64 * 1000 / self.format.sample_rate as u64
    }

    /// Decode every whole sample to `f32` in `[-1.0, 1.0]`, interleaved.
    pub fn samples_f32(&self) -> Vec<f32> {
        let usable = self.frame_count() * self.format.bytes_per_frame();
        let bytes = &self.data[..usable];
        match self.format.sample_format {
            SampleFormat::I16 => bytes
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
                .collect(),
            SampleFormat::F32 => bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        }
    }
}
