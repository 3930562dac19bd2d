//! Sample-rate, channel and sample-format conversion.
//!
//! The converter is stateless: every chunk is converted on its own.
//!
//! ## Remainder policy
//!
//! - Trailing bytes that do not form a whole input frame are dropped.
//! - The output frame count is `floor(in_frames * dst_rate / src_rate)`
//!   (see [`output_frame_count`]); the fractional frame is dropped.
//!
//! Resampling uses linear interpolation. Downmixing averages all channels;
//! upmixing from mono copies the single channel. Other channel changes
//! take the mono mix and copy it to every output channel.

use super::base::{AudioChunk, AudioError, AudioFormat, AudioResult, SampleFormat};

/// Number of frames produced when resampling `in_frames` frames.
pub fn output_frame_count(in_frames: usize, src_rate: u32, dst_rate: u32) -> usize {
    if src_rate == 0 {
        return 0;
    }
    ((in_frames as u64 * dst_rate as u64) / src_rate as u64) as usize
}

/// Converts chunks to a fixed target format.
#[derive(Debug, Clone, Copy)]
pub struct AudioConverter {
    target: AudioFormat,
}

impl AudioConverter {
    pub fn new(target: AudioFormat) -> Self {
        Self { target }
    }

    /// Converter producing wire-format audio.
    pub fn to_wire() -> Self {
        Self::new(AudioFormat::wire())
    }

    pub fn target(&self) -> AudioFormat {
        self.target
    }

    pub fn convert(&self, chunk: &AudioChunk) -> AudioResult<AudioChunk> {
        let source = chunk.format();
        if !source.is_valid() {
            return Err(AudioError::Conversion(format!(
                "invalid source format {}",
                source
            )));
        }
        if !self.target.is_valid() {
            return Err(AudioError::Conversion(format!(
                "invalid target format {}",
                self.target
            )));
        }

        if source == self.target {
            let usable = chunk.frame_count() * source.bytes_per_frame();
            return Ok(AudioChunk::new(
                self.target,
                chunk.data().slice(..usable),
            ));
        }

        let samples = chunk.samples_f32();
        let mixed = mix_channels(&samples, source.channels, self.target.channels);
        let resampled = resample_linear(
            &mixed,
            self.target.channels,
            source.sample_rate,
            self.target.sample_rate,
        );

        Ok(encode(self.target, &resampled))
    }

    /// Convert, substituting a zero-length chunk on failure.
    pub fn convert_or_empty(&self, chunk: &AudioChunk) -> AudioChunk {
        match self.convert(chunk) {
            Ok(converted) => converted,
            Err(e) => {
                tracing::warn!("Audio conversion to {} failed: {}", self.target, e);
                AudioChunk::empty(self.target)
            }
        }
    }
}

/// Change the channel count of interleaved samples.
pub fn mix_channels(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }

    let from = from as usize;
    let to = to as usize;
    let mono = samples
        .chunks_exact(from)
        .map(|frame| frame.iter().sum::<f32>() / from as f32);

    if to == 1 {
        return mono.collect();
    }

    let mut out = Vec::with_capacity(samples.len() / from * to);
    for sample in mono {
        out.extend(std::iter::repeat_n(sample, to));
    }
    out
}

/// Resample interleaved samples by linear interpolation.
pub fn resample_linear(samples: &[f32], channels: u16, src_rate: u32, dst_rate: u32) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    let in_frames = samples.len() / channels;
    if src_rate == dst_rate {
        return samples[..in_frames * channels].to_vec();
    }

    let out_frames = output_frame_count(in_frames, src_rate, dst_rate);
    if in_frames == 0 || out_frames == 0 {
        return Vec::new();
    }

    let step = src_rate as f64 / dst_rate as f64;
    let last = in_frames - 1;
    let mut out = Vec::with_capacity(out_frames * channels);

    for i in 0..out_frames {
        let position = i as f64 * step;
        let index = (position.floor() as usize).min(last);
        let next = (index + 1).min(last);
        let frac = (position - index as f64) as f32;

        for c in 0..channels {
            let a = samples[index * channels + c];
            let b = samples[next * channels + c];
            out.push(a + (b - a) * frac);
        }
    }

    out
}

fn encode(format: AudioFormat, samples: &[f32]) -> AudioChunk {
    match format.sample_format {
        SampleFormat::F32 => AudioChunk::from_f32(format.sample_rate, format.channels, samples),
        SampleFormat::I16 => {
            let pcm: Vec<i16> = samples
                .iter()
                .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
                .collect();
            AudioChunk::from_i16(format.sample_rate, format.channels, &pcm)
        }
    }
}
