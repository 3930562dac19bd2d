//! Audio level metering.

/// Root-mean-square of a block of samples. Empty blocks are silent.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Scale an RMS value into `[0, 1]` for UI metering.
///
/// Speech RMS rarely exceeds 0.1, so capture applies a boost before
/// clamping; playback uses a boost of 1.
pub fn normalized_level(samples: &[f32], boost: f32) -> f32 {
    let level = rms(samples) * boost;
    if level.is_nan() {
        return 0.0;
    }
    level.clamp(0.0, 1.0)
}
