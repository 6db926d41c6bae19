//! Energy-based speech detector, the fallback when no neural model loads.
//!
//! ## Algorithm
//!
//! 1. Compute RMS of the incoming chunk.
//! 2. Map it monotonically into [0, 1) against a fixed noise floor:
//!    `p = rms / (rms + floor)`, so `rms == floor` lands exactly on 0.5.
//!
//! Cheap (~microseconds per chunk) but discriminates by loudness only. The
//! 0.5 midpoint keeps the default gate threshold meaningful after a
//! degradation, though the scale is not semantically equivalent to the
//! neural detector's.

use super::SpeechDetector;
use crate::buffering::chunk::AudioChunk;
use crate::error::Result;

/// A simple energy-based speech detector. Stateless.
#[derive(Debug, Clone)]
pub struct AmplitudeDetector {
    /// RMS level mapped to probability 0.5. Typical range for a quiet
    /// microphone: 0.005–0.05.
    noise_floor: f32,
}

impl AmplitudeDetector {
    /// Create a new `AmplitudeDetector` with the given noise floor.
    pub fn new(noise_floor: f32) -> Self {
        Self {
            noise_floor: noise_floor.max(f32::EPSILON),
        }
    }

    /// Compute the root-mean-square of a sample slice.
    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}

impl Default for AmplitudeDetector {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl SpeechDetector for AmplitudeDetector {
    fn probability(&mut self, chunk: &AudioChunk) -> Result<f32> {
        let rms = Self::rms(&chunk.samples);
        Ok(rms / (rms + self.noise_floor))
    }

    fn reset(&mut self) {}
}
