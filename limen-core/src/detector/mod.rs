//! Speech detector abstraction.
//!
//! The `SpeechDetector` trait is the primary extensibility point: the gate
//! consumes a probability stream and never cares whether it came from the
//! neural Silero model or the amplitude fallback. The threshold is applied
//! by the gate state machine, not here.

pub mod amplitude;
pub mod loader;

#[cfg(feature = "onnx")]
pub mod silero;

#[cfg(feature = "onnx")]
pub use silero::SileroDetector;

pub use amplitude::AmplitudeDetector;
pub use loader::{load, DetectorSelection};

use serde::{Deserialize, Serialize};

use crate::buffering::chunk::AudioChunk;
use crate::error::Result;

/// Per-chunk output of the active detector. Ephemeral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionResult {
    /// Speech probability in [0.0, 1.0].
    pub probability: f32,
    /// Sequence number of the chunk that produced this result.
    pub chunk_seq: u64,
}

/// Which detector variant is active for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    /// Model-based detector (Silero VAD over ONNX Runtime).
    Neural,
    /// Energy-threshold fallback.
    Amplitude,
}

/// Trait for all detector implementations.
///
/// Implementors may be stateful (RNN hidden states, window carry-over).
/// Selection happens once at load time; the session holds the strategy as a
/// boxed value for its whole lifetime.
pub trait SpeechDetector: Send + 'static {
    /// Speech probability for `chunk`, in [0.0, 1.0].
    ///
    /// Deterministic given the chunk and the detector's internal state. The
    /// chunk's `sample_rate` must match whatever rate this detector was
    /// configured for; resampling is the caller's responsibility.
    fn probability(&mut self, chunk: &AudioChunk) -> Result<f32>;

    /// Reset any internal state (e.g. hidden states, window carry-over).
    fn reset(&mut self);
}
