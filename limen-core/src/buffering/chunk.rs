//! Typed audio chunk passed from the frame source to the detector and gate,
//! plus the speech segment handed to the downstream consumer.

use serde::{Deserialize, Serialize};

/// A contiguous block of mono PCM samples at a known sample rate.
///
/// Chunks are produced by the frame source at a fixed cadence and carry a
/// strictly increasing sequence number. They are not retained beyond one
/// processing cycle except while buffered into a [`SpeechSegment`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioChunk {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000, 44100, 48000).
    pub sample_rate: u32,
    /// Monotonic sequence number assigned by the frame source.
    pub seq: u64,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32, seq: u64) -> Self {
        Self {
            samples,
            sample_rate,
            seq,
        }
    }

    /// Returns the duration of this chunk in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Returns true if the chunk contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Why a segment was closed and emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseReason {
    /// The below-threshold run reached the configured minimum silence.
    Silence,
    /// The closing episode exceeded the gate-close timeout ceiling.
    Timeout,
    /// The segment exceeded its maximum duration while the gate stayed open.
    Overflow,
    /// The session was torn down with a segment still in flight.
    Teardown,
}

/// The contiguous audio spanning one gate-open to its matching gate-close.
///
/// Chunks run from the first above-threshold chunk of the opening run through
/// the chunk that triggered closure, in sequence order. Owned exclusively by
/// the emitter until handed downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechSegment {
    pub chunks: Vec<AudioChunk>,
    pub reason: CloseReason,
}

impl SpeechSegment {
    /// Sequence number of the first chunk, if any.
    pub fn start_seq(&self) -> Option<u64> {
        self.chunks.first().map(|c| c.seq)
    }

    /// Sequence number of the last chunk, if any.
    pub fn end_seq(&self) -> Option<u64> {
        self.chunks.last().map(|c| c.seq)
    }

    /// Total number of samples across all chunks.
    pub fn sample_count(&self) -> usize {
        self.chunks.iter().map(|c| c.samples.len()).sum()
    }

    /// Total audio duration in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.chunks.iter().map(|c| c.duration_ms()).sum()
    }

    /// Concatenate all chunk samples in order.
    pub fn samples(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.sample_count());
        for chunk in &self.chunks {
            out.extend_from_slice(&chunk.samples);
        }
        out
    }
}
