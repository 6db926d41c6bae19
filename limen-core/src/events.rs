//! Event types broadcast to the host application.
//!
//! Three channels: completed speech segments for the downstream consumer,
//! per-chunk activity for level meters / debugging, and engine status
//! changes (including the detector degradation signal).

use serde::{Deserialize, Serialize};

use crate::buffering::chunk::SpeechSegment;
use crate::gate::GateState;

/// Emitted whenever the emitter hands off a completed speech segment
/// (regular gate-close, overflow force-close, or teardown flush).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// The completed segment; ownership passes to the consumer.
    pub segment: SpeechSegment,
}

/// Emitted for each processed chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Detector speech probability for the chunk, in [0.0, 1.0].
    pub probability: f32,
    /// Gate state after this chunk was applied.
    pub gate_state: GateState,
}

/// Emitted when the engine state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. the degradation reason when the
    /// loader fell back to the amplitude detector).
    pub detail: Option<String>,
}

/// Current state of the Limen engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine created but `start()` not yet called.
    Idle,
    /// Loading the detector model.
    WarmingUp,
    /// Actively gating the chunk stream.
    Listening,
    /// Worker stopped; engine may be restarted.
    Stopped,
    /// Unrecoverable error — restart required.
    Error,
}
