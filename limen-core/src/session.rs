//! Per-session VAD context.
//!
//! One `VadSession` owns the single active gate state and segment buffer for
//! a session: detector, gate machine, emitter, and the event senders. It is
//! an explicit context object rather than process-wide state so multiple
//! sessions (tests, concurrent streams) never interfere.
//!
//! The session executes strictly sequentially: `process` is `&mut self` and
//! the engine drives it from one worker thread.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, Span};

use crate::buffering::chunk::{AudioChunk, CloseReason, SpeechSegment};
use crate::detector::{DetectionResult, SpeechDetector};
use crate::emitter::SegmentEmitter;
use crate::engine::pipeline::PipelineDiagnostics;
use crate::events::{ActivityEvent, SegmentEvent};
use crate::gate::{GateMachine, GateState, GateTransition, VadConfig};

pub struct VadSession {
    detector: Box<dyn SpeechDetector>,
    gate: GateMachine,
    emitter: SegmentEmitter,
    segment_tx: broadcast::Sender<SegmentEvent>,
    activity_tx: broadcast::Sender<ActivityEvent>,
    /// Shared event sequence for emitted segments.
    seq: Arc<AtomicU64>,
    /// Independent sequence for activity events.
    activity_seq: u64,
    diagnostics: Arc<PipelineDiagnostics>,
    /// Tracing span covering the current open segment.
    segment_span: Option<Span>,
}

impl VadSession {
    pub fn new(
        vad: VadConfig,
        max_segment_ms: u32,
        detector: Box<dyn SpeechDetector>,
        segment_tx: broadcast::Sender<SegmentEvent>,
        activity_tx: broadcast::Sender<ActivityEvent>,
        seq: Arc<AtomicU64>,
        diagnostics: Arc<PipelineDiagnostics>,
    ) -> Self {
        let max_chunks = vad.chunks_for(max_segment_ms).max(1) as usize;
        Self {
            detector,
            gate: GateMachine::new(vad),
            emitter: SegmentEmitter::new(max_chunks),
            segment_tx,
            activity_tx,
            seq,
            activity_seq: 0,
            diagnostics,
            segment_span: None,
        }
    }

    /// Current externally observable gate state.
    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    /// Run one chunk through detector → gate → emitter.
    pub fn process(&mut self, chunk: AudioChunk) {
        self.diagnostics.chunks_in.fetch_add(1, Ordering::Relaxed);

        let probability = match self.detector.probability(&chunk) {
            Ok(p) => p.clamp(0.0, 1.0),
            Err(e) => {
                self.diagnostics
                    .detector_errors
                    .fetch_add(1, Ordering::Relaxed);
                error!(chunk_seq = chunk.seq, error = %e, "detector error — treating chunk as silence");
                0.0
            }
        };
        let result = DetectionResult {
            probability,
            chunk_seq: chunk.seq,
        };

        match self.gate.advance(&result, &chunk) {
            Some(GateTransition::Opened { onset }) => {
                self.diagnostics.gate_opens.fetch_add(1, Ordering::Relaxed);
                let span = info_span!("segment", onset_seq = onset.first().map(|c| c.seq));
                {
                    let _enter = span.enter();
                    info!(onset_chunks = onset.len(), "gate opened");
                }
                self.segment_span = Some(span);
                if let Some(segment) = self.emitter.open(onset) {
                    self.emit(segment);
                }
            }
            Some(GateTransition::Closed { reason }) => {
                self.diagnostics.gate_closes.fetch_add(1, Ordering::Relaxed);
                // The trigger chunk belongs to the segment.
                if let Some(segment) = self.emitter.push(chunk.clone()) {
                    self.emit(segment);
                }
                if let Some(segment) = self.emitter.close(reason) {
                    self.emit(segment);
                }
                self.segment_span = None;
            }
            None => {
                if self.gate.is_open() {
                    if let Some(ref span) = self.segment_span {
                        let _enter = span.enter();
                        debug!(
                            chunk_seq = chunk.seq,
                            buffered = self.emitter.buffered_chunks(),
                            "segment accumulating"
                        );
                    }
                    if let Some(segment) = self.emitter.push(chunk.clone()) {
                        self.emit(segment);
                    }
                }
            }
        }

        let activity = ActivityEvent {
            seq: self.activity_seq,
            probability,
            gate_state: self.gate.state(),
        };
        self.activity_seq = self.activity_seq.saturating_add(1);
        let _ = self.activity_tx.send(activity);
    }

    /// Teardown: flush any in-flight segment as a final forced close so no
    /// trailing speech audio is silently dropped.
    pub fn finish(&mut self) {
        if self.emitter.is_open() {
            info!(
                buffered = self.emitter.buffered_chunks(),
                "session ending with open segment — forcing final flush"
            );
            if let Some(segment) = self.emitter.close(CloseReason::Teardown) {
                self.emit(segment);
            }
        }
        self.segment_span = None;
        self.gate.reset();
        self.detector.reset();
    }

    fn emit(&mut self, segment: SpeechSegment) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.diagnostics
            .segments_emitted
            .fetch_add(1, Ordering::Relaxed);
        if matches!(segment.reason, CloseReason::Overflow | CloseReason::Teardown) {
            self.diagnostics
                .forced_closes
                .fetch_add(1, Ordering::Relaxed);
        }

        info!(
            seq,
            reason = ?segment.reason,
            start_seq = segment.start_seq(),
            end_seq = segment.end_seq(),
            chunks = segment.chunks.len(),
            duration_ms = segment.duration_ms(),
            "speech segment emitted"
        );
        let _ = self.segment_tx.send(SegmentEvent { seq, segment });
    }
}
