//! Blocking gate worker loop.
//!
//! ## Per-iteration stages
//!
//! ```text
//! 1. Pull one AudioChunk from the bounded queue (timeout keeps the
//!    running flag responsive)
//! 2. Detector probability for the chunk
//! 3. Gate state machine transition
//! 4. Segment emitter buffering / flush on gate-close
//! ```
//!
//! The whole loop runs inside `spawn_blocking`, keeping the Tokio async
//! executor free for the host's I/O. Detector inference must finish within
//! one chunk period on average; when it cannot, the bounded queue sheds the
//! oldest chunks upstream (see `buffering`).

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    buffering::{ChunkReceiver, FrameSink},
    detector::SpeechDetector,
    engine::EngineConfig,
    events::{ActivityEvent, SegmentEvent},
    session::VadSession,
};

/// How long one queue pull may block before re-checking the running flag.
const RECV_TIMEOUT_MS: u64 = 10;

#[derive(Default)]
pub struct PipelineDiagnostics {
    pub chunks_in: AtomicUsize,
    pub detector_errors: AtomicUsize,
    pub gate_opens: AtomicUsize,
    pub gate_closes: AtomicUsize,
    pub segments_emitted: AtomicUsize,
    pub forced_closes: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.chunks_in.store(0, Ordering::Relaxed);
        self.detector_errors.store(0, Ordering::Relaxed);
        self.gate_opens.store(0, Ordering::Relaxed);
        self.gate_closes.store(0, Ordering::Relaxed);
        self.segments_emitted.store(0, Ordering::Relaxed);
        self.forced_closes.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            chunks_in: self.chunks_in.load(Ordering::Relaxed),
            chunks_dropped: 0,
            detector_errors: self.detector_errors.load(Ordering::Relaxed),
            gate_opens: self.gate_opens.load(Ordering::Relaxed),
            gate_closes: self.gate_closes.load(Ordering::Relaxed),
            segments_emitted: self.segments_emitted.load(Ordering::Relaxed),
            forced_closes: self.forced_closes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the worker counters. `chunks_dropped` is filled in
/// by whoever holds the queue's `FrameSink` (the engine).
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub chunks_in: usize,
    pub chunks_dropped: usize,
    pub detector_errors: usize,
    pub gate_opens: usize,
    pub gate_closes: usize,
    pub segments_emitted: usize,
    pub forced_closes: usize,
}

/// All context the worker needs, passed as one struct so the closure stays tidy.
pub struct PipelineContext {
    pub config: EngineConfig,
    pub detector: Box<dyn SpeechDetector>,
    pub frames: ChunkReceiver,
    /// Sink clone kept for backpressure accounting in the final report.
    pub sink: FrameSink,
    pub running: Arc<AtomicBool>,
    pub segment_tx: broadcast::Sender<SegmentEvent>,
    pub activity_tx: broadcast::Sender<ActivityEvent>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Run the blocking worker until `ctx.running` becomes false.
///
/// On exit the session is flushed: an in-flight Open/Closing segment is
/// emitted with `CloseReason::Teardown` before the worker returns.
pub fn run(ctx: PipelineContext) {
    info!("gate worker started");

    let mut session = VadSession::new(
        ctx.config.vad.clone(),
        ctx.config.max_segment_ms,
        ctx.detector,
        ctx.segment_tx.clone(),
        ctx.activity_tx.clone(),
        Arc::clone(&ctx.seq),
        Arc::clone(&ctx.diagnostics),
    );

    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        match ctx.frames.recv_timeout(Duration::from_millis(RECV_TIMEOUT_MS)) {
            Ok(chunk) => session.process(chunk),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    session.finish();

    let snap = ctx.diagnostics.snapshot();
    info!(
        chunks_in = snap.chunks_in,
        chunks_dropped = ctx.sink.dropped_total(),
        detector_errors = snap.detector_errors,
        gate_opens = snap.gate_opens,
        gate_closes = snap.gate_closes,
        segments_emitted = snap.segments_emitted,
        forced_closes = snap.forced_closes,
        "gate worker stopped — diagnostics"
    );
}
