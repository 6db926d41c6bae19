//! `LimenEngine` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! LimenEngine::new()
//!     └─► start()        → detector loaded once, worker spawned,
//!         │                status = WarmingUp → Listening
//!         └─► stop()     → running = false, worker flushes + exits,
//!                          status = Stopped
//! ```
//!
//! `start()`/`stop()` in the wrong state return an error rather than
//! panicking. The detector loader runs inside the spawned worker before
//! steady-state processing: a model load may block briefly, which is
//! acceptable since it happens once, off the hot path. `start()` blocks
//! until selection is confirmed so callers learn the active detector kind
//! (and any degradation) immediately.

pub mod pipeline;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    buffering::{create_chunk_queue, FrameSink, DEFAULT_QUEUE_CAPACITY},
    detector::{loader, DetectorKind},
    error::{LimenError, Result},
    events::{ActivityEvent, EngineStatus, EngineStatusEvent, SegmentEvent},
    gate::VadConfig,
};

/// Broadcast channel capacity: events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Configuration for `LimenEngine`. Supplied at session start, immutable
/// thereafter.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Gate tuning (threshold, hysteresis durations, chunk duration).
    pub vad: VadConfig,
    /// Sample rate the frame source delivers (Hz). Default: 16000.
    pub sample_rate: u32,
    /// Maximum segment duration before a forced close/reopen.
    /// Default: 30000 (30 s).
    pub max_segment_ms: u32,
    /// Bounded queue depth between frame source and worker.
    pub queue_capacity: usize,
    /// Noise floor for the amplitude fallback detector (RMS level mapped to
    /// probability 0.5). Default: 0.01.
    pub amplitude_noise_floor: f32,
    /// Neural model artifact. `None` selects the amplitude detector without
    /// counting as a degradation.
    pub model_path: Option<std::path::PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vad: VadConfig::default(),
            sample_rate: 16_000,
            max_segment_ms: 30_000,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            amplitude_noise_floor: 0.01,
            model_path: None,
        }
    }
}

/// The top-level engine handle.
///
/// `LimenEngine` is `Send + Sync` — all fields use interior mutability.
/// Wrap in `Arc<LimenEngine>` to share between the host's state and
/// event-forwarding tasks.
pub struct LimenEngine {
    config: EngineConfig,
    /// `true` while the worker is active.
    running: Arc<AtomicBool>,
    /// Canonical status (written via Mutex, read from host commands).
    status: Arc<Mutex<EngineStatus>>,
    segment_tx: broadcast::Sender<SegmentEvent>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    activity_tx: broadcast::Sender<ActivityEvent>,
    /// Monotonically increasing segment event sequence.
    seq: Arc<AtomicU64>,
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
    /// Push handle for the current run; `None` when stopped.
    sink: Mutex<Option<FrameSink>>,
    /// Detector selected for the current run.
    detector_kind: Mutex<Option<DetectorKind>>,
}

impl LimenEngine {
    /// Create a new engine. Does not start processing — call `start()`.
    pub fn new(config: EngineConfig) -> Self {
        let (segment_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            segment_tx,
            status_tx,
            activity_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
            sink: Mutex::new(None),
            detector_kind: Mutex::new(None),
        }
    }

    /// Start the gate worker.
    ///
    /// Blocks until the detector is selected (neural load or amplitude
    /// fallback), then returns. The worker keeps running in a background
    /// blocking task until `stop()`.
    ///
    /// # Errors
    /// - `LimenError::AlreadyRunning` if already started.
    pub fn start(&self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(LimenError::AlreadyRunning);
        }

        self.diagnostics.reset();
        self.running.store(true, Ordering::SeqCst);
        self.set_status(EngineStatus::WarmingUp, None);

        let (sink, frames) = create_chunk_queue(self.config.queue_capacity);
        *self.sink.lock() = Some(sink.clone());

        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        let segment_tx = self.segment_tx.clone();
        let activity_tx = self.activity_tx.clone();
        let seq = Arc::clone(&self.seq);
        let diagnostics = Arc::clone(&self.diagnostics);

        // Sync channel: worker reports the selected detector back to start().
        let (ready_tx, ready_rx) =
            std::sync::mpsc::channel::<(DetectorKind, Option<String>)>();

        tokio::task::spawn_blocking(move || {
            // Loader runs once per session, before steady-state processing.
            let selection =
                loader::load(config.model_path.as_deref(), config.amplitude_noise_floor);
            let _ = ready_tx.send((selection.kind, selection.degraded));

            pipeline::run(pipeline::PipelineContext {
                config,
                detector: selection.detector,
                frames,
                sink,
                running,
                segment_tx,
                activity_tx,
                seq,
                diagnostics,
            });
        });

        match ready_rx.recv() {
            Ok((kind, degraded)) => {
                *self.detector_kind.lock() = Some(kind);
                // Degradation is informational, not an error: it rides the
                // Listening status event as detail text.
                self.set_status(EngineStatus::Listening, degraded);
                info!(detector = ?kind, "engine started — gating");
                Ok(())
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some("worker failed to start".into()));
                Err(LimenError::Other(anyhow::anyhow!(
                    "gate worker died before detector selection"
                )))
            }
        }
    }

    /// Stop the gate worker. Any in-flight segment is flushed with
    /// `CloseReason::Teardown` before the worker exits.
    ///
    /// # Errors
    /// - `LimenError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(LimenError::NotRunning);
        }

        self.running.store(false, Ordering::SeqCst);
        *self.sink.lock() = None;
        self.set_status(EngineStatus::Stopped, None);
        info!("engine stop requested");
        Ok(())
    }

    /// Push handle for the frame source.
    ///
    /// # Errors
    /// - `LimenError::NotRunning` before `start()` / after `stop()`.
    pub fn frame_sink(&self) -> Result<FrameSink> {
        self.sink.lock().clone().ok_or(LimenError::NotRunning)
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    /// Detector selected for the current run, once `start()` has returned.
    pub fn detector_kind(&self) -> Option<DetectorKind> {
        *self.detector_kind.lock()
    }

    /// Subscribe to completed speech segments.
    pub fn subscribe_segments(&self) -> broadcast::Receiver<SegmentEvent> {
        self.segment_tx.subscribe()
    }

    /// Subscribe to engine status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Subscribe to per-chunk activity events (probability + gate state).
    pub fn subscribe_activity(&self) -> broadcast::Receiver<ActivityEvent> {
        self.activity_tx.subscribe()
    }

    /// Snapshot of worker counters for observability.
    pub fn diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        let mut snap = self.diagnostics.snapshot();
        if let Some(sink) = self.sink.lock().as_ref() {
            snap.chunks_dropped = sink.dropped_total();
        }
        snap
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}
