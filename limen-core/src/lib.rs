//! # Limen — real-time voice activity gating
//!
//! Limen turns a continuous stream of short audio chunks into discrete
//! speech segments. A speech detector scores each chunk, a hysteresis gate
//! decides when speech starts and stops, and a segment emitter collects the
//! chunks between those moments:
//!
//! ```text
//!  Frame Source ──► FrameSink (bounded queue, drop-oldest)
//!                        │
//!                        ▼  blocking worker
//!                   SpeechDetector ──► GateMachine ──► SegmentEmitter
//!                   (silero / amplitude)  (hysteresis)       │
//!                                                            ▼
//!                              broadcast: SegmentEvent / ActivityEvent
//! ```
//!
//! The neural Silero detector is behind the `onnx` feature; without it (or
//! when the model fails to load) the engine degrades to the amplitude
//! detector for the rest of the session and says so once via a status event.
//!
//! ## Quick start
//!
//! ```no_run
//! use limen_core::{EngineConfig, LimenEngine};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let engine = LimenEngine::new(EngineConfig::default());
//! let mut segments = engine.subscribe_segments();
//! engine.start()?;
//!
//! let sink = engine.frame_sink()?;
//! // feed AudioChunk values from your capture layer via sink.push(..)
//!
//! while let Ok(event) = segments.recv().await {
//!     println!("segment: {} chunks ({:?})", event.segment.chunks.len(), event.segment.reason);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod buffering;
pub mod detector;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod events;
pub mod gate;
pub mod session;

pub use buffering::chunk::{AudioChunk, CloseReason, SpeechSegment};
pub use buffering::FrameSink;
pub use detector::{
    AmplitudeDetector, DetectionResult, DetectorKind, DetectorSelection, SpeechDetector,
};
#[cfg(feature = "onnx")]
pub use detector::SileroDetector;
pub use engine::{EngineConfig, LimenEngine};
pub use error::{LimenError, Result};
pub use events::{ActivityEvent, EngineStatus, EngineStatusEvent, SegmentEvent};
pub use gate::{GateState, VadConfig};
pub use session::VadSession;
