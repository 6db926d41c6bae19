//! Detector loader: pick the session's detector strategy exactly once.
//!
//! Tries the neural model when an artifact path is configured; any failure
//! (missing file, corrupt model, runtime unavailable, feature disabled)
//! degrades to the amplitude detector. Degradation is a log/telemetry
//! event, never an error — VAD must always be available in some form.
//! The selection is permanent for the session: switching detector semantics
//! (and therefore threshold meaning) mid-stream is worse than staying
//! degraded.

use std::path::Path;

use tracing::{debug, info, warn};

use super::{AmplitudeDetector, DetectorKind, SpeechDetector};

#[cfg(feature = "onnx")]
use super::SileroDetector;
#[cfg(not(feature = "onnx"))]
use crate::error::LimenError;

/// Outcome of detector selection.
pub struct DetectorSelection {
    pub detector: Box<dyn SpeechDetector>,
    pub kind: DetectorKind,
    /// Present when the neural detector was requested but unavailable.
    /// Carries the human-readable reason for the host's UI/telemetry.
    pub degraded: Option<String>,
}

/// Select the detector for a session.
///
/// `model_path = None` means the host opted out of neural detection; that is
/// not a degradation. Never returns an error and is never retried
/// mid-session.
pub fn load(model_path: Option<&Path>, amplitude_noise_floor: f32) -> DetectorSelection {
    let Some(path) = model_path else {
        debug!("no model artifact configured — using amplitude detector");
        return amplitude(amplitude_noise_floor, None);
    };

    match load_neural(path) {
        Ok(detector) => {
            info!(path = %path.display(), "using neural speech detector");
            DetectorSelection {
                detector,
                kind: DetectorKind::Neural,
                degraded: None,
            }
        }
        Err(e) => {
            let detail = format!("neural detector unavailable ({e}); using amplitude fallback");
            warn!(path = %path.display(), error = %e, "degrading to amplitude detection");
            amplitude(amplitude_noise_floor, Some(detail))
        }
    }
}

fn amplitude(noise_floor: f32, degraded: Option<String>) -> DetectorSelection {
    DetectorSelection {
        detector: Box::new(AmplitudeDetector::new(noise_floor)),
        kind: DetectorKind::Amplitude,
        degraded,
    }
}

#[cfg(feature = "onnx")]
fn load_neural(path: &Path) -> crate::error::Result<Box<dyn SpeechDetector>> {
    Ok(Box::new(SileroDetector::new(path)?))
}

#[cfg(not(feature = "onnx"))]
fn load_neural(_path: &Path) -> crate::error::Result<Box<dyn SpeechDetector>> {
    Err(LimenError::NeuralUnavailable)
}
