use thiserror::Error;

/// All errors produced by limen-core.
#[derive(Debug, Error)]
pub enum LimenError {
    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("ONNX session error: {0}")]
    OnnxSession(String),

    #[error("neural detector unavailable: crate built without the 'onnx' feature")]
    NeuralUnavailable,

    #[error("input shape mismatch: expected {expected_rate} Hz, got {got_rate} Hz")]
    InputShape { expected_rate: u32, got_rate: u32 },

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LimenError>;
