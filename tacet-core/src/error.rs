use thiserror::Error;

/// All errors produced by tacet-core.
#[derive(Debug, Error)]
pub enum TacetError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("unsupported container format: {path}")]
    UnsupportedFormat { path: std::path::PathBuf },

    #[error("VAD model inference error: {0}")]
    ModelInference(String),

    #[error("no threshold produced a valid segmentation")]
    NoValidThreshold,

    #[error("no speech detected in input")]
    NoSpeechDetected,

    #[error("invalid merge policy: {0}")]
    InvalidPolicy(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TacetError>;
