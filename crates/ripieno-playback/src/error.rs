//! Error types.

use thiserror::Error;

/// Error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Core error (backend, device, config).
    #[error(transparent)]
    Core(#[from] ripieno_core::Error),

    /// `play()` called with no target attached.
    #[error("Play source is not ready: no target attached")]
    NotReady,

    /// `play()` called before any model established a source rate.
    #[error("No source sample rate: add a model before playing")]
    NoSource,

    /// Invalid configuration value.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Model rejected by `add_model`.
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Resampler construction or processing error.
    #[error("Resampling error: {0}")]
    Resample(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;

impl From<rubato::ResamplerConstructionError> for Error {
    fn from(e: rubato::ResamplerConstructionError) -> Self {
        Error::Resample(e.to_string())
    }
}

impl From<rubato::ResampleError> for Error {
    fn from(e: rubato::ResampleError) -> Self {
        Error::Resample(e.to_string())
    }
}

/// Failure reported by a [`Model`](crate::Model) block read.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The model's backing data could not be read.
    #[error("Read failed: {0}")]
    Read(String),

    /// The model is no longer available (e.g. its file was closed).
    #[error("Model unavailable")]
    Unavailable,

    /// Model code panicked while reading.
    #[error("Model panicked during read")]
    Panicked,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for model reads.
pub type ModelResult<T> = std::result::Result<T, ModelError>;
