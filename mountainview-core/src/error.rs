//! Error types for mountainview-core.

use thiserror::Error;

/// Result type alias for mountainview operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for mountainview operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Downsampling factor is not a power of 3.
    #[error("downsampling factor {0} is not a power of 3")]
    InvalidDownsampleFactor(u64),

    /// Downsampling factor is coarser than the stored multi-scale levels.
    #[error("downsampling factor {factor} exceeds the coarsest stored level {max}")]
    DownsampleFactorTooLarge { factor: u64, max: u64 },

    /// Requested time range is inverted.
    #[error("invalid time range: [{t1}, {t2}]")]
    InvalidRange { t1: i64, t2: i64 },

    /// A chunk read from an array source failed.
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// Array shape does not match what the caller expects.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// Firings array is malformed.
    #[error("invalid firings: {0}")]
    InvalidFirings(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
