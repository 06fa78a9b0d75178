use thiserror::Error;

/// Spectroradiometer failures. Any of these means "no data this trial".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("no spectroradiometer port configured")]
    NoPort,

    #[error("failed to connect on {port}: {reason}")]
    Connect { port: String, reason: String },

    #[error("device setup failed: {0}")]
    Setup(String),

    #[error("measurement failed: {0}")]
    Measure(String),

    #[error("device did not answer within {0} ms")]
    Timeout(u64),

    #[error("device handle unavailable")]
    Unavailable,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("insufficient data: got {got} points, need {need}")]
    InsufficientData { got: usize, need: usize },

    #[error("x has {x} points but y has {y}")]
    LengthMismatch { x: usize, y: usize },

    #[error("x values must be strictly ascending")]
    Unsorted,

    #[error("data contains non-finite or out-of-domain values")]
    InvalidData,

    #[error("normal equations are singular")]
    Singular,

    #[error("no convergence after {0} iterations")]
    NoConvergence(usize),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store format error: {0}")]
    Json(#[from] serde_json::Error),
}
