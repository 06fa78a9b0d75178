use thiserror::Error;
use visex_calibration::StoreError;
use visex_signal::PortError;

#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    ConfigFormat(#[from] serde_json::Error),

    #[error("spectroradiometer unavailable")]
    DeviceUnavailable,

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("session is not running")]
    NotRunning,
}
