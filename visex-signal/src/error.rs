use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortError {
    #[error("bit index {0} is outside 0..8")]
    BitOutOfRange(usize),

    #[error("invalid waveform for bit {bit}: frequency {frequency_hz} Hz, latency {latency_ms} ms")]
    InvalidWaveform {
        bit: usize,
        frequency_hz: f64,
        latency_ms: f64,
    },

    #[error("port I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
