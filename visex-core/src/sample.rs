use serde::{Deserialize, Serialize};

/// One timestamped byte read from a digital input channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DigitalSample {
    pub timestamp_ms: f64,
    pub value: u8,
}

impl DigitalSample {
    pub fn new(timestamp_ms: f64, value: u8) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }
}
