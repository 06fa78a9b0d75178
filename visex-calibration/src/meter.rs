use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::DeviceError;
use crate::measurement::Measurement;

/// Setup command: metric units, 1000 ms exposure, single capture, no averaging,
/// power mode, internal trigger, shutter open, 2° observer.
pub const METER_SETUP: &str = "S,,,,1,1000,0,1,0,0,0,0";
pub const CONNECT_TIMEOUT_MS: u64 = 1000;
pub const SETUP_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeasureMode {
    /// Luminance and CIE chromaticity
    #[default]
    Intensity,
    /// Peak wavelength, integrated values and the spectral distribution
    Spectral,
}

impl MeasureMode {
    pub fn code(&self) -> &'static str {
        match self {
            MeasureMode::Intensity => "1",
            MeasureMode::Spectral => "5",
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        match self {
            MeasureMode::Intensity => 8000,
            MeasureMode::Spectral => 10000,
        }
    }
}

/// Spectroradiometer session. Implementations own the transport; calls may
/// block for the whole timeout.
pub trait Spectroradiometer: Send {
    fn connect(&mut self, timeout_ms: u64) -> Result<(), DeviceError>;
    fn setup(&mut self, config: &str, timeout_ms: u64) -> Result<(), DeviceError>;
    fn measure(&mut self, mode_code: &str, timeout_ms: u64) -> Result<Measurement, DeviceError>;
    fn close(&mut self);
}

impl<T: Spectroradiometer + ?Sized> Spectroradiometer for Box<T> {
    fn connect(&mut self, timeout_ms: u64) -> Result<(), DeviceError> {
        (**self).connect(timeout_ms)
    }
    fn setup(&mut self, config: &str, timeout_ms: u64) -> Result<(), DeviceError> {
        (**self).setup(config, timeout_ms)
    }
    fn measure(&mut self, mode_code: &str, timeout_ms: u64) -> Result<Measurement, DeviceError> {
        (**self).measure(mode_code, timeout_ms)
    }
    fn close(&mut self) {
        (**self).close()
    }
}

/// Meter owned for the lifetime of an experiment, connected and configured
/// once per session and closed on drop.
///
/// Once the device reports [`DeviceError::Unavailable`] the handle is considered
/// lost and every later measurement fails with the same error without touching
/// the device, until the next [`connect`](Self::connect).
pub struct MeterConnection<M: Spectroradiometer> {
    meter: M,
    connected: bool,
    lost: bool,
}

impl<M: Spectroradiometer> MeterConnection<M> {
    pub fn new(meter: M) -> Self {
        Self {
            meter,
            connected: false,
            lost: false,
        }
    }

    /// Connects and sends the setup command. A failed setup closes the device
    /// again; the meter stays owned either way so a later call can retry.
    pub fn connect(&mut self) -> Result<(), DeviceError> {
        if self.connected {
            return Ok(());
        }
        self.meter.connect(CONNECT_TIMEOUT_MS)?;
        if let Err(e) = self.meter.setup(METER_SETUP, SETUP_TIMEOUT_MS) {
            self.meter.close();
            return Err(e);
        }
        self.connected = true;
        self.lost = false;
        info!("Spectroradiometer connected");
        Ok(())
    }

    pub fn measure(&mut self, mode: MeasureMode) -> Result<Measurement, DeviceError> {
        if self.lost || !self.connected {
            return Err(DeviceError::Unavailable);
        }
        match self.meter.measure(mode.code(), mode.timeout_ms()) {
            Err(DeviceError::Unavailable) => {
                error!("Spectroradiometer handle lost, further measurements disabled");
                self.lost = true;
                Err(DeviceError::Unavailable)
            }
            Err(e) => {
                warn!("Measurement failed: {}", e);
                Err(e)
            }
            ok => ok,
        }
    }

    /// True from a successful `connect` until `close`, lost handles included.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    pub fn close(&mut self) {
        if self.connected {
            self.meter.close();
            self.connected = false;
            info!("Spectroradiometer closed");
        }
    }
}

impl<M: Spectroradiometer> Drop for MeterConnection<M> {
    fn drop(&mut self) {
        self.close();
    }
}
