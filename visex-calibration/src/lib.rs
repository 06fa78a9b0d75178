pub mod error;
pub mod fit;
pub mod measurement;
pub mod meter;
pub mod store;

pub use error::{DeviceError, FitError, StoreError};
pub use fit::{
    fit_display, fit_gamma, fit_spline, ChannelFit, DisplayFit, FitModel, FitType, GammaParams,
    Interpolant, SplineKind,
};
pub use measurement::{fields, ChannelData, MeasureValue, Measurement, MeasurementSeries};
pub use meter::{MeasureMode, MeterConnection, Spectroradiometer, METER_SETUP};
pub use store::{DisplayRecord, DisplayStore};
