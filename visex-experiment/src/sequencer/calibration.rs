use std::path::{Path, PathBuf};

use tracing::{debug, error, info};
use visex_calibration::{
    fit_display, DeviceError, DisplayFit, DisplayRecord, DisplayStore, FitType, MeasureMode,
    MeasurementSeries, MeterConnection, Spectroradiometer,
};
use visex_core::{Color, TrialState};

use super::{Sequencer, StopOutcome, TickContext};
use crate::config::PreIciTrigger;
use crate::environment::{CalibrationView, EnvParam, Operator};
use crate::error::ExperimentError;

type Meter = Box<dyn Spectroradiometer>;

const NO_DISPLAY_ID: &str = "DisplayID is not set!";

/// Presents each condition color, measures it once at the end of the
/// condition and keeps intensity and spectral results in separate series.
pub struct CalibrationSequencer {
    meter: MeterConnection<Meter>,
    operator: Box<dyn Operator>,
    view: Option<Box<dyn CalibrationView>>,
    store_path: PathBuf,
    intensity: MeasurementSeries,
    spectral: MeasurementSeries,
    last_fit: Option<DisplayFit>,
}

impl CalibrationSequencer {
    pub fn new(meter: Meter, operator: Box<dyn Operator>, store_path: impl Into<PathBuf>) -> Self {
        Self {
            meter: MeterConnection::new(meter),
            operator,
            view: None,
            store_path: store_path.into(),
            intensity: MeasurementSeries::new(),
            spectral: MeasurementSeries::new(),
            last_fit: None,
        }
    }

    pub fn with_view(mut self, view: Box<dyn CalibrationView>) -> Self {
        self.view = Some(view);
        self
    }

    pub fn intensity(&self) -> &MeasurementSeries {
        &self.intensity
    }

    pub fn spectral(&self) -> &MeasurementSeries {
        &self.spectral
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Fit shown by the most recent plot, if any.
    pub fn last_fit(&self) -> Option<&DisplayFit> {
        self.last_fit.as_ref()
    }

    /// Fits the intensity measurements collected so far.
    pub fn fit(&self, fit_type: FitType) -> DisplayFit {
        fit_display(&self.intensity, fit_type)
    }

    pub fn is_connected(&self) -> bool {
        self.meter.is_connected()
    }

    fn connect(&mut self, port: Option<&str>) {
        let Some(port) = port else {
            self.operator.warn("MeterPort is not set!");
            return;
        };
        if let Err(e) = self.meter.connect() {
            error!("Spectroradiometer on {} failed: {}", port, e);
            self.operator
                .warn(&format!("Spectroradiometer on {port} is not available: {e}"));
        }
    }

    /// One measurement of `color`, appended to the series of `mode`. Only a lost
    /// device handle is an error; every other failure leaves the series unchanged.
    fn measure(&mut self, mode: MeasureMode, color: Option<Color>) -> Result<(), ExperimentError> {
        let Some(color) = color else {
            debug!("No color for this condition, measurement skipped");
            return Ok(());
        };
        if !self.meter.is_connected() {
            debug!("No spectroradiometer, measurement skipped");
            return Ok(());
        }
        match self.meter.measure(mode) {
            Ok(m) => {
                let series = match mode {
                    MeasureMode::Intensity => &mut self.intensity,
                    MeasureMode::Spectral => &mut self.spectral,
                };
                series.record(m, color);
                debug!("{:?} measurement {} recorded", mode, series.len());
                Ok(())
            }
            Err(DeviceError::Unavailable) => Err(ExperimentError::DeviceUnavailable),
            Err(_) => Ok(()),
        }
    }

    fn plot(&mut self, mode: MeasureMode, fit_type: FitType) {
        let Some(view) = self.view.as_mut() else {
            return;
        };
        match mode {
            MeasureMode::Intensity => {
                if self.intensity.is_empty() {
                    return;
                }
                let fit = fit_display(&self.intensity, fit_type);
                view.show_intensity(&self.intensity, &fit);
                self.last_fit = Some(fit);
            }
            MeasureMode::Spectral => {
                if !self.spectral.is_empty() {
                    view.show_spectral(&self.spectral);
                }
            }
        }
    }

    fn record(&self, id: &str) -> DisplayRecord {
        DisplayRecord {
            id: id.to_string(),
            intensity_measurement: self.intensity.clone(),
            spectral_measurement: self.spectral.clone(),
        }
    }

    fn persist(&mut self, id: &str) -> Result<StopOutcome, ExperimentError> {
        let mut store = DisplayStore::load(&self.store_path)?;
        let to_store = self.operator.confirm("Save Measurement to Configuration?");
        if to_store {
            store.merge(self.record(id));
            store.save(&self.store_path)?;
        }

        let mut data_file = None;
        if self.operator.confirm("Save Measurement Data?") {
            if let Some(path) = self.operator.save_path(&format!("{id}_calibration.json")) {
                store.with_replaced(self.record(id)).save(&path)?;
                data_file = Some(path);
            }
        }
        Ok(StopOutcome::Saved { to_store, data_file })
    }
}

impl Sequencer for CalibrationSequencer {
    fn name(&self) -> &'static str {
        "display-calibration"
    }

    fn start(&mut self, ctx: &mut TickContext<'_>) -> Result<(), ExperimentError> {
        if ctx.config.pre_ici_trigger == Some(PreIciTrigger::Go) {
            return Err(ExperimentError::Config(
                "PreICITrigger Go needs a GO input, display calibration has none".into(),
            ));
        }
        if ctx.config.display_id().is_none() {
            self.operator.warn(NO_DISPLAY_ID);
        }
        self.intensity = MeasurementSeries::new();
        self.spectral = MeasurementSeries::new();
        self.last_fit = None;
        self.connect(ctx.config.meter_port.as_deref());
        info!(
            "Calibrating with {:?} measurements over {} colors",
            ctx.config.measure,
            ctx.conditions.n_conditions()
        );
        Ok(())
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), ExperimentError> {
        let now = ctx.now_ms;
        match ctx.machine.state() {
            TrialState::None => {
                let condition = ctx.conditions.sample_next();
                ctx.machine.enter(TrialState::PreIci, now, condition);
                ctx.show_condition();
            }
            TrialState::PreIci => {
                if ctx.pre_ici_elapsed(PreIciTrigger::Timer, false) {
                    let condition = ctx.conditions.current();
                    ctx.machine.enter(TrialState::Cond, now, condition);
                    ctx.set(EnvParam::Visible(true));
                }
            }
            TrialState::Cond => {
                if ctx.hold_ms() >= ctx.config.cond_dur_ms {
                    let measured = self.measure(ctx.config.measure, ctx.conditions.current_color());
                    let condition = ctx.conditions.current();
                    ctx.machine.enter(TrialState::SufIci, now, condition);
                    if ctx.config.pre_ici_ms != 0.0 || ctx.config.suf_ici_ms != 0.0 {
                        ctx.set(EnvParam::Visible(false));
                    }
                    measured?;
                }
            }
            TrialState::SufIci => {
                if ctx.hold_ms() >= ctx.config.suf_ici_ms {
                    if ctx.config.plot_measure {
                        self.plot(ctx.config.measure, ctx.config.fit_type);
                    }
                    ctx.machine.enter(TrialState::None, now, None);
                }
            }
        }
        Ok(())
    }

    fn stop(&mut self, ctx: &mut TickContext<'_>) -> Result<StopOutcome, ExperimentError> {
        self.meter.close();
        let Some(id) = ctx.config.display_id() else {
            self.operator.warn(NO_DISPLAY_ID);
            return Ok(StopOutcome::NotSaved(NO_DISPLAY_ID.to_string()));
        };
        info!(
            "Collected {} intensity and {} spectral measurements for {}",
            self.intensity.len(),
            self.spectral.len(),
            id
        );
        self.persist(id)
    }
}
