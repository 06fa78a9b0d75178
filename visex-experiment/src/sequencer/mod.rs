//! Experiment variants. Each one drives the same four-state trial cycle with
//! its own transition predicates and side effects.

mod calibration;
mod timed;
mod triggered;

pub use calibration::CalibrationSequencer;
pub use timed::TimerDrivenSequencer;
pub use triggered::ExternallyTriggeredSequencer;

use std::path::PathBuf;

use crate::condition::ConditionManager;
use crate::config::{ExperimentConfig, PreIciTrigger};
use crate::environment::{EnvParam, StimulusEnvironment};
use crate::error::ExperimentError;
use crate::state::ConditionStateMachine;

/// Session state lent to a sequencer for one call.
pub struct TickContext<'a> {
    pub now_ms: f64,
    pub config: &'a ExperimentConfig,
    pub machine: &'a mut ConditionStateMachine,
    pub conditions: &'a mut ConditionManager,
    pub env: &'a mut dyn StimulusEnvironment,
}

impl TickContext<'_> {
    pub fn hold_ms(&self) -> f64 {
        self.machine.hold_ms(self.now_ms)
    }

    pub fn set(&mut self, param: EnvParam) {
        self.env.set(param);
    }

    /// Pushes the active condition's color to the renderer, if it has one.
    pub fn show_condition(&mut self) {
        if let Some(color) = self.conditions.current_color() {
            self.env.set(EnvParam::Color(color));
        }
    }

    /// PREICI exit rule: the configured trigger, else the variant's own.
    pub fn pre_ici_elapsed(&self, default: PreIciTrigger, go: bool) -> bool {
        self.config
            .pre_ici_trigger
            .unwrap_or(default)
            .fires(self.hold_ms(), self.config.pre_ici_ms, go)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    /// Nothing to persist
    Stopped,
    Saved {
        to_store: bool,
        data_file: Option<PathBuf>,
    },
    /// Persistence refused, with the warning shown to the operator
    NotSaved(String),
}

pub trait Sequencer {
    fn name(&self) -> &'static str;

    /// Acquires the variant's devices. Called once per session start.
    fn start(&mut self, ctx: &mut TickContext<'_>) -> Result<(), ExperimentError>;

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), ExperimentError>;

    /// Releases every device the variant holds, then persists results. Device
    /// release must happen even if persisting fails.
    fn stop(&mut self, ctx: &mut TickContext<'_>) -> Result<StopOutcome, ExperimentError>;
}
