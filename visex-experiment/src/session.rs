use std::time::Duration;

use tracing::{error, info};
use visex_core::{TrialRecord, TrialState};
use visex_timing::{TickStats, Timer};

use crate::condition::ConditionManager;
use crate::config::ExperimentConfig;
use crate::environment::{EnvParam, StimulusEnvironment};
use crate::error::ExperimentError;
use crate::sequencer::{Sequencer, StopOutcome, TickContext};
use crate::state::ConditionStateMachine;

/// One running experiment: a sequencer plus the state it drives, ticked by the
/// surrounding loop. Dropping a running session stops it.
pub struct Session<T: Timer> {
    timer: T,
    config: ExperimentConfig,
    machine: ConditionStateMachine,
    conditions: ConditionManager,
    env: Box<dyn StimulusEnvironment>,
    sequencer: Box<dyn Sequencer>,
    running: bool,
    last_tick_ms: Option<f64>,
}

impl<T: Timer> Session<T> {
    pub fn new(
        config: ExperimentConfig,
        timer: T,
        sequencer: Box<dyn Sequencer>,
        env: Box<dyn StimulusEnvironment>,
    ) -> Result<Self, ExperimentError> {
        config.validate()?;
        let conditions =
            ConditionManager::new(config.conditions.clone(), config.sampling, config.seed);
        Ok(Self {
            timer,
            config,
            machine: ConditionStateMachine::new(),
            conditions,
            env,
            sequencer,
            running: false,
            last_tick_ms: None,
        })
    }

    fn with_context<R>(
        &mut self,
        f: impl FnOnce(&mut dyn Sequencer, &mut TickContext<'_>) -> R,
    ) -> R {
        let mut ctx = TickContext {
            now_ms: self.timer.now_ms(),
            config: &self.config,
            machine: &mut self.machine,
            conditions: &mut self.conditions,
            env: self.env.as_mut(),
        };
        f(self.sequencer.as_mut(), &mut ctx)
    }

    pub fn start(&mut self) -> Result<(), ExperimentError> {
        if self.running {
            return Ok(());
        }
        self.timer.restart();
        let now = self.timer.now_ms();
        self.machine.reset(now);
        self.conditions.reset();
        self.last_tick_ms = None;
        self.env.set(EnvParam::Visible(false));
        self.env.set(EnvParam::ReverseTime(false));
        self.with_context(|seq, ctx| seq.start(ctx))?;
        self.running = true;
        info!(
            "{} started: PreICI {} ms, CondDur {} ms, SufICI {} ms",
            self.sequencer.name(),
            self.config.pre_ici_ms,
            self.config.cond_dur_ms,
            self.config.suf_ici_ms
        );
        Ok(())
    }

    /// Runs one step of the trial cycle and returns the resulting state.
    pub fn tick(&mut self) -> Result<TrialState, ExperimentError> {
        if !self.running {
            return Err(ExperimentError::NotRunning);
        }
        let now = self.timer.now_ms();
        if let Some(prev) = self.last_tick_ms.replace(now) {
            let dt = (now - prev).max(0.0) / 1000.0;
            self.timer.record_tick(Duration::from_secs_f64(dt));
        }
        let finished = self.machine.records().len();
        self.with_context(|seq, ctx| seq.tick(ctx))?;
        if let Some(r) = self.machine.records().get(finished) {
            info!(
                "Trial {} done: condition {:?}, stimulus {:?} ms",
                r.trial,
                r.condition,
                r.stimulus_duration_ms()
            );
        }
        Ok(self.machine.state())
    }

    /// Stops the sequencer and releases its devices. The renderer is blanked and
    /// the trial state returns to NONE even if the sequencer reports an error.
    pub fn stop(&mut self) -> Result<StopOutcome, ExperimentError> {
        if !self.running {
            return Err(ExperimentError::NotRunning);
        }
        self.running = false;
        self.env.set(EnvParam::Visible(false));
        self.env.set(EnvParam::ReverseTime(false));
        let outcome = self.with_context(|seq, ctx| seq.stop(ctx));
        let now = self.timer.now_ms();
        self.machine.reset(now);
        info!(
            "{} stopped after {} trials",
            self.sequencer.name(),
            self.machine.records().len()
        );
        outcome
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn state(&self) -> TrialState {
        self.machine.state()
    }

    pub fn records(&self) -> &[TrialRecord] {
        self.machine.records()
    }

    pub fn conditions(&self) -> &ConditionManager {
        &self.conditions
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn tick_stats(&self) -> TickStats {
        self.timer.tick_stats()
    }
}

impl<T: Timer> Drop for Session<T> {
    fn drop(&mut self) {
        if self.running {
            if let Err(e) = self.stop() {
                error!("Stopping session on drop failed: {}", e);
            }
        }
    }
}
