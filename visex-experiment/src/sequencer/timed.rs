use tracing::{debug, info};
use visex_core::TrialState;
use visex_signal::{DigitalInput, DigitalOutput, DigitalOutputDriver, MessageDecoder, PORT_BITS};

use super::{Sequencer, StopOutcome, TickContext};
use crate::config::PreIciTrigger;
use crate::environment::EnvParam;
use crate::error::ExperimentError;

const ALL_BITS: [usize; PORT_BITS] = [0, 1, 2, 3, 4, 5, 6, 7];

/// Trials paced by the hold timers alone, with optional waveform output on a
/// parallel port running for the whole session.
#[derive(Default)]
pub struct TimerDrivenSequencer {
    driver: Option<DigitalOutputDriver<Box<dyn DigitalOutput>>>,
    go: Option<(MessageDecoder, Box<dyn DigitalInput>)>,
}

impl TimerDrivenSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drives the configured waveforms on `port` from session start to stop.
    pub fn with_output(mut self, port: Box<dyn DigitalOutput>) -> Self {
        self.driver = Some(DigitalOutputDriver::new(port));
        self
    }

    /// Reads the GO bit from `channel` of `input` for `Go`/`Either` PREICI triggers.
    pub fn with_go_input(mut self, input: Box<dyn DigitalInput>, channel: usize) -> Self {
        self.go = Some((MessageDecoder::new(channel, usize::MAX), input));
        self
    }

    pub fn output_value(&self) -> Option<u8> {
        self.driver.as_ref().map(DigitalOutputDriver::last_written)
    }
}

impl Sequencer for TimerDrivenSequencer {
    fn name(&self) -> &'static str {
        "pin-signal"
    }

    fn start(&mut self, ctx: &mut TickContext<'_>) -> Result<(), ExperimentError> {
        match self.go.as_mut() {
            Some((decoder, _)) => decoder.reset(),
            None if ctx.config.pre_ici_trigger == Some(PreIciTrigger::Go) => {
                return Err(ExperimentError::Config(
                    "PreICITrigger Go needs a GO input".into(),
                ));
            }
            None => {}
        }
        if let Some(driver) = self.driver.as_mut() {
            for (bit, spec) in ctx.config.waveform.iter().enumerate() {
                driver.configure_spec(bit, *spec)?;
            }
            let bits: Vec<usize> = ALL_BITS
                .into_iter()
                .filter(|b| driver.channel(*b).is_some_and(|c| c.spec.enabled))
                .collect();
            driver.start(&bits, ctx.now_ms)?;
            info!("Waveform output started on bits {:?}", bits);
        }
        Ok(())
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), ExperimentError> {
        if let Some(driver) = self.driver.as_mut() {
            driver.sample(ctx.now_ms)?;
        }
        let go = match self.go.as_mut() {
            Some((decoder, input)) => decoder.poll(input.as_mut()).go,
            None => false,
        };
        let now = ctx.now_ms;

        match ctx.machine.state() {
            TrialState::None => {
                let condition = ctx.conditions.sample_next();
                ctx.machine.enter(TrialState::PreIci, now, condition);
                ctx.show_condition();
            }
            TrialState::PreIci => {
                if ctx.pre_ici_elapsed(PreIciTrigger::Timer, go) {
                    let condition = ctx.conditions.current();
                    ctx.machine.enter(TrialState::Cond, now, condition);
                    ctx.set(EnvParam::Visible(true));
                }
            }
            TrialState::Cond => {
                if ctx.hold_ms() >= ctx.config.cond_dur_ms {
                    let condition = ctx.conditions.current();
                    ctx.machine.enter(TrialState::SufIci, now, condition);
                    ctx.set(EnvParam::Visible(false));
                }
            }
            TrialState::SufIci => {
                if ctx.hold_ms() >= ctx.config.suf_ici_ms {
                    ctx.machine.enter(TrialState::None, now, None);
                    debug!("Trial {} done", ctx.machine.trials());
                }
            }
        }
        Ok(())
    }

    fn stop(&mut self, _ctx: &mut TickContext<'_>) -> Result<StopOutcome, ExperimentError> {
        if let Some(driver) = self.driver.as_mut() {
            driver.stop(&ALL_BITS)?;
            info!("Waveform output stopped");
        }
        Ok(StopOutcome::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{ConditionManager, Sampling};
    use crate::config::ExperimentConfig;
    use crate::environment::NullEnvironment;
    use crate::state::ConditionStateMachine;
    use visex_core::{Color, DigitalSample};
    use visex_signal::{ImagingMessage, ScriptedInput};

    struct Rig {
        config: ExperimentConfig,
        machine: ConditionStateMachine,
        conditions: ConditionManager,
    }

    impl Rig {
        fn new(trigger: PreIciTrigger) -> Self {
            let config = ExperimentConfig {
                pre_ici_ms: 100.0,
                cond_dur_ms: 50.0,
                suf_ici_ms: 50.0,
                pre_ici_trigger: Some(trigger),
                conditions: vec![Color::rgb(1.0, 1.0, 1.0)],
                ..ExperimentConfig::default()
            };
            let conditions = ConditionManager::new(config.conditions.clone(), Sampling::Ascending, None);
            Self {
                config,
                machine: ConditionStateMachine::new(),
                conditions,
            }
        }

        fn call<R>(
            &mut self,
            seq: &mut TimerDrivenSequencer,
            now_ms: f64,
            f: impl FnOnce(&mut TimerDrivenSequencer, &mut TickContext<'_>) -> R,
        ) -> R {
            let mut env = NullEnvironment;
            let mut ctx = TickContext {
                now_ms,
                config: &self.config,
                machine: &mut self.machine,
                conditions: &mut self.conditions,
                env: &mut env,
            };
            f(seq, &mut ctx)
        }
    }

    fn go_byte(go: bool) -> u8 {
        ImagingMessage::new(go, 0).unwrap().byte()
    }

    #[test]
    fn go_trigger_without_input_is_rejected() {
        let mut rig = Rig::new(PreIciTrigger::Go);
        let mut seq = TimerDrivenSequencer::new();
        let err = rig.call(&mut seq, 0.0, |s, c| s.start(c)).unwrap_err();
        assert!(matches!(err, ExperimentError::Config(_)));
    }

    #[test]
    fn go_trigger_waits_for_go_bit() {
        let input = ScriptedInput::new();
        let mut rig = Rig::new(PreIciTrigger::Go);
        let mut seq = TimerDrivenSequencer::new().with_go_input(Box::new(input.clone()), 2);
        rig.call(&mut seq, 0.0, |s, c| s.start(c)).unwrap();

        rig.call(&mut seq, 0.0, |s, c| s.tick(c)).unwrap();
        assert_eq!(rig.machine.state(), TrialState::PreIci);
        // long past PreICI, still held without GO
        rig.call(&mut seq, 5_000.0, |s, c| s.tick(c)).unwrap();
        assert_eq!(rig.machine.state(), TrialState::PreIci);

        // GO on another channel is ignored
        input.push(0, DigitalSample::new(5_001.0, go_byte(true)));
        rig.call(&mut seq, 5_001.0, |s, c| s.tick(c)).unwrap();
        assert_eq!(rig.machine.state(), TrialState::PreIci);

        input.push(2, DigitalSample::new(5_002.0, go_byte(true)));
        rig.call(&mut seq, 5_002.0, |s, c| s.tick(c)).unwrap();
        assert_eq!(rig.machine.state(), TrialState::Cond);
        assert!(rig.machine.records().is_empty());
    }

    #[test]
    fn either_trigger_fires_on_whichever_comes_first() {
        let input = ScriptedInput::new();
        let mut rig = Rig::new(PreIciTrigger::Either);
        let mut seq = TimerDrivenSequencer::new().with_go_input(Box::new(input.clone()), 0);
        rig.call(&mut seq, 0.0, |s, c| s.start(c)).unwrap();

        // timer wins: no GO at all
        rig.call(&mut seq, 0.0, |s, c| s.tick(c)).unwrap();
        rig.call(&mut seq, 100.0, |s, c| s.tick(c)).unwrap();
        assert_eq!(rig.machine.state(), TrialState::Cond);
        rig.call(&mut seq, 150.0, |s, c| s.tick(c)).unwrap();
        rig.call(&mut seq, 200.0, |s, c| s.tick(c)).unwrap();
        assert_eq!(rig.machine.state(), TrialState::None);

        // GO wins: raised 10 ms into PREICI
        rig.call(&mut seq, 200.0, |s, c| s.tick(c)).unwrap();
        assert_eq!(rig.machine.state(), TrialState::PreIci);
        input.push(0, DigitalSample::new(210.0, go_byte(true)));
        rig.call(&mut seq, 210.0, |s, c| s.tick(c)).unwrap();
        assert_eq!(rig.machine.state(), TrialState::Cond);
        assert_eq!(rig.machine.records().len(), 1);
    }

    #[test]
    fn either_trigger_without_input_runs_on_the_timer() {
        let mut rig = Rig::new(PreIciTrigger::Either);
        let mut seq = TimerDrivenSequencer::new();
        rig.call(&mut seq, 0.0, |s, c| s.start(c)).unwrap();
        rig.call(&mut seq, 0.0, |s, c| s.tick(c)).unwrap();
        rig.call(&mut seq, 99.0, |s, c| s.tick(c)).unwrap();
        assert_eq!(rig.machine.state(), TrialState::PreIci);
        rig.call(&mut seq, 100.0, |s, c| s.tick(c)).unwrap();
        assert_eq!(rig.machine.state(), TrialState::Cond);
    }
}
