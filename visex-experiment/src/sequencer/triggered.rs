use tracing::{debug, info};
use visex_core::TrialState;
use visex_signal::{DecodedMessage, DigitalInput, MessageDecoder};

use super::{Sequencer, StopOutcome, TickContext};
use crate::config::PreIciTrigger;
use crate::environment::EnvParam;
use crate::error::ExperimentError;

/// Trials slaved to an optical imaging system. The imager announces the next
/// stimulus, raises GO while it acquires and drops GO to end the condition.
pub struct ExternallyTriggeredSequencer {
    input: Box<dyn DigitalInput>,
    decoder: MessageDecoder,
    reverse: bool,
    reversed_at_ms: f64,
}

impl ExternallyTriggeredSequencer {
    pub fn new(input: Box<dyn DigitalInput>, channel: usize) -> Self {
        Self {
            input,
            decoder: MessageDecoder::new(channel, 0),
            reverse: false,
            reversed_at_ms: 0.0,
        }
    }

    pub fn message(&self) -> DecodedMessage {
        self.decoder.current()
    }

    fn reverse_if_due(&mut self, ctx: &mut TickContext<'_>) {
        let Some(period) = ctx.config.reverse_dur_ms else {
            return;
        };
        if ctx.now_ms - self.reversed_at_ms >= period {
            self.reverse = !self.reverse;
            self.reversed_at_ms = ctx.now_ms;
            ctx.set(EnvParam::ReverseTime(self.reverse));
        }
    }
}

impl Sequencer for ExternallyTriggeredSequencer {
    fn name(&self) -> &'static str {
        "oi-master"
    }

    fn start(&mut self, ctx: &mut TickContext<'_>) -> Result<(), ExperimentError> {
        self.decoder.n_conditions = ctx.conditions.n_conditions();
        self.decoder.reset();
        self.reverse = false;
        info!(
            "Listening for imaging messages on channel {} ({} conditions)",
            self.decoder.channel, self.decoder.n_conditions
        );
        Ok(())
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), ExperimentError> {
        let msg = self.decoder.poll(self.input.as_mut());
        let now = ctx.now_ms;

        match ctx.machine.state() {
            TrialState::None => {
                if msg.start {
                    let condition = ctx.conditions.push_manual(msg.condition);
                    ctx.machine.enter(TrialState::PreIci, now, condition);
                    ctx.show_condition();
                    ctx.set(EnvParam::Drifting(false));
                    ctx.set(EnvParam::Visible(true));
                }
            }
            TrialState::PreIci => {
                if ctx.pre_ici_elapsed(PreIciTrigger::Go, msg.go) {
                    let condition = ctx.conditions.current();
                    ctx.machine.enter(TrialState::Cond, now, condition);
                    ctx.set(EnvParam::Drifting(true));
                    self.reversed_at_ms = now;
                }
            }
            TrialState::Cond => {
                if msg.go {
                    self.reverse_if_due(ctx);
                } else {
                    let condition = ctx.conditions.current();
                    ctx.machine.enter(TrialState::SufIci, now, condition);
                    ctx.set(EnvParam::Visible(false));
                    ctx.set(EnvParam::ReverseTime(false));
                    self.reverse = false;
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
        self.reverse = false;
        Ok(StopOutcome::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{ConditionManager, Sampling};
    use crate::config::ExperimentConfig;
    use crate::state::ConditionStateMachine;
    use visex_core::{Color, DigitalSample};
    use visex_signal::{ImagingMessage, ScriptedInput};

    #[derive(Default)]
    struct Env(Vec<EnvParam>);

    impl crate::environment::StimulusEnvironment for Env {
        fn set(&mut self, param: EnvParam) {
            self.0.push(param);
        }
    }

    struct Rig {
        input: ScriptedInput,
        seq: ExternallyTriggeredSequencer,
        config: ExperimentConfig,
        machine: ConditionStateMachine,
        conditions: ConditionManager,
        env: Env,
    }

    impl Rig {
        fn new(config: ExperimentConfig) -> Self {
            let input = ScriptedInput::new();
            let seq = ExternallyTriggeredSequencer::new(Box::new(input.clone()), 0);
            let conditions =
                ConditionManager::new(config.conditions.clone(), Sampling::Ascending, None);
            let mut rig = Self {
                input,
                seq,
                config,
                machine: ConditionStateMachine::new(),
                conditions,
                env: Env::default(),
            };
            rig.call(0.0, |s, ctx| s.start(ctx)).unwrap();
            rig
        }

        fn call<R>(
            &mut self,
            now_ms: f64,
            f: impl FnOnce(&mut ExternallyTriggeredSequencer, &mut TickContext<'_>) -> R,
        ) -> R {
            let mut ctx = TickContext {
                now_ms,
                config: &self.config,
                machine: &mut self.machine,
                conditions: &mut self.conditions,
                env: &mut self.env,
            };
            f(&mut self.seq, &mut ctx)
        }

        fn send(&mut self, now_ms: f64, go: bool, condition: Option<usize>) {
            let byte = match condition {
                Some(c) => ImagingMessage::for_condition(go, c).unwrap().byte(),
                None => ImagingMessage::new(go, 0).unwrap().byte(),
            };
            self.input.push(0, DigitalSample::new(now_ms, byte));
        }

        fn tick(&mut self, now_ms: f64) -> TrialState {
            self.call(now_ms, |s, ctx| s.tick(ctx)).unwrap();
            self.machine.state()
        }
    }

    fn config() -> ExperimentConfig {
        ExperimentConfig {
            suf_ici_ms: 100.0,
            conditions: vec![Color::rgb(1.0, 0.0, 0.0), Color::rgb(0.0, 1.0, 0.0)],
            ..ExperimentConfig::default()
        }
    }

    #[test]
    fn follows_start_and_go() {
        let mut rig = Rig::new(config());
        assert_eq!(rig.tick(0.0), TrialState::None);

        rig.send(1.0, false, Some(1));
        assert_eq!(rig.tick(1.0), TrialState::PreIci);
        assert_eq!(rig.conditions.current(), Some(1));
        // no new sample keeps the last decoded state
        assert_eq!(rig.tick(5_000.0), TrialState::PreIci);

        rig.send(5_001.0, true, Some(1));
        assert_eq!(rig.tick(5_001.0), TrialState::Cond);
        assert_eq!(rig.tick(9_000.0), TrialState::Cond);

        rig.send(9_001.0, false, None);
        assert_eq!(rig.tick(9_001.0), TrialState::SufIci);
        assert_eq!(rig.tick(9_050.0), TrialState::SufIci);
        assert_eq!(rig.tick(9_101.0), TrialState::None);

        let r = rig.machine.last_record().unwrap();
        assert_eq!(r.condition, Some(1));
        assert_eq!(r.onset_ms, Some(5_001.0));
        assert_eq!(r.offset_ms, Some(9_001.0));
        assert!(rig.env.0.contains(&EnvParam::Color(Color::rgb(0.0, 1.0, 0.0))));
        assert!(rig.env.0.contains(&EnvParam::Drifting(true)));
        assert_eq!(rig.env.0.last(), Some(&EnvParam::ReverseTime(false)));
    }

    #[test]
    fn out_of_range_id_is_ignored() {
        let mut rig = Rig::new(config());
        rig.send(1.0, true, Some(2));
        assert_eq!(rig.tick(1.0), TrialState::None);
        assert_eq!(rig.seq.message().condition_index(), -1);
        assert!(!rig.seq.message().go);
    }

    #[test]
    fn reverses_time_every_period_while_go_held() {
        let mut rig = Rig::new(ExperimentConfig {
            reverse_dur_ms: Some(100.0),
            ..config()
        });
        rig.send(0.0, false, Some(0));
        rig.tick(0.0);
        rig.send(10.0, true, Some(0));
        assert_eq!(rig.tick(10.0), TrialState::Cond);
        for t in [50.0, 110.0, 150.0, 210.0, 320.0] {
            rig.tick(t);
        }
        let reversals: Vec<_> = rig
            .env
            .0
            .iter()
            .filter_map(|p| match p {
                EnvParam::ReverseTime(r) => Some(*r),
                _ => None,
            })
            .collect();
        assert_eq!(reversals, vec![true, false, true]);
    }
}
