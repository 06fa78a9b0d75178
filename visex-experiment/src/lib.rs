pub mod condition;
pub mod config;
pub mod environment;
pub mod error;
pub mod sequencer;
pub mod session;
pub mod state;

pub use condition::{ConditionManager, Sampling};
pub use config::{rgb_ramps, ExperimentConfig, PreIciTrigger};
pub use environment::{CalibrationView, EnvParam, NullEnvironment, Operator, StimulusEnvironment};
pub use error::ExperimentError;
pub use sequencer::{
    CalibrationSequencer, ExternallyTriggeredSequencer, Sequencer, StopOutcome, TickContext,
    TimerDrivenSequencer,
};
pub use session::Session;
pub use state::ConditionStateMachine;
