pub mod color;
pub mod sample;
pub mod trial;

pub use color::{Channel, Color};
pub use sample::DigitalSample;
pub use trial::{TrialRecord, TrialState};
