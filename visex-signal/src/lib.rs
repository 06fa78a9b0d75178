pub mod error;
pub mod io;
pub mod message;
pub mod waveform;

pub use error::PortError;
pub use io::{DigitalInput, DigitalOutput, MemoryPort, ScriptedInput};
pub use message::{decode, DecodedMessage, ImagingMessage, MessageDecoder};
pub use waveform::{DigitalOutputDriver, WaveformChannel, WaveformSpec, PORT_BITS};
