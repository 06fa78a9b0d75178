use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use visex_core::DigitalSample;

use crate::error::PortError;

/// Byte-wide digital output, e.g. a parallel port data register
pub trait DigitalOutput: Send {
    fn write(&mut self, value: u8) -> Result<(), PortError>;
}

/// Polled digital input. Returns the most recent sample received on `channel`
/// since the previous poll, discarding older ones.
pub trait DigitalInput: Send {
    fn latest(&mut self, channel: usize) -> Option<DigitalSample>;
}

impl<T: DigitalOutput + ?Sized> DigitalOutput for Box<T> {
    fn write(&mut self, value: u8) -> Result<(), PortError> {
        (**self).write(value)
    }
}

impl<T: DigitalInput + ?Sized> DigitalInput for Box<T> {
    fn latest(&mut self, channel: usize) -> Option<DigitalSample> {
        (**self).latest(channel)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// In-memory port that records every byte written. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct MemoryPort {
    writes: Arc<Mutex<Vec<u8>>>,
}

impl MemoryPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<u8> {
        lock(&self.writes).clone()
    }

    pub fn last(&self) -> Option<u8> {
        lock(&self.writes).last().copied()
    }
}

impl DigitalOutput for MemoryPort {
    fn write(&mut self, value: u8) -> Result<(), PortError> {
        lock(&self.writes).push(value);
        Ok(())
    }
}

/// Input fed from outside the tick loop. Clones share the pending queues.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    pending: Arc<Mutex<BTreeMap<usize, VecDeque<DigitalSample>>>>,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, channel: usize, sample: DigitalSample) {
        lock(&self.pending)
            .entry(channel)
            .or_default()
            .push_back(sample);
    }
}

impl DigitalInput for ScriptedInput {
    fn latest(&mut self, channel: usize) -> Option<DigitalSample> {
        let mut pending = lock(&self.pending);
        let queue = pending.get_mut(&channel)?;
        let last = queue.back().copied();
        queue.clear();
        last
    }
}

/// Legacy parallel port data register reached through `/dev/port`.
#[cfg(target_os = "linux")]
pub struct IoPort {
    file: std::fs::File,
    address: u64,
}

#[cfg(target_os = "linux")]
impl IoPort {
    pub fn open(address: u64) -> Result<Self, PortError> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/port")?;
        tracing::info!("Opened parallel port at {:#x}", address);
        Ok(Self { file, address })
    }
}

#[cfg(target_os = "linux")]
impl DigitalOutput for IoPort {
    fn write(&mut self, value: u8) -> Result<(), PortError> {
        use std::io::{Seek, SeekFrom, Write};
        self.file.seek(SeekFrom::Start(self.address))?;
        self.file.write_all(&[value])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_input_returns_only_newest_sample() {
        let src = ScriptedInput::new();
        let mut input = src.clone();
        src.push(0, DigitalSample::new(1.0, 3));
        src.push(0, DigitalSample::new(2.0, 131));
        src.push(1, DigitalSample::new(2.0, 9));

        assert_eq!(input.latest(0), Some(DigitalSample::new(2.0, 131)));
        assert_eq!(input.latest(0), None);
        assert_eq!(input.latest(1).map(|s| s.value), Some(9));
        assert_eq!(input.latest(7), None);
    }

    #[test]
    fn memory_port_records_through_boxed_handle() {
        let port = MemoryPort::new();
        let mut boxed: Box<dyn DigitalOutput> = Box::new(port.clone());
        boxed.write(0b1010).unwrap();
        boxed.write(0).unwrap();
        assert_eq!(port.writes(), vec![0b1010, 0]);
        assert_eq!(port.last(), Some(0));
    }
}
