use serde::{Deserialize, Serialize};

use crate::error::PortError;
use crate::io::DigitalOutput;

pub const PORT_BITS: usize = 8;

/// Square wave parameters for one output bit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveformSpec {
    pub frequency_hz: f64,
    #[serde(default)]
    pub latency_ms: f64,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

fn enabled() -> bool {
    true
}

impl WaveformSpec {
    pub fn new(frequency_hz: f64, latency_ms: f64) -> Self {
        Self {
            frequency_hz,
            latency_ms,
            enabled: true,
        }
    }

    /// Bit `i` at `2^i` Hz with no latency, giving every line a distinct frequency.
    pub fn power_of_two(bit: usize) -> Self {
        Self::new(2f64.powi(bit as i32), 0.0)
    }

    pub fn is_valid(&self) -> bool {
        self.frequency_hz.is_finite()
            && self.latency_ms.is_finite()
            && self.frequency_hz >= 0.0
            && self.latency_ms >= 0.0
    }

    /// `None` for a zero frequency, which holds the line high once latency elapses.
    pub fn period_ms(&self) -> Option<f64> {
        (self.frequency_hz > 0.0).then(|| 1000.0 / self.frequency_hz)
    }
}

impl Default for WaveformSpec {
    fn default() -> Self {
        Self {
            frequency_hz: 0.0,
            latency_ms: 0.0,
            enabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WaveformChannel {
    pub spec: WaveformSpec,
    start_ms: Option<f64>,
}

impl WaveformChannel {
    pub fn new(spec: WaveformSpec) -> Self {
        Self {
            spec,
            start_ms: None,
        }
    }

    pub fn start(&mut self, now_ms: f64) {
        self.start_ms = Some(now_ms);
    }

    pub fn stop(&mut self) {
        self.start_ms = None;
    }

    pub fn is_running(&self) -> bool {
        self.start_ms.is_some()
    }

    /// Line level at `now_ms`: high during the first half of each period after latency.
    pub fn level(&self, now_ms: f64) -> bool {
        let Some(start_ms) = self.start_ms else {
            return false;
        };
        if !self.spec.enabled {
            return false;
        }
        let t = now_ms - start_ms - self.spec.latency_ms;
        if t < 0.0 {
            return false;
        }
        match self.spec.period_ms() {
            Some(period) => t.rem_euclid(period) < period / 2.0,
            None => true,
        }
    }
}

/// Eight waveform channels composed onto one byte-wide output port.
///
/// Each [`sample`](Self::sample) writes the composed byte exactly once; there is no
/// buffering, so waveform phase is only as regular as the loop calling it. Dropping
/// the driver drives every line low.
pub struct DigitalOutputDriver<P: DigitalOutput> {
    port: P,
    channels: [WaveformChannel; PORT_BITS],
    last: u8,
}

impl<P: DigitalOutput> DigitalOutputDriver<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            channels: [WaveformChannel::default(); PORT_BITS],
            last: 0,
        }
    }

    pub fn configure(&mut self, bit: usize, frequency_hz: f64, latency_ms: f64) -> Result<(), PortError> {
        self.configure_spec(bit, WaveformSpec::new(frequency_hz, latency_ms))
    }

    pub fn configure_spec(&mut self, bit: usize, spec: WaveformSpec) -> Result<(), PortError> {
        let channel = self.channels.get_mut(bit).ok_or(PortError::BitOutOfRange(bit))?;
        if !spec.is_valid() {
            return Err(PortError::InvalidWaveform {
                bit,
                frequency_hz: spec.frequency_hz,
                latency_ms: spec.latency_ms,
            });
        }
        channel.spec = spec;
        Ok(())
    }

    pub fn channel(&self, bit: usize) -> Option<&WaveformChannel> {
        self.channels.get(bit)
    }

    /// Starts the selected bits at phase zero.
    pub fn start(&mut self, bits: &[usize], now_ms: f64) -> Result<(), PortError> {
        check_bits(bits)?;
        for &bit in bits {
            self.channels[bit].start(now_ms);
        }
        Ok(())
    }

    /// Halts the selected bits and immediately drives them low.
    pub fn stop(&mut self, bits: &[usize]) -> Result<(), PortError> {
        check_bits(bits)?;
        let mut mask = 0u8;
        for &bit in bits {
            self.channels[bit].stop();
            mask |= 1 << bit;
        }
        self.write(self.last & !mask)
    }

    pub fn stop_all(&mut self) -> Result<(), PortError> {
        self.channels.iter_mut().for_each(WaveformChannel::stop);
        self.write(0)
    }

    /// Composes every running bit at `now_ms` and writes the byte to the port.
    pub fn sample(&mut self, now_ms: f64) -> Result<u8, PortError> {
        let value = self.compose(now_ms);
        self.write(value)?;
        Ok(value)
    }

    pub fn compose(&self, now_ms: f64) -> u8 {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.level(now_ms))
            .fold(0u8, |acc, (bit, _)| acc | (1 << bit))
    }

    pub fn last_written(&self) -> u8 {
        self.last
    }

    fn write(&mut self, value: u8) -> Result<(), PortError> {
        self.port.write(value)?;
        self.last = value;
        Ok(())
    }
}

impl<P: DigitalOutput> Drop for DigitalOutputDriver<P> {
    fn drop(&mut self) {
        if let Err(e) = self.stop_all() {
            tracing::error!("Failed to reset output port: {}", e);
        }
    }
}

fn check_bits(bits: &[usize]) -> Result<(), PortError> {
    match bits.iter().find(|&&b| b >= PORT_BITS) {
        Some(&bad) => Err(PortError::BitOutOfRange(bad)),
        None => Ok(()),
    }
}
