use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::timer::{TickStats, Timer};

/// Clock that only moves when told to. Clones share the same clock, so a test can
/// hold one handle and advance time under a session that owns another.
#[derive(Debug, Clone)]
pub struct ManualTimer {
    now_bits: Arc<AtomicU64>,
    tick_times: VecDeque<Duration>,
    pub max_samples: usize,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self {
            now_bits: Arc::new(AtomicU64::new(0.0f64.to_bits())),
            tick_times: VecDeque::with_capacity(1000),
            max_samples: 1000,
        }
    }

    pub fn set_ms(&self, ms: f64) {
        self.now_bits.store(ms.to_bits(), Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: f64) {
        self.set_ms(self.now_ms() + ms);
    }
}

impl Timer for ManualTimer {
    fn now_ms(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::SeqCst))
    }
    fn sleep(&self, d: Duration) {
        self.advance_ms(d.as_secs_f64() * 1e3);
    }
    fn restart(&mut self) {
        self.set_ms(0.0);
        self.tick_times.clear();
    }
    fn record_tick(&mut self, d: Duration) {
        if self.tick_times.len() >= self.max_samples {
            self.tick_times.pop_front();
        }
        self.tick_times.push_back(d);
    }
    fn tick_stats(&self) -> TickStats {
        TickStats::from_intervals(&self.tick_times)
    }
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new()
    }
}
