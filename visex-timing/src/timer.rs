use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Monotonic elapsed-time source driving the experiment tick loop
pub trait Timer: Clone + Send + Sync {
    /// Milliseconds since the timer was (re)started.
    fn now_ms(&self) -> f64;
    fn elapsed_ms(&self, since_ms: f64) -> f64 {
        (self.now_ms() - since_ms).max(0.0)
    }
    fn sleep(&self, d: Duration);
    fn restart(&mut self);
    fn record_tick(&mut self, d: Duration);
    fn tick_stats(&self) -> TickStats;
}

/// Regularity of the tick loop over the recorded window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickStats {
    pub ticks: usize,
    pub average_tick_ns: f64,
    pub jitter_ns: f64,
    pub min_tick_ns: f64,
    pub max_tick_ns: f64,
    pub effective_hz: f64,
}

impl TickStats {
    pub fn from_intervals<'a>(intervals: impl IntoIterator<Item = &'a Duration>) -> Self {
        let times: Vec<f64> = intervals
            .into_iter()
            .map(|d| d.as_nanos() as f64)
            .collect();
        if times.is_empty() {
            return TickStats::default();
        }
        let n = times.len() as f64;
        let avg = times.iter().sum::<f64>() / n;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / n;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        TickStats {
            ticks: times.len(),
            average_tick_ns: avg,
            jitter_ns: var.sqrt(),
            min_tick_ns: min,
            max_tick_ns: max,
            effective_hz: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    pub start: Instant,
    pub tick_times: VecDeque<Duration>,
    pub max_samples: usize,
}

impl Timer for HighPrecisionTimer {
    fn now_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1e3
    }
    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
    fn restart(&mut self) {
        self.start = Instant::now();
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

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            tick_times: VecDeque::with_capacity(1000),
            max_samples: 1000,
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        #[cfg(target_os = "windows")]
        self.windows_sleep(duration);
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        self.spin_sleep(duration);
    }

    #[cfg(target_os = "windows")]
    fn windows_sleep(&self, duration: Duration) {
        use windows::core::PCWSTR;
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{
            CreateWaitableTimerW, SetWaitableTimer, WaitForSingleObject, INFINITE,
        };

        // Relative due time in 100 ns intervals
        let due_time = -((duration.as_nanos() / 100) as i64);

        unsafe {
            let Ok(timer) = CreateWaitableTimerW(None, true, PCWSTR::null()) else {
                std::thread::sleep(duration);
                return;
            };
            if SetWaitableTimer(timer, &due_time, 0, None, None, false).is_ok() {
                WaitForSingleObject(timer, INFINITE);
            }
            let _ = CloseHandle(timer);
        }
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC};

        let req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };

        unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut());
        }
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    fn spin_sleep(&self, duration: Duration) {
        // Coarse sleep then spin out the last 100 µs
        let deadline = Instant::now() + duration;
        if duration > Duration::from_micros(100) {
            std::thread::sleep(duration - Duration::from_micros(100));
        }
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}
