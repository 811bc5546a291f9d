//! Transfer speed estimation over a sliding time window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Byte-count samples retained for the trailing window.
#[derive(Debug)]
pub struct RateWindow {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
    started: Instant,
}

impl RateWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
            started: Instant::now(),
        }
    }

    /// Record bytes transferred just now.
    pub fn record(&mut self, bytes: u64) {
        let now = Instant::now();
        self.samples.push_back((now, bytes));
        self.evict(now);
    }

    /// Current speed in bytes per second.
    pub fn speed(&mut self) -> f64 {
        let now = Instant::now();
        self.evict(now);

        let total: u64 = self.samples.iter().map(|(_, b)| b).sum();
        if total == 0 {
            return 0.0;
        }

        // Elapsed time is the window span, clamped to the transfer age so
        // young transfers do not report inflated speeds.
        let span = self
            .window
            .min(now.duration_since(self.started))
            .as_secs_f64()
            .max(0.001);

        total as f64 / span
    }

    /// Seconds remaining at the current speed.
    pub fn eta(&mut self, remaining: u64) -> Option<u64> {
        let speed = self.speed();
        if speed <= 0.0 {
            return None;
        }
        Some((remaining as f64 / speed).ceil() as u64)
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(at, _)) = self.samples.front() {
            if now.duration_since(at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}
