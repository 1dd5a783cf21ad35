//! Profile Measurements
//!
//! A measurement accumulates wall-clock "think time" for one named activity
//! across many start/stop intervals.

use std::time::{Duration, Instant};

/// Cumulative timer for a named activity.
#[derive(Debug, Clone)]
pub struct ProfileMeasurement {
    name: &'static str,
    total_think_time: Duration,
    invocations: u64,
    started: Option<Instant>,
}

impl ProfileMeasurement {
    /// Create a measurement with no recorded time.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            total_think_time: Duration::ZERO,
            invocations: 0,
            started: None,
        }
    }

    /// Name of the measured activity.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Begin an interval. Restarting an open interval discards it.
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Whether an interval is open.
    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    /// Close the open interval and add it to the total.
    ///
    /// Returns the interval length, or `None` if nothing was started.
    pub fn stop(&mut self) -> Option<Duration> {
        let elapsed = self.started.take()?.elapsed();
        self.add_think_time(elapsed);
        Some(elapsed)
    }

    /// Add an externally timed interval.
    pub fn add_think_time(&mut self, elapsed: Duration) {
        self.total_think_time += elapsed;
        self.invocations += 1;
    }

    /// Accumulated time in nanoseconds, saturating at `u64::MAX`.
    pub fn total_think_time(&self) -> u64 {
        u64::try_from(self.total_think_time.as_nanos()).unwrap_or(u64::MAX)
    }

    /// Number of recorded intervals.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    /// Mean interval length in nanoseconds.
    pub fn average_think_time(&self) -> f64 {
        if self.invocations == 0 {
            0.0
        } else {
            self.total_think_time() as f64 / self.invocations as f64
        }
    }

    /// Drop all recorded time and any open interval.
    pub fn reset(&mut self) {
        self.total_think_time = Duration::ZERO;
        self.invocations = 0;
        self.started = None;
    }
}
