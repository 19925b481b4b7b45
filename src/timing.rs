//! Timing spans from the host clock and from GPU timestamp queries
//!
//! Every measurement ends up as a [`Timing`], which cannot be constructed
//! with `end < start`.

use std::time::Instant;

use serde::Serialize;

use crate::error::{MatmulError, Result};

/// Where a measurement came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingSource {
    /// Pass-level timestamp queries on the GPU queue
    GpuTimestamp,
    /// Host monotonic clock around submission and completion
    HostClock,
}

/// A closed interval in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timing {
    start_ns: u64,
    end_ns: u64,
}

impl Timing {
    /// Builds a span, rejecting `end_ns < start_ns`
    pub fn new(start_ns: u64, end_ns: u64) -> Result<Self> {
        if end_ns < start_ns {
            return Err(MatmulError::Timing {
                start: start_ns,
                end: end_ns,
            });
        }
        Ok(Self { start_ns, end_ns })
    }

    /// Converts raw timestamp ticks using the queue's period (ns per tick)
    ///
    /// Only the span is scaled; absolute tick counts are too large for f64
    /// to keep nanosecond resolution.
    pub fn from_ticks(start: u64, end: u64, period_ns: f32) -> Result<Self> {
        if end < start {
            return Err(MatmulError::Timing { start, end });
        }
        let period = f64::from(period_ns);
        let start_ns = (start as f64 * period) as u64;
        let span_ns = ((end - start) as f64 * period) as u64;
        Self::new(start_ns, start_ns.saturating_add(span_ns))
    }

    /// Start in nanoseconds
    pub fn start_ns(&self) -> u64 {
        self.start_ns
    }

    /// End in nanoseconds
    pub fn end_ns(&self) -> u64 {
        self.end_ns
    }

    /// Length of the span in nanoseconds
    pub fn elapsed_ns(&self) -> u64 {
        self.end_ns - self.start_ns
    }

    /// Length of the span in milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ns() as f64 / 1_000_000.0
    }
}

/// Host-side monotonic stopwatch
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    origin: Instant,
}

impl Stopwatch {
    /// Starts the clock
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Span from the start to now
    pub fn stop(&self) -> Timing {
        let end = self.origin.elapsed().as_nanos().min(u64::MAX as u128) as u64;
        // Instant is monotonic, so the span starts at zero and end >= 0.
        Timing {
            start_ns: 0,
            end_ns: end,
        }
    }
}
