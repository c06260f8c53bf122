//! Frame-coalesced scheduling
//!
//! Scroll input arrives far faster than it is worth processing. A
//! [`FrameGate`] holds at most one pending sample: every request overwrites
//! it, and the next frame callback takes whatever is latest. Work therefore
//! runs at most once per frame regardless of input rate.
//!
//! The gate does not know where frames come from. Callers deliver frame
//! callbacks from whatever drives them: explicit frame events, an event-loop
//! tick, or a [`FrameClock`] advanced over a timeline.

use std::time::Duration;

/// Outcome of a [`FrameGate::request`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRequest {
    /// No frame was pending; one is now scheduled
    Scheduled,
    /// A frame was already pending; the sample replaced the previous one
    Coalesced,
}

/// Counters for gate activity
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub requests: u64,
    pub coalesced: u64,
    pub frames_run: u64,
    pub cancelled: u64,
}

/// Single-slot, latest-wins frame scheduler.
#[derive(Debug)]
pub struct FrameGate<T> {
    pending: Option<T>,
    stats: FrameStats,
}

impl<T> Default for FrameGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FrameGate<T> {
    pub fn new() -> Self {
        Self {
            pending: None,
            stats: FrameStats::default(),
        }
    }

    /// Schedule `sample` for the next frame, replacing any pending sample.
    pub fn request(&mut self, sample: T) -> FrameRequest {
        self.stats.requests += 1;
        let outcome = if self.pending.is_some() {
            self.stats.coalesced += 1;
            FrameRequest::Coalesced
        } else {
            FrameRequest::Scheduled
        };
        self.pending = Some(sample);
        outcome
    }

    /// Frame callback: take the pending sample, if any.
    pub fn on_frame(&mut self) -> Option<T> {
        let sample = self.pending.take();
        if sample.is_some() {
            self.stats.frames_run += 1;
        }
        sample
    }

    /// Drop pending work without running it. Returns true if something was dropped.
    pub fn cancel(&mut self) -> bool {
        let dropped = self.pending.take().is_some();
        if dropped {
            self.stats.cancelled += 1;
        }
        dropped
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}

/// Source of frame boundaries over a monotonic timeline.
pub trait FrameClock {
    /// Advance the clock to `now` (time since the clock's origin).
    ///
    /// Returns true if at least one frame boundary was crossed since the
    /// previous call. Several boundaries crossed at once still count as one
    /// frame: the gate only ever holds one sample.
    fn tick(&mut self, now: Duration) -> bool;
}

/// Fixed-rate clock, e.g. 60 Hz.
#[derive(Debug, Clone)]
pub struct IntervalClock {
    period: Duration,
    next_boundary: Duration,
}

impl IntervalClock {
    /// Create a clock firing `rate_hz` times per second. A rate of 0 is treated as 1.
    pub fn new(rate_hz: u32) -> Self {
        let period = Duration::from_secs(1) / rate_hz.max(1);
        Self {
            period,
            next_boundary: period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl FrameClock for IntervalClock {
    fn tick(&mut self, now: Duration) -> bool {
        if now < self.next_boundary {
            return false;
        }
        let elapsed_periods = now.as_nanos() / self.period.as_nanos().max(1);
        let next = (elapsed_periods + 1) * self.period.as_nanos();
        self.next_boundary = Duration::from_nanos(u64::try_from(next).unwrap_or(u64::MAX));
        true
    }
}
