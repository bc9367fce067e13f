//! Tick sources for the capture loop.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Drives the capture loop. Each call waits for the next tick and returns the
/// session time elapsed since the first one.
#[async_trait]
pub trait Ticker: Send {
    async fn tick(&mut self) -> Duration;
}

// ── IntervalTicker ────────────────────────────────────────────────────────────

/// Wall-clock ticker standing in for the display refresh.
pub struct IntervalTicker {
    interval: Interval,
    origin:   Option<Instant>,
}

impl IntervalTicker {
    /// Must be called from within a tokio runtime.
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval, origin: None }
    }

    pub fn from_hz(hz: u32) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / hz.max(1) as f64))
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> Duration {
        let now = self.interval.tick().await;
        let origin = *self.origin.get_or_insert(now);
        now.saturating_duration_since(origin)
    }
}

// ── VirtualTicker ─────────────────────────────────────────────────────────────

/// Advances a virtual clock by a fixed step per tick without sleeping.
///
/// Each tick yields to the runtime once so spawned readback tasks can run.
#[derive(Debug, Clone)]
pub struct VirtualTicker {
    step: Duration,
    now:  Duration,
}

impl VirtualTicker {
    pub fn new(step: Duration) -> Self {
        Self { step, now: Duration::ZERO }
    }

    pub fn from_hz(hz: u32) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / hz.max(1) as f64))
    }
}

#[async_trait]
impl Ticker for VirtualTicker {
    async fn tick(&mut self) -> Duration {
        tokio::task::yield_now().await;
        let elapsed = self.now;
        self.now += self.step;
        elapsed
    }
}
