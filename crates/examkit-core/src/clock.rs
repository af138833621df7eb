//! Clock Source implementations.
//!
//! [`IntervalClock`] ticks on the tokio timer and measures real elapsed time
//! between ticks. [`ManualClock`] is driven by hand through a [`ClockDriver`],
//! so tests can feed synthetic deltas instead of waiting on wall-clock time.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::traits::ClockSource;

/// Nominal tick interval of the production clock.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Timer-driven clock that reports measured, not nominal, deltas.
#[derive(Debug)]
pub struct IntervalClock {
    period: Duration,
    interval: Option<Interval>,
    last: Instant,
}

impl IntervalClock {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
            last: Instant::now(),
        }
    }
}

impl Default for IntervalClock {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL)
    }
}

#[async_trait]
impl ClockSource for IntervalClock {
    fn start(&mut self) {
        let now = Instant::now();
        let mut interval = interval_at(now + self.period, self.period);
        // A suspended host produces one late tick carrying the whole gap,
        // never a burst of catch-up ticks.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        self.last = now;
    }

    async fn tick(&mut self) -> Duration {
        if self.interval.is_none() {
            self.start();
        }
        if let Some(interval) = self.interval.as_mut() {
            interval.tick().await;
        }
        let now = Instant::now();
        let delta = now.saturating_duration_since(self.last);
        self.last = now;
        delta
    }
}

/// Clock whose ticks are pushed in by a [`ClockDriver`].
#[derive(Debug)]
pub struct ManualClock {
    ticks: mpsc::UnboundedReceiver<Duration>,
}

/// Handle that feeds ticks into a [`ManualClock`].
#[derive(Debug, Clone)]
pub struct ClockDriver {
    ticks: mpsc::UnboundedSender<Duration>,
}

impl ManualClock {
    /// Create a clock and the driver that controls it.
    pub fn new() -> (Self, ClockDriver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { ticks: rx }, ClockDriver { ticks: tx })
    }
}

impl ClockDriver {
    /// Deliver one tick reporting `delta` of elapsed time.
    ///
    /// Returns `false` once the clock has been dropped.
    pub fn advance(&self, delta: Duration) -> bool {
        self.ticks.send(delta).is_ok()
    }

    /// Deliver one tick of `secs` whole seconds.
    pub fn advance_secs(&self, secs: u64) -> bool {
        self.advance(Duration::from_secs(secs))
    }
}

#[async_trait]
impl ClockSource for ManualClock {
    fn start(&mut self) {}

    async fn tick(&mut self) -> Duration {
        match self.ticks.recv().await {
            Some(delta) => delta,
            // Driver gone: the clock simply never ticks again.
            None => std::future::pending().await,
        }
    }
}
