//! Fixed-period ticker driving one game's match attempts.
//!
//! Missed ticks are skipped rather than replayed: a match attempt looks at
//! the whole queue, so one late attempt does the work of any it replaced.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

pub(crate) struct MatchTicker {
    interval: Interval,
    ticks: u64,
}

impl MatchTicker {
    /// First tick fires after `period` plus a random delay in
    /// `0..max_jitter`, so games activated together drift apart.
    pub(crate) fn new(period: Duration, max_jitter: Duration) -> Self {
        let start = Instant::now() + period + jitter(max_jitter);
        let mut interval = time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval, ticks: 0 }
    }

    /// Waits for the next tick and returns its number, starting at 1.
    pub(crate) async fn tick(&mut self) -> u64 {
        self.interval.tick().await;
        self.ticks += 1;
        self.ticks
    }
}

fn jitter(max: Duration) -> Duration {
    let max_us = max.as_micros() as u64;
    if max_us == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(rand::rng().random_range(0..max_us))
}
