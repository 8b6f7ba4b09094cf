//! Fixed-timestep clock driving readiness-gauge progression.
//!
//! One `GaugeClock` lives inside the coordinator's `tokio::select!`
//! loop. While combat is in its gauge-filling phase the clock fires at
//! a fixed rate; outside combat (or while an action is awaited) it is
//! paused and [`GaugeClock::wait_for_tick`] pends forever, so the other
//! select branches keep running undisturbed.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, warn};

/// Configuration for the gauge clock.
#[derive(Debug, Clone)]
pub struct GaugeClockConfig {
    /// Tick rate in Hz. 10 Hz keeps gauge motion smooth without
    /// flooding the loop.
    pub rate_hz: u32,
    /// Random jitter (0–max µs) added before the first tick so combats
    /// started at the same instant across sessions don't beat in sync.
    pub initial_jitter_us: u64,
}

impl Default for GaugeClockConfig {
    fn default() -> Self {
        Self {
            rate_hz: 10,
            initial_jitter_us: 2_000,
        }
    }
}

impl GaugeClockConfig {
    /// Hard cap on the tick rate.
    pub const MAX_RATE_HZ: u32 = 60;

    fn validated(mut self) -> Self {
        if self.rate_hz == 0 {
            warn!("gauge clock rate of 0 is invalid — using 1 Hz");
            self.rate_hz = 1;
        }
        if self.rate_hz > Self::MAX_RATE_HZ {
            warn!(
                rate = self.rate_hz,
                max = Self::MAX_RATE_HZ,
                "gauge clock rate exceeds maximum — clamping"
            );
            self.rate_hz = Self::MAX_RATE_HZ;
        }
        self
    }

    fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.rate_hz))
    }
}

/// Information about a fired tick.
#[derive(Debug, Clone, Copy)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// Fixed delta for this tick, always `1 / rate_hz`. Gauge math uses
    /// this, not wall-clock elapsed time, so late wakeups don't produce
    /// gauge jumps.
    pub dt: Duration,
}

/// Fixed-timestep gauge clock. Starts paused.
pub struct GaugeClock {
    tick_duration: Duration,
    initial_jitter_us: u64,
    tick_count: u64,
    next_tick: Option<TokioInstant>,
    paused: bool,
}

impl GaugeClock {
    pub fn new(config: GaugeClockConfig) -> Self {
        let config = config.validated();
        debug!(rate_hz = config.rate_hz, "gauge clock created (paused)");
        Self {
            tick_duration: config.tick_duration(),
            initial_jitter_us: config.initial_jitter_us,
            tick_count: 0,
            next_tick: None,
            paused: true,
        }
    }

    /// Waits until the next tick is due.
    ///
    /// While paused this future pends forever — `tokio::select!` keeps
    /// servicing its other branches.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let next = match self.next_tick {
            Some(next) if !self.paused => next,
            _ => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.tick_count += 1;

        // Late wakeups skip ahead rather than bursting catch-up ticks.
        let late_by = now.saturating_duration_since(next);
        if late_by > self.tick_duration {
            let skipped =
                late_by.as_nanos() as u64 / self.tick_duration.as_nanos() as u64;
            warn!(
                tick = self.tick_count,
                skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "gauge tick overran — skipping ahead"
            );
            self.next_tick = Some(now + self.tick_duration);
        } else {
            self.next_tick = Some(next + self.tick_duration);
        }

        TickInfo {
            tick: self.tick_count,
            dt: self.tick_duration,
        }
    }

    /// Starts (or restarts) ticking. The first tick lands after one
    /// tick duration plus the configured jitter.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            let jitter = if self.initial_jitter_us > 0 {
                let us = rand::rng().random_range(0..self.initial_jitter_us);
                Duration::from_micros(us)
            } else {
                Duration::ZERO
            };
            self.next_tick = Some(TokioInstant::now() + self.tick_duration + jitter);
            debug!(tick = self.tick_count, "gauge clock resumed");
        }
    }

    /// Stops ticking. Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(tick = self.tick_count, "gauge clock paused");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The fixed per-tick delta.
    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }
}
