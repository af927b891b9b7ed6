//! Fixed-rate pacing for the threads that own a Lane or the Coordinator.
//!
//! Each such thread runs one loop: wait for the tick, do the work, then
//! sleep for whatever is left of the tick budget. [`TickPacer::run_until`]
//! is that loop:
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//!
//! use laneforge_tick::TickPacer;
//!
//! let stop = AtomicBool::new(false);
//! let mut pacer = TickPacer::with_rate(30);
//! pacer.run_until(&stop, |tick| {
//!     // drain inboxes, step the world by tick.dt, flush outbound
//!     let _ = tick.number;
//! });
//! ```
//!
//! The pacer never spins. A tick that starts late is handled by the
//! configured [`OverrunPolicy`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, trace, warn};

/// What to do with ticks missed because a previous tick ran long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverrunPolicy {
    /// Drop the missed ticks and pace from now on.
    #[default]
    Skip,
    /// Run up to `max_ticks` missed ticks back to back; drop the rest.
    CatchUp { max_ticks: u32 },
}

/// Pacing parameters for one thread.
#[derive(Debug, Clone, PartialEq)]
pub struct TickConfig {
    /// Ticks per second, `1..=MAX_RATE_HZ`.
    pub rate_hz: u32,
    pub overrun: OverrunPolicy,
    /// A tick whose work takes more than this fraction of the budget is
    /// logged as slow.
    pub slow_fraction: f64,
    /// Upper bound of a random delay before the first tick, so lanes
    /// started together do not tick in lockstep.
    pub start_jitter: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            rate_hz: 30,
            overrun: OverrunPolicy::Skip,
            slow_fraction: 0.8,
            start_jitter: Duration::from_millis(2),
        }
    }
}

impl TickConfig {
    pub const MAX_RATE_HZ: u32 = 240;

    pub fn with_rate(rate_hz: u32) -> Self {
        Self {
            rate_hz,
            ..Self::default()
        }
    }

    /// Forces the rate into `1..=MAX_RATE_HZ` and `slow_fraction` into
    /// `0.0..=1.0`.
    pub fn validated(mut self) -> Self {
        let rate = self.rate_hz.clamp(1, Self::MAX_RATE_HZ);
        if rate != self.rate_hz {
            warn!(requested = self.rate_hz, using = rate, "tick rate out of range");
            self.rate_hz = rate;
        }
        if !(0.0..=1.0).contains(&self.slow_fraction) {
            self.slow_fraction = self.slow_fraction.clamp(0.0, 1.0);
        }
        self
    }

    /// Length of one tick.
    pub fn budget(&self) -> Duration {
        Duration::from_secs(1) / self.rate_hz.max(1)
    }
}

/// One tick handed to the loop body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// 1 for the first tick.
    pub number: u64,
    /// Simulation step; always one budget.
    pub dt: Duration,
    /// How far past its due time the tick started.
    pub late: Duration,
    /// Ticks dropped just before this one.
    pub skipped: u64,
}

/// Running totals for a pacer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacerStats {
    pub ticks: u64,
    /// Ticks that started more than a tenth of a budget late.
    pub late_ticks: u64,
    pub skipped: u64,
    /// Moving average of work time per tick.
    pub busy_avg: Duration,
    pub busy_max: Duration,
    /// Work time of the last finished tick over the budget.
    pub last_load: f64,
}

/// Blocking fixed-rate pacer. One per ticking thread.
#[derive(Debug)]
pub struct TickPacer {
    config: TickConfig,
    budget: Duration,
    number: u64,
    due: Instant,
    started: Option<Instant>,
    stats: PacerStats,
}

impl TickPacer {
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let budget = config.budget();
        let jitter = match config.start_jitter.as_micros() {
            0 => Duration::ZERO,
            max => Duration::from_micros(rand::rng().random_range(0..max as u64)),
        };
        debug!(rate_hz = config.rate_hz, overrun = ?config.overrun, "tick pacer created");
        Self {
            config,
            budget,
            number: 0,
            due: Instant::now() + budget + jitter,
            started: None,
            stats: PacerStats::default(),
        }
    }

    pub fn with_rate(rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(rate_hz))
    }

    /// Runs `body` once per tick until `stop` is set. The flag is checked
    /// before every tick.
    pub fn run_until(&mut self, stop: &AtomicBool, mut body: impl FnMut(Tick)) {
        while !stop.load(Ordering::Acquire) {
            let tick = self.begin();
            body(tick);
            self.finish();
        }
    }

    /// Sleeps until the next tick is due and starts it.
    pub fn begin(&mut self) -> Tick {
        let due = self.due;
        if let Some(wait) = due.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
        let now = Instant::now();
        self.number += 1;
        self.started = Some(now);

        let late = now.saturating_duration_since(due);
        let behind = (late.as_nanos() / self.budget.as_nanos()) as u64;
        let (next, skipped) = match self.config.overrun {
            OverrunPolicy::Skip => (now + self.budget, behind),
            OverrunPolicy::CatchUp { max_ticks } if behind <= u64::from(max_ticks) => {
                (due + self.budget, 0)
            }
            OverrunPolicy::CatchUp { max_ticks } => {
                (now + self.budget, behind - u64::from(max_ticks))
            }
        };
        self.due = next;

        if late > self.budget / 10 {
            self.stats.late_ticks += 1;
            warn!(
                tick = self.number,
                late_ms = late.as_secs_f64() * 1000.0,
                skipped,
                "tick started late"
            );
        }
        self.stats.ticks += 1;
        self.stats.skipped += skipped;
        trace!(tick = self.number, "tick");

        Tick {
            number: self.number,
            dt: self.budget,
            late,
            skipped,
        }
    }

    /// Ends the tick started by [`begin`](Self::begin). Does nothing if
    /// no tick is running.
    pub fn finish(&mut self) {
        let Some(started) = self.started.take() else {
            return;
        };
        let busy = started.elapsed();
        let load = busy.as_secs_f64() / self.budget.as_secs_f64();
        if load > self.config.slow_fraction {
            warn!(
                tick = self.number,
                busy_ms = busy.as_secs_f64() * 1000.0,
                load,
                "slow tick"
            );
        }
        let stats = &mut self.stats;
        stats.last_load = load;
        stats.busy_max = stats.busy_max.max(busy);
        stats.busy_avg = if stats.busy_avg.is_zero() {
            busy
        } else {
            stats.busy_avg.mul_f64(0.9) + busy.mul_f64(0.1)
        };
    }

    pub fn ticks(&self) -> u64 {
        self.number
    }

    pub fn rate_hz(&self) -> u32 {
        self.config.rate_hz
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn stats(&self) -> &PacerStats {
        &self.stats
    }

    /// Time left until the next tick; zero if it is already due.
    pub fn until_next(&self) -> Duration {
        self.due.saturating_duration_since(Instant::now())
    }
}
