//! Fixed-interval scheduler for duelroom's cleanup sweeps.
//!
//! The liveness sweep runs every few minutes, far slower than anything
//! else in the server. Missed sweeps are never replayed: if the process
//! was stalled past one or more deadlines, the next sweep runs once and
//! the schedule restarts from now.
//!
//! # Disabled mode
//!
//! When `interval` is zero the scheduler is disabled and
//! [`SweepScheduler::wait_for_sweep`] pends forever.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = shutdown.changed() => break,
//!         tick = scheduler.wait_for_sweep() => {
//!             let report = engine.sweep().await;
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Configuration for [`SweepScheduler`].
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Time between sweeps. Zero disables sweeping.
    pub interval: Duration,
    /// Upper bound of the random delay added to the first sweep, so several
    /// server processes started together don't sweep in lockstep.
    pub initial_jitter: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
            initial_jitter: Duration::from_secs(5),
        }
    }
}

impl SweepConfig {
    /// Shortest interval accepted.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

    /// A config with the given interval and default jitter.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Sets the first-sweep jitter bound.
    pub fn with_initial_jitter(mut self, jitter: Duration) -> Self {
        self.initial_jitter = jitter;
        self
    }

    /// A disabled config.
    pub fn disabled() -> Self {
        Self {
            interval: Duration::ZERO,
            initial_jitter: Duration::ZERO,
        }
    }

    /// Raises a nonzero interval below [`Self::MIN_INTERVAL`] to it and caps
    /// the jitter at one interval.
    pub fn validated(mut self) -> Self {
        if !self.interval.is_zero() && self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                "sweep interval below minimum, raising"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        if self.initial_jitter > self.interval {
            self.initial_jitter = self.interval;
        }
        self
    }

    pub fn is_disabled(&self) -> bool {
        self.interval.is_zero()
    }
}

// ---------------------------------------------------------------------------
// Sweep tick
// ---------------------------------------------------------------------------

/// Returned by [`SweepScheduler::wait_for_sweep`] each time a sweep is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepTick {
    /// Monotonically increasing sweep number (starts at 1).
    pub sweep: u64,
    /// How late the scheduler woke up.
    pub late_by: Duration,
    /// Whole intervals missed since the deadline. Not replayed.
    pub missed: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Drives periodic sweeps. One per server.
#[derive(Debug)]
pub struct SweepScheduler {
    config: SweepConfig,
    sweep_count: u64,
    next_sweep: Option<Instant>,
}

impl SweepScheduler {
    /// Creates a scheduler. The first sweep is one interval plus a random
    /// share of `initial_jitter` from now.
    pub fn new(config: SweepConfig) -> Self {
        let config = config.validated();
        let next_sweep = (!config.is_disabled()).then(|| {
            let jitter = if config.initial_jitter.is_zero() {
                Duration::ZERO
            } else {
                let ms = config.initial_jitter.as_millis() as u64;
                Duration::from_millis(rand::rng().random_range(0..=ms))
            };
            Instant::now() + config.interval + jitter
        });

        if config.is_disabled() {
            debug!("sweep scheduler created disabled");
        } else {
            debug!(
                interval_secs = config.interval.as_secs_f64(),
                "sweep scheduler created"
            );
        }

        Self {
            config,
            sweep_count: 0,
            next_sweep,
        }
    }

    /// Waits until the next sweep is due.
    ///
    /// Pends forever when disabled; use it inside `tokio::select!`.
    pub async fn wait_for_sweep(&mut self) -> SweepTick {
        let Some(next) = self.next_sweep else {
            return std::future::pending().await;
        };
        let interval = self.config.interval;

        time::sleep_until(next).await;

        let now = Instant::now();
        self.sweep_count += 1;
        let late_by = now.saturating_duration_since(next);
        let missed = (late_by.as_nanos() / interval.as_nanos().max(1)) as u64;
        if missed > 0 {
            warn!(
                sweep = self.sweep_count,
                missed,
                late_secs = late_by.as_secs_f64(),
                "sweep overdue, skipping missed runs"
            );
        }
        self.next_sweep = Some(now + interval);
        trace!(sweep = self.sweep_count, "sweep due");

        SweepTick {
            sweep: self.sweep_count,
            late_by,
            missed,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.config.is_disabled()
    }

    /// Sweeps fired so far.
    pub fn sweep_count(&self) -> u64 {
        self.sweep_count
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }
}
