//! Integration tests for the sweep scheduler.
//!
//! Every async test starts with the clock paused, so sleeps resolve as
//! soon as the runtime is idle and elapsed times are exact.

use std::time::Duration;

use duelroom_sweep::{DEFAULT_SWEEP_INTERVAL, SweepConfig, SweepScheduler};
use tokio::time::{self, Instant};

fn config_secs(secs: u64) -> SweepConfig {
    SweepConfig::with_interval(Duration::from_secs(secs)).with_initial_jitter(Duration::ZERO)
}

// =========================================================================
// SweepConfig
// =========================================================================

#[test]
fn test_default_config_sweeps_every_five_minutes() {
    let cfg = SweepConfig::default();
    assert_eq!(cfg.interval, DEFAULT_SWEEP_INTERVAL);
    assert_eq!(cfg.interval, Duration::from_secs(300));
    assert!(!cfg.is_disabled());
}

#[test]
fn test_validated_raises_tiny_interval() {
    let cfg = SweepConfig::with_interval(Duration::from_millis(1)).validated();
    assert_eq!(cfg.interval, SweepConfig::MIN_INTERVAL);
}

#[test]
fn test_validated_caps_jitter_at_interval() {
    let cfg = SweepConfig::with_interval(Duration::from_secs(1))
        .with_initial_jitter(Duration::from_secs(30))
        .validated();
    assert_eq!(cfg.initial_jitter, Duration::from_secs(1));
}

#[test]
fn test_disabled_config_keeps_zero_interval() {
    let cfg = SweepConfig::disabled().validated();
    assert!(cfg.is_disabled());
}

// =========================================================================
// Firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_first_sweep_fires_after_one_interval() {
    let mut s = SweepScheduler::new(config_secs(60));
    let start = Instant::now();

    let tick = s.wait_for_sweep().await;

    assert_eq!(start.elapsed(), Duration::from_secs(60));
    assert_eq!(tick.sweep, 1);
    assert_eq!(tick.missed, 0);
    assert_eq!(s.sweep_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sweeps_repeat_at_interval() {
    let mut s = SweepScheduler::new(config_secs(10));
    let start = Instant::now();

    s.wait_for_sweep().await;
    s.wait_for_sweep().await;
    let tick = s.wait_for_sweep().await;

    assert_eq!(tick.sweep, 3);
    assert_eq!(start.elapsed(), Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_first_sweep_jitter_stays_within_bound() {
    let cfg =
        SweepConfig::with_interval(Duration::from_secs(10)).with_initial_jitter(Duration::from_secs(2));
    let mut s = SweepScheduler::new(cfg);
    let start = Instant::now();

    s.wait_for_sweep().await;

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(10));
    assert!(elapsed <= Duration::from_secs(12));
}

#[tokio::test(start_paused = true)]
async fn test_overdue_sweep_runs_once_and_reports_missed() {
    let mut s = SweepScheduler::new(config_secs(1));
    time::advance(Duration::from_millis(3_500)).await;

    let tick = s.wait_for_sweep().await;
    assert_eq!(tick.sweep, 1);
    assert_eq!(tick.missed, 2);
    assert_eq!(tick.late_by, Duration::from_millis(2_500));

    // The schedule restarts from now instead of replaying.
    let before = Instant::now();
    let tick = s.wait_for_sweep().await;
    assert_eq!(tick.sweep, 2);
    assert_eq!(before.elapsed(), Duration::from_secs(1));
}

// =========================================================================
// Disabled
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_disabled_scheduler_never_fires() {
    let mut s = SweepScheduler::new(SweepConfig::disabled());
    assert!(s.is_disabled());

    let result = time::timeout(Duration::from_secs(3_600), s.wait_for_sweep()).await;

    assert!(result.is_err());
    assert_eq!(s.sweep_count(), 0);
}
