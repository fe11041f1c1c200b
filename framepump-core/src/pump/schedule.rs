//! Refresh sources for hosts that do not have a frontend calling them once per refresh.
//!
//! A libretro frontend already owns the refresh cadence (`retro_run`), so the core ticks the
//! pump directly. The headless runner needs one of these instead.

use std::thread;
use std::time::{Duration, Instant};

/// Hands out refresh timestamps, in milliseconds, one per tick.
///
/// `None` means there are no more refreshes and the loop should end.
pub trait RefreshScheduler {
    fn next_refresh(&mut self) -> Option<f64>;
}

fn interval_for(refresh_rate_hz: f64) -> Option<Duration> {
    (refresh_rate_hz.is_finite() && refresh_rate_hz > 0.0)
        .then(|| Duration::from_secs_f64(1.0 / refresh_rate_hz))
}

/// Deterministic timestamps `n * interval`, produced as fast as the caller consumes them.
#[derive(Clone, Debug)]
pub struct FixedStep {
    interval_ms: f64,
    issued: u64,
    limit: Option<u64>,
}

impl FixedStep {
    /// `None` if `refresh_rate_hz` is not a positive finite rate.
    pub fn new(refresh_rate_hz: f64, limit: Option<u64>) -> Option<Self> {
        let interval = interval_for(refresh_rate_hz)?;
        Some(Self {
            interval_ms: interval.as_secs_f64() * 1000.0,
            issued: 0,
            limit,
        })
    }
}

impl RefreshScheduler for FixedStep {
    fn next_refresh(&mut self) -> Option<f64> {
        if self.limit.is_some_and(|limit| self.issued >= limit) {
            return None;
        }
        let timestamp = self.issued as f64 * self.interval_ms;
        self.issued += 1;
        Some(timestamp)
    }
}

/// Wall-clock paced refreshes: sleeps until the next deadline, then reports the time since
/// the scheduler was created.
///
/// A tick that overruns its slot pushes the next deadline out instead of bursting to catch up.
#[derive(Debug)]
pub struct Paced {
    interval: Duration,
    origin: Instant,
    deadline: Instant,
    remaining: Option<u64>,
}

impl Paced {
    /// `None` if `refresh_rate_hz` is not a positive finite rate.
    pub fn new(refresh_rate_hz: f64, limit: Option<u64>) -> Option<Self> {
        let interval = interval_for(refresh_rate_hz)?;
        let origin = Instant::now();
        Some(Self {
            interval,
            origin,
            deadline: origin,
            remaining: limit,
        })
    }
}

impl RefreshScheduler for Paced {
    fn next_refresh(&mut self) -> Option<f64> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }

        let now = Instant::now();
        if now < self.deadline {
            thread::sleep(self.deadline - now);
        }
        let fired = Instant::now();
        self.deadline = (self.deadline + self.interval).max(fired);

        Some(fired.duration_since(self.origin).as_secs_f64() * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_step_is_evenly_spaced_and_bounded() {
        let mut scheduler = FixedStep::new(50.0, Some(3)).unwrap();
        let stamps: Vec<f64> = std::iter::from_fn(|| scheduler.next_refresh()).collect();
        assert_eq!(stamps.len(), 3);
        assert!((stamps[0] - 0.0).abs() < 1e-9);
        assert!((stamps[1] - 20.0).abs() < 1e-9);
        assert!((stamps[2] - 40.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_rates_are_rejected() {
        assert!(FixedStep::new(0.0, None).is_none());
        assert!(FixedStep::new(-60.0, None).is_none());
        assert!(Paced::new(f64::NAN, None).is_none());
    }

    #[test]
    fn paced_timestamps_increase() {
        let mut scheduler = Paced::new(1000.0, Some(3)).unwrap();
        let a = scheduler.next_refresh().unwrap();
        let b = scheduler.next_refresh().unwrap();
        let c = scheduler.next_refresh().unwrap();
        assert!(a <= b && b <= c);
        assert!(c - a >= 1.0, "expected at least one interval between {a} and {c}");
        assert_eq!(scheduler.next_refresh(), None);
    }
}
