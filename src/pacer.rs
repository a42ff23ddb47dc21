//! The rate pacer behind [`crate::Node::sleep`] (`spec.md` §4.5): holds a
//! loop to a target frequency by sleeping off whatever time remains in
//! the current period, with no correction for periods already missed.

use std::time::{Duration, Instant};

/// Paces a loop to `target_fps` iterations per second.
///
/// The first [`Pacer::sleep`] call only records a starting instant and
/// returns immediately — there is no "previous tick" to measure against
/// yet. Every call after that sleeps for whatever is left of the period
/// once the caller's own work is accounted for; if the caller already
/// overran the period, the call returns immediately instead of sleeping
/// a negative duration.
pub struct Pacer {
    period: Duration,
    last_tick: Option<Instant>,
}

impl Pacer {
    pub fn new(target_fps: f64) -> Self {
        assert!(target_fps > 0.0, "target_fps must be positive");
        Self {
            period: Duration::from_secs_f64(1.0 / target_fps),
            last_tick: None,
        }
    }

    pub async fn sleep(&mut self) {
        match self.last_tick {
            None => {
                self.last_tick = Some(Instant::now());
            }
            Some(last) => {
                let elapsed = last.elapsed();
                if elapsed < self.period {
                    tokio::time::sleep(self.period - elapsed).await;
                }
                self.last_tick = Some(Instant::now());
            }
        }
    }
}
