//! Next-event time advance plumbing shared by simulation models.
//!
//! A model keeps a set of countdowns (time left until something happens).
//! Each step the clock jumps by the smallest pending countdown, every
//! countdown is reduced by that amount, and whatever reached zero fires.
//! [`next_delta`] and [`elapse`] are the two halves of that routine; models
//! call them instead of doing their own arithmetic so that zero and negative
//! remainders are treated the same way everywhere.

pub mod parallel;

/// Virtual time, owned by a model.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Clock {
    now: f64,
}

impl Clock {
    pub fn new() -> Clock {
        Clock { now: 0.0 }
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    /// Move time forward by `delta`.
    ///
    /// Virtual time never runs backwards, so a negative `delta` is a bug in
    /// the caller.
    pub fn advance(&mut self, delta: f64) {
        assert!(
            delta >= 0.0,
            "Clock cannot move backwards (delta = {delta})"
        );
        self.now += delta;
    }
}

/// Smallest pending countdown, or `None` when nothing is pending.
///
/// Non-positive countdowns count as already elapsed, so the result is never
/// below zero.
pub fn next_delta<I>(pending: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    pending
        .into_iter()
        .fold(None, |min: Option<f64>, t| match min {
            Some(m) if m <= t => Some(m),
            _ => Some(t),
        })
        .map(|m| m.max(0.0))
}

/// Subtract `delta` from a countdown and report whether it is due.
///
/// A countdown that ends up at or below zero is clamped to exactly zero, so
/// a negative remainder never survives past the step that produced it.
pub fn elapse(remaining: &mut f64, delta: f64) -> bool {
    *remaining -= delta;
    if *remaining <= 0.0 {
        *remaining = 0.0;
        true
    } else {
        false
    }
}

/// A model that can be run to completion and summarised.
///
/// The stop condition is part of the model's own configuration, which lets
/// [`parallel::ParallelRunner`] drive any model without knowing what "done"
/// means for it.
pub trait Simulation {
    type Stats;
    type Error: std::fmt::Display;

    fn run(&mut self) -> Result<(), Self::Error>;

    fn stats(&self) -> Self::Stats;
}
