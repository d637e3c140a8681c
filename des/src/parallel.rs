//! Parallel execution of independent simulation replications
//!
//! Replications of a stochastic model share nothing but their configuration,
//! so they can run on separate threads. Each replication is built fresh from
//! its `replication_id`, run to its own stop condition, and summarised.
//! Building a model may fail (bad parameters), which is reported the same way
//! as a failed run.
//!
//! # Example: running 100 replications
//!
//! ```rust
//! use des::Simulation;
//! use des::parallel::ParallelRunner;
//!
//! struct Countdown { left: u32, seed: u64 }
//!
//! impl Simulation for Countdown {
//!     type Stats = u64;
//!     type Error = String;
//!     fn run(&mut self) -> Result<(), String> {
//!         while self.left > 0 { self.left -= 1; }
//!         Ok(())
//!     }
//!     fn stats(&self) -> u64 { self.seed }
//! }
//!
//! let results = ParallelRunner::new(100, |replication_id| {
//!     Ok(Countdown { left: 10, seed: 42 + replication_id as u64 })
//! })
//! .progress(|done, total| {
//!     if done == total { println!("all {total} replications finished"); }
//! })
//! .num_threads(4)
//! .run();
//!
//! for (id, result) in results.iter().enumerate() {
//!     match result {
//!         Ok(seed) => assert_eq!(*seed, 42 + id as u64),
//!         Err(e) => eprintln!("Replication {} failed: {}", id, e),
//!     }
//! }
//! ```
//!
//! # Determinism
//!
//! Results are deterministic when:
//! 1. The builder derives each replication's seed from `replication_id`
//! 2. Models draw only from their own seeded generator
//! 3. No mutable state is shared across replications
//!
//! Results come back in `replication_id` order whatever the thread count.
//!
//! # Error Handling
//!
//! A replication whose builder or `run` returns an error, or which panics,
//! yields `Err(String)`. The other replications are unaffected.

use crate::Simulation;
use rayon::prelude::*;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Runs many replications of a model in parallel
///
/// The builder `F` takes a replication id and returns a fresh model. It is
/// called on the worker thread, so the model itself does not need to be
/// `Send`; only its stats do.
pub struct ParallelRunner<M, F>
where
    M: Simulation,
    M::Stats: Send,
    F: Fn(usize) -> Result<M, M::Error> + Send + Sync,
{
    num_replications: usize,
    builder: F,
    num_threads: Option<usize>,
    progress_callback: Option<Arc<dyn Fn(usize, usize) + Send + Sync>>,
    _model: PhantomData<fn() -> M>,
}

impl<M, F> ParallelRunner<M, F>
where
    M: Simulation,
    M::Stats: Send,
    F: Fn(usize) -> Result<M, M::Error> + Send + Sync,
{
    pub fn new(num_replications: usize, builder: F) -> Self {
        ParallelRunner {
            num_replications,
            builder,
            num_threads: None,
            progress_callback: None,
            _model: PhantomData,
        }
    }

    /// Set number of threads (defaults to rayon's global pool)
    pub fn num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }

    /// Set progress callback, called with `(completed, total)` after each
    /// replication finishes
    pub fn progress<P>(mut self, callback: P) -> Self
    where
        P: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Execute all replications and return their stats in id order
    pub fn run(self) -> Vec<Result<M::Stats, String>> {
        let progress_counter = AtomicUsize::new(0);

        let pool = match self.num_threads {
            Some(n) => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
                Ok(pool) => Some(pool),
                Err(e) => {
                    return (0..self.num_replications)
                        .map(|_| Err(format!("Failed to create thread pool: {e}")))
                        .collect();
                }
            },
            None => None,
        };

        let execute = || {
            (0..self.num_replications)
                .into_par_iter()
                .map(|replication_id| {
                    let replicate = || -> Result<M::Stats, String> {
                        let mut model = (self.builder)(replication_id).map_err(|e| e.to_string())?;
                        model.run().map_err(|e| e.to_string())?;
                        Ok(model.stats())
                    };
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(replicate));

                    let completed = progress_counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(ref callback) = self.progress_callback {
                        callback(completed, self.num_replications);
                    }

                    result.unwrap_or_else(|panic| {
                        Err(if let Some(s) = panic.downcast_ref::<&str>() {
                            s.to_string()
                        } else if let Some(s) = panic.downcast_ref::<String>() {
                            s.clone()
                        } else {
                            "Unknown panic".to_string()
                        })
                    })
                })
                .collect()
        };

        match pool {
            Some(pool) => pool.install(execute),
            None => execute(),
        }
    }
}
