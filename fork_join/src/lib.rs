//! Fork-join queueing network simulation
//!
//! Jobs arrive at a single preprocessor, wait for it in FIFO order, and are
//! then split into `n` sub-tasks placed on `n` distinct servers chosen at
//! random from a pool of `m`. Each server serves its own FIFO queue. A job
//! completes when its last sub-task finishes.
//!
//! The model is driven by [`engine::Engine`], which advances virtual time to
//! the next pending event. All randomness comes from one
//! [`variates::VariateSource`], so a seeded run is fully reproducible.
//!
//! ```rust
//! use fork_join::{Engine, ModelVariates, SimConfig, StopCondition};
//!
//! let config = SimConfig::new(3, StopCondition::Requests(20)).with_servers(10);
//! let mut engine = Engine::new(config, ModelVariates::seeded(7).unwrap()).unwrap();
//! let report = engine.run_until_stop().unwrap();
//! assert_eq!(report.completed_requests, 20);
//! ```

use thiserror::Error;

pub mod config;
pub mod engine;
pub mod event;
pub mod join;
pub mod replication;
pub mod resource;
pub mod stats;
pub mod variates;

pub use config::{ConfigError, SimConfig, StopCondition};
pub use engine::{Engine, SimError};
pub use event::{Event, LogEntry, LogRecord};
pub use join::{JoinError, JoinTable};
pub use replication::{replication_seed, run_replications, run_single};
pub use stats::{MeanStd, RunReport, StatsCollector, Summary};
pub use variates::{ModelVariates, ScriptedVariates, VariateParams, VariateSource};

/// Jobs are numbered in arrival order from 0
pub type JobId = u64;

/// Anything that can stop a run: bad configuration up front, or broken
/// accounting while stepping.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sim(#[from] SimError),
}
