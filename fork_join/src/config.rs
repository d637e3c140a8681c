use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::variates::VariateParams;

/// Server count of the reference model
pub const DEFAULT_SERVERS: usize = 10;

/// Requests to complete when no stop condition is given
pub const DEFAULT_REQUESTS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("fan-out {fan_out} exceeds server count {servers}")]
    FanOutExceedsServers { fan_out: usize, servers: usize },
    #[error("fan-out must be at least 1")]
    ZeroFanOut,
    #[error("server count must be at least 1")]
    ZeroServers,
    #[error("request target must be positive, got {0}")]
    NonPositiveRequests(i64),
    #[error("time horizon must be positive and finite, got {0}")]
    NonPositiveHorizon(f64),
    #[error("specify either a request target or a time horizon, not both")]
    ConflictingStop,
    #[error("a request target or a time horizon is required")]
    MissingStop,
    #[error("replication count must be at least 1")]
    ZeroReplications,
    #[error("invalid distribution parameters: {0}")]
    Distribution(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// When a run ends. Checked between steps only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCondition {
    /// Stop once this many jobs have been joined
    Requests(u64),
    /// Stop once virtual time reaches this value
    Horizon(f64),
}

impl StopCondition {
    /// Exactly one of `requests` and `horizon` must be given.
    pub fn from_options(
        requests: Option<i64>,
        horizon: Option<f64>,
    ) -> Result<StopCondition, ConfigError> {
        let stop = match (requests, horizon) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingStop),
            (None, None) => return Err(ConfigError::MissingStop),
            (Some(r), None) if r <= 0 => return Err(ConfigError::NonPositiveRequests(r)),
            (Some(r), None) => StopCondition::Requests(r as u64),
            (None, Some(h)) => StopCondition::Horizon(h),
        };
        stop.validate()?;
        Ok(stop)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            StopCondition::Requests(0) => Err(ConfigError::NonPositiveRequests(0)),
            StopCondition::Horizon(h) if !(h > 0.0 && h.is_finite()) => {
                Err(ConfigError::NonPositiveHorizon(h))
            }
            _ => Ok(()),
        }
    }

    pub fn is_met(&self, completed_requests: u64, now: f64) -> bool {
        match *self {
            StopCondition::Requests(target) => completed_requests >= target,
            StopCondition::Horizon(horizon) => now >= horizon,
        }
    }
}

/// Configuration of a simulation run
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Servers each job is split across (n)
    pub fan_out: usize,
    /// Size of the server pool (m)
    pub servers: usize,
    pub stop: StopCondition,
    /// Print the event log
    pub verbose: bool,
    /// Independent runs to average over
    pub replications: usize,
    /// Base seed; drawn from OS entropy when absent
    pub seed: Option<u64>,
    pub variates: VariateParams,
}

impl SimConfig {
    pub fn new(fan_out: usize, stop: StopCondition) -> Self {
        SimConfig {
            fan_out,
            servers: DEFAULT_SERVERS,
            stop,
            verbose: false,
            replications: 1,
            seed: None,
            variates: VariateParams::default(),
        }
    }

    pub fn with_servers(mut self, servers: usize) -> Self {
        self.servers = servers;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_replications(mut self, replications: usize) -> Self {
        self.replications = replications;
        self
    }

    pub fn with_variates(mut self, variates: VariateParams) -> Self {
        self.variates = variates;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fan_out == 0 {
            return Err(ConfigError::ZeroFanOut);
        }
        if self.servers == 0 {
            return Err(ConfigError::ZeroServers);
        }
        if self.fan_out > self.servers {
            return Err(ConfigError::FanOutExceedsServers {
                fan_out: self.fan_out,
                servers: self.servers,
            });
        }
        if self.replications == 0 {
            return Err(ConfigError::ZeroReplications);
        }
        self.variates.validate()?;
        self.stop.validate()
    }

    pub fn from_toml_str(s: &str) -> Result<SimConfig, ConfigError> {
        let file: FileConfig = toml::from_str(s)?;
        let config = file.into_config()?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<SimConfig, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        SimConfig::from_toml_str(&contents)
    }
}

/// On-disk layout. `requests` and `horizon` are mutually exclusive; with
/// neither, the run stops after [`DEFAULT_REQUESTS`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    fan_out: usize,
    servers: Option<usize>,
    requests: Option<i64>,
    horizon: Option<f64>,
    #[serde(default)]
    verbose: bool,
    replications: Option<usize>,
    seed: Option<u64>,
    #[serde(default)]
    variates: VariateParams,
}

impl FileConfig {
    fn into_config(self) -> Result<SimConfig, ConfigError> {
        let stop = match (self.requests, self.horizon) {
            (None, None) => StopCondition::Requests(DEFAULT_REQUESTS),
            (requests, horizon) => StopCondition::from_options(requests, horizon)?,
        };
        Ok(SimConfig {
            fan_out: self.fan_out,
            servers: self.servers.unwrap_or(DEFAULT_SERVERS),
            stop,
            verbose: self.verbose,
            replications: self.replications.unwrap_or(1),
            seed: self.seed,
            variates: self.variates,
        })
    }
}
