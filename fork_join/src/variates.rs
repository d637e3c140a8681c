use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Exp, Pareto, Uniform};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Source of every random draw the engine makes.
///
/// The engine owns exactly one source and draws from it in a fixed order, so
/// a seeded source replays the same run. Durations are expected to be
/// positive; the engine still copes with zero or negative values by treating
/// them as already elapsed.
pub trait VariateSource {
    /// Restart the stream from `seed`.
    fn reseed(&mut self, seed: u64);

    /// Seed the stream was last started from, if it has one.
    fn seed_used(&self) -> Option<u64> {
        None
    }

    fn inter_arrival_time(&mut self) -> f64;

    fn preprocessing_time(&mut self, fan_out: usize) -> f64;

    fn subtask_time(&mut self, fan_out: usize) -> f64;

    /// `fan_out` distinct server indices from `0..servers`, ascending.
    fn sample_servers(&mut self, servers: usize, fan_out: usize) -> Vec<usize>;
}

impl<V: VariateSource + ?Sized> VariateSource for &mut V {
    fn reseed(&mut self, seed: u64) {
        (**self).reseed(seed)
    }

    fn seed_used(&self) -> Option<u64> {
        (**self).seed_used()
    }

    fn inter_arrival_time(&mut self) -> f64 {
        (**self).inter_arrival_time()
    }

    fn preprocessing_time(&mut self, fan_out: usize) -> f64 {
        (**self).preprocessing_time(fan_out)
    }

    fn subtask_time(&mut self, fan_out: usize) -> f64 {
        (**self).subtask_time(fan_out)
    }

    fn sample_servers(&mut self, servers: usize, fan_out: usize) -> Vec<usize> {
        (**self).sample_servers(servers, fan_out)
    }
}

/// Distribution parameters for [`ModelVariates`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariateParams {
    /// Rate of the exponential part of the inter-arrival time
    pub arrival_rate: f64,
    /// Uniform offset added to every inter-arrival time
    pub arrival_offset: (f64, f64),
    /// Preprocessing is exponential with rate `preprocessing_rate / n`
    pub preprocessing_rate: f64,
    /// Pareto shape of a sub-task's service time
    pub subtask_shape: f64,
    /// Mean sub-task time is `subtask_mean / n^subtask_exponent`
    pub subtask_mean: f64,
    pub subtask_exponent: f64,
}

impl Default for VariateParams {
    fn default() -> Self {
        VariateParams {
            arrival_rate: 0.85,
            arrival_offset: (0.05, 0.25),
            preprocessing_rate: 10.0,
            subtask_shape: 2.08,
            subtask_mean: 20.0,
            subtask_exponent: 1.65,
        }
    }
}

impl VariateParams {
    /// Scale applied to a unit Pareto draw for fan-out `n`.
    ///
    /// Chosen so that the sub-task mean is `subtask_mean / n^subtask_exponent`.
    pub fn subtask_scale(&self, fan_out: usize) -> f64 {
        let shape = self.subtask_shape;
        self.subtask_mean * ((shape - 1.0) / shape) / (fan_out as f64).powf(self.subtask_exponent)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let (lo, hi) = self.arrival_offset;
        let checks = [
            (self.arrival_rate > 0.0, "arrival_rate must be positive"),
            (lo >= 0.0 && lo < hi, "arrival_offset must be 0 <= low < high"),
            (self.preprocessing_rate > 0.0, "preprocessing_rate must be positive"),
            (self.subtask_shape > 1.0, "subtask_shape must exceed 1"),
            (self.subtask_mean > 0.0, "subtask_mean must be positive"),
        ];
        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, msg)) => Err(ConfigError::Distribution(msg.to_string())),
            None => Ok(()),
        }
    }
}

/// Seeded generator producing the model's standard distributions.
#[derive(Debug, Clone)]
pub struct ModelVariates {
    params: VariateParams,
    seed: u64,
    rng: StdRng,
    arrival: Exp<f64>,
    arrival_offset: Uniform<f64>,
    unit_exp: Exp<f64>,
    unit_pareto: Pareto<f64>,
}

impl ModelVariates {
    /// Seeds from `seed`, or from OS entropy when `None`. The seed actually
    /// used is available from [`ModelVariates::seed`].
    pub fn new(params: VariateParams, seed: Option<u64>) -> Result<ModelVariates, ConfigError> {
        params.validate()?;
        let distribution = |e: &dyn std::fmt::Display| ConfigError::Distribution(e.to_string());

        let arrival = Exp::new(params.arrival_rate).map_err(|e| distribution(&e))?;
        let arrival_offset = Uniform::new(params.arrival_offset.0, params.arrival_offset.1)
            .map_err(|e| distribution(&e))?;
        let unit_exp = Exp::new(1.0).map_err(|e| distribution(&e))?;
        let unit_pareto = Pareto::new(1.0, params.subtask_shape).map_err(|e| distribution(&e))?;

        let seed = seed.unwrap_or_else(rand::random);
        Ok(ModelVariates {
            params,
            seed,
            rng: StdRng::seed_from_u64(seed),
            arrival,
            arrival_offset,
            unit_exp,
            unit_pareto,
        })
    }

    pub fn seeded(seed: u64) -> Result<ModelVariates, ConfigError> {
        ModelVariates::new(VariateParams::default(), Some(seed))
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn params(&self) -> &VariateParams {
        &self.params
    }
}

impl VariateSource for ModelVariates {
    fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn seed_used(&self) -> Option<u64> {
        Some(self.seed)
    }

    fn inter_arrival_time(&mut self) -> f64 {
        let exp = self.arrival.sample(&mut self.rng);
        exp + self.arrival_offset.sample(&mut self.rng)
    }

    fn preprocessing_time(&mut self, fan_out: usize) -> f64 {
        // Exp(rate) == Exp(1) / rate
        let rate = self.params.preprocessing_rate / fan_out as f64;
        self.unit_exp.sample(&mut self.rng) / rate
    }

    fn subtask_time(&mut self, fan_out: usize) -> f64 {
        self.unit_pareto.sample(&mut self.rng) * self.params.subtask_scale(fan_out)
    }

    fn sample_servers(&mut self, servers: usize, fan_out: usize) -> Vec<usize> {
        let mut chosen = rand::seq::index::sample(&mut self.rng, servers, fan_out).into_vec();
        chosen.sort_unstable();
        chosen
    }
}

/// Replays scripted draws in order.
///
/// Once a script runs dry the stream falls back to a fixed value: arrivals
/// to `f64::INFINITY` (no further arrivals), service times to `1.0`, and
/// server selection to the lowest `fan_out` indices. `reseed` rewinds every
/// script to its start.
#[derive(Debug, Clone, Default)]
pub struct ScriptedVariates {
    arrivals: Script<f64>,
    preprocessing: Script<f64>,
    subtasks: Script<f64>,
    servers: Script<Vec<usize>>,
    draws: usize,
}

#[derive(Debug, Clone, Default)]
struct Script<T> {
    values: Vec<T>,
    cursor: usize,
}

impl<T: Clone> Script<T> {
    fn next(&mut self) -> Option<T> {
        let value = self.values.get(self.cursor).cloned();
        if value.is_some() {
            self.cursor += 1;
        }
        value
    }
}

impl ScriptedVariates {
    pub fn new() -> ScriptedVariates {
        ScriptedVariates::default()
    }

    pub fn arrivals(mut self, values: impl IntoIterator<Item = f64>) -> Self {
        self.arrivals.values = values.into_iter().collect();
        self
    }

    pub fn preprocessing(mut self, values: impl IntoIterator<Item = f64>) -> Self {
        self.preprocessing.values = values.into_iter().collect();
        self
    }

    pub fn subtasks(mut self, values: impl IntoIterator<Item = f64>) -> Self {
        self.subtasks.values = values.into_iter().collect();
        self
    }

    pub fn servers(mut self, choices: impl IntoIterator<Item = Vec<usize>>) -> Self {
        self.servers.values = choices.into_iter().collect();
        self
    }

    /// Number of draws made so far, server selections included.
    pub fn draws(&self) -> usize {
        self.draws
    }

    /// Scripted values not yet consumed, in stream order
    /// (arrivals, preprocessing, subtasks, server choices).
    pub fn remaining(&self) -> (usize, usize, usize, usize) {
        let left = |len: usize, cursor: usize| len - cursor;
        (
            left(self.arrivals.values.len(), self.arrivals.cursor),
            left(self.preprocessing.values.len(), self.preprocessing.cursor),
            left(self.subtasks.values.len(), self.subtasks.cursor),
            left(self.servers.values.len(), self.servers.cursor),
        )
    }
}

impl VariateSource for ScriptedVariates {
    fn reseed(&mut self, _seed: u64) {
        self.arrivals.cursor = 0;
        self.preprocessing.cursor = 0;
        self.subtasks.cursor = 0;
        self.servers.cursor = 0;
        self.draws = 0;
    }

    fn inter_arrival_time(&mut self) -> f64 {
        self.draws += 1;
        self.arrivals.next().unwrap_or(f64::INFINITY)
    }

    fn preprocessing_time(&mut self, _fan_out: usize) -> f64 {
        self.draws += 1;
        self.preprocessing.next().unwrap_or(1.0)
    }

    fn subtask_time(&mut self, _fan_out: usize) -> f64 {
        self.draws += 1;
        self.subtasks.next().unwrap_or(1.0)
    }

    fn sample_servers(&mut self, servers: usize, fan_out: usize) -> Vec<usize> {
        self.draws += 1;
        let mut chosen = self
            .servers
            .next()
            .unwrap_or_else(|| (0..fan_out.min(servers)).collect());
        chosen.sort_unstable();
        chosen
    }
}
