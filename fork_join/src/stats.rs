//! Per-run statistics and averaging across replications
//!
//! Reports are serializable so runs can be dumped as JSON for analysis
//! elsewhere.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::JobId;

/// Arrival and completion time of a joined job
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub arrival_time: f64,
    pub completion_time: f64,
}

impl JobRecord {
    pub fn response_time(&self) -> f64 {
        self.completion_time - self.arrival_time
    }
}

/// Collects arrivals and completions as the engine reports them.
#[derive(Debug, Clone, Default)]
pub struct StatsCollector {
    in_flight: HashMap<JobId, f64>,
    completed: Vec<JobRecord>,
    arrivals: u64,
    response_time_sum: f64,
}

impl StatsCollector {
    pub fn new() -> StatsCollector {
        StatsCollector::default()
    }

    pub fn record_arrival(&mut self, job: JobId, time: f64) {
        self.arrivals += 1;
        self.in_flight.insert(job, time);
    }

    /// Close out `job`. Returns its record, or `None` if its arrival was
    /// never recorded.
    pub fn record_completion(&mut self, job: JobId, time: f64) -> Option<JobRecord> {
        let arrival_time = self.in_flight.remove(&job)?;
        let record = JobRecord {
            id: job,
            arrival_time,
            completion_time: time,
        };
        self.response_time_sum += record.response_time();
        self.completed.push(record);
        Some(record)
    }

    pub fn arrival_time(&self, job: JobId) -> Option<f64> {
        self.in_flight.get(&job).copied()
    }

    pub fn arrivals(&self) -> u64 {
        self.arrivals
    }

    pub fn completed_requests(&self) -> u64 {
        self.completed.len() as u64
    }

    /// Completed jobs in completion order
    pub fn completed(&self) -> &[JobRecord] {
        &self.completed
    }

    /// Jobs that arrived but have not been joined yet
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn mean_response_time(&self) -> Option<f64> {
        if self.completed.is_empty() {
            None
        } else {
            Some(self.response_time_sum / self.completed.len() as f64)
        }
    }

    pub fn report(&self, seed: Option<u64>, elapsed: f64) -> RunReport {
        let completed_requests = self.completed_requests();
        let throughput = if elapsed > 0.0 {
            completed_requests as f64 / elapsed
        } else {
            0.0
        };
        RunReport {
            seed,
            completed_requests,
            arrivals: self.arrivals,
            elapsed,
            throughput,
            mean_response_time: self.mean_response_time(),
        }
    }
}

/// Metrics of a single run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub seed: Option<u64>,
    pub completed_requests: u64,
    pub arrivals: u64,
    /// Virtual time at which the run stopped
    pub elapsed: f64,
    pub throughput: f64,
    pub mean_response_time: Option<f64>,
}

impl RunReport {
    pub fn print_summary(&self) {
        if let Some(seed) = self.seed {
            println!("Seed: {}", seed);
        }
        println!("Completed requests: {}", self.completed_requests);
        println!("Arrivals: {}", self.arrivals);
        println!("Elapsed time: {:.6}", self.elapsed);
        println!("Throughput: {:.6}", self.throughput);
        match self.mean_response_time {
            Some(rt) => println!("Mean response time: {:.6}", rt),
            None => println!("Mean response time: n/a"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeanStd {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl MeanStd {
    /// `None` for an empty sample. `std` is the sample standard deviation,
    /// zero for a single value.
    pub fn from_values(values: &[f64]) -> Option<MeanStd> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = if values.len() > 1 {
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            var.sqrt()
        } else {
            0.0
        };
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(MeanStd {
            mean,
            std,
            min,
            max,
        })
    }
}

/// Metrics averaged over independent replications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Replication `i` ran with seed `base_seed + i`
    pub base_seed: Option<u64>,
    pub replications: usize,
    pub successful: usize,
    pub failures: Vec<String>,
    pub throughput: Option<MeanStd>,
    /// Over replications that completed at least one job
    pub mean_response_time: Option<MeanStd>,
    pub completed_requests: Option<MeanStd>,
}

impl Summary {
    pub fn from_results(results: Vec<Result<RunReport, String>>) -> Summary {
        let replications = results.len();
        let mut reports = Vec::with_capacity(replications);
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => failures.push(e),
            }
        }

        let mut summary = Summary::from_reports(&reports);
        summary.replications = replications;
        summary.failures = failures;
        summary
    }

    pub fn from_reports(reports: &[RunReport]) -> Summary {
        let throughput: Vec<f64> = reports.iter().map(|r| r.throughput).collect();
        let response: Vec<f64> = reports
            .iter()
            .filter_map(|r| r.mean_response_time)
            .collect();
        let completed: Vec<f64> = reports
            .iter()
            .map(|r| r.completed_requests as f64)
            .collect();

        Summary {
            base_seed: None,
            replications: reports.len(),
            successful: reports.len(),
            failures: Vec::new(),
            throughput: MeanStd::from_values(&throughput),
            mean_response_time: MeanStd::from_values(&response),
            completed_requests: MeanStd::from_values(&completed),
        }
    }

    pub fn print_summary(&self) {
        if let Some(seed) = self.base_seed {
            println!("Base seed: {}", seed);
        }
        println!(
            "Replications: {} ({} successful)",
            self.replications, self.successful
        );
        let line = |name: &str, stat: &Option<MeanStd>| match stat {
            Some(s) => println!(
                "  {}: {:.6} (std {:.6}, min {:.6}, max {:.6})",
                name, s.mean, s.std, s.min, s.max
            ),
            None => println!("  {}: n/a", name),
        };
        line("Throughput", &self.throughput);
        line("Mean response time", &self.mean_response_time);
        line("Completed requests", &self.completed_requests);
        for failure in &self.failures {
            println!("  Failed replication: {}", failure);
        }
    }
}
