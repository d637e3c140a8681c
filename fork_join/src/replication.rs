//! Single runs and parallel replications of the model

use des::parallel::ParallelRunner;
use tracing::{debug, info};

use crate::RunError;
use crate::config::SimConfig;
use crate::engine::Engine;
use crate::stats::{RunReport, Summary};
use crate::variates::ModelVariates;

/// Seed of replication `index` under `base`
pub fn replication_seed(base: u64, index: usize) -> u64 {
    base.wrapping_add(index as u64)
}

/// Run one replication with the configured seed, or a fresh one if unset.
pub fn run_single(config: &SimConfig) -> Result<RunReport, RunError> {
    let source = ModelVariates::new(config.variates.clone(), config.seed)?;
    let mut engine = Engine::new(config.clone(), source)?;
    Ok(engine.run_until_stop()?)
}

/// Run `config.replications` independent replications in parallel and
/// average them. Replication `i` is seeded with `base + i`. The event log is
/// never printed for replications.
pub fn run_replications(
    config: &SimConfig,
    num_threads: Option<usize>,
) -> Result<Summary, RunError> {
    config.validate()?;
    let base = config.seed.unwrap_or_else(rand::random);
    info!(
        replications = config.replications,
        fan_out = config.fan_out,
        servers = config.servers,
        base_seed = base,
        "Starting replications"
    );

    let quiet = config.clone().with_verbose(false);
    let build = |index: usize| -> Result<Engine<ModelVariates>, RunError> {
        let seed = replication_seed(base, index);
        let source = ModelVariates::new(quiet.variates.clone(), Some(seed))?;
        Ok(Engine::new(quiet.clone().with_seed(seed), source)?)
    };

    let mut runner = ParallelRunner::new(config.replications, build)
        .progress(|done, total| debug!(done, total, "replication finished"));
    if let Some(n) = num_threads {
        runner = runner.num_threads(n);
    }
    let mut summary = Summary::from_results(runner.run());
    summary.base_seed = Some(base);

    info!(
        successful = summary.successful,
        failed = summary.failures.len(),
        "Replications finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StopCondition;

    fn config(replications: usize) -> SimConfig {
        SimConfig::new(2, StopCondition::Requests(30))
            .with_servers(4)
            .with_replications(replications)
            .with_seed(100)
    }

    #[test]
    fn seeds_follow_base() {
        assert_eq!(replication_seed(100, 0), 100);
        assert_eq!(replication_seed(100, 3), 103);
        assert_eq!(replication_seed(u64::MAX, 1), 0);
    }

    #[test]
    fn single_run_is_reproducible() {
        let first = run_single(&config(1)).unwrap();
        let second = run_single(&config(1)).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.completed_requests, 30);
        assert_eq!(first.seed, Some(100));
    }

    #[test]
    fn replication_matches_single_run_with_its_seed() {
        let summary = run_replications(&config(1), Some(1)).unwrap();
        let single = run_single(&config(1)).unwrap();

        let throughput = summary.throughput.unwrap();
        assert_eq!(throughput.mean, single.throughput);
        assert_eq!(throughput.std, 0.0);
    }

    #[test]
    fn summary_independent_of_thread_count() {
        let one = run_replications(&config(8), Some(1)).unwrap();
        let four = run_replications(&config(8), Some(4)).unwrap();

        assert_eq!(one, four);
        assert_eq!(one.base_seed, Some(100));
        assert_eq!(one.successful, 8);
        assert!(one.failures.is_empty());
    }

    #[test]
    fn unseeded_replications_report_their_base_seed() {
        let mut unseeded = config(2);
        unseeded.seed = None;

        let summary = run_replications(&unseeded, Some(2)).unwrap();
        let base = summary.base_seed.expect("base seed recorded");

        let replay = run_replications(&unseeded.with_seed(base), Some(2)).unwrap();
        assert_eq!(summary, replay);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains(&format!("\"base_seed\":{}", base)));
    }

    #[test]
    fn invalid_config_rejected_before_running() {
        let bad = config(4).with_servers(1);
        assert!(matches!(
            run_replications(&bad, None),
            Err(RunError::Config(_))
        ));
    }
}
