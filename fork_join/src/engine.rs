//! Next-event simulation of the fork-join network
//!
//! State advances in steps. A step moves the clock to the earliest pending
//! countdown (next arrival, the preprocessor's job, each busy server's
//! sub-task), counts every countdown down by the same amount, and fires all
//! of them that reached zero. Simultaneous events fire in [`Event`] order:
//! arrival, preprocessor, then servers by ascending index. Every draw from
//! the variate source happens inside a fire, one draw per need, so the draw
//! sequence and therefore the whole run is fixed by the seed.
//!
//! Firing goes in rounds. Each round walks the countdowns in firing order
//! and fires each one found due at its turn. A zero or negative draw is due
//! at once: it fires later in the same round if its turn has not passed,
//! otherwise in the next round. The step returns once a round fires nothing.

use std::iter;

use des::{Clock, Simulation};
use thiserror::Error;
use tracing::{debug, trace};

use crate::JobId;
use crate::RunError;
use crate::config::{ConfigError, SimConfig, StopCondition};
use crate::event::{Event, LogEntry, LogRecord};
use crate::join::{JoinError, JoinTable};
use crate::resource::{Preprocessor, ServerPool};
use crate::stats::{RunReport, StatsCollector};
use crate::variates::VariateSource;

/// Rounds of same-instant firing allowed in one step
pub const MAX_FIRING_ROUNDS: usize = 1024;

/// Broken internal accounting. Any of these aborts the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error(transparent)]
    Join(#[from] JoinError),
    #[error("finish requested on an idle resource")]
    IdleFinish,
    #[error("server {0} does not exist")]
    UnknownServer(usize),
    #[error("job {job} assigned twice to server {server}")]
    DuplicateAssignment { job: JobId, server: usize },
    #[error("job {job} split to {chosen:?}, expected {fan_out} distinct servers below {servers}")]
    BadSelection {
        job: JobId,
        chosen: Vec<usize>,
        fan_out: usize,
        servers: usize,
    },
    #[error("job {0} completed without a recorded arrival")]
    UnknownJob(JobId),
    #[error("nothing left to happen at time {time}")]
    NoPendingEvents { time: f64 },
    #[error("time stopped advancing at {time}: events kept firing without elapsing")]
    Stalled { time: f64 },
}

pub struct Engine<V> {
    fan_out: usize,
    stop: StopCondition,
    verbose: bool,
    source: V,
    clock: Clock,
    next_arrival: f64,
    next_job: JobId,
    preprocessor: Preprocessor,
    servers: ServerPool,
    joins: JoinTable,
    stats: StatsCollector,
    steps: u64,
    last_delta: Option<f64>,
}

impl<V: VariateSource> Engine<V> {
    /// Validates `config` before touching `source`, then draws the first
    /// inter-arrival time.
    pub fn new(config: SimConfig, mut source: V) -> Result<Engine<V>, ConfigError> {
        config.validate()?;
        let next_arrival = source.inter_arrival_time();

        Ok(Engine {
            fan_out: config.fan_out,
            stop: config.stop,
            verbose: config.verbose,
            source,
            clock: Clock::new(),
            next_arrival,
            next_job: 0,
            preprocessor: Preprocessor::new(),
            servers: ServerPool::new(config.servers),
            joins: JoinTable::new(),
            stats: StatsCollector::new(),
            steps: 0,
            last_delta: None,
        })
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn fan_out(&self) -> usize {
        self.fan_out
    }

    /// Time until the next arrival
    pub fn next_arrival(&self) -> f64 {
        self.next_arrival
    }

    /// Clock advance of the most recent step
    pub fn last_delta(&self) -> Option<f64> {
        self.last_delta
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn servers(&self) -> &ServerPool {
        &self.servers
    }

    pub fn joins(&self) -> &JoinTable {
        &self.joins
    }

    pub fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    pub fn source(&self) -> &V {
        &self.source
    }

    /// Clock advance the next step will make: the smallest pending
    /// countdown, never below zero.
    pub fn next_delta(&self) -> f64 {
        let pending = iter::once(self.next_arrival)
            .chain(self.preprocessor.station().active_remaining())
            .chain(self.servers.active_remaining());
        des::next_delta(pending).unwrap_or(0.0)
    }

    pub fn is_finished(&self) -> bool {
        self.stop
            .is_met(self.stats.completed_requests(), self.clock.now())
    }

    pub fn report(&self) -> RunReport {
        self.stats.report(self.source.seed_used(), self.clock.now())
    }

    /// Advance to the next event instant and fire everything due there.
    /// Returns what happened, in firing order.
    pub fn step(&mut self) -> Result<Vec<LogRecord>, SimError> {
        let delta = self.next_delta();
        if !delta.is_finite() {
            return Err(SimError::NoPendingEvents {
                time: self.clock.now(),
            });
        }
        self.clock.advance(delta);
        self.last_delta = Some(delta);

        des::elapse(&mut self.next_arrival, delta);
        self.preprocessor.tick(delta);
        self.servers.tick(delta);

        let mut log = Vec::new();
        let mut rounds = 0;
        while self.fire_round(&mut log)? {
            rounds += 1;
            if rounds > MAX_FIRING_ROUNDS {
                return Err(SimError::Stalled {
                    time: self.clock.now(),
                });
            }
        }

        self.steps += 1;
        Ok(log)
    }

    /// Step until the stop condition holds, printing the event log when
    /// verbose.
    pub fn run_until_stop(&mut self) -> Result<RunReport, SimError> {
        while !self.is_finished() {
            let log = self.step()?;
            if self.verbose {
                for record in &log {
                    println!("{}", record);
                }
            }
        }

        let report = self.report();
        debug!(
            steps = self.steps,
            completed = report.completed_requests,
            elapsed = report.elapsed,
            "run finished"
        );
        Ok(report)
    }

    /// One pass over the countdowns in firing order, each checked just before
    /// its turn, so a zero draw made earlier in the pass fires in the same
    /// pass if its turn is still to come. Returns whether anything fired.
    fn fire_round(&mut self, log: &mut Vec<LogRecord>) -> Result<bool, SimError> {
        let mut fired = false;
        if des::elapse(&mut self.next_arrival, 0.0) {
            self.fire(Event::Arrival, log)?;
            fired = true;
        }
        if self.preprocessor.tick(0.0) {
            self.fire(Event::PreprocessorDone, log)?;
            fired = true;
        }
        for server in 0..self.servers.len() {
            if self.servers.tick_server(server, 0.0) {
                self.fire(Event::ServerDone(server), log)?;
                fired = true;
            }
        }
        Ok(fired)
    }

    fn fire(&mut self, event: Event, log: &mut Vec<LogRecord>) -> Result<(), SimError> {
        trace!(time = self.clock.now(), ?event, "firing");
        let time = self.clock.now();
        let mut push = |entry: LogEntry| log.push(LogRecord { time, entry });

        match event {
            Event::Arrival => {
                let job = self.next_job;
                self.next_job += 1;
                self.stats.record_arrival(job, time);

                let ahead = self.preprocessor.station().queue_len();
                match self
                    .preprocessor
                    .enqueue(job, &mut self.source, self.fan_out)
                {
                    Some(requiring) => push(LogEntry::Arrived { job, requiring }),
                    None => push(LogEntry::Queued { job, ahead }),
                }
                self.next_arrival = self.source.inter_arrival_time();
            }
            Event::PreprocessorDone => {
                let finished = self
                    .preprocessor
                    .finish_active(&mut self.source, self.fan_out)?;
                let job = finished.job;

                let chosen = self
                    .source
                    .sample_servers(self.servers.len(), self.fan_out);
                self.check_selection(job, &chosen)?;
                self.joins.open(job, self.fan_out)?;
                push(LogEntry::Split {
                    job,
                    servers: chosen.clone(),
                });

                for server in chosen {
                    if let Some(requiring) =
                        self.servers
                            .assign(job, server, &mut self.source, self.fan_out)?
                    {
                        push(LogEntry::SubtaskStarted {
                            server,
                            job,
                            requiring,
                        });
                    }
                }

                if let Some((next, requiring)) = finished.next {
                    push(LogEntry::PreprocessorStarted {
                        job: next,
                        requiring,
                    });
                }
            }
            Event::ServerDone(server) => {
                let finished = self
                    .servers
                    .finish(server, &mut self.source, self.fan_out)?;
                let job = finished.job;
                push(LogEntry::SubtaskFinished { server, job });

                if let Some((next, requiring)) = finished.next {
                    push(LogEntry::SubtaskStarted {
                        server,
                        job: next,
                        requiring,
                    });
                }

                if self.joins.complete_one(job)? {
                    let record = self
                        .stats
                        .record_completion(job, time)
                        .ok_or(SimError::UnknownJob(job))?;
                    push(LogEntry::Completed {
                        job,
                        response_time: record.response_time(),
                    });
                }
            }
        }

        Ok(())
    }

    fn check_selection(&self, job: JobId, chosen: &[usize]) -> Result<(), SimError> {
        let servers = self.servers.len();
        let distinct = chosen.windows(2).all(|w| w[0] < w[1]);
        if chosen.len() != self.fan_out || !distinct || chosen.iter().any(|&s| s >= servers) {
            return Err(SimError::BadSelection {
                job,
                chosen: chosen.to_vec(),
                fan_out: self.fan_out,
                servers,
            });
        }
        Ok(())
    }
}

impl<V: VariateSource> Simulation for Engine<V> {
    type Stats = RunReport;
    type Error = RunError;

    fn run(&mut self) -> Result<(), RunError> {
        self.run_until_stop()?;
        Ok(())
    }

    fn stats(&self) -> RunReport {
        self.report()
    }
}
