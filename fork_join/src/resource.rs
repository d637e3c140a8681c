use std::collections::VecDeque;

use crate::JobId;
use crate::engine::SimError;
use crate::variates::VariateSource;

/// Single-server FIFO queue.
///
/// The head of `queue` is the job in service whenever `active_remaining` is
/// set. An idle station has an empty queue and no countdown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Station {
    queue: VecDeque<JobId>,
    active_remaining: Option<f64>,
}

impl Station {
    pub fn new() -> Station {
        Station::default()
    }

    pub fn is_idle(&self) -> bool {
        self.active_remaining.is_none()
    }

    pub fn active_remaining(&self) -> Option<f64> {
        self.active_remaining
    }

    /// Job currently in service.
    pub fn active_job(&self) -> Option<JobId> {
        self.active_remaining.and(self.queue.front().copied())
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Most recently queued job.
    pub fn last_queued(&self) -> Option<JobId> {
        self.queue.back().copied()
    }

    /// Append `job`. An idle station starts serving it straight away with a
    /// duration taken from `draw`, which is returned.
    pub fn enqueue(&mut self, job: JobId, draw: impl FnOnce() -> f64) -> Option<f64> {
        self.queue.push_back(job);
        if self.is_idle() {
            let duration = draw();
            self.active_remaining = Some(duration);
            Some(duration)
        } else {
            None
        }
    }

    /// Count down the job in service; true once it is due.
    pub fn tick(&mut self, delta: f64) -> bool {
        match self.active_remaining.as_mut() {
            Some(remaining) => des::elapse(remaining, delta),
            None => false,
        }
    }

    /// Remove the job in service. If more jobs are waiting, the new head
    /// starts with a duration from `draw`.
    pub fn finish_active(
        &mut self,
        draw: impl FnOnce() -> f64,
    ) -> Result<Finished, SimError> {
        if self.active_remaining.is_none() {
            return Err(SimError::IdleFinish);
        }
        let job = self.queue.pop_front().ok_or(SimError::IdleFinish)?;

        let next = match self.queue.front() {
            Some(&head) => {
                let duration = draw();
                self.active_remaining = Some(duration);
                Some((head, duration))
            }
            None => {
                self.active_remaining = None;
                None
            }
        };

        Ok(Finished { job, next })
    }
}

/// Result of [`Station::finish_active`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Finished {
    pub job: JobId,
    /// Job that moved into service, with its drawn duration
    pub next: Option<(JobId, f64)>,
}

/// The shared resource every arriving job passes through before it is split.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preprocessor {
    station: Station,
}

impl Preprocessor {
    pub fn new() -> Preprocessor {
        Preprocessor::default()
    }

    pub fn enqueue<V: VariateSource>(
        &mut self,
        job: JobId,
        source: &mut V,
        fan_out: usize,
    ) -> Option<f64> {
        self.station
            .enqueue(job, || source.preprocessing_time(fan_out))
    }

    pub fn tick(&mut self, delta: f64) -> bool {
        self.station.tick(delta)
    }

    pub fn finish_active<V: VariateSource>(
        &mut self,
        source: &mut V,
        fan_out: usize,
    ) -> Result<Finished, SimError> {
        self.station
            .finish_active(|| source.preprocessing_time(fan_out))
    }

    pub fn station(&self) -> &Station {
        &self.station
    }
}

/// `m` independent single-server stations.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerPool {
    servers: Vec<Station>,
}

impl ServerPool {
    pub fn new(servers: usize) -> ServerPool {
        ServerPool {
            servers: vec![Station::new(); servers],
        }
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn server(&self, index: usize) -> Option<&Station> {
        self.servers.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.servers.iter()
    }

    /// Queue a sub-task of `job` on server `index`. Returns the drawn
    /// duration if the server was idle and started on it.
    pub fn assign<V: VariateSource>(
        &mut self,
        job: JobId,
        index: usize,
        source: &mut V,
        fan_out: usize,
    ) -> Result<Option<f64>, SimError> {
        let server = self
            .servers
            .get_mut(index)
            .ok_or(SimError::UnknownServer(index))?;
        // Jobs reach a server in increasing id order, so a repeat can only
        // be at the tail
        if server.last_queued() == Some(job) {
            return Err(SimError::DuplicateAssignment { job, server: index });
        }
        Ok(server.enqueue(job, || source.subtask_time(fan_out)))
    }

    /// Count every busy server down by `delta`.
    pub fn tick(&mut self, delta: f64) {
        for server in &mut self.servers {
            server.tick(delta);
        }
    }

    /// Count server `index` down by `delta`; true if its sub-task is due.
    /// Unknown servers are never due.
    pub fn tick_server(&mut self, index: usize, delta: f64) -> bool {
        self.servers
            .get_mut(index)
            .is_some_and(|server| server.tick(delta))
    }

    pub fn finish<V: VariateSource>(
        &mut self,
        index: usize,
        source: &mut V,
        fan_out: usize,
    ) -> Result<Finished, SimError> {
        self.servers
            .get_mut(index)
            .ok_or(SimError::UnknownServer(index))?
            .finish_active(|| source.subtask_time(fan_out))
    }

    /// Remaining times of every busy server.
    pub fn active_remaining(&self) -> impl Iterator<Item = f64> + '_ {
        self.servers.iter().filter_map(Station::active_remaining)
    }
}
