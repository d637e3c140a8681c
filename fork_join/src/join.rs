use std::collections::HashMap;

use thiserror::Error;

use crate::JobId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("job {0} was already split")]
    AlreadyOpen(JobId),
    #[error("job {0} split across zero servers")]
    ZeroFanOut(JobId),
    #[error("sub-task finished for job {0}, which has no outstanding sub-tasks")]
    NotOpen(JobId),
}

/// Outstanding sub-task counts of split jobs.
///
/// A job is present from the moment it is split until its last sub-task
/// finishes. Counts are never observably zero: the entry disappears in the
/// same call that takes it there.
#[derive(Debug, Clone, Default)]
pub struct JoinTable {
    outstanding: HashMap<JobId, usize>,
}

impl JoinTable {
    pub fn new() -> JoinTable {
        JoinTable::default()
    }

    pub fn open(&mut self, job: JobId, fan_out: usize) -> Result<(), JoinError> {
        if fan_out == 0 {
            return Err(JoinError::ZeroFanOut(job));
        }
        if self.outstanding.contains_key(&job) {
            return Err(JoinError::AlreadyOpen(job));
        }
        self.outstanding.insert(job, fan_out);
        Ok(())
    }

    /// Record one finished sub-task. Returns true when it was the job's last.
    pub fn complete_one(&mut self, job: JobId) -> Result<bool, JoinError> {
        let count = self
            .outstanding
            .get_mut(&job)
            .ok_or(JoinError::NotOpen(job))?;
        if *count > 1 {
            *count -= 1;
            Ok(false)
        } else {
            self.outstanding.remove(&job);
            Ok(true)
        }
    }

    pub fn outstanding(&self, job: JobId) -> Option<usize> {
        self.outstanding.get(&job).copied()
    }

    /// Number of split jobs still waiting on sub-tasks.
    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }
}
