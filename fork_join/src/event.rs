use std::fmt;

use serde::Serialize;

use crate::JobId;

/// Countdown that can fire. Simultaneous events fire in declaration order:
/// arrival, then preprocessor, then servers by ascending index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Arrival,
    PreprocessorDone,
    ServerDone(usize),
}

/// Something that happened during a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LogEntry {
    /// Preprocessor was idle, so service began with a draw of `requiring`
    Arrived { job: JobId, requiring: f64 },
    /// Preprocessor was busy with `ahead` jobs in front of this one
    Queued { job: JobId, ahead: usize },
    PreprocessorStarted { job: JobId, requiring: f64 },
    Split { job: JobId, servers: Vec<usize> },
    SubtaskStarted { server: usize, job: JobId, requiring: f64 },
    SubtaskFinished { server: usize, job: JobId },
    Completed { job: JobId, response_time: f64 },
}

impl LogEntry {
    pub fn job(&self) -> JobId {
        match self {
            LogEntry::Arrived { job, .. }
            | LogEntry::Queued { job, .. }
            | LogEntry::PreprocessorStarted { job, .. }
            | LogEntry::Split { job, .. }
            | LogEntry::SubtaskStarted { job, .. }
            | LogEntry::SubtaskFinished { job, .. }
            | LogEntry::Completed { job, .. } => *job,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEntry::Arrived { job, requiring } => {
                write!(f, "Job {job} arrived, requiring {requiring:.6} time")
            }
            LogEntry::Queued { job, ahead } => {
                write!(f, "Job {job} arrived, waiting behind {ahead} jobs")
            }
            LogEntry::PreprocessorStarted { job, requiring } => {
                write!(f, "Preprocessor started job {job}, requiring {requiring:.6} time")
            }
            LogEntry::Split { job, servers } => {
                write!(f, "Job {job} split to servers {servers:?}")
            }
            LogEntry::SubtaskStarted {
                server,
                job,
                requiring,
            } => write!(
                f,
                "Server {server} started subtask on job {job}, requiring {requiring:.6} time"
            ),
            LogEntry::SubtaskFinished { server, job } => {
                write!(f, "Server {server} finished subtask on job {job}")
            }
            LogEntry::Completed { job, response_time } => {
                write!(f, "Job {job} completed after {response_time:.6} time")
            }
        }
    }
}

/// A log entry stamped with the virtual time it happened at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub time: f64,
    pub entry: LogEntry,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6} - {}", self.time, self.entry)
    }
}
