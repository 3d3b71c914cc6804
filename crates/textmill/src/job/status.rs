//! Job lifecycle: `pending -> processing -> {done | failed}`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

/// How strictly a transition is checked.
///
/// `Redelivery` covers a queue handing the same job out again: a failed job
/// may be reprocessed, and a job stuck in `processing` by a lost attempt may
/// be restarted or failed again. `done` is final in both modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionMode {
    Normal,
    Redelivery,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Done,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus, mode: TransitionMode) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Processing) | (Processing, Done) | (Processing, Failed) => true,
            // A job rejected before processing (unsupported format).
            (Pending, Failed) => true,
            (Failed, Processing) | (Processing, Processing) | (Failed, Failed) => {
                mode == TransitionMode::Redelivery
            }
            _ => false,
        }
    }

    /// Every status from which `next` is reachable under `mode`.
    pub fn sources(next: JobStatus, mode: TransitionMode) -> Vec<JobStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(next, mode))
            .collect()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}
