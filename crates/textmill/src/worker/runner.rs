//! At-least-once execution of a job by id, with retries.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::{error, info, warn};
use serde::Serialize;

use crate::db::job_repo;
use crate::error::ServiceError;
use crate::job::{truncate_error, JobStatus, ProcessingJob, TransitionMode};
use crate::service::ProcessingService;
use crate::worker::retry::{RetryPolicy, Sleeper, ThreadSleeper};

/// Error text stored when an attempt panics.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal error";

/// Final disposition of one [`TaskRunner::run`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Done {
        result_location: String,
        attempts: u32,
    },
    Failed {
        error: String,
        attempts: u32,
    },
    /// No job with this id exists.
    Missing,
    /// The job was already `done`; nothing was reprocessed.
    AlreadyDone,
}

impl JobOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, JobOutcome::Done { .. } | JobOutcome::AlreadyDone)
    }
}

enum Attempt {
    Done(ProcessingJob),
    Missing,
    AlreadyDone,
}

pub struct TaskRunner {
    service: ProcessingService,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl TaskRunner {
    pub fn new(service: ProcessingService, policy: RetryPolicy) -> Self {
        Self::with_sleeper(service, policy, Arc::new(ThreadSleeper))
    }

    pub fn with_sleeper(
        service: ProcessingService,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            service,
            policy,
            sleeper,
        }
    }

    pub fn service(&self) -> &ProcessingService {
        &self.service
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs job `job_id` to a terminal outcome.
    ///
    /// Transient failures are retried with backoff up to the policy's limit.
    /// Every failure, including a panic inside a processor, ends with the
    /// job persisted as `failed`; nothing is propagated to the caller.
    pub fn run(&self, job_id: &str) -> JobOutcome {
        let mut retry = 0;
        loop {
            let attempt = panic::catch_unwind(AssertUnwindSafe(|| self.attempt(job_id, retry > 0)));

            let err = match attempt {
                Ok(Ok(Attempt::Done(job))) => {
                    return JobOutcome::Done {
                        result_location: job.result_location.unwrap_or_default(),
                        attempts: job.attempts,
                    };
                }
                Ok(Ok(Attempt::Missing)) => {
                    warn!("Job {} not found, skipping", job_id);
                    return JobOutcome::Missing;
                }
                Ok(Ok(Attempt::AlreadyDone)) => {
                    info!("Job {} is already done, skipping", job_id);
                    return JobOutcome::AlreadyDone;
                }
                Ok(Err(e)) => e,
                Err(payload) => {
                    error!("Job {} panicked: {}", job_id, panic_message(payload.as_ref()));
                    return self.give_up(job_id, INTERNAL_ERROR_MESSAGE);
                }
            };

            if err.is_transient() && retry < self.policy.max_retries {
                retry += 1;
                let delay = self.policy.delay_for(retry);
                warn!(
                    "Job {} failed transiently ({}); retry {}/{} in {:?}",
                    job_id, err, retry, self.policy.max_retries, delay
                );
                self.sleeper.sleep(delay);
                continue;
            }

            error!("Job {} failed: {}", job_id, err);
            return self.give_up(job_id, &err.to_string());
        }
    }

    fn attempt(&self, job_id: &str, redelivered: bool) -> Result<Attempt, ServiceError> {
        let Some(job) = job_repo::find_by_id(self.service.database(), job_id)? else {
            return Ok(Attempt::Missing);
        };
        if job.status == JobStatus::Done {
            return Ok(Attempt::AlreadyDone);
        }

        let mode = if redelivered || job.status != JobStatus::Pending {
            TransitionMode::Redelivery
        } else {
            TransitionMode::Normal
        };
        self.service.run_with(&job, mode).map(Attempt::Done)
    }

    /// Records `message` as the job's final error and reports it.
    ///
    /// The write is repeated even when the service already stored the same
    /// failure, so a job still `failed` from an earlier delivery never keeps
    /// that delivery's error.
    fn give_up(&self, job_id: &str, message: &str) -> JobOutcome {
        match self.service.mark_failed(job_id, message) {
            Ok(Some(job)) => {
                return JobOutcome::Failed {
                    error: job.error_message.unwrap_or_else(|| truncate_error(message)),
                    attempts: job.attempts,
                };
            }
            Ok(None) => {}
            Err(e) => error!("Failed to mark job {} as failed: {}", job_id, e),
        }

        match job_repo::find_by_id(self.service.database(), job_id) {
            Ok(Some(job)) if job.status == JobStatus::Done => JobOutcome::AlreadyDone,
            Ok(None) => JobOutcome::Missing,
            Ok(Some(job)) => JobOutcome::Failed {
                error: truncate_error(message),
                attempts: job.attempts,
            },
            Err(_) => JobOutcome::Failed {
                error: truncate_error(message),
                attempts: 0,
            },
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
