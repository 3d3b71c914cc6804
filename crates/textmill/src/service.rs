//! Runs one job through its processor and records the outcome.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn};

use crate::db::job_repo::{self, Transition};
use crate::db::Database;
use crate::error::{ProcessError, ServiceError};
use crate::job::{JobStatus, ProcessingJob, TransitionMode};
use crate::processor::{Extension, FileProcessor, ProcessorRegistry};
use crate::sanitize;
use crate::storage::BlobStore;

pub struct ProcessingService {
    db: Database,
    storage: Arc<dyn BlobStore>,
    registry: Arc<ProcessorRegistry>,
}

impl ProcessingService {
    pub fn new(db: Database, storage: Arc<dyn BlobStore>, registry: Arc<ProcessorRegistry>) -> Self {
        Self {
            db,
            storage,
            registry,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn registry(&self) -> &Arc<ProcessorRegistry> {
        &self.registry
    }

    /// Processes `job`, which must still be `pending`.
    pub fn run(&self, job: &ProcessingJob) -> Result<ProcessingJob, ServiceError> {
        self.run_with(job, TransitionMode::Normal)
    }

    /// Processes `job` and returns the `done` record.
    ///
    /// Failures of the processor or of the blob store are written to the
    /// record as `failed` before being returned. Database failures are
    /// returned as-is; the record then keeps its last persisted status.
    pub fn run_with(
        &self,
        job: &ProcessingJob,
        mode: TransitionMode,
    ) -> Result<ProcessingJob, ServiceError> {
        let filename = sanitize::redact_path(Path::new(&job.original_location));
        let _job_span = info_span!("job", job_id = %job.id, filename = %filename).entered();

        // Step 1: Resolve processor
        let (extension, processor) = {
            let _step = info_span!("resolve_processor").entered();
            match self.step_resolve(job) {
                Ok(resolved) => resolved,
                Err(e) => return Err(self.fail(job, e, mode)),
            }
        };

        // Step 2: Enter processing
        {
            let _step = info_span!("start").entered();
            self.step_start(job, mode)?;
        }

        // Step 3: Transform
        let result_location = {
            let _step = info_span!("transform", extension = %extension).entered();
            let location = self.storage.generate_result_location(&job.id, &extension);
            if let Err(e) = self.step_transform(job, processor.as_ref(), &location) {
                self.discard_partial(&location);
                return Err(self.fail(job, e, TransitionMode::Normal));
            }
            location
        };

        // Step 4: Record result
        let _step = info_span!("complete").entered();
        let done = job_repo::transition(
            &self.db,
            &job.id,
            Transition::Complete {
                result_location: &result_location,
            },
            TransitionMode::Normal,
        )?
        .ok_or_else(|| self.illegal_transition(&job.id, job.status, JobStatus::Done))?;

        info!("Job finished, result at {}", result_location);
        Ok(done)
    }

    /// Marks `job_id` as failed with `message` unless it is already `done`.
    ///
    /// Returns the updated record, or `None` when the job is missing or done.
    pub fn mark_failed(
        &self,
        job_id: &str,
        message: &str,
    ) -> Result<Option<ProcessingJob>, ServiceError> {
        Ok(job_repo::transition(
            &self.db,
            job_id,
            Transition::Fail {
                error_message: message,
            },
            TransitionMode::Redelivery,
        )?)
    }

    fn step_resolve(
        &self,
        job: &ProcessingJob,
    ) -> Result<(Extension, Arc<dyn FileProcessor>), ServiceError> {
        let extension = Extension::from_location(&job.original_location)
            .ok_or_else(|| ServiceError::MissingExtension(job.original_name().to_string()))?;
        let processor = self.registry.resolve(extension.as_str())?;
        debug!("Resolved processor for {}", extension);
        Ok((extension, processor))
    }

    fn step_start(&self, job: &ProcessingJob, mode: TransitionMode) -> Result<(), ServiceError> {
        let started = job_repo::transition(&self.db, &job.id, Transition::Start, mode)?;
        match started {
            Some(started) => {
                debug!("Job entered processing (attempt {})", started.attempts);
                Ok(())
            }
            None => Err(self.illegal_transition(&job.id, job.status, JobStatus::Processing)),
        }
    }

    fn step_transform(
        &self,
        job: &ProcessingJob,
        processor: &dyn FileProcessor,
        result_location: &str,
    ) -> Result<(), ServiceError> {
        let mut input = self.storage.open_read(&job.original_location)?;
        let mut output = self.storage.create_write(result_location)?;
        processor.process(&mut input, &mut output)?;
        output.flush().map_err(ProcessError::Io)?;
        Ok(())
    }

    /// Persists `err` as the job's failure and hands it back to the caller.
    fn fail(&self, job: &ProcessingJob, err: ServiceError, mode: TransitionMode) -> ServiceError {
        let message = err.to_string();
        warn!("Job failed: {}", message);

        match job_repo::transition(
            &self.db,
            &job.id,
            Transition::Fail {
                error_message: &message,
            },
            mode,
        ) {
            Ok(Some(_)) => {}
            Ok(None) => warn!("Job {} could not be marked failed from its current status", job.id),
            Err(db_err) => error!("Failed to record failure of job {}: {}", job.id, db_err),
        }
        err
    }

    fn discard_partial(&self, location: &str) {
        if let Err(e) = self.storage.discard(location) {
            warn!("Failed to discard partial output {}: {}", location, e);
        }
    }

    /// Builds the error for a transition the record refused, reporting the
    /// status actually stored.
    fn illegal_transition(&self, job_id: &str, expected: JobStatus, to: JobStatus) -> ServiceError {
        let from = job_repo::find_by_id(&self.db, job_id)
            .ok()
            .flatten()
            .map(|current| current.status)
            .unwrap_or(expected);
        ServiceError::IllegalTransition {
            job_id: job_id.to_string(),
            from,
            to,
        }
    }
}
