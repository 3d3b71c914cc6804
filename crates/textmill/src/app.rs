//! Entry points used by uploaders, pollers and the queue.

use std::path::PathBuf;
use std::sync::Arc;

use log::info;

use crate::config::Config;
use crate::db::{default_database_path, job_repo, Database, DatabaseError};
use crate::error::{Result, TextmillError, ValidationError};
use crate::job::{JobFilter, JobStatus, ProcessingJob};
use crate::processor::ProcessorRegistry;
use crate::service::ProcessingService;
use crate::storage::{BlobStore, FileStorage};
use crate::worker::{JobOutcome, RetryPolicy, TaskRunner, WorkerPool};

/// Checks an upload's file name against the registered extensions.
pub fn validate_upload(
    filename: &str,
    registry: &ProcessorRegistry,
) -> std::result::Result<(), ValidationError> {
    let name = filename.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingName);
    }

    let lowered = name.to_lowercase();
    let supported = registry.supported_extensions();
    if supported.iter().any(|ext| lowered.ends_with(ext.as_str())) {
        Ok(())
    } else {
        Err(ValidationError::InvalidFormat {
            allowed: supported.into_iter().collect(),
        })
    }
}

/// A wired-up pipeline: record store, blob store, registry and runner.
pub struct Textmill {
    db: Database,
    storage: Arc<dyn BlobStore>,
    registry: Arc<ProcessorRegistry>,
    runner: Arc<TaskRunner>,
    worker_count: usize,
}

impl Textmill {
    /// Opens the database and storage named by `config`.
    pub fn new(config: &Config) -> Result<Self> {
        let db_path = resolve_database_path(config)?;
        let db = Database::open(&db_path)?;
        let storage = Arc::new(FileStorage::new(&config.storage_root));
        info!(
            "Using storage root {} and database {}",
            config.storage_root.display(),
            db_path.display()
        );

        Ok(Self::from_parts(
            db,
            storage,
            ProcessorRegistry::shared(),
            RetryPolicy::from_config(&config.retry),
            config.worker_count,
        ))
    }

    /// Assembles an instance from existing parts.
    pub fn from_parts(
        db: Database,
        storage: Arc<dyn BlobStore>,
        registry: Arc<ProcessorRegistry>,
        policy: RetryPolicy,
        worker_count: usize,
    ) -> Self {
        Self::with_runner(
            db.clone(),
            Arc::clone(&storage),
            Arc::clone(&registry),
            TaskRunner::new(ProcessingService::new(db, storage, registry), policy),
            worker_count,
        )
    }

    /// Like [`from_parts`](Self::from_parts) with a prepared runner.
    pub fn with_runner(
        db: Database,
        storage: Arc<dyn BlobStore>,
        registry: Arc<ProcessorRegistry>,
        runner: TaskRunner,
        worker_count: usize,
    ) -> Self {
        Self {
            db,
            storage,
            registry,
            runner: Arc::new(runner),
            worker_count: worker_count.max(1),
        }
    }

    pub fn registry(&self) -> &Arc<ProcessorRegistry> {
        &self.registry
    }

    pub fn storage(&self) -> &Arc<dyn BlobStore> {
        &self.storage
    }

    pub fn runner(&self) -> &Arc<TaskRunner> {
        &self.runner
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Records a new `pending` job for an already stored input.
    pub fn create_job(&self, original_location: &str) -> Result<String> {
        let job = ProcessingJob::new(original_location);
        job_repo::insert(&self.db, &job)?;
        info!("Created job {} for {}", job.id, job.original_name());
        Ok(job.id)
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<ProcessingJob>> {
        Ok(job_repo::find_by_id(&self.db, job_id)?)
    }

    /// Validates and stores an upload, then creates its job.
    pub fn upload(&self, filename: &str, content: &[u8]) -> Result<String> {
        validate_upload(filename, &self.registry)?;
        let location = self.storage.store_upload(filename, content)?;
        self.create_job(&location)
    }

    pub fn validate_upload(&self, filename: &str) -> std::result::Result<(), ValidationError> {
        validate_upload(filename, &self.registry)
    }

    /// Jobs matching `filter`, newest first, and the total match count.
    pub fn list_jobs(&self, filter: &JobFilter) -> Result<(Vec<ProcessingJob>, u64)> {
        Ok(job_repo::query(&self.db, filter)?)
    }

    pub fn count_by_status(&self, status: JobStatus) -> Result<u64> {
        Ok(job_repo::count_by_status(&self.db, status)?)
    }

    /// Runs a job on the calling thread, retries included.
    pub fn process_now(&self, job_id: &str) -> JobOutcome {
        self.runner.run(job_id)
    }

    /// Starts a worker pool that runs submitted job ids in the background.
    pub fn start_pool(&self) -> WorkerPool {
        WorkerPool::new(Arc::clone(&self.runner), self.worker_count)
    }
}

fn resolve_database_path(config: &Config) -> Result<PathBuf> {
    config
        .database_path
        .clone()
        .or_else(default_database_path)
        .ok_or_else(|| {
            TextmillError::Database(DatabaseError::Io {
                path: PathBuf::from("~/.textmill/data/textmill.db"),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "home directory not found; set database_path",
                ),
            })
        })
}
