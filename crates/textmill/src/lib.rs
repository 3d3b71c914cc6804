pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod job;
pub mod logging;
pub mod processor;
pub mod sanitize;
pub mod service;
pub mod storage;
pub mod transform;
pub mod worker;

pub use app::{validate_upload, Textmill};
pub use config::{load_config, Config};
pub use error::{
    ConfigError, FailureKind, ProcessError, Result, ServiceError, StorageError, TextmillError,
    ValidationError, WorkerError,
};
pub use job::{JobFilter, JobStatus, ProcessingJob};
pub use processor::{FileProcessor, ProcessorRegistry};
pub use service::ProcessingService;
pub use worker::{JobOutcome, RetryPolicy, TaskRunner, WorkerPool};
