//! Test harness for isolated test execution.
//!
//! The `TestHarness` struct wires a complete pipeline for testing:
//! - A temporary storage root holding `uploads/` and `results/`
//! - An in-memory database
//! - A registry whose processors shuffle deterministically (reverse)
//! - A task runner whose backoff sleeps are recorded, not slept

#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use textmill::db::Database;
use textmill::error::ProcessError;
use textmill::job::ProcessingJob;
use textmill::processor::{CsvProcessor, Extension, FileProcessor, ProcessorRegistry, TextProcessor};
use textmill::service::ProcessingService;
use textmill::storage::{BlobStore, FileStorage};
use textmill::transform::ReverseShuffler;
use textmill::worker::{JobOutcome, RetryPolicy, Sleeper, TaskRunner};
use textmill::Textmill;

/// Records every requested delay instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// A processor that always fails with the given I/O error kind.
pub struct FailingProcessor {
    extension: Extension,
    kind: io::ErrorKind,
    pub calls: AtomicU32,
}

impl FailingProcessor {
    pub fn new(extension: &str, kind: io::ErrorKind) -> Self {
        Self {
            extension: Extension::new(extension).unwrap(),
            kind,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FileProcessor for FailingProcessor {
    fn extension(&self) -> &Extension {
        &self.extension
    }

    fn process(&self, _input: &mut dyn Read, output: &mut dyn Write) -> Result<(), ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        output.write_all(b"partial")?;
        Err(io::Error::new(self.kind, "simulated fault").into())
    }
}

/// Test harness providing an isolated pipeline for integration tests.
pub struct TestHarness {
    temp_dir: TempDir,
    pub storage: Arc<FileStorage>,
    pub registry: Arc<ProcessorRegistry>,
    pub sleeper: Arc<RecordingSleeper>,
    pub app: Textmill,
}

impl TestHarness {
    /// A harness with the default retry policy (3 retries, 10s, x2).
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage = Arc::new(FileStorage::new(temp_dir.path()));
        let db = Database::open_in_memory().expect("Failed to open database");

        let registry = Arc::new(ProcessorRegistry::new());
        registry.register_processor(Arc::new(TextProcessor::with_shuffler(Arc::new(
            ReverseShuffler,
        ))));
        registry.register_processor(Arc::new(CsvProcessor::with_shuffler(Arc::new(
            ReverseShuffler,
        ))));
        registry.discover();

        let sleeper = Arc::new(RecordingSleeper::default());
        let service = ProcessingService::new(db.clone(), storage.clone(), Arc::clone(&registry));
        let runner = TaskRunner::with_sleeper(service, policy, sleeper.clone());
        let app = Textmill::with_runner(db, storage.clone(), Arc::clone(&registry), runner, 2);

        Self {
            temp_dir,
            storage,
            registry,
            sleeper,
            app,
        }
    }

    pub fn root(&self) -> &std::path::Path {
        self.temp_dir.path()
    }

    /// Uploads `content` as `filename` and returns the new job id.
    pub fn upload(&self, filename: &str, content: &str) -> String {
        self.app
            .upload(filename, content.as_bytes())
            .expect("Failed to upload")
    }

    /// Runs a job to completion on the current thread.
    pub fn run(&self, job_id: &str) -> JobOutcome {
        self.app.process_now(job_id)
    }

    pub fn job(&self, job_id: &str) -> ProcessingJob {
        self.app
            .get_job(job_id)
            .expect("Failed to query job")
            .expect("Job not found")
    }

    /// Reads the output of a `done` job.
    pub fn read_result(&self, job_id: &str) -> String {
        let job = self.job(job_id);
        let location = job.result_location.expect("Job has no result");
        let mut text = String::new();
        self.storage
            .open_read(&location)
            .expect("Failed to open result")
            .read_to_string(&mut text)
            .expect("Failed to read result");
        text
    }

    /// Number of files currently under `results/`.
    pub fn result_file_count(&self) -> usize {
        std::fs::read_dir(self.root().join("results"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}
