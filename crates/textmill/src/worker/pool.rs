use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info};
use serde::Serialize;

use crate::error::WorkerError;
use crate::worker::runner::{JobOutcome, TaskRunner};

/// Outcome of one submitted job id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub job_id: String,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

/// Fixed set of OS threads feeding job ids to a shared [`TaskRunner`].
pub struct WorkerPool {
    job_sender: Sender<String>,
    result_receiver: Receiver<JobReport>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(runner: Arc<TaskRunner>, worker_count: usize) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (job_sender, job_receiver) = bounded::<String>(worker_count * 2);
        let (result_sender, result_receiver) = bounded::<JobReport>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_runner = Arc::clone(&runner);

            let handle = thread::Builder::new()
                .name(format!("textmill-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(worker_id, job_rx, result_tx, shutdown_flag, worker_runner);
                });

            match handle {
                Ok(handle) => workers.push(handle),
                Err(e) => error!("Failed to spawn worker {}: {}", worker_id, e),
            }
        }

        info!("Started {} workers", workers.len());

        Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
        }
    }

    /// Enqueues `job_id`; blocks while the queue is full.
    pub fn submit(&self, job_id: impl Into<String>) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender
            .send(job_id.into())
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn try_recv_result(&self) -> Option<JobReport> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<JobReport> {
        self.result_receiver.recv().ok()
    }

    /// Stops workers from taking new jobs. A job already running finishes.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.job_sender);
        drop(self.result_receiver);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// A handle that can request shutdown from another thread.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<String>,
    result_sender: Sender<JobReport>,
    shutdown: Arc<AtomicBool>,
    runner: Arc<TaskRunner>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(job_id) => {
                debug!("Worker {} processing job {}", worker_id, job_id);

                let outcome = runner.run(&job_id);
                let report = JobReport { job_id, outcome };

                if let Err(e) = result_sender.send(report) {
                    debug!("Worker {} dropped result: {}", worker_id, e);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{job_repo, Database};
    use crate::job::{JobStatus, ProcessingJob};
    use crate::processor::ProcessorRegistry;
    use crate::service::ProcessingService;
    use crate::storage::{BlobStore, FileStorage};
    use crate::worker::RetryPolicy;
    use tempfile::TempDir;

    fn create_runner(temp_dir: &TempDir) -> (Arc<TaskRunner>, Arc<FileStorage>) {
        let storage = Arc::new(FileStorage::new(temp_dir.path()));
        let db = Database::open_in_memory().unwrap();
        let service = ProcessingService::new(
            db,
            storage.clone(),
            Arc::new(ProcessorRegistry::with_builtin()),
        );
        (
            Arc::new(TaskRunner::new(service, RetryPolicy::none())),
            storage,
        )
    }

    #[test]
    fn test_worker_pool_creation() {
        let temp_dir = TempDir::new().unwrap();
        let (runner, _) = create_runner(&temp_dir);
        let pool = WorkerPool::new(runner, 2);

        assert!(!pool.is_shutdown());

        pool.shutdown();
        assert!(pool.is_shutdown());
        assert!(matches!(pool.submit("late"), Err(WorkerError::ChannelClosed)));

        pool.wait();
    }

    #[test]
    fn test_submit_and_process_text_job() {
        let temp_dir = TempDir::new().unwrap();
        let (runner, storage) = create_runner(&temp_dir);
        let pool = WorkerPool::new(Arc::clone(&runner), 2);

        let location = storage.store_upload("test.txt", b"Hello, World!\n").unwrap();
        let job = ProcessingJob::new(location);
        job_repo::insert(runner.service().database(), &job).unwrap();

        pool.submit(job.id.clone()).unwrap();

        let report = pool.recv_result().unwrap();
        assert_eq!(report.job_id, job.id);
        assert!(report.outcome.is_done(), "Job failed: {:?}", report.outcome);

        let stored = job_repo::find_by_id(runner.service().database(), &job.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, JobStatus::Done);

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_many_jobs_each_reported_once() {
        let temp_dir = TempDir::new().unwrap();
        let (runner, storage) = create_runner(&temp_dir);
        let pool = WorkerPool::new(Arc::clone(&runner), 3);

        let mut ids = Vec::new();
        for i in 0..10 {
            let location = storage
                .store_upload(&format!("doc{}.txt", i), b"some words here\n")
                .unwrap();
            let job = ProcessingJob::new(location);
            job_repo::insert(runner.service().database(), &job).unwrap();
            ids.push(job.id);
        }

        let mut reported = Vec::new();
        for id in &ids {
            pool.submit(id.clone()).unwrap();
            while let Some(report) = pool.try_recv_result() {
                reported.push(report.job_id);
            }
        }
        while reported.len() < ids.len() {
            reported.push(pool.recv_result().unwrap().job_id);
        }

        reported.sort();
        ids.sort();
        assert_eq!(reported, ids);
        assert_eq!(
            job_repo::count_by_status(runner.service().database(), JobStatus::Done).unwrap(),
            10
        );

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_missing_job_reported() {
        let temp_dir = TempDir::new().unwrap();
        let (runner, _) = create_runner(&temp_dir);
        let pool = WorkerPool::new(runner, 1);

        pool.submit("ghost").unwrap();
        let report = pool.recv_result().unwrap();
        assert_eq!(report.outcome, JobOutcome::Missing);

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_report_serializes_flat() {
        let report = JobReport {
            job_id: "j1".to_string(),
            outcome: JobOutcome::AlreadyDone,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["job_id"], "j1");
        assert_eq!(value["outcome"], "already_done");
    }
}
