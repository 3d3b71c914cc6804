pub mod pool;
pub mod retry;
pub mod runner;

pub use pool::{JobReport, WorkerPool};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use runner::{JobOutcome, TaskRunner};

// Re-export crossbeam_channel for use in main
pub use crossbeam_channel;
