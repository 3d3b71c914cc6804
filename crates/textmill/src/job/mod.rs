pub mod record;
pub mod status;

pub use record::{truncate_error, JobFilter, ProcessingJob, MAX_ERROR_MESSAGE_CHARS};
pub use status::{JobStatus, TransitionMode};
