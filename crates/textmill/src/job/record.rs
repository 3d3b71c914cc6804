use chrono::{DateTime, Utc};
use serde::Serialize;

use super::status::JobStatus;

/// Upper bound on a stored error message, in characters.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// The durable record of one file transformation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingJob {
    pub id: String,
    /// Blob-store location of the uploaded input.
    pub original_location: String,
    /// Blob-store location of the output; set once the job is done.
    pub result_location: Option<String>,
    pub status: JobStatus,
    /// Present only while the job is failed.
    pub error_message: Option<String>,
    /// Number of times the job entered `processing`.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingJob {
    /// A fresh `pending` job with a random id.
    pub fn new(original_location: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            original_location: original_location.into(),
            result_location: None,
            status: JobStatus::Pending,
            error_message: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// File name component of the original location.
    pub fn original_name(&self) -> &str {
        self.original_location
            .rsplit('/')
            .next()
            .unwrap_or(&self.original_location)
    }
}

/// Cuts `message` down to [`MAX_ERROR_MESSAGE_CHARS`] characters.
pub fn truncate_error(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_MESSAGE_CHARS) {
        Some((byte_index, _)) => message[..byte_index].to_string(),
        None => message.to_string(),
    }
}

/// Query filter for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}
