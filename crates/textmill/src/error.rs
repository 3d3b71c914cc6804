use std::path::PathBuf;
use thiserror::Error;

use crate::job::JobStatus;

#[derive(Error, Debug)]
pub enum TextmillError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Service(#[from] ServiceError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Failed to read input '{path}': {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Failures raised by a [`FileProcessor`](crate::processor::FileProcessor)
/// or while resolving one.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Unsupported file extension: '{0}'")]
    UnsupportedExtension(String),

    #[error("Invalid file extension {0:?}: expected a '.' followed by at least one character")]
    InvalidExtension(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input is not valid UTF-8 (line {line}): {message}")]
    Decode { line: u64, message: String },

    #[error("Malformed tabular data{}: {message}", .line.map(|l| format!(" (line {})", l)).unwrap_or_default())]
    Tabular { line: Option<u64>, message: String },
}

impl From<csv::Error> for ProcessError {
    fn from(err: csv::Error) -> Self {
        let message = err.to_string();
        let line = err.position().map(|p| p.line());
        match err.into_kind() {
            csv::ErrorKind::Io(source) => ProcessError::Io(source),
            csv::ErrorKind::Utf8 { pos, .. } => ProcessError::Decode {
                line: pos.map(|p| p.line()).or(line).unwrap_or(0),
                message,
            },
            _ => ProcessError::Tabular { line, message },
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{location}': {source}")]
    CreateDirectory {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open '{location}' for reading: {source}")]
    OpenRead {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create '{location}': {source}")]
    CreateFile {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{location}': {source}")]
    WriteFile {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{location}': {source}")]
    Remove {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid storage location '{0}'")]
    InvalidLocation(String),

    #[error("File already exists: {0}")]
    FileExists(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Failed to install signal handler: {0}")]
    SignalHandler(String),
}

/// Rejection of an upload before a job is created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid file format. Allowed: {}", .allowed.join(", "))]
    InvalidFormat { allowed: Vec<String> },

    #[error("Uploaded file has no name")]
    MissingName,
}

/// Whether retrying the same job may succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Terminal,
}

/// Failure of a single processing attempt, as seen by the task runner.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),

    #[error("Original file '{0}' has no extension")]
    MissingExtension(String),

    #[error("Job {job_id} cannot move from {from} to {to}")]
    IllegalTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },
}

impl ServiceError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ServiceError::Process(ProcessError::Io(e))
                if e.kind() != std::io::ErrorKind::InvalidData =>
            {
                FailureKind::Transient
            }
            ServiceError::Process(_) => FailureKind::Terminal,
            ServiceError::Storage(StorageError::InvalidLocation(_)) => FailureKind::Terminal,
            ServiceError::Storage(_) => FailureKind::Transient,
            ServiceError::Database(_) => FailureKind::Transient,
            ServiceError::MissingExtension(_) | ServiceError::IllegalTransition { .. } => {
                FailureKind::Terminal
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::Transient
    }
}

pub type Result<T> = std::result::Result<T, TextmillError>;
