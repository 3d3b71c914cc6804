//! Blob storage for uploaded inputs and produced results.
//!
//! Jobs only ever carry opaque, `/`-separated locations; a [`BlobStore`]
//! maps them onto real bytes.

use std::io::{Read, Write};

use crate::error::StorageError;
use crate::processor::Extension;

pub mod filesystem;

pub use filesystem::FileStorage;

pub trait BlobStore: Send + Sync {
    /// Opens the blob at `location` for streaming reads.
    fn open_read(&self, location: &str) -> Result<Box<dyn Read + Send>, StorageError>;

    /// Creates a new blob at `location` and returns a buffered writer.
    ///
    /// The caller must flush the writer; dropping it unflushed may lose data.
    fn create_write(&self, location: &str) -> Result<Box<dyn Write + Send>, StorageError>;

    /// A fresh, unique location for the output of `job_id`.
    fn generate_result_location(&self, job_id: &str, extension: &Extension) -> String;

    /// Removes the blob at `location`. Missing blobs are not an error.
    fn discard(&self, location: &str) -> Result<(), StorageError>;

    /// Stores an uploaded file and returns its location.
    fn store_upload(&self, name: &str, content: &[u8]) -> Result<String, StorageError>;
}
