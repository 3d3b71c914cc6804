pub mod registry;
pub mod tabular;
pub mod text;

use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::ProcessError;

pub use registry::ProcessorRegistry;
pub use tabular::CsvProcessor;
pub use text::TextProcessor;

/// A lowercase file extension including its leading dot, e.g. `.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Extension(String);

impl Extension {
    /// Validates and normalizes an extension.
    ///
    /// Accepts a `.` followed by at least one character; the remaining
    /// characters must not contain whitespace, path separators or further dots.
    pub fn new(raw: &str) -> Result<Self, ProcessError> {
        let rest = raw
            .strip_prefix('.')
            .filter(|rest| !rest.is_empty())
            .ok_or_else(|| ProcessError::InvalidExtension(raw.to_string()))?;

        if rest
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '.' | '/' | '\\'))
        {
            return Err(ProcessError::InvalidExtension(raw.to_string()));
        }

        Ok(Self(raw.to_lowercase()))
    }

    /// Extracts the extension from the file name of a location.
    pub fn from_location(location: &str) -> Option<Self> {
        Path::new(location)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(|e| Self::new(&format!(".{}", e)).ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A format-specific transformation bound to one file extension.
///
/// Implementations stream `input` to `output` without buffering the whole
/// file. On error the output may be partially written and must be discarded
/// by the caller.
pub trait FileProcessor: Send + Sync {
    fn extension(&self) -> &Extension;
    fn process(&self, input: &mut dyn Read, output: &mut dyn Write) -> Result<(), ProcessError>;
}
