use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use crate::error::StorageError;
use crate::processor::Extension;
use crate::storage::BlobStore;

const UPLOADS_DIR: &str = "uploads";
const RESULTS_DIR: &str = "results";
const WRITE_BUFFER_SIZE: usize = 16 * 1024;
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Local-disk blob store rooted at a single directory.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a location onto a path below the root.
    ///
    /// Only plain relative components are accepted, so a location can never
    /// escape the root.
    pub fn resolve(&self, location: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(location);
        let plain = !location.is_empty()
            && !location.contains('\\')
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(StorageError::InvalidLocation(location.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Creates the directory at `location` below the root if needed.
    ///
    /// Errors name the location, never the absolute path.
    fn ensure_directory(&self, location: &str) -> Result<PathBuf, StorageError> {
        let path = self.root.join(location);
        if !path.is_dir() {
            std::fs::create_dir_all(&path).map_err(|e| StorageError::CreateDirectory {
                location: location.to_string(),
                source: e,
            })?;
        }
        Ok(path)
    }

    /// Writes `content` under `uploads/`, numbering the name on collision.
    fn store_with_atomic_creation(
        &self,
        filename: &str,
        content: &[u8],
    ) -> Result<String, StorageError> {
        let dir_path = self.ensure_directory(UPLOADS_DIR)?;

        let (base, ext) = match filename.rfind('.') {
            Some(dot_pos) if dot_pos > 0 => (&filename[..dot_pos], &filename[dot_pos..]),
            _ => (filename, ""),
        };

        for counter in 1..=MAX_NAME_ATTEMPTS {
            let try_filename = if counter == 1 {
                filename.to_string()
            } else {
                format!("{}_{}{}", base, counter, ext)
            };
            let try_path = dir_path.join(&try_filename);
            let location = format!("{}/{}", UPLOADS_DIR, try_filename);

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&try_path)
            {
                Ok(mut file) => {
                    file.write_all(content)
                        .map_err(|e| StorageError::WriteFile {
                            location: location.clone(),
                            source: e,
                        })?;
                    return Ok(location);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::WriteFile {
                        location,
                        source: e,
                    });
                }
            }
        }

        Err(StorageError::FileExists(format!("{}/{}", UPLOADS_DIR, filename)))
    }
}

impl BlobStore for FileStorage {
    fn open_read(&self, location: &str) -> Result<Box<dyn Read + Send>, StorageError> {
        let path = self.resolve(location)?;
        let file = File::open(&path).map_err(|e| StorageError::OpenRead {
            location: location.to_string(),
            source: e,
        })?;
        Ok(Box::new(file))
    }

    fn create_write(&self, location: &str) -> Result<Box<dyn Write + Send>, StorageError> {
        let path = self.resolve(location)?;
        let parent = Path::new(location)
            .parent()
            .and_then(|p| p.to_str())
            .unwrap_or_default();
        self.ensure_directory(parent)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| StorageError::CreateFile {
                location: location.to_string(),
                source: e,
            })?;
        Ok(Box::new(BufWriter::with_capacity(WRITE_BUFFER_SIZE, file)))
    }

    fn generate_result_location(&self, job_id: &str, extension: &Extension) -> String {
        format!(
            "{}/result_{}_{}{}",
            RESULTS_DIR,
            job_id,
            Uuid::new_v4(),
            extension.as_str()
        )
    }

    fn discard(&self, location: &str) -> Result<(), StorageError> {
        let path = self.resolve(location)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Remove {
                location: location.to_string(),
                source: e,
            }),
        }
    }

    fn store_upload(&self, name: &str, content: &[u8]) -> Result<String, StorageError> {
        let filename = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.contains('\\'))
            .ok_or_else(|| StorageError::InvalidLocation(name.to_string()))?;
        self.store_with_atomic_creation(filename, content)
    }
}
