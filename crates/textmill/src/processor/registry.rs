//! Extension-keyed table of file processors.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock, RwLock};

use log::{debug, info};

use crate::error::ProcessError;
use crate::processor::{CsvProcessor, Extension, FileProcessor, TextProcessor};

type ProcessorFactory = fn() -> Arc<dyn FileProcessor>;

fn text_processor() -> Arc<dyn FileProcessor> {
    Arc::new(TextProcessor::new())
}

fn csv_processor() -> Arc<dyn FileProcessor> {
    Arc::new(CsvProcessor::new())
}

/// Every processor shipped with the crate.
const BUILTIN_PROCESSORS: &[ProcessorFactory] = &[text_processor, csv_processor];

pub struct ProcessorRegistry {
    processors: RwLock<HashMap<Extension, Arc<dyn FileProcessor>>>,
}

impl ProcessorRegistry {
    /// An empty registry. Call [`discover`](Self::discover) before resolving.
    pub fn new() -> Self {
        Self {
            processors: RwLock::new(HashMap::new()),
        }
    }

    /// A registry populated with the built-in processors.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.discover();
        registry
    }

    /// The process-wide registry, discovered on first use.
    pub fn shared() -> Arc<ProcessorRegistry> {
        static SHARED: OnceLock<Arc<ProcessorRegistry>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(Self::with_builtin())))
    }

    /// Registers `processor` under `extension`, replacing any previous entry.
    pub fn register(
        &self,
        extension: &str,
        processor: Arc<dyn FileProcessor>,
    ) -> Result<(), ProcessError> {
        let extension = Extension::new(extension)?;
        debug!("Registering processor for {}", extension);
        self.write().insert(extension, processor);
        Ok(())
    }

    /// Registers `processor` under the extension it declares.
    pub fn register_processor(&self, processor: Arc<dyn FileProcessor>) {
        let extension = processor.extension().clone();
        debug!("Registering processor for {}", extension);
        self.write().insert(extension, processor);
    }

    /// Looks up the processor for `extension`, ignoring case.
    pub fn resolve(&self, extension: &str) -> Result<Arc<dyn FileProcessor>, ProcessError> {
        let key = Extension::new(extension)
            .map_err(|_| ProcessError::UnsupportedExtension(extension.to_string()))?;
        self.read()
            .get(&key)
            .cloned()
            .ok_or_else(|| ProcessError::UnsupportedExtension(key.to_string()))
    }

    /// Registers every built-in processor. Safe to call repeatedly.
    ///
    /// Returns the number of registered extensions afterwards.
    pub fn discover(&self) -> usize {
        for factory in BUILTIN_PROCESSORS {
            let processor = factory();
            let extension = processor.extension().clone();
            self.write().entry(extension).or_insert(processor);
        }
        let count = self.read().len();
        info!("Processor registry holds {} extension(s)", count);
        count
    }

    /// Extensions that currently resolve, sorted.
    pub fn supported_extensions(&self) -> BTreeSet<String> {
        self.read().keys().map(|e| e.to_string()).collect()
    }

    pub fn is_supported(&self, extension: &str) -> bool {
        self.resolve(extension).is_ok()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Extension, Arc<dyn FileProcessor>>> {
        // Entries are plain inserts; a poisoned lock still holds a consistent map.
        self.processors.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<Extension, Arc<dyn FileProcessor>>> {
        self.processors.write().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
