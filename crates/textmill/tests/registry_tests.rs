//! Processor registry behavior as seen from outside the crate.

use std::io::{Read, Write};
use std::sync::Arc;

use serial_test::serial;
use textmill::error::ProcessError;
use textmill::processor::{Extension, FileProcessor, ProcessorRegistry};
use textmill::validate_upload;

struct EchoProcessor(Extension);

impl FileProcessor for EchoProcessor {
    fn extension(&self) -> &Extension {
        &self.0
    }

    fn process(&self, input: &mut dyn Read, output: &mut dyn Write) -> Result<(), ProcessError> {
        std::io::copy(input, output)?;
        Ok(())
    }
}

#[test]
fn test_discover_then_resolve() {
    let registry = ProcessorRegistry::new();
    registry.discover();

    assert!(registry.resolve(".txt").is_ok());
    assert!(registry.resolve(".csv").is_ok());
    match registry.resolve(".pdf") {
        Err(ProcessError::UnsupportedExtension(ext)) => assert_eq!(ext, ".pdf"),
        Err(other) => panic!("Expected UnsupportedExtension, got {:?}", other),
        Ok(_) => panic!("Expected UnsupportedExtension, got a processor"),
    }
}

#[test]
fn test_registered_extension_becomes_uploadable() {
    let registry = ProcessorRegistry::with_builtin();
    assert!(validate_upload("README.md", &registry).is_err());

    registry.register_processor(Arc::new(EchoProcessor(Extension::new(".md").unwrap())));

    assert!(validate_upload("README.md", &registry).is_ok());
    let extensions: Vec<String> = registry.supported_extensions().into_iter().collect();
    assert_eq!(extensions, vec![".csv", ".md", ".txt"]);
}

#[test]
fn test_register_normalizes_case() {
    let registry = ProcessorRegistry::new();
    registry
        .register(".LOG", Arc::new(EchoProcessor(Extension::new(".log").unwrap())))
        .unwrap();

    assert!(registry.resolve(".log").is_ok());
    assert!(registry.resolve(".Log").is_ok());
}

#[test]
#[serial]
fn test_shared_registry_survives_repeated_discovery() {
    let shared = ProcessorRegistry::shared();
    let before = shared.supported_extensions();
    shared.discover();
    shared.discover();
    assert_eq!(shared.supported_extensions(), before);
    assert!(shared.is_supported(".txt"));
    assert!(shared.is_supported(".csv"));
}
