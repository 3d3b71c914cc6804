//! Shared test utilities for textmill integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated test execution with a temp storage root
//! - Test doubles for processors and the retry sleeper

pub mod harness;

pub use harness::{FailingProcessor, RecordingSleeper, TestHarness};
