//! Deterministic, pure logic shared by the resolver core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod correction;
pub mod dockerfile;
pub mod env_spec;
pub mod history;
pub mod patch;
pub mod sanitize;
pub mod types;
