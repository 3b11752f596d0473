//! Container-based dependency repair loop.
//!
//! This crate makes a dependency-broken Python snippet runnable inside a
//! fresh container by iteratively guessing a runtime version and package
//! pins, building and running a container, classifying the failure, and
//! mutating the guess. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (classification, correction
//!   planning, specification mutation). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (container engine, suggestion
//!   service, package index, iteration log). Isolated behind traits to
//!   enable scripted fakes in tests.
//!
//! Orchestration modules ([`looping`], [`correction`], [`search`],
//! [`interactive`]) coordinate core logic with I/O to implement the CLI.

pub mod core;
pub mod correction;
pub mod exit_codes;
pub mod interactive;
pub mod io;
pub mod logging;
pub mod looping;
pub mod search;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
