//! Stable exit codes for the resolver CLI.

/// Normal termination: success, budget exhaustion, and operator aborts are
/// all handled outcomes.
pub const OK: i32 = 0;
/// Unhandled internal error.
pub const INTERNAL: i32 = 1;
