//! Stable exit codes for the `storyloop` binary.

/// All stories complete, or the iteration budget ran out (resumable).
pub const OK: i32 = 0;
/// A story is blocked, the assistant failed, a prerequisite is missing, or
/// any other error stopped the run.
pub const FAILED: i32 = 1;
