//! Sequential story loop driving an external coding assistant.
//!
//! The loop works through a JSON checklist of user stories one at a time:
//! pick the first open story, hand a rendered prompt to the assistant CLI,
//! read the completion marker out of its reply, then checkpoint to git.
//!
//! - **[`core`]**: Pure, deterministic logic (selection, reply classification,
//!   checkpoint messages, task list invariants). No I/O.
//! - **[`io`]**: Side-effecting operations (filesystem, git, process execution).
//!   Isolated behind small adapters so tests can script them.
//!
//! Orchestration modules ([`bootstrap`], [`branch`], [`step`], [`looping`])
//! coordinate core logic with I/O to implement the `storyloop` binary.

pub mod bootstrap;
pub mod branch;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
