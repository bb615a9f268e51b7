//! I/O adapters for the loop.

pub mod config;
pub mod git;
pub mod iteration_log;
pub mod oracle;
pub mod prereqs;
pub mod process;
pub mod progress;
pub mod prompt;
pub mod task_store;
