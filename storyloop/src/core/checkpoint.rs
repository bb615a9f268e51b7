//! Commit message formats for checkpoints.

use crate::core::types::Task;

/// Message for a story the assistant reported finished.
pub fn done_message(task: &Task) -> String {
    format!("Complete {}: {}", task.id, task.title)
}

/// Message for partial work left behind by an iteration without a signal.
pub fn wip_message(task_id: &str, iter: u32) -> String {
    format!("WIP: {task_id} - iteration {iter}")
}
