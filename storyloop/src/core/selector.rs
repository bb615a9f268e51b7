//! Deterministic task selection.

use crate::core::types::{Task, TaskList};

/// Return the first task with `done=false`, in stored order.
///
/// `priority` is deliberately ignored: list order is the schedule.
/// Returns `None` when every task is done.
pub fn select_next_task(list: &TaskList) -> Option<&Task> {
    list.tasks.iter().find(|task| !task.done)
}
