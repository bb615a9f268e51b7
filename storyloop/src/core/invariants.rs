//! Semantic invariants not expressible via JSON Schema.

use std::collections::HashSet;

use crate::core::types::TaskList;

/// Check task list invariants:
/// - No empty ids
/// - No duplicate ids
pub fn validate_invariants(list: &TaskList) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for (idx, task) in list.tasks.iter().enumerate() {
        if task.id.trim().is_empty() {
            errors.push(format!("tasks[{idx}]: id must not be empty"));
            continue;
        }
        if !seen.insert(task.id.as_str()) {
            errors.push(format!("tasks[{idx}]: duplicate id '{}'", task.id));
        }
    }
    errors
}
