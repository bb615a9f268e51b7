//! Task list data model and per-iteration outcomes.
//!
//! These types define the contract with the task list file on disk. Field
//! names follow the canonical camelCase layout; older checklists using
//! `project`/`userStories`/`passes`/`notes` are accepted on read.

use serde::{Deserialize, Serialize};

/// Ordered checklist of stories plus project metadata (`prd.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskList {
    #[serde(alias = "project")]
    pub name: String,
    /// Branch that checkpoints land on. Derived from `name` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "userStories")]
    pub tasks: Vec<Task>,
}

/// One story. `priority` is advisory; selection uses list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, alias = "passes")]
    pub done: bool,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default, alias = "notes", skip_serializing_if = "Option::is_none")]
    pub technical_notes: Option<String>,
}

impl TaskList {
    /// Number of tasks marked done and total task count.
    pub fn progress(&self) -> (usize, usize) {
        let done = self.tasks.iter().filter(|task| task.done).count();
        (done, self.tasks.len())
    }

    /// Flip the done flag for `id`. Returns false if no such task exists.
    ///
    /// Every other task is left untouched.
    pub fn mark_done(&mut self, id: &str) -> bool {
        match self.tasks.iter_mut().find(|task| task.id == id) {
            Some(task) => {
                task.done = true;
                true
            }
            None => false,
        }
    }
}

/// Classification of one assistant reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The assistant declares the whole checklist finished.
    AllDone,
    /// The selected story is finished.
    StoryDone,
    /// The assistant cannot proceed; carries the trimmed reason.
    Blocked(String),
    /// No completion marker in the reply.
    NoSignal,
}

impl Outcome {
    /// Stable lowercase label used in logs and iteration metadata.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::AllDone => "all_done",
            Outcome::StoryDone => "story_done",
            Outcome::Blocked(_) => "blocked",
            Outcome::NoSignal => "no_signal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{task, task_list};

    #[test]
    fn parses_canonical_layout() {
        let raw = r#"{
            "name": "Shop",
            "branchName": "feature/shop",
            "description": "Online shop",
            "tasks": [
                {
                    "id": "US-001",
                    "title": "Add cart",
                    "priority": 2,
                    "done": false,
                    "acceptanceCriteria": ["cart persists"],
                    "technicalNotes": "use sqlite"
                }
            ]
        }"#;
        let list: TaskList = serde_json::from_str(raw).expect("parse");
        assert_eq!(list.branch_name.as_deref(), Some("feature/shop"));
        assert_eq!(list.tasks[0].priority, 2);
        assert_eq!(list.tasks[0].acceptance_criteria, vec!["cart persists"]);
        assert_eq!(list.tasks[0].technical_notes.as_deref(), Some("use sqlite"));
    }

    #[test]
    fn accepts_legacy_field_names() {
        let raw = r#"{
            "project": "Shop",
            "userStories": [
                {"id": "US-001", "title": "Add cart", "passes": true, "notes": "n"}
            ]
        }"#;
        let list: TaskList = serde_json::from_str(raw).expect("parse");
        assert_eq!(list.name, "Shop");
        assert!(list.tasks[0].done);
        assert_eq!(list.tasks[0].technical_notes.as_deref(), Some("n"));

        let written = serde_json::to_string(&list).expect("serialize");
        assert!(written.contains("\"tasks\""));
        assert!(written.contains("\"done\":true"));
    }

    #[test]
    fn mark_done_only_touches_target() {
        let mut list = task_list(vec![task("a", false), task("b", false), task("c", true)]);
        assert!(list.mark_done("b"));
        let flags: Vec<bool> = list.tasks.iter().map(|t| t.done).collect();
        assert_eq!(flags, vec![false, true, true]);
        assert!(!list.mark_done("missing"));
        assert_eq!(list.progress(), (2, 3));
    }
}
