//! Task list load/save helpers with schema + invariant validation.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use jsonschema::Validator;
use serde_json::Value;
use tracing::debug;

use crate::core::invariants::validate_invariants;
use crate::core::types::TaskList;

const TASK_LIST_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/task_list/v1.schema.json"
));

static VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(TASK_LIST_SCHEMA).expect("embedded task list schema is valid json");
    jsonschema::validator_for(&schema).expect("embedded task list schema compiles")
});

/// Load and validate the task list from disk (schema + invariants).
pub fn load_task_list(path: &Path) -> Result<TaskList> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read task list {}", path.display()))?;
    parse_task_list(&contents).with_context(|| format!("load task list {}", path.display()))
}

/// Parse and validate task list JSON.
pub fn parse_task_list(contents: &str) -> Result<TaskList> {
    let value: Value = serde_json::from_str(contents).context("parse task list json")?;
    validate_schema(&value)?;
    let list: TaskList = serde_json::from_value(value).context("deserialize task list")?;
    let errors = validate_invariants(&list);
    if !errors.is_empty() {
        return Err(anyhow!("task list invariants failed: {}", errors.join("; ")));
    }
    let (done, total) = list.progress();
    debug!(name = %list.name, done, total, "task list loaded");
    Ok(list)
}

/// Atomically write the task list (temp file + rename), pretty-printed.
pub fn write_task_list(path: &Path, list: &TaskList) -> Result<()> {
    debug!(path = %path.display(), "writing task list");
    let mut buf = serde_json::to_string_pretty(list).context("serialize task list")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn validate_schema(value: &Value) -> Result<()> {
    if VALIDATOR.is_valid(value) {
        return Ok(());
    }
    let messages = VALIDATOR
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect::<Vec<_>>();
    Err(anyhow!(
        "task list schema validation failed: {}",
        messages.join("; ")
    ))
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp task list {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace task list {}", path.display()))?;
    Ok(())
}
