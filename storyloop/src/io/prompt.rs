//! Prompt rendering for one iteration.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{Task, TaskList};

const FRAME_TEMPLATE: &str = include_str!("prompts/frame.md");
const DEFAULT_INSTRUCTIONS: &str = include_str!("prompts/instructions.md");

#[derive(Debug, Serialize)]
struct ProjectContext<'a> {
    name: &'a str,
    description: &'a str,
}

/// Everything that goes into one prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub list: &'a TaskList,
    pub task: &'a Task,
    pub iteration: u32,
    pub progress: &'a str,
    pub instructions: &'a str,
}

/// Render the prompt: project header, iteration number, the story as JSON,
/// the progress log, then the instructions verbatim.
///
/// The instructions are inserted as a value, so template syntax inside them is
/// passed through untouched.
pub fn render_prompt(inputs: &PromptInputs<'_>) -> Result<String> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.add_template("frame", FRAME_TEMPLATE)
        .context("compile prompt frame")?;

    let task_json = serde_json::to_string_pretty(inputs.task).context("serialize story")?;
    let rendered = env.get_template("frame")?.render(context! {
        project => ProjectContext {
            name: &inputs.list.name,
            description: inputs.list.description.trim(),
        },
        iteration => inputs.iteration,
        task_json => task_json,
        progress => inputs.progress.trim_end(),
        instructions => inputs.instructions.trim_end(),
    })?;
    debug!(
        task_id = %inputs.task.id,
        iteration = inputs.iteration,
        bytes = rendered.len(),
        "prompt rendered"
    );
    Ok(rendered)
}

/// Load instructions from `path`, or the built-in text when `None`.
pub fn load_instructions(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("read instructions {}", path.display())),
        None => Ok(DEFAULT_INSTRUCTIONS.to_string()),
    }
}
