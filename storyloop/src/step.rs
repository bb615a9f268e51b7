//! Orchestration for a single iteration.
//!
//! Reload the task list, select, render, invoke, classify, log, then apply
//! the outcome's side effect. The decision about whether the run continues is
//! returned to the loop as a [`Transition`].

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::bootstrap::RunPaths;
use crate::core::checkpoint::{done_message, wip_message};
use crate::core::selector::select_next_task;
use crate::core::signal::classify;
use crate::core::types::Outcome;
use crate::io::config::LoopConfig;
use crate::io::git::{Git, NothingToCommitError};
use crate::io::iteration_log::{IterationMeta, IterationWriteRequest, write_iteration};
use crate::io::oracle::{Oracle, OracleRequest};
use crate::io::progress::read_progress;
use crate::io::prompt::{PromptInputs, render_prompt};
use crate::io::task_store::{load_task_list, write_task_list};

/// Everything an iteration needs that does not change during a run.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub paths: &'a RunPaths,
    pub config: &'a LoopConfig,
    pub git: &'a Git,
    pub run_id: &'a str,
    pub instructions: &'a str,
    /// Progress skeleton written by this run's bootstrap, if any.
    pub fresh_progress: Option<&'a str>,
    /// Echo assistant output while it runs.
    pub echo: bool,
}

/// Whether the run goes on after this iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Continue,
    /// The assistant declared the checklist finished.
    HaltAllDone,
    HaltBlocked(String),
    /// Non-zero (or killed) exit with no recognized signal.
    HaltOracleFailed(Option<i32>),
}

/// Result of one oracle turn.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub iter: u32,
    pub task_id: String,
    pub task_title: String,
    pub outcome: Outcome,
    pub exit_code: Option<i32>,
    /// Message of the checkpoint commit made this iteration, if any.
    pub checkpoint: Option<String>,
    pub transition: Transition,
}

/// What [`run_step`] found.
#[derive(Debug, Clone)]
pub enum StepResult {
    /// Every task is done; the oracle was not invoked.
    NothingLeft,
    Ran(StepOutcome),
}

/// Run iteration `iter` of the current run.
pub fn run_step<O: Oracle>(ctx: &StepContext<'_>, oracle: &O, iter: u32) -> Result<StepResult> {
    let start = Instant::now();
    let list = load_task_list(&ctx.paths.task_list)?;
    let Some(task) = select_next_task(&list) else {
        debug!(iter, "no open task");
        return Ok(StepResult::NothingLeft);
    };
    let task = task.clone();
    info!(iter, task_id = %task.id, "selected task");

    let progress = read_progress(&ctx.paths.progress)?;
    let prompt = render_prompt(&PromptInputs {
        list: &list,
        task: &task,
        iteration: iter,
        progress: &progress,
        instructions: ctx.instructions,
    })?;

    let reply = oracle
        .invoke(&OracleRequest {
            workdir: ctx.paths.root.clone(),
            prompt: prompt.clone(),
            sandbox: ctx.config.sandbox,
            structured: ctx.config.structured_output,
            echo: ctx.echo,
            timeout: ctx.config.oracle_timeout(),
            output_limit_bytes: ctx.config.oracle.output_limit_bytes,
        })
        .with_context(|| format!("invoke assistant for {}", task.id))?;
    let outcome = classify(&reply.text);
    info!(iter, task_id = %task.id, outcome = outcome.label(), exit_code = ?reply.exit_code, "classified reply");

    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    let meta = IterationMeta::new(
        ctx.run_id,
        iter,
        &task.id,
        &outcome,
        reply.exit_code,
        duration_ms,
    );
    write_iteration(&IterationWriteRequest {
        state_dir: &ctx.paths.state_dir,
        meta: &meta,
        prompt: &prompt,
        transcript: &reply.transcript,
    })?;

    let mut checkpoint_message = None;
    let transition = match &outcome {
        Outcome::AllDone => Transition::HaltAllDone,
        Outcome::StoryDone => {
            // The assistant may have edited the list during its turn.
            let mut latest = load_task_list(&ctx.paths.task_list)
                .context("reload task list after story completion")?;
            if !latest.mark_done(&task.id) {
                return Err(anyhow!(
                    "task '{}' disappeared from {} during iteration {iter}",
                    task.id,
                    ctx.paths.task_list.display()
                ));
            }
            write_task_list(&ctx.paths.task_list, &latest)?;
            let message = done_message(&task);
            if checkpoint(ctx.git, &message)? {
                checkpoint_message = Some(message);
            }
            Transition::Continue
        }
        Outcome::Blocked(reason) => Transition::HaltBlocked(reason.clone()),
        Outcome::NoSignal => {
            let message = wip_message(&task.id, iter);
            if reply.succeeded() {
                if wip_checkpoint(ctx, &message)? {
                    checkpoint_message = Some(message);
                }
                Transition::Continue
            } else {
                // The run halts either way; a failed checkpoint only gets logged.
                match wip_checkpoint(ctx, &message) {
                    Ok(true) => checkpoint_message = Some(message),
                    Ok(false) => {}
                    Err(err) => warn!(error = %format!("{err:#}"), "checkpoint after failed turn"),
                }
                Transition::HaltOracleFailed(reply.exit_code)
            }
        }
    };

    Ok(StepResult::Ran(StepOutcome {
        iter,
        task_id: task.id,
        task_title: task.title,
        outcome,
        exit_code: reply.exit_code,
        checkpoint: checkpoint_message,
        transition,
    }))
}

/// Commit partial work if the turn left any.
fn wip_checkpoint(ctx: &StepContext<'_>, message: &str) -> Result<bool> {
    let changed = changed_paths(ctx)?;
    if changed.is_empty() {
        debug!("no working tree changes");
        return Ok(false);
    }
    info!(changed = ?changed, "partial work left behind");
    checkpoint(ctx.git, message)
}

/// Paths with uncommitted changes. The progress log created by bootstrap does
/// not count while it is untracked and still holds the skeleton.
fn changed_paths(ctx: &StepContext<'_>) -> Result<Vec<String>> {
    let progress_rel = ctx.paths.progress.strip_prefix(&ctx.paths.root).ok();
    let mut changed = Vec::new();
    for entry in ctx.git.status_porcelain()? {
        let is_fresh_progress = entry.code == "??"
            && progress_rel.is_some_and(|rel| Path::new(&entry.path) == rel)
            && ctx.fresh_progress.is_some_and(|skeleton| {
                read_progress(&ctx.paths.progress).is_ok_and(|current| current == skeleton)
            });
        if !is_fresh_progress {
            changed.push(entry.path);
        }
    }
    Ok(changed)
}

/// Commit everything. `Ok(false)` when git had nothing to record.
fn checkpoint(git: &Git, message: &str) -> Result<bool> {
    match git.commit_all(message) {
        Ok(()) => {
            info!(message, "checkpoint");
            Ok(true)
        }
        Err(err) if err.downcast_ref::<NothingToCommitError>().is_some() => {
            debug!(message, "nothing to commit");
            Ok(false)
        }
        Err(err) => Err(err.context(format!("checkpoint '{message}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::bootstrap::ensure_state_dir;
    use crate::core::types::Task;
    use crate::test_support::{
        ScriptedOracle, ScriptedReply, TestRepo, task, task_list, test_config,
    };

    struct Fixture {
        repo: TestRepo,
        paths: RunPaths,
        config: LoopConfig,
        git: Git,
    }

    impl Fixture {
        fn new(tasks: Vec<Task>) -> Self {
            let repo = TestRepo::new().expect("repo");
            repo.commit_fixture(&task_list(tasks)).expect("fixture");
            let config = test_config();
            let paths = RunPaths::new(repo.path(), &config);
            ensure_state_dir(&paths).expect("state dir");
            let git = Git::new(repo.path());
            Self {
                repo,
                paths,
                config,
                git,
            }
        }

        fn ctx(&self) -> StepContext<'_> {
            StepContext {
                paths: &self.paths,
                config: &self.config,
                git: &self.git,
                run_id: "run-test",
                instructions: "Follow the rules.",
                fresh_progress: None,
                echo: false,
            }
        }

        fn step(&self, oracle: &ScriptedOracle, iter: u32) -> StepOutcome {
            match run_step(&self.ctx(), oracle, iter).expect("step") {
                StepResult::Ran(outcome) => outcome,
                StepResult::NothingLeft => panic!("expected an oracle turn"),
            }
        }
    }

    #[test]
    fn nothing_left_skips_oracle() {
        let fx = Fixture::new(vec![task("a", true)]);
        let oracle = ScriptedOracle::new(Vec::new());
        let result = run_step(&fx.ctx(), &oracle, 1).expect("step");
        assert!(matches!(result, StepResult::NothingLeft));
        assert_eq!(oracle.calls(), 0);
    }

    #[test]
    fn story_done_marks_only_selected_task_and_commits() {
        let fx = Fixture::new(vec![task("a", true), task("b", false), task("c", false)]);
        let oracle = ScriptedOracle::new(vec![
            ScriptedReply::says("work done <complete>STORY_DONE</complete>")
                .with_edit("src/b.rs", "fn b() {}\n"),
        ]);

        let outcome = fx.step(&oracle, 1);
        assert_eq!(outcome.task_id, "b");
        assert_eq!(outcome.outcome, Outcome::StoryDone);
        assert_eq!(outcome.transition, Transition::Continue);
        assert_eq!(outcome.checkpoint.as_deref(), Some("Complete b: b title"));

        let list = fx.repo.read_task_list().expect("list");
        let flags: Vec<bool> = list.tasks.iter().map(|t| t.done).collect();
        assert_eq!(flags, vec![true, true, false]);
        assert_eq!(fx.repo.head_subject().expect("subject"), "Complete b: b title");
        assert!(fx.git.status_porcelain().expect("status").is_empty());
        oracle.assert_drained();
    }

    #[test]
    fn prompt_carries_task_and_iteration() {
        let fx = Fixture::new(vec![task("a", false)]);
        let oracle = ScriptedOracle::new(vec![ScriptedReply::says("thinking")]);
        fx.step(&oracle, 4);

        let prompts = oracle.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("This is iteration 4."));
        assert!(prompts[0].contains("\"id\": \"a\""));
        assert!(prompts[0].contains("Follow the rules."));
    }

    #[test]
    fn no_signal_with_changes_makes_wip_commit() {
        let fx = Fixture::new(vec![task("a", false)]);
        let oracle =
            ScriptedOracle::new(vec![ScriptedReply::says("halfway").with_edit("notes.md", "wip\n")]);

        let outcome = fx.step(&oracle, 2);
        assert_eq!(outcome.outcome, Outcome::NoSignal);
        assert_eq!(outcome.transition, Transition::Continue);
        assert_eq!(fx.repo.head_subject().expect("subject"), "WIP: a - iteration 2");
        assert!(!fx.repo.read_task_list().expect("list").tasks[0].done);
    }

    #[test]
    fn no_signal_without_changes_makes_no_commit() {
        let fx = Fixture::new(vec![task("a", false)]);
        let before = fx.repo.commit_count().expect("count");
        let oracle = ScriptedOracle::new(vec![ScriptedReply::says("nothing to report")]);

        let outcome = fx.step(&oracle, 1);
        assert_eq!(outcome.checkpoint, None);
        assert_eq!(fx.repo.commit_count().expect("count"), before);
    }

    #[test]
    fn failed_turn_without_signal_halts_after_wip() {
        let fx = Fixture::new(vec![task("a", false)]);
        let oracle = ScriptedOracle::new(vec![
            ScriptedReply::says("crashed")
                .with_exit_code(Some(2))
                .with_edit("partial.txt", "x\n"),
        ]);

        let outcome = fx.step(&oracle, 1);
        assert_eq!(outcome.transition, Transition::HaltOracleFailed(Some(2)));
        assert_eq!(outcome.checkpoint.as_deref(), Some("WIP: a - iteration 1"));
    }

    #[test]
    fn signal_wins_over_failed_exit() {
        let fx = Fixture::new(vec![task("a", false)]);
        let oracle = ScriptedOracle::new(vec![
            ScriptedReply::says("<complete>STORY_DONE</complete>").with_exit_code(Some(1)),
        ]);

        let outcome = fx.step(&oracle, 1);
        assert_eq!(outcome.transition, Transition::Continue);
        assert!(fx.repo.read_task_list().expect("list").tasks[0].done);
    }

    #[test]
    fn blocked_leaves_task_open() {
        let fx = Fixture::new(vec![task("a", false)]);
        let oracle = ScriptedOracle::new(vec![ScriptedReply::says(
            "<complete>BLOCKED: need API key\n</complete>",
        )]);

        let outcome = fx.step(&oracle, 1);
        assert_eq!(
            outcome.transition,
            Transition::HaltBlocked("need API key".to_string())
        );
        assert!(!fx.repo.read_task_list().expect("list").tasks[0].done);
    }

    #[test]
    fn all_done_halts_without_marking() {
        let fx = Fixture::new(vec![task("a", false), task("b", false)]);
        let oracle = ScriptedOracle::new(vec![ScriptedReply::says(
            "<complete>STORY_DONE</complete><complete>ALL_DONE</complete>",
        )]);

        let outcome = fx.step(&oracle, 1);
        assert_eq!(outcome.outcome, Outcome::AllDone);
        assert_eq!(outcome.transition, Transition::HaltAllDone);
        assert_eq!(fx.repo.read_task_list().expect("list").progress(), (0, 2));
    }

    fn untrack_progress(fx: &Fixture, skeleton: &str) {
        fs::remove_file(&fx.paths.progress).expect("remove log");
        fx.repo.commit_all("drop progress log").expect("commit");
        fs::write(&fx.paths.progress, skeleton).expect("write skeleton");
    }

    #[test]
    fn untouched_fresh_progress_log_is_not_partial_work() {
        let fx = Fixture::new(vec![task("a", false)]);
        untrack_progress(&fx, "# Progress Log\nStarted: now\n");
        let before = fx.repo.commit_count().expect("count");
        let ctx = StepContext {
            fresh_progress: Some("# Progress Log\nStarted: now\n"),
            ..fx.ctx()
        };
        let oracle = ScriptedOracle::new(vec![ScriptedReply::says("x")]);

        let result = run_step(&ctx, &oracle, 1).expect("step");
        let StepResult::Ran(outcome) = result else {
            panic!("expected an oracle turn");
        };
        assert_eq!(outcome.checkpoint, None);
        assert_eq!(fx.repo.commit_count().expect("count"), before);
    }

    #[test]
    fn edited_fresh_progress_log_is_checkpointed() {
        let fx = Fixture::new(vec![task("a", false)]);
        untrack_progress(&fx, "# Progress Log\n");
        let ctx = StepContext {
            fresh_progress: Some("# Progress Log\n"),
            ..fx.ctx()
        };
        let oracle = ScriptedOracle::new(vec![
            ScriptedReply::says("x").with_edit("progress.txt", "# Progress Log\n- tried a\n"),
        ]);

        let result = run_step(&ctx, &oracle, 1).expect("step");
        let StepResult::Ran(outcome) = result else {
            panic!("expected an oracle turn");
        };
        assert_eq!(outcome.checkpoint.as_deref(), Some("WIP: a - iteration 1"));
        assert!(fx.git.status_porcelain().expect("status").is_empty());
    }

    #[test]
    fn iteration_log_is_written() {
        let fx = Fixture::new(vec![task("a", false)]);
        let oracle = ScriptedOracle::new(vec![ScriptedReply::says("<complete>BLOCKED: x</complete>")]);
        fx.step(&oracle, 3);

        let dir = fx.paths.state_dir.join("iterations").join("run-test").join("3");
        let meta = fs::read_to_string(dir.join("meta.json")).expect("meta");
        assert!(meta.contains("\"outcome\": \"blocked\""));
        assert!(meta.contains("\"blocked_reason\": \"x\""));
        assert!(dir.join("prompt.md").is_file());
        assert!(dir.join("reply.txt").is_file());
    }
}
