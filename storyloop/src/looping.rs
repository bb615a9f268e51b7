//! Multi-iteration driver for a storyloop run.

use std::path::PathBuf;
use std::thread;

use anyhow::Result;
use tracing::{info, warn};

use crate::bootstrap::{Bootstrap, RunPaths, bootstrap_run};
use crate::core::selector::select_next_task;
use crate::exit_codes;
use crate::io::config::LoopConfig;
use crate::io::git::Git;
use crate::io::oracle::Oracle;
use crate::io::task_store::load_task_list;
use crate::step::{StepContext, StepOutcome, StepResult, Transition, run_step};

/// Inputs for one run, after CLI overrides are folded into `config`.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub root: PathBuf,
    pub config: LoopConfig,
    /// Echo assistant output while it runs.
    pub echo: bool,
}

/// Progress notifications for the caller.
#[derive(Debug)]
pub enum LoopEvent<'a> {
    Bootstrapped(&'a Bootstrap),
    Step(&'a StepOutcome),
}

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The assistant reported the whole checklist finished.
    AllDone { task_id: String },
    /// No open task remains.
    Complete,
    Blocked { task_id: String, reason: String },
    /// The assistant exited unsuccessfully without a completion marker.
    OracleFailed {
        task_id: String,
        exit_code: Option<i32>,
    },
    /// Budget spent with tasks still open. Re-running resumes.
    Exhausted {
        budget: u32,
        done: usize,
        total: usize,
    },
}

impl LoopStop {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            LoopStop::AllDone { .. } | LoopStop::Complete | LoopStop::Exhausted { .. }
        )
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            exit_codes::OK
        } else {
            exit_codes::FAILED
        }
    }
}

/// Summary of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub run_id: String,
    /// Oracle invocations made.
    pub iterations: u32,
    pub stop: LoopStop,
}

/// Bootstrap, then run up to `config.max_iterations` iterations.
///
/// Blocked and failed turns end the run with a [`LoopStop`]; any other error
/// (git, task list, spawn failure) is returned as-is.
pub fn run_loop<O: Oracle, F: FnMut(&LoopEvent<'_>)>(
    settings: &LoopSettings,
    oracle: &O,
    mut on_event: F,
) -> Result<LoopOutcome> {
    let config = &settings.config;
    let paths = RunPaths::new(&settings.root, config);
    let boot = bootstrap_run(&paths, config)?;
    on_event(&LoopEvent::Bootstrapped(&boot));

    let git = Git::new(&paths.root);
    let ctx = StepContext {
        paths: &paths,
        config,
        git: &git,
        run_id: &boot.run_id,
        instructions: &boot.instructions,
        fresh_progress: boot.fresh_progress.as_deref(),
        echo: settings.echo,
    };
    let budget = config.max_iterations;
    let finish = |iterations: u32, stop: LoopStop| LoopOutcome {
        run_id: boot.run_id.clone(),
        iterations,
        stop,
    };

    let mut iterations = 0u32;
    for iter in 1..=budget {
        let step = match run_step(&ctx, oracle, iter)? {
            StepResult::NothingLeft => return Ok(finish(iterations, LoopStop::Complete)),
            StepResult::Ran(step) => step,
        };
        iterations += 1;
        on_event(&LoopEvent::Step(&step));

        let stop = match step.transition {
            Transition::Continue => None,
            Transition::HaltAllDone => Some(LoopStop::AllDone {
                task_id: step.task_id,
            }),
            Transition::HaltBlocked(reason) => Some(LoopStop::Blocked {
                task_id: step.task_id,
                reason,
            }),
            Transition::HaltOracleFailed(exit_code) => Some(LoopStop::OracleFailed {
                task_id: step.task_id,
                exit_code,
            }),
        };
        if let Some(stop) = stop {
            info!(iter, stop = ?stop, "run halted");
            return Ok(finish(iterations, stop));
        }
        if iter < budget && !config.pause().is_zero() {
            thread::sleep(config.pause());
        }
    }

    let list = load_task_list(&paths.task_list)?;
    if select_next_task(&list).is_none() {
        return Ok(finish(iterations, LoopStop::Complete));
    }
    let (done, total) = list.progress();
    warn!(budget, done, total, "iteration budget exhausted");
    Ok(finish(
        iterations,
        LoopStop::Exhausted {
            budget,
            done,
            total,
        },
    ))
}
