use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;

use storyloop::branch::BranchSetup;
use storyloop::exit_codes;
use storyloop::io::config::{CONFIG_FILE, ConfigOverrides, load_config};
use storyloop::io::oracle::CliOracle;
use storyloop::io::progress::ProgressPrep;
use storyloop::logging;
use storyloop::looping::{LoopEvent, LoopOutcome, LoopSettings, LoopStop, run_loop};
use storyloop::step::{StepOutcome, Transition};

#[derive(Parser, Debug)]
#[command(
    name = "storyloop",
    version,
    about = "Work through a JSON story checklist with a coding assistant, one story per iteration"
)]
struct Cli {
    /// Maximum assistant invocations for this run (defaults to `max_iterations`).
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    iterations: Option<u32>,

    /// Run the assistant inside the configured sandbox launcher.
    #[arg(long, overrides_with = "no_sandbox")]
    sandbox: bool,

    /// Run the assistant directly, even if the config enables the sandbox.
    #[arg(long, overrides_with = "sandbox")]
    no_sandbox: bool,

    /// Debug logging and live assistant output.
    #[arg(short, long)]
    verbose: bool,

    /// Request the assistant's JSON reply envelope.
    #[arg(long)]
    structured: bool,

    /// Config file (defaults to `<root>/storyloop.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Project root: a git work tree containing the task list.
    #[arg(long, value_name = "DIR", default_value = ".")]
    root: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            process::exit(exit_codes::FAILED);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.root.join(CONFIG_FILE));
    let overrides = ConfigOverrides {
        max_iterations: cli.iterations,
        sandbox: match (cli.sandbox, cli.no_sandbox) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        },
        structured_output: cli.structured,
    };
    let config = load_config(&config_path)?
        .with_overrides(&overrides)
        .with_context(|| format!("invalid config {}", config_path.display()))?;

    let oracle = CliOracle::new(config.oracle.clone());
    let settings = LoopSettings {
        root: cli.root,
        config,
        echo: cli.verbose,
    };
    let budget = settings.config.max_iterations;
    let outcome = run_loop(&settings, &oracle, |event| report_event(event, budget))?;
    report_stop(&outcome);
    Ok(outcome.stop.exit_code())
}

fn report_event(event: &LoopEvent<'_>, budget: u32) {
    match event {
        LoopEvent::Bootstrapped(boot) => {
            match &boot.branch {
                BranchSetup::AlreadyOn(b) => println!("On branch {b}"),
                BranchSetup::CheckedOut(b) => println!("Switched to branch {b}"),
                BranchSetup::Created(b) => println!("Created branch {b}"),
            }
            if let ProgressPrep::Archived(path) = &boot.progress {
                println!("Archived progress log to {}", path.display());
            }
            println!("Run {} (up to {budget} iterations)", boot.run_id);
        }
        LoopEvent::Step(step) => report_step(step, budget),
    }
}

fn report_step(step: &StepOutcome, budget: u32) {
    println!(
        "=== Iteration {}/{budget}: {} - {} ===",
        step.iter, step.task_id, step.task_title
    );
    println!("  outcome: {}", step.outcome.label());
    if let Some(message) = &step.checkpoint {
        println!("  checkpoint: {message}");
    }
    if step.transition == Transition::Continue && step.exit_code != Some(0) {
        println!("  assistant exit code: {}", describe_exit(step.exit_code));
    }
}

fn report_stop(outcome: &LoopOutcome) {
    let iterations = outcome.iterations;
    match &outcome.stop {
        LoopStop::AllDone { task_id } => {
            println!("All stories complete (reported during {task_id}) after {iterations} iteration(s).");
        }
        LoopStop::Complete => {
            println!("All stories complete after {iterations} iteration(s).");
        }
        LoopStop::Blocked { task_id, reason } => {
            eprintln!("Blocked on {task_id}: {reason}");
            eprintln!("Resolve the blocker and re-run to resume.");
        }
        LoopStop::OracleFailed { task_id, exit_code } => {
            eprintln!(
                "Assistant failed on {task_id} with exit code {} and no completion marker.",
                describe_exit(*exit_code)
            );
        }
        LoopStop::Exhausted {
            budget,
            done,
            total,
        } => {
            eprintln!(
                "warning: reached {budget} iteration(s) with {done}/{total} stories done. Re-run to continue."
            );
        }
    }
}

fn describe_exit(code: Option<i32>) -> String {
    code.map_or_else(|| "none (killed)".to_string(), |c| c.to_string())
}
