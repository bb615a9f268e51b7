//! End-to-end tests for the `storyloop` binary.
//!
//! The assistant is replaced by `sh -c <script>` through `storyloop.toml`, so
//! these runs exercise the real subprocess oracle.

use std::fs;
use std::process::{Command, Output};

use storyloop::core::types::Task;
use storyloop::test_support::{TestRepo, task, task_list};

fn config_for(script: &str) -> String {
    format!(
        "pause_secs = 0\n\n[oracle]\nprogram = \"sh\"\nargs = [\"-c\", '{script}']\n"
    )
}

fn setup(tasks: Vec<Task>, script: &str) -> TestRepo {
    let repo = TestRepo::new().expect("repo");
    fs::write(repo.path().join("storyloop.toml"), config_for(script)).expect("write config");
    repo.commit_fixture(&task_list(tasks)).expect("fixture");
    repo
}

fn storyloop(repo: &TestRepo, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_storyloop"))
        .args(args)
        .arg("--root")
        .arg(repo.path())
        .env_remove("RUST_LOG")
        .output()
        .expect("run storyloop")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn missing_task_list_exits_with_failure() {
    let repo = TestRepo::new().expect("repo");
    fs::write(repo.path().join("storyloop.toml"), config_for("cat")).expect("write config");

    let output = storyloop(&repo, &[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("prd.json"), "{}", stderr(&output));
}

#[test]
fn finished_list_exits_zero_without_running_assistant() {
    let repo = setup(
        vec![task("US-1", true)],
        "echo ran > assistant-ran.txt",
    );

    let output = storyloop(&repo, &["3"]);

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert!(stdout(&output).contains("All stories complete"));
    assert!(!repo.path().join("assistant-ran.txt").exists());
}

#[test]
fn story_done_from_subprocess_marks_and_commits() {
    let repo = setup(
        vec![task("US-1", false)],
        "cat > /dev/null; echo done > feature.txt; echo \"<complete>STORY_DONE</complete>\"",
    );

    let output = storyloop(&repo, &["2"]);

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert!(stdout(&output).contains("Iteration 1/2: US-1 - US-1 title"));
    assert_eq!(repo.head_subject().expect("subject"), "Complete US-1: US-1 title");
    assert!(repo.read_task_list().expect("list").tasks[0].done);
    assert!(repo.path().join("feature.txt").is_file());
}

#[test]
fn prompt_is_delivered_on_stdin() {
    let repo = setup(
        vec![task("US-7", false)],
        "cat > prompt-copy.txt; echo \"<complete>BLOCKED: reviewing</complete>\"",
    );

    let output = storyloop(&repo, &[]);

    assert_eq!(output.status.code(), Some(1));
    let prompt = fs::read_to_string(repo.path().join("prompt-copy.txt")).expect("prompt");
    assert!(prompt.contains("# Project: demo"));
    assert!(prompt.contains("\"id\": \"US-7\""));
    assert!(stderr(&output).contains("Blocked on US-7: reviewing"));
}

#[test]
fn assistant_failure_exits_with_failure() {
    let repo = setup(vec![task("US-1", false)], "cat > /dev/null; exit 3");

    let output = storyloop(&repo, &[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("exit code 3"), "{}", stderr(&output));
}

#[test]
fn exhausted_budget_warns_and_exits_zero() {
    let repo = setup(
        vec![task("US-1", false), task("US-2", false)],
        "cat > /dev/null; echo working",
    );

    let output = storyloop(&repo, &["1"]);

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert!(stderr(&output).contains("0/2 stories done"));
}

#[test]
fn command_line_iterations_replace_invalid_config_value() {
    let repo = TestRepo::new().expect("repo");
    fs::write(
        repo.path().join("storyloop.toml"),
        format!("max_iterations = 0\n{}", config_for("cat > /dev/null; echo working")),
    )
    .expect("write config");
    repo.commit_fixture(&task_list(vec![task("US-1", false)]))
        .expect("fixture");

    let output = storyloop(&repo, &["1"]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));

    let output = storyloop(&repo, &[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("max_iterations must be > 0"), "{}", stderr(&output));
}

#[test]
fn zero_iterations_is_rejected() {
    let repo = TestRepo::new().expect("repo");
    let output = storyloop(&repo, &["0"]);
    assert_eq!(output.status.code(), Some(2));
}
