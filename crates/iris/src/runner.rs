//! Test execution
//!
//! Runs every configured test case against the built submission, strictly in
//! declared order and one at a time. A failing or timed out case never stops
//! the ones after it; a failed build turns every case into `BUILD_FAILED`.

use serde::Serialize;
use tracing::{info, warn};

use crate::compile::{build, cleanup, render_template, Submission};
use crate::config::{Config, RunnerConfig, TestCase};
use crate::matcher::{compare, CheckDiff};
use crate::process::run_shell;
use crate::{IrisError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
  Passed,
  Failed,
  Timeout,
  BuildFailed,
}

impl Outcome {
  pub fn as_str(self) -> &'static str {
    match self {
      Outcome::Passed => "PASSED",
      Outcome::Failed => "FAILED",
      Outcome::Timeout => "TIMEOUT",
      Outcome::BuildFailed => "BUILD_FAILED",
    }
  }
}

/// Result of one test case
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
  pub name: String,
  pub outcome: Outcome,
  /// The command line handed to the shell; empty when nothing ran
  pub command: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<i32>,
  pub stdout: String,
  pub stderr: String,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub diffs: Vec<CheckDiff>,
  pub duration_ms: u64,
}

impl TestResult {
  fn build_failed(test: &TestCase) -> Self {
    Self {
      name: test.name.clone(),
      outcome: Outcome::BuildFailed,
      command: String::new(),
      status: None,
      stdout: String::new(),
      stderr: String::new(),
      diffs: Vec::new(),
      duration_ms: 0,
    }
  }
}

/// A fatal problem of the test phase, reported once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseError {
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<i32>,
  /// Compiler diagnostics, when there are any
  #[serde(skip_serializing_if = "String::is_empty")]
  pub output: String,
}

impl From<&IrisError> for PhaseError {
  fn from(err: &IrisError) -> Self {
    match err {
      IrisError::Compile { status, stdout, stderr } => Self {
        message: err.to_string(),
        status: Some(*status),
        output: format!("{stdout}{stderr}"),
      },
      other => Self { message: other.to_string(), status: None, output: String::new() },
    }
  }
}

/// Everything the test phase produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TestRun {
  pub results: Vec<TestResult>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<PhaseError>,
}

/// `{preCommand} {runner.cmd} {command...}` as one shell line
pub fn compose_command(test: &TestCase, runner_cmd: &str, name: &str) -> String {
  let mut parts = Vec::with_capacity(test.command.len() + 2);
  if let Some(pre) = test.pre_command.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
    parts.push(pre.to_string());
  }
  parts.push(render_template(runner_cmd, name));
  parts.extend(test.command.iter().cloned());
  parts.join(" ")
}

/// Run one test case to completion or timeout
pub async fn run_test(
  test: &TestCase,
  runner: &RunnerConfig,
  submission: &Submission,
) -> Result<TestResult> {
  let command = compose_command(test, &runner.cmd, &submission.name);
  let limit = test.timeout(runner);
  let out = run_shell(&command, &submission.dir, limit).await?;

  let (outcome, diffs) = if out.timed_out {
    warn!("Test '{}' timed out after {:?}", test.name, limit);
    (Outcome::Timeout, Vec::new())
  } else {
    let diffs = compare(test, out.status, &out.stdout, &out.stderr);
    let outcome = if diffs.is_empty() { Outcome::Passed } else { Outcome::Failed };
    (outcome, diffs)
  };
  info!("Test '{}': {}", test.name, outcome.as_str());

  Ok(TestResult {
    name: test.name.clone(),
    outcome,
    command,
    status: Some(out.status),
    stdout: out.stdout,
    stderr: out.stderr,
    diffs,
    duration_ms: u64::try_from(out.duration.as_millis()).unwrap_or(u64::MAX),
  })
}

/// Run all cases in order; stops only if the shell itself cannot be launched
pub async fn run_tests(
  tests: &[TestCase],
  runner: &RunnerConfig,
  submission: &Submission,
) -> TestRun {
  let mut run = TestRun::default();
  for test in tests {
    match run_test(test, runner, submission).await {
      Ok(result) => run.results.push(result),
      Err(e) => {
        warn!("Aborting test phase: {}", e);
        run.error = Some(PhaseError::from(&e));
        break;
      }
    }
  }
  run
}

/// Build the submission, run every test case and clean up
pub async fn run_test_phase(
  config: &Config,
  submission: &Submission,
  keep_binary: bool,
) -> TestRun {
  let tests = &config.tests.tests;

  let run = match build(submission, &config.compiler).await {
    Ok(_) => run_tests(tests, &config.runner, submission).await,
    Err(e) => {
      warn!("Build failed; {} test(s) will not run: {}", tests.len(), e);
      TestRun {
        results: tests.iter().map(TestResult::build_failed).collect(),
        error: Some(PhaseError::from(&e)),
      }
    }
  };

  if !keep_binary {
    cleanup(submission);
  }
  run
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use crate::config::{CompilerConfig, TestsConfig};
  use crate::matcher::Expectation;
  use std::fs;
  use tempfile::TempDir;

  /// Stands in for a compiler: writes a shell script named after the submission
  const FAKE_COMPILER: &str =
    "printf '#!/bin/sh\\necho \"hello $1\"\\n' > {name} && chmod +x {name}";

  fn test_case(name: &str, expected_status: i32, output: Option<Expectation>) -> TestCase {
    TestCase {
      name: name.to_string(),
      pre_command: None,
      command: vec![],
      expected_status,
      expected_output: output,
      expected_stderr: None,
      timeout_secs: None,
    }
  }

  fn config(compiler: &str, tests: Vec<TestCase>) -> Config {
    Config {
      schema: None,
      compiler: CompilerConfig { cmd: compiler.to_string(), timeout_secs: 10.0 },
      runner: RunnerConfig { cmd: "./{name}".to_string(), timeout_secs: 5.0 },
      tests: TestsConfig { file: None, tests },
      analysis: Default::default(),
    }
  }

  fn submission(dir: &TempDir) -> Submission {
    fs::write(dir.path().join("hw.c"), "int main(void) { return 0; }\n").unwrap();
    Submission::from_path(dir.path().join("hw.c")).unwrap()
  }

  #[test]
  fn test_compose_command() {
    let mut test = test_case("t", 0, None);
    assert_eq!(compose_command(&test, "./{name}", "hw"), "./hw");

    test.pre_command = Some("valgrind -q ".to_string());
    test.command = vec!["3".to_string(), "<".to_string(), "in.txt".to_string()];
    assert_eq!(compose_command(&test, "./{name}", "hw"), "valgrind -q ./hw 3 < in.txt");

    test.pre_command = Some("   ".to_string());
    assert_eq!(compose_command(&test, "./{name}", "hw"), "./hw 3 < in.txt");
  }

  #[tokio::test]
  async fn test_passing_and_failing_cases() {
    let dir = TempDir::new().unwrap();
    let sub = submission(&dir);
    let mut args = test_case("args", 0, Some(Expectation::Literal("hello world".to_string())));
    args.command = vec!["world".to_string()];
    let cfg = config(
      FAKE_COMPILER,
      vec![
        args,
        test_case("wrong-text", 0, Some(Expectation::Literal("bye".to_string()))),
        test_case("wrong-status", 1, Some(Expectation::Presence(true))),
      ],
    );

    let run = run_test_phase(&cfg, &sub, false).await;
    assert!(run.error.is_none());
    let outcomes: Vec<Outcome> = run.results.iter().map(|r| r.outcome).collect();
    assert_eq!(outcomes, vec![Outcome::Passed, Outcome::Failed, Outcome::Failed]);
    assert_eq!(run.results[0].command, "./hw world");
    assert!(run.results[1].diffs[0].unified.is_some());
    assert_eq!(run.results[2].diffs.len(), 1);
    assert!(!dir.path().join("hw").exists());
  }

  #[tokio::test]
  async fn test_timeout_does_not_block_next_case() {
    let dir = TempDir::new().unwrap();
    let sub = submission(&dir);
    let mut slow = test_case("slow", 0, None);
    slow.pre_command = Some("sleep 5;".to_string());
    slow.timeout_secs = Some(0.5);
    let fast = test_case("fast", 0, Some(Expectation::Presence(true)));
    let cfg = config(FAKE_COMPILER, vec![slow, fast]);

    let run = run_test_phase(&cfg, &sub, true).await;
    assert_eq!(run.results[0].outcome, Outcome::Timeout);
    assert!(run.results[0].diffs.is_empty());
    assert_eq!(run.results[1].outcome, Outcome::Passed);
    assert!(dir.path().join("hw").exists());
  }

  #[tokio::test]
  async fn test_build_failure_short_circuits() {
    let dir = TempDir::new().unwrap();
    let sub = submission(&dir);
    let cfg = config(
      "echo 'hw.c:3: error: expected' >&2; exit 1 # {name}",
      vec![test_case("a", 0, None), test_case("b", 0, None)],
    );

    let run = run_test_phase(&cfg, &sub, false).await;
    assert!(run.results.iter().all(|r| r.outcome == Outcome::BuildFailed && r.status.is_none()));
    assert_eq!(run.results.len(), 2);
    let error = run.error.unwrap();
    assert_eq!(error.status, Some(1));
    assert!(error.output.contains("expected"));
  }

  #[tokio::test]
  async fn test_missing_compiler_is_reported_once() {
    let dir = TempDir::new().unwrap();
    let sub = submission(&dir);
    let cfg = config("no-such-cc-xyz {name}.c", vec![test_case("a", 0, None)]);

    let run = run_test_phase(&cfg, &sub, false).await;
    assert_eq!(run.results[0].outcome, Outcome::BuildFailed);
    assert!(run.error.unwrap().message.contains("no-such-cc-xyz"));
  }

  #[test]
  fn test_outcome_serialization() {
    assert_eq!(serde_json::to_string(&Outcome::BuildFailed).unwrap(), "\"BUILD_FAILED\"");
    assert_eq!(Outcome::Timeout.as_str(), "TIMEOUT");
  }
}
