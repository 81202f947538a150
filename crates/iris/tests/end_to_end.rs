#![cfg(unix)]

use iris::config::{AnalysisConfig, CompilerConfig, RunnerConfig, TestCase, TestsConfig};
use iris::matcher::Expectation;
use iris::penalties::PenaltyRule;
use iris::{analyze_source, run_test_phase, Config, DiagnosticKind, Outcome, Report, Submission};
use std::fs;
use tempfile::TempDir;

const PROGRAM: &str = "#include <stdio.h>\n\nint main() {\n  printf(\"Hello, World!\\n\");\n  return 0;\n}\n";

/// Writes a script that prints what the program above prints
const FAKE_COMPILER: &str =
  "printf '#!/bin/sh\\necho \"Hello, World!\"\\n' > {name} && chmod +x {name}";

fn test_case(name: &str) -> TestCase {
  TestCase {
    name: name.to_string(),
    pre_command: None,
    command: vec![],
    expected_status: 0,
    expected_output: Some(Expectation::Literal("Hello, World!\n".to_string())),
    expected_stderr: None,
    timeout_secs: None,
  }
}

fn config(tests: Vec<TestCase>) -> Config {
  let mut analysis = AnalysisConfig::default();
  analysis.penalties.insert(
    "no_args".to_string(),
    PenaltyRule { message: "Function {} takes no parameters".to_string(), threshold: 0.0 },
  );
  analysis.penalties.insert(
    "complex_function".to_string(),
    PenaltyRule { message: "Function {} is too complex".to_string(), threshold: 10.0 },
  );

  Config {
    schema: None,
    compiler: CompilerConfig { cmd: FAKE_COMPILER.to_string(), timeout_secs: 10.0 },
    runner: RunnerConfig { cmd: "./{name}".to_string(), timeout_secs: 5.0 },
    tests: TestsConfig { file: None, tests },
    analysis,
  }
}

fn submission(dir: &TempDir, text: &str) -> Submission {
  let path = dir.path().join("hello.c");
  fs::write(&path, text).unwrap();
  Submission::from_path(path).unwrap()
}

#[tokio::test]
async fn test_parameterless_program_is_flagged_and_passes_its_test() {
  let dir = TempDir::new().unwrap();
  let sub = submission(&dir, PROGRAM);
  let cfg = config(vec![test_case("prints greeting")]);

  let analysis = analyze_source(&sub.file_name(), PROGRAM, &cfg.analysis);
  let run = run_test_phase(&cfg, &sub, false).await;

  assert_eq!(analysis.violations.len(), 1);
  assert_eq!(analysis.violations[0].rule_id, "no_args");
  assert_eq!(analysis.violations[0].target, "main");
  assert_eq!(analysis.functions[0].complexity, 1);
  assert_eq!(run.results[0].outcome, Outcome::Passed);

  let report = Report::new(sub.file_name(), Some(analysis), Some(run));
  assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_unterminated_comment_on_last_line_is_recovered() {
  let text = "int twice(int x) {\n  return 2 * x;\n}\n\nint half(int x) {\n  return x / 2;\n}\n/* more helpers";
  let analysis = analyze_source("helpers.c", text, &config(vec![]).analysis);

  assert_eq!(analysis.diagnostics.len(), 1);
  assert_eq!(analysis.diagnostics[0].kind, DiagnosticKind::MalformedSource);
  assert_eq!(analysis.diagnostics[0].line, 8);

  let names: Vec<&str> = analysis.functions.iter().map(|f| f.name.as_str()).collect();
  assert_eq!(names, vec!["twice", "half"]);
  assert_eq!(analysis.functions[1].length, 3);
  assert_eq!(analysis.metrics.line_count, 8);
  assert_eq!(analysis.metrics.uncommented_block, 6);
}

#[tokio::test]
async fn test_timed_out_case_does_not_stop_the_next_one() {
  let dir = TempDir::new().unwrap();
  let sub = submission(&dir, PROGRAM);

  let mut stalled = test_case("stalled");
  stalled.pre_command = Some("sleep 5;".to_string());
  stalled.timeout_secs = Some(1.0);
  let cfg = config(vec![stalled, test_case("after")]);

  let run = run_test_phase(&cfg, &sub, false).await;

  assert!(run.error.is_none());
  assert_eq!(run.results.len(), 2);
  assert_eq!(run.results[0].outcome, Outcome::Timeout);
  assert!(run.results[0].duration_ms < 4000);
  assert_eq!(run.results[1].outcome, Outcome::Passed);

  let report = Report::new(sub.file_name(), None, Some(run));
  assert_eq!(report.summary.timeouts, 1);
  assert_eq!(report.exit_code(), 1);
}
