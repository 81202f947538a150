//! Report aggregation and rendering
//!
//! Merges the static analysis and the test phase into one report, rendered
//! either as colored text for people or as JSON for tools.

use chrono::{DateTime, Utc};
use colored::*;
use serde::Serialize;
use std::fmt::Write;

use crate::analysis::Analysis;
use crate::matcher::CheckDiff;
use crate::runner::{Outcome, TestResult, TestRun};

const MAX_WIDTH: usize = 80;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
  pub violations: usize,
  pub diagnostics: usize,
  pub tests: usize,
  pub passed: usize,
  pub failed: usize,
  pub timeouts: usize,
  pub build_failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
  pub source: String,
  pub generated_at: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub analysis: Option<Analysis>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tests: Option<TestRun>,
  pub summary: Summary,
}

fn summarize(analysis: Option<&Analysis>, tests: Option<&TestRun>) -> Summary {
  let mut summary = Summary::default();
  if let Some(a) = analysis {
    summary.violations = a.violations.len();
    summary.diagnostics = a.diagnostics.len();
  }
  for result in tests.map(|t| t.results.as_slice()).unwrap_or_default() {
    summary.tests += 1;
    match result.outcome {
      Outcome::Passed => summary.passed += 1,
      Outcome::Failed => summary.failed += 1,
      Outcome::Timeout => summary.timeouts += 1,
      Outcome::BuildFailed => summary.build_failed += 1,
    }
  }
  summary
}

fn banner_width() -> usize {
  console::Term::stdout()
    .size_checked()
    .map_or(MAX_WIDTH, |(_, cols)| usize::from(cols).min(MAX_WIDTH))
}

fn section(out: &mut String, title: &str) {
  let width = banner_width();
  let pad = width.saturating_sub(title.len() + 2) / 2;
  let bar = "=".repeat(pad);
  let _ = writeln!(out, "{}", format!("{bar} {title} {bar}").bold());
}

fn outcome_label(outcome: Outcome) -> ColoredString {
  let label = format!("[{}]", outcome.as_str());
  match outcome {
    Outcome::Passed => label.green().bold(),
    Outcome::Failed => label.red().bold(),
    Outcome::Timeout => label.yellow().bold(),
    Outcome::BuildFailed => label.bright_red().bold(),
  }
}

fn render_diff(out: &mut String, diff: &CheckDiff) {
  match &diff.unified {
    Some(unified) => {
      let _ = writeln!(out, "    {} differs:", diff.check.as_str());
      for line in unified.lines() {
        let colored_line = if line.starts_with("+++") || line.starts_with("---") {
          line.bold()
        } else if line.starts_with('+') {
          line.green()
        } else if line.starts_with('-') {
          line.red()
        } else if line.starts_with("@@") {
          line.cyan()
        } else {
          line.normal()
        };
        let _ = writeln!(out, "      {colored_line}");
      }
    }
    None => {
      let actual = if diff.actual.is_empty() { "<no output>" } else { diff.actual.as_str() };
      let _ = writeln!(
        out,
        "    {}: expected {}, got {}",
        diff.check.as_str(),
        diff.expected.green(),
        actual.red()
      );
    }
  }
}

fn render_test(out: &mut String, result: &TestResult) {
  let timing = if result.outcome == Outcome::BuildFailed {
    String::new()
  } else {
    format!(" ({} ms)", result.duration_ms).dimmed().to_string()
  };
  let _ = writeln!(out, "{} {}{}", outcome_label(result.outcome), result.name, timing);
  for diff in &result.diffs {
    render_diff(out, diff);
  }
}

impl Report {
  pub fn new(
    source: impl Into<String>,
    analysis: Option<Analysis>,
    tests: Option<TestRun>,
  ) -> Self {
    let summary = summarize(analysis.as_ref(), tests.as_ref());
    Self { source: source.into(), generated_at: Utc::now(), analysis, tests, summary }
  }

  /// True when no test phase ran or every case passed
  pub fn tests_passed(&self) -> bool {
    match &self.tests {
      None => true,
      Some(run) => run.error.is_none() && run.results.iter().all(|r| r.outcome == Outcome::Passed),
    }
  }

  /// 0 when every executed test passed, 1 otherwise
  pub fn exit_code(&self) -> u8 {
    if self.tests_passed() {
      0
    } else {
      1
    }
  }

  pub fn to_json(&self) -> serde_json::Result<String> {
    serde_json::to_string_pretty(self)
  }

  pub fn render_pretty(&self) -> String {
    let mut out = String::new();

    if let Some(analysis) = &self.analysis {
      section(&mut out, "Code analysis");
      for diag in &analysis.diagnostics {
        let _ = writeln!(
          out,
          "{}:{}: {} {}",
          analysis.file,
          diag.line,
          format!("{}:", diag.kind.as_str()).yellow().bold(),
          diag.message
        );
      }
      for v in &analysis.violations {
        let _ = writeln!(
          out,
          "{}:{}: {} {}",
          analysis.file,
          v.line,
          v.message,
          format!("({})", v.detail).dimmed()
        );
      }
      if analysis.violations.is_empty() && analysis.diagnostics.is_empty() {
        let _ = writeln!(out, "{}", "No issues found".green());
      }
      let _ = writeln!(
        out,
        "{} function(s), {} line(s), {:.0}% comments",
        analysis.functions.len(),
        analysis.metrics.line_count,
        analysis.metrics.comment_ratio * 100.0
      );
      out.push('\n');
    }

    if let Some(run) = &self.tests {
      section(&mut out, "Tests");
      if let Some(error) = &run.error {
        let _ = writeln!(out, "{} {}", "error:".red().bold(), error.message);
        for line in error.output.lines() {
          let _ = writeln!(out, "  {}", line.dimmed());
        }
      }
      for result in &run.results {
        render_test(&mut out, result);
      }
      if run.results.is_empty() && run.error.is_none() {
        let _ = writeln!(out, "{}", "No tests configured".dimmed());
      }
      out.push('\n');
    }

    let s = &self.summary;
    let verdict = if self.tests_passed() { "OK".green().bold() } else { "FAIL".red().bold() };
    let _ = writeln!(
      out,
      "{} {} violation(s), {} diagnostic(s); tests: {} passed, {} failed, {} timed out, {} not run",
      verdict, s.violations, s.diagnostics, s.passed, s.failed, s.timeouts, s.build_failed
    );
    out
  }
}
