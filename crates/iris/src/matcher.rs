//! Result matching for test runs
//!
//! Compares captured exit status, stdout and stderr with a test case's
//! expectations. The shape of the configured value picks the matcher: a
//! string demands exact text, a boolean demands presence or absence.

use serde::{Deserialize, Serialize};

use crate::config::TestCase;

/// Lines of unchanged context around each diff hunk
const CONTEXT: usize = 3;

/// Above this many line pairs the diff is a single replace-all hunk
const MAX_DIFF_CELLS: usize = 4_000_000;

/// Expected content of an output stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expectation {
  /// `true`: some output, `false`: no output at all
  Presence(bool),
  /// Exact text after normalization
  Literal(String),
}

impl Expectation {
  /// Whether the already-normalized output satisfies this expectation
  pub fn matches(&self, normalized: &str) -> bool {
    match self {
      Expectation::Presence(present) => *present != normalized.is_empty(),
      Expectation::Literal(text) => normalize_output(text) == normalized,
    }
  }

  fn describe(&self) -> String {
    match self {
      Expectation::Presence(true) => "<any non-empty output>".to_string(),
      Expectation::Presence(false) => "<no output>".to_string(),
      Expectation::Literal(text) => normalize_output(text),
    }
  }
}

/// Canonical form for comparisons: LF line endings, no trailing whitespace
pub fn normalize_output(text: &str) -> String {
  text.replace("\r\n", "\n").trim_end().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
  Status,
  Stdout,
  Stderr,
}

impl Check {
  pub fn as_str(self) -> &'static str {
    match self {
      Check::Status => "status",
      Check::Stdout => "stdout",
      Check::Stderr => "stderr",
    }
  }
}

/// Expected vs. actual for one failing check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckDiff {
  pub check: Check,
  pub expected: String,
  pub actual: String,
  /// Rendered line diff, only for literal text mismatches
  #[serde(skip_serializing_if = "Option::is_none")]
  pub unified: Option<String>,
}

pub fn check_status(expected: i32, actual: i32) -> Option<CheckDiff> {
  (expected != actual).then(|| CheckDiff {
    check: Check::Status,
    expected: expected.to_string(),
    actual: actual.to_string(),
    unified: None,
  })
}

/// Match one captured stream; a missing expectation is never checked
pub fn check_stream(
  check: Check,
  expectation: Option<&Expectation>,
  captured: &str,
) -> Option<CheckDiff> {
  let expectation = expectation?;
  let actual = normalize_output(captured);
  if expectation.matches(&actual) {
    return None;
  }

  let expected = expectation.describe();
  let unified = match expectation {
    Expectation::Literal(_) => Some(unified_diff(&expected, &actual, "expected", "actual")),
    Expectation::Presence(_) => None,
  };
  Some(CheckDiff { check, expected, actual, unified })
}

/// Every failing check of one run, in status, stdout, stderr order
pub fn compare(test: &TestCase, status: i32, stdout: &str, stderr: &str) -> Vec<CheckDiff> {
  [
    check_status(test.expected_status, status),
    check_stream(Check::Stdout, test.expected_output.as_ref(), stdout),
    check_stream(Check::Stderr, test.expected_stderr.as_ref(), stderr),
  ]
  .into_iter()
  .flatten()
  .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
  Equal,
  Delete,
  Insert,
}

/// One line of the edit script with the positions reached before it
#[derive(Debug, Clone, Copy)]
struct Edit<'a> {
  op: Op,
  text: &'a str,
  old_pos: usize,
  new_pos: usize,
}

fn edit_script<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<Edit<'a>> {
  let (n, m) = (old.len(), new.len());
  let mut edits = Vec::with_capacity(n + m);

  if n.saturating_mul(m) > MAX_DIFF_CELLS {
    for (i, &text) in old.iter().enumerate() {
      edits.push(Edit { op: Op::Delete, text, old_pos: i, new_pos: 0 });
    }
    for (j, &text) in new.iter().enumerate() {
      edits.push(Edit { op: Op::Insert, text, old_pos: n, new_pos: j });
    }
    return edits;
  }

  // lcs[i][j]: longest common subsequence of old[i..] and new[j..]
  let mut lcs = vec![vec![0u32; m + 1]; n + 1];
  for i in (0..n).rev() {
    for j in (0..m).rev() {
      lcs[i][j] =
        if old[i] == new[j] { lcs[i + 1][j + 1] + 1 } else { lcs[i + 1][j].max(lcs[i][j + 1]) };
    }
  }

  let (mut i, mut j) = (0, 0);
  while i < n || j < m {
    let edit = if i < n && j < m && old[i] == new[j] {
      Edit { op: Op::Equal, text: old[i], old_pos: i, new_pos: j }
    } else if i < n && (j == m || lcs[i + 1][j] >= lcs[i][j + 1]) {
      Edit { op: Op::Delete, text: old[i], old_pos: i, new_pos: j }
    } else {
      Edit { op: Op::Insert, text: new[j], old_pos: i, new_pos: j }
    };
    match edit.op {
      Op::Equal => {
        i += 1;
        j += 1;
      }
      Op::Delete => i += 1,
      Op::Insert => j += 1,
    }
    edits.push(edit);
  }
  edits
}

fn hunk_range(start: usize, len: usize) -> String {
  // an empty range names the line before it
  let first = if len == 0 { start } else { start + 1 };
  format!("{first},{len}")
}

/// Render a unified line diff between two texts
pub fn unified_diff(old: &str, new: &str, old_label: &str, new_label: &str) -> String {
  let old_lines: Vec<&str> = old.lines().collect();
  let new_lines: Vec<&str> = new.lines().collect();
  let edits = edit_script(&old_lines, &new_lines);

  let changed: Vec<usize> =
    edits.iter().enumerate().filter(|(_, e)| e.op != Op::Equal).map(|(i, _)| i).collect();

  let mut out = format!("--- {old_label}\n+++ {new_label}\n");
  let mut idx = 0;
  while idx < changed.len() {
    let start = changed[idx].saturating_sub(CONTEXT);
    let mut last = changed[idx];
    while idx + 1 < changed.len() && changed[idx + 1] <= last + 2 * CONTEXT + 1 {
      idx += 1;
      last = changed[idx];
    }
    let end = (last + CONTEXT + 1).min(edits.len());
    let hunk = &edits[start..end];

    let old_len = hunk.iter().filter(|e| e.op != Op::Insert).count();
    let new_len = hunk.iter().filter(|e| e.op != Op::Delete).count();
    out.push_str(&format!(
      "@@ -{} +{} @@\n",
      hunk_range(hunk[0].old_pos, old_len),
      hunk_range(hunk[0].new_pos, new_len)
    ));
    for edit in hunk {
      let sign = match edit.op {
        Op::Equal => ' ',
        Op::Delete => '-',
        Op::Insert => '+',
      };
      out.push(sign);
      out.push_str(edit.text);
      out.push('\n');
    }
    idx += 1;
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  fn case(expected_status: i32, out: Option<Expectation>, err: Option<Expectation>) -> TestCase {
    TestCase {
      name: "t".to_string(),
      pre_command: None,
      command: vec![],
      expected_status,
      expected_output: out,
      expected_stderr: err,
      timeout_secs: None,
    }
  }

  fn literal(s: &str) -> Option<Expectation> {
    Some(Expectation::Literal(s.to_string()))
  }

  #[test]
  fn test_normalize_output() {
    assert_eq!(normalize_output("a\r\nb  \r\n\n\n"), "a\nb");
    assert_eq!(normalize_output("  lead\n"), "  lead");
    assert_eq!(normalize_output(" \t\n"), "");
  }

  #[test]
  fn test_literal_match_ignores_trailing_whitespace() {
    let test = case(0, literal("Hello, World!\n"), None);
    assert!(compare(&test, 0, "Hello, World!", "").is_empty());
    assert!(compare(&test, 0, "Hello, World!\r\n\n", "").is_empty());
    assert_eq!(compare(&test, 0, "Hello, world!\n", "").len(), 1);
  }

  #[test]
  fn test_presence_expectations() {
    let some = case(0, Some(Expectation::Presence(true)), None);
    assert!(compare(&some, 0, "anything at all", "").is_empty());
    assert!(compare(&some, 0, "x", "").is_empty());
    assert_eq!(compare(&some, 0, "", "").len(), 1);
    assert_eq!(compare(&some, 0, " \n", "").len(), 1);

    let none = case(0, None, Some(Expectation::Presence(false)));
    assert!(compare(&none, 0, "out", "").is_empty());
    let diffs = compare(&none, 0, "", "warning: leak\n");
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].check, Check::Stderr);
    assert_eq!(diffs[0].expected, "<no output>");
    assert!(diffs[0].unified.is_none());
  }

  #[test]
  fn test_empty_literal_requires_empty_output() {
    let test = case(0, literal(""), None);
    assert!(compare(&test, 0, "\n", "").is_empty());
    assert_eq!(compare(&test, 0, "x", "").len(), 1);
  }

  #[test]
  fn test_missing_expectations_are_not_checked() {
    let test = case(3, None, None);
    assert!(compare(&test, 3, "noise", "more noise").is_empty());
  }

  #[test]
  fn test_all_failing_checks_are_reported_in_order() {
    let test = case(0, literal("ok"), Some(Expectation::Presence(false)));
    let diffs = compare(&test, 1, "nope", "boom");
    let checks: Vec<Check> = diffs.iter().map(|d| d.check).collect();
    assert_eq!(checks, vec![Check::Status, Check::Stdout, Check::Stderr]);
    assert_eq!((diffs[0].expected.as_str(), diffs[0].actual.as_str()), ("0", "1"));
    assert!(diffs[1].unified.is_some());
  }

  #[test]
  fn test_unified_diff_single_change() {
    let diff = unified_diff("a\nb\nc", "a\nB\nc", "expected", "actual");
    assert_eq!(diff, "--- expected\n+++ actual\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n");
  }

  #[test]
  fn test_unified_diff_empty_sides() {
    let diff = unified_diff("", "x\ny", "expected", "actual");
    assert_eq!(diff, "--- expected\n+++ actual\n@@ -0,0 +1,2 @@\n+x\n+y\n");

    let diff = unified_diff("x", "", "expected", "actual");
    assert_eq!(diff, "--- expected\n+++ actual\n@@ -1,1 +0,0 @@\n-x\n");
  }

  #[test]
  fn test_unified_diff_separate_hunks() {
    let old: Vec<String> = (1..=20).map(|i| i.to_string()).collect();
    let mut new = old.clone();
    new[1] = "two".to_string();
    new[17] = "eighteen".to_string();
    let diff = unified_diff(&old.join("\n"), &new.join("\n"), "e", "a");

    let headers: Vec<&str> = diff.lines().filter(|l| l.starts_with("@@")).collect();
    assert_eq!(headers, vec!["@@ -1,5 +1,5 @@", "@@ -15,6 +15,6 @@"]);
    assert!(diff.contains("-2\n+two\n"));
    assert!(diff.contains("-18\n+eighteen\n"));
  }

  #[test]
  fn test_identical_texts_have_no_hunks() {
    assert_eq!(unified_diff("same\n", "same", "e", "a"), "--- e\n+++ a\n");
  }
}
