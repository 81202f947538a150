//! Penalty evaluation
//!
//! Compares computed metrics against configured thresholds. Each rule id maps
//! to one metric and a fixed comparator; the configuration only supplies the
//! message template and the threshold.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{Diagnostic, DiagnosticKind};
use crate::metrics::{FileMetrics, FunctionMetrics, MetricKind, MetricSet};

/// Rule id reported when function extraction runs into unbalanced braces
pub const UNBALANCED_BRACES: &str = "unbalanced_braces";

/// One configured penalty: message template and threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyRule {
  #[serde(rename = "msg")]
  pub message: String,
  pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparator {
  Above,
  Below,
  Zero,
}

impl Comparator {
  fn breached(self, value: f64, threshold: f64) -> bool {
    match self {
      Comparator::Above => value > threshold,
      Comparator::Below => value < threshold,
      Comparator::Zero => value == 0.0,
    }
  }
}

/// Rules iris knows how to evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
  LongFunction,
  ComplexFunction,
  TypeCast,
  NoArgs,
  LowComments,
  UncommentedBlocks,
  LongLine,
  MissingHeader,
}

impl RuleKind {
  /// Accepts both rule ids and the names of the metrics they check
  pub fn from_id(id: &str) -> Option<Self> {
    let kind = match id {
      "long_function" | "length" => RuleKind::LongFunction,
      "complex_function" | "complexity" => RuleKind::ComplexFunction,
      "type_cast" | "cast_count" => RuleKind::TypeCast,
      "no_args" | "arg_count" => RuleKind::NoArgs,
      "low_comments" | "comment_ratio" => RuleKind::LowComments,
      "uncommented_blocks" | "uncommented_block" => RuleKind::UncommentedBlocks,
      "long_line" | "long_line_count" => RuleKind::LongLine,
      "missing_header" | "header" => RuleKind::MissingHeader,
      _ => return None,
    };
    Some(kind)
  }

  pub fn id(self) -> &'static str {
    match self {
      RuleKind::LongFunction => "long_function",
      RuleKind::ComplexFunction => "complex_function",
      RuleKind::TypeCast => "type_cast",
      RuleKind::NoArgs => "no_args",
      RuleKind::LowComments => "low_comments",
      RuleKind::UncommentedBlocks => "uncommented_blocks",
      RuleKind::LongLine => "long_line",
      RuleKind::MissingHeader => "missing_header",
    }
  }

  pub fn metric(self) -> MetricKind {
    match self {
      RuleKind::LongFunction => MetricKind::Length,
      RuleKind::ComplexFunction => MetricKind::Complexity,
      RuleKind::TypeCast => MetricKind::CastCount,
      RuleKind::NoArgs => MetricKind::ArgCount,
      RuleKind::LowComments => MetricKind::CommentRatio,
      RuleKind::UncommentedBlocks => MetricKind::UncommentedBlock,
      RuleKind::LongLine => MetricKind::LongLineCount,
      RuleKind::MissingHeader => MetricKind::HeaderLines,
    }
  }

  fn comparator(self) -> Comparator {
    match self {
      RuleKind::NoArgs => Comparator::Zero,
      RuleKind::LowComments | RuleKind::MissingHeader => Comparator::Below,
      _ => Comparator::Above,
    }
  }

  fn detail(self, value: f64) -> String {
    match self {
      RuleKind::LongFunction | RuleKind::UncommentedBlocks | RuleKind::MissingHeader => {
        format!("{value} lines")
      }
      RuleKind::ComplexFunction => format!("{value} paths"),
      RuleKind::TypeCast => format!("{value} casts"),
      RuleKind::NoArgs => "no parameters".to_string(),
      RuleKind::LowComments => format!("{}%", (value * 100.0).floor()),
      RuleKind::LongLine => format!("{value} long lines"),
    }
  }
}

/// One reported threshold breach
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
  pub rule_id: String,
  /// Function name, or the file name for file-level rules
  pub target: String,
  pub message: String,
  pub value: f64,
  pub line: usize,
  pub detail: String,
}

/// Substitute the target name for `{name}` and `{}` placeholders
pub fn render_message(template: &str, target: &str) -> String {
  template.replace("{name}", target).replace("{}", target)
}

fn function_violation(
  kind: RuleKind,
  rule: &PenaltyRule,
  func: &FunctionMetrics,
) -> Option<Violation> {
  let metric = func.get(kind.metric())?;
  kind.comparator().breached(metric.value, rule.threshold).then(|| Violation {
    rule_id: kind.id().to_string(),
    target: func.name.clone(),
    message: render_message(&rule.message, &func.name),
    value: metric.value,
    line: func.start_line,
    detail: kind.detail(metric.value),
  })
}

fn file_violation(
  kind: RuleKind,
  rule: &PenaltyRule,
  file: &FileMetrics,
  file_name: &str,
) -> Option<Violation> {
  let metric = file.get(kind.metric())?;
  if !kind.comparator().breached(metric.value, rule.threshold) {
    return None;
  }

  let line = match kind {
    RuleKind::UncommentedBlocks => file.uncommented_block_start,
    RuleKind::LongLine => file.long_lines.first().copied().unwrap_or(1),
    _ => 1,
  };

  Some(Violation {
    rule_id: kind.id().to_string(),
    target: file_name.to_string(),
    message: render_message(&rule.message, file_name),
    value: metric.value,
    line,
    detail: kind.detail(metric.value),
  })
}

fn unbalanced_violation(
  diagnostic: &Diagnostic,
  rules: &BTreeMap<String, PenaltyRule>,
  file_name: &str,
) -> Violation {
  let message = match rules.get(UNBALANCED_BRACES) {
    Some(rule) => render_message(&rule.message, file_name),
    None => diagnostic.message.clone(),
  };

  Violation {
    rule_id: UNBALANCED_BRACES.to_string(),
    target: file_name.to_string(),
    message,
    value: diagnostic.line as f64,
    line: diagnostic.line,
    detail: diagnostic.message.clone(),
  }
}

/// Evaluate every configured rule against its targets
///
/// Violations are ordered by source line, then by rule id. An extraction
/// failure always yields one `unbalanced_braces` violation.
pub fn evaluate(
  metrics: &MetricSet,
  rules: &BTreeMap<String, PenaltyRule>,
  file_name: &str,
  extraction_failure: Option<&Diagnostic>,
) -> Vec<Violation> {
  let mut violations = Vec::new();

  for (id, rule) in rules {
    if id == UNBALANCED_BRACES {
      continue;
    }
    let Some(kind) = RuleKind::from_id(id) else {
      debug!("Ignoring unknown penalty rule '{}'", id);
      continue;
    };

    if kind.metric().is_function_level() {
      violations.extend(metrics.functions.iter().filter_map(|f| function_violation(kind, rule, f)));
    } else if let Some(v) = file_violation(kind, rule, &metrics.file, file_name) {
      violations.push(v);
    }
  }

  if let Some(diag) = extraction_failure.filter(|d| d.kind == DiagnosticKind::UnbalancedBraces) {
    violations.push(unbalanced_violation(diag, rules, file_name));
  }

  violations.sort_by(|a, b| a.line.cmp(&b.line).then_with(|| a.rule_id.cmp(&b.rule_id)));
  debug!("{} violation(s) in {}", violations.len(), file_name);
  violations
}
