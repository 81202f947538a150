//! Code metrics calculation
//!
//! Derives per-function metrics (length, branching complexity, explicit casts,
//! parameter count) and per-file metrics (comment ratio, uncommented blocks,
//! long lines, header comment) from the clean view in a single token pass.

use serde::Serialize;
use std::collections::HashSet;

use crate::functions::FunctionRecord;
use crate::source::SourceUnit;
use crate::tokens::{is_c_keyword, tokenize, Token, TokenKind};

/// Every metric iris knows how to measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
  Length,
  Complexity,
  CastCount,
  ArgCount,
  CommentRatio,
  UncommentedBlock,
  LongLineCount,
  HeaderLines,
}

impl MetricKind {
  pub fn as_str(self) -> &'static str {
    match self {
      MetricKind::Length => "length",
      MetricKind::Complexity => "complexity",
      MetricKind::CastCount => "cast_count",
      MetricKind::ArgCount => "arg_count",
      MetricKind::CommentRatio => "comment_ratio",
      MetricKind::UncommentedBlock => "uncommented_block",
      MetricKind::LongLineCount => "long_line_count",
      MetricKind::HeaderLines => "header_lines",
    }
  }

  pub fn is_function_level(self) -> bool {
    matches!(
      self,
      MetricKind::Length | MetricKind::Complexity | MetricKind::CastCount | MetricKind::ArgCount
    )
  }
}

/// A named value attached to a function or to the whole file
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metric {
  pub kind: MetricKind,
  pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionMetrics {
  pub name: String,
  pub start_line: usize,
  pub end_line: usize,
  pub length: usize,
  pub complexity: usize,
  pub cast_count: usize,
  pub arg_count: usize,
}

impl FunctionMetrics {
  fn new(record: &FunctionRecord) -> Self {
    Self {
      name: record.name.clone(),
      start_line: record.start_line,
      end_line: record.end_line,
      length: record.end_line - record.start_line + 1,
      complexity: 1,
      cast_count: 0,
      arg_count: record.param_count,
    }
  }

  pub fn get(&self, kind: MetricKind) -> Option<Metric> {
    let value = match kind {
      MetricKind::Length => self.length,
      MetricKind::Complexity => self.complexity,
      MetricKind::CastCount => self.cast_count,
      MetricKind::ArgCount => self.arg_count,
      _ => return None,
    };
    Some(Metric { kind, value: value as f64 })
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMetrics {
  pub line_count: usize,
  pub comment_ratio: f64,
  /// Longest run of code lines without a comment
  pub uncommented_block: usize,
  pub uncommented_block_start: usize,
  pub long_line_count: usize,
  pub long_lines: Vec<usize>,
  pub header_lines: usize,
}

impl FileMetrics {
  pub fn get(&self, kind: MetricKind) -> Option<Metric> {
    let value = match kind {
      MetricKind::CommentRatio => self.comment_ratio,
      MetricKind::UncommentedBlock => self.uncommented_block as f64,
      MetricKind::LongLineCount => self.long_line_count as f64,
      MetricKind::HeaderLines => self.header_lines as f64,
      _ => return None,
    };
    Some(Metric { kind, value })
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSet {
  pub functions: Vec<FunctionMetrics>,
  pub file: FileMetrics,
}

/// Knobs that change how metrics are measured rather than judged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricOptions {
  pub max_line_length: usize,
  /// How many leading lines may hold the header comment
  pub header_window: usize,
}

impl Default for MetricOptions {
  fn default() -> Self {
    Self { max_line_length: 80, header_window: 15 }
  }
}

const BRANCH_KEYWORDS: &[&str] = &["if", "for", "while", "do", "case"];
const BRANCH_OPERATORS: &[&str] = &["&&", "||", "?"];

const PRIMITIVE_TYPES: &[&str] = &[
  "void", "char", "short", "int", "long", "float", "double", "signed", "unsigned", "_Bool", "bool",
  "size_t", "ssize_t", "ptrdiff_t", "intptr_t", "uintptr_t", "int8_t", "int16_t", "int32_t",
  "int64_t", "uint8_t", "uint16_t", "uint32_t", "uint64_t", "wchar_t", "off_t", "FILE",
];
const TYPE_QUALIFIERS: &[&str] = &["const", "volatile", "restrict"];
const TAG_KEYWORDS: &[&str] = &["struct", "union", "enum"];
/// Keywords after which a parenthesised type is still a cast
const CAST_CONTEXT_KEYWORDS: &[&str] = &["return", "case", "else", "do"];
const UNARY_OPERATORS: &[&str] = &["-", "+", "!", "~", "*", "&", "++", "--"];

/// Names usable as a type: primitives plus typedefs seen so far
struct TypeNames<'a> {
  typedefs: HashSet<&'a str>,
}

impl<'a> TypeNames<'a> {
  fn new() -> Self {
    Self { typedefs: HashSet::new() }
  }

  fn contains(&self, name: &str) -> bool {
    PRIMITIVE_TYPES.contains(&name) || self.typedefs.contains(name)
  }
}

/// Tracks an open `typedef ... name;` declaration
struct TypedefScan<'a> {
  depth: usize,
  last_ident: Option<&'a str>,
  pointer_name: Option<&'a str>,
}

fn starts_expression(tok: &Token<'_>) -> bool {
  match tok.kind {
    TokenKind::Ident => !is_c_keyword(tok.text) || tok.text == "sizeof",
    TokenKind::Number | TokenKind::Literal => true,
    TokenKind::Punct => tok.text == "(" || UNARY_OPERATORS.contains(&tok.text),
  }
}

/// Whether the `(` at `open` starts a cast such as `(unsigned char *)p`
fn is_cast(tokens: &[Token<'_>], open: usize, types: &TypeNames<'_>) -> bool {
  if let Some(prev) = open.checked_sub(1).map(|i| &tokens[i]) {
    if prev.is_ident() && !CAST_CONTEXT_KEYWORDS.contains(&prev.text) {
      return false;
    }
    if prev.is_punct(")") || prev.is_punct("]") {
      return false;
    }
  }

  let mut idx = open + 1;
  let mut has_base = false;
  while let Some(tok) = tokens.get(idx) {
    if tok.is_punct(")") {
      break;
    }
    if tok.is_punct("*") {
      if !has_base {
        return false;
      }
    } else if tok.is_ident() && TAG_KEYWORDS.contains(&tok.text) {
      if !tokens.get(idx + 1).is_some_and(|t| t.is_ident()) {
        return false;
      }
      has_base = true;
      idx += 1;
    } else if tok.is_ident() && TYPE_QUALIFIERS.contains(&tok.text) {
      // qualifiers alone do not make a type
    } else if tok.is_ident() && types.contains(tok.text) {
      has_base = true;
    } else {
      return false;
    }
    idx += 1;
  }

  has_base
    && tokens.get(idx).is_some_and(|t| t.is_punct(")"))
    && tokens.get(idx + 1).is_some_and(starts_expression)
}

fn function_metrics(tokens: &[Token<'_>], functions: &[FunctionRecord]) -> Vec<FunctionMetrics> {
  let mut metrics: Vec<FunctionMetrics> = functions.iter().map(FunctionMetrics::new).collect();
  let mut types = TypeNames::new();
  let mut typedef: Option<TypedefScan<'_>> = None;
  let mut depth = 0usize;
  let mut current = 0usize;

  for (idx, tok) in tokens.iter().enumerate() {
    match tok.text {
      "{" => depth += 1,
      "}" => depth = depth.saturating_sub(1),
      _ => {}
    }

    if tok.is_keyword("typedef") && typedef.is_none() {
      typedef = Some(TypedefScan { depth, last_ident: None, pointer_name: None });
      continue;
    }
    if let Some(scan) = typedef.as_mut() {
      if tok.is_punct(";") && depth == scan.depth {
        if let Some(name) = scan.pointer_name.or(scan.last_ident) {
          types.typedefs.insert(name);
        }
        typedef = None;
      } else if depth == scan.depth && tok.is_ident() && !is_c_keyword(tok.text) {
        let after_pointer_paren =
          idx >= 2 && tokens[idx - 1].is_punct("*") && tokens[idx - 2].is_punct("(");
        if after_pointer_paren && scan.pointer_name.is_none() {
          scan.pointer_name = Some(tok.text);
        }
        scan.last_ident = Some(tok.text);
      }
      continue;
    }

    while current < functions.len() && functions[current].body.end <= tok.offset {
      current += 1;
    }
    if !functions.get(current).is_some_and(|f| f.body.contains(&tok.offset)) {
      continue;
    }
    let entry = &mut metrics[current];

    let branches = match tok.kind {
      TokenKind::Ident => BRANCH_KEYWORDS.contains(&tok.text),
      TokenKind::Punct => BRANCH_OPERATORS.contains(&tok.text),
      _ => false,
    };
    if branches {
      entry.complexity += 1;
    }
    if tok.is_punct("(") && is_cast(tokens, idx, &types) {
      entry.cast_count += 1;
    }
  }

  metrics
}

fn file_metrics(unit: &SourceUnit, opts: &MetricOptions) -> FileMetrics {
  let raw_lines: Vec<&str> = unit.raw().lines().collect();
  let clean_lines: Vec<&str> = unit.clean().lines().collect();

  let mut commented = vec![false; raw_lines.len() + 1];
  for span in unit.comments() {
    for line in span.start_line..=span.end_line.min(raw_lines.len()) {
      commented[line] = true;
    }
  }

  let non_blank = unit.raw().chars().filter(|c| !c.is_whitespace()).count();
  let comment_chars: usize = unit
    .comments()
    .iter()
    .map(|span| unit.raw()[span.start..span.end].chars().filter(|c| !c.is_whitespace()).count())
    .sum();
  let comment_ratio = if non_blank == 0 { 0.0 } else { comment_chars as f64 / non_blank as f64 };

  let mut long_lines = Vec::new();
  let mut best = (0usize, 0usize);
  let mut run = (0usize, 0usize);

  for (idx, line) in raw_lines.iter().enumerate() {
    let number = idx + 1;
    if line.chars().count() > opts.max_line_length {
      long_lines.push(number);
    }

    if commented[number] {
      run = (0, 0);
    } else if !line.trim().is_empty() {
      if run.1 == 0 {
        run.0 = number;
      }
      run.1 += 1;
      if run.1 > best.1 {
        best = run;
      }
    }
  }

  let mut header_lines = 0;
  for (idx, line) in raw_lines.iter().enumerate().take(opts.header_window) {
    if line.trim().is_empty() {
      continue;
    }
    let comment_only = clean_lines.get(idx).is_some_and(|l| l.trim().is_empty());
    if commented[idx + 1] && comment_only {
      header_lines += 1;
    } else {
      break;
    }
  }

  FileMetrics {
    line_count: raw_lines.len(),
    comment_ratio,
    uncommented_block: best.1,
    uncommented_block_start: best.0,
    long_line_count: long_lines.len(),
    long_lines,
    header_lines,
  }
}

/// Compute all metrics for one source unit and its extracted functions
pub fn compute_metrics(
  unit: &SourceUnit,
  functions: &[FunctionRecord],
  opts: &MetricOptions,
) -> MetricSet {
  let tokens = tokenize(unit.clean());
  MetricSet { functions: function_metrics(&tokens, functions), file: file_metrics(unit, opts) }
}
