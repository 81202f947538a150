//! Function extraction via brace-depth tracking
//!
//! Finds `type name(params) {` definitions at file scope and follows the body
//! until the brace depth returns to zero. Prototypes (ending in `;`) and
//! other top-level braces (struct bodies, initializers) are skipped.

use serde::Serialize;
use std::ops::Range;

use crate::error::Diagnostic;
use crate::source::SourceUnit;
use crate::tokens::{is_c_keyword, tokenize, Token};

/// A function definition found in the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionRecord {
  pub name: String,
  /// Parameter list as written, without the parentheses
  pub params: String,
  pub param_count: usize,
  pub start_line: usize,
  pub end_line: usize,
  /// Byte range from the opening to the closing brace, inclusive of both
  #[serde(skip)]
  pub body: Range<usize>,
}

/// Functions found before extraction finished or stopped
#[derive(Debug, Clone, Default)]
pub struct Extraction {
  pub functions: Vec<FunctionRecord>,
  pub diagnostic: Option<Diagnostic>,
}

#[derive(Debug, Clone, Copy)]
struct Header {
  name: usize,
  open_paren: usize,
  close_paren: usize,
}

/// Tokens that can precede a call-like construct but never a return type
const NOT_A_RETURN_TYPE: &[&str] =
  &["return", "else", "do", "case", "goto", "sizeof", "if", "while", "for", "switch"];

/// Count parameters by splitting on commas outside nested parentheses
pub fn count_parameters(params: &str) -> usize {
  let trimmed = params.trim();
  if trimmed.is_empty() || trimmed == "void" {
    return 0;
  }

  let mut depth = 0usize;
  let mut commas = 0;
  for ch in trimmed.chars() {
    match ch {
      '(' | '[' | '{' => depth += 1,
      ')' | ']' | '}' => depth = depth.saturating_sub(1),
      ',' if depth == 0 => commas += 1,
      _ => {}
    }
  }
  commas + 1
}

fn find_open_paren(tokens: &[Token<'_>], close: usize) -> Option<usize> {
  let mut depth = 0usize;
  for idx in (0..=close).rev() {
    let tok = &tokens[idx];
    if tok.is_punct(")") {
      depth += 1;
    } else if tok.is_punct("(") {
      depth -= 1;
      if depth == 0 {
        return Some(idx);
      }
    }
  }
  None
}

/// Recognise a declarator ending right before the brace at `brace`
fn function_header(tokens: &[Token<'_>], brace: usize) -> Option<Header> {
  let close_paren = brace.checked_sub(1)?;
  if !tokens[close_paren].is_punct(")") {
    return None;
  }
  let open_paren = find_open_paren(tokens, close_paren)?;
  let name = open_paren.checked_sub(1)?;
  let name_tok = &tokens[name];
  if !name_tok.is_ident() || is_c_keyword(name_tok.text) {
    return None;
  }

  let return_type = &tokens[name.checked_sub(1)?];
  let type_like = (return_type.is_ident() && !NOT_A_RETURN_TYPE.contains(&return_type.text))
    || return_type.is_punct("*");
  type_like.then_some(Header { name, open_paren, close_paren })
}

fn build_record(
  unit: &SourceUnit,
  tokens: &[Token<'_>],
  header: Header,
  open_brace: usize,
  close_brace: usize,
) -> FunctionRecord {
  let params_range = tokens[header.open_paren].offset + 1..tokens[header.close_paren].offset;
  let close = &tokens[close_brace];

  FunctionRecord {
    name: tokens[header.name].text.to_string(),
    params: unit.raw()[params_range.clone()].trim().to_string(),
    param_count: count_parameters(&unit.clean()[params_range]),
    start_line: tokens[header.name].line,
    end_line: close.line,
    body: tokens[open_brace].offset..close.offset + close.text.len(),
  }
}

/// Extract every file-scope function definition, in source order
pub fn extract_functions(unit: &SourceUnit) -> Extraction {
  let tokens = tokenize(unit.clean());
  let mut functions = Vec::new();
  let mut open: Vec<(usize, Option<Header>)> = Vec::new();

  for (idx, tok) in tokens.iter().enumerate() {
    if tok.is_punct("{") {
      let header = if open.is_empty() { function_header(&tokens, idx) } else { None };
      open.push((idx, header));
    } else if tok.is_punct("}") {
      match open.pop() {
        None => {
          return Extraction {
            functions,
            diagnostic: Some(Diagnostic::unbalanced(tok.line, "unmatched '}' at file scope")),
          };
        }
        Some((start, Some(header))) if open.is_empty() => {
          functions.push(build_record(unit, &tokens, header, start, idx));
        }
        Some(_) => {}
      }
    }
  }

  let diagnostic = open.first().map(|(start, header)| {
    let line = tokens[*start].line;
    match header {
      Some(h) => {
        Diagnostic::unbalanced(line, format!("body of '{}' is never closed", tokens[h.name].text))
      }
      None => Diagnostic::unbalanced(line, "'{' is never closed"),
    }
  });

  Extraction { functions, diagnostic }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::DiagnosticKind;

  fn extract(src: &str) -> Extraction {
    extract_functions(&SourceUnit::new("t.c", src))
  }

  #[test]
  fn test_count_parameters() {
    assert_eq!(count_parameters(""), 0);
    assert_eq!(count_parameters("  void "), 0);
    assert_eq!(count_parameters("int a"), 1);
    assert_eq!(count_parameters("int a, char **b"), 2);
    assert_eq!(count_parameters("int (*cmp)(const void *, const void *), size_t n"), 2);
    assert_eq!(count_parameters("const char *fmt, ..."), 2);
  }

  #[test]
  fn test_simple_functions() {
    let src = "int add(int a, int b)\n{\n  return a + b;\n}\n\nvoid hello(void) {\n  puts(\"hi\");\n}\n";
    let ex = extract(src);
    assert!(ex.diagnostic.is_none());
    assert_eq!(ex.functions.len(), 2);

    let add = &ex.functions[0];
    assert_eq!(add.name, "add");
    assert_eq!(add.params, "int a, int b");
    assert_eq!(add.param_count, 2);
    assert_eq!((add.start_line, add.end_line), (1, 4));

    let hello = &ex.functions[1];
    assert_eq!(hello.name, "hello");
    assert_eq!(hello.param_count, 0);
    assert_eq!((hello.start_line, hello.end_line), (6, 8));
  }

  #[test]
  fn test_prototypes_and_structs_are_skipped() {
    let src = "int f(int);\ntypedef struct {\n  int x;\n} P;\nstatic const int t[] = {1, 2};\nint f(int x) { return x; }\n";
    let ex = extract(src);
    let names: Vec<&str> = ex.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["f"]);
    assert_eq!(ex.functions[0].start_line, 6);
  }

  #[test]
  fn test_pointer_return_and_function_pointer_variable() {
    let src = "char *dup(const char *s) { return 0; }\nbool (*is_match)(const char *a) = dup;\n";
    let ex = extract(src);
    assert_eq!(ex.functions.len(), 1);
    assert_eq!(ex.functions[0].name, "dup");
  }

  #[test]
  fn test_braces_in_comments_and_strings_are_ignored() {
    let src = "int f(void) {\n  // }\n  puts(\"}\");\n  /* { */\n  return '}';\n}\nint g(void) { return 1; }\n";
    let ex = extract(src);
    assert!(ex.diagnostic.is_none());
    assert_eq!(ex.functions.len(), 2);
    assert_eq!(ex.functions[0].end_line, 6);
  }

  #[test]
  fn test_body_span_is_balanced() {
    let src = "int f(int a) {\n  if (a) { while (a--) { } }\n  return a;\n}\n";
    let unit = SourceUnit::new("t.c", src);
    let ex = extract_functions(&unit);
    let body = &unit.clean()[ex.functions[0].body.clone()];
    assert!(body.starts_with('{') && body.ends_with('}'));
    let opens = body.matches('{').count();
    let closes = body.matches('}').count();
    assert_eq!(opens, closes);
  }

  #[test]
  fn test_unclosed_function_keeps_prior_records() {
    let src = "int ok(int a) { return a; }\nint broken(int b) {\n  if (b) {\n    return b;\n}\n";
    let ex = extract(src);
    assert_eq!(ex.functions.len(), 1);
    assert_eq!(ex.functions[0].name, "ok");
    let diag = ex.diagnostic.expect("unbalanced diagnostic");
    assert_eq!(diag.kind, DiagnosticKind::UnbalancedBraces);
    assert_eq!(diag.line, 2);
    assert!(diag.message.contains("broken"));
  }

  #[test]
  fn test_stray_closing_brace_stops_extraction() {
    let src = "int a(int x) { return x; }\n}\nint b(int y) { return y; }\n";
    let ex = extract(src);
    assert_eq!(ex.functions.len(), 1);
    assert_eq!(ex.diagnostic.map(|d| d.line), Some(2));
  }

  #[test]
  fn test_control_keywords_are_not_functions() {
    // a file-scope brace after `while (...)` can only come from broken code
    let src = "while (x) { }\nint main(void) { return 0; }\n";
    let ex = extract(src);
    let names: Vec<&str> = ex.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["main"]);
  }
}
