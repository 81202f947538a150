//! Lexical normalization of C source text
//!
//! Produces a "clean view" of the source in which comment bodies and the
//! payload of string/character literals are blanked out with spaces. Every
//! other byte, newlines included, is kept in place, so byte offsets and line
//! numbers in the clean view are interchangeable with the raw text.

use crate::error::Diagnostic;

/// Byte range of one comment in the source, delimiters included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentSpan {
  pub start: usize,
  pub end: usize,
  pub start_line: usize,
  pub end_line: usize,
}

impl CommentSpan {
  pub fn covers_line(&self, line: usize) -> bool {
    self.start_line <= line && line <= self.end_line
  }
}

/// Output of a single normalization pass
#[derive(Debug, Clone)]
pub struct Normalized {
  pub clean: String,
  pub comments: Vec<CommentSpan>,
  pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  Normal,
  LineComment,
  BlockComment,
  InString { escaped: bool },
  InChar { escaped: bool },
}

const FILLER: u8 = b' ';

fn is_line_break(b: u8) -> bool {
  b == b'\n' || b == b'\r'
}

/// A backslash right before the newline at `i` splices the next line on
fn is_spliced(bytes: &[u8], i: usize) -> bool {
  match i {
    0 => false,
    1 => bytes[0] == b'\\',
    _ => bytes[i - 1] == b'\\' || (bytes[i - 1] == b'\r' && bytes[i - 2] == b'\\'),
  }
}

struct Scanner<'a> {
  bytes: &'a [u8],
  out: Vec<u8>,
  comments: Vec<CommentSpan>,
  diagnostics: Vec<Diagnostic>,
  state: State,
  line: usize,
  open_at: usize,
  open_line: usize,
}

impl<'a> Scanner<'a> {
  fn new(raw: &'a str) -> Self {
    Self {
      bytes: raw.as_bytes(),
      out: raw.as_bytes().to_vec(),
      comments: Vec::new(),
      diagnostics: Vec::new(),
      state: State::Normal,
      line: 1,
      open_at: 0,
      open_line: 1,
    }
  }

  fn blank(&mut self, i: usize) {
    if !is_line_break(self.bytes[i]) {
      self.out[i] = FILLER;
    }
  }

  fn open(&mut self, state: State, i: usize) {
    self.state = state;
    self.open_at = i;
    self.open_line = self.line;
  }

  fn close_comment(&mut self, end: usize, end_line: usize) {
    self.comments.push(CommentSpan {
      start: self.open_at,
      end,
      start_line: self.open_line,
      end_line,
    });
    self.state = State::Normal;
  }

  fn run(mut self) -> Normalized {
    let len = self.bytes.len();
    let mut i = 0;

    while i < len {
      let b = self.bytes[i];
      let next = self.bytes.get(i + 1).copied();

      match self.state {
        State::Normal => match (b, next) {
          (b'/', Some(b'/')) => {
            self.open(State::LineComment, i);
            self.blank(i);
            self.blank(i + 1);
            i += 2;
            continue;
          }
          (b'/', Some(b'*')) => {
            self.open(State::BlockComment, i);
            self.blank(i);
            self.blank(i + 1);
            i += 2;
            continue;
          }
          (b'"', _) => self.open(State::InString { escaped: false }, i),
          (b'\'', _) => self.open(State::InChar { escaped: false }, i),
          _ => {}
        },
        State::LineComment => {
          if b == b'\n' && !is_spliced(self.bytes, i) {
            let end = if i > 0 && self.bytes[i - 1] == b'\r' { i - 1 } else { i };
            self.close_comment(end, self.line);
          } else {
            self.blank(i);
          }
        }
        State::BlockComment => {
          if b == b'*' && next == Some(b'/') {
            self.blank(i);
            self.blank(i + 1);
            self.close_comment(i + 2, self.line);
            i += 2;
            continue;
          }
          self.blank(i);
        }
        State::InString { escaped } | State::InChar { escaped } => {
          let quote = if matches!(self.state, State::InString { .. }) { b'"' } else { b'\'' };
          let still_escaped = if escaped {
            self.blank(i);
            false
          } else if b == b'\\' {
            self.blank(i);
            true
          } else if b == quote {
            self.state = State::Normal;
            i += 1;
            continue;
          } else if b == b'\n' {
            self.diagnostics.push(Diagnostic::malformed(
              self.open_line,
              "unterminated literal at end of line",
            ));
            self.state = State::Normal;
            self.line += 1;
            i += 1;
            continue;
          } else {
            self.blank(i);
            false
          };
          self.state = match self.state {
            State::InString { .. } => State::InString { escaped: still_escaped },
            _ => State::InChar { escaped: still_escaped },
          };
        }
      }

      if b == b'\n' {
        self.line += 1;
      }
      i += 1;
    }

    self.finish(len)
  }

  fn finish(mut self, len: usize) -> Normalized {
    match self.state {
      State::Normal => {}
      State::LineComment => self.close_comment(len, self.line),
      State::BlockComment => {
        self.diagnostics.push(Diagnostic::malformed(
          self.open_line,
          "unterminated block comment runs to end of file",
        ));
        self.close_comment(len, self.line);
      }
      State::InString { .. } | State::InChar { .. } => {
        self.diagnostics.push(Diagnostic::malformed(
          self.open_line,
          "unterminated literal runs to end of file",
        ));
      }
    }

    // Only ASCII bytes are ever rewritten and multi-byte sequences are blanked whole
    let clean = String::from_utf8(self.out)
      .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());

    Normalized { clean, comments: self.comments, diagnostics: self.diagnostics }
  }
}

/// Blank out comments and literal payloads in one left-to-right pass
pub fn normalize(raw: &str) -> Normalized {
  Scanner::new(raw).run()
}

/// A submission's text together with its derived clean view
#[derive(Debug, Clone)]
pub struct SourceUnit {
  name: String,
  raw: String,
  clean: String,
  comments: Vec<CommentSpan>,
  diagnostics: Vec<Diagnostic>,
  line_starts: Vec<usize>,
}

impl SourceUnit {
  pub fn new(name: impl Into<String>, raw: impl Into<String>) -> Self {
    let raw = raw.into();
    let Normalized { clean, comments, diagnostics } = normalize(&raw);
    let line_starts = std::iter::once(0)
      .chain(raw.bytes().enumerate().filter(|(_, b)| *b == b'\n').map(|(i, _)| i + 1))
      .collect();

    Self { name: name.into(), raw, clean, comments, diagnostics, line_starts }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn raw(&self) -> &str {
    &self.raw
  }

  pub fn clean(&self) -> &str {
    &self.clean
  }

  pub fn comments(&self) -> &[CommentSpan] {
    &self.comments
  }

  pub fn diagnostics(&self) -> &[Diagnostic] {
    &self.diagnostics
  }

  pub fn line_count(&self) -> usize {
    self.raw.lines().count()
  }

  /// 1-indexed line containing the byte at `offset`
  pub fn line_of(&self, offset: usize) -> usize {
    match self.line_starts.binary_search(&offset) {
      Ok(idx) => idx + 1,
      Err(idx) => idx,
    }
  }

  /// Whether any comment touches the given 1-indexed line
  pub fn is_commented_line(&self, line: usize) -> bool {
    self.comments.iter().any(|span| span.covers_line(line))
  }
}
