//! Token stream over the clean view
//!
//! A deliberately small C tokenizer: identifiers, numbers, literal shells and
//! punctuators. Preprocessor directive lines are skipped entirely.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Ident,
  Number,
  /// Quoted literal whose payload has already been blanked
  Literal,
  Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
  pub kind: TokenKind,
  pub text: &'a str,
  pub offset: usize,
  pub line: usize,
}

impl Token<'_> {
  pub fn is_punct(&self, p: &str) -> bool {
    self.kind == TokenKind::Punct && self.text == p
  }

  pub fn is_ident(&self) -> bool {
    self.kind == TokenKind::Ident
  }

  pub fn is_keyword(&self, kw: &str) -> bool {
    self.kind == TokenKind::Ident && self.text == kw
  }
}

const KEYWORDS: &[&str] = &[
  "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else", "enum",
  "extern", "float", "for", "goto", "if", "inline", "int", "long", "register", "restrict",
  "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef", "union",
  "unsigned", "void", "volatile", "while", "_Bool", "_Complex", "_Alignas", "_Alignof",
  "_Atomic", "_Generic", "_Noreturn", "_Static_assert", "_Thread_local",
];

pub fn is_c_keyword(text: &str) -> bool {
  KEYWORDS.contains(&text)
}

const PUNCT3: &[&str] = &["...", "<<=", ">>="];
const PUNCT2: &[&str] = &[
  "&&", "||", "++", "--", "->", "==", "!=", "<=", ">=", "<<", ">>", "+=", "-=", "*=", "/=", "%=",
  "&=", "|=", "^=", "##",
];

fn is_ident_byte(b: u8) -> bool {
  b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// Tokenize a clean view; comment bodies must already be blanked
pub fn tokenize(clean: &str) -> Vec<Token<'_>> {
  let bytes = clean.as_bytes();
  let len = bytes.len();
  let mut tokens = Vec::new();
  let mut i = 0;
  let mut line = 1;
  let mut at_line_start = true;

  while i < len {
    let b = bytes[i];

    if b == b'\n' {
      line += 1;
      at_line_start = true;
      i += 1;
      continue;
    }
    if b.is_ascii_whitespace() {
      i += 1;
      continue;
    }
    if b == b'#' && at_line_start {
      i = skip_directive(bytes, i, &mut line);
      continue;
    }
    at_line_start = false;

    let start = i;
    let kind = if is_ident_byte(b) && !b.is_ascii_digit() {
      while i < len && is_ident_byte(bytes[i]) {
        i += 1;
      }
      TokenKind::Ident
    } else if b.is_ascii_digit() || (b == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit))
    {
      i = scan_number(bytes, i);
      TokenKind::Number
    } else if b == b'"' || b == b'\'' {
      i += 1;
      while i < len && bytes[i] != b && bytes[i] != b'\n' {
        i += 1;
      }
      if i < len && bytes[i] == b {
        i += 1;
      }
      TokenKind::Literal
    } else {
      let rest = &clean[i..];
      let width = PUNCT3
        .iter()
        .chain(PUNCT2.iter())
        .find(|p| rest.starts_with(*p))
        .map_or(1, |p| p.len());
      i += width;
      TokenKind::Punct
    };

    tokens.push(Token { kind, text: &clean[start..i], offset: start, line });
  }

  tokens
}

fn skip_directive(bytes: &[u8], mut i: usize, line: &mut usize) -> usize {
  while i < bytes.len() {
    if bytes[i] == b'\n' {
      let spliced = i > 0
        && (bytes[i - 1] == b'\\' || (bytes[i - 1] == b'\r' && i > 1 && bytes[i - 2] == b'\\'));
      if !spliced {
        return i;
      }
      *line += 1;
    }
    i += 1;
  }
  i
}

fn scan_number(bytes: &[u8], mut i: usize) -> usize {
  while i < bytes.len() {
    let b = bytes[i];
    let exponent_sign = (b == b'+' || b == b'-')
      && i > 0
      && matches!(bytes[i - 1], b'e' | b'E' | b'p' | b'P');
    if b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || exponent_sign {
      i += 1;
    } else {
      break;
    }
  }
  i
}
