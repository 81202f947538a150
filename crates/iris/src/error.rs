//! Error taxonomy for iris
//!
//! Fatal problems surface as [`IrisError`]. Problems the analyzer can recover
//! from are recorded as [`Diagnostic`] values and travel with the results.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IrisError>;

#[derive(Error, Debug)]
pub enum IrisError {
  #[error("Invalid configuration: {message}")]
  ConfigValidation { message: String },

  #[error("Failed to read config '{}': {source}", path.display())]
  ConfigRead {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Failed to parse config '{}': {source}", path.display())]
  ConfigParse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("Config does not match its schema: {}", errors.join("; "))]
  Schema { errors: Vec<String> },

  #[error("Failed to read source '{}': {source}", path.display())]
  SourceRead {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Compilation failed with status {status}")]
  Compile { status: i32, stdout: String, stderr: String },

  #[error("Failed to launch '{command}': {message}")]
  ProcessSpawn { command: String, message: String },
}

impl IrisError {
  pub fn config_validation(message: impl Into<String>) -> Self {
    Self::ConfigValidation { message: message.into() }
  }

  pub fn schema(errors: Vec<String>) -> Self {
    Self::Schema { errors }
  }

  pub fn compile(status: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
    Self::Compile { status, stdout: stdout.into(), stderr: stderr.into() }
  }

  pub fn process_spawn(command: impl Into<String>, message: impl Into<String>) -> Self {
    Self::ProcessSpawn { command: command.into(), message: message.into() }
  }

  /// Configuration problems abort the run before any work starts
  pub fn is_config_error(&self) -> bool {
    matches!(
      self,
      Self::ConfigValidation { .. }
        | Self::ConfigRead { .. }
        | Self::ConfigParse { .. }
        | Self::Schema { .. }
    )
  }
}

/// Kinds of recoverable analysis problems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
  /// Unterminated comment or literal
  MalformedSource,
  /// Function extraction hit an unmatched brace
  UnbalancedBraces,
}

impl DiagnosticKind {
  pub fn as_str(self) -> &'static str {
    match self {
      DiagnosticKind::MalformedSource => "malformed_source",
      DiagnosticKind::UnbalancedBraces => "unbalanced_braces",
    }
  }
}

/// A recovered analysis problem, pinned to a 1-indexed source line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
  pub kind: DiagnosticKind,
  pub line: usize,
  pub message: String,
}

impl Diagnostic {
  pub fn malformed(line: usize, message: impl Into<String>) -> Self {
    Self { kind: DiagnosticKind::MalformedSource, line, message: message.into() }
  }

  pub fn unbalanced(line: usize, message: impl Into<String>) -> Self {
    Self { kind: DiagnosticKind::UnbalancedBraces, line, message: message.into() }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_config_errors_are_classified() {
    assert!(IrisError::config_validation("bad").is_config_error());
    assert!(IrisError::schema(vec!["missing compiler".to_string()]).is_config_error());
    assert!(!IrisError::compile(1, "", "boom").is_config_error());
    assert!(!IrisError::process_spawn("gcc", "not found").is_config_error());
  }

  #[test]
  fn test_error_messages() {
    let err = IrisError::schema(vec!["a".to_string(), "b".to_string()]);
    assert_eq!(err.to_string(), "Config does not match its schema: a; b");

    let err = IrisError::compile(2, "", "x.c:1: error");
    assert_eq!(err.to_string(), "Compilation failed with status 2");
  }

  #[test]
  fn test_diagnostic_constructors() {
    let d = Diagnostic::malformed(7, "unterminated block comment");
    assert_eq!(d.kind, DiagnosticKind::MalformedSource);
    assert_eq!(d.line, 7);
    assert_eq!(d.kind.as_str(), "malformed_source");

    let d = Diagnostic::unbalanced(3, "unmatched '{'");
    assert_eq!(d.kind.as_str(), "unbalanced_braces");
  }
}
