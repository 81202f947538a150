//! Static analysis of one source file
//!
//! Normalizes the text, extracts functions, measures them and judges the
//! measurements against the configured penalties. Purely textual, so it
//! always completes, even when the test phase cannot.

use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::error::Diagnostic;
use crate::functions::extract_functions;
use crate::metrics::{compute_metrics, FileMetrics, FunctionMetrics};
use crate::penalties::{evaluate, Violation};
use crate::source::SourceUnit;
use crate::{IrisError, Result};

/// Static analysis results for one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
  pub file: String,
  pub functions: Vec<FunctionMetrics>,
  pub metrics: FileMetrics,
  /// Recovered problems, in source order
  pub diagnostics: Vec<Diagnostic>,
  pub violations: Vec<Violation>,
}

pub fn analyze_source(file_name: &str, text: &str, config: &AnalysisConfig) -> Analysis {
  analyze_text(file_name, text, None, config)
}

/// Analyze raw bytes; invalid UTF-8 is replaced and reported, never fatal
pub fn analyze_bytes(file_name: &str, bytes: &[u8], config: &AnalysisConfig) -> Analysis {
  match std::str::from_utf8(bytes) {
    Ok(text) => analyze_text(file_name, text, None, config),
    Err(e) => {
      let line = bytes[..e.valid_up_to()].iter().filter(|b| **b == b'\n').count() + 1;
      warn!("{}:{}: source is not valid UTF-8", file_name, line);
      let diag = Diagnostic::malformed(line, "invalid UTF-8; undecodable bytes were replaced");
      analyze_text(file_name, &String::from_utf8_lossy(bytes), Some(diag), config)
    }
  }
}

fn analyze_text(
  file_name: &str,
  text: &str,
  decode_error: Option<Diagnostic>,
  config: &AnalysisConfig,
) -> Analysis {
  let unit = SourceUnit::new(file_name, text);
  let extraction = extract_functions(&unit);
  let metrics = compute_metrics(&unit, &extraction.functions, &config.metric_options());
  let violations =
    evaluate(&metrics, &config.penalties, unit.name(), extraction.diagnostic.as_ref());

  let mut diagnostics: Vec<Diagnostic> = decode_error
    .into_iter()
    .chain(unit.diagnostics().iter().cloned())
    .chain(extraction.diagnostic)
    .collect();
  diagnostics.sort_by_key(|d| d.line);
  for diag in &diagnostics {
    debug!("{}:{}: {} ({})", unit.name(), diag.line, diag.message, diag.kind.as_str());
  }

  info!(
    "Analyzed {}: {} function(s), {} violation(s), {} diagnostic(s)",
    unit.name(),
    metrics.functions.len(),
    violations.len(),
    diagnostics.len()
  );

  Analysis {
    file: unit.name().to_string(),
    functions: metrics.functions,
    metrics: metrics.file,
    diagnostics,
    violations,
  }
}

pub fn analyze_file<P: AsRef<Path>>(path: P, config: &AnalysisConfig) -> Result<Analysis> {
  let path = path.as_ref();
  let bytes =
    fs::read(path).map_err(|source| IrisError::SourceRead { path: path.to_path_buf(), source })?;
  let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
  Ok(analyze_bytes(&name, &bytes, config))
}
