//! Configuration management for iris
//!
//! Loads the JSON run document (compiler and runner commands, test cases and
//! penalty rules), merges an external test file, validates the document
//! against its referenced JSON Schema and checks the values iris relies on.

use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::matcher::Expectation;
use crate::metrics::MetricOptions;
use crate::penalties::PenaltyRule;
use crate::{IrisError, Result};

/// Placeholder replaced with the submission's file stem
pub const NAME_PLACEHOLDER: &str = "{name}";

/// File name suffix used to discover a config next to the submission
pub const CONFIG_SUFFIX: &str = ".config.json";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
  /// Relative path of the JSON Schema the document claims to follow
  #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
  pub schema: Option<String>,
  pub compiler: CompilerConfig,
  pub runner: RunnerConfig,
  #[serde(default)]
  pub tests: TestsConfig,
  #[serde(default)]
  pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
  /// Shell command template, e.g. `gcc {name}.c -o {name}`
  pub cmd: String,
  #[serde(default = "default_compile_timeout")]
  pub timeout_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
  /// Shell command template, e.g. `./{name}`
  pub cmd: String,
  #[serde(default = "default_run_timeout")]
  pub timeout_secs: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestsConfig {
  /// Extra test file, relative to the config file
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub file: Option<String>,
  #[serde(default)]
  pub tests: Vec<TestCase>,
}

/// One configured invocation of the built program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
  pub name: String,
  /// Prefixed to the run command, e.g. `valgrind -q`
  #[serde(rename = "preCommand", default, skip_serializing_if = "Option::is_none")]
  pub pre_command: Option<String>,
  /// Arguments appended verbatim, so shell redirections work
  #[serde(default)]
  pub command: Vec<String>,
  pub expected_status: i32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub expected_output: Option<Expectation>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub expected_stderr: Option<Expectation>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_secs: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
  /// Lines longer than this many characters count as long
  #[serde(default = "default_max_line_length")]
  pub max_line_length: usize,
  /// Window at the top of the file searched for a header comment
  #[serde(default = "default_header_lines")]
  pub header_lines: usize,
  #[serde(default)]
  pub penalties: BTreeMap<String, PenaltyRule>,
}

/// Longest accepted timeout in seconds
const MAX_TIMEOUT_SECS: f64 = u32::MAX as f64;

fn default_compile_timeout() -> f64 {
  60.0
}
fn default_run_timeout() -> f64 {
  10.0
}
fn default_max_line_length() -> usize {
  80
}
fn default_header_lines() -> usize {
  15
}

impl Default for AnalysisConfig {
  fn default() -> Self {
    Self {
      max_line_length: default_max_line_length(),
      header_lines: default_header_lines(),
      penalties: BTreeMap::new(),
    }
  }
}

impl AnalysisConfig {
  pub fn metric_options(&self) -> MetricOptions {
    MetricOptions { max_line_length: self.max_line_length, header_window: self.header_lines }
  }
}

/// Seconds as a `Duration`, capped at the longest accepted timeout
fn timeout_duration(secs: f64) -> Duration {
  Duration::try_from_secs_f64(secs.min(MAX_TIMEOUT_SECS)).unwrap_or(Duration::ZERO)
}

impl CompilerConfig {
  pub fn timeout(&self) -> Duration {
    timeout_duration(self.timeout_secs)
  }
}

impl RunnerConfig {
  pub fn timeout(&self) -> Duration {
    timeout_duration(self.timeout_secs)
  }
}

impl TestCase {
  /// Per-test timeout, falling back to the runner default
  pub fn timeout(&self, runner: &RunnerConfig) -> Duration {
    self.timeout_secs.map(timeout_duration).unwrap_or_else(|| runner.timeout())
  }
}

fn read_json(path: &Path) -> Result<Value> {
  let content = fs::read_to_string(path)
    .map_err(|source| IrisError::ConfigRead { path: path.to_path_buf(), source })?;
  serde_json::from_str(&content)
    .map_err(|source| IrisError::ConfigParse { path: path.to_path_buf(), source })
}

/// Append the cases of `tests.file` to the inline ones; failures only warn
fn merge_test_file(document: &mut Value, base: &Path) {
  let Some(tests) = document.get_mut("tests").and_then(Value::as_object_mut) else {
    return;
  };
  let Some(file) = tests.get("file").and_then(Value::as_str) else {
    return;
  };

  let path = base.join(file);
  let extra = match read_json(&path) {
    Ok(doc) => doc,
    Err(e) => {
      warn!("Failed to load test file: {}", e);
      return;
    }
  };
  let Some(extra_cases) = extra.get("tests").and_then(Value::as_array) else {
    warn!("Test file '{}' has no 'tests' array", path.display());
    return;
  };

  let cases = tests.entry("tests").or_insert_with(|| Value::Array(Vec::new()));
  match cases.as_array_mut() {
    Some(cases) => {
      debug!("Merging {} test(s) from {}", extra_cases.len(), path.display());
      cases.extend(extra_cases.iter().cloned());
    }
    None => warn!("Inline 'tests.tests' is not an array; ignoring '{}'", path.display()),
  }
}

fn validate_schema(document: &Value, schema_path: &Path) -> Result<()> {
  let schema = read_json(schema_path)?;
  let compiled = JSONSchema::compile(&schema).map_err(|e| {
    IrisError::schema(vec![format!("invalid schema '{}': {e}", schema_path.display())])
  })?;

  compiled.validate(document).map_err(|errors| {
    IrisError::schema(errors.map(|e| format!("{} (at '{}')", e, e.instance_path)).collect())
  })
}

fn check_template(section: &str, cmd: &str) -> Result<()> {
  if cmd.trim().is_empty() {
    return Err(IrisError::config_validation(format!("{section}.cmd must not be empty")));
  }
  if !cmd.contains(NAME_PLACEHOLDER) {
    return Err(IrisError::config_validation(format!(
      "{section}.cmd must contain the {NAME_PLACEHOLDER} placeholder"
    )));
  }
  Ok(())
}

fn check_timeout(what: &str, secs: f64) -> Result<()> {
  if !secs.is_finite() || secs <= 0.0 || secs > MAX_TIMEOUT_SECS {
    return Err(IrisError::config_validation(format!(
      "{what} must be a positive number of seconds, at most {MAX_TIMEOUT_SECS}"
    )));
  }
  Ok(())
}

/// First `*.config.json` in `dir`, by name
pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
  let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
    .ok()?
    .filter_map(|entry| entry.ok())
    .map(|entry| entry.path())
    .filter(|path| {
      path.is_file()
        && path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with(CONFIG_SUFFIX))
    })
    .collect();
  candidates.sort();
  candidates.into_iter().next()
}

impl Config {
  /// Load, merge and validate configuration from a file
  pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut document = read_json(path)?;

    merge_test_file(&mut document, base);

    match document.get("$schema").and_then(Value::as_str) {
      Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
        warn!("Skipping remote schema '{}'; only local schema files are checked", url);
      }
      Some(schema) => validate_schema(&document, &base.join(schema))?,
      None => debug!("No $schema in {}; skipping schema validation", path.display()),
    }

    let config: Config = serde_json::from_value(document)
      .map_err(|source| IrisError::ConfigParse { path: path.to_path_buf(), source })?;
    config.validate()?;

    info!(
      "Loaded config from {} ({} test(s), {} penalty rule(s))",
      path.display(),
      config.tests.tests.len(),
      config.analysis.penalties.len()
    );
    Ok(config)
  }

  /// Look for a config next to the submission, then in the current directory
  pub fn discover(source: &Path) -> Option<PathBuf> {
    let source_dir = source.parent().filter(|p| !p.as_os_str().is_empty());
    let cwd = std::env::current_dir().ok();

    source_dir
      .map(Path::to_path_buf)
      .into_iter()
      .chain(cwd)
      .find_map(|dir| find_config_file(&dir))
  }

  /// Check the values the analyzer and harness depend on
  pub fn validate(&self) -> Result<()> {
    check_template("compiler", &self.compiler.cmd)?;
    check_template("runner", &self.runner.cmd)?;
    check_timeout("compiler.timeout_secs", self.compiler.timeout_secs)?;
    check_timeout("runner.timeout_secs", self.runner.timeout_secs)?;

    if self.analysis.max_line_length == 0 {
      return Err(IrisError::config_validation("analysis.max_line_length must be greater than 0"));
    }
    for (id, rule) in &self.analysis.penalties {
      if !rule.threshold.is_finite() || rule.threshold < 0.0 {
        return Err(IrisError::config_validation(format!(
          "threshold of penalty '{id}' must be a non-negative number"
        )));
      }
    }

    let mut seen = HashSet::new();
    for test in &self.tests.tests {
      if test.name.trim().is_empty() {
        return Err(IrisError::config_validation("test names must not be empty"));
      }
      if !seen.insert(test.name.as_str()) {
        return Err(IrisError::config_validation(format!("duplicate test name '{}'", test.name)));
      }
      if let Some(secs) = test.timeout_secs {
        check_timeout(&format!("timeout_secs of test '{}'", test.name), secs)?;
      }
    }

    Ok(())
  }
}
