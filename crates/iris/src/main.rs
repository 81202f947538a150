//! iris command line
//!
//! Audits one C source file for style red flags, builds it and runs the
//! configured test cases, then prints a single report.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::*;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use iris::{analyze_file, run_test_phase, Config, IrisError, Report, Submission};

/// Exit code when the config or the source cannot be loaded
const EXIT_SETUP_FAILED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
  /// Static analysis only
  Analyze,
  /// Build and run the test cases only
  Test,
  /// Static analysis and tests
  Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
  Pretty,
  Json,
}

/// iris - style audit and test harness for single-file C submissions
#[derive(Parser)]
#[command(name = "iris")]
#[command(about = "Audit a C submission for style red flags and run its configured tests")]
#[command(version)]
struct Cli {
  /// C source file to audit
  #[arg(value_name = "SOURCE")]
  source: PathBuf,

  /// Config file; defaults to the first *.config.json next to the source,
  /// then in the current directory
  #[arg(short, long, env = "IRIS_CONFIG")]
  config: Option<PathBuf>,

  /// Which phases to run
  #[arg(short, long, value_enum, default_value_t = Mode::Both)]
  mode: Mode,

  /// Report format
  #[arg(short, long, value_enum, default_value_t = Format::Pretty)]
  format: Format,

  /// Keep the built executable after the tests
  #[arg(long)]
  keep_binary: bool,

  /// Enable verbose logging
  #[arg(short, long)]
  verbose: bool,
}

#[cfg(not(tarpaulin_include))]
fn init_logging(verbose: bool) {
  let default = if verbose { "iris=debug" } else { "iris=warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(std::io::stderr))
    .with(filter)
    .init();
}

async fn run(cli: Cli) -> Result<u8> {
  // test mode never reads the text, but the file must exist
  fs::metadata(&cli.source)
    .map_err(|source| IrisError::SourceRead { path: cli.source.clone(), source })?;

  let config_path = match cli.config {
    Some(path) => path,
    None => Config::discover(&cli.source).context(
      "No *.config.json found next to the source or in the current directory; pass --config",
    )?,
  };
  debug!("Using config {}", config_path.display());
  let config = Config::load_from_file(&config_path)?;
  let submission = Submission::from_path(&cli.source)?;

  let analysis = if matches!(cli.mode, Mode::Analyze | Mode::Both) {
    Some(analyze_file(&cli.source, &config.analysis)?)
  } else {
    None
  };
  let tests = if matches!(cli.mode, Mode::Test | Mode::Both) {
    Some(run_test_phase(&config, &submission, cli.keep_binary).await)
  } else {
    None
  };

  let report = Report::new(submission.file_name(), analysis, tests);
  match cli.format {
    Format::Pretty => print!("{}", report.render_pretty()),
    Format::Json => println!("{}", report.to_json().context("Failed to serialize report")?),
  }
  Ok(report.exit_code())
}

#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  match run(cli).await {
    Ok(code) => ExitCode::from(code),
    Err(e) => {
      eprintln!("{} {:#}", "error:".red().bold(), e);
      ExitCode::from(EXIT_SETUP_FAILED)
    }
  }
}
